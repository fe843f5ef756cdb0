//! Asset-type classification from content-type and extension heuristics.

use webcatalog_shared::AssetType;

/// Extensions checked when the content-type is missing or unhelpful.
const IMAGE_EXTS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "svg", "ico", "bmp", "tiff"];
const VIDEO_EXTS: &[&str] = &["mp4", "webm", "mov", "avi", "mkv"];
const AUDIO_EXTS: &[&str] = &["mp3", "wav", "ogg", "flac", "m4a"];
const DOCUMENT_EXTS: &[&str] = &["doc", "docx", "odt", "rtf", "ppt", "pptx", "xls", "xlsx"];
const DATASET_EXTS: &[&str] = &["csv", "tsv", "json", "jsonl", "xml", "parquet", "ndjson"];
const ARCHIVE_EXTS: &[&str] = &["zip", "tar", "gz", "tgz", "bz2", "xz", "7z", "rar"];

/// Infer a coarse asset type. Content-type wins when it is specific; the
/// URL extension breaks ties for generic types like `application/octet-stream`.
pub fn classify(content_type: Option<&str>, url: &str) -> AssetType {
    if let Some(ct) = content_type {
        match classify_content_type(ct) {
            AssetType::Other => {}
            specific => return specific,
        }
    }
    classify_extension(url)
}

fn classify_content_type(ct: &str) -> AssetType {
    let ct = ct.trim().to_ascii_lowercase();

    if ct.starts_with("text/html") || ct.starts_with("application/xhtml") {
        return AssetType::Article;
    }
    if ct.starts_with("image/") {
        return AssetType::Image;
    }
    if ct.starts_with("video/") {
        return AssetType::Video;
    }
    if ct.starts_with("audio/") {
        return AssetType::Audio;
    }
    if ct.starts_with("application/pdf") {
        return AssetType::Pdf;
    }
    if ct.contains("msword")
        || ct.contains("officedocument")
        || ct.contains("opendocument")
        || ct.starts_with("application/rtf")
    {
        return AssetType::Document;
    }
    if ct.starts_with("text/csv")
        || ct.starts_with("application/json")
        || ct.starts_with("application/xml")
        || ct.starts_with("text/xml")
        || ct.contains("ndjson")
    {
        return AssetType::Dataset;
    }
    if ct.starts_with("application/zip")
        || ct.contains("tar")
        || ct.contains("gzip")
        || ct.contains("compressed")
    {
        return AssetType::Archive;
    }
    if ct.starts_with("text/") {
        return AssetType::Article;
    }

    AssetType::Other
}

fn classify_extension(url: &str) -> AssetType {
    let path = match url::Url::parse(url) {
        Ok(u) => u.path().to_ascii_lowercase(),
        Err(_) => url.to_ascii_lowercase(),
    };
    let Some((_, ext)) = path.rsplit('/').next().and_then(|seg| seg.rsplit_once('.')) else {
        return AssetType::Other;
    };

    if ext == "pdf" {
        AssetType::Pdf
    } else if matches!(ext, "html" | "htm" | "xhtml" | "md" | "txt") {
        AssetType::Article
    } else if IMAGE_EXTS.contains(&ext) {
        AssetType::Image
    } else if VIDEO_EXTS.contains(&ext) {
        AssetType::Video
    } else if AUDIO_EXTS.contains(&ext) {
        AssetType::Audio
    } else if DOCUMENT_EXTS.contains(&ext) {
        AssetType::Document
    } else if DATASET_EXTS.contains(&ext) {
        AssetType::Dataset
    } else if ARCHIVE_EXTS.contains(&ext) {
        AssetType::Archive
    } else {
        AssetType::Other
    }
}
