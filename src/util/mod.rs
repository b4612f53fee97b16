use std::path::Path;

use scraper::{Html, Selector};

const CSRF_META_SELECTOR: &str = r#"meta[name="csrf-token"]"#;

/// Reads the CSRF token a page embeds as `<meta name="csrf-token" content="...">`.
pub fn csrf_token_from_html(html: &str) -> Option<String> {
    let selector = Selector::parse(CSRF_META_SELECTOR).ok()?;
    let document = Html::parse_document(html);
    document
        .select(&selector)
        .filter_map(|element| element.value().attr("content"))
        .map(str::trim)
        .find(|token| !token.is_empty())
        .map(str::to_owned)
}

/// Best-effort MIME type for an uploaded media file, keyed by extension.
pub fn guess_mime(file_name: &str) -> &'static str {
    let extension = Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);

    match extension.as_deref() {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("bmp") => "image/bmp",
        Some("webp") => "image/webp",
        Some("tif" | "tiff") => "image/tiff",
        Some("mp4") => "video/mp4",
        Some("avi") => "video/x-msvideo",
        Some("mov") => "video/quicktime",
        Some("mkv") => "video/x-matroska",
        Some("webm") => "video/webm",
        Some("flv") => "video/x-flv",
        _ => "application/octet-stream",
    }
}
