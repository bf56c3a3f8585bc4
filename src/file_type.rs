use std::path::Path;
use strum_macros::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub(crate) enum MediaKind {
    Image,
    Video,
}

fn lowercase_ext(file_path: &Path) -> String {
    file_path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|s| s.to_lowercase())
        .unwrap_or_default()
}

/// Kind of media judged by the file extension only, `None` for anything
/// outside the upload allow-list.
pub(crate) fn find_media_kind(file_path: &Path) -> Option<MediaKind> {
    match lowercase_ext(file_path).as_str() {
        "jpg" | "jpeg" | "png" | "gif" | "bmp" => Some(MediaKind::Image),
        "mp4" | "mov" | "avi" | "wmv" | "mkv" => Some(MediaKind::Video),
        _ => None,
    }
}

pub(crate) fn mime_type(file_path: &Path) -> &'static str {
    match lowercase_ext(file_path).as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        "avi" => "video/x-msvideo",
        "wmv" => "video/x-ms-wmv",
        "mkv" => "video/x-matroska",
        _ => "application/octet-stream",
    }
}
