//! MIME type handling

use std::path::Path;

/// Get the MIME type for a file path, `application/octet-stream` when unknown
pub fn guess_mime_type(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .to_string()
}

/// Content type for generated listing pages
pub const HTML_UTF8: &str = "text/html; charset=utf-8";
