//! Request path resolution
//!
//! Maps a raw URI path onto the file system below a root directory.
//! Anything that could climb out of the root is refused before the file
//! system is touched.

use std::path::{Path, PathBuf};

use glob::Pattern;
use percent_encoding::percent_decode_str;

use crate::error::ServeError;

/// Split a raw (percent-encoded) URI path into decoded segments.
///
/// Empty and `.` segments are dropped. `..`, embedded separators, NUL
/// bytes and invalid UTF-8 are refused with [`ServeError::Forbidden`].
pub fn decode_segments(raw: &str) -> Result<Vec<String>, ServeError> {
    let mut segments = Vec::new();

    for part in raw.split('/') {
        let decoded = percent_decode_str(part)
            .decode_utf8()
            .map_err(|_| ServeError::Forbidden)?;

        match decoded.as_ref() {
            "" | "." => continue,
            ".." => return Err(ServeError::Forbidden),
            s if s.contains(['/', '\\', '\0']) => return Err(ServeError::Forbidden),
            s => segments.push(s.to_string()),
        }
    }

    Ok(segments)
}

/// Resolve a raw URI path to a path below `root`.
///
/// Segments matching one of the `hidden` patterns resolve to
/// [`ServeError::NotFound`].
pub fn resolve(root: &Path, raw: &str, hidden: &[Pattern]) -> Result<PathBuf, ServeError> {
    let segments = decode_segments(raw)?;

    let mut path = root.to_path_buf();
    for segment in &segments {
        if is_hidden(segment, hidden) {
            tracing::debug!("🙈 Hidden path segment requested: {}", segment);
            return Err(ServeError::NotFound);
        }
        path.push(segment);
    }

    Ok(path)
}

/// Decoded display form of a request path, used in listing titles
pub fn display_path(raw: &str) -> String {
    percent_decode_str(raw).decode_utf8_lossy().into_owned()
}

/// Whether `name` matches any of the hidden patterns
pub fn is_hidden(name: &str, patterns: &[Pattern]) -> bool {
    patterns.iter().any(|p| p.matches(name))
}

/// Compile hidden-name patterns, skipping (and logging) invalid ones
pub fn compile_patterns(patterns: &[String]) -> Vec<Pattern> {
    patterns
        .iter()
        .filter_map(|p| match Pattern::new(p) {
            Ok(pattern) => Some(pattern),
            Err(e) => {
                tracing::warn!("⚠️ Ignoring invalid hidden pattern '{}': {}", p, e);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hidden() -> Vec<Pattern> {
        compile_patterns(&[".ht*".to_string(), "*~".to_string()])
    }

    #[test]
    fn test_decode_segments() {
        assert_eq!(decode_segments("/").unwrap(), Vec::<String>::new());
        assert_eq!(decode_segments("/a//b/./c").unwrap(), vec!["a", "b", "c"]);
        assert_eq!(decode_segments("/my%20file.txt").unwrap(), vec!["my file.txt"]);
    }

    #[test]
    fn test_traversal_is_forbidden() {
        for raw in ["/../etc/passwd", "/a/../../b", "/%2e%2e/secret", "/a%2f..%2fb", "/a%5cb", "/a%00"] {
            assert!(
                matches!(decode_segments(raw), Err(ServeError::Forbidden)),
                "{} should be forbidden",
                raw
            );
        }
    }

    #[test]
    fn test_invalid_utf8_is_forbidden() {
        assert!(matches!(decode_segments("/%ff%fe"), Err(ServeError::Forbidden)));
    }

    #[test]
    fn test_resolve_joins_under_root() {
        let root = Path::new("/srv/www");
        let path = resolve(root, "/docs/readme.txt", &hidden()).unwrap();
        assert_eq!(path, PathBuf::from("/srv/www/docs/readme.txt"));
        assert_eq!(resolve(root, "/", &hidden()).unwrap(), root);
    }

    #[test]
    fn test_resolve_hides_patterns() {
        let root = Path::new("/srv/www");
        assert!(matches!(resolve(root, "/.htpasswd", &hidden()), Err(ServeError::NotFound)));
        assert!(matches!(resolve(root, "/notes.txt~", &hidden()), Err(ServeError::NotFound)));
        assert!(matches!(resolve(root, "/.htaccess/x", &hidden()), Err(ServeError::NotFound)));
        assert!(resolve(root, "/.hidden-but-allowed", &hidden()).is_ok());
    }

    #[test]
    fn test_is_hidden() {
        let patterns = compile_patterns(&["*.txt".to_string(), "a?c".to_string()]);
        assert!(is_hidden("a.txt", &patterns));
        assert!(!is_hidden("a.txt.bak", &patterns));
        assert!(is_hidden("abc", &patterns));
        assert!(!is_hidden("ac", &patterns));
        assert!(is_hidden(".htaccess", &hidden()));
        assert!(is_hidden("notes~", &hidden()));
    }

    #[test]
    fn test_compile_patterns_skips_invalid() {
        let patterns = compile_patterns(&["[oops".to_string(), "*~".to_string()]);
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].as_str(), "*~");
    }

    #[test]
    fn test_display_path() {
        assert_eq!(display_path("/my%20dir/"), "/my dir/");
    }
}
