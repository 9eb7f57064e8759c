//! File server implementation

use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use gatehouse_core::config::FileServerSettings;
use glob::Pattern;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, Take};

use crate::compress::{self, Algorithm};
use crate::error::ServeError;
use crate::listing::{self, SortOrder};
use crate::mime::{HTML_UTF8, guess_mime_type};
use crate::path;

/// Configuration for the file server
#[derive(Debug, Clone)]
pub struct FileServerConfig {
    /// Root directory to serve
    pub root: PathBuf,
    /// Index files to look for
    pub index: Vec<String>,
    /// Enable directory browsing
    pub browse: bool,
    /// Enable compression
    pub compress: bool,
    /// Largest file compressed on the fly
    pub compress_max_bytes: u64,
    /// Check for pre-compressed files (.br, .gz, .zst)
    pub precompressed: bool,
    /// Name patterns that are never served or listed
    pub hidden: Vec<Pattern>,
}

impl Default for FileServerConfig {
    fn default() -> Self {
        Self::from_settings(".", &FileServerSettings::default())
    }
}

impl FileServerConfig {
    /// Build from the `file_server` section of the configuration
    pub fn from_settings(root: impl Into<PathBuf>, settings: &FileServerSettings) -> Self {
        Self {
            root: root.into(),
            index: settings.index.clone(),
            browse: settings.browse,
            compress: settings.compress,
            compress_max_bytes: settings.compress_max_bytes,
            precompressed: settings.precompressed,
            hidden: path::compile_patterns(&settings.hidden),
        }
    }
}

/// What the client asked for. Header values are passed through raw.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileRequest<'a> {
    /// Percent-encoded URI path
    pub path: &'a str,
    pub query: Option<&'a str>,
    /// `HEAD` request: headers only, the file is never read
    pub head: bool,
    pub range: Option<&'a str>,
    pub accept_encoding: Option<&'a str>,
    pub if_none_match: Option<&'a str>,
    pub if_modified_since: Option<&'a str>,
}

/// Static file server
pub struct FileServer {
    config: FileServerConfig,
    /// Canonical root, used to keep symlinks from escaping
    canonical_root: PathBuf,
}

/// Body of a served response
#[derive(Debug)]
pub enum FileBody {
    Empty,
    /// Generated or compressed content held in memory
    Bytes(Vec<u8>),
    /// Positioned at the first byte to send and limited to the response length
    File(Take<File>),
}

/// Response from file server
#[derive(Debug)]
pub struct ServedFile {
    pub body: FileBody,
    pub mime_type: String,
    pub status: u16,
    /// `None` when the length is only known after compressing
    pub content_length: Option<u64>,
    pub content_range: Option<String>,
    pub last_modified: Option<String>,
    pub etag: Option<String>,
    pub content_encoding: Option<String>,
    pub location: Option<String>,
}

impl ServedFile {
    fn new(status: u16, mime_type: impl Into<String>) -> Self {
        Self {
            body: FileBody::Empty,
            mime_type: mime_type.into(),
            status,
            content_length: Some(0),
            content_range: None,
            last_modified: None,
            etag: None,
            content_encoding: None,
            location: None,
        }
    }

    fn with_bytes(mut self, content: Vec<u8>, head: bool) -> Self {
        self.content_length = Some(content.len() as u64);
        self.body = if head { FileBody::Empty } else { FileBody::Bytes(content) };
        self
    }
}

/// Parsed `Range` header
#[derive(Debug, PartialEq, Eq)]
enum RangeSpec {
    /// Inclusive byte range
    Satisfiable(u64, u64),
    Unsatisfiable,
    /// Malformed or multi-range: serve the whole file
    Ignored,
}

/// Which bytes stand in for a file in a full response
#[derive(Debug)]
enum Representation {
    Identity,
    /// A `.br`/`.zst`/`.gz` sibling on disk
    Precompressed {
        path: PathBuf,
        size: u64,
        algorithm: Algorithm,
    },
    /// Compressed in memory for this response
    Compressed(Algorithm),
}

impl Representation {
    fn algorithm(&self) -> Option<Algorithm> {
        match self {
            Representation::Identity => None,
            Representation::Precompressed { algorithm, .. }
            | Representation::Compressed(algorithm) => Some(*algorithm),
        }
    }
}

impl FileServer {
    /// Create a new file server
    pub fn new(config: FileServerConfig) -> Self {
        let canonical_root = std::fs::canonicalize(&config.root).unwrap_or_else(|e| {
            tracing::warn!("⚠️ Cannot canonicalize root {}: {}", config.root.display(), e);
            config.root.clone()
        });

        Self {
            config,
            canonical_root,
        }
    }

    /// Create a file server for a directory with default options
    pub fn serve_dir(root: impl Into<PathBuf>) -> Self {
        Self::new(FileServerConfig {
            root: root.into(),
            ..Default::default()
        })
    }

    /// Enable directory browsing
    pub fn with_browse(mut self, enable: bool) -> Self {
        self.config.browse = enable;
        self
    }

    /// Serve a file request
    pub async fn serve(&self, req: &FileRequest<'_>) -> Result<ServedFile, ServeError> {
        let file_path = path::resolve(&self.config.root, req.path, &self.config.hidden)?;

        tracing::debug!("📁 Serving request: {} -> {:?}", req.path, file_path);

        let metadata = tokio::fs::metadata(&file_path).await?;
        self.ensure_within_root(&file_path).await?;

        if !metadata.is_dir() {
            return self.serve_file(&file_path, &metadata, req).await;
        }

        // Relative links in the listing need the trailing slash
        if !req.path.ends_with('/') {
            // `//host` would be read as a protocol-relative URL
            let target = format!("/{}", req.path.trim_start_matches('/'));
            let location = match req.query {
                Some(q) => format!("{}/?{}", target, q),
                None => format!("{}/", target),
            };
            let mut served = ServedFile::new(301, HTML_UTF8);
            served.location = Some(location);
            return Ok(served);
        }

        for index in &self.config.index {
            let index_path = file_path.join(index);
            if let Ok(index_meta) = tokio::fs::metadata(&index_path).await {
                if index_meta.is_file() {
                    self.ensure_within_root(&index_path).await?;
                    return self.serve_file(&index_path, &index_meta, req).await;
                }
            }
        }

        if !self.config.browse {
            return Err(ServeError::Forbidden);
        }

        let entries = listing::read_entries(&file_path, &self.config.hidden).await?;
        let html = listing::render(
            &path::display_path(req.path),
            entries,
            SortOrder::from_query(req.query),
        )
        .into_bytes();

        let algorithm =
            self.negotiate_compression(HTML_UTF8, html.len() as u64, req.accept_encoding);
        let served = match algorithm {
            Some(algorithm) => {
                let compressed = algorithm.compress(&html).await?;
                let mut served = ServedFile::new(200, HTML_UTF8).with_bytes(compressed, req.head);
                served.content_encoding = Some(algorithm.encoding().to_string());
                served
            }
            None => ServedFile::new(200, HTML_UTF8).with_bytes(html, req.head),
        };
        Ok(served)
    }

    async fn ensure_within_root(&self, file_path: &Path) -> Result<(), ServeError> {
        let canonical = tokio::fs::canonicalize(file_path).await?;
        if canonical.starts_with(&self.canonical_root) {
            Ok(())
        } else {
            tracing::warn!("🚫 Path escapes root: {}", file_path.display());
            Err(ServeError::Forbidden)
        }
    }

    async fn serve_file(
        &self,
        file_path: &Path,
        metadata: &Metadata,
        req: &FileRequest<'_>,
    ) -> Result<ServedFile, ServeError> {
        let file_size = metadata.len();
        let modified = metadata.modified().ok();
        let mime_type = guess_mime_type(file_path);

        let range = req.range.map(|r| parse_range(r, file_size));
        let wants_range = matches!(
            range,
            Some(RangeSpec::Satisfiable(..) | RangeSpec::Unsatisfiable)
        );

        // Partial content is never compressed
        let representation = if wants_range {
            Representation::Identity
        } else {
            self.choose_representation(file_path, &mime_type, file_size, req.accept_encoding)
                .await
        };

        // Calculate Last-Modified and ETag
        let last_modified = modified.map(httpdate::fmt_http_date);
        let mtime_secs = modified
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs())
            .unwrap_or(0);
        // Each encoding is its own representation and gets its own tag
        let etag = match representation.algorithm() {
            Some(algorithm) => {
                format!("\"{:x}-{:x}-{}\"", file_size, mtime_secs, algorithm.encoding())
            }
            None => format!("\"{:x}-{:x}\"", file_size, mtime_secs),
        };

        let mut served = ServedFile::new(200, mime_type);
        served.last_modified = last_modified;
        served.content_encoding = representation.algorithm().map(|a| a.encoding().to_string());

        if is_not_modified(req, &etag, modified) {
            served.status = 304;
            served.content_length = None;
            served.etag = Some(etag);
            return Ok(served);
        }
        served.etag = Some(etag);

        match representation {
            Representation::Identity => {
                let (start, length) = match range {
                    Some(RangeSpec::Satisfiable(s, e)) => {
                        served.status = 206;
                        served.content_range = Some(format!("bytes {}-{}/{}", s, e, file_size));
                        (s, e - s + 1)
                    }
                    Some(RangeSpec::Unsatisfiable) => {
                        return Err(ServeError::RangeNotSatisfiable { size: file_size });
                    }
                    _ => (0, file_size),
                };

                // Opened for HEAD too, so both report the same status
                let reader = open_range(file_path, start, length).await?;
                served.content_length = Some(length);
                if !req.head {
                    served.body = FileBody::File(reader);
                }
            }
            Representation::Precompressed {
                path: sibling,
                size,
                algorithm,
            } => {
                tracing::debug!(
                    "✅ Using pre-compressed file: {} ({})",
                    sibling.display(),
                    algorithm.encoding()
                );
                let reader = open_range(&sibling, 0, size).await?;
                served.content_length = Some(size);
                if !req.head {
                    served.body = FileBody::File(reader);
                }
            }
            Representation::Compressed(algorithm) => {
                if req.head {
                    File::open(file_path).await?;
                    // Compressed length is unknown without doing the work
                    served.content_length = None;
                } else {
                    let content = tokio::fs::read(file_path).await?;
                    served = served.with_bytes(algorithm.compress(&content).await?, false);
                }
            }
        }

        Ok(served)
    }

    /// Pick a precompressed sibling or on-the-fly compression, in the
    /// client's accepted order
    async fn choose_representation(
        &self,
        file_path: &Path,
        mime_type: &str,
        file_size: u64,
        accept_encoding: Option<&str>,
    ) -> Representation {
        let Some(accept) = accept_encoding else {
            return Representation::Identity;
        };

        if self.config.precompressed {
            for algorithm in Algorithm::accepted(accept) {
                let mut sibling = file_path.as_os_str().to_owned();
                sibling.push(algorithm.extension());
                let sibling = PathBuf::from(sibling);

                let Ok(meta) = tokio::fs::metadata(&sibling).await else {
                    continue;
                };
                // A sibling outside the root is treated as absent
                if !meta.is_file() || self.ensure_within_root(&sibling).await.is_err() {
                    continue;
                }

                return Representation::Precompressed {
                    path: sibling,
                    size: meta.len(),
                    algorithm,
                };
            }
        }

        match self.negotiate_compression(mime_type, file_size, Some(accept)) {
            Some(algorithm) => Representation::Compressed(algorithm),
            None => Representation::Identity,
        }
    }

    fn negotiate_compression(
        &self,
        mime_type: &str,
        size: u64,
        accept_encoding: Option<&str>,
    ) -> Option<Algorithm> {
        if !self.config.compress
            || size > self.config.compress_max_bytes
            || !compress::is_compressible(mime_type)
        {
            return None;
        }
        accept_encoding.and_then(Algorithm::negotiate)
    }
}

async fn open_range(file_path: &Path, start: u64, length: u64) -> std::io::Result<Take<File>> {
    let mut file = File::open(file_path).await?;
    if start > 0 {
        file.seek(std::io::SeekFrom::Start(start)).await?;
    }
    Ok(file.take(length))
}

/// `If-None-Match` takes precedence over `If-Modified-Since`
fn is_not_modified(req: &FileRequest<'_>, etag: &str, modified: Option<SystemTime>) -> bool {
    if let Some(inm) = req.if_none_match {
        return inm
            .split(',')
            .map(|t| t.trim().trim_start_matches("W/"))
            .any(|t| t == "*" || t == etag);
    }

    let (Some(ims), Some(modified)) = (req.if_modified_since, modified) else {
        return false;
    };
    let Ok(since) = httpdate::parse_http_date(ims) else {
        return false;
    };

    // HTTP dates have whole-second resolution
    let modified_secs = modified
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let since_secs = since
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    modified_secs <= since_secs
}

/// Parse Range header (bytes=start-end, bytes=start-, bytes=-suffix)
fn parse_range(header: &str, file_size: u64) -> RangeSpec {
    let Some(val) = header.trim().strip_prefix("bytes=") else {
        return RangeSpec::Ignored;
    };
    if val.contains(',') {
        return RangeSpec::Ignored;
    }
    let Some((start_str, end_str)) = val.split_once('-') else {
        return RangeSpec::Ignored;
    };
    let (start_str, end_str) = (start_str.trim(), end_str.trim());

    if start_str.is_empty() {
        // Suffix range: the last N bytes
        let Ok(suffix) = end_str.parse::<u64>() else {
            return RangeSpec::Ignored;
        };
        if suffix == 0 || file_size == 0 {
            return RangeSpec::Unsatisfiable;
        }
        let start = file_size.saturating_sub(suffix);
        return RangeSpec::Satisfiable(start, file_size - 1);
    }

    let Ok(start) = start_str.parse::<u64>() else {
        return RangeSpec::Ignored;
    };
    let end = if end_str.is_empty() {
        u64::MAX
    } else {
        match end_str.parse::<u64>() {
            Ok(e) => e,
            Err(_) => return RangeSpec::Ignored,
        }
    };

    if start > end {
        return RangeSpec::Ignored;
    }
    if start >= file_size {
        return RangeSpec::Unsatisfiable;
    }

    RangeSpec::Satisfiable(start, end.min(file_size - 1))
}
