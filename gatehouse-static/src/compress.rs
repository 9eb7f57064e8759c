//! Compression support

use async_compression::tokio::write::{BrotliEncoder, GzipEncoder, ZstdEncoder};
use tokio::io::AsyncWriteExt;

/// Supported compression algorithms, in order of preference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    Brotli,
    Zstd,
    Gzip,
}

impl Algorithm {
    const PREFERENCE: [Algorithm; 3] = [Algorithm::Brotli, Algorithm::Zstd, Algorithm::Gzip];

    /// Get the content-encoding header value
    pub fn encoding(&self) -> &'static str {
        match self {
            Algorithm::Brotli => "br",
            Algorithm::Zstd => "zstd",
            Algorithm::Gzip => "gzip",
        }
    }

    /// File extension of a precompressed sibling
    pub fn extension(&self) -> &'static str {
        match self {
            Algorithm::Brotli => ".br",
            Algorithm::Zstd => ".zst",
            Algorithm::Gzip => ".gz",
        }
    }

    /// Algorithms the client accepts, best first.
    ///
    /// Honours `q=0` exclusions and the `*` wildcard; other q-values only
    /// gate acceptance, server preference (br > zstd > gzip) decides order.
    pub fn accepted(accept_encoding: &str) -> Vec<Algorithm> {
        let mut wildcard = false;
        let mut accepted = Vec::new();
        let mut refused = Vec::new();

        for item in accept_encoding.split(',') {
            let mut parts = item.split(';');
            let coding = parts.next().unwrap_or("").trim().to_ascii_lowercase();
            let zero_q = parts.any(|p| {
                p.trim()
                    .strip_prefix("q=")
                    .and_then(|q| q.trim().parse::<f32>().ok())
                    .is_some_and(|q| q <= 0.0)
            });

            let target = if zero_q { &mut refused } else { &mut accepted };
            match coding.as_str() {
                "*" if !zero_q => wildcard = true,
                "br" => target.push(Algorithm::Brotli),
                "zstd" => target.push(Algorithm::Zstd),
                "gzip" | "x-gzip" => target.push(Algorithm::Gzip),
                _ => {}
            }
        }

        Self::PREFERENCE
            .into_iter()
            .filter(|a| !refused.contains(a) && (wildcard || accepted.contains(a)))
            .collect()
    }

    /// Best algorithm the client accepts
    pub fn negotiate(accept_encoding: &str) -> Option<Algorithm> {
        Self::accepted(accept_encoding).into_iter().next()
    }

    /// Compress `input` in memory
    pub async fn compress(&self, input: &[u8]) -> std::io::Result<Vec<u8>> {
        match self {
            Algorithm::Brotli => {
                let mut encoder = BrotliEncoder::new(Vec::new());
                encoder.write_all(input).await?;
                encoder.shutdown().await?;
                Ok(encoder.into_inner())
            }
            Algorithm::Zstd => {
                let mut encoder = ZstdEncoder::new(Vec::new());
                encoder.write_all(input).await?;
                encoder.shutdown().await?;
                Ok(encoder.into_inner())
            }
            Algorithm::Gzip => {
                let mut encoder = GzipEncoder::new(Vec::new());
                encoder.write_all(input).await?;
                encoder.shutdown().await?;
                Ok(encoder.into_inner())
            }
        }
    }
}

/// Whether compressing a body of this type is worth it
pub fn is_compressible(mime_type: &str) -> bool {
    let essence = mime_type.split(';').next().unwrap_or("").trim();
    essence.starts_with("text/")
        || essence.ends_with("+json")
        || essence.ends_with("+xml")
        || matches!(
            essence,
            "application/json"
                | "application/javascript"
                | "application/xml"
                | "application/wasm"
                | "image/svg+xml"
        )
}
