//! Fancy directory index
//!
//! Renders an HTML table of a directory's immediate children with name,
//! modification time and size columns. The sort column and direction
//! come from the query string: `N`, `M` or `S` set to `A` (ascending)
//! or `D` (descending), e.g. `?S=D` for largest first.

use std::cmp::Ordering;
use std::path::Path;
use std::time::SystemTime;

use glob::Pattern;
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};

use crate::path::is_hidden;

/// Characters escaped in listing hrefs
const HREF: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// One row of the listing
#[derive(Debug, Clone)]
pub struct Entry {
    pub name: String,
    pub is_dir: bool,
    pub modified: Option<SystemTime>,
    /// `None` for directories
    pub size: Option<u64>,
}

/// Column to sort by
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Name,
    Modified,
    Size,
}

impl SortKey {
    fn param(&self) -> &'static str {
        match self {
            SortKey::Name => "N",
            SortKey::Modified => "M",
            SortKey::Size => "S",
        }
    }
}

/// Sort order requested through the query string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortOrder {
    pub key: SortKey,
    pub descending: bool,
}

impl Default for SortOrder {
    fn default() -> Self {
        Self {
            key: SortKey::Name,
            descending: false,
        }
    }
}

impl SortOrder {
    /// Parse `N=A`, `M=D`, ... from a query string. The first recognised
    /// pair wins; anything else falls back to name ascending.
    pub fn from_query(query: Option<&str>) -> Self {
        let Some(query) = query else {
            return Self::default();
        };

        for pair in query.split('&') {
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            let key = match k {
                "N" => SortKey::Name,
                "M" => SortKey::Modified,
                "S" => SortKey::Size,
                _ => continue,
            };
            let descending = match v {
                "A" => false,
                "D" => true,
                _ => continue,
            };
            return Self { key, descending };
        }

        Self::default()
    }

    /// Query string for a column header link: flips the direction of the
    /// active column, ascending for the others
    fn header_query(&self, key: SortKey) -> String {
        let dir = if key == self.key && !self.descending { "D" } else { "A" };
        format!("?{}={}", key.param(), dir)
    }

    fn compare(&self, a: &Entry, b: &Entry) -> Ordering {
        let ord = match self.key {
            SortKey::Name => a.name.cmp(&b.name),
            SortKey::Modified => a.modified.cmp(&b.modified),
            SortKey::Size => a.size.cmp(&b.size),
        }
        .then_with(|| a.name.cmp(&b.name));

        if self.descending { ord.reverse() } else { ord }
    }
}

/// Read the immediate children of `dir`, skipping hidden names
pub async fn read_entries(dir: &Path, hidden: &[Pattern]) -> std::io::Result<Vec<Entry>> {
    let mut entries = Vec::new();
    let mut read_dir = tokio::fs::read_dir(dir).await?;

    while let Some(entry) = read_dir.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if is_hidden(&name, hidden) {
            continue;
        }

        // Follow symlinks for the row, but keep dangling ones listed
        let metadata = match tokio::fs::metadata(entry.path()).await {
            Ok(m) => Some(m),
            Err(_) => entry.metadata().await.ok(),
        };
        let is_dir = metadata.as_ref().is_some_and(|m| m.is_dir());

        entries.push(Entry {
            name,
            is_dir,
            modified: metadata.as_ref().and_then(|m| m.modified().ok()),
            size: metadata.filter(|m| !m.is_dir()).map(|m| m.len()),
        });
    }

    Ok(entries)
}

/// Render the listing page for `display_path` (already percent-decoded)
pub fn render(display_path: &str, mut entries: Vec<Entry>, order: SortOrder) -> String {
    entries.sort_by(|a, b| order.compare(a, b));

    let title = escape_html(display_path);
    let mut html = format!(
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>Index of {title}</title></head>\n\
         <body>\n<h1>Index of {title}</h1>\n<table>\n<tr>\
         <th><a href=\"{}\">Name</a></th>\
         <th><a href=\"{}\">Last modified</a></th>\
         <th><a href=\"{}\">Size</a></th></tr>\n<tr><td colspan=\"3\"><hr></td></tr>\n",
        order.header_query(SortKey::Name),
        order.header_query(SortKey::Modified),
        order.header_query(SortKey::Size),
    );

    if display_path != "/" {
        html.push_str("<tr><td><a href=\"..\">Parent Directory</a></td><td></td><td align=\"right\">-</td></tr>\n");
    }

    for entry in &entries {
        let suffix = if entry.is_dir { "/" } else { "" };
        // `./` keeps names like `javascript:x` from being read as a scheme
        let encoded = utf8_percent_encode(&entry.name, HREF);
        let href = escape_html(&format!("./{}{}", encoded, suffix));
        let modified = entry
            .modified
            .map(httpdate::fmt_http_date)
            .unwrap_or_default();
        let size = entry.size.map(format_size).unwrap_or_else(|| "-".to_string());

        html.push_str(&format!(
            "<tr><td><a href=\"{}\">{}{}</a></td><td>{}</td><td align=\"right\">{}</td></tr>\n",
            href,
            escape_html(&entry.name),
            suffix,
            modified,
            size
        ));
    }

    html.push_str("<tr><td colspan=\"3\"><hr></td></tr>\n</table>\n</body></html>\n");
    html
}

/// Compact size column: bytes below 1K, then K/M/G with one decimal
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 3] = ["K", "M", "G"];

    if bytes < 1024 {
        return bytes.to_string();
    }

    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1}{}", value, UNITS[unit])
}

/// Escape text for HTML element and attribute content
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
