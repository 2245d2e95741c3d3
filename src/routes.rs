//! URL layout: fixed paths, delivery tags and acquisition links.

use crate::library::{CatalogEntry, meta};

/// OpenSearch description document.
pub const SEARCH_METADATA: &str = "/search-metadata.xml";
/// Search returning an OPDS feed.
pub const FEED_SEARCH: &str = "/opds/search";
/// Search returning HTML.
pub const BROWSER_SEARCH: &str = "/search";
/// Recently modified files.
pub const RECENT: &str = "/recent";
/// Tag serving files unconverted.
pub const RAW_TAG: &str = "file";

/// First path segment of a delivery URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryTag {
    /// Serve the file as stored.
    Raw,
    /// Serve the file converted to this (lowercase) format.
    Format(String),
}

impl DeliveryTag {
    /// Parse a tag against the configured formats. Unknown tags give `None`.
    pub fn parse(tag: &str, formats: &[String]) -> Option<Self> {
        let tag = tag.to_lowercase();
        if tag == RAW_TAG {
            return Some(Self::Raw);
        }
        formats
            .iter()
            .any(|f| f.eq_ignore_ascii_case(&tag))
            .then_some(Self::Format(tag))
    }

    /// Tag as it appears in URLs.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Raw => RAW_TAG,
            Self::Format(f) => f,
        }
    }
}

/// Split `/<tag>/<rest>` into tag and (still encoded) rest.
pub fn split_delivery_path(path: &str) -> Option<(&str, &str)> {
    let path = path.strip_prefix('/')?;
    let (tag, rest) = path.split_once('/').unwrap_or((path, ""));
    (!tag.is_empty()).then_some((tag, rest))
}

/// Root-relative URL for `relative` under `tag`, each segment percent-encoded.
pub fn href(tag: &str, relative: &str) -> String {
    let encoded: Vec<_> = relative
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|s| urlencoding::encode(s).into_owned())
        .collect();
    format!("/{}/{}", tag, encoded.join("/"))
}

/// Root-relative URL of a directory listing (trailing slash).
pub fn browse_href(relative: &str) -> String {
    let href = href(RAW_TAG, relative);
    if href.ends_with('/') {
        href
    } else {
        href + "/"
    }
}

/// One way of downloading a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acquisition {
    /// Human-readable label.
    pub label: String,
    /// MIME type of what the link delivers.
    pub mime_type: &'static str,
    /// Root-relative URL.
    pub href: String,
}

/// Download options for a file: raw bytes, the original type, and every
/// configured conversion other than the file's own format.
pub fn acquisitions(entry: &CatalogEntry, formats: &[String]) -> Vec<Acquisition> {
    let raw = href(RAW_TAG, &entry.relative);

    let mut links = vec![
        Acquisition {
            label: "Raw".to_string(),
            mime_type: meta::OCTET_STREAM,
            href: raw.clone(),
        },
        Acquisition {
            label: "Original".to_string(),
            mime_type: entry.mime_type,
            href: raw,
        },
    ];

    links.extend(
        formats
            .iter()
            .map(|f| f.to_lowercase())
            .filter(|f| !meta::has_format(&entry.name, f))
            .map(|f| Acquisition {
                label: format!("{} convert", f.to_uppercase()),
                mime_type: meta::mime_for_extension(&f),
                href: href(&f, &entry.relative),
            }),
    );

    links
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::EntryKind;

    fn formats() -> Vec<String> {
        vec!["epub".to_string(), "mobi".to_string()]
    }

    #[test]
    fn parse_tags() {
        assert_eq!(DeliveryTag::parse("file", &formats()), Some(DeliveryTag::Raw));
        assert_eq!(
            DeliveryTag::parse("EPUB", &formats()),
            Some(DeliveryTag::Format("epub".to_string()))
        );
        assert_eq!(DeliveryTag::parse("pdf", &formats()), None);
        assert_eq!(
            DeliveryTag::parse("fb2.zip", &["fb2.zip".to_string()]),
            Some(DeliveryTag::Format("fb2.zip".to_string()))
        );
        assert_eq!(DeliveryTag::parse("", &formats()), None);
    }

    #[test]
    fn split_paths() {
        assert_eq!(
            split_delivery_path("/epub/sub/c.txt"),
            Some(("epub", "sub/c.txt"))
        );
        assert_eq!(split_delivery_path("/file"), Some(("file", "")));
        assert_eq!(split_delivery_path("/file/"), Some(("file", "")));
        assert_eq!(split_delivery_path("/"), None);
        assert_eq!(split_delivery_path("file"), None);
    }

    #[test]
    fn hrefs_encode_segments() {
        assert_eq!(
            href("epub", "My Books/Dune #1.txt"),
            "/epub/My%20Books/Dune%20%231.txt"
        );
        assert_eq!(browse_href(""), "/file/");
        assert_eq!(browse_href("a b"), "/file/a%20b/");
    }

    #[test]
    fn acquisitions_skip_own_format() {
        let entry = CatalogEntry {
            name: "Dune.epub".to_string(),
            relative: "sf/Dune.epub".to_string(),
            kind: EntryKind::File,
            title: "Dune".to_string(),
            author: String::new(),
            mime_type: "application/epub+zip",
            size: Some(1),
            modified: chrono::Utc::now(),
        };

        let links = acquisitions(&entry, &formats());
        let hrefs: Vec<_> = links.iter().map(|l| l.href.as_str()).collect();
        assert_eq!(
            hrefs,
            vec!["/file/sf/Dune.epub", "/file/sf/Dune.epub", "/mobi/sf/Dune.epub"]
        );
        assert_eq!(links[1].mime_type, "application/epub+zip");
        assert_eq!(links[2].mime_type, "application/x-mobipocket-ebook");
    }
}
