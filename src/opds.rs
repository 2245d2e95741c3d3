//! OPDS catalog generation.

use crate::library::CatalogEntry;
use crate::routes::{self, Acquisition};
use chrono::{DateTime, Utc};
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use std::io::Cursor;

/// Acquisition feed content type.
pub const ACQUISITION_MIME: &str = "application/atom+xml;profile=opds-catalog;kind=acquisition";
/// Navigation feed content type.
pub const NAVIGATION_MIME: &str = "application/atom+xml;profile=opds-catalog;kind=navigation";
/// OpenSearch description content type.
pub const OPENSEARCH_MIME: &str = "application/opensearchdescription+xml";

const ACQUISITION_REL: &str = "http://opds-spec.org/acquisition";

/// OPDS feed link.
#[derive(Debug, Clone)]
pub struct Link {
    /// Link relation type (e.g., "self", "subsection", "acquisition").
    pub rel: String,
    /// URL of the linked resource.
    pub href: String,
    /// MIME type of the linked resource.
    pub link_type: String,
    /// Optional title for the link.
    pub title: Option<String>,
}

/// OPDS feed entry.
#[derive(Debug, Clone)]
pub struct Entry {
    /// Unique identifier for the entry.
    pub id: String,
    /// Entry title.
    pub title: String,
    /// Last update timestamp.
    pub updated: DateTime<Utc>,
    /// Authors list.
    pub authors: Vec<String>,
    /// Short summary text.
    pub summary: Option<String>,
    /// Links associated with this entry.
    pub links: Vec<Link>,
}

/// OPDS feed builder.
pub struct FeedBuilder {
    id: String,
    title: String,
    updated: DateTime<Utc>,
    base_url: String,
    links: Vec<Link>,
    entries: Vec<Entry>,
}

impl FeedBuilder {
    /// Create a new feed builder. Links are resolved against `base_url`.
    pub fn new(id: impl Into<String>, title: impl Into<String>, base_url: &str) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            updated: Utc::now(),
            base_url: base_url.to_string(),
            links: Vec::new(),
            entries: Vec::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Add the start and search links every feed carries.
    pub fn standard_links(mut self) -> Self {
        self.links.push(Link {
            rel: "start".to_string(),
            href: self.url("/"),
            link_type: NAVIGATION_MIME.to_string(),
            title: None,
        });
        self.links.push(Link {
            rel: "search".to_string(),
            href: self.url(routes::SEARCH_METADATA),
            link_type: OPENSEARCH_MIME.to_string(),
            title: Some("Catalog Search".to_string()),
        });
        self
    }

    /// Add a self link.
    pub fn self_link(mut self, path: &str, link_type: &str) -> Self {
        self.links.push(Link {
            rel: "self".to_string(),
            href: self.url(path),
            link_type: link_type.to_string(),
            title: None,
        });
        self
    }

    /// Add a navigation entry pointing at another feed.
    pub fn navigation_entry(mut self, id: &str, title: &str, summary: &str, path: &str) -> Self {
        let entry = Entry {
            id: id.to_string(),
            title: title.to_string(),
            updated: Utc::now(),
            authors: Vec::new(),
            summary: Some(summary.to_string()),
            links: vec![Link {
                rel: "subsection".to_string(),
                href: self.url(path),
                link_type: ACQUISITION_MIME.to_string(),
                title: Some(title.to_string()),
            }],
        };
        self.entries.push(entry);
        self
    }

    /// Add a directory or file entry.
    pub fn catalog_entry(self, entry: &CatalogEntry, formats: &[String]) -> Self {
        if entry.is_dir() {
            let title = format!("{}/", entry.name);
            let path = routes::browse_href(&entry.relative);
            self.navigation_entry(&entry.relative, &title, &entry.relative, &path)
        } else {
            self.file_entry(entry, &routes::acquisitions(entry, formats))
        }
    }

    fn file_entry(mut self, entry: &CatalogEntry, acquisitions: &[Acquisition]) -> Self {
        let links = acquisitions
            .iter()
            .map(|a| Link {
                rel: ACQUISITION_REL.to_string(),
                href: self.url(&a.href),
                link_type: a.mime_type.to_string(),
                title: Some(a.label.clone()),
            })
            .collect();

        let summary = entry.size.map(|s| format!("{} bytes", s));
        self.entries.push(Entry {
            id: entry.relative.clone(),
            title: entry.title.clone(),
            updated: entry.modified,
            // Readers expect an author element even when it is empty.
            authors: vec![entry.author.clone()],
            summary,
            links,
        });
        self
    }

    /// Build the XML feed.
    pub fn build(self) -> String {
        let mut writer = Writer::new(Cursor::new(Vec::new()));

        // XML declaration - writing to Vec can't fail
        let _ = writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)));

        let mut feed = BytesStart::new("feed");
        feed.push_attribute(("xmlns", "http://www.w3.org/2005/Atom"));
        feed.push_attribute(("xmlns:opds", "http://opds-spec.org/2010/catalog"));
        feed.push_attribute(("xmlns:dc", "http://purl.org/dc/terms/"));
        let _ = writer.write_event(Event::Start(feed));

        write_text_element(&mut writer, "id", &self.id);
        write_text_element(&mut writer, "title", &self.title);
        write_text_element(&mut writer, "updated", &self.updated.to_rfc3339());

        for link in &self.links {
            write_link(&mut writer, link);
        }

        for entry in &self.entries {
            write_entry(&mut writer, entry);
        }

        let _ = writer.write_event(Event::End(BytesEnd::new("feed")));

        String::from_utf8(writer.into_inner().into_inner()).unwrap_or_default()
    }
}

/// Write a simple text element.
fn write_text_element<W: std::io::Write>(writer: &mut Writer<W>, name: &str, text: &str) {
    let _ = writer.write_event(Event::Start(BytesStart::new(name)));
    let _ = writer.write_event(Event::Text(BytesText::new(text)));
    let _ = writer.write_event(Event::End(BytesEnd::new(name)));
}

/// Write a link element.
fn write_link<W: std::io::Write>(writer: &mut Writer<W>, link: &Link) {
    let mut elem = BytesStart::new("link");
    elem.push_attribute(("rel", link.rel.as_str()));
    elem.push_attribute(("href", link.href.as_str()));
    elem.push_attribute(("type", link.link_type.as_str()));
    if let Some(title) = &link.title {
        elem.push_attribute(("title", title.as_str()));
    }
    let _ = writer.write_event(Event::Empty(elem));
}

/// Write an entry element.
fn write_entry<W: std::io::Write>(writer: &mut Writer<W>, entry: &Entry) {
    let _ = writer.write_event(Event::Start(BytesStart::new("entry")));

    write_text_element(writer, "id", &entry.id);
    write_text_element(writer, "title", &entry.title);
    write_text_element(writer, "updated", &entry.updated.to_rfc3339());

    for author in &entry.authors {
        let _ = writer.write_event(Event::Start(BytesStart::new("author")));
        write_text_element(writer, "name", author);
        let _ = writer.write_event(Event::End(BytesEnd::new("author")));
    }

    if let Some(summary) = &entry.summary {
        let mut elem = BytesStart::new("summary");
        elem.push_attribute(("type", "text"));
        let _ = writer.write_event(Event::Start(elem));
        let _ = writer.write_event(Event::Text(BytesText::new(summary)));
        let _ = writer.write_event(Event::End(BytesEnd::new("summary")));
    }

    for link in &entry.links {
        write_link(writer, link);
    }

    let _ = writer.write_event(Event::End(BytesEnd::new("entry")));
}

/// Top-level navigation feed.
pub fn root_feed(title: &str, base_url: &str, recent_count: usize) -> String {
    FeedBuilder::new("/", title, base_url)
        .self_link("/", NAVIGATION_MIME)
        .standard_links()
        .navigation_entry("BROWSE", "Browse", "Browse the catalog by directory", "/file/")
        .navigation_entry(
            "RECENT",
            "Recent",
            &format!("The {} most recently modified files", recent_count),
            routes::RECENT,
        )
        .build()
}

/// Acquisition feed listing catalog entries.
pub fn listing_feed(
    id: &str,
    title: &str,
    self_path: &str,
    base_url: &str,
    entries: &[CatalogEntry],
    formats: &[String],
) -> String {
    entries
        .iter()
        .fold(
            FeedBuilder::new(id, title, base_url)
                .self_link(self_path, ACQUISITION_MIME)
                .standard_links(),
            |feed, entry| feed.catalog_entry(entry, formats),
        )
        .build()
}

/// Generate OpenSearch description XML.
pub fn generate_opensearch(title: &str, base_url: &str) -> String {
    let title = quick_xml::escape::escape(title);
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<OpenSearchDescription xmlns="http://a9.com/-/spec/opensearch/1.1/">
  <ShortName>{}</ShortName>
  <Description>Search the {} catalog</Description>
  <InputEncoding>UTF-8</InputEncoding>
  <OutputEncoding>UTF-8</OutputEncoding>
  <Url type="{}" template="{}{}?q={{searchTerms}}"/>
</OpenSearchDescription>"#,
        title,
        title,
        ACQUISITION_MIME,
        quick_xml::escape::escape(base_url),
        routes::FEED_SEARCH
    )
}
