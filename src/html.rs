//! HTML pages for browsers, styled after a web server's auto-index.

use crate::library::CatalogEntry;
use crate::routes;
use quick_xml::escape::escape;

fn page(title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <title>{title}</title>
    <style>
        body {{ font-family: system-ui, sans-serif; max-width: 900px; margin: 2rem auto; padding: 0 1rem; }}
        a {{ color: #0066cc; }}
        td {{ padding: 0.2rem 0.8rem 0.2rem 0; vertical-align: top; }}
        .size {{ text-align: right; color: #666; }}
    </style>
</head>
<body>
{body}
</body>
</html>"#,
        title = escape(title),
        body = body,
    )
}

fn search_form() -> String {
    format!(
        r#"<form action="{}" method="get"><input type="search" name="q" placeholder="Search"> <input type="submit" value="Search"></form>"#,
        routes::BROWSER_SEARCH
    )
}

/// Top-level index.
pub fn root_page(title: &str, recent_count: usize) -> String {
    let body = format!(
        r#"<h1>{title}</h1>
{form}
<ul>
    <li><a href="/file/">Browse</a></li>
    <li><a href="{recent}">Recent ({count})</a></li>
    <li><a href="{meta}">OpenSearch Description</a></li>
</ul>
<p>E-readers: add this server's address as an OPDS catalog.</p>"#,
        title = escape(title),
        form = search_form(),
        recent = routes::RECENT,
        count = recent_count,
        meta = routes::SEARCH_METADATA,
    );
    page(title, &body)
}

/// Table of entries with a download link per acquisition.
pub fn listing_page(
    heading: &str,
    parent: Option<&str>,
    entries: &[CatalogEntry],
    formats: &[String],
) -> String {
    let mut rows = String::new();

    if let Some(parent) = parent {
        rows.push_str(&format!(
            "<tr><td><a href=\"{}\">../</a></td><td></td><td></td><td></td></tr>\n",
            escape(parent)
        ));
    }

    for entry in entries {
        let modified = entry.modified.format("%d-%b-%Y %H:%M");
        if entry.is_dir() {
            rows.push_str(&format!(
                "<tr><td><a href=\"{}\">{}/</a></td><td>{}</td><td class=\"size\">-</td><td></td></tr>\n",
                escape(&routes::browse_href(&entry.relative)),
                escape(&entry.name),
                modified,
            ));
        } else {
            let downloads: Vec<String> = routes::acquisitions(entry, formats)
                .iter()
                .skip(1)
                .map(|a| {
                    format!(
                        "<a href=\"{}\" type=\"{}\">{}</a>",
                        escape(&a.href),
                        a.mime_type,
                        escape(&a.label)
                    )
                })
                .collect();
            rows.push_str(&format!(
                "<tr><td><a href=\"{}\">{}</a></td><td>{}</td><td class=\"size\">{}</td><td>{}</td></tr>\n",
                escape(&routes::href(routes::RAW_TAG, &entry.relative)),
                escape(&entry.name),
                modified,
                entry.size.unwrap_or_default(),
                downloads.join(" | "),
            ));
        }
    }

    let body = format!(
        "<h1>{heading}</h1>\n{form}\n<hr>\n<table>\n{rows}</table>\n<hr>\n<p>{count} entries</p>",
        heading = escape(heading),
        form = search_form(),
        rows = rows,
        count = entries.len(),
    );
    page(heading, &body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::EntryKind;

    #[test]
    fn listing_escapes_names() {
        let entries = vec![CatalogEntry {
            name: "<x>&y.txt".to_string(),
            relative: "<x>&y.txt".to_string(),
            kind: EntryKind::File,
            title: "<x>&y".to_string(),
            author: String::new(),
            mime_type: "text/plain",
            size: Some(10),
            modified: chrono::Utc::now(),
        }];
        let html = listing_page("Index of /", Some("/file/"), &entries, &["epub".to_string()]);
        assert!(html.contains("&lt;x&gt;&amp;y.txt"));
        assert!(!html.contains("<x>"));
        assert!(html.contains("/epub/%3Cx%3E%26y.txt"));
        assert!(html.contains(">../</a>"));
    }

    #[test]
    fn root_page_links_browse_and_recent() {
        let html = root_page("Shelf", 50);
        assert!(html.contains(r#"href="/file/""#));
        assert!(html.contains(r#"href="/recent""#));
        assert!(html.contains(r#"action="/search""#));
    }
}
