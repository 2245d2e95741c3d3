//! File delivery: serve as stored or through the conversion cache.

use crate::error::{AppError, Result};
use crate::library::{CatalogPath, meta};
use crate::routes::DeliveryTag;
use crate::server::AppState;
use axum::{
    body::Body,
    http::{StatusCode, header},
    response::Response,
};
use std::path::Path;
use tokio_util::io::ReaderStream;

/// Listing and delivery responses must not be cached by readers.
pub const NO_CACHE: &str = "no-cache, must-revalidate";

/// What to do with a requested file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Plan {
    /// Serve the source file untouched.
    Direct,
    /// Convert to this format first.
    Convert(String),
}

/// Decide between direct delivery and conversion.
pub fn plan(source: &Path, tag: &DeliveryTag) -> Plan {
    match tag {
        DeliveryTag::Raw => Plan::Direct,
        DeliveryTag::Format(format) => {
            let name = source
                .file_name()
                .map(|n| n.to_string_lossy())
                .unwrap_or_default();
            if meta::has_format(&name, format) {
                Plan::Direct
            } else {
                Plan::Convert(format.clone())
            }
        }
    }
}

/// Download name for a converted file: stem plus the new extension.
pub fn converted_name(source_name: &str, format: &str) -> String {
    format!("{}.{}", meta::guess_title(source_name), format)
}

/// `Content-Disposition` with an ASCII fallback name and an RFC 5987
/// `filename*` carrying the full UTF-8 name.
pub fn content_disposition(filename: &str) -> String {
    let fallback: String = filename
        .chars()
        .map(|c| {
            if (c.is_ascii_graphic() && c != '"' && c != '\\') || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect();

    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback,
        urlencoding::encode(filename)
    )
}

/// Current time as an HTTP date.
///
/// Used for `Last-Modified` on every response, not the file's mtime.
pub fn http_date_now() -> String {
    chrono::Utc::now()
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}

/// Serve a resolved file, converting it if `tag` asks for another format.
pub async fn deliver(
    state: &AppState,
    path: &CatalogPath,
    tag: &DeliveryTag,
) -> Result<Response<Body>> {
    let source = &path.absolute;
    let source_name = path.file_name();

    let (file, filename) = match plan(source, tag) {
        Plan::Direct => {
            tracing::info!(path = %path.relative, "Serving file");
            let file = match tokio::fs::File::open(source).await {
                Ok(f) => f,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return Err(AppError::NotFound(path.relative.clone()));
                }
                Err(e) => return Err(e.into()),
            };
            (file, source_name.to_string())
        }
        Plan::Convert(format) => {
            tracing::info!(path = %path.relative, format = %format, "Serving converted file");
            let artifact = state.cache.ensure(source, &format).await?;
            (
                tokio::fs::File::from_std(artifact.file),
                converted_name(source_name, &format),
            )
        }
    };

    let length = file.metadata().await?.len();
    let body = Body::from_stream(ReaderStream::new(file));

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, meta::guess_mime_type(&filename))
        .header(header::CONTENT_DISPOSITION, content_disposition(&filename))
        .header(header::CONTENT_LENGTH, length)
        .header(header::CACHE_CONTROL, NO_CACHE)
        .header(header::LAST_MODIFIED, http_date_now())
        .body(body)
        .unwrap_or_else(|_| Response::default()))
}
