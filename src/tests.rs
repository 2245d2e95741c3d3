use crate::config::Config;
use crate::convert::Converter;
use crate::error::{AppError, Result};
use crate::server::{AppState, create_router};
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use http_body_util::BodyExt;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, SystemTime};
use tempfile::TempDir;
use tower::ServiceExt;

struct FakeConverter {
    calls: AtomicUsize,
    fail: bool,
}

impl Converter for FakeConverter {
    fn convert(&self, source: &Path, destination: &Path) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            std::fs::write(destination, b"PARTIAL-OUTPUT")?;
            return Err(AppError::Conversion("converter crashed".to_string()));
        }
        let mut out = b"converted:".to_vec();
        out.extend(std::fs::read(source)?);
        std::fs::write(destination, out)?;
        Ok(())
    }
}

struct Fixture {
    _books: TempDir,
    cache: TempDir,
    app: Router,
    converter: Arc<FakeConverter>,
}

fn touch(path: &Path, content: &str, age_secs: u64) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
    let file = std::fs::File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::now() - Duration::from_secs(age_secs))
        .unwrap();
}

fn fixture() -> Fixture {
    fixture_with(false)
}

/// a.txt (oldest), b.txt, sub/c.txt (newest) and x.epub.
fn fixture_with(failing_converter: bool) -> Fixture {
    let books = TempDir::new().unwrap();
    let cache = TempDir::new().unwrap();

    touch(&books.path().join("a.txt"), "alpha", 300);
    touch(&books.path().join("b.txt"), "bravo", 200);
    touch(&books.path().join("sub/c.txt"), "charlie", 100);
    touch(&books.path().join("x.epub"), "epub bytes", 400);

    let mut config = Config::default();
    config.server.base_url = Some("http://shelf.test:8080/".to_string());
    config.library.root = books.path().to_path_buf();
    config.cache.dir = cache.path().to_path_buf();

    let converter = Arc::new(FakeConverter {
        calls: AtomicUsize::new(0),
        fail: failing_converter,
    });
    let state = AppState::new(config, converter.clone()).unwrap();

    Fixture {
        _books: books,
        cache,
        app: create_router(state),
        converter,
    }
}

async fn get(app: &Router, uri: &str, accept: Option<&str>) -> (StatusCode, Option<String>, String) {
    let mut request = Request::builder().uri(uri);
    if let Some(accept) = accept {
        request = request.header(header::ACCEPT, accept);
    }
    let response = app
        .clone()
        .oneshot(request.body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .map(|v| v.to_str().unwrap().to_string());
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (
        status,
        content_type,
        String::from_utf8_lossy(&bytes).into_owned(),
    )
}

const HTML: Option<&str> = Some("text/html,application/xhtml+xml");
const ANY: Option<&str> = Some("*/*");

#[tokio::test]
async fn root_is_feed_for_readers_and_page_for_browsers() {
    let fx = fixture();

    let (status, content_type, body) = get(&fx.app, "/", ANY).await;
    assert_eq!(status, StatusCode::OK);
    assert!(content_type.unwrap().contains("kind=navigation"));
    assert!(body.contains("<feed"));
    assert!(body.contains("http://shelf.test:8080/file/"));

    let (status, content_type, body) = get(&fx.app, "/", HTML).await;
    assert_eq!(status, StatusCode::OK);
    assert!(content_type.unwrap().starts_with("text/html"));
    assert!(body.contains("<!DOCTYPE html>"));
}

#[tokio::test]
async fn recent_lists_newest_first_and_honours_count() {
    let fx = fixture();

    let (status, _, body) = get(&fx.app, "/recent?n=2", HTML).await;
    assert_eq!(status, StatusCode::OK);
    let c = body.find("c.txt").unwrap();
    let b = body.find("b.txt").unwrap();
    assert!(c < b);
    assert!(!body.contains("a.txt"));
    assert!(!body.contains("x.epub"));
}

#[tokio::test]
async fn recent_bad_count_falls_back_to_default() {
    let fx = fixture();

    let (status, content_type, body) = get(&fx.app, "/recent?n=-3", ANY).await;
    assert_eq!(status, StatusCode::OK);
    assert!(content_type.unwrap().contains("kind=acquisition"));
    for name in ["a.txt", "b.txt", "c.txt", "x.epub"] {
        assert!(body.contains(name), "missing {}", name);
    }
}

#[tokio::test]
async fn browse_lists_directories_first() {
    let fx = fixture();

    let (status, _, body) = get(&fx.app, "/file/", HTML).await;
    assert_eq!(status, StatusCode::OK);
    let sub = body.find("sub/").unwrap();
    let a = body.find("a.txt").unwrap();
    assert!(sub < a);

    let (status, _, body) = get(&fx.app, "/file/sub/", ANY).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("http://shelf.test:8080/epub/sub/c.txt"));
}

#[tokio::test]
async fn convert_on_demand_is_cached() {
    let fx = fixture();

    let response = fx
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/epub/sub/c.txt")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(headers[header::CONTENT_TYPE], "application/epub+zip");
    assert!(
        headers[header::CONTENT_DISPOSITION]
            .to_str()
            .unwrap()
            .contains("filename=\"c.epub\"")
    );
    assert_eq!(headers[header::CACHE_CONTROL], "no-cache, must-revalidate");
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], b"converted:charlie");

    let (status, _, body) = get(&fx.app, "/epub/sub/c.txt", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "converted:charlie");
    assert_eq!(fx.converter.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failed_conversion_is_server_error_without_partial_output() {
    let fx = fixture_with(true);

    let (status, _, body) = get(&fx.app, "/epub/sub/c.txt", None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, "Conversion failed");
    assert!(!body.contains("PARTIAL"));

    let leftovers: Vec<_> = walkdir::WalkDir::new(fx.cache.path())
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .collect();
    assert!(leftovers.is_empty(), "{:?}", leftovers);

    // The failure is not cached: the next request tries again.
    let (status, _, _) = get(&fx.app, "/epub/sub/c.txt", None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(fx.converter.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn same_format_and_raw_skip_conversion() {
    let fx = fixture();

    let (status, content_type, body) = get(&fx.app, "/epub/x.epub", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some("application/epub+zip"));
    assert_eq!(body, "epub bytes");

    let (status, content_type, body) = get(&fx.app, "/file/a.txt", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some("text/plain"));
    assert_eq!(body, "alpha");

    assert_eq!(fx.converter.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn escaping_the_root_is_not_found() {
    let fx = fixture();

    let (status, _, body) = get(&fx.app, "/file/../../etc/passwd", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, "Not Found");

    let (status, _, _) = get(&fx.app, "/file/%2e%2e/%2e%2e/etc/passwd", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_routes_are_not_found() {
    let fx = fixture();

    for uri in ["/nope/a.txt", "/file/missing.txt", "/pdf/a.txt"] {
        let (status, _, _) = get(&fx.app, uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{}", uri);
    }
    assert_eq!(fx.converter.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn search_matches_paths_and_requires_a_term() {
    let fx = fixture();

    let (status, content_type, body) = get(&fx.app, "/opds/search?q=SUB", ANY).await;
    assert_eq!(status, StatusCode::OK);
    assert!(content_type.unwrap().contains("kind=acquisition"));
    assert!(body.contains("c.txt"));
    assert!(!body.contains("a.txt"));

    let (status, _, body) = get(&fx.app, "/search?q=zzz", HTML).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("0 entries"));

    let (status, _, _) = get(&fx.app, "/opds/search", ANY).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn opensearch_description_points_at_feed_search() {
    let fx = fixture();

    let (status, content_type, body) = get(&fx.app, "/search-metadata.xml", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        content_type.as_deref(),
        Some("application/opensearchdescription+xml")
    );
    assert!(body.contains("http://shelf.test:8080/opds/search?q={searchTerms}"));
}

#[test]
fn config_parse_toml() {
    let toml = r#"
[server]
bind = "127.0.0.1:9090"
title = "Test Shelf"
base_url = "http://10.0.0.2:9090/"

[library]
root = "/srv/books"
recent_count = 20

[convert]
program = "/usr/bin/ebook-convert"
formats = ["epub", "MOBI"]
timeout_seconds = 60

[cache]
max_entries = 4
"#;
    let config = Config::parse(toml).unwrap();
    assert_eq!(config.server.bind.port(), 9090);
    assert_eq!(config.server.title, "Test Shelf");
    assert_eq!(config.base_url(), "http://10.0.0.2:9090");
    assert_eq!(config.library.recent_count, 20);
    assert_eq!(config.convert.formats, vec!["epub", "MOBI"]);
    assert_eq!(config.convert.timeout_seconds, 60);
    assert_eq!(config.cache.max_entries, 4);
}

#[test]
fn config_default_values() {
    let config = Config::default();
    assert_eq!(config.server.bind.port(), 8080);
    assert_eq!(config.library.recent_count, 50);
    assert_eq!(config.convert.program, "ebook-convert");
    assert_eq!(config.cache.max_entries, 32);
    assert!(config.server.base_url.is_none());
}

#[test]
fn config_default_file_parses() {
    let config = Config::parse(&Config::generate_default()).unwrap();
    assert_eq!(config.base_url(), "http://192.168.1.10:8080");
}

#[test]
fn config_validate_rejects_missing_pieces() {
    let books = TempDir::new().unwrap();
    let mut config = Config::default();
    config.library.root = books.path().to_path_buf();

    assert!(matches!(config.validate(), Err(AppError::Config(_))));

    config.server.base_url = Some("http://h".to_string());
    assert!(config.validate().is_ok());

    config.convert.formats = vec!["epub".to_string(), "fb2.zip".to_string()];
    assert!(config.validate().is_ok());

    for bad in ["ep/ub", "", ".zip", "fb2.", "fb2..zip"] {
        config.convert.formats = vec![bad.to_string()];
        assert!(config.validate().is_err(), "{:?}", bad);
    }

    config.convert.formats = vec!["epub".to_string()];
    config.library.root = books.path().join("missing");
    assert!(config.validate().is_err());
}
