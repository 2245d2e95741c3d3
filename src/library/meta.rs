//! Filename-based metadata guesses. Nothing here opens a file.

use crate::error::{AppError, Result};
use std::path::Path;

/// Fallback MIME type for unknown extensions.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Extension to MIME type table. Extensions are lowercase, without the dot.
const MIME_TYPES: &[(&str, &str)] = &[
    // Comics
    ("cbr", "application/x-cbr"),
    ("cbt", "application/vnd.comicbook+tar"),
    ("cb7", "application/x-7z-compressed"),
    ("cbz", "application/x-cbz"),
    // Ebooks
    ("epub", "application/epub+zip"),
    ("epub3", "application/epub+zip"),
    ("fb2", "text/fb2+xml"),
    ("fb2.zip", "application/x-zip-compressed-fb2"),
    ("fb3", "text/fb3"),
    ("mobi", "application/x-mobipocket-ebook"),
    ("txt", "text/plain"),
    ("rtf", "application/rtf"),
    ("doc", "application/msword"),
    (
        "docx",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    ),
    ("chm", "application/vnd.ms-htmlhelp"),
    ("pdb", "application/vnd.palm"),
    ("prc", "application/vnd.palm"),
    ("azw", "application/vnd.amazon.ebook"),
    ("kf7", "application/vnd.amazon.ebook"),
    ("azw3", "application/vnd.amazon.mobi8-ebook"),
    ("kfx", "application/vnd.amazon.mobi8-ebook"),
    ("azw8", "application/vnd.amazon.mobi8-ebook"),
    ("djv", "image/vnd.djvu"),
    ("djvu", "image/vnd.djvu"),
    ("htm", "text/html"),
    ("html", "text/html"),
    ("pdf", "application/pdf"),
    ("xhtml", "application/xhtml+xml"),
    // Images
    ("gif", "image/gif"),
    ("j2k", "image/jp2"),
    ("jp2", "image/jp2"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
    ("svg", "image/svg+xml"),
    ("tif", "image/tiff"),
    ("tiff", "image/tiff"),
    ("webp", "image/webp"),
];

/// Lowercase extension of `filename` without the leading dot.
pub fn file_extension(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
}

/// MIME type for a format tag such as `"epub"`.
pub fn mime_for_extension(extension: &str) -> &'static str {
    let extension = extension.to_lowercase();
    MIME_TYPES
        .iter()
        .find(|(ext, _)| *ext == extension)
        .map(|(_, mime)| *mime)
        .unwrap_or(OCTET_STREAM)
}

/// Guess the MIME type from the file name alone.
///
/// Compound extensions such as `fb2.zip` win over the final extension.
pub fn guess_mime_type(filename: &str) -> &'static str {
    let compound = MIME_TYPES
        .iter()
        .filter(|(ext, _)| ext.contains('.'))
        .find(|(ext, _)| has_format(filename, ext))
        .map(|(_, mime)| *mime);

    compound.unwrap_or_else(|| {
        file_extension(filename)
            .map(|ext| mime_for_extension(&ext))
            .unwrap_or(OCTET_STREAM)
    })
}

/// Whether `filename` already carries `format` as its (possibly compound)
/// extension, ignoring case.
pub fn has_format(filename: &str, format: &str) -> bool {
    let name = filename.to_lowercase();
    let suffix = format!(".{}", format.to_lowercase());
    name.len() > suffix.len() && name.ends_with(&suffix)
}

/// Display title: the base name without its final extension.
///
/// Readers such as KOReader build the saved file name from the title and
/// append their own extension, so the extension must not be part of it.
pub fn guess_title(filename: &str) -> String {
    Path::new(filename)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Author guess. Always empty: authors are not derived from file names or contents.
pub fn guess_author(_filename: &str) -> String {
    String::new()
}

/// Size in bytes, read from disk on every call.
///
/// For callers holding only a path. Listings and walks already have the
/// metadata at hand and read the length from it instead.
pub fn file_size(path: &Path) -> Result<u64> {
    match std::fs::metadata(path) {
        Ok(metadata) => Ok(metadata.len()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(AppError::NotFound(path.display().to_string()))
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mime_type_from_extension() {
        assert_eq!(guess_mime_type("book.epub"), "application/epub+zip");
        assert_eq!(guess_mime_type("BOOK.EPUB"), "application/epub+zip");
        assert_eq!(guess_mime_type("dir/x.mobi"), "application/x-mobipocket-ebook");
        assert_eq!(guess_mime_type("notes.txt"), "text/plain");
        assert_eq!(
            guess_mime_type("Book.FB2.zip"),
            "application/x-zip-compressed-fb2"
        );
    }

    #[test]
    fn format_suffix_matching() {
        assert!(has_format("Dune.EPUB", "epub"));
        assert!(has_format("Book.fb2.zip", "fb2.zip"));
        assert!(!has_format("Book.fb2.zip", "fb2"));
        assert!(!has_format("a.txt", "epub"));
        assert!(!has_format(".epub", "epub"));
    }

    #[test]
    fn mime_type_fallback() {
        assert_eq!(guess_mime_type("archive.xyz"), OCTET_STREAM);
        assert_eq!(guess_mime_type("README"), OCTET_STREAM);
        assert_eq!(guess_mime_type(""), OCTET_STREAM);
    }

    #[test]
    fn title_strips_final_extension_only() {
        assert_eq!(guess_title("Dune.epub"), "Dune");
        assert_eq!(guess_title("sub/Book.fb2.zip"), "Book.fb2");
        assert_eq!(guess_title("noext"), "noext");
    }

    #[test]
    fn author_is_empty() {
        assert_eq!(guess_author("Frank Herbert - Dune.epub"), "");
    }

    #[test]
    fn extension_lowercased() {
        assert_eq!(file_extension("a.PDF").as_deref(), Some("pdf"));
        assert_eq!(file_extension("a"), None);
    }

    #[test]
    fn file_size_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("gone.epub");
        assert!(matches!(file_size(&missing), Err(AppError::NotFound(_))));

        std::fs::write(&missing, b"12345").unwrap();
        assert_eq!(file_size(&missing).unwrap(), 5);
    }
}
