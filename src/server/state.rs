//! Application state shared across handlers.

use crate::config::Config;
use crate::convert::{ConversionCache, Converter};
use crate::error::Result;
use crate::library::Library;
use std::sync::Arc;

/// Shared application state. Everything but the conversion cache is
/// read-only after startup.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<Config>,
    /// Catalog root.
    pub library: Library,
    /// Converted artifacts.
    pub cache: ConversionCache,
}

impl AppState {
    /// Open the catalog root and the artifact cache.
    pub fn new(config: Config, converter: Arc<dyn Converter>) -> Result<Self> {
        let library = Library::open(&config.library.root)?;
        let cache = ConversionCache::new(converter, &config.cache.dir, config.cache.max_entries)?;

        tracing::info!(root = %library.root().display(), "Catalog root opened");

        Ok(Self {
            config: Arc::new(config),
            library,
            cache,
        })
    }

    /// Base URL for generating feed links.
    pub fn base_url(&self) -> &str {
        self.config.base_url()
    }

    /// Configured conversion formats.
    pub fn formats(&self) -> &[String] {
        &self.config.convert.formats
    }

    /// Catalog title.
    pub fn title(&self) -> &str {
        &self.config.server.title
    }

    /// Default size of the recent listing.
    pub fn recent_count(&self) -> usize {
        self.config.library.recent_count
    }
}
