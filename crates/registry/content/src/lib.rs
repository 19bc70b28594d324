//! File-backed content for the item registry.
//!
//! This crate turns a directory of RON item catalogs and a TOML settings
//! file into a [`RegistryDataSource`](registry_service::RegistryDataSource)
//! implementation the service can run against.
pub mod settings;
pub mod source;
pub use settings::ContentSettings;
pub use source::{FileDataSource, ItemCatalog, ItemDefinition};

use std::path::Path;

/// Common result type for content loaders.
pub type LoadResult<T> = anyhow::Result<T>;

/// Helper function to read file contents.
pub(crate) fn read_file(path: &Path) -> LoadResult<String> {
    std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read file {}: {}", path.display(), e))
}
