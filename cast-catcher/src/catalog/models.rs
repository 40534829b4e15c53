use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub feed_url: String,

    #[serde(alias = "feed_image")]
    pub image_url: String,
}

/// Podcast name to feed and cover image.
pub type Catalog = BTreeMap<String, CatalogEntry>;

/// Filesystem-safe identifier of a podcast name.
///
/// Lowercases the trimmed name and joins its space-separated words with `_`.
pub fn slug(name: &str) -> String {
    name.trim().split(' ').collect::<Vec<_>>().join("_").to_lowercase()
}
