use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// One entry of a feed's item list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParsedEpisode {
    pub title: Option<String>,
    pub date: Option<String>,
    pub link: Option<String>,
    pub download_url: Option<String>,
    pub size: Option<String>,
}

impl ParsedEpisode {
    /// The enclosure length, when the feed advertises a usable one.
    pub fn advertised_size(&self) -> Option<u64> {
        self.size
            .as_deref()
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|v| *v > 0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedPodcast {
    pub slug: String,
    pub proper_name: String,
    pub title: Option<String>,
    pub link: Option<String>,
    pub description: Option<String>,
    pub owner: Option<String>,
    pub image_link: String,
    pub episodes: Vec<ParsedEpisode>,
}

/// Slug to parsed podcast, the renderer's input.
pub type ParsedPodcasts = BTreeMap<String, ParsedPodcast>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedCacheRecord {
    pub slug: String,
    pub name: String,
    pub local_path: PathBuf,
}

/// Slug to feed cache file; doubles as the slug to name lookup.
pub type FeedCache = BTreeMap<String, FeedCacheRecord>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRecord {
    pub name: String,
    pub absolute_path: PathBuf,
    pub relative_path: String,
}
