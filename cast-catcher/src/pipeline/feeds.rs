use crate::catalog::{Catalog, slug};
use crate::pipeline::RunContext;
use crate::pipeline::models::{FeedCache, FeedCacheRecord};
use futures::StreamExt as _;
use std::collections::btree_map::Entry;

/// Register a cache file for every podcast and refresh it when `download` is set.
///
/// A failed refresh leaves the previous cache file, if any, in place.
#[tracing::instrument(skip_all, fields(podcasts = catalog.len(), download = download))]
pub async fn sync_feeds(ctx: &RunContext, catalog: &Catalog, download: bool) -> FeedCache {
    let mut cache = FeedCache::new();
    let mut fetches = Vec::new();

    for (name, entry) in catalog {
        let slug = slug(name);
        let local_path = ctx.layout.feed_xml.join(format!("{slug}.xml"));

        match cache.entry(slug.clone()) {
            Entry::Vacant(v) => {
                let record = v.insert(FeedCacheRecord {
                    slug,
                    name: name.trim().to_owned(),
                    local_path,
                });
                fetches.push((record.clone(), entry.feed_url.as_str()));
            }
            Entry::Occupied(o) => {
                tracing::warn!(
                    "'{}' shares the feed file of '{}', ignoring {}",
                    name,
                    o.get().name,
                    entry.feed_url
                );
            }
        }
    }

    if !download {
        tracing::info!("Using cached feed documents");
        return cache;
    }

    let results = futures::stream::iter(fetches)
        .map(|(record, feed_url)| async move {
            let result = ctx.client.fetch_feed(feed_url, &record.local_path).await;
            (record, result)
        })
        .buffer_unordered(ctx.parallelism)
        .collect::<Vec<_>>()
        .await;

    for (record, result) in results {
        ctx.statistics
            .guard(format!("fetch feed for {}", record.name), result);
    }

    cache
}
