mod models;
pub use models::*;

use crate::error::CatcherError;
use std::collections::btree_map::Entry;
use std::path::{Path, PathBuf};

/// Read the persisted catalog.
#[tracing::instrument]
pub async fn load(path: &Path) -> Result<Catalog, CatcherError> {
    if !tokio::fs::try_exists(path).await? {
        return Err(CatcherError::CatalogMissing(path.to_owned()));
    }

    let data = tokio::fs::read(path).await?;
    let catalog: Catalog = serde_json::from_slice(&data)?;
    tracing::debug!("Loaded {} podcasts", catalog.len());

    Ok(catalog)
}

/// Build the catalog from rows of `name, feed_url, image_url` and persist it.
///
/// The first row for a name wins.
#[tracing::instrument]
pub async fn ingest_from_delimited(source: &Path, path: &Path) -> Result<Catalog, CatcherError> {
    if !tokio::fs::try_exists(source).await? {
        return Err(CatcherError::CatalogSourceMissing(source.to_owned()));
    }

    let source = source.to_owned();
    let catalog = tokio::task::spawn_blocking(move || read_delimited(&source))
        .await
        .map_err(std::io::Error::other)??;

    persist(path.to_owned(), &catalog).await?;
    tracing::info!("Ingested {} podcasts into {}", catalog.len(), path.display());

    Ok(catalog)
}

fn read_delimited(source: &Path) -> Result<Catalog, CatcherError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(source)?;

    let mut catalog = Catalog::new();

    for (line, record) in reader.records().enumerate() {
        let record = record?;

        let (Some(name), Some(feed_url), Some(image_url)) =
            (record.get(0), record.get(1), record.get(2))
        else {
            tracing::warn!("Skipping row {} with {} fields", line + 1, record.len());
            continue;
        };

        match catalog.entry(name.to_owned()) {
            Entry::Vacant(entry) => {
                entry.insert(CatalogEntry {
                    feed_url: feed_url.to_owned(),
                    image_url: image_url.to_owned(),
                });
            }
            Entry::Occupied(_) => tracing::debug!("Ignoring duplicate podcast '{}'", name),
        }
    }

    Ok(catalog)
}

async fn persist(path: PathBuf, catalog: &Catalog) -> Result<(), CatcherError> {
    let catalog = catalog.clone();

    tokio::task::spawn_blocking(move || {
        let file = std::fs::File::create(path)?;
        serde_json::to_writer_pretty(file, &catalog)?;
        Ok::<_, CatcherError>(())
    })
    .await
    .map_err(std::io::Error::other)?
}
