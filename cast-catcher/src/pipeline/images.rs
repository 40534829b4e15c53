use crate::catalog::{Catalog, slug};
use crate::error::CatcherError;
use crate::layout::Layout;
use crate::pipeline::RunContext;
use crate::pipeline::models::ImageRecord;
use futures::StreamExt as _;
use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "gif"];

/// Absolute and root-relative cover image paths, keyed by podcast name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageTables {
    pub absolute: BTreeMap<String, PathBuf>,
    pub relative: BTreeMap<String, String>,
}

impl ImageTables {
    /// Read both persisted tables; a missing table reads as empty.
    pub async fn load(layout: &Layout) -> Result<Self, CatcherError> {
        Ok(Self {
            absolute: read_table(&layout.image_table).await?.unwrap_or_default(),
            relative: read_table(&layout.image_table_rel).await?.unwrap_or_default(),
        })
    }

    pub async fn persist(&self, layout: &Layout) -> Result<(), CatcherError> {
        let absolute = serde_json::to_vec_pretty(&self.absolute)?;
        let relative = serde_json::to_vec_pretty(&self.relative)?;

        tokio::fs::write(&layout.image_table, absolute).await?;
        tokio::fs::write(&layout.image_table_rel, relative).await?;

        Ok(())
    }

    pub fn insert(&mut self, record: ImageRecord) {
        self.absolute
            .insert(record.name.clone(), record.absolute_path);
        self.relative.insert(record.name, record.relative_path);
    }
}

/// Outcome of the image freshness check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageFreshness {
    Stale,
    Fresh(ImageTables),
}

impl ImageFreshness {
    pub fn needs_update(&self) -> bool {
        matches!(self, Self::Stale)
    }
}

/// Extension for a cover image URL, `png` unless the URL ends in a known image extension.
pub fn sniff_ext(url: &str) -> &str {
    match url.rsplit_once('.') {
        Some((_, ext)) if IMAGE_EXTENSIONS.contains(&ext) => ext,
        _ => "png",
    }
}

pub fn image_record(layout: &Layout, name: &str, image_url: &str) -> ImageRecord {
    let name = name.trim();
    let absolute_path = layout
        .images
        .join(format!("{}.{}", slug(name), sniff_ext(image_url)));

    ImageRecord {
        name: name.to_owned(),
        relative_path: layout.relative(&absolute_path),
        absolute_path,
    }
}

/// Download every cover image and merge the successes into `tables`.
///
/// Names whose fetch failed keep whatever record they had before. Names that
/// map to the same image file share one fetch, made for the first of them in
/// catalog order. Both tables are persisted once every fetch has finished.
#[tracing::instrument(skip_all, fields(podcasts = catalog.len()))]
pub async fn fetch_images(
    ctx: &RunContext,
    catalog: &Catalog,
    mut tables: ImageTables,
) -> ImageTables {
    let mut groups: Vec<(&str, Vec<ImageRecord>)> = Vec::new();
    let mut by_path: HashMap<PathBuf, usize> = HashMap::new();

    for (name, entry) in catalog {
        let record = image_record(&ctx.layout, name, &entry.image_url);

        match by_path.get(&record.absolute_path) {
            Some(&index) => {
                let (_, records) = &mut groups[index];
                tracing::warn!(
                    "{} shares image file {} with {}",
                    record.name,
                    record.absolute_path.display(),
                    records[0].name
                );
                records.push(record);
            }
            None => {
                by_path.insert(record.absolute_path.clone(), groups.len());
                groups.push((entry.image_url.as_str(), vec![record]));
            }
        }
    }

    let fetched = futures::stream::iter(groups)
        .map(|(url, records)| async move {
            let result = ctx
                .client
                .fetch_image(url, &records[0].absolute_path)
                .await;

            (records, result)
        })
        .buffer_unordered(ctx.parallelism)
        .collect::<Vec<_>>()
        .await;

    for (records, result) in fetched {
        let task = format!("fetch image for {}", records[0].name);
        if ctx.statistics.guard(task, result).is_some() {
            for record in records {
                tables.insert(record);
            }
        }
    }

    if let Err(err) = tables.persist(&ctx.layout).await {
        ctx.statistics.send_failed("persist image tables", err);
    }

    tables
}

/// Read-only check whether the persisted image tables are missing or point at missing files.
#[tracing::instrument(skip_all)]
pub async fn check_freshness(layout: &Layout) -> Result<ImageFreshness, CatcherError> {
    let Some(relative) = read_table::<BTreeMap<String, String>>(&layout.image_table_rel).await?
    else {
        return Ok(ImageFreshness::Stale);
    };
    let Some(absolute) = read_table::<BTreeMap<String, PathBuf>>(&layout.image_table).await? else {
        return Ok(ImageFreshness::Stale);
    };

    for (name, path) in &absolute {
        if !tokio::fs::try_exists(path).await? {
            tracing::info!("Image file for {} does not exist", name);
            return Ok(ImageFreshness::Stale);
        }
    }

    Ok(ImageFreshness::Fresh(ImageTables { absolute, relative }))
}

async fn read_table<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, CatcherError> {
    if !tokio::fs::try_exists(path).await? {
        return Ok(None);
    }

    let data = tokio::fs::read(path).await?;
    Ok(Some(serde_json::from_slice(&data)?))
}
