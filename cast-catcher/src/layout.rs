use crate::args::CatcherArgs;
use crate::error::CatcherError;
use std::path::{Path, PathBuf};

/// Page template rendered into the index, looked up in the template directory.
pub const INDEX_TEMPLATE: &str = "main.html";

/// Directories and persisted files of one working root.
#[derive(Debug, Clone)]
pub struct Layout {
    pub root: PathBuf,
    pub catalog: PathBuf,
    pub images: PathBuf,
    pub podcasts: PathBuf,
    pub feed_xml: PathBuf,
    pub templates: PathBuf,
    pub image_table: PathBuf,
    pub image_table_rel: PathBuf,
    pub index: PathBuf,
}

impl Layout {
    pub fn new(root: impl Into<PathBuf>, catalog: impl AsRef<Path>) -> Self {
        let root = root.into();

        Self {
            catalog: root.join(catalog),
            images: root.join("images"),
            podcasts: root.join("podcasts"),
            feed_xml: root.join("feedxml"),
            templates: root.join("templates"),
            image_table: root.join("podcastimages.json"),
            image_table_rel: root.join("podcastimages_rel.json"),
            index: root.join("index.html"),
            root,
        }
    }

    /// Resolve the root to an absolute path and create the working directories.
    ///
    /// A missing template directory or index template is fatal.
    pub async fn prepare(args: &CatcherArgs) -> Result<Self, CatcherError> {
        let root = tokio::fs::canonicalize(&args.root).await.map_err(|e| {
            tracing::error!("Failed to resolve root {}: {}", args.root.display(), e);
            e
        })?;

        let layout = Self::new(root, &args.catalog);
        tracing::debug!("Working root is {}", layout.root.display());

        for dir in [&layout.images, &layout.podcasts, &layout.feed_xml] {
            tokio::fs::create_dir_all(dir).await?;
        }

        if !tokio::fs::try_exists(&layout.templates).await? {
            return Err(CatcherError::TemplateDirectoryMissing(layout.templates));
        }

        let template = layout.templates.join(INDEX_TEMPLATE);
        if !tokio::fs::try_exists(&template).await? {
            return Err(CatcherError::TemplateMissing(template));
        }

        Ok(layout)
    }

    /// Path of `path` relative to the root, with `/` separators.
    ///
    /// Paths outside the root are returned unchanged.
    pub fn relative(&self, path: &Path) -> String {
        match path.strip_prefix(&self.root) {
            Ok(rel) => rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/"),
            Err(_) => path.to_string_lossy().replace('\\', "/"),
        }
    }
}
