mod episodes;
mod feeds;
mod images;
mod models;
mod parse;
mod render;

use crate::args::CatcherArgs;
use crate::catalog::{self, Catalog};
use crate::client::PodcastClient;
use crate::error::CatcherError;
use crate::layout::Layout;
use crate::statistics::{Statistics, StatisticsCollector, StatisticsSender};
use crate::pipeline::images::ImageTables;

/// State shared by the phases of one run.
#[derive(Clone)]
pub struct RunContext {
    layout: Layout,
    client: PodcastClient,
    statistics: StatisticsSender,
    parallelism: usize,
}

pub struct CatchProcessor {
    layout: Layout,
    client: PodcastClient,
    args: CatcherArgs,
}

impl CatchProcessor {
    /// Prepare the working directories and the HTTP client.
    pub async fn new(args: &CatcherArgs) -> Result<Self, CatcherError> {
        let layout = Layout::prepare(args).await?;
        let client = PodcastClient::new(args)?;

        Ok(Self {
            layout,
            client,
            args: args.clone(),
        })
    }

    /// Ingest the delimited source when one was given, otherwise read the persisted catalog.
    pub async fn catalog(&self) -> Result<Catalog, CatcherError> {
        match &self.args.csv {
            Some(source) => catalog::ingest_from_delimited(source, &self.layout.catalog).await,
            None => catalog::load(&self.layout.catalog).await,
        }
    }

    /// Run every phase in order.
    ///
    /// Only loading the catalog can fail; later failures are recorded in the
    /// returned statistics.
    pub async fn run(&self) -> Result<Statistics, CatcherError> {
        let catalog = self.catalog().await?;
        tracing::info!("Catching {} podcasts", catalog.len());

        let statistics = StatisticsCollector::new();
        let ctx = self.context(statistics.sender());

        let prior_images = match ImageTables::load(&self.layout).await {
            Ok(v) => v,
            Err(err) => {
                ctx.statistics.send_problem("read image tables", err);
                ImageTables::default()
            }
        };

        let images = images::fetch_images(&ctx, &catalog, prior_images).await;

        match images::check_freshness(&self.layout).await {
            Ok(freshness) if freshness.needs_update() => {
                tracing::warn!("Podcast images require an update")
            }
            Ok(_) => tracing::debug!("Podcast images are up to date"),
            Err(err) => ctx.statistics.send_problem("check image freshness", err),
        }

        let feeds = feeds::sync_feeds(&ctx, &catalog, !self.args.no_feed_download).await;
        let podcasts = parse::parse_feeds(&ctx, &feeds, &images).await;

        if self.args.no_episodes {
            tracing::info!("Skipping episode downloads");
        } else {
            let run = episodes::download_episodes(
                &ctx,
                &podcasts,
                self.args.max_downloads.get(),
                self.args.verify_size,
            )
            .await;
            tracing::info!(
                "Looked at {} episodes, fetched {}, {} failed",
                run.considered,
                run.fetched,
                run.failed.len()
            );
        }

        if self.args.no_render {
            tracing::info!("Skipping render");
        } else {
            let result = render::render(&self.layout, &podcasts).await;
            ctx.statistics.guard("render index", result);
        }

        drop(ctx);
        Ok(statistics.finish())
    }

    fn context(&self, statistics: StatisticsSender) -> RunContext {
        RunContext {
            layout: self.layout.clone(),
            client: self.client.clone(),
            statistics,
            parallelism: self.args.max_parallel_requests.get(),
        }
    }
}
