use crate::error::CatcherError;
use crate::pipeline::RunContext;
use crate::pipeline::models::{ParsedEpisode, ParsedPodcast, ParsedPodcasts};
use crate::statistics::FailedDownload;
use futures::StreamExt as _;
use std::borrow::Cow;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// What to do with one episode within the per-run cap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EpisodeAction {
    Fetch { source: String, destination: PathBuf },
    AlreadyPresent(PathBuf),
    NotAudio(String),
    NoSource,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EpisodeRun {
    /// Episodes counted against the cap, across all podcasts.
    pub considered: usize,
    pub fetched: usize,
    pub failed: Vec<FailedDownload>,
}

/// The enclosure URL, or the item link when there is none.
pub fn resolve_source(episode: &ParsedEpisode) -> Option<&str> {
    episode
        .download_url
        .as_deref()
        .or(episode.link.as_deref())
}

/// Everything after the last `/`.
pub fn file_name_of(source: &str) -> &str {
    source.rsplit('/').next().unwrap_or(source)
}

/// Cut anything trailing the first `.mp3` of a URL that does not end in `.mp3`.
pub fn normalize_mp3_url(source: &str) -> Cow<'_, str> {
    if source.ends_with(".mp3") {
        return Cow::Borrowed(source);
    }

    match source.split_once(".mp3") {
        Some((head, _)) => Cow::Owned(format!("{head}.mp3")),
        None => Cow::Borrowed(source),
    }
}

/// The episodes a run may look at: the first `cap` in feed order.
pub fn select(episodes: &[ParsedEpisode], cap: usize) -> &[ParsedEpisode] {
    &episodes[..episodes.len().min(cap)]
}

/// Decide how to handle one episode stored under `directory`.
///
/// With `verify_size`, an existing file whose length differs from the
/// advertised size is fetched again.
pub async fn plan_episode(
    directory: &Path,
    episode: &ParsedEpisode,
    verify_size: bool,
) -> Result<EpisodeAction, CatcherError> {
    let Some(source) = resolve_source(episode) else {
        return Ok(EpisodeAction::NoSource);
    };

    let destination = directory.join(file_name_of(source));

    if tokio::fs::try_exists(&destination).await? {
        let truncated = match (verify_size, episode.advertised_size()) {
            (true, Some(expected)) => {
                let actual = tokio::fs::metadata(&destination).await?.len();
                if actual != expected {
                    tracing::info!(
                        "{} has {} of {} bytes, fetching again",
                        destination.display(),
                        actual,
                        expected
                    );
                }
                actual != expected
            }
            _ => false,
        };

        if !truncated {
            return Ok(EpisodeAction::AlreadyPresent(destination));
        }
    }

    if !source.contains(".mp3") {
        return Ok(EpisodeAction::NotAudio(source.to_owned()));
    }

    Ok(EpisodeAction::Fetch {
        source: normalize_mp3_url(source).into_owned(),
        destination,
    })
}

/// Plan the selected episodes of one podcast.
///
/// A fetch whose destination is already in `claimed` is planned as present,
/// so no two fetches of a run write the same file.
async fn plan_podcast(
    ctx: &RunContext,
    podcast: &ParsedPodcast,
    cap: usize,
    verify_size: bool,
    claimed: &mut HashSet<PathBuf>,
) -> Result<Vec<(String, EpisodeAction)>, CatcherError> {
    let directory = ctx.layout.podcasts.join(&podcast.proper_name);
    if !tokio::fs::try_exists(&directory).await? {
        tracing::info!("Creating directory {}", directory.display());
        tokio::fs::create_dir_all(&directory).await?;
    }

    let mut actions = Vec::new();
    for (index, episode) in select(&podcast.episodes, cap).iter().enumerate() {
        let label = episode
            .title
            .clone()
            .unwrap_or_else(|| format!("#{}", index + 1));
        let action = match plan_episode(&directory, episode, verify_size).await? {
            EpisodeAction::Fetch { destination, .. } if claimed.contains(&destination) => {
                tracing::debug!("{} is already claimed by another episode", destination.display());
                EpisodeAction::AlreadyPresent(destination)
            }
            EpisodeAction::Fetch {
                source,
                destination,
            } => {
                claimed.insert(destination.clone());
                EpisodeAction::Fetch {
                    source,
                    destination,
                }
            }
            action => action,
        };

        actions.push((format!("{} / {}", podcast.proper_name, label), action));
    }

    Ok(actions)
}

/// Fetch up to `cap` new episodes per podcast.
///
/// Episodes without any link still count against the cap. Failed fetches are
/// recorded and never retried within the run.
#[tracing::instrument(skip_all, fields(podcasts = podcasts.len(), cap = cap))]
pub async fn download_episodes(
    ctx: &RunContext,
    podcasts: &ParsedPodcasts,
    cap: usize,
    verify_size: bool,
) -> EpisodeRun {
    let mut run = EpisodeRun::default();
    let mut fetches = Vec::new();
    let mut claimed = HashSet::new();

    for podcast in podcasts.values() {
        let actions = plan_podcast(ctx, podcast, cap, verify_size, &mut claimed).await;
        let Some(actions) = ctx
            .statistics
            .guard(format!("plan episodes for {}", podcast.proper_name), actions)
        else {
            continue;
        };

        for (label, action) in actions {
            run.considered += 1;

            match action {
                EpisodeAction::Fetch {
                    source,
                    destination,
                } => fetches.push((label, source, destination)),
                EpisodeAction::AlreadyPresent(path) => {
                    tracing::debug!("{} already present at {}", label, path.display())
                }
                EpisodeAction::NotAudio(source) => {
                    tracing::debug!("{} is not an mp3: {}", label, source)
                }
                EpisodeAction::NoSource => {
                    ctx.statistics.send_problem(label, CatcherError::NoDownloadLink)
                }
            }
        }
    }

    let results = futures::stream::iter(fetches)
        .map(|(label, source, destination)| async move {
            let result = ctx.client.fetch_episode(&source, &destination).await;
            (label, source, destination, result)
        })
        .buffer_unordered(ctx.parallelism)
        .collect::<Vec<_>>()
        .await;

    for (label, source, destination, result) in results {
        match result {
            Ok(_) => {
                ctx.statistics.send_succeeded(format!("download {label}"));
                run.fetched += 1;
            }
            Err(err) => {
                let failed = FailedDownload {
                    source,
                    destination,
                };
                ctx.statistics.send_download_failed(failed.clone(), err);
                run.failed.push(failed);
            }
        }
    }

    run
}
