use crate::args::CatcherArgs;
use crate::error::CatcherError;
use reqwest::header::CACHE_CONTROL;
use reqwest::redirect::Policy;
use reqwest::{Client, Url};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt as _;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

#[derive(Debug, Clone)]
pub struct PodcastClient {
    client: Client,
    request_semaphore: Arc<Semaphore>,
    retries: u32,
}

impl PodcastClient {
    /// Prepare the HTTP client.
    pub fn new(args: &CatcherArgs) -> Result<Self, CatcherError> {
        let client = Client::builder()
            .user_agent(concat!(
                "Mozilla/5.0 (compatible; ",
                env!("CARGO_PKG_NAME"),
                "/",
                env!("CARGO_PKG_VERSION"),
                ")"
            ))
            .redirect(Policy::limited(10))
            .connect_timeout(Duration::from_secs(args.timeout))
            .read_timeout(Duration::from_secs(args.timeout))
            .hickory_dns(true)
            .build()?;

        let request_semaphore = Arc::new(Semaphore::new(args.max_parallel_requests.get()));

        Ok(Self {
            client,
            request_semaphore,
            retries: args.retries,
        })
    }

    /// Download a cover image over `destination`.
    #[tracing::instrument(skip(self))]
    pub async fn fetch_image(&self, url: &str, destination: &Path) -> Result<u64, CatcherError> {
        self.download(url, destination, false).await
    }

    /// Download a feed document over its cache file.
    #[tracing::instrument(skip(self))]
    pub async fn fetch_feed(&self, url: &str, destination: &Path) -> Result<u64, CatcherError> {
        self.download(url, destination, true).await
    }

    /// Download one episode.
    #[tracing::instrument(skip(self))]
    pub async fn fetch_episode(&self, url: &str, destination: &Path) -> Result<u64, CatcherError> {
        self.download(url, destination, true).await
    }

    async fn download(
        &self,
        url: &str,
        destination: &Path,
        bust_cache: bool,
    ) -> Result<u64, CatcherError> {
        let url = Url::parse(url)?;
        let mut attempt = 0;

        loop {
            match self.download_once(&url, destination, bust_cache).await {
                Ok(written) => return Ok(written),
                Err(err) if attempt < self.retries => {
                    attempt += 1;
                    tracing::warn!("Attempt {} for {} failed: {}", attempt, url, err);
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Stream the body into a sibling `.part` file and move it into place once complete.
    async fn download_once(
        &self,
        url: &Url,
        destination: &Path,
        bust_cache: bool,
    ) -> Result<u64, CatcherError> {
        let permit = self.acquire_permit().await;

        let mut request = self.client.get(url.clone());
        if bust_cache {
            request = request.header(CACHE_CONTROL, "max-age=0");
        }

        let mut response = request.send().await?;
        if !response.status().is_success() {
            return Err(CatcherError::UnexpectedStatus {
                url: url.to_string(),
                status: response.status(),
            });
        }

        let partial = partial_path(destination);
        let written = async {
            let mut file = tokio::fs::File::create(&partial).await?;
            let mut written = 0u64;

            while let Some(chunk) = response.chunk().await? {
                file.write_all(&chunk).await?;
                written += chunk.len() as u64;
            }

            file.flush().await?;
            Ok::<_, CatcherError>(written)
        }
        .await;

        drop(permit);

        let written = match written {
            Ok(v) => v,
            Err(err) => {
                if let Err(cleanup) = tokio::fs::remove_file(&partial).await {
                    tracing::debug!("Could not remove {}: {}", partial.display(), cleanup);
                }
                return Err(err);
            }
        };

        tokio::fs::rename(&partial, destination).await?;
        tracing::debug!("Wrote {} bytes to {}", written, destination.display());

        Ok(written)
    }

    async fn acquire_permit(&self) -> OwnedSemaphorePermit {
        self.request_semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("request semaphore is never closed")
    }
}

fn partial_path(destination: &Path) -> PathBuf {
    let mut path = OsString::from(destination.as_os_str());
    path.push(".part");
    PathBuf::from(path)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use axum::Router;
    use axum::body::Body;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::get;
    use clap::Parser as _;
    use std::convert::Infallible;
    use std::net::SocketAddr;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Requests seen by a test server, as `(path, cache-control)`.
    pub(crate) type Seen = Arc<Mutex<Vec<(String, Option<String>)>>>;

    /// Serve `routes` as static bodies on a local port; other paths answer 404.
    pub(crate) async fn serve(routes: Vec<(&'static str, &'static str)>) -> (String, Seen) {
        let seen = Seen::default();
        let mut app = Router::new();

        for (path, body) in routes {
            let seen = seen.clone();
            app = app.route(
                path,
                get(move |headers: HeaderMap| async move {
                    let cache = headers
                        .get(CACHE_CONTROL)
                        .and_then(|v| v.to_str().ok())
                        .map(ToOwned::to_owned);
                    seen.lock().unwrap().push((path.to_owned(), cache));
                    body
                }),
            );
        }

        let app = app.fallback(|| async { StatusCode::NOT_FOUND });

        (serve_router(app).await, seen)
    }

    /// Serve `app` on a local port and return its base URL.
    pub(crate) async fn serve_router(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind listener");
        let addr: SocketAddr = listener.local_addr().expect("listener addr");

        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve test server");
        });

        format!("http://{addr}")
    }

    pub(crate) fn test_client() -> PodcastClient {
        client_with(&["--timeout", "5"])
    }

    fn client_with(extra: &[&str]) -> PodcastClient {
        let mut argv = vec!["cast-catcher"];
        argv.extend_from_slice(extra);
        PodcastClient::new(&CatcherArgs::parse_from(argv)).unwrap()
    }

    /// A body of `chunks` KiB, each chunk sent `delay` after the previous one.
    fn trickle(chunks: usize, delay: Duration) -> Body {
        Body::from_stream(futures::stream::unfold(0, move |sent| async move {
            if sent == chunks {
                return None;
            }
            tokio::time::sleep(delay).await;
            Some((Ok::<_, Infallible>(vec![b'x'; 1024]), sent + 1))
        }))
    }

    /// Answers 500 for the first `failures` requests and `ok` afterwards.
    fn flaky(failures: usize) -> (Router, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let app = Router::new().route(
            "/ep.mp3",
            get(move || async move {
                if counter.fetch_add(1, Ordering::SeqCst) < failures {
                    (StatusCode::INTERNAL_SERVER_ERROR, "busy")
                } else {
                    (StatusCode::OK, "ok")
                }
            }),
        );

        (app, hits)
    }

    #[tokio::test]
    async fn feed_fetch_busts_caches_and_overwrites() {
        let (base, seen) = serve(vec![("/rss", "<rss/>")]).await;
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("radiolab.xml");
        std::fs::write(&destination, "old").unwrap();

        let written = test_client()
            .fetch_feed(&format!("{base}/rss"), &destination)
            .await
            .unwrap();

        assert_eq!(written, 6);
        assert_eq!(std::fs::read_to_string(&destination).unwrap(), "<rss/>");
        assert_eq!(
            seen.lock().unwrap().as_slice(),
            &[("/rss".to_owned(), Some("max-age=0".to_owned()))]
        );
    }

    #[tokio::test]
    async fn image_fetch_sends_no_cache_header() {
        let (base, seen) = serve(vec![("/cover.png", "png")]).await;
        let dir = tempfile::tempdir().unwrap();

        test_client()
            .fetch_image(&format!("{base}/cover.png"), &dir.path().join("c.png"))
            .await
            .unwrap();

        assert_eq!(seen.lock().unwrap()[0].1, None);
    }

    #[tokio::test]
    async fn failed_fetch_leaves_destination_untouched() {
        let (base, _) = serve(vec![]).await;
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("radiolab.xml");
        std::fs::write(&destination, "stale").unwrap();

        let err = test_client()
            .fetch_feed(&format!("{base}/rss"), &destination)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            CatcherError::UnexpectedStatus { status, .. } if status == StatusCode::NOT_FOUND
        ));
        assert_eq!(std::fs::read_to_string(&destination).unwrap(), "stale");
        assert!(!partial_path(&destination).exists());
    }

    #[tokio::test]
    async fn invalid_url_is_rejected() {
        let dir = tempfile::tempdir().unwrap();

        let err = test_client()
            .fetch_episode("not a url", &dir.path().join("x.mp3"))
            .await
            .unwrap_err();

        assert!(matches!(err, CatcherError::InvalidUrl(_)));
    }

    #[tokio::test]
    async fn slow_download_outlives_timeout_while_bytes_flow() {
        let app = Router::new().route(
            "/long.mp3",
            get(|| async { trickle(10, Duration::from_millis(300)) }),
        );
        let base = serve_router(app).await;
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("long.mp3");

        let written = client_with(&["--timeout", "1"])
            .fetch_episode(&format!("{base}/long.mp3"), &destination)
            .await
            .unwrap();

        assert_eq!(written, 10 * 1024);
        assert_eq!(std::fs::metadata(&destination).unwrap().len(), 10 * 1024);
    }

    #[tokio::test]
    async fn stalled_download_times_out() {
        let app = Router::new().route(
            "/stalled.mp3",
            get(|| async { trickle(2, Duration::from_secs(5)) }),
        );
        let base = serve_router(app).await;
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("stalled.mp3");

        let err = client_with(&["--timeout", "1"])
            .fetch_episode(&format!("{base}/stalled.mp3"), &destination)
            .await
            .unwrap_err();

        assert!(matches!(err, CatcherError::HttpClientError(_)));
        assert!(!destination.exists());
        assert!(!partial_path(&destination).exists());
    }

    #[tokio::test]
    async fn retry_budget_recovers_from_server_error() {
        let (app, hits) = flaky(1);
        let base = serve_router(app).await;
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("ep.mp3");

        let written = client_with(&["--timeout", "5", "--retries", "1"])
            .fetch_episode(&format!("{base}/ep.mp3"), &destination)
            .await
            .unwrap();

        assert_eq!(written, 2);
        assert_eq!(std::fs::read_to_string(&destination).unwrap(), "ok");
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn no_retries_by_default() {
        let (app, hits) = flaky(1);
        let base = serve_router(app).await;
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("ep.mp3");

        let err = test_client()
            .fetch_episode(&format!("{base}/ep.mp3"), &destination)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            CatcherError::UnexpectedStatus { status, .. }
                if status == StatusCode::INTERNAL_SERVER_ERROR
        ));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(!destination.exists());
    }

    #[tokio::test]
    async fn retries_stop_when_budget_is_spent() {
        let (app, hits) = flaky(5);
        let base = serve_router(app).await;
        let dir = tempfile::tempdir().unwrap();

        let result = client_with(&["--timeout", "5", "--retries", "2"])
            .fetch_episode(&format!("{base}/ep.mp3"), &dir.path().join("ep.mp3"))
            .await;

        assert!(result.is_err());
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }
}
