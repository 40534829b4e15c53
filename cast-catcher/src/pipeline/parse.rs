use crate::error::CatcherError;
use crate::pipeline::RunContext;
use crate::pipeline::images::ImageTables;
use crate::pipeline::models::{
    FeedCache, FeedCacheRecord, ParsedEpisode, ParsedPodcast, ParsedPodcasts,
};
use rss::Channel;
use std::io::BufRead;

/// Channel metadata and items of one feed document, in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedDocument {
    pub title: Option<String>,
    pub link: Option<String>,
    pub description: Option<String>,
    pub owner: Option<String>,
    pub episodes: Vec<ParsedEpisode>,
}

pub fn parse_feed(reader: impl BufRead) -> Result<FeedDocument, CatcherError> {
    let channel = Channel::read_from(reader)?;

    let owner = channel
        .itunes_ext()
        .and_then(|ext| ext.owner())
        .and_then(|owner| owner.name().or(owner.email()))
        .and_then(non_empty);

    let episodes = channel
        .items()
        .iter()
        .map(|item| {
            let enclosure = item.enclosure();

            ParsedEpisode {
                title: item.title().and_then(non_empty),
                date: item.pub_date().and_then(non_empty),
                link: item.link().and_then(non_empty),
                download_url: enclosure.and_then(|e| non_empty(e.url())),
                size: enclosure.and_then(|e| non_empty(e.length())),
            }
        })
        .collect();

    Ok(FeedDocument {
        title: non_empty(channel.title()),
        link: non_empty(channel.link()),
        description: non_empty(channel.description()),
        owner,
        episodes,
    })
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_owned())
}

/// Combine a parsed document with the podcast's name and cover image path.
pub fn assemble(
    record: &FeedCacheRecord,
    document: FeedDocument,
    images: &ImageTables,
) -> Result<ParsedPodcast, CatcherError> {
    let image_link = images
        .relative
        .get(&record.name)
        .cloned()
        .ok_or_else(|| CatcherError::MissingImageLink(record.name.clone()))?;

    Ok(ParsedPodcast {
        slug: record.slug.clone(),
        proper_name: record.name.clone(),
        title: document.title,
        link: document.link,
        description: document.description,
        owner: document.owner,
        image_link,
        episodes: document.episodes,
    })
}

async fn parse_cached(
    record: &FeedCacheRecord,
    images: &ImageTables,
) -> Result<ParsedPodcast, CatcherError> {
    let data = tokio::fs::read(&record.local_path).await?;
    let document = parse_feed(&data[..])?;
    tracing::debug!("{} lists {} episodes", record.name, document.episodes.len());

    assemble(record, document, images)
}

/// Parse every registered cache file; feeds that fail are left out of the result.
#[tracing::instrument(skip_all, fields(feeds = feeds.len()))]
pub async fn parse_feeds(
    ctx: &RunContext,
    feeds: &FeedCache,
    images: &ImageTables,
) -> ParsedPodcasts {
    let mut podcasts = ParsedPodcasts::new();

    for (slug, record) in feeds {
        let result = parse_cached(record, images).await;

        if let Some(podcast) = ctx.statistics.guard(
            format!("parse feed {}", record.local_path.display()),
            result,
        ) {
            podcasts.insert(slug.clone(), podcast);
        }
    }

    podcasts
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::pipeline::tests::test_context;
    use std::path::PathBuf;

    pub(crate) fn feed_with_items(count: usize) -> String {
        let items = (1..=count)
            .map(|n| {
                format!(
                    "<item><title>Episode {n}</title><pubDate>Mon, 0{d} Jan 2024 10:00:00 GMT</pubDate>\
                     <enclosure url=\"EPBASE/ep{n:02}.mp3\" length=\"{n}000\" type=\"audio/mpeg\"/></item>",
                    d = n % 9 + 1
                )
            })
            .collect::<String>();

        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:itunes="http://www.itunes.com/dtds/podcast-1.0.dtd">
<channel>
<title>Radiolab</title>
<link>https://radiolab.org</link>
<description>Investigating a strange world.</description>
<itunes:owner><itunes:name>WNYC Studios</itunes:name><itunes:email>a@b.c</itunes:email></itunes:owner>
{items}
</channel>
</rss>"#
        )
    }

    const SPARSE_FEED: &str = r#"<?xml version="1.0"?>
<rss version="2.0">
<channel>
<title>Sparse</title>
<item><title>Only a link</title><link>http://x/show/page</link></item>
<item><title>Nothing</title></item>
<item><enclosure url="http://x/a.mp3?utm=1" length="" type="audio/mpeg"/></item>
</channel>
</rss>"#;

    #[test]
    fn parses_channel_metadata_and_items_in_order() {
        let document = parse_feed(feed_with_items(3).as_bytes()).unwrap();

        assert_eq!(document.title.as_deref(), Some("Radiolab"));
        assert_eq!(document.link.as_deref(), Some("https://radiolab.org"));
        assert_eq!(document.owner.as_deref(), Some("WNYC Studios"));
        assert_eq!(
            document.description.as_deref(),
            Some("Investigating a strange world.")
        );

        let titles = document
            .episodes
            .iter()
            .map(|e| e.title.as_deref().unwrap())
            .collect::<Vec<_>>();
        assert_eq!(titles, ["Episode 1", "Episode 2", "Episode 3"]);

        let first = &document.episodes[0];
        assert_eq!(first.download_url.as_deref(), Some("EPBASE/ep01.mp3"));
        assert_eq!(first.size.as_deref(), Some("1000"));
        assert_eq!(first.date.as_deref(), Some("Mon, 02 Jan 2024 10:00:00 GMT"));
    }

    #[test]
    fn missing_fields_stay_empty() {
        let document = parse_feed(SPARSE_FEED.as_bytes()).unwrap();

        assert_eq!(document.owner, None);
        assert_eq!(document.description, None);
        assert_eq!(document.episodes.len(), 3);
        assert_eq!(
            document.episodes[0],
            ParsedEpisode {
                title: Some("Only a link".into()),
                link: Some("http://x/show/page".into()),
                ..Default::default()
            }
        );
        assert_eq!(document.episodes[1].download_url, None);
        assert_eq!(document.episodes[2].size, None);
        assert_eq!(document.episodes[2].advertised_size(), None);
    }

    #[test]
    fn malformed_document_is_an_error() {
        assert!(parse_feed("<rss><channel><title>oops".as_bytes()).is_err());
        assert!(parse_feed("not xml at all".as_bytes()).is_err());
    }

    #[test]
    fn assemble_requires_image_link() {
        let record = FeedCacheRecord {
            slug: "radiolab".into(),
            name: "Radiolab".into(),
            local_path: PathBuf::from("feedxml/radiolab.xml"),
        };
        let document = parse_feed(feed_with_items(1).as_bytes()).unwrap();

        let err = assemble(&record, document.clone(), &ImageTables::default()).unwrap_err();
        assert!(matches!(err, CatcherError::MissingImageLink(name) if name == "Radiolab"));

        let mut images = ImageTables::default();
        images
            .relative
            .insert("Radiolab".into(), "images/radiolab.png".into());

        let podcast = assemble(&record, document, &images).unwrap();
        assert_eq!(podcast.proper_name, "Radiolab");
        assert_eq!(podcast.image_link, "images/radiolab.png");
        assert_eq!(podcast.episodes.len(), 1);
    }

    #[tokio::test]
    async fn unparsable_feed_does_not_hide_others() {
        let (ctx, dir, _collector) = test_context().await;
        let feed_dir = dir.path().join("feedxml");

        let mut feeds = FeedCache::new();
        let mut images = ImageTables::default();

        for (slug, name, body) in [
            ("good", "Good", Some(feed_with_items(2))),
            ("bad", "Bad", Some("<rss><channel>".to_owned())),
            ("absent", "Absent", None),
        ] {
            let local_path = feed_dir.join(format!("{slug}.xml"));
            if let Some(body) = body {
                std::fs::write(&local_path, body).unwrap();
            }

            feeds.insert(
                slug.to_owned(),
                FeedCacheRecord {
                    slug: slug.to_owned(),
                    name: name.to_owned(),
                    local_path,
                },
            );
            images
                .relative
                .insert(name.to_owned(), format!("images/{slug}.png"));
        }

        let podcasts = parse_feeds(&ctx, &feeds, &images).await;

        assert_eq!(podcasts.keys().collect::<Vec<_>>(), ["good"]);
        assert_eq!(podcasts["good"].episodes.len(), 2);
    }
}
