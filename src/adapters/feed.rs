use async_trait::async_trait;

use super::{finish, FetchContext, SourceAdapter};
use crate::app::FetchError;
use crate::domain::{NormalizedItem, Source};
use crate::fetcher::FetchRequest;
use crate::normalizer::Normalizer;

/// A subscribed RSS/Atom feed, parsed by the generic [`Normalizer`] into
/// whichever item kind the descriptor declares.
pub struct FeedAdapter {
    source: Source,
}

impl FeedAdapter {
    pub fn new(source: Source) -> Self {
        Self { source }
    }
}

#[async_trait]
impl SourceAdapter for FeedAdapter {
    fn descriptor(&self) -> &Source {
        &self.source
    }

    async fn fetch(&self, cx: &FetchContext<'_>) -> Result<Vec<NormalizedItem>, FetchError> {
        let request = FetchRequest::get(cx.url(&self.source)?).header(
            "Accept",
            "application/rss+xml, application/atom+xml, application/xml;q=0.9, */*;q=0.8",
        );
        let xml = cx.transport.text(request).await?;
        let items = Normalizer::at(cx.now).normalize(&self.source, &xml)?;
        Ok(finish(items))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::testing::now;
    use crate::adapters::Query;
    use crate::domain::{Category, ContentKind, ItemBody, SourceFormat};
    use crate::fetcher::mock::MockFetcher;

    #[tokio::test]
    async fn test_podcast_feed() {
        let xml = r#"<rss><channel><item>
            <title>Episode 1</title>
            <enclosure url="https://cdn.example.com/1.mp3" type="audio/mpeg"/>
            <itunes:duration>12:45</itunes:duration>
        </item></channel></rss>"#;
        let transport = MockFetcher::new()
            .route("https://pod.example.com/feed.xml", 200, xml)
            .into_transport();
        let source = Source::new(
            "pod",
            "Pod",
            Category::Reading,
            SourceFormat::Rss,
            "https://pod.example.com/feed.xml",
        )
        .kind(ContentKind::Podcast);
        let query = Query::new();
        let cx = FetchContext::new(&transport, &query, now());

        let items = FeedAdapter::new(source).fetch(&cx).await.unwrap();
        assert_eq!(items.len(), 1);
        let ItemBody::Podcast(podcast) = &items[0].body else {
            panic!("expected podcast");
        };
        assert_eq!(podcast.duration_secs, Some(765));
    }

    #[tokio::test]
    async fn test_blocked_page_is_shape_error() {
        let transport = MockFetcher::new()
            .route("https://blog.example.com/rss", 200, "<html>Just a moment...</html>")
            .into_transport();
        let source = Source::new(
            "blog",
            "Blog",
            Category::Reading,
            SourceFormat::Rss,
            "https://blog.example.com/rss",
        );
        let query = Query::new();
        let cx = FetchContext::new(&transport, &query, now());

        let err = FeedAdapter::new(source).fetch(&cx).await.unwrap_err();
        assert!(matches!(err, FetchError::UpstreamShapeChanged(_)));
    }
}
