pub mod extract;

use chrono::{DateTime, Utc};

use crate::app::FetchError;
use crate::domain::{
    Article, ContentKind, ItemBody, ItemList, NormalizedItem, Podcast, Source, Tweet, Video,
};
use crate::text::{self, clean_escaped_html, clean_html, decode_entities, parse_duration};

use extract::{tag_attr, tag_text};

const SUMMARY_CHARS: usize = 200;

/// Wire format detected from the body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedFlavor {
    Rss,
    Atom,
}

impl FeedFlavor {
    pub fn sniff(xml: &str) -> Self {
        if extract::has_element(xml, "feed") && extract::has_element(xml, "entry") {
            FeedFlavor::Atom
        } else {
            FeedFlavor::Rss
        }
    }
}

/// Fields common to RSS items and Atom entries, still uncleaned.
struct Entry<'a> {
    block: &'a str,
    title: String,
    link: String,
    guid: Option<String>,
    published_at: Option<DateTime<Utc>>,
    raw_date: String,
    description: Option<String>,
    content: Option<String>,
    author: Option<String>,
}

/// Turns RSS 2.0 / Atom bytes into [`NormalizedItem`]s of the source's kind.
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    /// Reference time for relative dates ("3小时前"). Without it they parse
    /// to `None`, which keeps parsing a pure function of the input.
    now: Option<DateTime<Utc>>,
}

impl Normalizer {
    pub fn new() -> Self {
        Self { now: None }
    }

    pub fn at(now: DateTime<Utc>) -> Self {
        Self { now: Some(now) }
    }

    pub fn normalize(&self, source: &Source, xml: &str) -> Result<Vec<NormalizedItem>, FetchError> {
        let flavor = FeedFlavor::sniff(xml);
        let entries = match flavor {
            FeedFlavor::Atom => self.atom_entries(xml),
            FeedFlavor::Rss => self.rss_entries(xml),
        };

        if entries.is_empty() && !looks_like_feed(xml) {
            return Err(FetchError::shape("no <rss>, <feed> or <channel> root in body"));
        }

        let channel_image = tag_attr(xml, "itunes:image", "href");
        let mut list = ItemList::new();
        for entry in entries {
            if let Some(item) = self.build(source, entry, channel_image.as_deref()) {
                list.push(item);
            }
        }

        tracing::debug!(source = %source.id, ?flavor, count = list.len(), "parsed feed");
        Ok(list.into_vec())
    }

    fn parse_date(&self, raw: &str) -> Option<DateTime<Utc>> {
        text::parse_feed_date(raw).or_else(|| self.now.and_then(|now| text::parse_relative(raw, now)))
    }

    fn rss_entries<'a>(&self, xml: &'a str) -> Vec<Entry<'a>> {
        extract::blocks(xml, "item")
            .into_iter()
            .filter_map(|block| {
                let title = tag_text(block, "title")?;
                let raw_date = ["pubDate", "dc:date", "published", "updated"]
                    .iter()
                    .find_map(|tag| tag_text(block, tag))
                    .unwrap_or_default();
                Some(Entry {
                    block,
                    title,
                    link: tag_text(block, "link")
                        .map(|l| decode_entities(&l))
                        .unwrap_or_default(),
                    guid: tag_text(block, "guid"),
                    published_at: self.parse_date(&raw_date),
                    raw_date,
                    description: tag_text(block, "description"),
                    content: tag_text(block, "content:encoded"),
                    author: tag_text(block, "dc:creator").or_else(|| tag_text(block, "author")),
                })
            })
            .collect()
    }

    fn atom_entries<'a>(&self, xml: &'a str) -> Vec<Entry<'a>> {
        extract::blocks(xml, "entry")
            .into_iter()
            .filter_map(|block| {
                let title = tag_text(block, "title")?;
                let raw_date = tag_text(block, "published")
                    .or_else(|| tag_text(block, "updated"))
                    .unwrap_or_default();
                let guid = tag_text(block, "yt:videoId").or_else(|| tag_text(block, "id"));
                Some(Entry {
                    block,
                    title,
                    link: extract::atom_link(block).unwrap_or_default(),
                    guid,
                    published_at: self.parse_date(&raw_date),
                    raw_date,
                    description: tag_text(block, "media:description")
                        .or_else(|| tag_text(block, "summary")),
                    content: tag_text(block, "content"),
                    author: extract::blocks(block, "author")
                        .first()
                        .and_then(|a| tag_text(a, "name")),
                })
            })
            .collect()
    }

    fn build(&self, source: &Source, entry: Entry<'_>, channel_image: Option<&str>) -> Option<NormalizedItem> {
        let title = clean_html(&entry.title);
        if title.is_empty() {
            return None;
        }

        let description = entry
            .description
            .as_deref()
            .map(clean_escaped_html)
            .filter(|d| !d.is_empty());
        let author = entry
            .author
            .as_deref()
            .map(clean_html)
            .filter(|a| !a.is_empty());

        let (link, body) = match source.kind {
            ContentKind::Article => {
                if entry.link.is_empty() {
                    return None;
                }
                let content = entry
                    .content
                    .as_deref()
                    .map(clean_escaped_html)
                    .filter(|c| !c.is_empty())
                    .or_else(|| description.clone());
                let image_url = extract::image_url(entry.block, entry.description.as_deref());
                let body = ItemBody::Article(Article {
                    summary: description.as_deref().map(|d| text::truncate(d, SUMMARY_CHARS)),
                    content,
                    author,
                    image_url,
                    ..Article::default()
                });
                (entry.link.clone(), body)
            }

            ContentKind::Podcast => {
                let audio_url = extract::audio_enclosure(entry.block);
                let cover_image_url = extract::image_url(entry.block, entry.description.as_deref())
                    .or_else(|| tag_attr(entry.block, "itunes:image", "href"))
                    .or_else(|| channel_image.map(str::to_string));
                let description = description
                    .clone()
                    .or_else(|| tag_text(entry.block, "itunes:summary").map(|s| clean_html(&s)));
                let link = if entry.link.is_empty() {
                    audio_url.clone().unwrap_or_default()
                } else {
                    entry.link.clone()
                };
                let body = ItemBody::Podcast(Podcast {
                    audio_url,
                    duration_secs: tag_text(entry.block, "itunes:duration").and_then(|d| parse_duration(&d)),
                    episode_number: tag_text(entry.block, "itunes:episode").and_then(|e| e.trim().parse().ok()),
                    cover_image_url,
                    description,
                });
                (link, body)
            }

            ContentKind::Video => {
                if entry.link.is_empty() {
                    return None;
                }
                let video_id = tag_text(entry.block, "yt:videoId")
                    .or_else(|| extract::youtube_video_id(&entry.link));
                let thumbnail_url = video_id
                    .as_deref()
                    .map(extract::youtube_thumbnail)
                    .or_else(|| extract::image_url(entry.block, entry.description.as_deref()));
                let view_count = tag_attr(entry.block, "media:statistics", "views")
                    .and_then(|v| v.replace(',', "").parse().ok());
                let body = ItemBody::Video(Video {
                    video_url: Some(entry.link.clone()),
                    thumbnail_url,
                    view_count,
                    duration_secs: tag_text(entry.block, "itunes:duration").and_then(|d| parse_duration(&d)),
                    channel_name: author.clone().or_else(|| Some(source.name.clone())),
                    description,
                });
                (entry.link.clone(), body)
            }

            ContentKind::Tweet => {
                let body_text = description.clone().unwrap_or_else(|| title.clone());
                let author_name = author.clone().unwrap_or_else(|| source.name.clone());
                let mut media_urls: Vec<String> = extract::elements(entry.block, "media:content")
                    .into_iter()
                    .filter_map(|(open, _)| extract::attr_value(open, "url"))
                    .collect();
                if let Some(raw) = entry.description.as_deref() {
                    for src in extract::all_img_srcs(raw) {
                        if !media_urls.contains(&src) {
                            media_urls.push(src);
                        }
                    }
                }
                let body = ItemBody::Tweet(Tweet {
                    body_text,
                    author_handle: extract::twitter_handle(&author_name),
                    author_name,
                    media_urls,
                });
                (entry.link.clone(), body)
            }
        };

        // guid, then link, then a hash of what the record does carry.
        let id = entry
            .guid
            .clone()
            .filter(|g| !g.trim().is_empty())
            .or_else(|| (!entry.link.is_empty()).then(|| entry.link.clone()))
            .unwrap_or_else(|| {
                let key = format!("{}|{}|{}", title, entry.raw_date, link);
                NormalizedItem::generate_id(&source.id, &key)
            });

        Some(NormalizedItem::new(&source.id, id, title, link, body).published(entry.published_at))
    }
}

fn looks_like_feed(xml: &str) -> bool {
    ["rss", "feed", "channel", "rdf:RDF"]
        .iter()
        .any(|name| extract::has_element(xml, name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Category, SourceFormat};
    use chrono::TimeZone;

    fn source(kind: ContentKind) -> Source {
        Source::new("feed", "Example Feed", Category::Reading, SourceFormat::Rss, "https://example.com/feed")
            .kind(kind)
    }

    const RSS_SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:dc="http://purl.org/dc/elements/1.1/">
  <channel>
    <title>Test Feed</title>
    <item>
      <title><![CDATA[Rust 1.80 <released>]]></title>
      <link>https://example.com/item1</link>
      <guid>item-1</guid>
      <pubDate>Mon, 01 Jan 2024 08:30:00 +0800</pubDate>
      <dc:creator>Ferris</dc:creator>
      <description><![CDATA[<p>First &amp; <b>best</b></p><img src="https://example.com/1.png">]]></description>
    </item>
    <item>
      <title>Test Item 2</title>
      <link>https://example.com/item2</link>
      <pubDate>not a date</pubDate>
      <description>&lt;p&gt;Escaped &amp;amp; body&lt;/p&gt;</description>
    </item>
    <item>
      <title>   </title>
      <link>https://example.com/blank</link>
    </item>
    <item>
      <title>No link</title>
    </item>
    <item>
      <title>Duplicate</title>
      <link>https://example.com/item1-again</link>
      <guid>item-1</guid>
    </item>
  </channel>
</rss>"#;

    const ATOM_SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Atom Test Feed</title>
  <entry>
    <title>Only updated</title>
    <link rel="alternate" href="https://example.com/atom1"/>
    <id>tag:example.com,2024:1</id>
    <updated>2024-03-05T12:00:00+08:00</updated>
    <summary>Entry one</summary>
    <author><name>Alice</name></author>
  </entry>
  <entry>
    <title>Both dates</title>
    <link href="https://example.com/atom2"/>
    <id>tag:example.com,2024:2</id>
    <published>2024-03-01T00:00:00Z</published>
    <updated>2024-03-06T00:00:00Z</updated>
  </entry>
</feed>"#;

    #[test]
    fn test_parse_rss_articles() {
        let items = Normalizer::new()
            .normalize(&source(ContentKind::Article), RSS_SAMPLE)
            .unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].id, "item-1");
        assert_eq!(items[0].title, "Rust 1.80");
        assert_eq!(
            items[0].published_at,
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 30, 0).unwrap())
        );
        let ItemBody::Article(article) = &items[0].body else {
            panic!("expected article");
        };
        assert_eq!(article.summary.as_deref(), Some("First & best"));
        assert_eq!(article.author.as_deref(), Some("Ferris"));
        assert_eq!(article.image_url.as_deref(), Some("https://example.com/1.png"));

        assert_eq!(items[1].id, "https://example.com/item2");
        assert_eq!(items[1].published_at, None);
        let ItemBody::Article(article) = &items[1].body else {
            panic!("expected article");
        };
        assert_eq!(article.summary.as_deref(), Some("Escaped & body"));
    }

    #[test]
    fn test_article_image_comes_from_description() {
        let xml = r#"<rss version="2.0" xmlns:content="http://purl.org/rss/1.0/modules/content/"><channel><item>
            <title>Two images</title>
            <link>https://example.com/two-images</link>
            <content:encoded><![CDATA[<p><img src="https://example.com/body.png"></p>]]></content:encoded>
            <description><![CDATA[<img src="https://example.com/teaser.png"> teaser]]></description>
        </item></channel></rss>"#;
        let items = Normalizer::new()
            .normalize(&source(ContentKind::Article), xml)
            .unwrap();
        let ItemBody::Article(article) = &items[0].body else {
            panic!("expected article");
        };
        assert_eq!(article.image_url.as_deref(), Some("https://example.com/teaser.png"));
    }

    #[test]
    fn test_feedburner_rss_is_not_atom() {
        let xml = r#"<rss version="2.0" xmlns:feedburner="http://rssnamespace.org/feedburner/ext/1.0"><channel>
            <feedburner:info uri="example"/>
            <item>
              <title>Posting an Atom snippet</title>
              <link>https://example.com/snippet</link>
              <description><![CDATA[<pre><entry><title>quoted</title></entry></pre>]]></description>
            </item></channel></rss>"#;
        assert_eq!(FeedFlavor::sniff(xml), FeedFlavor::Rss);
        let items = Normalizer::new()
            .normalize(&source(ContentKind::Article), xml)
            .unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "Posting an Atom snippet");
        assert_eq!(FeedFlavor::sniff(ATOM_SAMPLE), FeedFlavor::Atom);
    }

    #[test]
    fn test_broken_item_does_not_drop_the_rest() {
        let xml = r#"<rss><channel>
            <item><title>First</title><link>https://example.com/1</link></item>
            <item><title>Broken</title><link>https://example.com/2</link><description><![CDATA[cut off</description></item>
            <item><title>Third</title><link>https://example.com/3</link></item>
        </channel></rss>"#;
        let items = Normalizer::new()
            .normalize(&source(ContentKind::Article), xml)
            .unwrap();
        let titles: Vec<&str> = items.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["First", "Third"]);
    }

    #[test]
    fn test_unbounded_duration_is_dropped() {
        let xml = r#"<rss><channel><item><title>Ep</title><guid>ep</guid>
            <enclosure url="https://cdn.example.com/ep.mp3" type="audio/mpeg"/>
            <itunes:duration>1:inf</itunes:duration></item></channel></rss>"#;
        let items = Normalizer::new()
            .normalize(&source(ContentKind::Podcast), xml)
            .unwrap();
        let ItemBody::Podcast(podcast) = &items[0].body else {
            panic!("expected podcast");
        };
        assert_eq!(podcast.duration_secs, None);
    }

    #[test]
    fn test_cdata_titles_are_unwrapped() {
        let items = Normalizer::new()
            .normalize(&source(ContentKind::Article), RSS_SAMPLE)
            .unwrap();
        for item in &items {
            assert!(!item.title.contains("<![CDATA["));
            assert!(!item.title.contains("]]>"));
        }
    }

    #[test]
    fn test_parse_is_idempotent() {
        let normalizer = Normalizer::new();
        let podcast = source(ContentKind::Podcast);
        let xml = r#"<rss><channel><item><title>Episode without link</title>
            <enclosure url="https://cdn.example.com/ep.mp3" type="audio/mpeg"/></item>
            <item><title>Nothing at all</title></item></channel></rss>"#;
        let first = normalizer.normalize(&podcast, xml).unwrap();
        let second = normalizer.normalize(&podcast, xml).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);

        let articles = source(ContentKind::Article);
        let first = normalizer.normalize(&articles, RSS_SAMPLE).unwrap();
        let second = normalizer.normalize(&articles, RSS_SAMPLE).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_atom_updated_fallback() {
        let items = Normalizer::new()
            .normalize(&source(ContentKind::Article), ATOM_SAMPLE)
            .unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(
            items[0].published_at,
            Some(Utc.with_ymd_and_hms(2024, 3, 5, 4, 0, 0).unwrap())
        );
        assert_eq!(
            items[1].published_at,
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(items[0].link, "https://example.com/atom1");
        assert_eq!(items[0].id, "tag:example.com,2024:1");
        let ItemBody::Article(article) = &items[0].body else {
            panic!("expected article");
        };
        assert_eq!(article.author.as_deref(), Some("Alice"));
    }

    #[test]
    fn test_podcast_fields() {
        let xml = r#"<rss xmlns:itunes="http://www.itunes.com/dtds/podcast-1.0.dtd"><channel>
            <itunes:image href="https://example.com/show.jpg"/>
            <item>
              <title>EP12 Hello</title>
              <enclosure url="https://cdn.example.com/ep12.mp3" length="1" type="audio/mpeg"/>
              <itunes:duration>1:05:30</itunes:duration>
              <itunes:episode>12</itunes:episode>
              <description>Show notes</description>
            </item>
        </channel></rss>"#;
        let items = Normalizer::new()
            .normalize(&source(ContentKind::Podcast), xml)
            .unwrap();

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].link, "https://cdn.example.com/ep12.mp3");
        assert_eq!(items[0].id.len(), 64);
        let ItemBody::Podcast(podcast) = &items[0].body else {
            panic!("expected podcast");
        };
        assert_eq!(podcast.audio_url.as_deref(), Some("https://cdn.example.com/ep12.mp3"));
        assert_eq!(podcast.duration_secs, Some(3930));
        assert_eq!(podcast.episode_number, Some(12));
        assert_eq!(podcast.cover_image_url.as_deref(), Some("https://example.com/show.jpg"));
        assert_eq!(podcast.description.as_deref(), Some("Show notes"));
    }

    #[test]
    fn test_youtube_atom_video() {
        let xml = r#"<feed xmlns:yt="http://www.youtube.com/xml/schemas/2015" xmlns:media="http://search.yahoo.com/mrss/">
          <entry>
            <id>yt:video:abc123XYZ_-</id>
            <yt:videoId>abc123XYZ_-</yt:videoId>
            <title>Talk</title>
            <link rel="alternate" href="https://www.youtube.com/watch?v=abc123XYZ_-"/>
            <published>2024-05-01T10:00:00+00:00</published>
            <media:group>
              <media:description>About the talk</media:description>
              <media:community><media:statistics views="12,345"/></media:community>
            </media:group>
          </entry>
          <entry>
            <title>No link video</title>
          </entry>
        </feed>"#;
        let items = Normalizer::new()
            .normalize(&source(ContentKind::Video), xml)
            .unwrap();

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, "abc123XYZ_-");
        let ItemBody::Video(video) = &items[0].body else {
            panic!("expected video");
        };
        assert_eq!(
            video.thumbnail_url.as_deref(),
            Some("https://img.youtube.com/vi/abc123XYZ_-/maxresdefault.jpg")
        );
        assert_eq!(video.view_count, Some(12345));
        assert_eq!(video.description.as_deref(), Some("About the talk"));
        assert_eq!(video.channel_name.as_deref(), Some("Example Feed"));
    }

    #[test]
    fn test_tweets() {
        let xml = r#"<rss><channel><item>
            <title>short</title>
            <dc:creator>Sam Altman (@sama)</dc:creator>
            <description>&lt;p&gt;long text&lt;/p&gt;&lt;img src="https://pbs.example.com/m.jpg"&gt;</description>
            <link>https://x.com/sama/status/1</link>
            <media:content url="https://pbs.example.com/v.mp4" medium="video"/>
        </item></channel></rss>"#;
        let items = Normalizer::new()
            .normalize(&source(ContentKind::Tweet), xml)
            .unwrap();
        let ItemBody::Tweet(tweet) = &items[0].body else {
            panic!("expected tweet");
        };
        assert_eq!(tweet.body_text, "long text");
        assert_eq!(tweet.author_name, "Sam Altman (@sama)");
        assert_eq!(tweet.author_handle, "@sama");
        assert_eq!(
            tweet.media_urls,
            vec!["https://pbs.example.com/v.mp4", "https://pbs.example.com/m.jpg"]
        );
    }

    #[test]
    fn test_relative_dates_need_reference_time() {
        let xml = "<rss><channel><item><title>t</title><link>https://e/1</link><pubDate>3小时前</pubDate></item></channel></rss>";
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();

        let items = Normalizer::new().normalize(&source(ContentKind::Article), xml).unwrap();
        assert_eq!(items[0].published_at, None);

        let items = Normalizer::at(now).normalize(&source(ContentKind::Article), xml).unwrap();
        assert_eq!(items[0].published_at, Some(Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap()));
    }

    #[test]
    fn test_non_feed_body_is_shape_error() {
        let err = Normalizer::new()
            .normalize(&source(ContentKind::Article), "<html><body>blocked</body></html>")
            .unwrap_err();
        assert!(matches!(err, FetchError::UpstreamShapeChanged(_)));

        let empty = Normalizer::new()
            .normalize(&source(ContentKind::Article), "<rss><channel><title>x</title></channel></rss>")
            .unwrap();
        assert!(empty.is_empty());
    }
}
