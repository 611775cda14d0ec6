use std::cmp::Ordering;
use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::ContentKind;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub summary: Option<String>,
    pub content: Option<String>,
    pub author: Option<String>,
    pub image_url: Option<String>,
    pub score: Option<i64>,
    /// Upstream badge ("1.2万", "356回复", "⭐ 8.5").
    pub info: Option<String>,
    pub mobile_link: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Podcast {
    pub audio_url: Option<String>,
    pub duration_secs: Option<u64>,
    pub episode_number: Option<i64>,
    pub cover_image_url: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Video {
    pub video_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub view_count: Option<u64>,
    pub duration_secs: Option<u64>,
    pub channel_name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Tweet {
    pub body_text: String,
    pub author_name: String,
    pub author_handle: String,
    pub media_urls: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ItemBody {
    Article(Article),
    Podcast(Podcast),
    Video(Video),
    Tweet(Tweet),
}

/// One entry of a hot list or feed, after normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedItem {
    pub id: String,
    pub title: String,
    pub link: String,
    pub published_at: Option<DateTime<Utc>>,
    pub source_id: String,
    pub body: ItemBody,
}

impl NormalizedItem {
    pub fn new(
        source_id: &str,
        id: impl Into<String>,
        title: impl Into<String>,
        link: impl Into<String>,
        body: ItemBody,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            link: link.into(),
            published_at: None,
            source_id: source_id.to_string(),
            body,
        }
    }

    pub fn article(
        source_id: &str,
        id: impl Into<String>,
        title: impl Into<String>,
        link: impl Into<String>,
        article: Article,
    ) -> Self {
        Self::new(source_id, id, title, link, ItemBody::Article(article))
    }

    pub fn published(mut self, at: Option<DateTime<Utc>>) -> Self {
        self.published_at = at;
        self
    }

    /// Deterministic id for records that carry neither guid nor link.
    pub fn generate_id(source_id: &str, key: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(source_id.as_bytes());
        hasher.update([0u8]);
        hasher.update(key.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn kind(&self) -> ContentKind {
        match self.body {
            ItemBody::Article(_) => ContentKind::Article,
            ItemBody::Podcast(_) => ContentKind::Podcast,
            ItemBody::Video(_) => ContentKind::Video,
            ItemBody::Tweet(_) => ContentKind::Tweet,
        }
    }

    /// Short text for list display.
    pub fn blurb(&self) -> Option<&str> {
        match &self.body {
            ItemBody::Article(a) => a.info.as_deref().or(a.summary.as_deref()),
            ItemBody::Podcast(p) => p.description.as_deref(),
            ItemBody::Video(v) => v.channel_name.as_deref(),
            ItemBody::Tweet(t) => Some(t.author_handle.as_str()),
        }
    }
}

/// Newest first; undated items last; ties broken by id then source id so the
/// order is total.
pub fn recency_order(a: &NormalizedItem, b: &NormalizedItem) -> Ordering {
    match (a.published_at, b.published_at) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then_with(|| a.id.cmp(&b.id))
    .then_with(|| a.source_id.cmp(&b.source_id))
}

/// Collects one fetch's items, dropping blank titles and repeated ids.
/// The first occurrence of an id wins.
#[derive(Debug, Default)]
pub struct ItemList {
    items: Vec<NormalizedItem>,
    seen: HashSet<String>,
}

impl ItemList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns whether the item was kept.
    pub fn push(&mut self, mut item: NormalizedItem) -> bool {
        let title = item.title.trim();
        if title.is_empty() || item.id.is_empty() {
            return false;
        }
        if title.len() != item.title.len() {
            item.title = title.to_string();
        }
        if !self.seen.insert(item.id.clone()) {
            return false;
        }
        self.items.push(item);
        true
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn into_vec(self) -> Vec<NormalizedItem> {
        self.items
    }
}

impl Extend<NormalizedItem> for ItemList {
    fn extend<I: IntoIterator<Item = NormalizedItem>>(&mut self, iter: I) {
        for item in iter {
            self.push(item);
        }
    }
}

impl FromIterator<NormalizedItem> for ItemList {
    fn from_iter<I: IntoIterator<Item = NormalizedItem>>(iter: I) -> Self {
        let mut list = ItemList::new();
        list.extend(iter);
        list
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn item(id: &str, title: &str) -> NormalizedItem {
        NormalizedItem::article("src", id, title, "https://example.com", Article::default())
    }

    #[test]
    fn test_id_generation_deterministic() {
        let id1 = NormalizedItem::generate_id("podcast", "Episode 1#0");
        let id2 = NormalizedItem::generate_id("podcast", "Episode 1#0");
        assert_eq!(id1, id2);
        assert_eq!(id1.len(), 64);
        assert!(id1.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_id_generation_separates_fields() {
        assert_ne!(
            NormalizedItem::generate_id("ab", "c"),
            NormalizedItem::generate_id("a", "bc")
        );
    }

    #[test]
    fn test_item_list_drops_blank_titles() {
        let list: ItemList = vec![item("1", "  "), item("2", ""), item("3", " ok ")]
            .into_iter()
            .collect();
        let items = list.into_vec();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "ok");
    }

    #[test]
    fn test_item_list_first_duplicate_wins() {
        let mut list = ItemList::new();
        assert!(list.push(item("a", "first")));
        assert!(!list.push(item("a", "second")));
        assert!(list.push(item("b", "third")));
        let items = list.into_vec();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title, "first");
    }

    #[test]
    fn test_recency_order() {
        let t = |d| Some(Utc.with_ymd_and_hms(2024, 1, d, 0, 0, 0).unwrap());
        let mut items = vec![
            item("z", "undated"),
            item("b", "old").published(t(1)),
            item("a", "undated too"),
            item("c", "new").published(t(5)),
            item("a", "same day").published(t(1)),
        ];
        items.sort_by(recency_order);
        let ids: Vec<_> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b", "a", "z"]);
        assert_eq!(items[3].title, "undated too");
    }

    #[test]
    fn test_serde_keeps_variant_fields() {
        let original = NormalizedItem::new(
            "pod",
            "ep-1",
            "Episode",
            "https://example.com/ep1",
            ItemBody::Podcast(Podcast {
                audio_url: Some("https://example.com/ep1.mp3".into()),
                duration_secs: Some(3930),
                episode_number: Some(12),
                cover_image_url: None,
                description: Some("desc".into()),
            }),
        );
        let json = serde_json::to_string(&original).unwrap();
        assert!(json.contains("\"kind\":\"podcast\""));
        let back: NormalizedItem = serde_json::from_str(&json).unwrap();
        assert_eq!(back, original);
    }
}
