use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::app::FetchError;

/// How the upstream publishes its list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceFormat {
    HotListJson,
    HotListHtml,
    Rss,
    Atom,
}

impl SourceFormat {
    pub fn is_feed(self) -> bool {
        matches!(self, SourceFormat::Rss | SourceFormat::Atom)
    }
}

/// Which item variant a source produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    #[default]
    Article,
    Podcast,
    Video,
    #[serde(alias = "twitter")]
    Tweet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    China,
    World,
    Tech,
    Finance,
    /// Subscribed RSS/Atom feeds and curated reading lists.
    Reading,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListType {
    #[default]
    Hottest,
    Realtime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Chinese,
    English,
    Bilingual,
}

/// How quickly a source's data goes stale. Selects the cache TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Volatility {
    HotList,
    Feed,
}

/// Static descriptor of an upstream. Loaded once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub id: String,
    pub name: String,
    /// Board name shown next to the source name ("热搜", "快讯").
    pub title: Option<String>,
    pub category: Category,
    /// Free-form grouping for subscribed feeds ("人工智能", "科技播客").
    pub tag: Option<String>,
    pub format: SourceFormat,
    pub kind: ContentKind,
    pub url_template: String,
    pub home: Option<String>,
    pub list_type: ListType,
    pub language: Language,
    pub poll_interval_secs: u64,
}

impl Source {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        category: Category,
        format: SourceFormat,
        url_template: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            title: None,
            category,
            tag: None,
            format,
            kind: ContentKind::Article,
            url_template: url_template.into(),
            home: None,
            list_type: ListType::Hottest,
            language: Language::Chinese,
            poll_interval_secs: 600,
        }
    }

    pub fn titled(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }

    pub fn home(mut self, home: &str) -> Self {
        self.home = Some(home.to_string());
        self
    }

    pub fn realtime(mut self) -> Self {
        self.list_type = ListType::Realtime;
        self
    }

    pub fn interval(mut self, secs: u64) -> Self {
        self.poll_interval_secs = secs;
        self
    }

    pub fn kind(mut self, kind: ContentKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn language(mut self, language: Language) -> Self {
        self.language = language;
        self
    }

    pub fn volatility(&self) -> Volatility {
        if self.format.is_feed() {
            Volatility::Feed
        } else {
            Volatility::HotList
        }
    }

    pub fn display_name(&self) -> String {
        match &self.title {
            Some(title) => format!("{} {}", self.name, title),
            None => self.name.clone(),
        }
    }

    /// Expand placeholders in the URL template and validate the result.
    ///
    /// Supported: `{timestamp}` (unix seconds), `{timestamp_ms}`, and
    /// `{since_date}` (`yyyy-mm-dd`, seven days before `now`).
    pub fn render_url(&self, now: DateTime<Utc>) -> Result<Url, FetchError> {
        let rendered = self
            .url_template
            .replace("{timestamp_ms}", &now.timestamp_millis().to_string())
            .replace("{timestamp}", &now.timestamp().to_string())
            .replace(
                "{since_date}",
                &(now - Duration::days(7)).format("%Y-%m-%d").to_string(),
            );

        if let Some(start) = rendered.find('{') {
            let placeholder: String = rendered[start..].chars().take_while(|c| *c != '}').collect();
            return Err(FetchError::InvalidUrl(format!(
                "unresolved placeholder {}}} in {}",
                placeholder, self.url_template
            )));
        }

        Ok(Url::parse(&rendered)?)
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.display_name(), self.id)
    }
}
