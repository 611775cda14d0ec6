use serde::Deserialize;

use crate::domain::{Category, ContentKind, Language, Source, SourceFormat};

/// A subscribed RSS/Atom feed from the `[[feeds]]` table.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    pub id: String,
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub kind: ContentKind,
    pub category: Option<String>,
    /// `rss` or `atom`; the parser sniffs the body either way.
    pub format: Option<SourceFormat>,
    #[serde(default)]
    pub language: Language,
}

impl FeedConfig {
    pub fn to_source(&self) -> Source {
        let mut source = Source::new(
            &self.id,
            &self.name,
            Category::Reading,
            self.format.unwrap_or(SourceFormat::Rss),
            &self.url,
        )
        .kind(self.kind)
        .language(self.language)
        .interval(1800);
        source.tag = self.category.clone();
        source
    }
}

/// `[overrides.<id>]`: replaces a built-in source's upstream URL.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceOverride {
    pub url: String,
    /// Landing page for sources that harvest cookies before the API call.
    pub home: Option<String>,
}
