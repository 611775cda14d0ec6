//! Source adapters.
//!
//! Every upstream is reached through a [`SourceAdapter`]: a static
//! [`Source`] descriptor plus a `fetch` that turns one or more HTTP
//! exchanges into [`NormalizedItem`]s. Built-in hot lists are dispatched by
//! [`Provider`]; subscribed RSS/Atom feeds go through [`FeedAdapter`].

pub mod bestblogs;
mod china;
pub mod coolapk;
mod feed;
mod finance;
pub mod lenient;
pub mod registry;
mod tech;

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use url::Url;

use crate::app::FetchError;
use crate::domain::{ItemList, NormalizedItem, Source};
use crate::fetcher::Transport;

pub use feed::FeedAdapter;
pub use registry::{HotListAdapter, Provider, Registry};

/// Extra parameters for sources that take them (BestBlogs filters).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    params: BTreeMap<String, String>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.params.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Cache key for this query against `source_id`: the bare id when there
    /// are no parameters, otherwise `id?k=v&...` with keys sorted.
    pub fn cache_key(&self, source_id: &str) -> String {
        if self.params.is_empty() {
            return source_id.to_string();
        }
        let pairs: Vec<String> = self
            .params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        format!("{}?{}", source_id, pairs.join("&"))
    }
}

impl FromIterator<(String, String)> for Query {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            params: iter.into_iter().collect(),
        }
    }
}

/// Everything an adapter may use during one fetch.
pub struct FetchContext<'a> {
    pub transport: &'a Transport,
    pub query: &'a Query,
    /// Wall clock for URL placeholders, tokens and relative dates.
    pub now: DateTime<Utc>,
}

impl<'a> FetchContext<'a> {
    pub fn new(transport: &'a Transport, query: &'a Query, now: DateTime<Utc>) -> Self {
        Self {
            transport,
            query,
            now,
        }
    }

    pub fn url(&self, source: &Source) -> Result<Url, FetchError> {
        source.render_url(self.now)
    }
}

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn descriptor(&self) -> &Source;

    /// Fetch and normalize. An empty list means the upstream reported zero
    /// items; missing markers or containers are `UpstreamShapeChanged`.
    async fn fetch(&self, cx: &FetchContext<'_>) -> Result<Vec<NormalizedItem>, FetchError>;
}

/// Apply the common post-conditions: blank titles dropped, first id wins.
pub(crate) fn finish(items: impl IntoIterator<Item = NormalizedItem>) -> Vec<NormalizedItem> {
    items.into_iter().collect::<ItemList>().into_vec()
}

/// Last non-empty path segment of a URL, e.g. the question id in a Zhihu link.
pub(crate) fn last_segment(link: &str) -> Option<String> {
    let url = Url::parse(link).ok()?;
    url.path_segments()?
        .filter(|s| !s.is_empty())
        .last()
        .map(str::to_string)
}
