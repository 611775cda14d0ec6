//! Developer and gadget communities.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use super::{lenient, FetchContext};
use crate::app::FetchError;
use crate::domain::{Article, ItemBody, NormalizedItem, Source};
use crate::fetcher::{FetchRequest, DESKTOP_UA};
use crate::normalizer::Normalizer;
use crate::text::{clean_html, decode_entities, format_relative, parse_local, truncate};

static RE_KR_FLASH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"class="item-title"[^>]*href="(/newsflashes/\d+)"[^>]*>([^<]+)</a>"#).unwrap()
});
static RE_CNBETA_CATEGORY: Lazy<Regex> = Lazy::new(|| Regex::new(r"/articles/(\w+)/").unwrap());

const HACKERNEWS_TOP: usize = 30;

// ---- v2ex ----

#[derive(Deserialize)]
struct V2exTopic {
    #[serde(default, deserialize_with = "lenient::string")]
    id: String,
    #[serde(default, deserialize_with = "lenient::string")]
    title: String,
    #[serde(default, deserialize_with = "lenient::string")]
    url: String,
    #[serde(default, deserialize_with = "lenient::string")]
    content: String,
    #[serde(default, deserialize_with = "lenient::opt_i64")]
    replies: Option<i64>,
    #[serde(default, deserialize_with = "lenient::opt_i64")]
    created: Option<i64>,
}

pub(super) async fn v2ex(cx: &FetchContext<'_>, source: &Source) -> Result<Vec<NormalizedItem>, FetchError> {
    let values: Vec<serde_json::Value> = cx.transport.fetch_decoded(cx.url(source)?, &[]).await?;
    let topics: Vec<V2exTopic> = lenient::decode_records(values);

    Ok(topics
        .into_iter()
        .filter(|t| !t.id.is_empty())
        .map(|t| {
            let link = if t.url.is_empty() {
                format!("https://www.v2ex.com/t/{}", t.id)
            } else {
                t.url
            };
            let content = clean_html(&t.content);
            NormalizedItem::article(
                &source.id,
                t.id,
                t.title,
                link,
                Article {
                    summary: (!content.is_empty()).then(|| truncate(&content, 200)),
                    content: (!content.is_empty()).then_some(content),
                    info: t.replies.map(|n| format!("{}回复", n)),
                    ..Article::default()
                },
            )
            .published(t.created.and_then(|s| DateTime::<Utc>::from_timestamp(s, 0)))
        })
        .collect())
}

// ---- ithome ----

#[derive(Deserialize)]
struct IthomeResponse {
    #[serde(default, deserialize_with = "lenient::opt_records")]
    newslist: Option<Vec<IthomeEntry>>,
}

#[derive(Deserialize)]
struct IthomeEntry {
    #[serde(default, deserialize_with = "lenient::string")]
    newsid: String,
    #[serde(default, deserialize_with = "lenient::string")]
    title: String,
    #[serde(default, deserialize_with = "lenient::string")]
    url: String,
    #[serde(default, deserialize_with = "lenient::string")]
    postdate: String,
    #[serde(default, deserialize_with = "lenient::string")]
    description: String,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    image: Option<String>,
}

pub(super) async fn ithome(cx: &FetchContext<'_>, source: &Source) -> Result<Vec<NormalizedItem>, FetchError> {
    let response: IthomeResponse = cx.transport.fetch_decoded(cx.url(source)?, &[]).await?;
    let entries = lenient::required(response.newslist, "newslist")?;

    Ok(entries
        .into_iter()
        .filter(|e| !e.newsid.is_empty())
        .map(|e| {
            let link = if e.url.starts_with('/') {
                format!("https://www.ithome.com{}", e.url)
            } else if e.url.is_empty() {
                format!("https://www.ithome.com/0/{}.htm", e.newsid)
            } else {
                e.url
            };
            let mobile = link.replace("www.ithome.com", "m.ithome.com");
            let description = clean_html(&e.description);
            let published = parse_local(&e.postdate, 8);
            NormalizedItem::article(
                &source.id,
                e.newsid,
                e.title,
                link,
                Article {
                    summary: (!description.is_empty()).then_some(description),
                    image_url: e.image,
                    mobile_link: Some(mobile),
                    ..Article::default()
                },
            )
            .published(published)
        })
        .collect())
}

// ---- juejin ----

#[derive(Deserialize)]
struct JuejinResponse {
    #[serde(default, deserialize_with = "lenient::opt_records")]
    data: Option<Vec<JuejinEntry>>,
}

#[derive(Deserialize)]
struct JuejinEntry {
    #[serde(default, deserialize_with = "lenient::or_default")]
    content: JuejinContent,
    #[serde(default, deserialize_with = "lenient::or_default")]
    content_counter: JuejinCounter,
}

#[derive(Default, Deserialize)]
struct JuejinContent {
    #[serde(default, deserialize_with = "lenient::string")]
    content_id: String,
    #[serde(default, deserialize_with = "lenient::string")]
    title: String,
    #[serde(default, deserialize_with = "lenient::string")]
    brief: String,
}

#[derive(Default, Deserialize)]
struct JuejinCounter {
    #[serde(default, deserialize_with = "lenient::opt_i64")]
    view: Option<i64>,
}

pub(super) async fn juejin(cx: &FetchContext<'_>, source: &Source) -> Result<Vec<NormalizedItem>, FetchError> {
    let response: JuejinResponse = cx.transport.fetch_decoded(cx.url(source)?, &[]).await?;
    let entries = lenient::required(response.data, "data")?;

    Ok(entries
        .into_iter()
        .filter(|e| !e.content.content_id.is_empty())
        .map(|e| {
            let c = e.content;
            let link = format!("https://juejin.cn/post/{}", c.content_id);
            let brief = clean_html(&c.brief);
            NormalizedItem::article(
                &source.id,
                c.content_id,
                c.title,
                link,
                Article {
                    summary: (!brief.is_empty()).then_some(brief),
                    info: e.content_counter.view.map(|v| format!("{}阅读", v)),
                    ..Article::default()
                },
            )
        })
        .collect())
}

// ---- 36kr ----

pub(super) async fn kr36(cx: &FetchContext<'_>, source: &Source) -> Result<Vec<NormalizedItem>, FetchError> {
    let html = cx
        .transport
        .fetch_text(cx.url(source)?, &[("User-Agent", DESKTOP_UA)])
        .await?;
    if !html.contains("item-title") {
        return Err(FetchError::shape("no `item-title` entries in newsflash page"));
    }

    let mut seen = std::collections::HashSet::new();
    Ok(RE_KR_FLASH
        .captures_iter(&html)
        .filter(|caps| seen.insert(caps[1].to_string()))
        .map(|caps| {
            let path = caps[1].to_string();
            let link = format!("https://www.36kr.com{}", path);
            NormalizedItem::article(&source.id, path, decode_entities(&caps[2]), link, Article::default())
        })
        .collect())
}

// ---- sspai ----

#[derive(Deserialize)]
struct SspaiResponse {
    #[serde(default, deserialize_with = "lenient::opt_records")]
    data: Option<Vec<SspaiEntry>>,
}

#[derive(Deserialize)]
struct SspaiEntry {
    #[serde(default, deserialize_with = "lenient::string")]
    id: String,
    #[serde(default, deserialize_with = "lenient::string")]
    title: String,
    #[serde(default, deserialize_with = "lenient::string")]
    summary: String,
    #[serde(default, deserialize_with = "lenient::opt_i64")]
    released_time: Option<i64>,
}

pub(super) async fn sspai(cx: &FetchContext<'_>, source: &Source) -> Result<Vec<NormalizedItem>, FetchError> {
    let response: SspaiResponse = cx.transport.fetch_decoded(cx.url(source)?, &[]).await?;
    let entries = lenient::required(response.data, "data")?;

    Ok(entries
        .into_iter()
        .filter(|e| !e.id.is_empty())
        .map(|e| {
            let link = format!("https://sspai.com/post/{}", e.id);
            let summary = clean_html(&e.summary);
            NormalizedItem::article(
                &source.id,
                e.id,
                e.title,
                link,
                Article {
                    summary: (!summary.is_empty()).then_some(summary),
                    ..Article::default()
                },
            )
            .published(e.released_time.and_then(|s| DateTime::<Utc>::from_timestamp(s, 0)))
        })
        .collect())
}

// ---- cnbeta ----

fn cnbeta_category(link: &str) -> Option<&'static str> {
    let caps = RE_CNBETA_CATEGORY.captures(link)?;
    Some(match &caps[1] {
        "tech" => "科技",
        "game" => "游戏",
        "science" => "科学",
        "movie" => "影视",
        "music" => "音乐",
        "comic" => "动漫",
        _ => return None,
    })
}

pub(super) async fn cnbeta(cx: &FetchContext<'_>, source: &Source) -> Result<Vec<NormalizedItem>, FetchError> {
    // The feed host's certificate chain does not validate.
    let request = FetchRequest::get(cx.url(source)?)
        .header("User-Agent", DESKTOP_UA)
        .insecure();
    let xml = cx.transport.text(request).await?;
    let mut items = Normalizer::at(cx.now).normalize(source, &xml)?;

    for item in &mut items {
        let category = cnbeta_category(&item.link);
        let when = item.published_at.map(|at| format_relative(at, cx.now));
        if let ItemBody::Article(article) = &mut item.body {
            article.info = match (category, when) {
                (Some(c), Some(w)) => Some(format!("{} · {}", c, w)),
                (Some(c), None) => Some(c.to_string()),
                (None, w) => w,
            };
        }
    }
    Ok(items)
}

// ---- hackernews ----

#[derive(Deserialize)]
struct HnItem {
    #[serde(default, deserialize_with = "lenient::string")]
    id: String,
    #[serde(default, deserialize_with = "lenient::string")]
    title: String,
    #[serde(default, deserialize_with = "lenient::opt_i64")]
    score: Option<i64>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    by: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_i64")]
    time: Option<i64>,
}

/// Top story ids, then each story fetched concurrently. A story that fails
/// to load is skipped unless every one of them fails.
pub(super) async fn hackernews(cx: &FetchContext<'_>, source: &Source) -> Result<Vec<NormalizedItem>, FetchError> {
    let list_url = cx.url(source)?;
    let ids: Vec<u64> = cx.transport.fetch_decoded(list_url.clone(), &[]).await?;
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let requests = ids.iter().take(HACKERNEWS_TOP).map(|id| {
        let item_url = list_url.join(&format!("item/{}.json", id));
        async move { cx.transport.fetch_decoded::<HnItem>(item_url?, &[]).await }
    });
    let results = join_all(requests).await;

    let mut first_error = None;
    let mut stories = Vec::new();
    for result in results {
        match result {
            Ok(story) => stories.push(story),
            Err(e) => {
                tracing::debug!(source = %source.id, error = %e, "story fetch failed");
                first_error.get_or_insert(e);
            }
        }
    }
    if stories.is_empty() {
        if let Some(e) = first_error {
            return Err(e);
        }
    }

    stories.sort_by(|a, b| b.score.unwrap_or(0).cmp(&a.score.unwrap_or(0)));

    Ok(stories
        .into_iter()
        .filter(|s| !s.id.is_empty())
        .map(|s| {
            let link = format!("https://news.ycombinator.com/item?id={}", s.id);
            NormalizedItem::article(
                &source.id,
                s.id,
                s.title,
                link,
                Article {
                    author: s.by,
                    score: s.score,
                    info: s.score.map(|n| format!("{} points", n)),
                    ..Article::default()
                },
            )
            .published(s.time.and_then(|t| DateTime::<Utc>::from_timestamp(t, 0)))
        })
        .collect())
}

// ---- github ----

#[derive(Deserialize)]
struct GithubSearch {
    #[serde(default, deserialize_with = "lenient::opt_records")]
    items: Option<Vec<GithubRepo>>,
}

#[derive(Deserialize)]
struct GithubRepo {
    #[serde(default, deserialize_with = "lenient::string")]
    id: String,
    #[serde(default, deserialize_with = "lenient::string")]
    full_name: String,
    #[serde(default, deserialize_with = "lenient::string")]
    html_url: String,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    description: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_i64")]
    stargazers_count: Option<i64>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    language: Option<String>,
    #[serde(default, deserialize_with = "lenient::or_default")]
    created_at: Option<DateTime<Utc>>,
}

pub(super) async fn github(cx: &FetchContext<'_>, source: &Source) -> Result<Vec<NormalizedItem>, FetchError> {
    let response: GithubSearch = cx
        .transport
        .fetch_decoded(
            cx.url(source)?,
            &[("Accept", "application/vnd.github.v3+json"), ("User-Agent", "trendfeed")],
        )
        .await?;
    let repos = lenient::required(response.items, "items")?;

    Ok(repos
        .into_iter()
        .filter(|r| !r.id.is_empty() && !r.html_url.is_empty())
        .map(|r| {
            let title = match &r.description {
                Some(desc) => format!("{} - {}", r.full_name, desc.trim()),
                None => r.full_name.clone(),
            };
            NormalizedItem::article(
                &source.id,
                r.id,
                title,
                r.html_url,
                Article {
                    summary: r.description,
                    score: r.stargazers_count,
                    info: repo_info(r.stargazers_count, r.language.as_deref()),
                    ..Article::default()
                },
            )
            .published(r.created_at)
        })
        .collect())
}

fn repo_info(stars: Option<i64>, language: Option<&str>) -> Option<String> {
    let language = language.map(str::trim).filter(|l| !l.is_empty());
    match (stars, language) {
        (Some(n), Some(lang)) => Some(format!("⭐ {} · {}", n, lang)),
        (Some(n), None) => Some(format!("⭐ {}", n)),
        (None, Some(lang)) => Some(lang.to_string()),
        (None, None) => None,
    }
}
