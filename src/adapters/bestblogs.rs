//! BestBlogs: a curated, AI-scored article feed.
//!
//! Titles carry a `[NN分]` score. The description is an HTML digest with
//! emoji-marked sections (📌 one-liner, 📝 detailed summary, 💡 key
//! points, 💬 quotes) that are lifted into `summary` and `content`.

use once_cell::sync::Lazy;
use regex::Regex;

use super::FetchContext;
use crate::app::FetchError;
use crate::domain::{Article, NormalizedItem, Source};
use crate::fetcher::FetchRequest;
use crate::normalizer::extract::{self, tag_text};
use crate::text::{clean_html, decode_entities, parse_feed_date, truncate, unescape_markup};

static RE_SCORE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[(\d+)分\]").unwrap());
static RE_SCORE_STRIP: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[\d+分\]\s*").unwrap());

pub const DEFAULT_TIME_FILTER: &str = "1w";
/// Values accepted for the `category` query parameter.
pub const CATEGORIES: &[&str] = &["programming", "ai", "product", "business"];

const SUMMARY_CHARS: usize = 200;

/// Append the feed's filter parameters from `query` to `base`.
pub fn feed_url(base: url::Url, query: &super::Query) -> url::Url {
    let mut url = base;
    {
        let mut pairs = url.query_pairs_mut();
        pairs.append_pair("timeFilter", query.get("timeFilter").unwrap_or(DEFAULT_TIME_FILTER));
        pairs.append_pair("type", "article");
        if let Some(category) = query.get("category").filter(|c| CATEGORIES.contains(c)) {
            pairs.append_pair("category", category);
        }
        if query
            .get("featured")
            .is_some_and(|f| matches!(f, "y" | "yes" | "true" | "1"))
        {
            pairs.append_pair("featured", "y");
        }
        if let Some(min) = query.get("minScore").and_then(|m| m.parse::<u32>().ok()) {
            pairs.append_pair("minScore", &min.to_string());
        }
    }
    url
}

pub fn title_score(title: &str) -> Option<i64> {
    RE_SCORE.captures(title).and_then(|caps| caps[1].parse().ok())
}

pub fn strip_score(title: &str) -> String {
    RE_SCORE_STRIP.replace_all(title, "").trim().to_string()
}

/// Inner HTML of the first `<tag ...>...</tag>` after `marker`.
fn section_after<'a>(html: &'a str, marker: &str, tag: &str) -> Option<&'a str> {
    let from = html.find(marker)? + marker.len();
    let rest = &html[from..];
    let open = rest.find(&format!("<{}", tag))?;
    let content_start = open + rest[open..].find('>')? + 1;
    let close = rest[content_start..].find(&format!("</{}>", tag))?;
    Some(&rest[content_start..content_start + close])
}

fn list_items(html: &str) -> Vec<String> {
    extract::blocks(html, "li")
        .into_iter()
        .map(clean_html)
        .filter(|item| !item.is_empty())
        .collect()
}

/// 📝 detailed summary, else the 📌 one-liner, else the whole description.
pub fn digest_summary(description: &str) -> String {
    ["📝", "📌"]
        .iter()
        .filter_map(|marker| section_after(description, marker, "p"))
        .map(clean_html)
        .find(|s| !s.is_empty())
        .unwrap_or_else(|| clean_html(description))
}

/// Sectioned body: 【详细摘要】, numbered 【主要观点】, bulleted 【文章金句】.
pub fn digest_content(description: &str) -> Option<String> {
    let mut sections = Vec::new();

    if let Some(detail) = section_after(description, "📝", "p").map(clean_html) {
        if !detail.is_empty() {
            sections.push(format!("【详细摘要】\n{}", detail));
        }
    }

    let points = section_after(description, "💡", "ol").map(list_items).unwrap_or_default();
    if !points.is_empty() {
        let numbered: Vec<String> = points
            .iter()
            .enumerate()
            .map(|(i, p)| format!("{}. {}", i + 1, p))
            .collect();
        sections.push(format!("【主要观点】\n{}", numbered.join("\n")));
    }

    let quotes = section_after(description, "💬", "ul").map(list_items).unwrap_or_default();
    if !quotes.is_empty() {
        let bulleted: Vec<String> = quotes.iter().map(|q| format!("• {}", q)).collect();
        sections.push(format!("【文章金句】\n{}", bulleted.join("\n")));
    }

    (!sections.is_empty()).then(|| sections.join("\n\n"))
}

pub fn parse(source: &Source, xml: &str) -> Vec<NormalizedItem> {
    extract::blocks(xml, "item")
        .into_iter()
        .filter_map(|block| {
            let raw_title = tag_text(block, "title")?;
            let link = tag_text(block, "link").map(|l| decode_entities(&l))?;
            let description = tag_text(block, "description")
                .map(|d| unescape_markup(&d))
                .unwrap_or_default();

            let summary = truncate(&digest_summary(&description), SUMMARY_CHARS);
            let id = tag_text(block, "guid").unwrap_or_else(|| link.clone());
            let published = tag_text(block, "pubDate").and_then(|d| parse_feed_date(&d));

            Some(
                NormalizedItem::article(
                    &source.id,
                    id,
                    clean_html(&strip_score(&raw_title)),
                    link,
                    Article {
                        summary: (!summary.is_empty()).then_some(summary),
                        content: digest_content(&description),
                        author: tag_text(block, "dc:creator").map(|a| clean_html(&a)),
                        image_url: tag_attr_enclosure(block),
                        score: title_score(&raw_title),
                        info: tag_text(block, "category").map(|c| clean_html(&c)),
                        ..Article::default()
                    },
                )
                .published(published),
            )
        })
        .collect()
}

fn tag_attr_enclosure(block: &str) -> Option<String> {
    extract::tag_attr(block, "enclosure", "url").filter(|u| !u.is_empty())
}

pub(super) async fn fetch(cx: &FetchContext<'_>, source: &Source) -> Result<Vec<NormalizedItem>, FetchError> {
    let url = feed_url(cx.url(source)?, cx.query);
    let xml = cx.transport.text(FetchRequest::get(url)).await?;
    if !xml.contains("<rss") && !xml.contains("<channel") {
        return Err(FetchError::shape("response is not an RSS document"));
    }
    Ok(parse(source, &xml))
}
