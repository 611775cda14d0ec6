//! Domestic hot lists: search trends, portals and forums.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use super::{last_segment, lenient, FetchContext};
use crate::app::FetchError;
use crate::domain::{Article, NormalizedItem, Source};
use crate::fetcher::DESKTOP_UA;
use crate::text::{clean_html, decode_entities, encode_component, format_count, parse_local, truncate};

static RE_HUPU_POST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"<li class="bbs-sl-web-post-body">[\s\S]*?<a href="(/[^"]+?\.html)"[^>]*?class="p-title"[^>]*>([^<]+)</a>"#,
    )
    .unwrap()
});
static RE_IFENG_DATA: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"var\s+allData\s*=\s*(\{[\s\S]*?\});").unwrap());

const BAIDU_MARKER: &str = "<!--s-data:";

fn badge(count: Option<i64>) -> Option<String> {
    count.filter(|n| *n > 0).map(format_count)
}

// ---- weibo ----

#[derive(Deserialize)]
struct WeiboResponse {
    #[serde(default, deserialize_with = "lenient::or_default")]
    data: Option<WeiboData>,
}

#[derive(Default, Deserialize)]
struct WeiboData {
    #[serde(default, deserialize_with = "lenient::opt_records")]
    realtime: Option<Vec<WeiboEntry>>,
}

#[derive(Deserialize)]
struct WeiboEntry {
    #[serde(default, deserialize_with = "lenient::string")]
    word: String,
    #[serde(default, deserialize_with = "lenient::opt_i64")]
    num: Option<i64>,
    #[serde(default, deserialize_with = "lenient::flag")]
    is_new: bool,
    #[serde(default, deserialize_with = "lenient::flag")]
    is_hot: bool,
    #[serde(default, deserialize_with = "lenient::flag")]
    is_fei: bool,
}

pub(super) async fn weibo(cx: &FetchContext<'_>, source: &Source) -> Result<Vec<NormalizedItem>, FetchError> {
    let response: WeiboResponse = cx
        .transport
        .fetch_decoded(
            cx.url(source)?,
            &[("Referer", "https://weibo.com/"), ("Accept", "application/json")],
        )
        .await?;
    let entries = lenient::required(response.data.and_then(|d| d.realtime), "data.realtime")?;

    Ok(entries
        .into_iter()
        .enumerate()
        .map(|(i, e)| {
            let label = if e.is_new {
                Some("新")
            } else if e.is_hot {
                Some("热")
            } else if e.is_fei {
                Some("沸")
            } else {
                None
            };
            let info = match (label, badge(e.num)) {
                (Some(label), Some(count)) => Some(format!("{} · {}", label, count)),
                (label, count) => count.or(label.map(str::to_string)),
            };
            let link = format!("https://s.weibo.com/weibo?q=%23{}%23", encode_component(&e.word));
            NormalizedItem::article(
                &source.id,
                format!("{}_{}", e.word, i),
                e.word,
                link,
                Article {
                    info,
                    ..Article::default()
                },
            )
        })
        .collect())
}

// ---- zhihu ----

#[derive(Deserialize)]
struct ZhihuResponse {
    #[serde(default, deserialize_with = "lenient::opt_records")]
    data: Option<Vec<ZhihuEntry>>,
}

#[derive(Deserialize)]
struct ZhihuEntry {
    #[serde(default, deserialize_with = "lenient::or_default")]
    target: ZhihuTarget,
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct ZhihuTarget {
    title_area: TextField,
    excerpt_area: TextField,
    metrics_area: TextField,
    link: LinkField,
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct TextField {
    text: String,
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct LinkField {
    url: String,
}

pub(super) async fn zhihu(cx: &FetchContext<'_>, source: &Source) -> Result<Vec<NormalizedItem>, FetchError> {
    let response: ZhihuResponse = cx.transport.fetch_decoded(cx.url(source)?, &[]).await?;
    let entries = lenient::required(response.data, "data")?;

    Ok(entries
        .into_iter()
        .filter_map(|e| {
            let t = e.target;
            let id = last_segment(&t.link.url)?;
            let excerpt = clean_html(&t.excerpt_area.text);
            Some(NormalizedItem::article(
                &source.id,
                id,
                t.title_area.text,
                t.link.url,
                Article {
                    summary: (!excerpt.is_empty()).then(|| truncate(&excerpt, 200)),
                    content: (!excerpt.is_empty()).then_some(excerpt),
                    info: Some(t.metrics_area.text).filter(|m| !m.trim().is_empty()),
                    ..Article::default()
                },
            ))
        })
        .collect())
}

// ---- toutiao ----

#[derive(Deserialize)]
struct ToutiaoResponse {
    #[serde(default, deserialize_with = "lenient::opt_records")]
    data: Option<Vec<ToutiaoEntry>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ToutiaoEntry {
    #[serde(default, deserialize_with = "lenient::string")]
    cluster_id_str: String,
    #[serde(default, deserialize_with = "lenient::string")]
    title: String,
    #[serde(default, deserialize_with = "lenient::opt_i64")]
    hot_value: Option<i64>,
}

pub(super) async fn toutiao(cx: &FetchContext<'_>, source: &Source) -> Result<Vec<NormalizedItem>, FetchError> {
    let response: ToutiaoResponse = cx.transport.fetch_decoded(cx.url(source)?, &[]).await?;
    let entries = lenient::required(response.data, "data")?;

    Ok(entries
        .into_iter()
        .filter(|e| !e.cluster_id_str.is_empty())
        .map(|e| {
            let link = format!("https://www.toutiao.com/trending/{}/", e.cluster_id_str);
            NormalizedItem::article(
                &source.id,
                e.cluster_id_str,
                e.title,
                link,
                Article {
                    info: badge(e.hot_value),
                    ..Article::default()
                },
            )
        })
        .collect())
}

// ---- douyin ----

#[derive(Deserialize)]
struct DouyinResponse {
    #[serde(default, deserialize_with = "lenient::or_default")]
    data: Option<DouyinData>,
}

#[derive(Default, Deserialize)]
struct DouyinData {
    #[serde(default, deserialize_with = "lenient::opt_records")]
    word_list: Option<Vec<DouyinEntry>>,
}

#[derive(Deserialize)]
struct DouyinEntry {
    #[serde(default, deserialize_with = "lenient::string")]
    word: String,
    #[serde(default, deserialize_with = "lenient::opt_i64")]
    hot_value: Option<i64>,
}

pub(super) async fn douyin(cx: &FetchContext<'_>, source: &Source) -> Result<Vec<NormalizedItem>, FetchError> {
    let response: DouyinResponse = cx
        .transport
        .fetch_decoded(cx.url(source)?, &[("Referer", "https://www.douyin.com/")])
        .await?;
    let entries = lenient::required(response.data.and_then(|d| d.word_list), "data.word_list")?;

    Ok(entries
        .into_iter()
        .enumerate()
        .map(|(i, e)| {
            let link = format!("https://www.douyin.com/search/{}", encode_component(&e.word));
            NormalizedItem::article(
                &source.id,
                format!("{}_{}", e.word, i),
                e.word,
                link,
                Article {
                    info: badge(e.hot_value),
                    ..Article::default()
                },
            )
        })
        .collect())
}

// ---- bilibili ----

#[derive(Deserialize)]
struct BilibiliResponse {
    #[serde(default, deserialize_with = "lenient::opt_records")]
    list: Option<Vec<BilibiliEntry>>,
}

#[derive(Deserialize)]
struct BilibiliEntry {
    #[serde(default, deserialize_with = "lenient::string")]
    keyword: String,
    #[serde(default, deserialize_with = "lenient::string")]
    show_name: String,
}

pub(super) async fn bilibili(cx: &FetchContext<'_>, source: &Source) -> Result<Vec<NormalizedItem>, FetchError> {
    let response: BilibiliResponse = cx.transport.fetch_decoded(cx.url(source)?, &[]).await?;
    let entries = lenient::required(response.list, "list")?;

    Ok(entries
        .into_iter()
        .filter(|e| !e.keyword.is_empty())
        .map(|e| {
            let title = if e.show_name.trim().is_empty() {
                e.keyword.clone()
            } else {
                e.show_name
            };
            let link = format!(
                "https://search.bilibili.com/all?keyword={}",
                encode_component(&e.keyword)
            );
            NormalizedItem::article(&source.id, e.keyword, title, link, Article::default())
        })
        .collect())
}

// ---- baidu ----

#[derive(Deserialize)]
struct BaiduBlob {
    #[serde(default, deserialize_with = "lenient::or_default")]
    data: Option<BaiduData>,
}

#[derive(Default, Deserialize)]
struct BaiduData {
    #[serde(default, deserialize_with = "lenient::opt_records")]
    cards: Option<Vec<BaiduCard>>,
}

#[derive(Deserialize)]
struct BaiduCard {
    #[serde(default, deserialize_with = "lenient::opt_records")]
    content: Option<Vec<BaiduEntry>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BaiduEntry {
    #[serde(default, deserialize_with = "lenient::flag")]
    is_top: bool,
    #[serde(default, deserialize_with = "lenient::string")]
    word: String,
    #[serde(default, deserialize_with = "lenient::string")]
    raw_url: String,
    #[serde(default, deserialize_with = "lenient::string")]
    desc: String,
    #[serde(default, deserialize_with = "lenient::opt_i64")]
    hot_score: Option<i64>,
}

/// The JSON state blob Baidu embeds as `<!--s-data:{...}-->`.
fn baidu_blob(html: &str) -> Result<&str, FetchError> {
    let start = html
        .find(BAIDU_MARKER)
        .ok_or_else(|| FetchError::shape("`<!--s-data:` marker not found"))?
        + BAIDU_MARKER.len();
    let len = html[start..]
        .find("-->")
        .ok_or_else(|| FetchError::shape("unterminated `s-data` comment"))?;
    Ok(&html[start..start + len])
}

pub(super) async fn baidu(cx: &FetchContext<'_>, source: &Source) -> Result<Vec<NormalizedItem>, FetchError> {
    let html = cx
        .transport
        .fetch_text(cx.url(source)?, &[("User-Agent", DESKTOP_UA)])
        .await?;
    let blob: BaiduBlob = serde_json::from_str(baidu_blob(&html)?)?;
    let cards = lenient::required(blob.data.and_then(|d| d.cards), "data.cards")?;
    let entries = lenient::required(
        cards.into_iter().next().and_then(|c| c.content),
        "data.cards[0].content",
    )?;

    Ok(entries
        .into_iter()
        .filter(|e| !e.is_top)
        .enumerate()
        .map(|(i, e)| {
            let desc = clean_html(&e.desc);
            let link = if e.raw_url.is_empty() {
                format!("https://www.baidu.com/s?wd={}", encode_component(&e.word))
            } else {
                e.raw_url
            };
            NormalizedItem::article(
                &source.id,
                format!("{}_{}", e.word, i),
                e.word,
                link,
                Article {
                    summary: (!desc.is_empty()).then_some(desc),
                    info: badge(e.hot_score),
                    ..Article::default()
                },
            )
        })
        .collect())
}

// ---- thepaper ----

#[derive(Deserialize)]
struct ThePaperResponse {
    #[serde(default, deserialize_with = "lenient::or_default")]
    data: Option<ThePaperData>,
}

#[derive(Default, Deserialize)]
struct ThePaperData {
    #[serde(rename = "hotNews", default, deserialize_with = "lenient::opt_records")]
    hot_news: Option<Vec<ThePaperEntry>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ThePaperEntry {
    #[serde(default, deserialize_with = "lenient::string")]
    cont_id: String,
    #[serde(default, deserialize_with = "lenient::string")]
    name: String,
    #[serde(default, deserialize_with = "lenient::opt_i64")]
    pub_time_long: Option<i64>,
}

pub(super) async fn thepaper(cx: &FetchContext<'_>, source: &Source) -> Result<Vec<NormalizedItem>, FetchError> {
    let response: ThePaperResponse = cx.transport.fetch_decoded(cx.url(source)?, &[]).await?;
    let entries = lenient::required(response.data.and_then(|d| d.hot_news), "data.hotNews")?;

    Ok(entries
        .into_iter()
        .filter(|e| !e.cont_id.is_empty())
        .map(|e| {
            let link = format!("https://www.thepaper.cn/newsDetail_forward_{}", e.cont_id);
            let mobile = format!("https://m.thepaper.cn/newsDetail_forward_{}", e.cont_id);
            let published = e.pub_time_long.and_then(DateTime::<Utc>::from_timestamp_millis);
            NormalizedItem::article(
                &source.id,
                e.cont_id,
                e.name,
                link,
                Article {
                    mobile_link: Some(mobile),
                    ..Article::default()
                },
            )
            .published(published)
        })
        .collect())
}

// ---- hupu ----

pub(super) async fn hupu(cx: &FetchContext<'_>, source: &Source) -> Result<Vec<NormalizedItem>, FetchError> {
    let html = cx
        .transport
        .fetch_text(cx.url(source)?, &[("User-Agent", DESKTOP_UA)])
        .await?;
    if !html.contains("bbs-sl-web-post-body") {
        return Err(FetchError::shape("no `bbs-sl-web-post-body` list in page"));
    }

    Ok(RE_HUPU_POST
        .captures_iter(&html)
        .map(|caps| {
            let path = caps[1].to_string();
            let link = format!("https://bbs.hupu.com{}", path);
            NormalizedItem::article(&source.id, path, decode_entities(&caps[2]), link, Article::default())
        })
        .collect())
}

// ---- tieba ----

#[derive(Deserialize)]
struct TiebaResponse {
    #[serde(default, deserialize_with = "lenient::or_default")]
    data: Option<TiebaData>,
}

#[derive(Default, Deserialize)]
struct TiebaData {
    #[serde(default, deserialize_with = "lenient::or_default")]
    bang_topic: Option<TiebaTopics>,
}

#[derive(Default, Deserialize)]
struct TiebaTopics {
    #[serde(default, deserialize_with = "lenient::opt_records")]
    topic_list: Option<Vec<TiebaEntry>>,
}

#[derive(Deserialize)]
struct TiebaEntry {
    #[serde(default, deserialize_with = "lenient::string")]
    topic_id: String,
    #[serde(default, deserialize_with = "lenient::string")]
    topic_name: String,
    #[serde(default, deserialize_with = "lenient::string")]
    topic_url: String,
    #[serde(default, deserialize_with = "lenient::string")]
    topic_desc: String,
    #[serde(default, deserialize_with = "lenient::opt_i64")]
    discuss_num: Option<i64>,
}

pub(super) async fn tieba(cx: &FetchContext<'_>, source: &Source) -> Result<Vec<NormalizedItem>, FetchError> {
    let response: TiebaResponse = cx
        .transport
        .fetch_decoded(cx.url(source)?, &[("User-Agent", DESKTOP_UA)])
        .await?;
    let entries = lenient::required(
        response
            .data
            .and_then(|d| d.bang_topic)
            .and_then(|t| t.topic_list),
        "data.bang_topic.topic_list",
    )?;

    Ok(entries
        .into_iter()
        .filter(|e| !e.topic_id.is_empty())
        .map(|e| {
            let link = if e.topic_url.is_empty() {
                format!(
                    "https://tieba.baidu.com/hottopic/browse/hottopic?topic_id={}&topic_name={}",
                    e.topic_id,
                    encode_component(&e.topic_name)
                )
            } else {
                decode_entities(&e.topic_url)
            };
            let desc = clean_html(&e.topic_desc);
            NormalizedItem::article(
                &source.id,
                e.topic_id,
                e.topic_name,
                link,
                Article {
                    summary: (!desc.is_empty()).then_some(desc),
                    info: badge(e.discuss_num),
                    ..Article::default()
                },
            )
        })
        .collect())
}

// ---- douban ----

#[derive(Deserialize)]
struct DoubanResponse {
    #[serde(default, deserialize_with = "lenient::opt_records")]
    subjects: Option<Vec<DoubanEntry>>,
}

#[derive(Deserialize)]
struct DoubanEntry {
    #[serde(default, deserialize_with = "lenient::string")]
    id: String,
    #[serde(default, deserialize_with = "lenient::string")]
    title: String,
    #[serde(default, deserialize_with = "lenient::string")]
    url: String,
    #[serde(default, deserialize_with = "lenient::string")]
    rate: String,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    cover: Option<String>,
}

pub(super) async fn douban(cx: &FetchContext<'_>, source: &Source) -> Result<Vec<NormalizedItem>, FetchError> {
    let response: DoubanResponse = cx
        .transport
        .fetch_decoded(cx.url(source)?, &[("Referer", "https://movie.douban.com/")])
        .await?;
    let entries = lenient::required(response.subjects, "subjects")?;

    Ok(entries
        .into_iter()
        .filter(|e| !e.id.is_empty())
        .map(|e| {
            let link = if e.url.is_empty() {
                format!("https://movie.douban.com/subject/{}/", e.id)
            } else {
                e.url
            };
            let info = (!e.rate.trim().is_empty()).then(|| format!("⭐ {}", e.rate.trim()));
            NormalizedItem::article(
                &source.id,
                e.id,
                e.title,
                link,
                Article {
                    info,
                    image_url: e.cover,
                    ..Article::default()
                },
            )
        })
        .collect())
}

// ---- ifeng ----

#[derive(Deserialize)]
struct IfengData {
    #[serde(rename = "hotNews1", default, deserialize_with = "lenient::opt_records")]
    hot_news: Option<Vec<IfengEntry>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IfengEntry {
    #[serde(default, deserialize_with = "lenient::string")]
    url: String,
    #[serde(default, deserialize_with = "lenient::string")]
    title: String,
    #[serde(default, deserialize_with = "lenient::string")]
    news_time: String,
}

pub(super) async fn ifeng(cx: &FetchContext<'_>, source: &Source) -> Result<Vec<NormalizedItem>, FetchError> {
    let html = cx.transport.fetch_text(cx.url(source)?, &[]).await?;
    let blob = RE_IFENG_DATA
        .captures(&html)
        .and_then(|caps| caps.get(1))
        .ok_or_else(|| FetchError::shape("`var allData = {...};` not found"))?;
    let data: IfengData = serde_json::from_str(blob.as_str())?;
    let entries = lenient::required(data.hot_news, "allData.hotNews1")?;

    Ok(entries
        .into_iter()
        .filter(|e| !e.url.is_empty())
        .map(|e| {
            let published = parse_local(&e.news_time, 8);
            NormalizedItem::article(&source.id, e.url.clone(), e.title, e.url, Article::default())
                .published(published)
        })
        .collect())
}
