//! Market newsflashes and quotes.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use super::{lenient, FetchContext};
use crate::app::FetchError;
use crate::domain::{Article, NormalizedItem, Source};
use crate::fetcher::{FetchRequest, DESKTOP_UA};
use crate::text::{clean_html, parse_local, truncate};

static RE_BOLD: Lazy<Regex> = Lazy::new(|| Regex::new(r"</?b>").unwrap());
static RE_BRACKET_TITLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^【([^】]+)】([\s\S]*)$").unwrap());

const JIN10_LIMIT: usize = 30;
/// Jin10 channel carrying VIP-only placeholders.
const JIN10_VIP_CHANNEL: i64 = 5;

fn timestamp(secs: Option<i64>) -> Option<DateTime<Utc>> {
    secs.and_then(|s| DateTime::<Utc>::from_timestamp(s, 0))
}

// ---- wallstreetcn ----

#[derive(Deserialize)]
struct WallstreetResponse {
    #[serde(default, deserialize_with = "lenient::or_default")]
    data: Option<WallstreetData>,
}

#[derive(Default, Deserialize)]
struct WallstreetData {
    #[serde(default, deserialize_with = "lenient::opt_records")]
    items: Option<Vec<WallstreetEntry>>,
}

#[derive(Deserialize)]
struct WallstreetEntry {
    #[serde(default, deserialize_with = "lenient::string")]
    id: String,
    #[serde(default, deserialize_with = "lenient::string")]
    uri: String,
    #[serde(default, deserialize_with = "lenient::string")]
    title: String,
    #[serde(default, deserialize_with = "lenient::string")]
    content_text: String,
    #[serde(default, deserialize_with = "lenient::opt_i64")]
    display_time: Option<i64>,
}

pub(super) async fn wallstreetcn(cx: &FetchContext<'_>, source: &Source) -> Result<Vec<NormalizedItem>, FetchError> {
    let response: WallstreetResponse = cx.transport.fetch_decoded(cx.url(source)?, &[]).await?;
    let entries = lenient::required(response.data.and_then(|d| d.items), "data.items")?;

    Ok(entries
        .into_iter()
        .filter(|e| !e.id.is_empty())
        .map(|e| {
            let text = clean_html(&e.content_text);
            let title = if e.title.trim().is_empty() {
                text.clone()
            } else {
                e.title
            };
            let link = if e.uri.is_empty() {
                format!("https://wallstreetcn.com/livenews/{}", e.id)
            } else {
                e.uri
            };
            NormalizedItem::article(
                &source.id,
                e.id,
                title,
                link,
                Article {
                    content: (!text.is_empty()).then_some(text),
                    ..Article::default()
                },
            )
            .published(timestamp(e.display_time))
        })
        .collect())
}

// ---- cls ----

#[derive(Deserialize)]
struct ClsResponse {
    #[serde(default, deserialize_with = "lenient::or_default")]
    data: Option<ClsData>,
}

#[derive(Default, Deserialize)]
struct ClsData {
    #[serde(default, deserialize_with = "lenient::opt_records")]
    roll_data: Option<Vec<ClsEntry>>,
}

#[derive(Deserialize)]
struct ClsEntry {
    #[serde(default, deserialize_with = "lenient::string")]
    id: String,
    #[serde(default, deserialize_with = "lenient::string")]
    title: String,
    #[serde(default, deserialize_with = "lenient::string")]
    brief: String,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    shareurl: Option<String>,
    #[serde(default, deserialize_with = "lenient::flag")]
    is_ad: bool,
    #[serde(default, deserialize_with = "lenient::opt_i64")]
    ctime: Option<i64>,
}

pub(super) async fn cls(cx: &FetchContext<'_>, source: &Source) -> Result<Vec<NormalizedItem>, FetchError> {
    let response: ClsResponse = cx
        .transport
        .fetch_decoded(
            cx.url(source)?,
            &[
                ("Referer", "https://www.cls.cn/telegraph"),
                ("Origin", "https://www.cls.cn"),
            ],
        )
        .await?;
    let entries = lenient::required(response.data.and_then(|d| d.roll_data), "data.roll_data")?;

    Ok(entries
        .into_iter()
        .filter(|e| !e.is_ad && !e.id.is_empty())
        .map(|e| {
            let brief = clean_html(&e.brief);
            let title = if e.title.trim().is_empty() {
                brief.clone()
            } else {
                e.title
            };
            let link = format!("https://www.cls.cn/detail/{}", e.id);
            NormalizedItem::article(
                &source.id,
                e.id,
                title,
                link,
                Article {
                    summary: (!brief.is_empty()).then_some(brief),
                    mobile_link: e.shareurl,
                    ..Article::default()
                },
            )
            .published(timestamp(e.ctime))
        })
        .collect())
}

// ---- jin10 ----

#[derive(Deserialize)]
struct Jin10Entry {
    #[serde(default, deserialize_with = "lenient::string")]
    id: String,
    #[serde(default, deserialize_with = "lenient::string")]
    time: String,
    #[serde(default, deserialize_with = "lenient::or_default")]
    data: Jin10Data,
    #[serde(default, deserialize_with = "lenient::flag")]
    important: bool,
    #[serde(default, deserialize_with = "lenient::or_default")]
    channel: Vec<i64>,
}

#[derive(Default, Deserialize)]
struct Jin10Data {
    #[serde(default, deserialize_with = "lenient::string")]
    title: String,
    #[serde(default, deserialize_with = "lenient::string")]
    content: String,
}

/// Strip the `var newest = ` assignment around the JSON array.
fn jin10_payload(script: &str) -> Result<&str, FetchError> {
    let trimmed = script.trim();
    let body = trimmed
        .strip_prefix("var newest = ")
        .or_else(|| trimmed.strip_prefix("var newest="))
        .ok_or_else(|| FetchError::shape("`var newest =` assignment not found"))?;
    Ok(body.trim().trim_end_matches(';').trim_end())
}

/// `【headline】details` becomes `(headline, Some(details))`.
fn split_headline(text: &str) -> (String, Option<String>) {
    match RE_BRACKET_TITLE.captures(text) {
        Some(caps) => {
            let rest = caps[2].trim();
            (caps[1].trim().to_string(), (!rest.is_empty()).then(|| rest.to_string()))
        }
        None => (text.to_string(), None),
    }
}

pub(super) async fn jin10(cx: &FetchContext<'_>, source: &Source) -> Result<Vec<NormalizedItem>, FetchError> {
    let script = cx
        .transport
        .fetch_text(cx.url(source)?, &[("User-Agent", DESKTOP_UA)])
        .await?;
    let entries: Vec<serde_json::Value> = serde_json::from_str(jin10_payload(&script)?)?;
    let entries: Vec<Jin10Entry> = lenient::decode_records(entries);

    Ok(entries
        .into_iter()
        .take(JIN10_LIMIT)
        .filter(|e| !e.channel.contains(&JIN10_VIP_CHANNEL) && !e.id.is_empty())
        .filter_map(|e| {
            let raw = if e.data.title.trim().is_empty() {
                &e.data.content
            } else {
                &e.data.title
            };
            let text = clean_html(&RE_BOLD.replace_all(raw, ""));
            if text.is_empty() {
                return None;
            }
            let (title, desc) = split_headline(&text);
            let link = format!("https://flash.jin10.com/detail/{}", e.id);
            Some(
                NormalizedItem::article(
                    &source.id,
                    e.id,
                    title,
                    link,
                    Article {
                        summary: desc.as_deref().map(|d| truncate(d, 200)),
                        content: desc,
                        info: e.important.then(|| "⭐".to_string()),
                        ..Article::default()
                    },
                )
                .published(parse_local(&e.time, 8)),
            )
        })
        .collect())
}

// ---- xueqiu ----

#[derive(Deserialize)]
struct XueqiuResponse {
    #[serde(default, deserialize_with = "lenient::or_default")]
    data: Option<XueqiuData>,
}

#[derive(Default, Deserialize)]
struct XueqiuData {
    #[serde(default, deserialize_with = "lenient::opt_records")]
    items: Option<Vec<XueqiuStock>>,
}

#[derive(Deserialize)]
struct XueqiuStock {
    #[serde(default, deserialize_with = "lenient::string")]
    code: String,
    #[serde(default, deserialize_with = "lenient::string")]
    name: String,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    percent: Option<f64>,
    #[serde(default, deserialize_with = "lenient::string")]
    exchange: String,
    #[serde(default, deserialize_with = "lenient::flag")]
    ad: bool,
}

/// `+1.23% SH`; the sign is always shown.
fn change_badge(percent: Option<f64>, exchange: &str) -> Option<String> {
    let percent = percent?;
    let badge = format!("{:+.2}%", percent);
    Some(if exchange.is_empty() {
        badge
    } else {
        format!("{} {}", badge, exchange)
    })
}

/// The hot-stock API wants the session cookies the quote page hands out.
pub(super) async fn xueqiu(cx: &FetchContext<'_>, source: &Source) -> Result<Vec<NormalizedItem>, FetchError> {
    let home = source
        .home
        .as_deref()
        .unwrap_or("https://xueqiu.com")
        .trim_end_matches('/');
    let quote_page = format!("{}/hq", home);

    let landing = cx
        .transport
        .execute(FetchRequest::get(url::Url::parse(&quote_page)?))
        .await?;
    let cookie = landing.cookie_header();
    if cookie.is_empty() {
        return Err(FetchError::shape("quote page set no session cookies"));
    }
    tracing::debug!(source = %source.id, "harvested session cookies");

    let request = FetchRequest::get(cx.url(source)?)
        .header("Cookie", cookie)
        .header("Origin", home)
        .header("Referer", quote_page);
    let response: XueqiuResponse = cx.transport.decoded(request).await?;
    let stocks = lenient::required(response.data.and_then(|d| d.items), "data.items")?;

    Ok(stocks
        .into_iter()
        .filter(|s| !s.ad && !s.code.is_empty())
        .map(|s| {
            let link = format!("https://xueqiu.com/s/{}", s.code);
            NormalizedItem::article(
                &source.id,
                s.code,
                s.name,
                link,
                Article {
                    info: change_badge(s.percent, &s.exchange),
                    ..Article::default()
                },
            )
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::TimeZone;

    use super::*;
    use crate::adapters::testing::run;
    use crate::adapters::Provider;
    use crate::domain::ItemBody;
    use crate::fetcher::mock::MockFetcher;
    use crate::fetcher::Transport;

    fn article(item: &NormalizedItem) -> &Article {
        match &item.body {
            ItemBody::Article(a) => a,
            other => panic!("expected article, got {:?}", other),
        }
    }

    #[test]
    fn test_split_headline() {
        assert_eq!(
            split_headline("【美联储维持利率不变】符合市场预期"),
            ("美联储维持利率不变".to_string(), Some("符合市场预期".to_string()))
        );
        assert_eq!(split_headline("无标题快讯"), ("无标题快讯".to_string(), None));
    }

    #[test]
    fn test_change_badge() {
        assert_eq!(change_badge(Some(1.234), "SH").as_deref(), Some("+1.23% SH"));
        assert_eq!(change_badge(Some(-0.5), "SZ").as_deref(), Some("-0.50% SZ"));
        assert_eq!(change_badge(None, "SZ"), None);
    }

    #[tokio::test]
    async fn test_jin10() {
        let script = r#"var newest = [
            {"id":"20240601100000001","time":"2024-06-01 10:00:00","data":{"title":"","content":"<b>【重磅】</b>央行宣布降准"},"important":1,"channel":[1]},
            {"id":"20240601100000002","time":"2024-06-01 09:59:00","data":{"content":"VIP 内容"},"important":0,"channel":[5]},
            {"id":"20240601100000003","time":"2024-06-01 09:58:00","data":{"title":"","content":""},"important":0,"channel":[]},
            {"id":"20240601100000004","time":"2024-06-01 09:57:00","data":{"content":"普通快讯"},"important":0}
        ];"#;
        let transport = MockFetcher::new()
            .route("https://www.jin10.com/flash_newest.js", 200, script)
            .into_transport();
        let items = run(Provider::Jin10, &transport).await.unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title, "重磅");
        assert_eq!(article(&items[0]).summary.as_deref(), Some("央行宣布降准"));
        assert_eq!(article(&items[0]).info.as_deref(), Some("⭐"));
        assert_eq!(
            items[0].published_at,
            Some(Utc.with_ymd_and_hms(2024, 6, 1, 2, 0, 0).unwrap())
        );
        assert_eq!(items[1].title, "普通快讯");
        assert_eq!(items[1].link, "https://flash.jin10.com/detail/20240601100000004");
    }

    #[tokio::test]
    async fn test_jin10_missing_assignment() {
        let transport = MockFetcher::new()
            .route("https://www.jin10.com", 200, "<html>maintenance</html>")
            .into_transport();
        let err = run(Provider::Jin10, &transport).await.unwrap_err();
        assert!(matches!(err, FetchError::UpstreamShapeChanged(_)));
    }

    #[tokio::test]
    async fn test_cls_filters_ads() {
        let transport = MockFetcher::new()
            .route(
                "https://www.cls.cn/nodeapi/updateTelegraphList",
                200,
                r#"{"data":{"roll_data":[
                    {"id":1,"title":"","brief":"【快讯】内容","shareurl":"https://m.cls.cn/1","is_ad":0,"ctime":1717200000},
                    {"id":2,"title":"广告","brief":"","is_ad":1}
                ]}}"#,
            )
            .into_transport();
        let items = run(Provider::Cls, &transport).await.unwrap();

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "【快讯】内容");
        assert_eq!(items[0].link, "https://www.cls.cn/detail/1");
        assert_eq!(article(&items[0]).mobile_link.as_deref(), Some("https://m.cls.cn/1"));
    }

    #[tokio::test]
    async fn test_xueqiu_harvests_cookies() {
        let fetcher = Arc::new(
            MockFetcher::new()
                .route_with_headers(
                    "https://xueqiu.com/hq",
                    &[("Set-Cookie", "xq_a_token=tok; path=/"), ("Set-Cookie", "u=1; path=/")],
                    "<html></html>",
                )
                .route(
                    "https://stock.xueqiu.com/v5/stock/hot_stock/list.json",
                    200,
                    r#"{"data":{"items":[
                        {"code":"SH600519","name":"贵州茅台","percent":1.234,"exchange":"SH","ad":0},
                        {"code":"AD","name":"推广","percent":0,"exchange":"SH","ad":1}
                    ]}}"#,
                ),
        );
        let transport = Transport::new(fetcher.clone(), &Default::default());
        let items = run(Provider::Xueqiu, &transport).await.unwrap();

        assert_eq!(items.len(), 1);
        assert_eq!(article(&items[0]).info.as_deref(), Some("+1.23% SH"));
        assert_eq!(items[0].link, "https://xueqiu.com/s/SH600519");

        let requests = fetcher.requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        assert!(requests[1]
            .headers
            .iter()
            .any(|(k, v)| k == "Cookie" && v == "xq_a_token=tok; u=1"));
    }

    #[tokio::test]
    async fn test_xueqiu_without_cookies_fails() {
        let transport = MockFetcher::new()
            .route("https://xueqiu.com/hq", 200, "<html></html>")
            .into_transport();
        let err = run(Provider::Xueqiu, &transport).await.unwrap_err();
        assert!(matches!(err, FetchError::UpstreamShapeChanged(_)));
    }
}
