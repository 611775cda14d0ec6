//! Coolapk's app API, which requires a signed `X-App-Token`.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use md5::{Digest, Md5};
use rand::Rng;
use serde::Deserialize;

use super::{lenient, FetchContext};
use crate::app::FetchError;
use crate::domain::{Article, NormalizedItem, Source};
use crate::fetcher::FetchRequest;
use crate::text::{clean_html, strip_tags, truncate};

const APP_ID: &str = "com.coolapk.market";
const TOKEN_SECRET: &str = "c67ef5943784d09750dcfbb31020f0ab";
const ANDROID_UA: &str = "Dalvik/2.1.0 (Linux; U; Android 10; Redmi K30 5G MIUI/V12.0.3.0.QGICMXM) (#Build; Redmi; Redmi K30 5G; QKQ1.191222.002 test-keys; 10) +CoolMarket/11.0-2101202";

fn md5_hex(input: &str) -> String {
    hex::encode(Md5::digest(input.as_bytes()))
}

/// Random device id shaped like a UUID: `xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx`.
pub fn device_id<R: Rng>(rng: &mut R) -> String {
    let mut bytes = [0u8; 16];
    rng.fill(&mut bytes);
    let hex = hex::encode(bytes);
    format!(
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    )
}

/// `md5(base64(token-uri)) + device_id + 0x<hex timestamp>`, where the
/// token URI embeds `md5(timestamp)` and the device id.
pub fn app_token(timestamp: i64, device_id: &str) -> String {
    let uri = format!(
        "token://{}/{}?{}${}&{}",
        APP_ID,
        TOKEN_SECRET,
        md5_hex(&timestamp.to_string()),
        device_id,
        APP_ID
    );
    let signature = md5_hex(&STANDARD.encode(uri.as_bytes()));
    format!("{}{}0x{:x}", signature, device_id, timestamp)
}

#[derive(Deserialize)]
struct Response {
    #[serde(default, deserialize_with = "lenient::opt_records")]
    data: Option<Vec<Entry>>,
}

#[derive(Deserialize)]
struct Entry {
    #[serde(default, deserialize_with = "lenient::string")]
    id: String,
    #[serde(default, deserialize_with = "lenient::string")]
    message: String,
    #[serde(default, deserialize_with = "lenient::string")]
    editor_title: String,
    #[serde(default, deserialize_with = "lenient::string")]
    url: String,
    #[serde(rename = "targetRow", default, deserialize_with = "lenient::or_default")]
    target_row: Option<TargetRow>,
}

#[derive(Default, Deserialize)]
struct TargetRow {
    #[serde(rename = "subTitle", default, deserialize_with = "lenient::opt_string")]
    sub_title: Option<String>,
}

/// First line of the message with markup removed.
fn first_line(message: &str) -> String {
    strip_tags(message)
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(|l| clean_html(l))
        .unwrap_or_default()
}

pub(super) async fn fetch(cx: &FetchContext<'_>, source: &Source) -> Result<Vec<NormalizedItem>, FetchError> {
    let device = device_id(&mut rand::rng());
    let token = app_token(cx.now.timestamp(), &device);

    let request = FetchRequest::get(cx.url(source)?)
        .headers(&[
            ("User-Agent", ANDROID_UA),
            ("X-Requested-With", "XMLHttpRequest"),
            ("X-Sdk-Int", "29"),
            ("X-Sdk-Locale", "zh-CN"),
            ("X-App-Id", APP_ID),
            ("X-App-Version", "11.0"),
            ("X-App-Code", "2101202"),
            ("X-Api-Version", "11"),
        ])
        .header("X-App-Token", token);

    let response: Response = cx.transport.decoded(request).await?;
    let entries = lenient::required(response.data, "data")?;
    // The API answers a rejected token with an empty list.
    if entries.is_empty() {
        return Err(FetchError::shape("empty `data`; app token likely rejected"));
    }

    Ok(entries
        .into_iter()
        .filter(|e| !e.id.is_empty())
        .map(|e| {
            let title = if e.editor_title.trim().is_empty() {
                first_line(&e.message)
            } else {
                e.editor_title.clone()
            };
            let link = if e.url.starts_with("http") {
                e.url.clone()
            } else {
                format!("https://www.coolapk.com{}", e.url)
            };
            let body = clean_html(&e.message);
            NormalizedItem::article(
                &source.id,
                e.id,
                title,
                link.clone(),
                Article {
                    summary: (!body.is_empty()).then(|| truncate(&body, 200)),
                    content: (!body.is_empty()).then_some(body),
                    info: e.target_row.and_then(|t| t.sub_title),
                    mobile_link: Some(link),
                    ..Article::default()
                },
            )
        })
        .collect())
}
