//! Tag-level extraction over raw feed XML.
//!
//! Publishers ship malformed markup often enough that a strict XML parser
//! rejects real feeds; these helpers only look for the delimiters they need.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::text::decode_entities;

const CDATA_OPEN: &str = "<![CDATA[";
const CDATA_CLOSE: &str = "]]>";
const IMAGE_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".gif", ".webp"];

static RE_IMG_SRC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)<img[^>]+src\s*=\s*["']([^"']+)["']"#).unwrap());
static RE_YOUTUBE_ID: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"youtube\.com/watch\?(?:[^#]*&)?v=([A-Za-z0-9_-]+)",
        r"youtu\.be/([A-Za-z0-9_-]+)",
        r"youtube\.com/embed/([A-Za-z0-9_-]+)",
        r"youtube\.com/shorts/([A-Za-z0-9_-]+)",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});
static RE_HANDLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"@[A-Za-z0-9_]+").unwrap());
static RE_PAREN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\(([^)]+)\)").unwrap());

/// Byte offset of the next `<name` that opens exactly `name` (not a longer
/// tag sharing the prefix), starting at `from`.
fn find_open(xml: &str, name: &str, from: usize) -> Option<usize> {
    let needle = format!("<{}", name);
    let mut pos = from;
    while let Some(rel) = xml[pos..].find(&needle) {
        let start = pos + rel;
        let after = start + needle.len();
        match xml[after..].chars().next() {
            Some('>') | Some('/') | Some(' ') | Some('\t') | Some('\n') | Some('\r') => return Some(start),
            None => return None,
            _ => pos = after,
        }
    }
    None
}

/// Whether `xml` opens an element named exactly `name` anywhere.
pub fn has_element(xml: &str, name: &str) -> bool {
    find_open(xml, name, 0).is_some()
}

/// Offset of `</name>` at or after `from`, jumping over CDATA sections so a
/// close tag quoted inside CDATA does not end the element.
fn find_close(xml: &str, name: &str, from: usize) -> Option<usize> {
    let needle = format!("</{}", name);
    let mut pos = from;
    loop {
        let close = xml[pos..].find(&needle).map(|i| pos + i)?;
        match xml[pos..].find(CDATA_OPEN).map(|i| pos + i) {
            Some(cdata) if cdata < close => {
                let end = xml[cdata..].find(CDATA_CLOSE)?;
                pos = cdata + end + CDATA_CLOSE.len();
            }
            _ => {
                let after = close + needle.len();
                let rest = xml[after..].trim_start();
                if rest.starts_with('>') {
                    return Some(close);
                }
                pos = after;
            }
        }
    }
}

/// Opening tag text (`<name attr="...">` minus the brackets) and inner content
/// of every `name` element. Self-closing elements yield empty content.
pub fn elements<'a>(xml: &'a str, name: &str) -> Vec<(&'a str, &'a str)> {
    let mut out = Vec::new();
    let mut pos = 0;

    while let Some(start) = find_open(xml, name, pos) {
        let Some(open_end) = xml[start..].find('>').map(|i| start + i) else {
            break;
        };
        let open = &xml[start + 1..open_end];

        if open.ends_with('/') {
            out.push((open.trim_end_matches('/'), ""));
            pos = open_end + 1;
            continue;
        }

        let content_start = open_end + 1;
        match find_close(xml, name, content_start) {
            Some(close) => {
                out.push((open, &xml[content_start..close]));
                pos = close + name.len() + 2;
            }
            // Unterminated CDATA or a missing close tag: drop this element
            // and keep scanning for the next one.
            None => pos = content_start,
        }
    }

    out
}

/// Inner content of every `name` element.
pub fn blocks<'a>(xml: &'a str, name: &str) -> Vec<&'a str> {
    elements(xml, name).into_iter().map(|(_, inner)| inner).collect()
}

/// Text of the first `tag` element. A value wrapped in CDATA is returned
/// verbatim; otherwise the trimmed raw text. `None` when absent or blank.
pub fn tag_text(block: &str, tag: &str) -> Option<String> {
    let (_, inner) = elements(block, tag).into_iter().next()?;
    let trimmed = inner.trim();

    let value = match trimmed
        .strip_prefix(CDATA_OPEN)
        .and_then(|rest| rest.strip_suffix(CDATA_CLOSE))
    {
        Some(cdata) if !cdata.contains(CDATA_CLOSE) => cdata.trim().to_string(),
        _ => trimmed.replace(CDATA_OPEN, "").replace(CDATA_CLOSE, ""),
    };

    (!value.is_empty()).then_some(value)
}

/// Value of `attr` inside an opening tag's text.
pub fn attr_value(open_tag: &str, attr: &str) -> Option<String> {
    let bytes = open_tag.as_bytes();
    let mut pos = 0;
    while let Some(rel) = open_tag[pos..].find(attr) {
        let start = pos + rel;
        pos = start + attr.len();

        let boundary = start == 0 || bytes[start - 1].is_ascii_whitespace();
        let rest = open_tag[pos..].trim_start();
        if !boundary || !rest.starts_with('=') {
            continue;
        }
        let rest = rest[1..].trim_start();
        let quote = match rest.chars().next() {
            Some(q @ ('"' | '\'')) => q,
            _ => continue,
        };
        let value = &rest[1..];
        let end = value.find(quote)?;
        let decoded = decode_entities(value[..end].trim());
        return (!decoded.is_empty()).then_some(decoded);
    }
    None
}

/// `attr` of the first `tag` element carrying it.
pub fn tag_attr(block: &str, tag: &str, attr: &str) -> Option<String> {
    elements(block, tag)
        .into_iter()
        .find_map(|(open, _)| attr_value(open, attr))
}

/// Atom `<link href>`: the `alternate` (or rel-less) link if present,
/// else the first link with an href.
pub fn atom_link(block: &str) -> Option<String> {
    let links = elements(block, "link");
    links
        .iter()
        .find(|(open, _)| {
            matches!(attr_value(open, "rel").as_deref(), None | Some("alternate"))
                && attr_value(open, "href").is_some()
        })
        .or_else(|| links.iter().find(|(open, _)| attr_value(open, "href").is_some()))
        .and_then(|(open, _)| attr_value(open, "href"))
}

fn is_http(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

fn has_image_extension(url: &str) -> bool {
    let path = url.split(['?', '#']).next().unwrap_or(url).to_ascii_lowercase();
    IMAGE_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

/// First `<img src>` in an HTML fragment, entity-escaped or not.
pub fn first_img_src(html: &str) -> Option<String> {
    let find = |s: &str| {
        RE_IMG_SRC
            .captures_iter(s)
            .map(|c| decode_entities(&c[1]))
            .find(|u| is_http(u))
    };
    find(html).or_else(|| {
        if html.contains("&lt;") {
            find(&decode_entities(html))
        } else {
            None
        }
    })
}

/// Every `<img src>` in an HTML fragment.
pub fn all_img_srcs(html: &str) -> Vec<String> {
    let decoded;
    let html = if html.contains("&lt;") {
        decoded = decode_entities(html);
        decoded.as_str()
    } else {
        html
    };
    RE_IMG_SRC
        .captures_iter(html)
        .map(|c| decode_entities(&c[1]))
        .filter(|u| is_http(u))
        .collect()
}

/// Image for an item, first match wins: media thumbnail, image media
/// content, image enclosure, `<img>` in the description.
pub fn image_url(block: &str, description: Option<&str>) -> Option<String> {
    let thumbnail = || tag_attr(block, "media:thumbnail", "url");

    let media_content = || {
        elements(block, "media:content").into_iter().find_map(|(open, _)| {
            let url = attr_value(open, "url")?;
            let typed = attr_value(open, "type").is_some_and(|t| t.starts_with("image"))
                || attr_value(open, "medium").as_deref() == Some("image");
            (typed || has_image_extension(&url)).then_some(url)
        })
    };

    let enclosure = || {
        elements(block, "enclosure").into_iter().find_map(|(open, _)| {
            let url = attr_value(open, "url")?;
            let typed = attr_value(open, "type").is_some_and(|t| t.starts_with("image"));
            (typed || has_image_extension(&url)).then_some(url)
        })
    };

    let inline = || description.and_then(first_img_src).or_else(|| first_img_src(block));

    [thumbnail(), media_content(), enclosure()]
        .into_iter()
        .flatten()
        .find(|u| is_http(u))
        .or_else(inline)
}

/// Audio enclosure URL; any enclosure when none is typed as audio.
pub fn audio_enclosure(block: &str) -> Option<String> {
    let enclosures = elements(block, "enclosure");
    enclosures
        .iter()
        .find(|(open, _)| attr_value(open, "type").is_some_and(|t| t.starts_with("audio")))
        .or_else(|| {
            enclosures
                .iter()
                .find(|(open, _)| attr_value(open, "url").is_some_and(|u| !has_image_extension(&u)))
        })
        .and_then(|(open, _)| attr_value(open, "url"))
        .or_else(|| {
            elements(block, "link")
                .into_iter()
                .find(|(open, _)| attr_value(open, "rel").as_deref() == Some("enclosure"))
                .and_then(|(open, _)| attr_value(open, "href"))
        })
}

/// Video id from the known YouTube URL shapes.
pub fn youtube_video_id(link: &str) -> Option<String> {
    RE_YOUTUBE_ID
        .iter()
        .find_map(|re| re.captures(link).map(|c| c[1].to_string()))
}

pub fn youtube_thumbnail(video_id: &str) -> String {
    format!("https://img.youtube.com/vi/{}/maxresdefault.jpg", video_id)
}

/// `@handle` from a display name: an explicit `@handle`, else a
/// parenthesised alias, else the name with spaces removed.
pub fn twitter_handle(name: &str) -> String {
    if let Some(m) = RE_HANDLE.find(name) {
        return m.as_str().to_string();
    }
    if let Some(c) = RE_PAREN.captures(name) {
        return format!("@{}", c[1].trim().trim_start_matches('@'));
    }
    format!("@{}", name.split_whitespace().collect::<String>())
}
