//! Text cleanup shared by the feed parser and the hot-list adapters.
//!
//! Everything here is a pure function over `&str`.

pub mod date;

use once_cell::sync::Lazy;
use regex::Regex;

pub use date::{format_relative, parse_duration, parse_feed_date, parse_local, parse_relative};

static RE_HSPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t\u{00A0}\u{3000}]+").unwrap());
static RE_NEWLINE_PAD: Lazy<Regex> = Lazy::new(|| Regex::new(r" *\n *").unwrap());
static RE_NEWLINE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{2,}").unwrap());

const BLOCK_TAGS: &[&str] = &[
    "p", "div", "li", "h1", "h2", "h3", "h4", "h5", "h6", "tr", "blockquote", "section",
    "article", "header", "footer", "ul", "ol", "table",
];

/// Decode numeric (`&#20013;`, `&#x4E2D;`) and named HTML entities.
pub fn decode_entities(s: &str) -> String {
    html_escape::decode_html_entities(s).into_owned()
}

/// Remove `<![CDATA[` / `]]>` wrappers, keeping their contents.
pub fn strip_cdata(s: &str) -> String {
    s.replace("<![CDATA[", "").replace("]]>", "")
}

/// Remove markup, turning block boundaries and `<br>` into newlines.
///
/// Attribute values may contain `>`; quotes are tracked so they do not
/// end the tag early. `<script>` and `<style>` bodies are dropped.
pub fn strip_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    let mut quote: Option<char> = None;
    let mut tag = String::new();
    let mut skip_until: Option<&'static str> = None;

    for ch in html.chars() {
        if in_tag {
            if let Some(q) = quote {
                if ch == q {
                    quote = None;
                }
                tag.push(ch);
                continue;
            }
            match ch {
                '"' | '\'' => {
                    quote = Some(ch);
                    tag.push(ch);
                }
                '>' => {
                    in_tag = false;
                    let name = tag_name(&tag);
                    if let Some(end) = skip_until {
                        if name == end && tag.starts_with('/') {
                            skip_until = None;
                        }
                    } else if !tag.starts_with('/') && (name == "script" || name == "style") {
                        skip_until = if name == "script" { Some("script") } else { Some("style") };
                    } else {
                        let closes_block = tag.starts_with('/') && BLOCK_TAGS.contains(&name.as_str());
                        if (closes_block || name == "br") && !out.ends_with('\n') {
                            out.push('\n');
                        }
                    }
                    tag.clear();
                }
                _ => tag.push(ch),
            }
        } else if ch == '<' {
            in_tag = true;
        } else if skip_until.is_none() {
            out.push(ch);
        }
    }

    // An unterminated tag is treated as text.
    if in_tag && skip_until.is_none() {
        out.push('<');
        out.push_str(&tag);
    }

    out
}

fn tag_name(tag: &str) -> String {
    tag.trim_start_matches('/')
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase()
}

/// Collapse runs of horizontal whitespace to one space and runs of blank
/// lines to a single newline, then trim.
pub fn collapse_whitespace(s: &str) -> String {
    let s = s.replace("\r\n", "\n").replace('\r', "\n");
    let s = RE_HSPACE.replace_all(&s, " ");
    let s = RE_NEWLINE_PAD.replace_all(&s, "\n");
    let s = RE_NEWLINE_RUN.replace_all(&s, "\n");
    s.trim().to_string()
}

/// Full cleanup for text that may carry markup: CDATA, tags, entities and
/// whitespace.
pub fn clean_html(s: &str) -> String {
    let text = strip_tags(&strip_cdata(s));
    collapse_whitespace(&decode_entities(&text))
}

/// Like [`clean_html`], for fields where publishers entity-escape their
/// markup instead of wrapping it in CDATA (`&lt;p&gt;...`).
pub fn clean_escaped_html(s: &str) -> String {
    clean_html(&unescape_markup(s))
}

/// Markup as the publisher wrote it. Entity-escaped markup (`&lt;p&gt;`) is
/// decoded one level; CDATA or raw markup is returned unwrapped but
/// otherwise untouched, so its text entities are decoded exactly once later.
pub fn unescape_markup(s: &str) -> String {
    let unwrapped = strip_cdata(s);
    if !unwrapped.contains('<') && unwrapped.contains("&lt;") {
        decode_entities(&unwrapped)
    } else {
        unwrapped
    }
}

/// Cut to `max_chars` characters, appending `...` when something was cut.
pub fn truncate(s: &str, max_chars: usize) -> String {
    let trimmed = s.trim();
    if trimmed.chars().count() <= max_chars {
        return trimmed.to_string();
    }
    let mut out: String = trimmed.chars().take(max_chars).collect();
    out.push_str("...");
    out
}

/// Compact count badge: `1.2亿`, `3.4万`, or the plain number.
pub fn format_count(n: i64) -> String {
    if n >= 100_000_000 {
        format!("{:.1}亿", n as f64 / 100_000_000.0)
    } else if n >= 10_000 {
        format!("{:.1}万", n as f64 / 10_000.0)
    } else {
        n.to_string()
    }
}

/// Percent-encode a value for use inside a query string or path segment.
pub fn encode_component(s: &str) -> String {
    url::form_urlencoded::byte_serialize(s.as_bytes()).collect()
}
