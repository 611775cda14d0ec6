use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

static RE_SHORT_OFFSET: Lazy<Regex> = Lazy::new(|| Regex::new(r"([+-]\d{2})$").unwrap());
static RE_ZH_AGO: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+)\s*(秒|分钟|小时|天|周)前$").unwrap());
static RE_EN_AGO: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(\d+)\s*(second|sec|minute|min|hour|hr|day|week)s?\s+ago$").unwrap()
});
static RE_YESTERDAY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(?:昨天|yesterday)\s*(?:(\d{1,2}):(\d{2}))?$").unwrap());

const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%z",
    "%Y-%m-%d %H:%M:%S %z",
    "%a, %d %b %Y %H:%M:%S %z",
    "%d %b %Y %H:%M:%S %z",
    "%a, %d %b %Y %H:%M %z",
];

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
];

/// Parse a feed timestamp (`pubDate`, `published`, `updated`).
///
/// Tries RFC 2822, then RFC 3339 / ISO 8601 with and without fractional
/// seconds, then the offset spellings publishers actually emit (`+0800`,
/// `+08`, `UTC`), then offset-less forms read as UTC. First success wins.
pub fn parse_feed_date(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    let normalized = normalize_zone(s);
    if normalized != s {
        if let Ok(dt) = DateTime::parse_from_rfc2822(&normalized) {
            return Some(dt.with_timezone(&Utc));
        }
        if let Ok(dt) = DateTime::parse_from_rfc3339(&normalized) {
            return Some(dt.with_timezone(&Utc));
        }
    }

    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(&normalized, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }

    parse_local(s, 0)
}

/// Rewrite zone spellings chrono does not accept into numeric offsets.
fn normalize_zone(s: &str) -> String {
    let mut out = s.to_string();
    for name in [" UTC", " UT", " GMT", " Z"] {
        if let Some(head) = out.strip_suffix(name) {
            out = format!("{} +0000", head);
            break;
        }
    }
    if out.ends_with('Z') && out.contains('T') {
        out.pop();
        out.push_str("+00:00");
    }
    if RE_SHORT_OFFSET.is_match(&out) && out.contains('T') {
        out.push_str(":00");
    }
    out
}

/// Parse an offset-less timestamp as wall-clock time at `offset_hours`
/// east of UTC. Chinese upstreams publish `yyyy-MM-dd HH:mm:ss` in +08:00.
pub fn parse_local(raw: &str, offset_hours: i32) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    let offset = FixedOffset::east_opt(offset_hours * 3600)?;

    let naive = NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })?;

    offset
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Parse relative phrasing ("刚刚", "5分钟前", "2 hours ago", "昨天 12:30")
/// against a reference time.
pub fn parse_relative(raw: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s == "刚刚" || s.eq_ignore_ascii_case("just now") {
        return Some(now);
    }

    if let Some(caps) = RE_ZH_AGO.captures(s) {
        let n: i64 = caps[1].parse().ok()?;
        let unit = match &caps[2] {
            "秒" => Duration::seconds(n),
            "分钟" => Duration::minutes(n),
            "小时" => Duration::hours(n),
            "天" => Duration::days(n),
            _ => Duration::weeks(n),
        };
        return Some(now - unit);
    }

    if let Some(caps) = RE_EN_AGO.captures(s) {
        let n: i64 = caps[1].parse().ok()?;
        let unit = match caps[2].to_ascii_lowercase().as_str() {
            "second" | "sec" => Duration::seconds(n),
            "minute" | "min" => Duration::minutes(n),
            "hour" | "hr" => Duration::hours(n),
            "day" => Duration::days(n),
            _ => Duration::weeks(n),
        };
        return Some(now - unit);
    }

    if let Some(caps) = RE_YESTERDAY.captures(s) {
        let day = now - Duration::days(1);
        return match (caps.get(1), caps.get(2)) {
            (Some(h), Some(m)) => {
                let h: u32 = h.as_str().parse().ok()?;
                let m: u32 = m.as_str().parse().ok()?;
                day.date_naive()
                    .and_hms_opt(h, m, 0)
                    .map(|naive| Utc.from_utc_datetime(&naive))
            }
            _ => Some(day),
        };
    }

    None
}

/// Inverse of [`parse_relative`] for display.
pub fn format_relative(date: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - date).num_seconds();
    if secs < 60 {
        "刚刚".to_string()
    } else if secs < 3600 {
        format!("{}分钟前", secs / 60)
    } else if secs < 86_400 {
        format!("{}小时前", secs / 3600)
    } else if secs < 604_800 {
        format!("{}天前", secs / 86_400)
    } else {
        date.format("%m-%d").to_string()
    }
}

/// Parse `itunes:duration` style values: `H:MM:SS`, `MM:SS` or `SS`.
pub fn parse_duration(raw: &str) -> Option<u64> {
    let parts: Vec<&str> = raw.trim().split(':').map(str::trim).collect();
    if parts.is_empty() || parts.len() > 3 || parts.iter().any(|p| p.is_empty()) {
        return None;
    }

    let mut total = 0u64;
    for (i, part) in parts.iter().enumerate() {
        // Only the last component may carry a fraction ("45.5").
        let value = if i + 1 == parts.len() {
            let secs = part.parse::<f64>().ok().filter(|v| v.is_finite() && *v >= 0.0)?;
            if secs >= u64::MAX as f64 {
                return None;
            }
            secs.floor() as u64
        } else {
            part.parse::<u64>().ok()?
        };
        total = total.checked_mul(60)?.checked_add(value)?;
    }
    Some(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn test_rfc2822() {
        assert_eq!(
            parse_feed_date("Mon, 01 Jan 2024 08:30:00 +0800"),
            Some(utc(2024, 1, 1, 0, 30, 0))
        );
        assert_eq!(
            parse_feed_date("Tue, 02 Jan 2024 10:00:00 GMT"),
            Some(utc(2024, 1, 2, 10, 0, 0))
        );
        assert_eq!(
            parse_feed_date("Tue, 02 Jan 2024 10:00:00 UTC"),
            Some(utc(2024, 1, 2, 10, 0, 0))
        );
    }

    #[test]
    fn test_iso8601_variants() {
        let expected = Some(utc(2024, 3, 5, 4, 0, 0));
        assert_eq!(parse_feed_date("2024-03-05T04:00:00Z"), expected);
        assert_eq!(parse_feed_date("2024-03-05T12:00:00+08:00"), expected);
        assert_eq!(parse_feed_date("2024-03-05T12:00:00+0800"), expected);
        assert_eq!(parse_feed_date("2024-03-05T12:00:00+08"), expected);
        assert_eq!(parse_feed_date("2024-03-05T04:00:00.250Z").map(|d| d.timestamp()), Some(utc(2024, 3, 5, 4, 0, 0).timestamp()));
        assert_eq!(parse_feed_date("2024-03-05T12:00:00.123+0800").map(|d| d.timestamp()), Some(utc(2024, 3, 5, 4, 0, 0).timestamp()));
        assert_eq!(parse_feed_date("2024-03-05 04:00:00"), expected);
    }

    #[test]
    fn test_unparseable_is_none() {
        assert_eq!(parse_feed_date(""), None);
        assert_eq!(parse_feed_date("sometime last week"), None);
    }

    #[test]
    fn test_parse_local_china_time() {
        assert_eq!(
            parse_local("2024-06-01 20:15:00", 8),
            Some(utc(2024, 6, 1, 12, 15, 0))
        );
    }

    #[test]
    fn test_parse_relative() {
        let now = utc(2024, 6, 1, 12, 0, 0);
        assert_eq!(parse_relative("刚刚", now), Some(now));
        assert_eq!(parse_relative("5分钟前", now), Some(utc(2024, 6, 1, 11, 55, 0)));
        assert_eq!(parse_relative("3小时前", now), Some(utc(2024, 6, 1, 9, 0, 0)));
        assert_eq!(parse_relative("2 days ago", now), Some(utc(2024, 5, 30, 12, 0, 0)));
        assert_eq!(parse_relative("昨天 08:30", now), Some(utc(2024, 5, 31, 8, 30, 0)));
        assert_eq!(parse_relative("tomorrow", now), None);
    }

    #[test]
    fn test_format_relative() {
        let now = utc(2024, 6, 1, 12, 0, 0);
        assert_eq!(format_relative(now, now), "刚刚");
        assert_eq!(format_relative(utc(2024, 6, 1, 11, 30, 0), now), "30分钟前");
        assert_eq!(format_relative(utc(2024, 6, 1, 7, 0, 0), now), "5小时前");
        assert_eq!(format_relative(utc(2024, 5, 29, 12, 0, 0), now), "3天前");
        assert_eq!(format_relative(utc(2024, 4, 2, 12, 0, 0), now), "04-02");
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("1:05:30"), Some(3930));
        assert_eq!(parse_duration("12:45"), Some(765));
        assert_eq!(parse_duration("45"), Some(45));
        assert_eq!(parse_duration("3930"), Some(3930));
        assert_eq!(parse_duration("1:2:3:4"), None);
        assert_eq!(parse_duration("abc"), None);
        assert_eq!(parse_duration(""), None);
    }

    #[test]
    fn test_parse_duration_rejects_unbounded() {
        assert_eq!(parse_duration("1:inf"), None);
        assert_eq!(parse_duration("NaN"), None);
        assert_eq!(parse_duration("1e30"), None);
        assert_eq!(parse_duration("400000000000000000:0:0"), None);
        assert_eq!(parse_duration("45.9"), Some(45));
    }
}
