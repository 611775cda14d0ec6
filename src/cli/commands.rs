use chrono::{DateTime, Utc};

use crate::adapters::Query;
use crate::app::{AppContext, Result};
use crate::domain::{NormalizedItem, Source};
use crate::orchestrator::{Freshness, SourceSnapshot};
use crate::text::{format_relative, truncate};

pub fn list_sources(ctx: &AppContext) -> Result<()> {
    let registry = ctx.registry();
    if registry.is_empty() {
        println!("No sources");
        return Ok(());
    }

    for source in registry.sources() {
        println!("{}", source_line(source));
    }
    println!("\n{} sources", registry.len());
    Ok(())
}

fn source_line(source: &Source) -> String {
    format!(
        "{:<14} {:<8} {}",
        source.id,
        format!("{:?}", source.category).to_lowercase(),
        source.display_name()
    )
}

pub async fn fetch_source(
    ctx: &AppContext,
    id: &str,
    force: bool,
    query: Vec<(String, String)>,
    limit: Option<usize>,
) -> Result<()> {
    let query: Query = query.into_iter().collect();
    let snapshot = match (force, query.is_empty()) {
        (true, _) => ctx.orchestrator.refresh_query(id, &query).await?,
        (false, true) => ctx.orchestrator.fetch_one_snapshot(id).await?,
        (false, false) => ctx.orchestrator.fetch_query(id, &query).await?,
    };

    let now = Utc::now();
    println!("{}", snapshot_header(&snapshot, now));
    print_items(&snapshot.items, limit, now, false);
    Ok(())
}

fn snapshot_header(snapshot: &SourceSnapshot, now: DateTime<Utc>) -> String {
    let state = match snapshot.freshness {
        Freshness::Fresh => "fresh",
        Freshness::Stale => "stale",
    };
    format!(
        "{}: {} items, fetched {} ({})",
        snapshot.key,
        snapshot.items.len(),
        format_relative(snapshot.fetched_at, now),
        state
    )
}

pub async fn fetch_many(ctx: &AppContext, ids: &[String], all: bool, limit: Option<usize>) -> Result<()> {
    let items = if all {
        ctx.orchestrator.fetch_all().await
    } else {
        ctx.orchestrator.fetch_many(ids).await
    };

    if items.is_empty() {
        println!("No items");
        return Ok(());
    }

    print_items(&items, limit, Utc::now(), true);
    Ok(())
}

fn print_items(items: &[NormalizedItem], limit: Option<usize>, now: DateTime<Utc>, with_source: bool) {
    let shown = limit.unwrap_or(items.len()).min(items.len());
    for (rank, item) in items.iter().take(shown).enumerate() {
        println!("{}", item_line(rank + 1, item, now, with_source));
        println!("      {}", item.link);
    }
    if shown < items.len() {
        println!("... {} more", items.len() - shown);
    }
}

fn item_line(rank: usize, item: &NormalizedItem, now: DateTime<Utc>, with_source: bool) -> String {
    let mut line = format!("{:>3}. ", rank);
    if with_source {
        line.push_str(&format!("[{}] ", item.source_id));
    }
    line.push_str(&item.title);
    if let Some(blurb) = item.blurb().filter(|b| !b.is_empty()) {
        line.push_str(&format!("  · {}", truncate(blurb, 40)));
    }
    if let Some(published) = item.published_at {
        line.push_str(&format!("  · {}", format_relative(published, now)));
    }
    line
}

pub fn invalidate(ctx: &AppContext, key: &str) -> Result<()> {
    if ctx.orchestrator.invalidate_cache(key)? {
        println!("Invalidated {}", key);
    } else {
        println!("Nothing cached for {}", key);
    }
    Ok(())
}

pub fn clear_cache(ctx: &AppContext, expired_only: bool) -> Result<()> {
    if expired_only {
        let purged = ctx.orchestrator.clear_expired()?;
        println!("Removed {} expired entries", purged);
    } else {
        let removed = ctx.orchestrator.clear_cache()?;
        println!("Removed {} entries", removed);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Article, Category, SourceFormat};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_item_line() {
        let item = NormalizedItem::article(
            "weibo",
            "1",
            "热搜标题",
            "https://s.weibo.com/1",
            Article {
                info: Some("120万".into()),
                ..Article::default()
            },
        )
        .published(Some(now() - chrono::Duration::minutes(5)));

        assert_eq!(item_line(1, &item, now(), true), "  1. [weibo] 热搜标题  · 120万  · 5分钟前");
        assert_eq!(item_line(12, &item, now(), false), " 12. 热搜标题  · 120万  · 5分钟前");
    }

    #[test]
    fn test_snapshot_header() {
        let snapshot = SourceSnapshot {
            source_id: "hackernews".into(),
            key: "hackernews".into(),
            items: Vec::new(),
            fetched_at: now() - chrono::Duration::hours(2),
            freshness: Freshness::Stale,
        };
        assert_eq!(snapshot_header(&snapshot, now()), "hackernews: 0 items, fetched 2小时前 (stale)");
    }

    #[test]
    fn test_source_line() {
        let source = Source::new("weibo", "微博", Category::China, SourceFormat::HotListJson, "https://weibo.com")
            .titled("热搜");
        assert_eq!(source_line(&source), "weibo          china    微博 热搜");
    }
}
