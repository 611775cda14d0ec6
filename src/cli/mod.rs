pub mod commands;

use clap::{Parser, Subcommand};

use crate::orchestrator::DEFAULT_WORKERS;

#[derive(Parser)]
#[command(name = "trendfeed")]
#[command(about = "Trending lists and feeds from many sources, cached", long_about = None)]
pub struct Cli {
    /// Maximum concurrent upstream fetches
    #[arg(short, long, default_value_t = DEFAULT_WORKERS, global = true)]
    pub workers: usize,

    /// Config file (default: ~/.config/trendfeed/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<std::path::PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List every registered source
    Sources,
    /// Fetch one source
    Fetch {
        /// Source id, e.g. "weibo"
        id: String,
        /// Ignore a fresh cache entry and go to the upstream
        #[arg(short, long)]
        force: bool,
        /// Query parameter for parameterised sources (repeatable)
        #[arg(short, long = "query", value_name = "KEY=VALUE", value_parser = parse_key_value)]
        query: Vec<(String, String)>,
        /// Maximum number of items to print
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Fetch several sources and merge them newest first
    FetchMany {
        /// Source ids
        #[arg(required_unless_present = "all")]
        ids: Vec<String>,
        /// Fetch every registered source
        #[arg(long, conflicts_with = "ids")]
        all: bool,
        /// Maximum number of items to print
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Drop one cache entry, e.g. "weibo" or "bestblogs?category=ai"
    Invalidate {
        key: String,
    },
    /// Drop cached entries
    ClearCache {
        /// Only entries whose TTL has elapsed
        #[arg(long)]
        expired: bool,
    },
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got `{}`", s))?;
    if key.is_empty() {
        return Err(format!("empty key in `{}`", s));
    }
    Ok((key.to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fetch_with_query() {
        let cli = Cli::parse_from([
            "trendfeed", "fetch", "bestblogs", "--query", "category=ai", "-q", "minScore=90", "--force",
        ]);
        let Commands::Fetch { id, force, query, .. } = cli.command else {
            panic!("expected fetch");
        };
        assert_eq!(id, "bestblogs");
        assert!(force);
        assert_eq!(
            query,
            vec![
                ("category".to_string(), "ai".to_string()),
                ("minScore".to_string(), "90".to_string())
            ]
        );
    }

    #[test]
    fn test_fetch_many_requires_ids_or_all() {
        assert!(Cli::try_parse_from(["trendfeed", "fetch-many"]).is_err());
        assert!(Cli::try_parse_from(["trendfeed", "fetch-many", "--all"]).is_ok());
        assert!(Cli::try_parse_from(["trendfeed", "fetch-many", "weibo", "zhihu"]).is_ok());
    }

    #[test]
    fn test_global_workers() {
        let cli = Cli::parse_from(["trendfeed", "sources", "--workers", "4"]);
        assert_eq!(cli.workers, 4);
    }

    #[test]
    fn test_bad_query_pair() {
        assert!(parse_key_value("novalue").is_err());
        assert!(parse_key_value("=x").is_err());
        assert_eq!(parse_key_value("a=b=c").unwrap(), ("a".into(), "b=c".into()));
    }
}
