//! # Trendfeed
//!
//! Aggregates trending lists and subscribed feeds from many upstreams into
//! one normalized item model, behind a tiered cache.
//!
//! ## Architecture
//!
//! ```text
//! Orchestrator → Cache → Adapter → Transport
//!                           ↓
//!                      Normalizer → NormalizedItem
//! ```
//!
//! - [`fetcher`]: HTTP transport with default headers and typed errors
//! - [`adapters`]: one adapter per upstream, plus the source registry
//! - [`normalizer`]: tolerant RSS/Atom parsing into article, podcast, video
//!   and tweet items
//! - [`cache`] and [`store`]: in-process map over persisted SQLite snapshots
//! - [`orchestrator`]: concurrent fan-out, stale fallback, merge by recency
//!
//! ## Quick Start
//!
//! ```bash
//! # List sources
//! trendfeed sources
//!
//! # One hot list
//! trendfeed fetch weibo
//!
//! # Parameterised source, bypassing the cache
//! trendfeed fetch bestblogs -q category=ai -q minScore=90 --force
//!
//! # Several sources merged, newest first
//! trendfeed fetch-many hackernews github v2ex
//! ```

/// Application context and error handling.
///
/// The [`AppContext`](app::AppContext) struct wires together the snapshot
/// store, the transport, the registry and the orchestrator.
pub mod app;

/// Hot-list and feed adapters behind the [`SourceAdapter`](adapters::SourceAdapter)
/// trait, and the [`Registry`](adapters::Registry) that looks them up by id.
pub mod adapters;

/// Tiered TTL cache: memory in front of a [`SnapshotStore`](store::SnapshotStore).
pub mod cache;

/// Command-line interface using clap.
///
/// - `sources` - List registered sources
/// - `fetch <id>` - Fetch one source
/// - `fetch-many <ids>` - Fetch several and merge
/// - `invalidate <key>` - Drop one cache entry
/// - `clear-cache` - Drop all (or expired) entries
pub mod cli;

/// Configuration loaded from `~/.config/trendfeed/config.toml`.
pub mod config;

/// Core domain models.
///
/// - [`Source`](domain::Source): static upstream descriptor
/// - [`NormalizedItem`](domain::NormalizedItem): one item, tagged by variant
pub mod domain;

/// HTTP transport.
///
/// - [`Fetcher`](fetcher::Fetcher): Async trait for a single exchange
/// - [`HttpFetcher`](fetcher::http_fetcher::HttpFetcher): reqwest-based implementation
/// - [`Transport`](fetcher::Transport): default headers and status/decoding checks
pub mod fetcher;

/// Generic RSS/Atom parsing.
pub mod normalizer;

/// Concurrent fetching through the cache.
pub mod orchestrator;

/// SQLite persistence for cache snapshots.
///
/// - [`SnapshotStore`](store::SnapshotStore): Trait defining snapshot operations
/// - [`SqliteStore`](store::SqliteStore): SQLite implementation
pub mod store;

/// Entity decoding, HTML cleanup and date handling.
pub mod text;
