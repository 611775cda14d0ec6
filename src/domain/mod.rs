pub mod item;
pub mod source;

pub use item::{recency_order, Article, ItemBody, ItemList, NormalizedItem, Podcast, Tweet, Video};
pub use source::{Category, ContentKind, Language, ListType, Source, SourceFormat, Volatility};
