use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;

use super::{bestblogs, china, coolapk, finance, finish, tech, FeedAdapter, FetchContext, SourceAdapter};
use crate::app::FetchError;
use crate::config::Config;
use crate::domain::{Category, ContentKind, Language, NormalizedItem, Source, SourceFormat};

/// Built-in upstreams with a bespoke fetch and parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    Weibo,
    Zhihu,
    Toutiao,
    Douyin,
    Bilibili,
    Baidu,
    ThePaper,
    Hupu,
    Tieba,
    Douban,
    Ifeng,
    V2ex,
    Ithome,
    Juejin,
    Kr36,
    Sspai,
    Coolapk,
    Cnbeta,
    HackerNews,
    Github,
    WallStreetCn,
    Cls,
    Jin10,
    Xueqiu,
    BestBlogs,
}

impl Provider {
    pub const ALL: [Provider; 25] = [
        Provider::Weibo,
        Provider::Zhihu,
        Provider::Toutiao,
        Provider::Douyin,
        Provider::Bilibili,
        Provider::Baidu,
        Provider::ThePaper,
        Provider::Hupu,
        Provider::Tieba,
        Provider::Douban,
        Provider::Ifeng,
        Provider::V2ex,
        Provider::Ithome,
        Provider::Juejin,
        Provider::Kr36,
        Provider::Sspai,
        Provider::Coolapk,
        Provider::Cnbeta,
        Provider::HackerNews,
        Provider::Github,
        Provider::WallStreetCn,
        Provider::Cls,
        Provider::Jin10,
        Provider::Xueqiu,
        Provider::BestBlogs,
    ];

    pub fn id(self) -> &'static str {
        match self {
            Provider::Weibo => "weibo",
            Provider::Zhihu => "zhihu",
            Provider::Toutiao => "toutiao",
            Provider::Douyin => "douyin",
            Provider::Bilibili => "bilibili",
            Provider::Baidu => "baidu",
            Provider::ThePaper => "thepaper",
            Provider::Hupu => "hupu",
            Provider::Tieba => "tieba",
            Provider::Douban => "douban",
            Provider::Ifeng => "ifeng",
            Provider::V2ex => "v2ex",
            Provider::Ithome => "ithome",
            Provider::Juejin => "juejin",
            Provider::Kr36 => "36kr",
            Provider::Sspai => "sspai",
            Provider::Coolapk => "coolapk",
            Provider::Cnbeta => "cnbeta",
            Provider::HackerNews => "hackernews",
            Provider::Github => "github",
            Provider::WallStreetCn => "wallstreetcn",
            Provider::Cls => "cls",
            Provider::Jin10 => "jin10",
            Provider::Xueqiu => "xueqiu",
            Provider::BestBlogs => "bestblogs",
        }
    }

    /// The static descriptor: display metadata and upstream URL template.
    pub fn descriptor(self) -> Source {
        use Category::*;
        use SourceFormat::*;

        let id = self.id();
        match self {
            Provider::Weibo => Source::new(id, "微博", China, HotListJson, "https://weibo.com/ajax/side/hotSearch")
                .titled("实时热搜")
                .home("https://weibo.com")
                .realtime()
                .interval(120),
            Provider::Zhihu => Source::new(
                id,
                "知乎",
                China,
                HotListJson,
                "https://www.zhihu.com/api/v3/feed/topstory/hot-list-web?limit=30&desktop=true",
            )
            .home("https://www.zhihu.com"),
            Provider::Toutiao => Source::new(
                id,
                "今日头条",
                China,
                HotListJson,
                "https://www.toutiao.com/hot-event/hot-board/?origin=toutiao_pc",
            )
            .home("https://www.toutiao.com"),
            Provider::Douyin => Source::new(
                id,
                "抖音",
                China,
                HotListJson,
                "https://www.douyin.com/aweme/v1/web/hot/search/list/?device_platform=webapp&aid=6383&channel=channel_pc_web",
            )
            .home("https://www.douyin.com"),
            Provider::Bilibili => Source::new(
                id,
                "哔哩哔哩",
                China,
                HotListJson,
                "https://s.search.bilibili.com/main/hotword?limit=30",
            )
            .titled("热搜")
            .home("https://www.bilibili.com"),
            Provider::Baidu => Source::new(id, "百度热搜", China, HotListHtml, "https://top.baidu.com/board?tab=realtime")
                .home("https://www.baidu.com"),
            Provider::ThePaper => Source::new(
                id,
                "澎湃新闻",
                China,
                HotListJson,
                "https://cache.thepaper.cn/contentapi/wwwIndex/rightSidebar",
            )
            .home("https://www.thepaper.cn")
            .interval(1800),
            Provider::Hupu => Source::new(id, "虎扑", China, HotListHtml, "https://bbs.hupu.com/topic-daily-hot")
                .titled("步行街热帖")
                .home("https://hupu.com"),
            Provider::Tieba => Source::new(
                id,
                "百度贴吧",
                China,
                HotListJson,
                "https://tieba.baidu.com/hottopic/browse/topicList",
            )
            .titled("热议")
            .home("https://tieba.baidu.com"),
            Provider::Douban => Source::new(
                id,
                "豆瓣",
                China,
                HotListJson,
                "https://movie.douban.com/j/search_subjects?type=movie&tag=%E7%83%AD%E9%97%A8&page_limit=30&page_start=0",
            )
            .titled("热门电影")
            .home("https://movie.douban.com"),
            Provider::Ifeng => Source::new(id, "凤凰网", China, HotListHtml, "https://www.ifeng.com/")
                .titled("热点资讯")
                .home("https://www.ifeng.com"),
            Provider::V2ex => Source::new(id, "V2EX", Tech, HotListJson, "https://www.v2ex.com/api/topics/hot.json")
                .titled("最热")
                .home("https://www.v2ex.com"),
            Provider::Ithome => Source::new(id, "IT之家", Tech, HotListJson, "https://api.ithome.com/json/newslist/news")
                .home("https://www.ithome.com")
                .realtime(),
            Provider::Juejin => Source::new(
                id,
                "稀土掘金",
                Tech,
                HotListJson,
                "https://api.juejin.cn/content_api/v1/content/article_rank?category_id=1&type=hot&count=30&from=0",
            )
            .home("https://juejin.cn"),
            Provider::Kr36 => Source::new(id, "36氪", Tech, HotListHtml, "https://www.36kr.com/newsflashes")
                .titled("快讯")
                .home("https://36kr.com")
                .realtime(),
            Provider::Sspai => Source::new(
                id,
                "少数派",
                Tech,
                HotListJson,
                "https://sspai.com/api/v1/article/tag/page/get?limit=30&offset=0&created_at={timestamp_ms}&tag=%E7%83%AD%E9%97%A8%E6%96%87%E7%AB%A0&released=false",
            )
            .home("https://sspai.com"),
            Provider::Coolapk => Source::new(
                id,
                "酷安",
                Tech,
                HotListJson,
                "https://api.coolapk.com/v6/page/dataList?url=%2Ffeed%2FstatList%3FcacheExpires%3D300%26statType%3Dday%26sortField%3Ddetailnum%26title%3D%E4%BB%8A%E6%97%A5%E7%83%AD%E9%97%A8&title=%E4%BB%8A%E6%97%A5%E7%83%AD%E9%97%A8&subTitle=&page=1",
            )
            .titled("今日热门")
            .home("https://coolapk.com"),
            Provider::Cnbeta => Source::new(id, "cnBeta", Tech, Rss, "https://rss.cnbeta.com.tw/")
                .titled("资讯")
                .home("https://www.cnbeta.com.tw")
                .realtime(),
            Provider::HackerNews => Source::new(
                id,
                "Hacker News",
                Tech,
                HotListJson,
                "https://hacker-news.firebaseio.com/v0/topstories.json",
            )
            .home("https://news.ycombinator.com")
            .language(Language::English),
            Provider::Github => Source::new(
                id,
                "GitHub",
                Tech,
                HotListJson,
                "https://api.github.com/search/repositories?q=created:>{since_date}&sort=stars&order=desc&per_page=30",
            )
            .titled("Trending")
            .home("https://github.com")
            .language(Language::English),
            Provider::WallStreetCn => Source::new(
                id,
                "华尔街见闻",
                Finance,
                HotListJson,
                "https://api-one.wallstcn.com/apiv1/content/lives?channel=global-channel&limit=30",
            )
            .titled("快讯")
            .home("https://wallstreetcn.com")
            .realtime()
            .interval(300),
            Provider::Cls => Source::new(
                id,
                "财联社",
                Finance,
                HotListJson,
                "https://www.cls.cn/nodeapi/updateTelegraphList?app=CailianpressWeb&os=web&sv=7.7.5",
            )
            .titled("电报")
            .home("https://www.cls.cn")
            .realtime(),
            Provider::Jin10 => Source::new(
                id,
                "金十数据",
                Finance,
                HotListJson,
                "https://www.jin10.com/flash_newest.js?t={timestamp_ms}",
            )
            .home("https://www.jin10.com")
            .realtime(),
            Provider::Xueqiu => Source::new(
                id,
                "雪球",
                Finance,
                HotListJson,
                "https://stock.xueqiu.com/v5/stock/hot_stock/list.json?size=30&_type=10&type=10",
            )
            .titled("热股")
            .home("https://xueqiu.com")
            .interval(120),
            Provider::BestBlogs => Source::new(id, "BestBlogs", Reading, Rss, "https://www.bestblogs.dev/zh/feeds/rss")
                .titled("精选")
                .home("https://www.bestblogs.dev")
                .interval(900)
                .kind(ContentKind::Article),
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Provider::ALL
            .into_iter()
            .find(|p| p.id() == s)
            .ok_or_else(|| format!("unknown provider: {}", s))
    }
}

/// Adapter for one built-in [`Provider`], carrying its (possibly
/// overridden) descriptor.
pub struct HotListAdapter {
    provider: Provider,
    source: Source,
}

impl HotListAdapter {
    pub fn new(provider: Provider) -> Self {
        Self::with_source(provider, provider.descriptor())
    }

    pub fn with_source(provider: Provider, source: Source) -> Self {
        Self { provider, source }
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }
}

#[async_trait]
impl SourceAdapter for HotListAdapter {
    fn descriptor(&self) -> &Source {
        &self.source
    }

    async fn fetch(&self, cx: &FetchContext<'_>) -> Result<Vec<NormalizedItem>, FetchError> {
        let s = &self.source;
        let items = match self.provider {
            Provider::Weibo => china::weibo(cx, s).await?,
            Provider::Zhihu => china::zhihu(cx, s).await?,
            Provider::Toutiao => china::toutiao(cx, s).await?,
            Provider::Douyin => china::douyin(cx, s).await?,
            Provider::Bilibili => china::bilibili(cx, s).await?,
            Provider::Baidu => china::baidu(cx, s).await?,
            Provider::ThePaper => china::thepaper(cx, s).await?,
            Provider::Hupu => china::hupu(cx, s).await?,
            Provider::Tieba => china::tieba(cx, s).await?,
            Provider::Douban => china::douban(cx, s).await?,
            Provider::Ifeng => china::ifeng(cx, s).await?,
            Provider::V2ex => tech::v2ex(cx, s).await?,
            Provider::Ithome => tech::ithome(cx, s).await?,
            Provider::Juejin => tech::juejin(cx, s).await?,
            Provider::Kr36 => tech::kr36(cx, s).await?,
            Provider::Sspai => tech::sspai(cx, s).await?,
            Provider::Coolapk => coolapk::fetch(cx, s).await?,
            Provider::Cnbeta => tech::cnbeta(cx, s).await?,
            Provider::HackerNews => tech::hackernews(cx, s).await?,
            Provider::Github => tech::github(cx, s).await?,
            Provider::WallStreetCn => finance::wallstreetcn(cx, s).await?,
            Provider::Cls => finance::cls(cx, s).await?,
            Provider::Jin10 => finance::jin10(cx, s).await?,
            Provider::Xueqiu => finance::xueqiu(cx, s).await?,
            Provider::BestBlogs => bestblogs::fetch(cx, s).await?,
        };
        Ok(finish(items))
    }
}

/// Lookup table from source id to adapter.
#[derive(Default, Clone)]
pub struct Registry {
    adapters: Vec<Arc<dyn SourceAdapter>>,
    index: HashMap<String, usize>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every built-in provider with its stock descriptor.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for provider in Provider::ALL {
            registry.register(Arc::new(HotListAdapter::new(provider)));
        }
        registry
    }

    /// Built-ins with `[overrides]` applied, plus the configured `[[feeds]]`.
    pub fn from_config(config: &Config) -> Self {
        let mut registry = Self::new();
        for provider in Provider::ALL {
            let mut source = provider.descriptor();
            if let Some(o) = config.overrides.get(provider.id()) {
                tracing::debug!(source = %source.id, url = %o.url, "upstream overridden");
                source.url_template = o.url.clone();
                if let Some(home) = &o.home {
                    source.home = Some(home.clone());
                }
            }
            registry.register(Arc::new(HotListAdapter::with_source(provider, source)));
        }

        for id in config.overrides.keys() {
            if Provider::from_str(id).is_err() {
                tracing::warn!(source = %id, "override for unknown built-in source ignored");
            }
        }

        for feed in &config.feeds {
            registry.register(Arc::new(FeedAdapter::new(feed.to_source())));
        }
        registry
    }

    /// Add an adapter. A later registration under the same id replaces the
    /// earlier one.
    pub fn register(&mut self, adapter: Arc<dyn SourceAdapter>) {
        let id = adapter.descriptor().id.clone();
        match self.index.get(&id) {
            Some(&slot) => {
                tracing::warn!(source = %id, "duplicate source id, replacing earlier adapter");
                self.adapters[slot] = adapter;
            }
            None => {
                self.index.insert(id, self.adapters.len());
                self.adapters.push(adapter);
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn SourceAdapter>> {
        self.index.get(id).map(|&slot| self.adapters[slot].clone())
    }

    pub fn descriptor(&self, id: &str) -> Option<&Source> {
        self.index.get(id).map(|&slot| self.adapters[slot].descriptor())
    }

    /// Descriptors in registration order.
    pub fn sources(&self) -> impl Iterator<Item = &Source> {
        self.adapters.iter().map(|a| a.descriptor())
    }

    pub fn ids(&self) -> Vec<String> {
        self.sources().map(|s| s.id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}
