//! RSS and Atom ingestion
//!
//! Feeds are downloaded with reqwest, optionally through a proxy prefix,
//! and parsed with quick-xml. New items become draft posts, or scheduled
//! ones at the platform's next best time when the feed auto-posts.

use std::time::Duration;

use chrono::{DateTime, FixedOffset, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use reqwest::Client;
use tracing::{debug, info, warn};

use crate::ai::{clean_generated, ContentGenerator, GenerationRequest, SourceArticle};
use crate::config::RssConfig;
use crate::error::{DeckError, FeedError, Result};
use crate::scheduling::next_best_slot;
use crate::store::Store;
use crate::types::{AppState, Platform, Post, RssFeed};

#[derive(Debug, Clone, PartialEq)]
pub struct FeedItem {
    pub title: String,
    pub link: String,
    pub summary: Option<String>,
    pub published: Option<DateTime<Utc>>,
}

impl FeedItem {
    fn source(&self) -> SourceArticle {
        SourceArticle {
            title: self.title.clone(),
            link: self.link.clone(),
            summary: self.summary.clone(),
        }
    }
}

/// Check that `url` is an absolute http(s) URL
pub fn validate_feed_url(url: &str) -> std::result::Result<url::Url, FeedError> {
    let parsed = url::Url::parse(url).map_err(|e| FeedError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(FeedError::InvalidUrl {
            url: url.to_string(),
            reason: format!("unsupported scheme '{}'", other),
        }),
    }
}

pub struct FeedClient {
    http: Client,
    proxy: Option<String>,
    max_items: usize,
}

impl FeedClient {
    pub fn new(config: &RssConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("socialdeck/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FeedError::Http {
                url: String::new(),
                message: e.to_string(),
            })?;

        Ok(Self {
            http,
            proxy: config.proxy.clone().filter(|p| !p.trim().is_empty()),
            max_items: config.max_items,
        })
    }

    pub fn max_items(&self) -> usize {
        self.max_items
    }

    /// URL actually requested for `url`: the feed itself, or the proxy
    /// prefix followed by the percent-encoded feed URL
    pub fn request_url(&self, url: &str) -> std::result::Result<String, FeedError> {
        let parsed = validate_feed_url(url)?;
        Ok(match &self.proxy {
            Some(prefix) => {
                let encoded: String =
                    url::form_urlencoded::byte_serialize(parsed.as_str().as_bytes()).collect();
                format!("{}{}", prefix, encoded)
            }
            None => parsed.to_string(),
        })
    }

    pub async fn fetch(&self, url: &str) -> Result<Vec<FeedItem>> {
        let target = self.request_url(url)?;
        debug!("Fetching feed {}", target);

        let res = self.http.get(&target).send().await.map_err(|e| FeedError::Http {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        let status = res.status();
        if !status.is_success() {
            return Err(FeedError::UnexpectedStatus {
                status: status.as_u16(),
                url: url.to_string(),
            }
            .into());
        }

        let body = res.text().await.map_err(|e| FeedError::Http {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        Ok(parse_feed(&body)?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Field {
    Title,
    Link,
    Summary,
    Published,
}

#[derive(Default)]
struct ItemBuilder {
    title: String,
    link: String,
    summary: String,
    published: String,
}

impl ItemBuilder {
    fn push(&mut self, field: Field, text: &str) {
        let target = match field {
            Field::Title => &mut self.title,
            Field::Link => &mut self.link,
            Field::Summary => &mut self.summary,
            Field::Published if !self.published.is_empty() => return,
            Field::Published => &mut self.published,
        };
        if !target.is_empty() {
            target.push(' ');
        }
        target.push_str(text);
    }

    fn finish(self) -> Option<FeedItem> {
        let link = self.link.trim().to_string();
        if link.is_empty() {
            return None;
        }
        let summary = strip_html(&self.summary);
        Some(FeedItem {
            title: strip_html(&self.title),
            link,
            summary: (!summary.is_empty()).then_some(summary),
            published: parse_date(self.published.trim()),
        })
    }
}

/// Local part of an element name inside an item, `None` for extension
/// namespaces such as `media:` or `dc:`
fn item_element(qualified: &[u8]) -> Option<&[u8]> {
    match qualified.iter().position(|&b| b == b':') {
        None => Some(qualified),
        Some(colon) if &qualified[..colon] == b"atom" => Some(&qualified[colon + 1..]),
        Some(_) => None,
    }
}

fn field_for(name: &[u8]) -> Option<Field> {
    match name {
        b"title" => Some(Field::Title),
        b"link" => Some(Field::Link),
        b"description" | b"summary" | b"content" => Some(Field::Summary),
        b"pubDate" | b"published" | b"updated" => Some(Field::Published),
        _ => None,
    }
}

/// `href` of an Atom `<link>`, unless it points somewhere other than the entry
fn atom_href(e: &BytesStart<'_>) -> Option<String> {
    let mut href = None;
    let mut rel = None;
    for attr in e.attributes().flatten() {
        let value = attr.unescape_value().ok()?.into_owned();
        match attr.key.local_name().as_ref() {
            b"href" => href = Some(value),
            b"rel" => rel = Some(value),
            _ => {}
        }
    }
    match rel.as_deref() {
        None | Some("alternate") => href,
        Some(_) => None,
    }
}

/// Parse an RSS 2.0 or Atom document into its items
pub fn parse_feed(xml: &str) -> std::result::Result<Vec<FeedItem>, FeedError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut items = Vec::new();
    let mut current: Option<ItemBuilder> = None;
    let mut field: Option<Field> = None;
    // Depth of markup nested inside a field, e.g. <b> in an Atom <content>
    let mut nested = 0usize;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let local = e.local_name();
                let name = local.as_ref();
                if name == b"item" || name == b"entry" {
                    current = Some(ItemBuilder::default());
                    field = None;
                    nested = 0;
                } else if let Some(item) = current.as_mut() {
                    let qualified = e.name();
                    if field.is_some() {
                        nested += 1;
                    } else if item_element(qualified.as_ref()) == Some(b"link".as_slice()) {
                        if let Some(href) = atom_href(&e) {
                            if item.link.is_empty() {
                                item.link = href;
                            }
                        }
                        field = Some(Field::Link);
                    } else {
                        field = item_element(qualified.as_ref()).and_then(field_for);
                    }
                }
            }
            Event::Empty(e) => {
                if let Some(item) = current.as_mut() {
                    if item_element(e.name().as_ref()) == Some(b"link".as_slice()) && item.link.is_empty() {
                        if let Some(href) = atom_href(&e) {
                            item.link = href;
                        }
                    }
                }
            }
            Event::End(e) => {
                let name = e.local_name();
                match name.as_ref() {
                    b"item" | b"entry" => {
                        if let Some(item) = current.take().and_then(ItemBuilder::finish) {
                            items.push(item);
                        }
                        field = None;
                        nested = 0;
                    }
                    _ if nested > 0 => nested -= 1,
                    _ => field = None,
                }
            }
            Event::Text(e) => {
                if let (Some(item), Some(f)) = (current.as_mut(), field) {
                    let text = e.unescape()?;
                    if f != Field::Link || item.link.is_empty() {
                        item.push(f, &text);
                    }
                }
            }
            Event::CData(e) => {
                if let (Some(item), Some(f)) = (current.as_mut(), field) {
                    let text = String::from_utf8_lossy(e.as_ref()).into_owned();
                    item.push(f, &text);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(items)
}

fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    if raw.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc2822(raw)
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .map(|d| d.with_timezone(&Utc))
        .ok()
}

/// Remove markup and collapse whitespace
pub fn strip_html(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Items published after `since`; undated items are always kept
pub fn items_since(items: &[FeedItem], since: Option<DateTime<Utc>>) -> Vec<FeedItem> {
    items
        .iter()
        .filter(|item| match (since, item.published) {
            (Some(since), Some(published)) => published > since,
            _ => true,
        })
        .cloned()
        .collect()
}

/// Title and link, with the title shortened when both exceed `limit`
fn plain_content(item: &FeedItem, limit: Option<usize>) -> String {
    let full = format!("{}\n\n{}", item.title, item.link);
    match limit {
        Some(limit) if full.chars().count() > limit => {
            let room = limit.saturating_sub(item.link.chars().count() + 2);
            if room == 0 {
                return item.link.clone();
            }
            let title = clean_generated(&item.title, Some(room));
            format!("{}\n\n{}", title, item.link)
        }
        _ => full,
    }
}

/// Turn feed items into posts for each of the feed's platforms
///
/// Items already posted to a platform (same `source_url`) are skipped.
/// Auto-post feeds still leave drafts on platforms that need an image. With `generator`, content is an AI summary; a failed generation falls
/// back to title and link.
pub async fn drafts_from_items(
    feed: &RssFeed,
    items: &[FeedItem],
    state: &AppState,
    generator: Option<&dyn ContentGenerator>,
    now: DateTime<Utc>,
    offset: FixedOffset,
) -> Vec<Post> {
    let mut posts = Vec::new();

    for item in items {
        for &platform in &feed.platforms {
            let seen = state
                .posts
                .iter()
                .chain(posts.iter())
                .any(|p| p.platform == platform && p.source_url.as_deref() == Some(&item.link));
            if seen {
                continue;
            }

            let content = match generator {
                Some(generator) => {
                    let request = GenerationRequest::new(platform, item.title.clone())
                        .with_source(item.source());
                    match generator.generate(&request).await {
                        Ok(text) => text,
                        Err(e) => {
                            warn!("Summarizing '{}' for {} failed: {}", item.title, platform, e);
                            plain_content(item, platform.character_limit())
                        }
                    }
                }
                None => plain_content(item, platform.character_limit()),
            };

            let queue = feed.auto_post && !platform.requires_image();
            if feed.auto_post && !queue {
                debug!(
                    "Keeping '{}' as a {} draft until it has an image",
                    item.title, platform
                );
            }
            let mut post = if queue {
                let when = slot_for(state, platform, now, offset);
                Post::scheduled(content, platform, when)
            } else {
                Post::new(content, platform, now)
            };
            post.source_url = Some(item.link.clone());
            post.ai_generated = generator.is_some();
            posts.push(post);
        }
    }
    posts
}

fn slot_for(state: &AppState, platform: Platform, now: DateTime<Utc>, offset: FixedOffset) -> DateTime<Utc> {
    state
        .platform_settings(platform)
        .and_then(|s| next_best_slot(&s.best_times, now, offset))
        .unwrap_or(now)
}

/// Fetch one stored feed, add posts for its new items, and stamp
/// `last_fetched`
pub async fn refresh_feed(
    store: &Store,
    client: &FeedClient,
    generator: Option<&dyn ContentGenerator>,
    feed_id: &str,
    now: DateTime<Utc>,
    offset: FixedOffset,
) -> Result<Vec<Post>> {
    let state = store.load().await?;
    let feed = state
        .rss_feeds
        .iter()
        .find(|f| f.id == feed_id || f.name.eq_ignore_ascii_case(feed_id))
        .cloned()
        .ok_or_else(|| DeckError::InvalidInput(format!("No feed named '{}'", feed_id)))?;

    let items = client.fetch(&feed.url).await?;
    let mut fresh = items_since(&items, feed.last_fetched);
    fresh.truncate(client.max_items());
    info!(
        "Feed '{}': {} items, {} new",
        feed.name,
        items.len(),
        fresh.len()
    );

    let posts = drafts_from_items(&feed, &fresh, &state, generator, now, offset).await;

    let added = posts.clone();
    let id = feed.id.clone();
    store
        .update(move |state| {
            if let Some(stored) = state.rss_feeds.iter_mut().find(|f| f.id == id) {
                stored.last_fetched = Some(now);
            }
            state.posts.extend(added);
            Ok(())
        })
        .await?;

    Ok(posts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::StaticGenerator;
    use crate::types::PostStatus;
    use chrono::TimeZone;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:atom="http://www.w3.org/2005/Atom">
  <channel>
    <title>Rust Blog</title>
    <atom:link href="https://blog.rust-lang.org/feed.xml" rel="self"/>
    <item>
      <title>Announcing Rust 1.90</title>
      <link>https://blog.rust-lang.org/2026/09/18/Rust-1.90.0</link>
      <description><![CDATA[<p>The Rust team is <b>happy</b> to announce</p>]]></description>
      <pubDate>Fri, 18 Sep 2026 00:00:00 +0000</pubDate>
    </item>
    <item>
      <title>Project goals &amp; updates</title>
      <link>https://blog.rust-lang.org/2026/08/01/goals</link>
      <pubDate>Sat, 01 Aug 2026 00:00:00 +0000</pubDate>
    </item>
  </channel>
</rss>"#;

    const ATOM: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Example</title>
  <link href="https://example.org/" rel="alternate"/>
  <entry>
    <title>Atom-powered robots</title>
    <link rel="edit" href="https://example.org/edit/1"/>
    <link href="https://example.org/2026/robots"/>
    <updated>2026-10-01T18:30:02Z</updated>
    <summary type="html">Some &lt;em&gt;text&lt;/em&gt;.</summary>
  </entry>
</feed>"#;

    fn utc(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    fn feed(auto_post: bool) -> RssFeed {
        RssFeed {
            id: "feed-1".to_string(),
            name: "rust".to_string(),
            url: "https://blog.rust-lang.org/feed.xml".to_string(),
            platforms: vec![Platform::Twitter, Platform::LinkedIn],
            last_fetched: None,
            auto_post,
        }
    }

    fn offset() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    #[test]
    fn test_parse_rss_items() {
        let items = parse_feed(RSS).unwrap();
        assert_eq!(items.len(), 2);

        assert_eq!(items[0].title, "Announcing Rust 1.90");
        assert_eq!(items[0].link, "https://blog.rust-lang.org/2026/09/18/Rust-1.90.0");
        assert_eq!(items[0].summary.as_deref(), Some("The Rust team is happy to announce"));
        assert_eq!(items[0].published, Some(utc(2026, 9, 18, 0)));

        assert_eq!(items[1].title, "Project goals & updates");
        assert!(items[1].summary.is_none());
    }

    #[test]
    fn test_parse_atom_entries() {
        let items = parse_feed(ATOM).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "Atom-powered robots");
        assert_eq!(items[0].link, "https://example.org/2026/robots");
        assert_eq!(items[0].summary.as_deref(), Some("Some text."));
        assert_eq!(
            items[0].published,
            Some(Utc.with_ymd_and_hms(2026, 10, 1, 18, 30, 2).unwrap())
        );
    }

    #[test]
    fn test_malformed_xml_is_an_error() {
        let result = parse_feed("<rss><channel><item><title>x</link></item>");
        assert!(matches!(result, Err(FeedError::Xml(_))));
    }

    #[test]
    fn test_items_since() {
        let items = parse_feed(RSS).unwrap();
        let fresh = items_since(&items, Some(utc(2026, 9, 1, 0)));
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].title, "Announcing Rust 1.90");
        assert_eq!(items_since(&items, None).len(), 2);
    }

    #[test]
    fn test_request_url_with_proxy() {
        let client = FeedClient::new(&RssConfig {
            proxy: Some("https://proxy.example/raw?url=".to_string()),
            ..RssConfig::default()
        })
        .unwrap();
        assert_eq!(
            client.request_url("https://example.org/feed?a=1").unwrap(),
            "https://proxy.example/raw?url=https%3A%2F%2Fexample.org%2Ffeed%3Fa%3D1"
        );
        assert!(client.request_url("ftp://example.org/feed").is_err());
        assert!(client.request_url("not a url").is_err());
    }

    #[tokio::test]
    async fn test_drafts_without_generator() {
        let items = parse_feed(RSS).unwrap();
        let now = utc(2026, 10, 19, 8);
        let posts =
            drafts_from_items(&feed(false), &items[..1], &AppState::default(), None, now, offset())
                .await;

        assert_eq!(posts.len(), 2);
        for post in &posts {
            assert_eq!(post.status, PostStatus::Draft);
            assert!(!post.ai_generated);
            assert_eq!(post.source_url.as_deref(), Some(items[0].link.as_str()));
            assert!(post.content.ends_with(&items[0].link));
        }
    }

    #[tokio::test]
    async fn test_auto_post_schedules_next_best_time() {
        let items = parse_feed(RSS).unwrap();
        let now = utc(2026, 10, 19, 10);
        let generator = StaticGenerator::new();
        let posts = drafts_from_items(
            &feed(true),
            &items[..1],
            &AppState::default(),
            Some(&generator),
            now,
            offset(),
        )
        .await;

        let twitter = posts.iter().find(|p| p.platform == Platform::Twitter).unwrap();
        assert_eq!(twitter.status, PostStatus::Scheduled);
        assert_eq!(twitter.scheduled_time, utc(2026, 10, 19, 12));
        assert!(twitter.ai_generated);
        assert_eq!(generator.requests()[0].source.as_ref().unwrap().title, "Announcing Rust 1.90");
    }

    #[tokio::test]
    async fn test_already_posted_items_are_skipped() {
        let items = parse_feed(RSS).unwrap();
        let mut state = AppState::default();
        let mut existing = Post::new("old".to_string(), Platform::Twitter, Utc::now());
        existing.source_url = Some(items[0].link.clone());
        state.posts.push(existing);

        let posts = drafts_from_items(&feed(false), &items[..1], &state, None, Utc::now(), offset())
            .await;
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].platform, Platform::LinkedIn);
    }

    #[test]
    fn test_plain_content_fits_limit() {
        let item = FeedItem {
            title: "word ".repeat(100),
            link: "https://example.org/a".to_string(),
            summary: None,
            published: None,
        };
        let content = plain_content(&item, Some(280));
        assert!(content.chars().count() <= 280);
        assert!(content.ends_with("https://example.org/a"));
    }

    #[test]
    fn test_plain_content_drops_title_when_link_fills_limit() {
        let item = FeedItem {
            title: "Release notes".to_string(),
            link: "https://example.org/abcdefgh".to_string(),
            summary: None,
            published: None,
        };
        // 28-char link leaves no room for a title under a 29-char limit
        assert_eq!(plain_content(&item, Some(29)), "https://example.org/abcdefgh");
        assert_eq!(plain_content(&item, Some(30)), "https://example.org/abcdefgh");
    }

    #[test]
    fn test_extension_elements_do_not_leak_into_items() {
        let xml = r#"<rss version="2.0"
    xmlns:media="http://search.yahoo.com/mrss/"
    xmlns:dc="http://purl.org/dc/elements/1.1/">
  <channel>
    <item>
      <title>Launch day</title>
      <media:title>Hero image</media:title>
      <media:content url="https://cdn.example.org/hero.png">Image credit</media:content>
      <link>https://example.org/launch</link>
      <pubDate>Fri, 18 Sep 2026 00:00:00 +0000</pubDate>
      <dc:date>2026-09-18T00:00:00Z</dc:date>
    </item>
  </channel>
</rss>"#;
        let items = parse_feed(xml).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "Launch day");
        assert!(items[0].summary.is_none());
        assert_eq!(items[0].published, Some(utc(2026, 9, 18, 0)));
    }

    #[tokio::test]
    async fn test_auto_post_keeps_instagram_as_draft() {
        let items = parse_feed(RSS).unwrap();
        let mut feed = feed(true);
        feed.platforms = vec![Platform::Twitter, Platform::Instagram];

        let posts = drafts_from_items(
            &feed,
            &items[..1],
            &AppState::default(),
            None,
            utc(2026, 10, 19, 8),
            offset(),
        )
        .await;

        let status = |platform| posts.iter().find(|p| p.platform == platform).unwrap().status;
        assert_eq!(status(Platform::Twitter), PostStatus::Scheduled);
        assert_eq!(status(Platform::Instagram), PostStatus::Draft);
    }

    #[tokio::test]
    async fn test_fetch_through_proxy() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/raw"))
            .and(query_param("url", "https://example.org/atom.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(ATOM))
            .mount(&server)
            .await;

        let client = FeedClient::new(&RssConfig {
            proxy: Some(format!("{}/raw?url=", server.uri())),
            ..RssConfig::default()
        })
        .unwrap();
        let items = client.fetch("https://example.org/atom.xml").await.unwrap();
        assert_eq!(items.len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_unexpected_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = FeedClient::new(&RssConfig::default()).unwrap();
        let err = client
            .fetch(&format!("{}/missing.xml", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DeckError::Feed(FeedError::UnexpectedStatus { status: 404, .. })
        ));
    }

    #[tokio::test]
    async fn test_refresh_feed_stores_posts_and_stamps_feed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(RSS))
            .mount(&server)
            .await;

        let dir = tempfile::TempDir::new().unwrap();
        let store = Store::new(dir.path().join("state.db").to_str().unwrap())
            .await
            .unwrap();
        let mut rss = feed(false);
        rss.url = format!("{}/feed.xml", server.uri());
        rss.platforms = vec![Platform::Telegram];
        store
            .update(move |state| {
                state.rss_feeds.push(rss);
                Ok(())
            })
            .await
            .unwrap();

        let client = FeedClient::new(&RssConfig::default()).unwrap();
        let now = utc(2026, 10, 19, 8);
        let posts = refresh_feed(&store, &client, None, "rust", now, offset())
            .await
            .unwrap();
        assert_eq!(posts.len(), 2);

        let state = store.load().await.unwrap();
        assert_eq!(state.posts.len(), 2);
        assert_eq!(state.rss_feeds[0].last_fetched, Some(now));

        // Nothing new the second time round
        let again = refresh_feed(&store, &client, None, "feed-1", now, offset())
            .await
            .unwrap();
        assert!(again.is_empty());
    }
}
