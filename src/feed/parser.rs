//! RSS 2.0 and Atom parsing into [`ParsedFeed`]

use super::{FeedEntry, ParsedFeed};
use crate::error::FeedError;
use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

/// File extensions accepted as media when an entry has no enclosure
const MEDIA_EXTENSIONS: &[&str] = &[
    ".mp3", ".m4a", ".m4b", ".aac", ".ogg", ".oga", ".opus", ".flac", ".wav", ".mp4", ".m4v",
    ".mov", ".webm",
];

static HTML_TAG: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"<(?:[a-zA-Z][a-zA-Z0-9]*|/[a-zA-Z][a-zA-Z0-9]*)[\s>/]").ok());

static LINK_TAG: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"(?is)<link\b[^>]*>").ok());

static ATTRIBUTE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r#"(?i)([a-z-]+)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>]+))"#).ok()
});

/// Parse a feed document, trying RSS first and then Atom
///
/// `etag` and `last_modified` are the caching headers of the response the body
/// came from.
pub fn parse_feed(
    body: &[u8],
    etag: Option<String>,
    last_modified: Option<String>,
) -> Result<ParsedFeed, FeedError> {
    let mut feed = match parse_rss(body) {
        Ok(feed) => feed,
        Err(rss_err) => {
            debug!(error = %rss_err, "not an RSS document, trying Atom");
            parse_atom(body).map_err(|atom_err| {
                FeedError::InvalidFeed(format!(
                    "Failed to parse feed as RSS or Atom. RSS error: {}. Atom error: {}",
                    rss_err, atom_err
                ))
            })?
        }
    };
    feed.http_etag = etag;
    feed.http_last_modified = last_modified;
    Ok(feed)
}

fn parse_rss(body: &[u8]) -> Result<ParsedFeed, rss::Error> {
    let channel = rss::Channel::read_from(body)?;

    let mut next_page = None;
    let mut payment_url = None;
    for elements in channel.extensions().values() {
        for link in elements.get("link").into_iter().flatten() {
            let rel = link.attrs().get("rel").map(String::as_str);
            let href = link.attrs().get("href").cloned();
            match rel {
                Some("next") if next_page.is_none() => next_page = href,
                Some("payment") if payment_url.is_none() => payment_url = href,
                _ => {}
            }
        }
    }

    let cover_url = channel
        .itunes_ext()
        .and_then(|itunes| itunes.image())
        .map(str::to_string)
        .or_else(|| channel.image().map(|image| image.url().to_string()));

    let entries = channel
        .items()
        .iter()
        .filter_map(|item| {
            let enclosure = item.enclosure();
            let media_url = enclosure
                .map(|enc| enc.url().to_string())
                .filter(|url| !url.is_empty())
                .or_else(|| item.link().filter(|l| is_media_link(l)).map(str::to_string))?;

            let guid = item
                .guid()
                .map(|g| g.value().to_string())
                .filter(|g| !g.is_empty())
                .unwrap_or_else(|| media_url.clone());

            let published = item.pub_date().and_then(|date| {
                DateTime::parse_from_rfc2822(date)
                    .ok()
                    .map(|dt| dt.with_timezone(&Utc))
            });

            let (description, description_html) =
                split_description(item.description(), item.content());

            let total_time = item
                .itunes_ext()
                .and_then(|itunes| itunes.duration())
                .and_then(parse_duration)
                .unwrap_or(0);

            Some(FeedEntry {
                guid,
                title: item.title().unwrap_or_default().trim().to_string(),
                mime_type: enclosure
                    .map(|enc| enc.mime_type().to_string())
                    .filter(|m| !m.is_empty()),
                file_size: enclosure
                    .and_then(|enc| enc.length().trim().parse::<u64>().ok())
                    .unwrap_or(0),
                media_url,
                published,
                description,
                description_html,
                link: item.link().map(str::to_string),
                payment_url: None,
                total_time,
            })
        })
        .collect();

    Ok(ParsedFeed {
        title: non_empty(channel.title()),
        link: non_empty(channel.link()),
        description: non_empty(channel.description()),
        cover_url,
        payment_url,
        http_etag: None,
        http_last_modified: None,
        entries,
        next_page,
    })
}

fn parse_atom(body: &[u8]) -> Result<ParsedFeed, atom_syndication::Error> {
    let feed = atom_syndication::Feed::read_from(body)?;

    let feed_link = |rel: &str| {
        feed.links()
            .iter()
            .find(|link| link.rel() == rel)
            .map(|link| link.href().to_string())
    };

    let entries = feed
        .entries()
        .iter()
        .filter_map(|entry| {
            let enclosure = entry
                .links()
                .iter()
                .find(|link| link.rel() == "enclosure");
            let media_url = enclosure.map(|link| link.href().to_string())?;

            let link = entry
                .links()
                .iter()
                .find(|link| link.rel() == "alternate")
                .map(|link| link.href().to_string());

            let guid = if entry.id().is_empty() {
                media_url.clone()
            } else {
                entry.id().to_string()
            };

            let published = entry
                .published()
                .or_else(|| Some(entry.updated()))
                .and_then(|dt| {
                    DateTime::parse_from_rfc3339(&dt.to_rfc3339())
                        .ok()
                        .map(|dt| dt.with_timezone(&Utc))
                });

            let (description, description_html) = match entry.content() {
                Some(content) if content.value().is_some() => {
                    let value = content.value().map(str::to_string);
                    match content.content_type() {
                        Some("html") | Some("xhtml") => (None, value),
                        _ => split_description(value.as_deref(), None),
                    }
                }
                _ => split_description(entry.summary().map(|s| s.as_str()), None),
            };

            Some(FeedEntry {
                guid,
                title: entry.title().as_str().trim().to_string(),
                mime_type: enclosure.and_then(|l| l.mime_type()).map(str::to_string),
                file_size: enclosure
                    .and_then(|l| l.length())
                    .and_then(|len| len.trim().parse::<u64>().ok())
                    .unwrap_or(0),
                media_url,
                published,
                description,
                description_html,
                payment_url: entry
                    .links()
                    .iter()
                    .find(|l| l.rel() == "payment")
                    .map(|l| l.href().to_string()),
                link,
                total_time: 0,
            })
        })
        .collect();

    Ok(ParsedFeed {
        title: non_empty(feed.title().as_str()),
        link: feed_link("alternate"),
        description: feed.subtitle().and_then(|s| non_empty(s.as_str())),
        cover_url: feed.logo().or(feed.icon()).map(str::to_string),
        payment_url: feed_link("payment"),
        http_etag: None,
        http_last_modified: None,
        entries,
        next_page: feed_link("next"),
    })
}

/// Decide between the plain and HTML description of an entry
fn split_description(
    description: Option<&str>,
    encoded: Option<&str>,
) -> (Option<String>, Option<String>) {
    if let Some(html) = encoded.filter(|c| !c.trim().is_empty()) {
        return (None, Some(html.to_string()));
    }
    match description.filter(|d| !d.trim().is_empty()) {
        Some(text) if looks_like_html(text) => (None, Some(text.to_string())),
        Some(text) => (Some(text.trim().to_string()), None),
        None => (None, None),
    }
}

fn looks_like_html(text: &str) -> bool {
    HTML_TAG.as_ref().is_some_and(|re| re.is_match(text))
}

fn is_media_link(link: &str) -> bool {
    let path = link.split(['?', '#']).next().unwrap_or(link).to_ascii_lowercase();
    MEDIA_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Parse an itunes:duration value ("SS", "MM:SS" or "HH:MM:SS") into seconds
///
/// ```
/// use podcast_dl::feed::parse_duration;
///
/// assert_eq!(parse_duration("1:02:03"), Some(3723));
/// assert_eq!(parse_duration("45:10"), Some(2710));
/// assert_eq!(parse_duration("600"), Some(600));
/// assert_eq!(parse_duration("soon"), None);
/// ```
pub fn parse_duration(value: &str) -> Option<u64> {
    let parts: Vec<&str> = value.trim().split(':').collect();
    if parts.is_empty() || parts.len() > 3 {
        return None;
    }
    let mut total = 0u64;
    for part in parts {
        let n: f64 = part.trim().parse().ok()?;
        if !n.is_finite() || n < 0.0 {
            return None;
        }
        total = total * 60 + n as u64;
    }
    Some(total)
}

/// Find an RSS/Atom feed advertised by an HTML page
///
/// Looks for `<link rel="alternate" type="application/rss+xml" href="...">` (or the
/// Atom type) and resolves the href against `base_url`.
pub fn discover_feed_link(html: &str, base_url: &str) -> Option<String> {
    let link_tag = LINK_TAG.as_ref()?;
    let attribute = ATTRIBUTE.as_ref()?;

    for tag in link_tag.find_iter(html) {
        let mut rel = None;
        let mut kind = None;
        let mut href = None;
        for cap in attribute.captures_iter(tag.as_str()) {
            let value = cap
                .get(2)
                .or_else(|| cap.get(3))
                .or_else(|| cap.get(4))
                .map(|m| m.as_str().trim());
            match cap.get(1).map(|m| m.as_str().to_ascii_lowercase()).as_deref() {
                Some("rel") => rel = value.map(str::to_ascii_lowercase),
                Some("type") => kind = value.map(str::to_ascii_lowercase),
                Some("href") => href = value,
                _ => {}
            }
        }

        let is_alternate = rel
            .as_deref()
            .is_some_and(|r| r.split_whitespace().any(|token| token == "alternate"));
        let is_feed = matches!(
            kind.as_deref(),
            Some("application/rss+xml") | Some("application/atom+xml")
        );
        if let Some(href) = href.filter(|_| is_alternate && is_feed) {
            let resolved = url::Url::parse(base_url)
                .and_then(|base| base.join(href))
                .map(|u| u.to_string())
                .unwrap_or_else(|_| href.to_string());
            return Some(resolved);
        }
    }
    None
}
