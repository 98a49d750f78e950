
use super::*;

/// RSS feed with three media items, one link-only item and a continuation link
const RSS_FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0"
     xmlns:itunes="http://www.itunes.com/dtds/podcast-1.0.dtd"
     xmlns:content="http://purl.org/rss/1.0/modules/content/"
     xmlns:atom="http://www.w3.org/2005/Atom">
    <channel>
        <title>Test Podcast</title>
        <link>https://example.com</link>
        <description>A podcast about tests</description>
        <atom:link rel="next" href="https://example.com/feed?page=2"></atom:link>
        <atom:link rel="payment" href="https://example.com/donate"></atom:link>
        <itunes:image href="https://example.com/cover.jpg"/>
        <item>
            <title>Episode 3</title>
            <guid>ep-3</guid>
            <pubDate>Wed, 03 Jan 2024 12:00:00 +0000</pubDate>
            <description>Plain text notes</description>
            <itunes:duration>1:02:03</itunes:duration>
            <enclosure url="https://example.com/ep3.mp3" length="3000" type="audio/mpeg"/>
        </item>
        <item>
            <title>Episode 2</title>
            <guid>ep-2</guid>
            <pubDate>Tue, 02 Jan 2024 12:00:00 +0000</pubDate>
            <description>Short notes</description>
            <content:encoded><![CDATA[<p>Rich notes</p>]]></content:encoded>
            <enclosure url="https://example.com/ep2.mp3" length="2000" type="audio/mpeg"/>
        </item>
        <item>
            <title>Episode 1</title>
            <pubDate>Mon, 01 Jan 2024 12:00:00 +0000</pubDate>
            <description><![CDATA[<b>Bold</b> notes]]></description>
            <enclosure url="https://example.com/ep1.mp3" length="1000" type="audio/mpeg"/>
        </item>
        <item>
            <title>Blog post</title>
            <guid>post-1</guid>
            <link>https://example.com/blog/post-1</link>
        </item>
    </channel>
</rss>"#;

/// Atom feed with one enclosure entry and a continuation link
const ATOM_FEED: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
    <title>Atom Podcast</title>
    <subtitle>Atom description</subtitle>
    <id>urn:uuid:feed</id>
    <updated>2024-01-05T12:00:00Z</updated>
    <link rel="alternate" href="https://example.org/"/>
    <link rel="next" href="https://example.org/feed.atom?page=2"/>
    <entry>
        <title>Atom Episode</title>
        <id>urn:uuid:entry-1</id>
        <updated>2024-01-05T12:00:00Z</updated>
        <published>2024-01-04T08:30:00Z</published>
        <link rel="alternate" href="https://example.org/episode-1"/>
        <link rel="enclosure" href="https://example.org/episode-1.m4a" type="audio/mp4" length="4096"/>
        <summary>Atom summary</summary>
    </entry>
    <entry>
        <title>Text only</title>
        <id>urn:uuid:entry-2</id>
        <updated>2024-01-03T12:00:00Z</updated>
        <link rel="alternate" href="https://example.org/text-only"/>
    </entry>
</feed>"#;

const HTML_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
    <title>Example show</title>
    <link rel="stylesheet" href="/style.css">
    <link rel="alternate" type="application/rss+xml" title="Feed" href="/podcast.xml">
</head>
<body>Listen here</body>
</html>"#;
