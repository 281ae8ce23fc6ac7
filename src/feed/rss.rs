//! Tolerant RSS/Atom feed extraction
//!
//! Pulls items out of RSS 2.0, RDF and Atom documents with plain string
//! scanning. Upstream feeds are frequently sloppy, so every field falls
//! back or skips instead of failing: an item without a link or a parsable
//! date is dropped, everything else defaults.

use chrono::{DateTime, Utc};

use super::{first_img_src, force_https};

/// One entry extracted from a syndication feed
#[derive(Debug, Clone, PartialEq)]
pub struct FeedItem {
    /// Entry title, empty when the feed omits it
    pub title: String,
    /// Permalink of the entry
    pub link: String,
    /// Publication time
    pub date: DateTime<Utc>,
    /// Raw summary markup, empty when the feed omits it
    pub description: String,
    /// Preview image, from media markup or the first embedded `<img>`
    pub thumbnail: Option<String>,
}

/// Parses a syndication document into feed items
///
/// Handles RSS 2.0 (`<item>` + `pubDate`), RDF (`<item>` + `dc:date`) and
/// Atom (`<entry>` + `published`/`updated`). Items missing a link or a
/// parsable date are skipped.
pub fn parse_feed(xml: &str) -> Vec<FeedItem> {
    let atom = !xml.contains("<rss") && !xml.contains("<rdf:RDF") && xml.contains("<feed");
    let tag = if atom { "entry" } else { "item" };
    element_blocks(xml, tag)
        .into_iter()
        .filter_map(|block| parse_block(block, atom))
        .collect()
}

fn parse_block(block: &str, atom: bool) -> Option<FeedItem> {
    let title = element_text(block, "title").unwrap_or_default();

    let link = if atom {
        atom_link(block)
    } else {
        element_text(block, "link")
    }?;

    let date_text = if atom {
        element_text(block, "published").or_else(|| element_text(block, "updated"))
    } else {
        element_text(block, "pubDate").or_else(|| element_text(block, "dc:date"))
    }?;
    let date = parse_date(&date_text)?;

    let description = if atom {
        element_text(block, "summary").or_else(|| element_text(block, "content"))
    } else {
        element_text(block, "description").or_else(|| element_text(block, "content:encoded"))
    }
    .unwrap_or_default();

    let thumbnail = media_url(block)
        .map(|url| force_https(&url))
        .or_else(|| first_img_src(&description));

    Some(FeedItem {
        title,
        link,
        date,
        description,
        thumbnail,
    })
}

/// Returns the inner text of every `<tag>...</tag>` element, in order
fn element_blocks<'a>(xml: &'a str, tag: &str) -> Vec<&'a str> {
    let open = format!("<{}", tag);
    let close = format!("</{}>", tag);
    let mut blocks = Vec::new();
    let mut from = 0;

    while let Some(rel) = xml[from..].find(&open) {
        let start = from + rel;
        let after = start + open.len();
        if !tag_name_ends_at(xml, after) {
            from = after;
            continue;
        }
        let Some(open_end) = xml[after..].find('>') else {
            break;
        };
        let body_start = after + open_end + 1;
        let Some(close_rel) = xml[body_start..].find(&close) else {
            break;
        };
        blocks.push(&xml[body_start..body_start + close_rel]);
        from = body_start + close_rel + close.len();
    }

    blocks
}

/// Returns the text content of the first `<tag>` element in a block
///
/// Strips a CDATA wrapper, unescapes entities and trims. Self-closing and
/// empty elements resolve to `None` so callers can chain fallbacks.
fn element_text(block: &str, tag: &str) -> Option<String> {
    let open = format!("<{}", tag);
    let close = format!("</{}>", tag);
    let mut from = 0;

    while let Some(rel) = block[from..].find(&open) {
        let start = from + rel;
        let after = start + open.len();
        if !tag_name_ends_at(block, after) {
            from = after;
            continue;
        }
        let open_end = after + block[after..].find('>')?;
        if block.as_bytes()[open_end - 1] == b'/' {
            // self-closing element carries no text
            from = open_end + 1;
            continue;
        }
        let body_start = open_end + 1;
        let close_rel = block[body_start..].find(&close)?;
        let raw = &block[body_start..body_start + close_rel];
        let text = unescape(strip_cdata(raw)).trim().to_string();
        return if text.is_empty() { None } else { Some(text) };
    }

    None
}

/// True when the byte at `pos` terminates a tag name (or is missing)
fn tag_name_ends_at(xml: &str, pos: usize) -> bool {
    matches!(
        xml.as_bytes().get(pos),
        Some(b'>') | Some(b' ') | Some(b'\t') | Some(b'\r') | Some(b'\n') | Some(b'/')
    )
}

/// Resolves the permalink of an Atom entry
///
/// Prefers a `<link>` with `rel="alternate"` (or no `rel` at all), falling
/// back to the first `<link href>` of any kind.
fn atom_link(block: &str) -> Option<String> {
    let mut fallback = None;
    let mut from = 0;

    while let Some(rel_pos) = block[from..].find("<link") {
        let start = from + rel_pos;
        let after = start + "<link".len();
        if !tag_name_ends_at(block, after) {
            from = after;
            continue;
        }
        let Some(end_rel) = block[start..].find('>') else {
            break;
        };
        let tag = &block[start..=start + end_rel];
        if let Some(href) = attr_value(tag, "href") {
            match attr_value(tag, "rel").as_deref() {
                None | Some("alternate") => return Some(href),
                _ => fallback.get_or_insert(href),
            };
        }
        from = start + end_rel + 1;
    }

    fallback
}

/// Returns the full text of the first `<name ...>` tag in a block
fn first_tag<'a>(block: &'a str, name: &str) -> Option<&'a str> {
    let open = format!("<{}", name);
    let mut from = 0;

    while let Some(rel) = block[from..].find(&open) {
        let start = from + rel;
        let after = start + open.len();
        if !tag_name_ends_at(block, after) {
            from = after;
            continue;
        }
        let end = start + block[start..].find('>')?;
        return Some(&block[start..=end]);
    }

    None
}

/// Extracts a quoted attribute value from a single tag's text
fn attr_value(tag: &str, name: &str) -> Option<String> {
    let needle = format!("{}=", name);
    let mut from = 0;

    while let Some(rel) = tag[from..].find(&needle) {
        let start = from + rel;
        let rest = &tag[start + needle.len()..];
        let preceded_ok = start > 0 && tag.as_bytes()[start - 1].is_ascii_whitespace();
        if preceded_ok {
            if let Some(quote @ ('"' | '\'')) = rest.chars().next() {
                if let Some(end) = rest[1..].find(quote) {
                    return Some(unescape(&rest[1..1 + end]));
                }
            }
        }
        from = start + needle.len();
    }

    None
}

/// Finds an explicit preview image in media markup
///
/// Checks `<media:thumbnail url>` first, then an `<enclosure>` whose type
/// is an image.
fn media_url(block: &str) -> Option<String> {
    if let Some(tag) = first_tag(block, "media:thumbnail") {
        if let Some(url) = attr_value(tag, "url") {
            return Some(url);
        }
    }
    if let Some(tag) = first_tag(block, "enclosure") {
        let is_image = attr_value(tag, "type")
            .map(|t| t.starts_with("image/"))
            .unwrap_or(false);
        if is_image {
            if let Some(url) = attr_value(tag, "url") {
                return Some(url);
            }
        }
    }
    None
}

/// Removes a `<![CDATA[...]]>` wrapper if present
fn strip_cdata(raw: &str) -> &str {
    let trimmed = raw.trim();
    trimmed
        .strip_prefix("<![CDATA[")
        .and_then(|rest| rest.strip_suffix("]]>"))
        .unwrap_or(trimmed)
}

/// Replaces the predefined XML entities and numeric character references
fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        let Some(semi) = tail.find(';') else {
            out.push_str(tail);
            return out;
        };
        let entity = &tail[1..semi];
        let replacement = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            _ => entity.strip_prefix('#').and_then(|digits| {
                let code = match digits.strip_prefix('x').or_else(|| digits.strip_prefix('X')) {
                    Some(hex) => u32::from_str_radix(hex, 16).ok(),
                    None => digits.parse().ok(),
                };
                code.and_then(char::from_u32)
            }),
        };
        match replacement {
            Some(ch) => {
                out.push(ch);
                rest = &tail[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }

    out.push_str(rest);
    out
}

/// Parses RFC 2822 (RSS) and RFC 3339 (Atom, dc:date) timestamps
fn parse_date(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(text)
        .or_else(|_| DateTime::parse_from_rfc3339(text))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const RSS_FIXTURE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:media="http://search.yahoo.com/mrss/">
  <channel>
    <title>てすとブログ</title>
    <item>
      <title><![CDATA[一件目の記事]]></title>
      <link>https://blog.example.com/entry/1</link>
      <pubDate>Fri, 10 Jan 2025 12:00:00 +0900</pubDate>
      <description>&lt;p&gt;本文の&quot;抜粋&quot;です&lt;/p&gt;&lt;img src="http://cdn.example.com/1.png"&gt;</description>
    </item>
    <item>
      <title>二件目の記事</title>
      <link>https://blog.example.com/entry/2</link>
      <pubDate>Thu, 09 Jan 2025 09:30:00 +0900</pubDate>
      <media:thumbnail url="http://cdn.example.com/thumb2.jpg"/>
    </item>
    <item>
      <title>リンクなし</title>
      <pubDate>Wed, 08 Jan 2025 09:30:00 +0900</pubDate>
    </item>
    <item>
      <title>日付が壊れている</title>
      <link>https://blog.example.com/entry/4</link>
      <pubDate>someday</pubDate>
    </item>
  </channel>
</rss>"#;

    const ATOM_FIXTURE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>zenn articles</title>
  <entry>
    <title>Rustの記事</title>
    <link rel="enclosure" href="https://example.com/ignored"/>
    <link rel="alternate" type="text/html" href="https://zenn.dev/someone/articles/abc123"/>
    <published>2025-01-10T03:00:00Z</published>
    <summary>記事のまとめ</summary>
  </entry>
  <entry>
    <title>更新日しかない</title>
    <link href="https://zenn.dev/someone/articles/def456"/>
    <updated>2025-01-09T03:00:00+09:00</updated>
  </entry>
</feed>"#;

    const RDF_FIXTURE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rdf:RDF xmlns="http://purl.org/rss/1.0/" xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#" xmlns:dc="http://purl.org/dc/elements/1.1/">
  <item rdf:about="https://b.hatena.ne.jp/x/1">
    <title>ブックマークした記事</title>
    <link>https://news.example.com/article</link>
    <description>あとで読む</description>
    <dc:date>2025-01-10T12:34:56+09:00</dc:date>
  </item>
</rdf:RDF>"#;

    #[test]
    fn test_parse_rss_extracts_items_and_skips_broken_ones() {
        let items = parse_feed(RSS_FIXTURE);
        // the link-less and unparsable-date items are dropped
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title, "一件目の記事");
        assert_eq!(items[0].link, "https://blog.example.com/entry/1");
        assert_eq!(
            items[0].date,
            Utc.with_ymd_and_hms(2025, 1, 10, 3, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_parse_rss_unescapes_description_and_finds_embedded_img() {
        let items = parse_feed(RSS_FIXTURE);
        assert!(items[0].description.contains("<p>本文の\"抜粋\"です</p>"));
        assert_eq!(
            items[0].thumbnail,
            Some("https://cdn.example.com/1.png".to_string())
        );
    }

    #[test]
    fn test_parse_rss_prefers_media_thumbnail_and_rewrites_scheme() {
        let items = parse_feed(RSS_FIXTURE);
        assert_eq!(
            items[1].thumbnail,
            Some("https://cdn.example.com/thumb2.jpg".to_string())
        );
        assert_eq!(items[1].description, "");
    }

    #[test]
    fn test_parse_atom_picks_alternate_link_and_published_date() {
        let items = parse_feed(ATOM_FIXTURE);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].link, "https://zenn.dev/someone/articles/abc123");
        assert_eq!(
            items[0].date,
            Utc.with_ymd_and_hms(2025, 1, 10, 3, 0, 0).unwrap()
        );
        assert_eq!(items[0].description, "記事のまとめ");
    }

    #[test]
    fn test_parse_atom_falls_back_to_updated_and_bare_link() {
        let items = parse_feed(ATOM_FIXTURE);
        assert_eq!(items[1].link, "https://zenn.dev/someone/articles/def456");
        assert_eq!(
            items[1].date,
            Utc.with_ymd_and_hms(2025, 1, 8, 18, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_parse_rdf_uses_dc_date() {
        let items = parse_feed(RDF_FIXTURE);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].link, "https://news.example.com/article");
        assert_eq!(
            items[0].date,
            Utc.with_ymd_and_hms(2025, 1, 10, 3, 34, 56).unwrap()
        );
        assert_eq!(items[0].description, "あとで読む");
    }

    #[test]
    fn test_parse_feed_tolerates_garbage() {
        assert!(parse_feed("").is_empty());
        assert!(parse_feed("not xml at all").is_empty());
        assert!(parse_feed("<rss><channel><item><title>truncated").is_empty());
    }

    #[test]
    fn test_unescape_numeric_references() {
        assert_eq!(unescape("&#38;&#x26; ok"), "&& ok");
        assert_eq!(unescape("a &unknown; b"), "a &unknown; b");
        assert_eq!(unescape("no entities"), "no entities");
    }

    #[test]
    fn test_element_blocks_ignores_longer_tag_names() {
        let xml = "<items><item>a</item></items>";
        assert_eq!(element_blocks(xml, "item"), vec!["a"]);
    }
}
