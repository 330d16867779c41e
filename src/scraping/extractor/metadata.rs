//! Page metadata: JSON-LD, OpenGraph, meta tags, then DOM fallbacks

use chrono::{DateTime, Utc};
use scraper::{Html, Selector};
use std::collections::HashMap;
use url::Url;

use super::types::{ContentType, PageMetadata};
use super::ContentExtractor;

impl ContentExtractor {
    /// Gather writer metadata from a raw page
    pub fn extract_metadata(&self, html: &str, url: &Url) -> PageMetadata {
        let document = Html::parse_document(html);

        let json_ld = self.extract_json_ld(&document);
        let og = self.extract_opengraph(&document);
        let meta = self.extract_meta_tags(&document);

        let title = json_ld
            .get("headline")
            .or_else(|| json_ld.get("name"))
            .or_else(|| og.get("title"))
            .or_else(|| meta.get("title"))
            .cloned()
            .unwrap_or_else(|| self.extract_title(&document));

        let description = json_ld
            .get("description")
            .or_else(|| og.get("description"))
            .or_else(|| meta.get("description"))
            .cloned();

        let author = json_ld
            .get("author")
            .or_else(|| meta.get("author"))
            .cloned()
            .or_else(|| self.extract_author(&document));

        let published_date = json_ld
            .get("datePublished")
            .and_then(|d| parse_date(d))
            .or_else(|| self.extract_date(&document));

        let modified_date = json_ld
            .get("dateModified")
            .and_then(|d| parse_date(d))
            .or_else(|| {
                self.get_meta_content(&document, "article:modified_time")
                    .and_then(|d| parse_date(&d))
            });

        let language = self
            .extract_language(&document)
            .or_else(|| meta.get("language").cloned());

        let site_name = og.get("site_name").cloned().or_else(|| {
            json_ld
                .get("publisher")
                .filter(|p| !p.is_empty())
                .cloned()
        });

        let content_type = json_ld
            .get("@type")
            .map(|t| ContentType::from_schema_type(t))
            .unwrap_or_default();

        PageMetadata {
            url: url.to_string(),
            canonical_url: self.extract_canonical(&document),
            title,
            description,
            author,
            published_date,
            modified_date,
            language,
            site_name,
            content_type,
            domain: url.host_str().unwrap_or_default().to_string(),
        }
    }

    pub(crate) fn extract_title(&self, document: &Html) -> String {
        if let Some(og_title) = self.get_meta_content(document, "og:title") {
            return og_title;
        }

        for tag in ["title", "h1"] {
            if let Ok(selector) = Selector::parse(tag) {
                if let Some(elem) = document.select(&selector).next() {
                    let title = elem.text().collect::<String>().trim().to_string();
                    if !title.is_empty() {
                        return title;
                    }
                }
            }
        }

        "Untitled".to_string()
    }

    pub(crate) fn extract_author(&self, document: &Html) -> Option<String> {
        if let Some(author) = self.get_meta_content(document, "author") {
            return Some(author);
        }

        for pattern in &["[itemprop='author']", ".author", ".byline", "[rel='author']"] {
            if let Ok(selector) = Selector::parse(pattern) {
                if let Some(elem) = document.select(&selector).next() {
                    let text = elem.text().collect::<String>().trim().to_string();
                    if !text.is_empty() && text.len() < 100 {
                        return Some(text);
                    }
                }
            }
        }

        None
    }

    pub(crate) fn extract_date(&self, document: &Html) -> Option<DateTime<Utc>> {
        if let Ok(selector) = Selector::parse("time[datetime]") {
            if let Some(elem) = document.select(&selector).next() {
                if let Some(dt) = elem.value().attr("datetime").and_then(parse_date) {
                    return Some(dt);
                }
            }
        }

        for name in &["article:published_time", "date", "DC.date", "datePublished"] {
            if let Some(dt) = self
                .get_meta_content(document, name)
                .and_then(|d| parse_date(&d))
            {
                return Some(dt);
            }
        }

        None
    }

    fn extract_language(&self, document: &Html) -> Option<String> {
        if let Ok(selector) = Selector::parse("html") {
            if let Some(lang) = document
                .select(&selector)
                .next()
                .and_then(|el| el.value().attr("lang"))
                .filter(|l| !l.trim().is_empty())
            {
                return Some(lang.trim().to_string());
            }
        }

        self.get_meta_content(document, "og:locale")
    }

    fn extract_canonical(&self, document: &Html) -> Option<String> {
        if let Ok(selector) = Selector::parse("link[rel='canonical']") {
            if let Some(elem) = document.select(&selector).next() {
                return elem.value().attr("href").map(|s| s.to_string());
            }
        }
        self.get_meta_content(document, "og:url")
    }

    /// Meta content by `name` or `property`, using pre-compiled selectors when available
    pub(crate) fn get_meta_content(&self, document: &Html, name: &str) -> Option<String> {
        let first_content = |selector: &Selector| {
            document
                .select(selector)
                .filter_map(|elem| elem.value().attr("content"))
                .map(str::trim)
                .find(|c| !c.is_empty())
                .map(str::to_string)
        };

        if let Some((name_sel, prop_sel)) = self.meta_selectors.get(name) {
            return name_sel
                .as_ref()
                .and_then(first_content)
                .or_else(|| prop_sel.as_ref().and_then(first_content));
        }

        let by_name = Selector::parse(&format!("meta[name='{}']", name)).ok();
        let by_prop = Selector::parse(&format!("meta[property='{}']", name)).ok();
        by_name
            .as_ref()
            .and_then(first_content)
            .or_else(|| by_prop.as_ref().and_then(first_content))
    }

    /// Flattened JSON-LD key/value pairs, first occurrence wins
    pub(crate) fn extract_json_ld(&self, document: &Html) -> HashMap<String, String> {
        let mut data = HashMap::new();

        if let Ok(selector) = Selector::parse("script[type='application/ld+json']") {
            for script in document.select(&selector) {
                let json_text = script.text().collect::<String>();
                if let Ok(value) = serde_json::from_str::<serde_json::Value>(&json_text) {
                    flatten_json_ld(&value, &mut data);
                }
            }
        }

        data
    }

    fn extract_opengraph(&self, document: &Html) -> HashMap<String, String> {
        let mut data = HashMap::new();
        for prop in &["title", "description", "type", "url", "site_name", "locale"] {
            if let Some(value) = self.get_meta_content(document, &format!("og:{}", prop)) {
                data.insert(prop.to_string(), value);
            }
        }
        data
    }

    fn extract_meta_tags(&self, document: &Html) -> HashMap<String, String> {
        let mut data = HashMap::new();
        for name in &["title", "description", "author", "date", "language"] {
            if let Some(value) = self.get_meta_content(document, name) {
                data.insert(name.to_string(), value);
            }
        }
        data
    }
}

fn flatten_json_ld(value: &serde_json::Value, data: &mut HashMap<String, String>) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, val) in map {
                match val {
                    serde_json::Value::String(s) => {
                        data.entry(key.clone()).or_insert_with(|| s.clone());
                    }
                    serde_json::Value::Object(nested) => {
                        // author / publisher objects carry a name
                        if let Some(name) = nested.get("name").and_then(|n| n.as_str()) {
                            data.entry(key.clone()).or_insert_with(|| name.to_string());
                        }
                    }
                    serde_json::Value::Array(arr) => {
                        if key == "@type" {
                            if let Some(first) = arr.iter().find_map(|t| t.as_str()) {
                                data.entry(key.clone()).or_insert_with(|| first.to_string());
                            }
                            continue;
                        }
                        for item in arr {
                            if let Some(s) = item.as_str() {
                                data.entry(key.clone()).or_insert_with(|| s.to_string());
                            } else {
                                flatten_json_ld(item, data);
                            }
                        }
                    }
                    _ => {}
                }
            }
        }
        serde_json::Value::Array(arr) => {
            for item in arr {
                flatten_json_ld(item, data);
            }
        }
        _ => {}
    }
}

/// JSON-LD `@type` values found on the page, in document order
pub fn json_ld_types(document: &Html) -> Vec<String> {
    let mut types = Vec::new();
    if let Ok(selector) = Selector::parse("script[type='application/ld+json']") {
        for script in document.select(&selector) {
            let json_text = script.text().collect::<String>();
            if let Ok(value) = serde_json::from_str::<serde_json::Value>(&json_text) {
                collect_types(&value, &mut types);
            }
        }
    }
    types
}

fn collect_types(value: &serde_json::Value, out: &mut Vec<String>) {
    match value {
        serde_json::Value::Object(map) => {
            match map.get("@type") {
                Some(serde_json::Value::String(t)) => out.push(t.clone()),
                Some(serde_json::Value::Array(arr)) => {
                    out.extend(arr.iter().filter_map(|t| t.as_str()).map(str::to_string))
                }
                _ => {}
            }
            if let Some(graph) = map.get("@graph") {
                collect_types(graph, out);
            }
        }
        serde_json::Value::Array(arr) => {
            for item in arr {
                collect_types(item, out);
            }
        }
        _ => {}
    }
}

/// Parse the date formats commonly seen in meta tags and JSON-LD
pub fn parse_date(date_str: &str) -> Option<DateTime<Utc>> {
    let date_str = date_str.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(date_str) {
        return Some(dt.with_timezone(&Utc));
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(date_str) {
        return Some(dt.with_timezone(&Utc));
    }

    let formats = [
        "%Y-%m-%d",
        "%Y/%m/%d",
        "%d-%m-%Y",
        "%d/%m/%Y",
        "%B %d, %Y",
        "%b %d, %Y",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M:%SZ",
    ];

    for format in &formats {
        if let Ok(naive) = chrono::NaiveDate::parse_from_str(date_str, format) {
            if let Some(naive_dt) = naive.and_hms_opt(0, 0, 0) {
                return Some(DateTime::from_naive_utc_and_offset(naive_dt, Utc));
            }
        }
        if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(date_str, format) {
            return Some(DateTime::from_naive_utc_and_offset(naive, Utc));
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_chain() {
        let html = r#"
            <html lang="en">
            <head>
                <title>Tag Title</title>
                <meta property="og:title" content="OG Title">
                <meta property="og:description" content="OG Description">
                <meta property="og:site_name" content="Example Blog">
                <meta name="author" content="Jane Roe">
                <meta property="article:published_time" content="2024-01-15T10:00:00Z">
            </head>
            <body><article><p>Body</p></article></body>
            </html>
        "#;

        let extractor = ContentExtractor::default();
        let url = Url::parse("https://example.com/article").unwrap();
        let metadata = extractor.extract_metadata(html, &url);

        assert_eq!(metadata.title, "OG Title");
        assert_eq!(metadata.description.as_deref(), Some("OG Description"));
        assert_eq!(metadata.author.as_deref(), Some("Jane Roe"));
        assert_eq!(metadata.site_name.as_deref(), Some("Example Blog"));
        assert_eq!(metadata.language.as_deref(), Some("en"));
        assert_eq!(metadata.domain, "example.com");
        assert!(metadata.published_date.is_some());
    }

    #[test]
    fn test_json_ld_wins() {
        let html = r#"<html><head>
            <meta property="og:title" content="OG Title">
            <script type="application/ld+json">
            {"@context":"https://schema.org","@type":"BlogPosting","headline":"LD Headline",
             "author":{"@type":"Person","name":"Ada"},"datePublished":"2024-03-01"}
            </script></head><body></body></html>"#;

        let extractor = ContentExtractor::default();
        let url = Url::parse("https://example.com/blog/2024/03/post").unwrap();
        let metadata = extractor.extract_metadata(html, &url);

        assert_eq!(metadata.title, "LD Headline");
        assert_eq!(metadata.author.as_deref(), Some("Ada"));
        assert_eq!(metadata.content_type, ContentType::Article);
        assert!(metadata.published_date.is_some());
    }

    #[test]
    fn test_json_ld_types_in_graph() {
        let html = r#"<html><head><script type="application/ld+json">
            {"@graph":[{"@type":"WebSite"},{"@type":["NewsArticle","Thing"]}]}
            </script></head></html>"#;
        let types = json_ld_types(&Html::parse_document(html));
        assert_eq!(types, vec!["WebSite", "NewsArticle", "Thing"]);
    }

    #[test]
    fn test_parse_date() {
        assert!(parse_date("2024-01-15").is_some());
        assert!(parse_date("2024-01-15T10:00:00Z").is_some());
        assert!(parse_date("January 15, 2024").is_some());
        assert!(parse_date("not a date").is_none());
    }
}
