//! Concurrent page fetcher for fertilizer product context.
//!
//! Pages are fetched in parallel and reduced to visible text. Failures are
//! reported per URL as `"Error: ..."` strings so one bad source never sinks
//! the batch.

use futures::future::join_all;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct PageScraper {
    client: reqwest::Client,
}

impl PageScraper {
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("kisan-sarthi/", env!("CARGO_PKG_VERSION")))
            .build()
            .expect("Failed to build HTTP client");
        Self { client }
    }

    /// Fetch every URL concurrently. The map has one entry per distinct URL.
    pub async fn fetch_all(&self, urls: &[String]) -> BTreeMap<String, String> {
        let fetches = urls.iter().map(|url| async move {
            let text = match self.fetch_text(url).await {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!("Scrape of {} failed: {}", url, e);
                    format!("Error: {}", e)
                }
            };
            (url.clone(), text)
        });
        join_all(fetches).await.into_iter().collect()
    }

    async fn fetch_text(&self, url: &str) -> Result<String, String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| e.without_url().to_string())?;
        if !response.status().is_success() {
            return Err(format!("HTTP {}", response.status()));
        }
        let body = response.text().await.map_err(|e| e.without_url().to_string())?;
        Ok(html_to_text(&body))
    }
}

/// Elements whose content HTML treats as raw text, so it may hold a bare `<`.
const RAW_TEXT_ELEMENTS: [&str; 2] = ["script", "style"];

/// Byte offset and name of the next raw-text open tag at or after `from`.
/// `lower` is the ASCII-lowercased document.
fn next_raw_text_open(lower: &str, from: usize) -> Option<(usize, &'static str)> {
    lower[from..].match_indices('<').find_map(|(i, _)| {
        let at = from + i;
        let rest = &lower.as_bytes()[at + 1..];
        RAW_TEXT_ELEMENTS.iter().copied().find_map(|name| {
            let after = rest.strip_prefix(name.as_bytes())?;
            match after.first() {
                None | Some(b'>') | Some(b'/') => Some((at, name)),
                Some(b) if b.is_ascii_whitespace() => Some((at, name)),
                _ => None,
            }
        })
    })
}

/// `html` with every script and style element cut out, tags included. An
/// element that is never closed runs to the end of the document.
fn strip_raw_text_elements(html: &str) -> String {
    // ASCII lowercasing keeps byte offsets, so positions in `lower` index `html`.
    let lower = html.to_ascii_lowercase();
    let mut out = String::with_capacity(html.len());
    let mut pos = 0;

    while let Some((open, name)) = next_raw_text_open(&lower, pos) {
        out.push_str(&html[pos..open]);
        let body = open + 1 + name.len();
        let close = format!("</{}", name);
        pos = lower[body..]
            .find(&close)
            .and_then(|i| lower[body + i..].find('>').map(|j| body + i + j + 1))
            .unwrap_or(html.len());
        out.push('\n');
    }
    out.push_str(&html[pos..]);
    out
}

/// Visible text of an HTML document, one text node per line.
///
/// Script and style bodies are cut out before parsing. The rest goes through
/// an XML reader with end-name checks off, which still stops at the first hard
/// syntax error (a bare `<` in body text, for one) and keeps what it collected
/// up to that point.
pub fn html_to_text(html: &str) -> String {
    let visible = strip_raw_text_elements(html);
    let mut reader = Reader::from_str(&visible);
    let config = reader.config_mut();
    config.trim_text(true);
    config.check_end_names = false;
    config.allow_unmatched_ends = true;

    let mut lines: Vec<String> = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Text(t)) => {
                let text = match t.unescape() {
                    Ok(s) => s.into_owned(),
                    Err(_) => String::from_utf8_lossy(&t).into_owned(),
                };
                let text = text.trim();
                if !text.is_empty() {
                    lines.push(text.to_string());
                }
            }
            Ok(Event::CData(c)) => {
                let text = String::from_utf8_lossy(&c).trim().to_string();
                if !text.is_empty() {
                    lines.push(text);
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(
                    "HTML text extraction stopped at byte {}: {}",
                    reader.buffer_position(),
                    e
                );
                break;
            }
        }
    }

    lines.join("\n")
}

/// First `max_chars` characters of `text`.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_html_to_text_skips_script_and_style() {
        let html = r#"<html><head><title>Urea 45kg</title>
            <style>.price { color: red; }</style></head>
            <body><h1>IFFCO Urea</h1><script>var x = 1;</script>
            <p>Price: &amp; Rs 266</p></body></html>"#;
        assert_eq!(html_to_text(html), "Urea 45kg\nIFFCO Urea\nPrice: & Rs 266");
    }

    #[test]
    fn test_html_to_text_tolerates_void_and_unclosed_tags() {
        let html = "<div>Line one<br>Line two<p>Para</div>";
        assert_eq!(html_to_text(html), "Line one\nLine two\nPara");
    }

    #[test]
    fn test_html_to_text_keeps_unknown_entities_raw() {
        assert_eq!(html_to_text("<p>50&nbsp;kg</p>"), "50&nbsp;kg");
    }

    #[test]
    fn test_html_to_text_survives_inline_script_and_unquoted_attributes() {
        let html = r#"<p>Before</p><SCRIPT type=text/javascript>if (a < b && c > d) { x = "</div>"; }</script >
            <p>After</p><a href=/buy?x=1&y=2>Buy now</a>"#;
        assert_eq!(html_to_text(html), "Before\nAfter\nBuy now");
    }

    #[test]
    fn test_unclosed_script_hides_the_rest() {
        assert_eq!(html_to_text("<p>Urea</p><script>let a = 1 < 2;"), "Urea");
    }

    #[test]
    fn test_strip_leaves_lookalike_tags() {
        let html = "<scripture>Psalm</scripture><styles>x</styles>";
        assert_eq!(strip_raw_text_elements(html), html);
    }

    #[test]
    fn test_truncate_chars_is_char_safe() {
        assert_eq!(truncate_chars("खाद उर्वरक", 3), "खाद");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }

    #[tokio::test]
    async fn test_fetch_all_reports_per_url_results() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/urea"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string("<html><body><p>Urea in stock</p></body></html>"),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let ok = format!("{}/urea", server.uri());
        let gone = format!("{}/gone", server.uri());
        let scraper = PageScraper::new(Duration::from_secs(5));
        let pages = scraper.fetch_all(&[ok.clone(), gone.clone(), ok.clone()]).await;

        assert_eq!(pages.len(), 2);
        assert_eq!(pages[&ok], "Urea in stock");
        assert!(pages[&gone].starts_with("Error: HTTP 404"));
    }

    #[test]
    fn test_fetch_all_empty_list() {
        let scraper = PageScraper::new(Duration::from_secs(1));
        let pages = tokio_test::block_on(scraper.fetch_all(&[]));
        assert!(pages.is_empty());
    }
}
