//! Web page fetching and readable text extraction for URL ingestion.

use async_trait::async_trait;
use reqwest::{Client, header, redirect::Policy};
use scraper::{ElementRef, Html, Selector};
use tracing::debug;
use url::Url;

use crate::config::FetcherConfig;
use crate::error::FetchError;
use crate::url_safety;

/// Maximum redirect hops before giving up
const MAX_REDIRECTS: usize = 5;

/// Elements whose text is never part of the readable content
const SKIPPED_ELEMENTS: &[&str] = &[
    "script", "style", "noscript", "template", "nav", "footer", "header", "aside", "svg",
];

/// Readable content of a fetched page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchedPage {
    pub title: Option<String>,
    pub text: String,
    pub description: Option<String>,
    pub author: Option<String>,
    pub published_at: Option<String>,
}

#[async_trait]
pub trait ContentFetcher: Send + Sync {
    /// Fetch `url` and extract its readable text
    async fn fetch(&self, url: &Url) -> Result<FetchedPage, FetchError>;
}

/// Fetcher backed by reqwest, parsing HTML with scraper
pub struct HttpContentFetcher {
    client: Client,
    max_bytes: u64,
}

impl HttpContentFetcher {
    pub fn new(config: &FetcherConfig) -> Result<Self, FetchError> {
        // Redirect targets go through the same address checks as submitted URLs
        let redirect_policy = Policy::custom(|attempt| {
            if attempt.previous().len() >= MAX_REDIRECTS {
                attempt.error("too many redirects")
            } else if url_safety::validate(attempt.url().as_str()).is_err() {
                attempt.stop()
            } else {
                attempt.follow()
            }
        });

        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.timeout())
            .redirect(redirect_policy)
            .build()
            .map_err(|e| FetchError::Request {
                url: String::new(),
                source: e,
            })?;

        Ok(Self {
            client,
            max_bytes: config.max_bytes,
        })
    }
}

#[async_trait]
impl ContentFetcher for HttpContentFetcher {
    async fn fetch(&self, url: &Url) -> Result<FetchedPage, FetchError> {
        let url_str = url.to_string();
        let request_err = |source| FetchError::Request {
            url: url.to_string(),
            source,
        };

        let mut response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(request_err)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url_str,
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("text/html")
            .to_ascii_lowercase();
        let kind = PageKind::from_content_type(&content_type).ok_or_else(|| {
            FetchError::UnsupportedContentType {
                url: url_str.clone(),
                content_type: content_type.clone(),
            }
        })?;

        if response.content_length().is_some_and(|len| len > self.max_bytes) {
            return Err(FetchError::TooLarge {
                url: url_str,
                max: self.max_bytes,
            });
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(request_err)? {
            if body.len() as u64 + chunk.len() as u64 > self.max_bytes {
                return Err(FetchError::TooLarge {
                    url: url_str,
                    max: self.max_bytes,
                });
            }
            body.extend_from_slice(&chunk);
        }
        let body = String::from_utf8_lossy(&body);

        let page = match kind {
            PageKind::Html => extract_page(&body),
            PageKind::PlainText => FetchedPage {
                text: body.trim().to_string(),
                ..FetchedPage::default()
            },
        };

        if page.text.is_empty() {
            return Err(FetchError::NoContent { url: url_str });
        }

        debug!(url = %url, bytes = body.len(), "Fetched page");
        Ok(page)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PageKind {
    Html,
    PlainText,
}

impl PageKind {
    fn from_content_type(content_type: &str) -> Option<Self> {
        let mime = content_type.split(';').next().unwrap_or_default().trim();
        match mime {
            "text/html" | "application/xhtml+xml" => Some(Self::Html),
            "text/plain" | "text/markdown" => Some(Self::PlainText),
            _ => None,
        }
    }
}

/// Extract title, metadata, and visible text from an HTML document
pub fn extract_page(html: &str) -> FetchedPage {
    let document = Html::parse_document(html);

    let title = meta_content(&document, "meta[property='og:title']")
        .or_else(|| first_text(&document, "title"));

    FetchedPage {
        title,
        text: extract_text(&document),
        description: meta_content(&document, "meta[name='description']")
            .or_else(|| meta_content(&document, "meta[property='og:description']")),
        author: meta_content(&document, "meta[name='author']"),
        published_at: meta_content(&document, "meta[property='article:published_time']"),
    }
}

fn first_text(document: &Html, selector: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    document
        .select(&selector)
        .next()
        .map(|element| collapse_whitespace(&element.text().collect::<String>()))
        .filter(|s| !s.is_empty())
}

fn meta_content(document: &Html, selector: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    document
        .select(&selector)
        .filter_map(|element| element.value().attr("content"))
        .map(collapse_whitespace)
        .find(|s| !s.is_empty())
}

/// Text of the main content region, preferring `article`, then `main`, then `body`
fn extract_text(document: &Html) -> String {
    let root = ["article", "main", "body"]
        .iter()
        .filter_map(|name| Selector::parse(name).ok())
        .find_map(|selector| document.select(&selector).next());

    let Some(root) = root else {
        return String::new();
    };

    let mut text = String::new();
    for node in root.descendants() {
        let Some(fragment) = node.value().as_text() else {
            continue;
        };
        let skipped = node.ancestors().any(|ancestor| {
            ElementRef::wrap(ancestor)
                .is_some_and(|element| SKIPPED_ELEMENTS.contains(&element.value().name()))
        });
        if !skipped {
            text.push_str(fragment);
            text.push(' ');
        }
    }

    collapse_whitespace(&text)
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
