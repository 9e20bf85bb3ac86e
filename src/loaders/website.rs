use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use rand::seq::SliceRandom;
use reqwest::header::USER_AGENT;
use reqwest::Client;
use scraper::Html;

use super::Document;
use crate::config::RetryConfig;
use crate::error::LoadError;

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14.4; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:124.0) Gecko/20100101 Firefox/124.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_4_1) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4.1 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36 Edg/124.0.2478.67",
];

const SKIPPED_ELEMENTS: &[&str] = &["script", "style", "noscript", "template"];

/// Fetches a page and returns its readable text.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_text(&self, url: &str, user_agent: &str) -> Result<String>;
}

#[derive(Clone)]
pub struct HttpPageFetcher {
    client: Client,
}

impl HttpPageFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build website http client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch_text(&self, url: &str, user_agent: &str) -> Result<String> {
        let body = self
            .client
            .get(url)
            .header(USER_AGENT, user_agent)
            .send()
            .await
            .with_context(|| format!("failed to request {url}"))?
            .error_for_status()
            .with_context(|| format!("{url} returned non-success status"))?
            .text()
            .await
            .with_context(|| format!("failed to read body of {url}"))?;

        Ok(extract_readable_text(&body))
    }
}

#[derive(Clone)]
pub struct WebsiteLoader {
    fetcher: Arc<dyn PageFetcher>,
    retry: RetryConfig,
}

impl WebsiteLoader {
    pub fn new(fetcher: Arc<dyn PageFetcher>, retry: RetryConfig) -> Self {
        Self { fetcher, retry }
    }

    /// Tries the page up to `max_attempts` times with a fixed delay after each
    /// failed attempt. An empty page counts as a failure.
    pub async fn load(&self, raw_url: &str) -> Result<Document, LoadError> {
        let url = normalize_url(raw_url);
        let max_attempts = self.retry.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            let user_agent = random_user_agent();
            match self.fetcher.fetch_text(&url, user_agent).await {
                Ok(text) => {
                    let document = Document::from_fragments([text]);
                    if !document.is_empty() {
                        return Ok(document);
                    }
                    tracing::warn!(
                        "website {} returned no text (attempt {}/{})",
                        url,
                        attempt,
                        max_attempts
                    );
                }
                Err(err) => {
                    tracing::warn!(
                        "failed to load website {} (attempt {}/{}): {:#}",
                        url,
                        attempt,
                        max_attempts,
                        err
                    );
                }
            }

            if attempt < max_attempts {
                tokio::time::sleep(self.retry.delay).await;
            }
        }

        Err(LoadError::WebsiteUnavailable {
            attempts: max_attempts,
        })
    }
}

pub fn normalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    let lower = trimmed.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    }
}

fn random_user_agent() -> &'static str {
    USER_AGENTS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(USER_AGENTS[0])
}

/// Visible text of an HTML page, one line per text fragment.
pub fn extract_readable_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut lines = Vec::new();

    for node in document.root_element().descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };

        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .map(|element| SKIPPED_ELEMENTS.contains(&element.name()))
                .unwrap_or(false)
        });
        if hidden {
            continue;
        }

        let line = text
            .replace('\u{00A0}', " ")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        if !line.is_empty() {
            lines.push(line);
        }
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct ScriptedFetcher {
        responses: Mutex<Vec<Result<String>>>,
        calls: Mutex<Vec<(String, String)>>,
    }

    impl ScriptedFetcher {
        fn new(responses: Vec<Result<String>>) -> Self {
            Self {
                responses: Mutex::new(responses),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<(String, String)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PageFetcher for ScriptedFetcher {
        async fn fetch_text(&self, url: &str, user_agent: &str) -> Result<String> {
            self.calls
                .lock()
                .unwrap()
                .push((url.to_string(), user_agent.to_string()));
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                anyhow::bail!("no scripted response left");
            }
            responses.remove(0)
        }
    }

    fn retry() -> RetryConfig {
        RetryConfig {
            max_attempts: 5,
            delay: Duration::from_secs(3),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_on_fifth_attempt_after_waiting() {
        let fetcher = Arc::new(ScriptedFetcher::new(vec![
            Err(anyhow::anyhow!("503 Service Unavailable")),
            Err(anyhow::anyhow!("connection reset")),
            Ok(String::new()),
            Err(anyhow::anyhow!("timeout")),
            Ok("Conteúdo do site".to_string()),
        ]));
        let loader = WebsiteLoader::new(fetcher.clone(), retry());

        let started = tokio::time::Instant::now();
        let document = loader.load("example.com").await.unwrap();

        assert_eq!(document.text(), "Conteúdo do site");
        assert_eq!(fetcher.calls().len(), 5);
        assert!(started.elapsed() >= Duration::from_secs(12));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let fetcher = Arc::new(ScriptedFetcher::new(
            (0..10).map(|_| Err(anyhow::anyhow!("403 Forbidden"))).collect(),
        ));
        let loader = WebsiteLoader::new(fetcher.clone(), retry());

        let err = loader.load("https://example.com").await.unwrap_err();

        assert!(matches!(err, LoadError::WebsiteUnavailable { attempts: 5 }));
        assert_eq!(fetcher.calls().len(), 5);
        assert_eq!(
            err.to_string(),
            "Não foi possível carregar o site após várias tentativas."
        );
    }

    #[tokio::test(start_paused = true)]
    async fn first_success_does_not_wait() {
        let fetcher = Arc::new(ScriptedFetcher::new(vec![Ok("ok".to_string())]));
        let loader = WebsiteLoader::new(fetcher.clone(), retry());

        let started = tokio::time::Instant::now();
        loader.load("example.com").await.unwrap();

        assert!(started.elapsed() < Duration::from_secs(3));
        assert_eq!(fetcher.calls().len(), 1);
    }

    #[tokio::test]
    async fn requests_https_and_sends_known_user_agent() {
        let fetcher = Arc::new(ScriptedFetcher::new(vec![Ok("texto".to_string())]));
        let loader = WebsiteLoader::new(fetcher.clone(), retry());

        loader.load("example.com").await.unwrap();

        let calls = fetcher.calls();
        assert_eq!(calls[0].0, "https://example.com");
        assert!(USER_AGENTS.contains(&calls[0].1.as_str()));
    }

    #[test]
    fn keeps_existing_scheme() {
        assert_eq!(normalize_url("http://example.com"), "http://example.com");
        assert_eq!(normalize_url(" HTTPS://example.com "), "HTTPS://example.com");
        assert_eq!(normalize_url("www.example.com/a"), "https://www.example.com/a");
    }

    #[test]
    fn extracts_visible_text_only() {
        let html = r#"
            <html>
              <head><title>Just a moment...</title><style>body { color: red }</style></head>
              <body>
                <h1>Bem-vindo</h1>
                <script>var hidden = 1;</script>
                <p>Preço:&nbsp;R$ 10</p>
                <noscript>Enable JavaScript</noscript>
              </body>
            </html>
        "#;

        let text = extract_readable_text(html);
        assert_eq!(text, "Just a moment...\nBem-vindo\nPreço: R$ 10");
    }
}
