// src/services/fetcher.rs

//! Report download with bounded retry.
//!
//! The publisher answers 404 until a slot's report exists, so a 404 ends the
//! attempt immediately. Anything else that is not a success is retried a
//! fixed number of times with a fixed pause in between.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::FetcherConfig;
use crate::utils::http::create_async_client;

/// Raw answer from the upstream source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

/// Anything that can answer a GET for a report URL.
#[async_trait]
pub trait ReportSource: Send + Sync {
    async fn get(&self, url: &str) -> Result<SourceResponse>;
}

/// [`ReportSource`] backed by a reqwest client.
#[derive(Debug, Clone)]
pub struct HttpReportSource {
    client: reqwest::Client,
}

impl HttpReportSource {
    pub fn new(config: &FetcherConfig) -> Result<Self> {
        Ok(Self {
            client: create_async_client(config)?,
        })
    }
}

#[async_trait]
impl ReportSource for HttpReportSource {
    async fn get(&self, url: &str) -> Result<SourceResponse> {
        let response = self.client.get(url).send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?.to_vec();
        Ok(SourceResponse { status, body })
    }
}

/// Result of one fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The report bytes
    Document(Vec<u8>),
    /// The publisher has not posted this slot yet
    NotPublished,
    /// Every attempt failed
    Unavailable { attempts: u32 },
}

/// Fetches report documents through a [`ReportSource`].
pub struct PdfFetcher<S> {
    source: S,
    max_attempts: u32,
    retry_delay: Duration,
}

impl PdfFetcher<HttpReportSource> {
    /// Build a fetcher that talks HTTP.
    pub fn from_config(config: &FetcherConfig) -> Result<Self> {
        Ok(Self::new(HttpReportSource::new(config)?, config))
    }
}

impl<S: ReportSource> PdfFetcher<S> {
    pub fn new(source: S, config: &FetcherConfig) -> Self {
        Self {
            source,
            max_attempts: config.max_attempts.max(1),
            retry_delay: config.retry_delay(),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub async fn fetch(&self, url: &str) -> FetchOutcome {
        for attempt in 1..=self.max_attempts {
            match self.source.get(url).await {
                Ok(response) if (200..300).contains(&response.status) => {
                    log::debug!("Fetched {} ({} bytes)", url, response.body.len());
                    return FetchOutcome::Document(response.body);
                }
                Ok(response) if response.status == 404 => {
                    log::warn!("Report not published yet: {}", url);
                    return FetchOutcome::NotPublished;
                }
                Ok(response) => {
                    log::warn!(
                        "Attempt {}/{} for {} returned HTTP {}",
                        attempt,
                        self.max_attempts,
                        url,
                        response.status
                    );
                }
                Err(e) => {
                    log::warn!(
                        "Attempt {}/{} for {} failed: {}",
                        attempt,
                        self.max_attempts,
                        url,
                        e
                    );
                }
            }

            if attempt < self.max_attempts {
                tokio::time::sleep(self.retry_delay).await;
            }
        }

        log::error!(
            "Report unavailable after {} attempts: {}",
            self.max_attempts,
            url
        );
        FetchOutcome::Unavailable {
            attempts: self.max_attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;
    use crate::error::AppError;

    /// Source that replays a fixed script of answers.
    struct ScriptedSource {
        script: Mutex<VecDeque<Result<SourceResponse>>>,
        calls: Mutex<u32>,
    }

    impl ScriptedSource {
        fn new(script: Vec<Result<SourceResponse>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl ReportSource for ScriptedSource {
        async fn get(&self, url: &str) -> Result<SourceResponse> {
            *self.calls.lock().unwrap() += 1;
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(AppError::fetch(url, "script exhausted")))
        }
    }

    fn status(code: u16) -> Result<SourceResponse> {
        Ok(SourceResponse {
            status: code,
            body: Vec::new(),
        })
    }

    fn body(bytes: &[u8]) -> Result<SourceResponse> {
        Ok(SourceResponse {
            status: 200,
            body: bytes.to_vec(),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_first_try() {
        let source = ScriptedSource::new(vec![body(b"%PDF")]);
        let fetcher = PdfFetcher::new(source, &FetcherConfig::default());

        let started = tokio::time::Instant::now();
        let outcome = fetcher.fetch("http://report").await;

        assert_eq!(outcome, FetchOutcome::Document(b"%PDF".to_vec()));
        assert_eq!(fetcher.source.calls(), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_found_is_final() {
        let source = ScriptedSource::new(vec![status(404), body(b"%PDF")]);
        let fetcher = PdfFetcher::new(source, &FetcherConfig::default());

        assert_eq!(fetcher.fetch("http://report").await, FetchOutcome::NotPublished);
        assert_eq!(fetcher.source.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_on_third_attempt() {
        let source = ScriptedSource::new(vec![
            status(503),
            Err(AppError::fetch("http://report", "connection reset")),
            body(b"%PDF"),
        ]);
        let fetcher = PdfFetcher::new(source, &FetcherConfig::default());

        let started = tokio::time::Instant::now();
        let outcome = fetcher.fetch("http://report").await;

        assert_eq!(outcome, FetchOutcome::Document(b"%PDF".to_vec()));
        assert_eq!(fetcher.source.calls(), 3);
        // Two fixed pauses, none after the success.
        assert_eq!(started.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_are_unavailable() {
        let source = ScriptedSource::new(vec![status(500), status(502), status(503)]);
        let fetcher = PdfFetcher::new(source, &FetcherConfig::default());

        let started = tokio::time::Instant::now();
        let outcome = fetcher.fetch("http://report").await;

        assert_eq!(outcome, FetchOutcome::Unavailable { attempts: 3 });
        assert_eq!(fetcher.source.calls(), 3);
        assert_eq!(started.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempts_follow_config() {
        let config = FetcherConfig {
            max_attempts: 1,
            ..FetcherConfig::default()
        };
        let source = ScriptedSource::new(vec![status(500), body(b"%PDF")]);
        let fetcher = PdfFetcher::new(source, &config);

        assert_eq!(
            fetcher.fetch("http://report").await,
            FetchOutcome::Unavailable { attempts: 1 }
        );
        assert_eq!(fetcher.source.calls(), 1);
    }
}
