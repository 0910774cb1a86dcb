use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::Result;

pub const SAVED_MESSAGE: &str = "Saved successfully!";
pub const UNKNOWN_ERROR: &str = "Unknown error";

#[derive(Serialize)]
struct CrawlRequest<'a> {
    urls: [&'a str; 1],
    topic: &'a str,
}

#[derive(Deserialize, Default)]
struct CrawlErrorBody {
    detail: Option<String>,
}

/// What the crawl service said about a job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlOutcome {
    pub success: bool,
    pub message: String,
}

#[derive(Clone)]
pub struct CrawlClient {
    client: Client,
    crawl_url: String,
}

impl CrawlClient {
    pub fn new(client: Client, crawl_url: &str) -> Self {
        Self {
            client,
            crawl_url: crawl_url.to_string(),
        }
    }

    /// Ask the crawl service to fetch `url` and file it under `topic`.
    ///
    /// A refusal is a successful call with `success: false`; only transport
    /// failures come back as `Err`.
    pub async fn crawl(&self, url: &str, topic: &str) -> Result<CrawlOutcome> {
        let request = CrawlRequest { urls: [url], topic };

        let response = self
            .client
            .post(&self.crawl_url)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            info!(url, topic, "crawl stored");
            return Ok(CrawlOutcome {
                success: true,
                message: SAVED_MESSAGE.to_string(),
            });
        }

        let body = response.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<CrawlErrorBody>(&body)
            .unwrap_or_default()
            .detail;
        warn!(url, %status, ?detail, "crawl rejected");

        Ok(CrawlOutcome {
            success: false,
            message: detail.unwrap_or_else(|| UNKNOWN_ERROR.to_string()),
        })
    }
}
