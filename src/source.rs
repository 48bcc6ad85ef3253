//! Fetch seam between the dashboard controller and the statistics relay.

use std::future::Future;
use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;
use tracing::debug;

use crate::stats::{parse_game_stats, GameStats, StatsTarget};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// A newer request superseded this one. Never shown to the user.
    #[error("request superseded by a newer one")]
    Cancelled,
    #[error("statistics service unavailable: {0}")]
    NetworkUnavailable(String),
    #[error("statistics request failed with HTTP status {status}")]
    BadStatus { status: u16 },
    #[error("malformed statistics response: {0}")]
    MalformedResponse(String),
}

impl FetchError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Anything the dashboard can pull [`GameStats`] from.
pub trait StatsSource: Send + Sync + 'static {
    fn fetch(
        &self,
        target: &StatsTarget,
    ) -> impl Future<Output = Result<GameStats, FetchError>> + Send;
}

/// Fetches statistics through the relay mount over HTTP.
#[derive(Debug, Clone)]
pub struct HttpStatsSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpStatsSource {
    /// `base_url` is the relay mount, e.g. `http://127.0.0.1:8080/api`.
    pub fn new(base_url: impl Into<String>, timeout_ms: u64) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(|err| FetchError::NetworkUnavailable(err.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url_for(&self, target: &StatsTarget) -> String {
        format!("{}{}", self.base_url, target.path())
    }
}

impl StatsSource for HttpStatsSource {
    fn fetch(
        &self,
        target: &StatsTarget,
    ) -> impl Future<Output = Result<GameStats, FetchError>> + Send {
        let url = self.url_for(target);
        let request = self.client.get(url.clone());

        async move {
            debug!(component = "stats_source", event = "source.request", url = %url);
            let response = request
                .send()
                .await
                .map_err(|err| FetchError::NetworkUnavailable(err.to_string()))?;

            let status = response.status();
            if status == StatusCode::SERVICE_UNAVAILABLE {
                return Err(FetchError::NetworkUnavailable(format!(
                    "relay reported upstream unreachable for {url}"
                )));
            }
            if !status.is_success() {
                return Err(FetchError::BadStatus {
                    status: status.as_u16(),
                });
            }

            // The status line arrived, so a failure here is a dropped connection.
            let body = response
                .bytes()
                .await
                .map_err(|err| FetchError::NetworkUnavailable(err.to_string()))?;
            parse_game_stats(&body)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::Timeframe;

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let source = HttpStatsSource::new("http://localhost:8080/api/", 1_000).unwrap();
        assert_eq!(source.base_url(), "http://localhost:8080/api");
        assert_eq!(
            source.url_for(&StatsTarget::game(Timeframe::Weekly, "Dice")),
            "http://localhost:8080/api/stats/game/weekly/dice"
        );
    }

    #[test]
    fn only_cancellation_is_silent() {
        assert!(FetchError::Cancelled.is_cancelled());
        assert!(!FetchError::BadStatus { status: 500 }.is_cancelled());
        assert_eq!(
            FetchError::BadStatus { status: 404 }.to_string(),
            "statistics request failed with HTTP status 404"
        );
    }
}
