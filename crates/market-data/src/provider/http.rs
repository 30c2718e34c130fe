//! Shared HTTP plumbing for the REST fetchers.

use std::time::Duration;

use log::debug;
use reqwest::{Client, StatusCode, Url};

use crate::errors::FetchError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const USER_AGENT: &str = "Mozilla/5.0 (compatible; aurum/0.1)";

pub(crate) fn build_client() -> Client {
    Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .user_agent(USER_AGENT)
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// Builds a URL from a base and query parameters.
pub(crate) fn build_url(provider: &str, base: &str, params: &[(&str, &str)]) -> Result<Url, FetchError> {
    Url::parse_with_params(base, params)
        .map_err(|e| FetchError::malformed(provider, format!("Failed to build URL: {}", e)))
}

/// GET returning the body as text.
pub(crate) async fn get_text(client: &Client, provider: &str, url: Url) -> Result<String, FetchError> {
    let response = send(client, provider, url).await?;
    check_status(provider, response.status())?;

    response
        .text()
        .await
        .map_err(|e| FetchError::network(provider, e.to_string()))
}

/// GET returning raw bytes. `Ok(None)` when the resource does not exist (404).
pub(crate) async fn get_bytes(
    client: &Client,
    provider: &str,
    url: Url,
) -> Result<Option<Vec<u8>>, FetchError> {
    let response = send(client, provider, url).await?;
    if response.status() == StatusCode::NOT_FOUND {
        return Ok(None);
    }
    check_status(provider, response.status())?;

    let bytes = response
        .bytes()
        .await
        .map_err(|e| FetchError::network(provider, e.to_string()))?;
    Ok(Some(bytes.to_vec()))
}

async fn send(client: &Client, provider: &str, url: Url) -> Result<reqwest::Response, FetchError> {
    debug!("{} request: {}", provider, redact(&url));

    client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            FetchError::network(provider, "request timed out")
        } else {
            FetchError::network(provider, e.to_string())
        }
    })
}

/// 429 is throttling, other 4xx mean the request itself is wrong, 5xx are transient.
pub(crate) fn check_status(provider: &str, status: StatusCode) -> Result<(), FetchError> {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(FetchError::rate_limited(provider));
    }
    if status.is_client_error() {
        return Err(FetchError::malformed(provider, format!("HTTP {}", status)));
    }
    if !status.is_success() {
        return Err(FetchError::network(provider, format!("HTTP {}", status)));
    }
    Ok(())
}

/// Drops credential query parameters from a URL before logging it.
fn redact(url: &Url) -> String {
    let mut redacted = url.clone();
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            let lowered = k.to_ascii_lowercase();
            if lowered.contains("key") || lowered == "token" {
                (k.into_owned(), "***".to_string())
            } else {
                (k.into_owned(), v.into_owned())
            }
        })
        .collect();
    if pairs.is_empty() {
        return redacted.to_string();
    }
    redacted.query_pairs_mut().clear().extend_pairs(pairs);
    redacted.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            check_status("X", StatusCode::TOO_MANY_REQUESTS),
            Err(FetchError::rate_limited("X"))
        );
        assert!(matches!(
            check_status("X", StatusCode::NOT_FOUND),
            Err(FetchError::MalformedResponse { .. })
        ));
        assert!(matches!(
            check_status("X", StatusCode::BAD_GATEWAY),
            Err(FetchError::Network { .. })
        ));
        assert!(check_status("X", StatusCode::OK).is_ok());
    }

    #[test]
    fn test_redact_hides_keys() {
        let url = build_url(
            "X",
            "https://example.com/query",
            &[("function", "FX_DAILY"), ("apikey", "secret")],
        )
        .unwrap();
        let shown = redact(&url);
        assert!(!shown.contains("secret"));
        assert!(shown.contains("FX_DAILY"));
    }
}
