//! HTTP transport for deployment status resources.

use std::cell::OnceCell;
use std::time::Duration;

use reqwest::blocking::{Client, Response};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::status::{StatusQuery, StatusSource};

const VERSION: &str = env!("CARGO_PKG_VERSION");
/// Longest response body excerpt kept in error details.
const BODY_EXCERPT: usize = 512;

/// Blocking HTTP client that reads a status payload with an optional bearer token.
///
/// The client is built on the first fetch, so runs that never poll never build one.
pub struct HttpStatusSource {
    request_timeout: Duration,
    client: OnceCell<Client>,
}

impl HttpStatusSource {
    pub fn new(request_timeout: Duration) -> Self {
        Self {
            request_timeout,
            client: OnceCell::new(),
        }
    }

    fn client(&self) -> Result<&Client> {
        if let Some(client) = self.client.get() {
            return Ok(client);
        }

        let client = Client::builder()
            .user_agent(format!("gitship/{}", VERSION))
            .timeout(self.request_timeout)
            .build()
            .map_err(|e| Error::internal_io(e.to_string(), Some("create HTTP client".to_string())))?;

        Ok(self.client.get_or_init(|| client))
    }
}

impl StatusSource for HttpStatusSource {
    fn fetch(&self, query: &StatusQuery) -> Result<Value> {
        let mut request = self.client()?.get(&query.url);
        if let Some(token) = query.token.as_deref().filter(|t| !t.is_empty()) {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .map_err(|e| Error::status_transport(&query.url, None, e.to_string()))?;
        parse_json_response(&query.url, response)
    }
}

fn parse_json_response(url: &str, response: Response) -> Result<Value> {
    let status = response.status();
    let body = response
        .text()
        .map_err(|e| Error::status_transport(url, Some(status.as_u16()), e.to_string()))?;

    if !status.is_success() {
        return Err(Error::status_transport(
            url,
            Some(status.as_u16()),
            format!("HTTP {}: {}", status.as_u16(), excerpt(&body)),
        ));
    }

    serde_json::from_str(&body).map_err(|e| {
        Error::status_transport(
            url,
            Some(status.as_u16()),
            format!("invalid JSON response: {}", e),
        )
    })
}

fn excerpt(body: &str) -> &str {
    match body.char_indices().nth(BODY_EXCERPT) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}
