use std::time::Duration;

use tracing::{debug, trace};

use crate::Result;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// One HTTP GET per query against the AtmoWEB endpoint. No retries.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
    url: String,
}

impl HttpTransport {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Send `params` as the query string and return the raw body.
    /// Timeouts, refused connections and non-2xx statuses are `Error::Http`.
    pub async fn query(&self, params: &[(String, String)]) -> Result<String> {
        debug!(url = %self.url, ?params, "atmoweb query");
        let body = self
            .http
            .get(&self.url)
            .query(params)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        trace!(%body, "atmoweb response");
        Ok(body)
    }
}
