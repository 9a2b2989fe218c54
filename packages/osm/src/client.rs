//! Overpass API access.

use std::time::Duration;

use mapscope_osm_models::{OverpassResponse, OverpassService, RawElement};

use crate::OsmError;

/// Longest response body excerpt kept in a status error.
const ERROR_BODY_LIMIT: usize = 512;

/// Anything that can answer an Overpass query with raw elements.
#[async_trait::async_trait]
pub trait ElementSource: Send + Sync {
    /// Runs `query` and returns the elements of the response.
    ///
    /// # Errors
    ///
    /// Returns [`OsmError`] if the request fails, the response status is
    /// not a success, or the body cannot be parsed.
    async fn fetch(&self, query: &str) -> Result<Vec<RawElement>, OsmError>;
}

/// [`ElementSource`] backed by an Overpass interpreter over HTTP.
#[derive(Debug, Clone)]
pub struct OverpassClient {
    client: reqwest::Client,
    service: OverpassService,
}

impl OverpassClient {
    /// Creates a client for `service`.
    ///
    /// The HTTP timeout is the server-side query timeout plus a margin for
    /// transfer.
    ///
    /// # Errors
    ///
    /// Returns [`OsmError::Http`] if the HTTP client cannot be built.
    pub fn new(service: OverpassService) -> Result<Self, OsmError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("mapscope/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(service.timeout_secs + 30))
            .build()?;
        Ok(Self { client, service })
    }

    #[must_use]
    pub const fn service(&self) -> &OverpassService {
        &self.service
    }
}

#[async_trait::async_trait]
impl ElementSource for OverpassClient {
    async fn fetch(&self, query: &str) -> Result<Vec<RawElement>, OsmError> {
        log::debug!("POST {} ({} bytes of query)", self.service.url, query.len());

        let resp = self
            .client
            .post(&self.service.url)
            .form(&[("data", query)])
            .send()
            .await?;
        let status = resp.status();
        let body = resp.text().await?;

        if !status.is_success() {
            return Err(OsmError::Status {
                status: status.as_u16(),
                body: body.chars().take(ERROR_BODY_LIMIT).collect(),
            });
        }

        let response = parse_response(&body)?;
        log::info!("Overpass returned {} elements", response.elements.len());
        Ok(response.elements)
    }
}

/// Parses an Overpass JSON response body.
///
/// # Errors
///
/// Returns [`OsmError::Json`] if the body is not a valid response.
pub fn parse_response(body: &str) -> Result<OverpassResponse, OsmError> {
    Ok(serde_json::from_str(body)?)
}
