use std::time::Duration;

use super::{
    fetcher::FetchError,
    query::{layer_query_url, PageRequest},
};

pub const DEFAULT_USER_AGENT: &str = concat!(
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) ",
    "AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36"
);

/// Raw answer to a page request. Status handling and decoding are left to the fetcher.
#[derive(Debug, Clone, PartialEq)]
pub struct PageResponse {
    pub status: u16,
    pub body: String,
}

impl PageResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Issues one page request. Implementations only report `FetchError::Transport`, anything the
/// remote end sends back is returned as a `PageResponse`.
pub trait PageTransport {
    fn get_page(&self, request: &PageRequest) -> Result<PageResponse, FetchError>;
}

/// Blocking HTTP transport against an ArcGIS REST service.
pub struct ArcGisTransport {
    client: reqwest::blocking::Client,
    service_url: String,
}

impl ArcGisTransport {
    pub fn new(service_url: &str, user_agent: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            service_url: service_url.to_owned(),
        })
    }
}

impl PageTransport for ArcGisTransport {
    fn get_page(&self, request: &PageRequest) -> Result<PageResponse, FetchError> {
        let url = layer_query_url(&self.service_url, request.layer);
        let response = self
            .client
            .get(&url)
            .query(&request.query_params())
            .send()
            .map_err(|err| FetchError::Transport {
                cause: err.to_string(),
            })?;
        let status = response.status().as_u16();
        let body = response.text().map_err(|err| FetchError::Transport {
            cause: err.to_string(),
        })?;
        Ok(PageResponse { status, body })
    }
}
