use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use exn::ResultExt;
use reqwest::header::{HeaderMap, HeaderValue, REFERER, USER_AGENT};
use reqwest::{Client, Url};
use std::time::Duration;

/// Where image bytes come from.
#[async_trait]
pub trait ImageSource: Send + Sync {
    /// Download the bytes behind `url`. Non-success statuses are errors; an
    /// empty body is returned as-is for the cache to judge.
    async fn fetch(&self, url: &Url) -> Result<Vec<u8>>;
}

/// Settings for [`HttpImageSource`].
#[derive(Debug, Clone)]
pub struct HttpImageOptions {
    pub user_agent: String,
    pub referer: String,
    pub timeout: Duration,
}
impl Default for HttpImageOptions {
    fn default() -> Self {
        Self {
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
                .to_string(),
            referer: "https://douban.com".to_string(),
            timeout: Duration::from_secs(15),
        }
    }
}

/// [`ImageSource`] over plain HTTP GET with browser-like identification.
pub struct HttpImageSource {
    client: Client,
}

impl HttpImageSource {
    pub fn new(options: HttpImageOptions) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&options.user_agent)
                .or_raise(|| ErrorKind::InvalidConfig("user agent".to_string()))?,
        );
        headers.insert(
            REFERER,
            HeaderValue::from_str(&options.referer).or_raise(|| ErrorKind::InvalidConfig("referer".to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(options.timeout)
            .build()
            .or_raise(|| ErrorKind::InvalidConfig("http client".to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ImageSource for HttpImageSource {
    async fn fetch(&self, url: &Url) -> Result<Vec<u8>> {
        let response = self.client.get(url.clone()).send().await.or_raise(|| ErrorKind::Transport)?;
        let status = response.status();
        if !status.is_success() {
            exn::bail!(ErrorKind::HttpStatus(status.as_u16()));
        }
        let bytes = response.bytes().await.or_raise(|| ErrorKind::Transport)?;
        Ok(bytes.to_vec())
    }
}
