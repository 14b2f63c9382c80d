use crate::error::{ErrorKind, Result};
use crate::models::{Category, Page, PageRequest, RawDetail};
use async_trait::async_trait;
use exn::ResultExt;
use reqwest::header::{HeaderMap, HeaderValue, REFERER, USER_AGENT};
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::instrument;

/// Where collection pages and subject details come from.
///
/// Implementations perform exactly one request per call and never retry;
/// failures surface as [`ErrorKind`] values for the caller to act on.
#[async_trait]
pub trait CollectionSource: Send + Sync {
    /// Fetch one page of a (uid, category, status) collection.
    async fn fetch_page(&self, request: &PageRequest) -> Result<Page>;

    /// Look up a single subject by id.
    async fn fetch_detail(&self, category: Category, id: &str) -> Result<RawDetail>;
}

/// Connection settings for [`HttpSource`].
#[derive(Debug, Clone)]
pub struct HttpOptions {
    pub base_url: String,
    pub referer: String,
    pub user_agent: String,
    pub timeout: Duration,
}
impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            base_url: "https://fatesinger.com/dbapi".to_string(),
            referer: "https://m.douban.com".to_string(),
            user_agent: "Mozilla/5.0 (iPhone; CPU iPhone OS 16_6 like Mac OS X) AppleWebKit/605.1.15 \
                         (KHTML, like Gecko) Version/16.6 Mobile/15E148 Safari/604.1"
                .to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// [`CollectionSource`] backed by the upstream HTTP API.
pub struct HttpSource {
    client: Client,
    base: Url,
}

impl HttpSource {
    pub fn new(options: HttpOptions) -> Result<Self> {
        let base = Url::parse(&options.base_url).or_raise(|| ErrorKind::InvalidUrl(options.base_url.clone()))?;
        if base.cannot_be_a_base() {
            exn::bail!(ErrorKind::InvalidUrl(options.base_url));
        }

        let mut headers = HeaderMap::new();
        headers.insert(
            REFERER,
            HeaderValue::from_str(&options.referer).or_raise(|| ErrorKind::InvalidConfig("referer".to_string()))?,
        );
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&options.user_agent)
                .or_raise(|| ErrorKind::InvalidConfig("user agent".to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(options.timeout)
            .build()
            .or_raise(|| ErrorKind::InvalidConfig("http client".to_string()))?;

        Ok(Self { client, base })
    }

    /// Append path segments to the base URL, escaping each one.
    fn endpoint<'s>(&self, segments: impl IntoIterator<Item = &'s str>) -> Result<Url> {
        let mut url = self.base.clone();
        {
            let Ok(mut path) = url.path_segments_mut() else {
                exn::bail!(ErrorKind::InvalidUrl(self.base.to_string()));
            };
            path.pop_if_empty().extend(segments);
        }
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        let response = self.client.get(url).send().await.or_raise(|| ErrorKind::Transport)?;
        let status = response.status();
        if !status.is_success() {
            exn::bail!(ErrorKind::Status(status.as_u16()));
        }
        response.json::<T>().await.or_raise(|| ErrorKind::Decode)
    }
}

#[async_trait]
impl CollectionSource for HttpSource {
    #[instrument(skip(self), fields(uid = %request.uid, category = %request.category, status = %request.status, offset = request.offset))]
    async fn fetch_page(&self, request: &PageRequest) -> Result<Page> {
        let mut url = self.endpoint(["user", request.uid.as_str(), "interests"])?;
        url.query_pairs_mut()
            .append_pair("type", request.category.as_str())
            .append_pair("status", request.status.as_str())
            .append_pair("count", &request.limit.to_string())
            .append_pair("start", &request.offset.to_string());
        let page: Page = self.get_json(url).await?;
        tracing::debug!(received = page.records.len(), total = page.total, "Fetched collection page");
        Ok(page)
    }

    #[instrument(skip(self))]
    async fn fetch_detail(&self, category: Category, id: &str) -> Result<RawDetail> {
        let mut url = self.endpoint([category.as_str(), id])?;
        url.query_pairs_mut().append_pair("ck", "xgtY").append_pair("for_mobile", "1");
        self.get_json(url).await
    }
}
