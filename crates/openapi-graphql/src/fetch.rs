use std::sync::Arc;

use bytes::Bytes;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("{0}")]
    AnyError(String),
}

impl FetchError {
    pub fn any(error: impl ToString) -> Self {
        FetchError::AnyError(error.to_string())
    }
}

pub type FetchResult<T> = Result<T, FetchError>;

#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub method: http::Method,
    pub url: url::Url,
    pub headers: http::HeaderMap,
    pub body: Option<Bytes>,
}

#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: http::StatusCode,
    pub headers: http::HeaderMap,
    pub body: Bytes,
}

/// Performs the HTTP calls on behalf of the generated resolvers.
#[async_trait::async_trait]
pub trait FetcherInner: Send + Sync {
    async fn fetch(&self, request: FetchRequest) -> FetchResult<FetchResponse>;
}

#[derive(Clone)]
pub struct Fetcher {
    inner: Arc<dyn FetcherInner>,
}

impl Fetcher {
    pub fn new(fetcher: impl FetcherInner + 'static) -> Fetcher {
        Fetcher {
            inner: Arc::new(fetcher),
        }
    }
}

impl Default for Fetcher {
    fn default() -> Self {
        Fetcher::new(NativeFetcher::default())
    }
}

impl std::ops::Deref for Fetcher {
    type Target = dyn FetcherInner;

    fn deref(&self) -> &Self::Target {
        self.inner.as_ref()
    }
}

/// A [`FetcherInner`] backed by reqwest.
#[derive(Clone, Default)]
pub struct NativeFetcher {
    client: reqwest::Client,
}

impl NativeFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        NativeFetcher { client }
    }
}

#[async_trait::async_trait]
impl FetcherInner for NativeFetcher {
    async fn fetch(&self, request: FetchRequest) -> FetchResult<FetchResponse> {
        let mut builder = self
            .client
            .request(request.method, request.url)
            .headers(request.headers);

        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let mut response = builder.send().await.map_err(FetchError::any)?;

        let status = response.status();
        let headers = std::mem::take(response.headers_mut());
        let body = response.bytes().await.map_err(FetchError::any)?;

        Ok(FetchResponse { status, headers, body })
    }
}
