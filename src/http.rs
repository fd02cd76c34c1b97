//! Transport capability.
//!
//! The codec layer only needs to send a fully built request and read back a
//! status, headers, and either a whole body or a byte stream. Connection
//! pooling, retries and TLS belong to the transport. [`HttpTransport`] is the
//! reqwest-backed default; tests and embedders can supply their own.

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt, TryStreamExt};
use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode, Url};

use crate::client::ClientError;
use crate::options::TransportOptions;

/// Incremental response body.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, ClientError>> + Send>>;

/// A request ready to go on the wire.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

/// A fully buffered response.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// A response whose body is still arriving.
pub struct StreamingResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: ByteStream,
}

impl StreamingResponse {
    /// Drain the remaining body into memory.
    pub async fn collect(self) -> Result<Bytes, ClientError> {
        let body = self
            .body
            .try_fold(Vec::new(), |mut body, chunk| async move {
                body.extend_from_slice(&chunk);
                Ok(body)
            })
            .await?;
        Ok(Bytes::from(body))
    }
}

/// Something that can execute HTTP requests.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a request and buffer the whole response body.
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, ClientError>;

    /// Send a request and hand back the body as it arrives.
    async fn send_streaming(
        &self,
        request: TransportRequest,
    ) -> Result<StreamingResponse, ClientError>;
}

/// Transport built on a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Build a transport, applying timeout and proxy settings.
    pub fn new(options: &TransportOptions) -> Result<Self, ClientError> {
        Ok(Self {
            client: build_http_client(options)?,
        })
    }

    fn request(&self, request: TransportRequest) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .request(request.method, request.url)
            .headers(request.headers);
        match request.body {
            Some(body) => builder.body(body),
            None => builder,
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, ClientError> {
        let response = self.request(request).send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        Ok(TransportResponse {
            status,
            headers,
            body,
        })
    }

    async fn send_streaming(
        &self,
        request: TransportRequest,
    ) -> Result<StreamingResponse, ClientError> {
        let response = self.request(request).send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes_stream().map(|chunk| chunk.map_err(ClientError::from));

        Ok(StreamingResponse {
            status,
            headers,
            body: Box::pin(body),
        })
    }
}

/// Build a configured HTTP client from transport options.
///
/// An unparsable proxy URL is a configuration error rather than being
/// silently ignored.
pub fn build_http_client(options: &TransportOptions) -> Result<reqwest::Client, ClientError> {
    let mut builder = reqwest::Client::builder();

    if let Some(timeout) = options.timeout {
        builder = builder.timeout(timeout);
    }

    if let Some(proxy_url) = &options.proxy {
        let proxy = reqwest::Proxy::all(proxy_url)
            .map_err(|e| ClientError::Config(format!("invalid proxy URL `{proxy_url}`: {e}")))?;
        builder = builder.proxy(proxy);
    }

    Ok(builder.build()?)
}
