use std::fmt;

use crate::{FluentError, OutgoingRequest, Response, TransportError};

/// Performs one blocking request/response exchange.
///
/// Implementations must not retry on their own: every call is one attempt
/// as seen by the retry engine.
pub trait Transport: Send + Sync {
    fn exchange(&self, request: OutgoingRequest) -> Result<Response, TransportError>;
}

impl<F> Transport for F
where
    F: Fn(OutgoingRequest) -> Result<Response, TransportError> + Send + Sync,
{
    fn exchange(&self, request: OutgoingRequest) -> Result<Response, TransportError> {
        self(request)
    }
}

/// Default transport backed by `reqwest`'s blocking client.
#[derive(Clone)]
pub struct ReqwestTransport {
    http: reqwest::blocking::Client,
}

impl fmt::Debug for ReqwestTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReqwestTransport").finish_non_exhaustive()
    }
}

impl ReqwestTransport {
    pub fn new() -> crate::Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .build()
            .map_err(|err| FluentError::Config(format!("failed to build HTTP client: {err}")))?;
        Ok(Self::with_client(http))
    }

    /// Wraps a preconfigured client (proxies, TLS, redirect policy).
    pub fn with_client(http: reqwest::blocking::Client) -> Self {
        Self { http }
    }
}

impl Transport for ReqwestTransport {
    fn exchange(&self, request: OutgoingRequest) -> Result<Response, TransportError> {
        let OutgoingRequest {
            method,
            url,
            headers,
            body,
            timeout,
        } = request;

        let mut builder = self.http.request(method.clone(), url).headers(headers);
        if let Some(body) = body {
            builder = builder.body(body);
        }
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send()?;
        let status = response.status();
        let url = response.url().clone();
        let headers = response.headers().clone();
        let body = response.bytes()?;

        Ok(Response::new(method, url, status, headers, body.to_vec()))
    }
}
