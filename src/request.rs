use std::{fmt, io::Read, sync::Arc, time::Duration};

use reqwest::{
    header::{self, HeaderMap, HeaderName, HeaderValue},
    Method, Url,
};
use serde::Serialize;

use crate::{
    BackoffPolicy, Clock, FluentError, Result, RetryBudget, RetryEngine, ReqwestTransport,
    Response, Transport,
};

/// Request body as configured by the caller.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Payload {
    #[default]
    None,
    /// Raw bytes sent as-is.
    Raw(Vec<u8>),
    /// JSON serialization of a structured value, produced by
    /// [`RequestBuilder::json`].
    Json(Vec<u8>),
}

/// Immutable description of one logical request.
///
/// A spec can be executed any number of times, from any number of threads;
/// every attempt renders a fresh [`OutgoingRequest`] from it.
#[derive(Clone, Debug)]
pub struct RequestSpec {
    method: Method,
    url: Url,
    headers: HeaderMap,
    payload: Payload,
    timeout: Option<Duration>,
}

impl RequestSpec {
    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Per-attempt timeout handed to the transport.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Renders a transport-ready message for one attempt.
    pub fn materialize(&self) -> Result<OutgoingRequest> {
        let body = match &self.payload {
            Payload::None => None,
            Payload::Raw(bytes) | Payload::Json(bytes) => Some(bytes.clone()),
        };

        Ok(OutgoingRequest {
            method: self.method.clone(),
            url: self.url.clone(),
            headers: self.headers.clone(),
            body,
            timeout: self.timeout,
        })
    }
}

/// Single-attempt message handed to a [`Transport`].
#[derive(Clone, Debug)]
pub struct OutgoingRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
    pub timeout: Option<Duration>,
}

/// Fluent request builder with retry and exponential backoff.
///
/// Setters never fail; the first configuration error is kept and returned by
/// [`RequestBuilder::build`] or [`RequestBuilder::send`].
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
///
/// let response = fluent_http::RequestBuilder::new()
///     .post("http://localhost:8080/items")
///     .json(&[1, 2, 3])
///     .timeout(Duration::from_secs(5))
///     .initial_interval(Duration::from_millis(100))
///     .retry(3)
///     .send()?;
///
/// println!("{} {}", response.status(), response.text());
/// # Ok::<(), fluent_http::FluentError>(())
/// ```
pub struct RequestBuilder {
    method: Method,
    url: Option<String>,
    headers: HeaderMap,
    payload: Payload,
    reader: Option<Box<dyn Read + Send>>,
    timeout: Option<Duration>,
    backoff: BackoffPolicy,
    retries: usize,
    transport: Option<Arc<dyn Transport>>,
    error: Option<FluentError>,
}

impl fmt::Debug for RequestBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestBuilder")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("headers", &self.headers)
            .field("payload", &self.payload)
            .field("reader", &self.reader.as_ref().map(|_| "<reader>"))
            .field("timeout", &self.timeout)
            .field("backoff", &self.backoff)
            .field("retries", &self.retries)
            .field("custom_transport", &self.transport.is_some())
            .finish()
    }
}

impl Default for RequestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestBuilder {
    pub fn new() -> Self {
        Self {
            method: Method::GET,
            url: None,
            headers: HeaderMap::new(),
            payload: Payload::None,
            reader: None,
            timeout: None,
            backoff: BackoffPolicy::default(),
            retries: 0,
            transport: None,
            error: None,
        }
    }

    pub fn method(mut self, method: Method, url: impl Into<String>) -> Self {
        self.method = method;
        self.url = Some(url.into());
        self
    }

    pub fn get(self, url: impl Into<String>) -> Self {
        self.method(Method::GET, url)
    }

    pub fn post(self, url: impl Into<String>) -> Self {
        self.method(Method::POST, url)
    }

    pub fn put(self, url: impl Into<String>) -> Self {
        self.method(Method::PUT, url)
    }

    pub fn patch(self, url: impl Into<String>) -> Self {
        self.method(Method::PATCH, url)
    }

    pub fn delete(self, url: impl Into<String>) -> Self {
        self.method(Method::DELETE, url)
    }

    /// Sets a header, replacing any previous value for the same
    /// (case-insensitive) name.
    pub fn header(mut self, key: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        let key = key.as_ref();
        let name = match HeaderName::from_bytes(key.as_bytes()) {
            Ok(name) => name,
            Err(err) => {
                return self.fail(FluentError::Config(format!(
                    "invalid header name '{key}': {err}"
                )))
            }
        };
        match HeaderValue::from_str(value.as_ref()) {
            Ok(value) => {
                self.headers.insert(name, value);
                self
            }
            Err(err) => self.fail(FluentError::Config(format!(
                "invalid value for header '{key}': {err}"
            ))),
        }
    }

    /// Sets a structured payload, replacing any raw body, and marks the
    /// request as `application/json`.
    pub fn json<T: Serialize + ?Sized>(mut self, value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(bytes) => {
                self.payload = Payload::Json(bytes);
                self.reader = None;
                self.headers.insert(
                    header::CONTENT_TYPE,
                    HeaderValue::from_static("application/json"),
                );
                self
            }
            Err(err) => self.fail(FluentError::Serialize(err)),
        }
    }

    /// Sets a raw body, replacing any structured payload.
    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.payload = Payload::Raw(body.into());
        self.reader = None;
        self
    }

    /// Sets a single-use body stream.
    ///
    /// The reader is drained once when the request is built, so every
    /// attempt sends the same bytes. A read failure is a configuration error.
    pub fn body_reader<R: Read + Send + 'static>(mut self, reader: R) -> Self {
        self.payload = Payload::None;
        self.reader = Some(Box::new(reader));
        self
    }

    /// Per-attempt timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn initial_interval(mut self, interval: Duration) -> Self {
        self.backoff.initial_interval = interval;
        self
    }

    pub fn randomization_factor(mut self, factor: f64) -> Self {
        self.backoff.randomization_factor = factor;
        self
    }

    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.backoff.multiplier = multiplier;
        self
    }

    pub fn max_interval(mut self, interval: Duration) -> Self {
        self.backoff.max_interval = interval;
        self
    }

    /// Bounds the whole run; `None` or a zero duration lets the retry budget
    /// alone decide.
    pub fn max_elapsed_time(mut self, limit: impl Into<Option<Duration>>) -> Self {
        self.backoff.max_elapsed_time = limit.into().filter(|limit| !limit.is_zero());
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.backoff.clock = clock;
        self
    }

    /// Replaces the whole backoff policy.
    pub fn backoff(mut self, policy: BackoffPolicy) -> Self {
        self.backoff = policy;
        self
    }

    /// Maximum number of retries after the initial attempt.
    pub fn retry(mut self, retries: usize) -> Self {
        self.retries = retries;
        self
    }

    /// Uses a custom transport instead of the default `reqwest` client.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Builds the immutable request description.
    pub fn build(self) -> Result<RequestSpec> {
        self.into_parts().map(|parts| parts.spec)
    }

    /// Builds the request and runs it through the retry engine.
    pub fn send(self) -> Result<Response> {
        let Parts {
            spec,
            backoff,
            retries,
            transport,
        } = self.into_parts()?;
        let transport: Arc<dyn Transport> = match transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new()?),
        };

        let mut budget = RetryBudget::new(retries);
        RetryEngine::new(transport.as_ref(), &backoff).run(&spec, &mut budget)
    }

    fn fail(mut self, err: FluentError) -> Self {
        if self.error.is_none() {
            self.error = Some(err);
        }
        self
    }

    fn into_parts(self) -> Result<Parts> {
        if let Some(err) = self.error {
            return Err(err);
        }
        let raw_url = self
            .url
            .ok_or_else(|| FluentError::Config("request URL is not set".to_owned()))?;
        let url = Url::parse(&raw_url)
            .map_err(|err| FluentError::Config(format!("invalid URL '{raw_url}': {err}")))?;

        let payload = match self.reader {
            Some(mut reader) => {
                let mut bytes = Vec::new();
                reader.read_to_end(&mut bytes).map_err(|err| {
                    FluentError::Config(format!("failed to read request body: {err}"))
                })?;
                Payload::Raw(bytes)
            }
            None => self.payload,
        };

        Ok(Parts {
            spec: RequestSpec {
                method: self.method,
                url,
                headers: self.headers,
                payload,
                timeout: self.timeout,
            },
            backoff: self.backoff,
            retries: self.retries,
            transport: self.transport,
        })
    }
}

struct Parts {
    spec: RequestSpec,
    backoff: BackoffPolicy,
    retries: usize,
    transport: Option<Arc<dyn Transport>>,
}
