//! `fluent-http` is a blocking HTTP request builder with retry and
//! exponential backoff.
//!
//! Requests are configured through [`RequestBuilder`] and executed by
//! [`RetryEngine`], which retries transport failures and 5xx responses while
//! the [`RetryBudget`] and the [`BackoffPolicy`]'s elapsed-time bound allow.
//!
//! ```no_run
//! let response = fluent_http::RequestBuilder::new()
//!     .get("http://localhost:8080/health")
//!     .retry(2)
//!     .send()?;
//! assert!(response.status().is_success());
//! # Ok::<(), fluent_http::FluentError>(())
//! ```

mod attempt;
mod backoff;
mod budget;
mod clock;
mod engine;
mod error;
mod request;
mod response;
mod transport;

pub use attempt::{AttemptExecutor, AttemptOutcome};
pub use backoff::{BackoffPolicy, ExponentialBackoff};
pub use budget::RetryBudget;
pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::RetryEngine;
pub use error::{FluentError, LastFailure, TransportError};
pub use request::{OutgoingRequest, Payload, RequestBuilder, RequestSpec};
pub use response::Response;
pub use transport::{ReqwestTransport, Transport};

pub use reqwest::{header, Method, StatusCode, Url};

pub type Result<T> = std::result::Result<T, FluentError>;
