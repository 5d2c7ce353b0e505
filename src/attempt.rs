use crate::{RequestSpec, Response, Result, Transport, TransportError};

/// Classified result of a single attempt.
#[derive(Debug)]
pub enum AttemptOutcome {
    /// Any status outside 500..=599.
    Success(Response),
    /// The exchange itself failed (DNS, connect, timeout, body read).
    TransportError(TransportError),
    /// 5xx status. The response is kept for the caller in case retries run
    /// out.
    ServerError(Response),
}

impl AttemptOutcome {
    pub fn classify(result: std::result::Result<Response, TransportError>) -> Self {
        match result {
            Err(err) => Self::TransportError(err),
            Ok(response) if response.is_server_error() => Self::ServerError(response),
            Ok(response) => Self::Success(response),
        }
    }
}

/// Runs exactly one exchange for a [`RequestSpec`].
#[derive(Debug)]
pub struct AttemptExecutor<'a, T: ?Sized> {
    transport: &'a T,
}

impl<'a, T: Transport + ?Sized> AttemptExecutor<'a, T> {
    pub fn new(transport: &'a T) -> Self {
        Self { transport }
    }

    /// Materializes `spec` and performs one exchange.
    ///
    /// The outer `Result` only fails on materialization errors, which are
    /// never retryable.
    pub fn execute(&self, spec: &RequestSpec) -> Result<AttemptOutcome> {
        let request = spec.materialize()?;
        Ok(AttemptOutcome::classify(self.transport.exchange(request)))
    }
}
