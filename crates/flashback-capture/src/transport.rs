//! Batch delivery transport.

use std::time::Duration;

use flashback_types::{CollectResponse, EventBatch};

/// Errors a delivery attempt can produce. All of them are recoverable:
/// the pipeline re-queues the batch and retries on the next flush.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The request failed at the network layer.
    #[error("batch request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The collector answered with a non-success status.
    #[error("collector rejected batch: status {status}")]
    Rejected { status: u16 },
}

/// Delivers one batch to the collector.
///
/// Synchronous from the pipeline's point of view; implementations bound
/// their own wait with a timeout. Implementations must not retry
/// internally — retry policy belongs to the pipeline.
pub trait Transport {
    /// Attempts delivery, returning the number of events the collector
    /// acknowledged.
    fn deliver(&self, batch: &EventBatch) -> Result<u64, TransportError>;
}

/// JSON-over-HTTP transport posting to the collector endpoint.
pub struct HttpTransport {
    client: reqwest::blocking::Client,
    endpoint: String,
}

impl HttpTransport {
    /// Builds a transport with the given endpoint and request timeout.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Http` when the underlying client cannot
    /// be constructed.
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }
}

impl Transport for HttpTransport {
    fn deliver(&self, batch: &EventBatch) -> Result<u64, TransportError> {
        let response = self.client.post(&self.endpoint).json(batch).send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Rejected {
                status: status.as_u16(),
            });
        }

        let body: CollectResponse = response.json()?;
        Ok(body.events_received)
    }
}
