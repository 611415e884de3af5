//! Queue ingress: decodes `{action, version, payload}` envelopes and replays them
//! against the same [`FeedbackStore`] the REST handlers use.
//!
//! Every message is handled on its own spawned task, so the read loop never waits
//! for storage and one failing message never stops the consumer. Nothing is
//! reported back to the producer.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::models::{
    ChangeTradeStatusRequest, DeleteOfferRequest, DeleteRequest, FeedbackRequest, FeedbackSelector, Id, UpdateRequest,
};
use crate::repo::{FeedbackStore, StoreError};

#[cfg(feature = "kafka")]
pub mod kafka;

const DEFAULT_ERROR_BACKOFF: Duration = Duration::from_secs(1);

#[derive(thiserror::Error, Debug)]
pub enum QueueError {
    #[error("malformed message: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("message source failure: {0}")]
    Source(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    pub action: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl Envelope {
    pub fn decode(bytes: &[u8]) -> Result<Self, QueueError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    fn payload<T: serde::de::DeserializeOwned>(&self) -> Result<T, QueueError> {
        Ok(T::deserialize(&self.payload)?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Create,
    Update,
    Delete,
    ChangeTradeStatus,
    DeleteOffer,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "create-action",
            Action::Update => "update-action",
            Action::Delete => "delete-action",
            Action::ChangeTradeStatus => "change-trade-status-action",
            Action::DeleteOffer => "delete-offer-action",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create-action" => Ok(Action::Create),
            "update-action" => Ok(Action::Update),
            "delete-action" => Ok(Action::Delete),
            "change-trade-status-action" => Ok(Action::ChangeTradeStatus),
            "delete-offer-action" => Ok(Action::DeleteOffer),
            other => Err(other.to_string()),
        }
    }
}

/// `update-action` payload: target id plus the partial update fields.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdatePayload {
    pub feedback_id: Id,
    #[serde(flatten)]
    pub request: UpdateRequest,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Applied(Action),
    /// Unknown action; logged and dropped.
    Skipped(String),
}

/// Run one decoded envelope to completion against `store`.
pub async fn handle_envelope(store: &dyn FeedbackStore, envelope: &Envelope) -> Result<Outcome, QueueError> {
    let action = match envelope.action.parse::<Action>() {
        Ok(action) => action,
        Err(unknown) => {
            warn!(action = %unknown, version = %envelope.version, "unknown queue action, skipping");
            return Ok(Outcome::Skipped(unknown));
        }
    };
    debug!(%action, version = %envelope.version, "handling queue message");
    match action {
        Action::Create => {
            let request: FeedbackRequest = envelope.payload()?;
            let id = store.create(request).await?;
            info!(id, "feedback created from queue");
        }
        Action::Update => {
            let payload: UpdatePayload = envelope.payload()?;
            store.update(&FeedbackSelector::Id(payload.feedback_id), payload.request).await?;
        }
        Action::Delete => {
            let request: DeleteRequest = envelope.payload()?;
            let selector = request
                .selector()
                .ok_or_else(|| QueueError::InvalidPayload("one of feedback_id, offer_hash, trade_hash is required".into()))?;
            store.delete(&selector).await?;
        }
        Action::ChangeTradeStatus => {
            let request: ChangeTradeStatusRequest = envelope.payload()?;
            store.change_trade_status(request).await?;
        }
        Action::DeleteOffer => {
            let request: DeleteOfferRequest = envelope.payload()?;
            store.delete_offer(request).await?;
        }
    }
    Ok(Outcome::Applied(action))
}

/// Where raw message bodies come from. `None` ends the consumer loop.
#[async_trait]
pub trait MessageSource: Send {
    async fn next_message(&mut self) -> Option<Result<Vec<u8>, QueueError>>;
}

/// In-process source over a tokio channel. Closing the sender stops the consumer.
pub struct ChannelSource(pub mpsc::Receiver<Vec<u8>>);

impl ChannelSource {
    pub fn new(buffer: usize) -> (mpsc::Sender<Vec<u8>>, Self) {
        let (tx, rx) = mpsc::channel(buffer);
        (tx, Self(rx))
    }
}

#[async_trait]
impl MessageSource for ChannelSource {
    async fn next_message(&mut self) -> Option<Result<Vec<u8>, QueueError>> {
        self.0.recv().await.map(Ok)
    }
}

#[derive(Clone)]
pub struct FeedbackConsumer {
    store: Arc<dyn FeedbackStore>,
    error_backoff: Duration,
}

impl FeedbackConsumer {
    pub fn new(store: Arc<dyn FeedbackStore>) -> Self {
        Self { store, error_backoff: DEFAULT_ERROR_BACKOFF }
    }

    pub fn with_error_backoff(mut self, backoff: Duration) -> Self {
        self.error_backoff = backoff;
        self
    }

    /// Read until the source is exhausted. Handlers still in flight keep running.
    pub async fn run<S: MessageSource>(&self, mut source: S) {
        info!("queue consumer started");
        while let Some(next) = source.next_message().await {
            match next {
                Ok(bytes) => {
                    self.dispatch(&bytes);
                }
                Err(e) => {
                    error!(error = %e, "queue read failed");
                    tokio::time::sleep(self.error_backoff).await;
                }
            }
        }
        info!("queue consumer stopped");
    }

    /// Decode `bytes` and spawn its handler. Returns `None` when the message could
    /// not be decoded and nothing was spawned.
    pub fn dispatch(&self, bytes: &[u8]) -> Option<JoinHandle<()>> {
        let envelope = match Envelope::decode(bytes) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "dropping undecodable queue message");
                metrics::counter!("feedback_queue_failures_total", "action" => "undecodable").increment(1);
                return None;
            }
        };
        let store = Arc::clone(&self.store);
        Some(tokio::spawn(async move {
            let label = envelope
                .action
                .parse::<Action>()
                .map(|a| a.as_str())
                .unwrap_or("unknown");
            metrics::counter!("feedback_queue_messages_total", "action" => label).increment(1);
            if let Err(e) = handle_envelope(store.as_ref(), &envelope).await {
                metrics::counter!("feedback_queue_failures_total", "action" => label).increment(1);
                match e {
                    QueueError::Store(StoreError::Validation(ref errs)) => {
                        warn!(action = label, errors = %errs, "queue message rejected")
                    }
                    QueueError::Store(StoreError::NotFound) => warn!(action = label, "queue message target not found"),
                    other => error!(action = label, error = %other, "queue message failed"),
                }
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_defaults_version_and_payload() {
        let env = Envelope::decode(br#"{"action":"delete-action"}"#).unwrap();
        assert_eq!(env.action, "delete-action");
        assert_eq!(env.version, "");
        assert!(env.payload.is_null());
    }

    #[test]
    fn envelope_rejects_garbage() {
        assert!(matches!(Envelope::decode(b"not json"), Err(QueueError::Decode(_))));
        assert!(matches!(Envelope::decode(br#"{"version":"1"}"#), Err(QueueError::Decode(_))));
    }

    #[test]
    fn action_names_round_trip() {
        for action in [Action::Create, Action::Update, Action::Delete, Action::ChangeTradeStatus, Action::DeleteOffer] {
            assert_eq!(action.as_str().parse::<Action>(), Ok(action));
        }
        assert_eq!("archive-action".parse::<Action>(), Err("archive-action".to_string()));
    }

    #[test]
    fn update_payload_flattens_request() {
        let env = Envelope::decode(
            br#"{"action":"update-action","version":"1","payload":{"feedback_id":7,"message":"changed text","type":"negative"}}"#,
        )
        .unwrap();
        let payload: UpdatePayload = env.payload().unwrap();
        assert_eq!(payload.feedback_id, 7);
        assert_eq!(payload.request.message.as_deref(), Some("changed text"));
        assert_eq!(payload.request.feedback_type.as_deref(), Some("negative"));
        assert!(payload.request.receiver_id.is_none());
    }
}
