use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::*;
use crate::validation::ValidationErrors;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("not found")] NotFound,
    #[error("validation failed: {0}")] Validation(ValidationErrors),
    #[error("no stats row for user {0}")] StatsRowMissing(Id),
    #[error("database error: {0}")] Database(#[from] sqlx::Error),
    #[error("store backend error: {0}")] Backend(String),
}

impl From<ValidationErrors> for StoreError {
    fn from(errs: ValidationErrors) -> Self {
        StoreError::Validation(errs)
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Everything the ingress adapters need from persistence.
///
/// Every mutating call validates its request before touching storage and runs
/// as a single transaction: the feedback rows and the receiver's stats counters
/// commit together or not at all.
#[async_trait]
pub trait FeedbackStore: Send + Sync {
    /// Live (not soft-deleted) feedback by id.
    async fn find_by_id(&self, id: Id) -> StoreResult<Feedback>;
    async fn find(&self, filter: &FeedbackFilter) -> StoreResult<FeedbackResponse>;
    /// Returns the id of the new row.
    async fn create(&self, request: FeedbackRequest) -> StoreResult<Id>;
    async fn update(&self, selector: &FeedbackSelector, request: UpdateRequest) -> StoreResult<()>;
    /// Soft delete. Fails with `NotFound` when no live row matches.
    async fn delete(&self, selector: &FeedbackSelector) -> StoreResult<()>;
    /// Undo a soft delete.
    async fn restore(&self, id: Id) -> StoreResult<()>;
    async fn delete_offer(&self, request: DeleteOfferRequest) -> StoreResult<()>;
    async fn change_trade_status(&self, request: ChangeTradeStatusRequest) -> StoreResult<()>;
    async fn stats(&self, user_id: Id) -> StoreResult<FeedbackStats>;
}

/// Validate an offer deletion, defaulting the timestamp to `now`.
pub(crate) fn offer_deleted_at(request: &DeleteOfferRequest, now: DateTime<Utc>) -> StoreResult<DateTime<Utc>> {
    Ok(request.validated_deleted_at()?.unwrap_or(now))
}

pub(crate) fn check_update(request: &UpdateRequest) -> StoreResult<()> {
    let errs = request.validate();
    if errs.is_empty() { Ok(()) } else { Err(StoreError::Validation(errs)) }
}

pub(crate) fn check_trade_status(request: &ChangeTradeStatusRequest) -> StoreResult<()> {
    let errs = request.validate();
    if errs.is_empty() { Ok(()) } else { Err(StoreError::Validation(errs)) }
}

pub(crate) fn record_op(op: &'static str) {
    metrics::counter!("feedback_store_ops_total", "op" => op).increment(1);
}

#[cfg(feature = "inmem-store")]
pub mod inmem;

#[cfg(feature = "postgres-store")]
pub mod pg;
