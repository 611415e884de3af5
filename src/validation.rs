//! Business rules for write requests. Pure functions, no I/O.
//!
//! Every check reports into a [`ValidationErrors`] map keyed by field name; an
//! empty map means the request may be persisted.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{
    timestamp, ChangeTradeStatusRequest, DeleteOfferRequest, FeedbackRequest, FeedbackType, NewFeedback,
    UpdateRequest,
};

const MIN_MESSAGE_LEN: usize = 5;

const PARENT_ID_MSG: &str = "The parent_id field must be a positive number!";
const SENDER_ID_MSG: &str = "The sender_id field is required and must be more then 0!";
const RECEIVER_ID_MSG: &str = "The receiver_id field is required and must be more then 0!";
const TRADE_ID_MSG: &str = "The trade_id field is required and must be more then 0!";
const MESSAGE_MSG: &str = "The message field must be longer than 5 chars!";
const TYPE_MSG: &str = "The type field must be either 'positive' or 'negative'!";

/// Field name → human readable messages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<String, Vec<String>>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0.entry(field.to_string()).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    fn into_result<T>(self, ok: impl FnOnce() -> T) -> Result<T, ValidationErrors> {
        if self.is_empty() { Ok(ok()) } else { Err(self) }
    }
}

impl std::fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let fields: Vec<&str> = self.fields().collect();
        write!(f, "invalid fields: {}", fields.join(", "))
    }
}

fn check_parent_id(errs: &mut ValidationErrors, parent_id: Option<i64>) {
    if parent_id.is_some_and(|id| id < 0) {
        errs.add("parent_id", PARENT_ID_MSG);
    }
}

fn check_positive_id(errs: &mut ValidationErrors, field: &str, message: &str, id: i64) {
    if id < 1 {
        errs.add(field, message);
    }
}

fn check_message(errs: &mut ValidationErrors, message: &str) {
    if message.chars().count() < MIN_MESSAGE_LEN {
        errs.add("message", MESSAGE_MSG);
    }
}

fn check_type(errs: &mut ValidationErrors, raw: &str) -> Option<FeedbackType> {
    match raw.parse() {
        Ok(t) => Some(t),
        Err(_) => {
            errs.add("type", TYPE_MSG);
            None
        }
    }
}

fn check_timestamp(errs: &mut ValidationErrors, field: &str, raw: Option<&str>) -> Option<DateTime<Utc>> {
    let raw = raw.filter(|s| !s.is_empty())?;
    match timestamp::parse(raw) {
        Ok(ts) => Some(ts),
        Err(e) => {
            errs.add(field, e.to_string());
            None
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

impl FeedbackRequest {
    pub fn validate(&self) -> ValidationErrors {
        let mut errs = ValidationErrors::new();
        self.check(&mut errs);
        errs
    }

    fn check(&self, errs: &mut ValidationErrors) -> (Option<FeedbackType>, Option<DateTime<Utc>>) {
        check_parent_id(errs, self.parent_id);
        check_positive_id(errs, "sender_id", SENDER_ID_MSG, self.sender_id);
        check_positive_id(errs, "receiver_id", RECEIVER_ID_MSG, self.receiver_id);
        check_positive_id(errs, "trade_id", TRADE_ID_MSG, self.trade_id);
        check_message(errs, &self.message);
        let feedback_type = check_type(errs, &self.feedback_type);
        let created_at = check_timestamp(errs, "created_at", self.created_at.as_deref());
        (feedback_type, created_at)
    }

    /// Validate and convert into an insertable row.
    pub fn into_new_feedback(self) -> Result<NewFeedback, ValidationErrors> {
        let mut errs = ValidationErrors::new();
        let (feedback_type, created_at) = self.check(&mut errs);
        let Some(feedback_type) = feedback_type else { return Err(errs) };
        errs.into_result(|| NewFeedback {
            parent_id: self.parent_id.filter(|id| *id > 0),
            sender_id: self.sender_id,
            sender_name: self.sender_name,
            sender_avatar: self.sender_avatar,
            receiver_id: self.receiver_id,
            receiver_name: self.receiver_name,
            receiver_avatar: self.receiver_avatar,
            trade_id: self.trade_id,
            trade_hash: non_empty(self.trade_hash),
            trade_status: self.trade_status,
            trade_fiat_amount_requested_in_usd: self.trade_fiat_amount_requested_in_usd,
            offer_hash: non_empty(self.offer_hash),
            offer_authorized: self.offer_authorized,
            offer_owner_id: self.offer_owner_id,
            offer_type: self.offer_type,
            offer_payment_method: self.offer_payment_method,
            offer_payment_method_slug: self.offer_payment_method_slug,
            offer_currency_code: self.offer_currency_code,
            message: self.message,
            feedback_type,
            created_at,
        })
    }
}

impl UpdateRequest {
    /// Same rules as creation, applied only to the fields that are present.
    pub fn validate(&self) -> ValidationErrors {
        let mut errs = ValidationErrors::new();
        check_parent_id(&mut errs, self.parent_id);
        if let Some(id) = self.sender_id { check_positive_id(&mut errs, "sender_id", SENDER_ID_MSG, id); }
        if let Some(id) = self.receiver_id { check_positive_id(&mut errs, "receiver_id", RECEIVER_ID_MSG, id); }
        if let Some(id) = self.trade_id { check_positive_id(&mut errs, "trade_id", TRADE_ID_MSG, id); }
        if let Some(ref message) = self.message { check_message(&mut errs, message); }
        if let Some(ref raw) = self.feedback_type { check_type(&mut errs, raw); }
        errs
    }
}

impl DeleteOfferRequest {
    /// Returns the effective offer deletion time (`None` means "now").
    pub fn validated_deleted_at(&self) -> Result<Option<DateTime<Utc>>, ValidationErrors> {
        let mut errs = ValidationErrors::new();
        if self.offer_hash.is_empty() {
            errs.add("offer_hash", "The offer_hash field is required!");
        }
        let deleted_at = check_timestamp(&mut errs, "deleted_at", self.deleted_at.as_deref());
        errs.into_result(|| deleted_at)
    }
}

impl ChangeTradeStatusRequest {
    pub fn validate(&self) -> ValidationErrors {
        let mut errs = ValidationErrors::new();
        if self.trade_hash.is_empty() {
            errs.add("trade_hash", "The trade_hash field is required!");
        }
        if self.trade_status.is_empty() {
            errs.add("trade_status", "The trade_status field is required!");
        }
        errs
    }
}
