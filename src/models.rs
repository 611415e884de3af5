use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use utoipa::{IntoParams, ToSchema};

pub type Id = i64;

/// Wire format for every timestamp the service accepts or emits.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub const DEFAULT_LIMIT: i64 = 10;
pub const MAX_LIMIT: i64 = 1000;

/// Polarity of a feedback. Each variant owns exactly one counter column in `feedback_stats`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackType {
    Positive,
    Negative,
}

impl FeedbackType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedbackType::Positive => "positive",
            FeedbackType::Negative => "negative",
        }
    }
}

impl fmt::Display for FeedbackType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown feedback type '{0}'")]
pub struct UnknownFeedbackType(pub String);

impl FromStr for FeedbackType {
    type Err = UnknownFeedbackType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "positive" => Ok(FeedbackType::Positive),
            "negative" => Ok(FeedbackType::Negative),
            other => Err(UnknownFeedbackType(other.to_string())),
        }
    }
}

impl TryFrom<String> for FeedbackType {
    type Error = UnknownFeedbackType;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Feedback {
    pub id: Id,
    pub parent_id: Option<Id>,
    pub sender_id: Id,
    pub sender_name: Option<String>,
    pub sender_avatar: Option<String>,
    pub receiver_id: Id,
    pub receiver_name: Option<String>,
    pub receiver_avatar: Option<String>,
    pub trade_id: Id,
    pub trade_hash: Option<String>,
    pub trade_status: Option<String>,
    pub trade_fiat_amount_requested_in_usd: Option<String>,
    pub offer_hash: Option<String>,
    pub offer_authorized: bool,
    pub offer_owner_id: Option<Id>,
    pub offer_type: Option<String>,
    pub offer_payment_method: Option<String>,
    pub offer_payment_method_slug: Option<String>,
    pub offer_currency_code: Option<String>,
    #[serde(with = "timestamp::option")]
    #[schema(value_type = Option<String>, example = "2021-09-06 05:01:43")]
    pub offer_deleted_at: Option<DateTime<Utc>>, // soft-deletes the offer only
    pub message: String,
    #[serde(rename = "type")]
    #[sqlx(try_from = "String")]
    pub feedback_type: FeedbackType,
    #[serde(with = "timestamp")]
    #[schema(value_type = String, example = "2021-09-06 05:01:43")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    #[schema(value_type = String, example = "2021-09-06 05:01:43")]
    pub updated_at: DateTime<Utc>,
    #[serde(with = "timestamp::option")]
    #[schema(value_type = Option<String>)]
    pub deleted_at: Option<DateTime<Utc>>, // soft delete marker
}

impl Feedback {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Per-receiver running totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct FeedbackStats {
    pub user_id: Id,
    pub positive: i64,
    pub negative: i64,
}

impl FeedbackStats {
    pub fn empty(user_id: Id) -> Self {
        Self { user_id, positive: 0, negative: 0 }
    }

    pub fn counter(&self, feedback_type: FeedbackType) -> i64 {
        match feedback_type {
            FeedbackType::Positive => self.positive,
            FeedbackType::Negative => self.negative,
        }
    }

    pub fn counter_mut(&mut self, feedback_type: FeedbackType) -> &mut i64 {
        match feedback_type {
            FeedbackType::Positive => &mut self.positive,
            FeedbackType::Negative => &mut self.negative,
        }
    }
}

/// Create payload, shared by `POST /feedback` and the `create-action` queue message.
///
/// Scalars default to their zero value so that a missing field surfaces as a
/// validation error rather than a decode failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct FeedbackRequest {
    pub parent_id: Option<Id>,
    #[serde(deserialize_with = "null_as_default")]
    pub sender_id: Id,
    pub sender_name: Option<String>,
    pub sender_avatar: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub receiver_id: Id,
    pub receiver_name: Option<String>,
    pub receiver_avatar: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub trade_id: Id,
    pub trade_hash: Option<String>,
    pub trade_status: Option<String>,
    pub trade_fiat_amount_requested_in_usd: Option<String>,
    pub offer_hash: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub offer_authorized: bool,
    pub offer_owner_id: Option<Id>,
    pub offer_type: Option<String>,
    pub offer_payment_method: Option<String>,
    pub offer_payment_method_slug: Option<String>,
    pub offer_currency_code: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub message: String,
    #[serde(rename = "type", deserialize_with = "null_as_default")]
    pub feedback_type: String,
    #[schema(example = "2021-09-06 05:01:43")]
    pub created_at: Option<String>,
}

/// `null` decodes like an absent field, so it reaches validation instead of failing the decode.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A create request that passed validation, with typed fields ready for insertion.
#[derive(Debug, Clone)]
pub struct NewFeedback {
    pub parent_id: Option<Id>,
    pub sender_id: Id,
    pub sender_name: Option<String>,
    pub sender_avatar: Option<String>,
    pub receiver_id: Id,
    pub receiver_name: Option<String>,
    pub receiver_avatar: Option<String>,
    pub trade_id: Id,
    pub trade_hash: Option<String>,
    pub trade_status: Option<String>,
    pub trade_fiat_amount_requested_in_usd: Option<String>,
    pub offer_hash: Option<String>,
    pub offer_authorized: bool,
    pub offer_owner_id: Option<Id>,
    pub offer_type: Option<String>,
    pub offer_payment_method: Option<String>,
    pub offer_payment_method_slug: Option<String>,
    pub offer_currency_code: Option<String>,
    pub message: String,
    pub feedback_type: FeedbackType,
    pub created_at: Option<DateTime<Utc>>,
}

impl NewFeedback {
    /// Materialise the row an insert would produce.
    pub fn into_feedback(self, id: Id, now: DateTime<Utc>) -> Feedback {
        Feedback {
            id,
            parent_id: self.parent_id,
            sender_id: self.sender_id,
            sender_name: self.sender_name,
            sender_avatar: self.sender_avatar,
            receiver_id: self.receiver_id,
            receiver_name: self.receiver_name,
            receiver_avatar: self.receiver_avatar,
            trade_id: self.trade_id,
            trade_hash: self.trade_hash,
            trade_status: self.trade_status,
            trade_fiat_amount_requested_in_usd: self.trade_fiat_amount_requested_in_usd,
            offer_hash: self.offer_hash,
            offer_authorized: self.offer_authorized,
            offer_owner_id: self.offer_owner_id,
            offer_type: self.offer_type,
            offer_payment_method: self.offer_payment_method,
            offer_payment_method_slug: self.offer_payment_method_slug,
            offer_currency_code: self.offer_currency_code,
            offer_deleted_at: None,
            message: self.message,
            feedback_type: self.feedback_type,
            created_at: self.created_at.unwrap_or(now),
            updated_at: now,
            deleted_at: None,
        }
    }
}

/// Partial update. Absent fields keep their stored value.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct UpdateRequest {
    pub parent_id: Option<Id>,
    pub sender_id: Option<Id>,
    pub receiver_id: Option<Id>,
    pub trade_id: Option<Id>,
    pub trade_status: Option<String>,
    pub message: Option<String>,
    #[serde(rename = "type")]
    pub feedback_type: Option<String>,
}

impl UpdateRequest {
    /// Apply the present fields to `feedback`. Call only after `validate` came back empty.
    pub fn apply_to(&self, feedback: &mut Feedback, now: DateTime<Utc>) {
        if let Some(parent_id) = self.parent_id {
            feedback.parent_id = (parent_id > 0).then_some(parent_id);
        }
        if let Some(sender_id) = self.sender_id { feedback.sender_id = sender_id; }
        if let Some(receiver_id) = self.receiver_id { feedback.receiver_id = receiver_id; }
        if let Some(trade_id) = self.trade_id { feedback.trade_id = trade_id; }
        if let Some(ref status) = self.trade_status { feedback.trade_status = Some(status.clone()); }
        if let Some(ref message) = self.message { feedback.message = message.clone(); }
        if let Some(feedback_type) = self.feedback_type.as_deref().and_then(|t| t.parse().ok()) {
            feedback.feedback_type = feedback_type;
        }
        feedback.updated_at = now;
    }
}

/// How a write addresses its target rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedbackSelector {
    Id(Id),
    OfferHash(String),
    TradeHash(String),
}

impl fmt::Display for FeedbackSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedbackSelector::Id(id) => write!(f, "id={id}"),
            FeedbackSelector::OfferHash(hash) => write!(f, "offer_hash={hash}"),
            FeedbackSelector::TradeHash(hash) => write!(f, "trade_hash={hash}"),
        }
    }
}

/// Delete payload: one feedback by id, or every feedback of an offer / trade.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct DeleteRequest {
    pub feedback_id: Option<Id>,
    pub offer_hash: Option<String>,
    pub trade_hash: Option<String>,
}

impl DeleteRequest {
    /// `feedback_id` wins over the hashes; empty hashes count as absent.
    pub fn selector(&self) -> Option<FeedbackSelector> {
        if let Some(id) = self.feedback_id {
            return Some(FeedbackSelector::Id(id));
        }
        if let Some(hash) = self.offer_hash.as_ref().filter(|h| !h.is_empty()) {
            return Some(FeedbackSelector::OfferHash(hash.clone()));
        }
        self.trade_hash
            .as_ref()
            .filter(|h| !h.is_empty())
            .map(|h| FeedbackSelector::TradeHash(h.clone()))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct DeleteOfferRequest {
    pub offer_hash: String,
    #[schema(example = "2021-09-06 05:01:43")]
    pub deleted_at: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct ChangeTradeStatusRequest {
    pub trade_hash: String,
    pub trade_status: String,
}

/// Raw `GET /feedbacks` query string.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct FeedbackQuery {
    #[serde(default, deserialize_with = "blank_as_none")]
    pub sender_id: Option<Id>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub receiver_id: Option<Id>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub trade_id: Option<Id>,
    pub offer_hash: Option<String>,
    pub trade_hash: Option<String>,
    /// `1` or `true` includes soft-deleted rows
    pub with_trashed: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub offset: Option<i64>,
    /// Defaults to 10, capped at 1000
    #[serde(default, deserialize_with = "blank_as_none")]
    pub limit: Option<i64>,
}

/// `?limit=` means "not given"; anything else must parse.
fn blank_as_none<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        Some(raw) if !raw.trim().is_empty() => raw.trim().parse().map(Some).map_err(serde::de::Error::custom),
        _ => Ok(None),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedbackFilter {
    pub sender_id: Option<Id>,
    pub receiver_id: Option<Id>,
    pub trade_id: Option<Id>,
    pub offer_hash: Option<String>,
    pub trade_hash: Option<String>,
    pub with_trashed: bool,
    pub offset: i64,
    pub limit: i64,
}

impl Default for FeedbackFilter {
    fn default() -> Self {
        Self {
            sender_id: None,
            receiver_id: None,
            trade_id: None,
            offer_hash: None,
            trade_hash: None,
            with_trashed: false,
            offset: 0,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl FeedbackFilter {
    pub fn clamp_limit(requested: Option<i64>) -> i64 {
        requested.unwrap_or(DEFAULT_LIMIT).clamp(0, MAX_LIMIT)
    }

    pub fn matches(&self, feedback: &Feedback) -> bool {
        if !self.with_trashed && feedback.is_deleted() { return false; }
        if self.sender_id.is_some_and(|id| id != feedback.sender_id) { return false; }
        if self.receiver_id.is_some_and(|id| id != feedback.receiver_id) { return false; }
        if self.trade_id.is_some_and(|id| id != feedback.trade_id) { return false; }
        if self.offer_hash.is_some() && self.offer_hash != feedback.offer_hash { return false; }
        if self.trade_hash.is_some() && self.trade_hash != feedback.trade_hash { return false; }
        true
    }
}

impl From<FeedbackQuery> for FeedbackFilter {
    fn from(q: FeedbackQuery) -> Self {
        let with_trashed = q
            .with_trashed
            .as_deref()
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        Self {
            // ids start at 1; 0 selects nothing and means "no filter"
            sender_id: q.sender_id.filter(|id| *id > 0),
            receiver_id: q.receiver_id.filter(|id| *id > 0),
            trade_id: q.trade_id.filter(|id| *id > 0),
            offer_hash: q.offer_hash.filter(|h| !h.is_empty()),
            trade_hash: q.trade_hash.filter(|h| !h.is_empty()),
            with_trashed,
            offset: q.offset.unwrap_or(0).max(0),
            limit: Self::clamp_limit(q.limit),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FeedbackResponse {
    pub total: i64,
    pub items: Vec<Feedback>,
    pub offset: i64,
    pub limit: i64,
}

/// `YYYY-MM-DD HH:MM:SS` (UTC) serde adapters.
pub mod timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    use super::TIMESTAMP_FORMAT;

    pub fn parse(value: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
        NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT).map(|naive| naive.and_utc())
    }

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&value.format(TIMESTAMP_FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).map_err(serde::de::Error::custom)
    }

    pub mod option {
        use chrono::{DateTime, Utc};
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error> {
            match value {
                Some(v) => super::serialize(v, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error> {
            Option::<String>::deserialize(deserializer)?
                .map(|raw| super::parse(&raw).map_err(serde::de::Error::custom))
                .transpose()
        }
    }
}
