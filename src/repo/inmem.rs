use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use super::*;
use crate::stats::{self, Adjustment, Delta, StatsLedger};

#[derive(Default, Clone)]
struct State {
    feedbacks: BTreeMap<Id, Feedback>,
    stats: StatsLedger,
    next_id: Id,
}

impl State {
    fn next_id(&mut self) -> Id {
        self.next_id += 1;
        self.next_id
    }

    fn live_ids(&self, selector: &FeedbackSelector) -> Vec<Id> {
        self.ids_matching(selector, |f| !f.is_deleted())
    }

    fn ids_matching(&self, selector: &FeedbackSelector, keep: impl Fn(&Feedback) -> bool) -> Vec<Id> {
        self.feedbacks
            .values()
            .filter(|f| match selector {
                FeedbackSelector::Id(id) => f.id == *id,
                FeedbackSelector::OfferHash(hash) => f.offer_hash.as_deref() == Some(hash.as_str()),
                FeedbackSelector::TradeHash(hash) => f.trade_hash.as_deref() == Some(hash.as_str()),
            })
            .filter(|f| keep(f))
            .map(|f| f.id)
            .collect()
    }

    fn row_mut(&mut self, id: Id) -> StoreResult<&mut Feedback> {
        self.feedbacks.get_mut(&id).ok_or(StoreError::NotFound)
    }
}

/// Process-local store with the same transactional contract as the Postgres one.
///
/// A write works on a staged copy of the state and swaps it in only when every
/// step succeeded; an error simply drops the copy.
///
/// Staging clones the whole state, so each write is O(rows). Fine for tests and
/// local runs; production goes through the Postgres store.
#[derive(Clone, Default)]
pub struct InMemFeedbackStore {
    state: Arc<RwLock<State>>,
}

impl InMemFeedbackStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn transaction<T>(&self, f: impl FnOnce(&mut State) -> StoreResult<T>) -> StoreResult<T> {
        let mut guard = self.state.write().map_err(|_| StoreError::Backend("state lock poisoned".into()))?;
        let mut staged = guard.clone();
        debug!("transaction start");
        match f(&mut staged) {
            Ok(out) => {
                *guard = staged;
                debug!("commit");
                Ok(out)
            }
            Err(e) => {
                debug!(error = %e, "rollback");
                Err(e)
            }
        }
    }

    fn read<T>(&self, f: impl FnOnce(&State) -> T) -> StoreResult<T> {
        let guard = self.state.read().map_err(|_| StoreError::Backend("state lock poisoned".into()))?;
        Ok(f(&guard))
    }
}

#[async_trait]
impl FeedbackStore for InMemFeedbackStore {
    async fn find_by_id(&self, id: Id) -> StoreResult<Feedback> {
        self.read(|s| s.feedbacks.get(&id).filter(|f| !f.is_deleted()).cloned())?
            .ok_or(StoreError::NotFound)
    }

    async fn find(&self, filter: &FeedbackFilter) -> StoreResult<FeedbackResponse> {
        self.read(|s| {
            let mut matched: Vec<&Feedback> = s.feedbacks.values().filter(|f| filter.matches(f)).collect();
            matched.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id))); // latest first
            let total = matched.len() as i64;
            let items = matched
                .into_iter()
                .skip(filter.offset as usize)
                .take(filter.limit as usize)
                .cloned()
                .collect();
            FeedbackResponse { total, items, offset: filter.offset, limit: filter.limit }
        })
    }

    async fn create(&self, request: FeedbackRequest) -> StoreResult<Id> {
        let new = request.into_new_feedback()?;
        let id = self.transaction(|s| {
            let id = s.next_id();
            let feedback = new.into_feedback(id, Utc::now());
            let (receiver_id, feedback_type) = (feedback.receiver_id, feedback.feedback_type);
            s.feedbacks.insert(id, feedback);
            s.stats.ensure_exists(receiver_id);
            s.stats.adjust(receiver_id, feedback_type, Delta::Increment)?;
            Ok(id)
        })?;
        record_op("create");
        Ok(id)
    }

    async fn update(&self, selector: &FeedbackSelector, request: UpdateRequest) -> StoreResult<()> {
        check_update(&request)?;
        self.transaction(|s| {
            let ids = s.live_ids(selector);
            if ids.is_empty() {
                return Err(StoreError::NotFound);
            }
            let now = Utc::now();
            for id in ids {
                let row = s.row_mut(id)?;
                let before = row.clone();
                request.apply_to(row, now);
                let after = row.clone();
                for adjustment in stats::moves(&before, &after) {
                    s.stats.apply(adjustment)?;
                }
            }
            Ok(())
        })?;
        record_op("update");
        Ok(())
    }

    async fn delete(&self, selector: &FeedbackSelector) -> StoreResult<()> {
        self.transaction(|s| {
            let ids = s.live_ids(selector);
            if ids.is_empty() {
                return Err(StoreError::NotFound);
            }
            let now = Utc::now();
            for id in ids {
                let row = s.row_mut(id)?;
                row.deleted_at = Some(now);
                row.updated_at = now;
                let adjustment = Adjustment { user_id: row.receiver_id, feedback_type: row.feedback_type, delta: Delta::Decrement };
                s.stats.apply(adjustment)?;
            }
            Ok(())
        })?;
        record_op("delete");
        Ok(())
    }

    async fn restore(&self, id: Id) -> StoreResult<()> {
        self.transaction(|s| {
            let row = s.row_mut(id)?;
            if !row.is_deleted() {
                return Err(StoreError::NotFound);
            }
            let now = Utc::now();
            row.deleted_at = None;
            row.updated_at = now;
            let adjustment = Adjustment { user_id: row.receiver_id, feedback_type: row.feedback_type, delta: Delta::Increment };
            s.stats.apply(adjustment)
        })?;
        record_op("restore");
        Ok(())
    }

    async fn delete_offer(&self, request: DeleteOfferRequest) -> StoreResult<()> {
        let now = Utc::now();
        let deleted_at = offer_deleted_at(&request, now)?;
        let selector = FeedbackSelector::OfferHash(request.offer_hash);
        self.transaction(|s| {
            for id in s.ids_matching(&selector, |_| true) {
                let row = s.row_mut(id)?;
                row.offer_deleted_at = Some(deleted_at);
                row.updated_at = now;
            }
            Ok(())
        })?;
        record_op("delete_offer");
        Ok(())
    }

    async fn change_trade_status(&self, request: ChangeTradeStatusRequest) -> StoreResult<()> {
        check_trade_status(&request)?;
        let selector = FeedbackSelector::TradeHash(request.trade_hash);
        self.transaction(|s| {
            let now = Utc::now();
            for id in s.ids_matching(&selector, |_| true) {
                let row = s.row_mut(id)?;
                row.trade_status = Some(request.trade_status.clone());
                row.updated_at = now;
            }
            Ok(())
        })?;
        record_op("change_trade_status");
        Ok(())
    }

    async fn stats(&self, user_id: Id) -> StoreResult<FeedbackStats> {
        self.read(|s| s.stats.get(user_id).cloned())?.ok_or(StoreError::NotFound)
    }
}
