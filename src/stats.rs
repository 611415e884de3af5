//! Per-receiver positive/negative counters.
//!
//! Both helpers run on the caller's transaction and never open one of their own.
//! `adjust` does not clamp: every `Increment` must be paired with a later
//! `Decrement` against the same row, otherwise counters drift.

use std::collections::HashMap;

use crate::models::{Feedback, FeedbackStats, FeedbackType, Id};
use crate::repo::{StoreError, StoreResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delta {
    Increment,
    Decrement,
}

impl Delta {
    pub fn value(self) -> i64 {
        match self {
            Delta::Increment => 1,
            Delta::Decrement => -1,
        }
    }
}

/// One counter movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Adjustment {
    pub user_id: Id,
    pub feedback_type: FeedbackType,
    pub delta: Delta,
}

/// Counter movements needed when a live row changes from `before` to `after`.
///
/// Ordered by user id so that concurrent writers touching the same two stats
/// rows lock them in the same order.
pub fn moves(before: &Feedback, after: &Feedback) -> Vec<Adjustment> {
    if before.receiver_id == after.receiver_id && before.feedback_type == after.feedback_type {
        return Vec::new();
    }
    let mut out = vec![
        Adjustment { user_id: before.receiver_id, feedback_type: before.feedback_type, delta: Delta::Decrement },
        Adjustment { user_id: after.receiver_id, feedback_type: after.feedback_type, delta: Delta::Increment },
    ];
    out.sort_by_key(|a| a.user_id);
    out
}

/// In-memory `feedback_stats` table.
#[derive(Debug, Clone, Default)]
pub struct StatsLedger {
    rows: HashMap<Id, FeedbackStats>,
}

impl StatsLedger {
    /// Returns true when a row was created.
    pub fn ensure_exists(&mut self, user_id: Id) -> bool {
        if self.rows.contains_key(&user_id) {
            return false;
        }
        self.rows.insert(user_id, FeedbackStats::empty(user_id));
        true
    }

    pub fn adjust(&mut self, user_id: Id, feedback_type: FeedbackType, delta: Delta) -> StoreResult<()> {
        let row = self.rows.get_mut(&user_id).ok_or(StoreError::StatsRowMissing(user_id))?;
        *row.counter_mut(feedback_type) += delta.value();
        Ok(())
    }

    pub fn apply(&mut self, adjustment: Adjustment) -> StoreResult<()> {
        if adjustment.delta == Delta::Increment {
            self.ensure_exists(adjustment.user_id);
        }
        self.adjust(adjustment.user_id, adjustment.feedback_type, adjustment.delta)
    }

    pub fn get(&self, user_id: Id) -> Option<&FeedbackStats> {
        self.rows.get(&user_id)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn remove(&mut self, user_id: Id) {
        self.rows.remove(&user_id);
    }
}

#[cfg(feature = "postgres-store")]
pub mod pg {
    use sqlx::PgConnection;
    use tracing::debug;

    use super::{Adjustment, Delta};
    use crate::models::{FeedbackType, Id};
    use crate::repo::{StoreError, StoreResult};

    /// Lookup-then-insert. The insert tolerates a concurrent first writer, so two
    /// transactions racing on a new receiver still leave exactly one row.
    pub async fn ensure_exists(conn: &mut PgConnection, user_id: Id) -> StoreResult<bool> {
        let found: Option<Id> = sqlx::query_scalar("SELECT user_id FROM feedback_stats WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&mut *conn)
            .await?;
        if found.is_some() {
            return Ok(false);
        }
        debug!(user_id, "creating stats row");
        let inserted = sqlx::query(
            "INSERT INTO feedback_stats (user_id, positive, negative) VALUES ($1, 0, 0) ON CONFLICT (user_id) DO NOTHING",
        )
        .bind(user_id)
        .execute(&mut *conn)
        .await?;
        Ok(inserted.rows_affected() == 1)
    }

    pub async fn adjust(conn: &mut PgConnection, user_id: Id, feedback_type: FeedbackType, delta: Delta) -> StoreResult<()> {
        // column comes from the closed enum, never from request text
        let sql = match feedback_type {
            FeedbackType::Positive => "UPDATE feedback_stats SET positive = positive + $2, updated_at = now() WHERE user_id = $1",
            FeedbackType::Negative => "UPDATE feedback_stats SET negative = negative + $2, updated_at = now() WHERE user_id = $1",
        };
        let res = sqlx::query(sql)
            .bind(user_id)
            .bind(delta.value())
            .execute(&mut *conn)
            .await?;
        if res.rows_affected() != 1 {
            return Err(StoreError::StatsRowMissing(user_id));
        }
        Ok(())
    }

    pub async fn apply(conn: &mut PgConnection, adjustment: Adjustment) -> StoreResult<()> {
        if adjustment.delta == Delta::Increment {
            ensure_exists(&mut *conn, adjustment.user_id).await?;
        }
        adjust(conn, adjustment.user_id, adjustment.feedback_type, adjustment.delta).await
    }
}
