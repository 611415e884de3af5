use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgConnection, Pool, Postgres, QueryBuilder};
use tracing::{debug, warn};

use super::*;
use crate::stats::{self, Adjustment, Delta};

const FEEDBACK_COLUMNS: &str = "id, parent_id, sender_id, sender_name, sender_avatar, \
    receiver_id, receiver_name, receiver_avatar, trade_id, trade_hash, trade_status, \
    trade_fiat_amount_requested_in_usd, offer_hash, offer_authorized, offer_owner_id, offer_type, \
    offer_payment_method, offer_payment_method_slug, offer_currency_code, offer_deleted_at, \
    message, feedback_type, created_at, updated_at, deleted_at";

#[derive(Clone)]
pub struct PgFeedbackStore { pool: Pool<Postgres> }

impl PgFeedbackStore {
    pub fn new(pool: Pool<Postgres>) -> Self { Self { pool } }

    pub fn pool(&self) -> &Pool<Postgres> { &self.pool }
}

/// Append `WHERE ...` for the selector. Locks the rows when `for_update` is set.
fn select_rows<'a>(selector: &'a FeedbackSelector, live_only: bool, for_update: bool) -> QueryBuilder<'a, Postgres> {
    let mut qb = QueryBuilder::new(format!("SELECT {FEEDBACK_COLUMNS} FROM feedbacks WHERE "));
    match selector {
        FeedbackSelector::Id(id) => { qb.push("id = ").push_bind(*id); }
        FeedbackSelector::OfferHash(hash) => { qb.push("offer_hash = ").push_bind(hash.as_str()); }
        FeedbackSelector::TradeHash(hash) => { qb.push("trade_hash = ").push_bind(hash.as_str()); }
    }
    if live_only {
        qb.push(" AND deleted_at IS NULL");
    }
    qb.push(" ORDER BY id");
    if for_update {
        qb.push(" FOR UPDATE");
    }
    qb
}

fn push_filter<'a>(qb: &mut QueryBuilder<'a, Postgres>, filter: &'a FeedbackFilter) {
    qb.push(" WHERE 1=1");
    if !filter.with_trashed {
        qb.push(" AND deleted_at IS NULL");
    }
    if let Some(id) = filter.sender_id { qb.push(" AND sender_id = ").push_bind(id); }
    if let Some(id) = filter.receiver_id { qb.push(" AND receiver_id = ").push_bind(id); }
    if let Some(id) = filter.trade_id { qb.push(" AND trade_id = ").push_bind(id); }
    if let Some(ref hash) = filter.offer_hash { qb.push(" AND offer_hash = ").push_bind(hash.as_str()); }
    if let Some(ref hash) = filter.trade_hash { qb.push(" AND trade_hash = ").push_bind(hash.as_str()); }
}

async fn lock_rows(conn: &mut PgConnection, selector: &FeedbackSelector, live_only: bool) -> StoreResult<Vec<Feedback>> {
    let mut qb = select_rows(selector, live_only, true);
    let rows = qb.build_query_as::<Feedback>().fetch_all(&mut *conn).await?;
    Ok(rows)
}

#[async_trait]
impl FeedbackStore for PgFeedbackStore {
    async fn find_by_id(&self, id: Id) -> StoreResult<Feedback> {
        let selector = FeedbackSelector::Id(id);
        let mut qb = select_rows(&selector, true, false);
        let row = qb.build_query_as::<Feedback>().fetch_optional(&self.pool).await?;
        row.ok_or(StoreError::NotFound)
    }

    async fn find(&self, filter: &FeedbackFilter) -> StoreResult<FeedbackResponse> {
        let mut count = QueryBuilder::new("SELECT COUNT(*) FROM feedbacks");
        push_filter(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut page = QueryBuilder::new(format!("SELECT {FEEDBACK_COLUMNS} FROM feedbacks"));
        push_filter(&mut page, filter);
        page.push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(filter.limit)
            .push(" OFFSET ")
            .push_bind(filter.offset);
        let items = page.build_query_as::<Feedback>().fetch_all(&self.pool).await?;

        Ok(FeedbackResponse { total, items, offset: filter.offset, limit: filter.limit })
    }

    async fn create(&self, request: FeedbackRequest) -> StoreResult<Id> {
        let new = request.into_new_feedback()?;
        let mut tx = self.pool.begin().await?;
        debug!("transaction start");
        let id: Id = sqlx::query_scalar(
            r#"INSERT INTO feedbacks (parent_id, sender_id, sender_name, sender_avatar,
                   receiver_id, receiver_name, receiver_avatar, trade_id, trade_hash, trade_status,
                   trade_fiat_amount_requested_in_usd, offer_hash, offer_authorized, offer_owner_id,
                   offer_type, offer_payment_method, offer_payment_method_slug, offer_currency_code,
                   message, feedback_type, created_at, updated_at)
               VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18,$19,$20,
                       COALESCE($21, now()), now())
               RETURNING id"#,
        )
        .bind(new.parent_id)
        .bind(new.sender_id)
        .bind(&new.sender_name)
        .bind(&new.sender_avatar)
        .bind(new.receiver_id)
        .bind(&new.receiver_name)
        .bind(&new.receiver_avatar)
        .bind(new.trade_id)
        .bind(&new.trade_hash)
        .bind(&new.trade_status)
        .bind(&new.trade_fiat_amount_requested_in_usd)
        .bind(&new.offer_hash)
        .bind(new.offer_authorized)
        .bind(new.offer_owner_id)
        .bind(&new.offer_type)
        .bind(&new.offer_payment_method)
        .bind(&new.offer_payment_method_slug)
        .bind(&new.offer_currency_code)
        .bind(&new.message)
        .bind(new.feedback_type.as_str())
        .bind(new.created_at)
        .fetch_one(&mut *tx)
        .await?;

        stats::pg::ensure_exists(&mut tx, new.receiver_id).await?;
        stats::pg::adjust(&mut tx, new.receiver_id, new.feedback_type, Delta::Increment).await?;

        tx.commit().await?;
        debug!(id, "commit");
        record_op("create");
        Ok(id)
    }

    async fn update(&self, selector: &FeedbackSelector, request: UpdateRequest) -> StoreResult<()> {
        check_update(&request)?;
        let mut tx = self.pool.begin().await?;
        debug!(%selector, "transaction start");
        let rows = lock_rows(&mut tx, selector, true).await?;
        if rows.is_empty() {
            return Err(StoreError::NotFound); // tx dropped -> rollback
        }
        let now = Utc::now();
        for before in rows {
            let mut after = before.clone();
            request.apply_to(&mut after, now);
            sqlx::query(
                r#"UPDATE feedbacks SET parent_id = $2, sender_id = $3, receiver_id = $4, trade_id = $5,
                       trade_status = $6, message = $7, feedback_type = $8, updated_at = $9
                   WHERE id = $1"#,
            )
            .bind(after.id)
            .bind(after.parent_id)
            .bind(after.sender_id)
            .bind(after.receiver_id)
            .bind(after.trade_id)
            .bind(&after.trade_status)
            .bind(&after.message)
            .bind(after.feedback_type.as_str())
            .bind(after.updated_at)
            .execute(&mut *tx)
            .await?;
            for adjustment in stats::moves(&before, &after) {
                stats::pg::apply(&mut tx, adjustment).await?;
            }
        }
        tx.commit().await?;
        debug!(%selector, "commit");
        record_op("update");
        Ok(())
    }

    async fn delete(&self, selector: &FeedbackSelector) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        debug!(%selector, "transaction start");
        let rows = lock_rows(&mut tx, selector, true).await?;
        if rows.is_empty() {
            return Err(StoreError::NotFound);
        }
        for row in rows {
            sqlx::query("UPDATE feedbacks SET deleted_at = now(), updated_at = now() WHERE id = $1")
                .bind(row.id)
                .execute(&mut *tx)
                .await?;
            let adjustment = Adjustment { user_id: row.receiver_id, feedback_type: row.feedback_type, delta: Delta::Decrement };
            stats::pg::apply(&mut tx, adjustment).await?;
        }
        tx.commit().await?;
        debug!(%selector, "commit");
        record_op("delete");
        Ok(())
    }

    async fn restore(&self, id: Id) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        let selector = FeedbackSelector::Id(id);
        let row = lock_rows(&mut tx, &selector, false)
            .await?
            .into_iter()
            .find(|f| f.is_deleted())
            .ok_or(StoreError::NotFound)?;
        sqlx::query("UPDATE feedbacks SET deleted_at = NULL, updated_at = now() WHERE id = $1")
            .bind(row.id)
            .execute(&mut *tx)
            .await?;
        let adjustment = Adjustment { user_id: row.receiver_id, feedback_type: row.feedback_type, delta: Delta::Increment };
        stats::pg::apply(&mut tx, adjustment).await?;
        tx.commit().await?;
        record_op("restore");
        Ok(())
    }

    async fn delete_offer(&self, request: DeleteOfferRequest) -> StoreResult<()> {
        let deleted_at = offer_deleted_at(&request, Utc::now())?;
        let mut tx = self.pool.begin().await?;
        let ids: Vec<Id> = sqlx::query_scalar("SELECT id FROM feedbacks WHERE offer_hash = $1 ORDER BY id FOR UPDATE")
            .bind(&request.offer_hash)
            .fetch_all(&mut *tx)
            .await?;
        for id in &ids {
            if let Err(e) = sqlx::query("UPDATE feedbacks SET offer_deleted_at = $2, updated_at = now() WHERE id = $1")
                .bind(id)
                .bind(deleted_at)
                .execute(&mut *tx)
                .await
            {
                warn!(offer_hash = %request.offer_hash, id, error = %e, "offer delete failed; rolling back");
                return Err(e.into());
            }
        }
        tx.commit().await?;
        debug!(offer_hash = %request.offer_hash, rows = ids.len(), "offer marked deleted");
        record_op("delete_offer");
        Ok(())
    }

    async fn change_trade_status(&self, request: ChangeTradeStatusRequest) -> StoreResult<()> {
        check_trade_status(&request)?;
        let mut tx = self.pool.begin().await?;
        let ids: Vec<Id> = sqlx::query_scalar("SELECT id FROM feedbacks WHERE trade_hash = $1 ORDER BY id FOR UPDATE")
            .bind(&request.trade_hash)
            .fetch_all(&mut *tx)
            .await?;
        for id in &ids {
            if let Err(e) = sqlx::query("UPDATE feedbacks SET trade_status = $2, updated_at = now() WHERE id = $1")
                .bind(id)
                .bind(&request.trade_status)
                .execute(&mut *tx)
                .await
            {
                warn!(trade_hash = %request.trade_hash, id, error = %e, "trade status update failed; rolling back");
                return Err(e.into());
            }
        }
        tx.commit().await?;
        debug!(trade_hash = %request.trade_hash, rows = ids.len(), "trade status changed");
        record_op("change_trade_status");
        Ok(())
    }

    async fn stats(&self, user_id: Id) -> StoreResult<FeedbackStats> {
        sqlx::query_as::<_, FeedbackStats>("SELECT user_id, positive, negative FROM feedback_stats WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound)
    }
}
