use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use sqlx::{sqlite::SqliteRow, Row};
use uuid::Uuid;

use haggle_core::domain::listing::ListingId;
use haggle_core::domain::session::{
    BuyerId, NegotiationSession, Round, RoundDecision, SessionId, SessionStatus,
};

use super::{RepositoryError, SessionRepository};
use crate::DbPool;

pub struct SqlSessionRepository {
    pool: DbPool,
}

impl SqlSessionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn find_latest_for_pair(
        &self,
        listing_id: &ListingId,
        buyer_id: &BuyerId,
    ) -> Result<Option<NegotiationSession>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT id, listing_id, buyer_id, status, current_offer, version, created_at, updated_at
            FROM negotiation_sessions
            WHERE listing_id = ? AND buyer_id = ?
            ORDER BY created_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(&listing_id.0)
        .bind(&buyer_id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let session = session_from_row(&row)?;
                Ok(Some(self.hydrate_rounds(session).await?))
            }
            None => Ok(None),
        }
    }

    async fn hydrate_rounds(
        &self,
        mut session: NegotiationSession,
    ) -> Result<NegotiationSession, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT occurred_at, buyer_offer, decision, counter_amount, counter_expires_at, is_final
            FROM negotiation_rounds
            WHERE session_id = ?
            ORDER BY round_number ASC
            "#,
        )
        .bind(&session.id.0)
        .fetch_all(&self.pool)
        .await?;

        session.rounds = rows.iter().map(round_from_row).collect::<Result<Vec<_>, _>>()?;
        Ok(session)
    }

    async fn insert_session(
        &self,
        listing_id: &ListingId,
        buyer_id: &BuyerId,
        now: DateTime<Utc>,
    ) -> Result<NegotiationSession, RepositoryError> {
        let session = NegotiationSession::new(listing_id.clone(), buyer_id.clone(), now);

        sqlx::query(
            r#"
            INSERT INTO negotiation_sessions (
                id, listing_id, buyer_id, status, current_offer, version, created_at, updated_at
            ) VALUES (?, ?, ?, ?, NULL, 0, ?, ?)
            "#,
        )
        .bind(&session.id.0)
        .bind(&listing_id.0)
        .bind(&buyer_id.0)
        .bind(session.status.as_str())
        .bind(session.created_at.to_rfc3339())
        .bind(session.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(session)
    }

    async fn expire_session(
        &self,
        session_id: &SessionId,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            UPDATE negotiation_sessions
            SET status = 'expired', version = version + 1, updated_at = ?
            WHERE id = ? AND status IN ('active', 'negotiating')
            "#,
        )
        .bind(now.to_rfc3339())
        .bind(&session_id.0)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl SessionRepository for SqlSessionRepository {
    async fn find_by_id(
        &self,
        id: &SessionId,
    ) -> Result<Option<NegotiationSession>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT id, listing_id, buyer_id, status, current_offer, version, created_at, updated_at
            FROM negotiation_sessions
            WHERE id = ?
            "#,
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let session = session_from_row(&row)?;
                Ok(Some(self.hydrate_rounds(session).await?))
            }
            None => Ok(None),
        }
    }

    async fn get_or_create(
        &self,
        listing_id: &ListingId,
        buyer_id: &BuyerId,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<NegotiationSession, RepositoryError> {
        let Some(existing) = self.find_latest_for_pair(listing_id, buyer_id).await? else {
            return self.insert_session(listing_id, buyer_id, now).await;
        };

        if existing.is_stale(now, ttl) {
            self.expire_session(&existing.id, now).await?;
            return self.insert_session(listing_id, buyer_id, now).await;
        }

        match existing.status {
            SessionStatus::Active | SessionStatus::Negotiating => Ok(existing),
            SessionStatus::OfferAccepted | SessionStatus::Declined => {
                let reopened = sqlx::query(
                    r#"
                    UPDATE negotiation_sessions
                    SET status = 'active', version = version + 1, updated_at = ?
                    WHERE id = ? AND version = ?
                    "#,
                )
                .bind(now.to_rfc3339())
                .bind(&existing.id.0)
                .bind(existing.version)
                .execute(&self.pool)
                .await?;

                if reopened.rows_affected() == 0 {
                    return Err(RepositoryError::VersionConflict {
                        session_id: existing.id.0.clone(),
                    });
                }

                self.find_by_id(&existing.id).await?.ok_or_else(|| {
                    RepositoryError::Decode(format!(
                        "session {} disappeared during reopen",
                        existing.id.0
                    ))
                })
            }
            SessionStatus::Expired => self.insert_session(listing_id, buyer_id, now).await,
        }
    }

    async fn append_round(
        &self,
        session_id: &SessionId,
        expected_version: i64,
        round: Round,
        new_status: SessionStatus,
        current_offer: Decimal,
    ) -> Result<NegotiationSession, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE negotiation_sessions
            SET status = ?, current_offer = ?, version = version + 1, updated_at = ?
            WHERE id = ? AND version = ?
            "#,
        )
        .bind(new_status.as_str())
        .bind(current_offer.to_string())
        .bind(round.occurred_at.to_rfc3339())
        .bind(&session_id.0)
        .bind(expected_version)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            // Dropping the transaction rolls it back; nothing was applied.
            return Err(RepositoryError::VersionConflict { session_id: session_id.0.clone() });
        }

        let prior_rounds: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM negotiation_rounds WHERE session_id = ?")
                .bind(&session_id.0)
                .fetch_one(&mut *tx)
                .await?;

        sqlx::query(
            r#"
            INSERT INTO negotiation_rounds (
                id, session_id, round_number, occurred_at, buyer_offer,
                decision, counter_amount, counter_expires_at, is_final
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&session_id.0)
        .bind(prior_rounds + 1)
        .bind(round.occurred_at.to_rfc3339())
        .bind(round.buyer_offer.to_string())
        .bind(round.decision.as_str())
        .bind(round.counter_amount.map(|amount| amount.to_string()))
        .bind(round.counter_expires_at.map(|deadline| deadline.to_rfc3339()))
        .bind(i64::from(round.is_final))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        self.find_by_id(session_id).await?.ok_or_else(|| {
            RepositoryError::Decode(format!("session {} disappeared during append", session_id.0))
        })
    }

    async fn mark_expired_before(&self, cutoff: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let swept = sqlx::query(
            r#"
            UPDATE negotiation_sessions
            SET status = 'expired', version = version + 1
            WHERE status IN ('active', 'negotiating') AND updated_at < ?
            "#,
        )
        .bind(cutoff.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(swept.rows_affected())
    }
}

fn session_from_row(row: &SqliteRow) -> Result<NegotiationSession, RepositoryError> {
    let status_raw: String = row.try_get("status")?;
    let status = SessionStatus::parse(&status_raw).ok_or_else(|| {
        RepositoryError::Decode(format!("invalid session status: {}", status_raw))
    })?;

    let current_offer = row
        .try_get::<Option<String>, _>("current_offer")?
        .as_deref()
        .map(|value| parse_decimal("session current_offer", value))
        .transpose()?;

    Ok(NegotiationSession {
        id: SessionId(row.try_get("id")?),
        listing_id: ListingId(row.try_get("listing_id")?),
        buyer_id: BuyerId(row.try_get("buyer_id")?),
        status,
        current_offer,
        rounds: Vec::new(),
        version: row.try_get("version")?,
        created_at: parse_rfc3339("session created_at", &row.try_get::<String, _>("created_at")?)?,
        updated_at: parse_rfc3339("session updated_at", &row.try_get::<String, _>("updated_at")?)?,
    })
}

fn round_from_row(row: &SqliteRow) -> Result<Round, RepositoryError> {
    let decision_raw: String = row.try_get("decision")?;
    let decision = RoundDecision::parse(&decision_raw).ok_or_else(|| {
        RepositoryError::Decode(format!("invalid round decision: {}", decision_raw))
    })?;

    let counter_amount = row
        .try_get::<Option<String>, _>("counter_amount")?
        .as_deref()
        .map(|value| parse_decimal("round counter_amount", value))
        .transpose()?;
    let counter_expires_at = row
        .try_get::<Option<String>, _>("counter_expires_at")?
        .as_deref()
        .map(|value| parse_rfc3339("round counter_expires_at", value))
        .transpose()?;

    Ok(Round {
        occurred_at: parse_rfc3339("round occurred_at", &row.try_get::<String, _>("occurred_at")?)?,
        buyer_offer: parse_decimal("round buyer_offer", &row.try_get::<String, _>("buyer_offer")?)?,
        decision,
        counter_amount,
        counter_expires_at,
        is_final: row.try_get::<i64, _>("is_final")? != 0,
    })
}

pub(crate) fn parse_decimal(field: &str, value: &str) -> Result<Decimal, RepositoryError> {
    value.parse::<Decimal>().map_err(|err| {
        RepositoryError::Decode(format!("invalid {} amount '{}': {}", field, value, err))
    })
}

pub(crate) fn parse_rfc3339(field: &str, value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value).map(|ts| ts.with_timezone(&Utc)).map_err(|err| {
        RepositoryError::Decode(format!("invalid {} timestamp '{}': {}", field, value, err))
    })
}
