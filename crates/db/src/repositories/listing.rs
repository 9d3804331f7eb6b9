use async_trait::async_trait;
use sqlx::{sqlite::SqliteRow, Row};

use haggle_core::domain::listing::{Aggressiveness, Listing, ListingId, ListingStatus};

use super::session::parse_decimal;
use super::{ListingRepository, RepositoryError};
use crate::DbPool;

pub struct SqlListingRepository {
    pool: DbPool,
}

impl SqlListingRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ListingRepository for SqlListingRepository {
    async fn find_by_id(&self, id: &ListingId) -> Result<Option<Listing>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT id, title, asking_price, minimum_price, aggressiveness, status
            FROM listings
            WHERE id = ?
            "#,
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|value| listing_from_row(&value)).transpose()
    }

    async fn save(&self, listing: Listing) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO listings (id, title, asking_price, minimum_price, aggressiveness, status)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                asking_price = excluded.asking_price,
                minimum_price = excluded.minimum_price,
                aggressiveness = excluded.aggressiveness,
                status = excluded.status
            "#,
        )
        .bind(&listing.id.0)
        .bind(&listing.title)
        .bind(listing.asking_price.to_string())
        .bind(listing.minimum_price.map(|floor| floor.to_string()))
        .bind(listing.aggressiveness.as_str())
        .bind(listing.status.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn listing_from_row(row: &SqliteRow) -> Result<Listing, RepositoryError> {
    let aggressiveness_raw: String = row.try_get("aggressiveness")?;
    let aggressiveness = Aggressiveness::parse(&aggressiveness_raw).ok_or_else(|| {
        RepositoryError::Decode(format!("invalid listing aggressiveness: {}", aggressiveness_raw))
    })?;

    let status_raw: String = row.try_get("status")?;
    let status = ListingStatus::parse(&status_raw).ok_or_else(|| {
        RepositoryError::Decode(format!("invalid listing status: {}", status_raw))
    })?;

    let minimum_price = row
        .try_get::<Option<String>, _>("minimum_price")?
        .as_deref()
        .map(|value| parse_decimal("listing minimum_price", value))
        .transpose()?;

    Ok(Listing {
        id: ListingId(row.try_get("id")?),
        title: row.try_get("title")?,
        asking_price: parse_decimal(
            "listing asking_price",
            &row.try_get::<String, _>("asking_price")?,
        )?,
        minimum_price,
        aggressiveness,
        status,
    })
}
