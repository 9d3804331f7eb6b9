use rust_decimal::Decimal;

use haggle_core::domain::listing::{Aggressiveness, Listing, ListingId, ListingStatus};

use crate::repositories::{ListingRepository, RepositoryError, SqlListingRepository};
use crate::DbPool;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeedResult {
    pub listings_inserted: usize,
}

/// Deterministic demo catalog for local runs and smoke checks. Seeding is
/// idempotent: re-running overwrites the same rows.
pub fn demo_listings() -> Vec<Listing> {
    vec![
        Listing {
            id: ListingId("lst-demo-bike".to_string()),
            title: "Steel frame road bike".to_string(),
            asking_price: Decimal::new(100, 0),
            minimum_price: Some(Decimal::new(70, 0)),
            aggressiveness: Aggressiveness::Balanced,
            status: ListingStatus::Active,
        },
        Listing {
            id: ListingId("lst-demo-amp".to_string()),
            title: "Vintage tube amplifier".to_string(),
            asking_price: Decimal::new(450, 0),
            minimum_price: None,
            aggressiveness: Aggressiveness::Aggressive,
            status: ListingStatus::Active,
        },
        Listing {
            id: ListingId("lst-demo-desk".to_string()),
            title: "Oak writing desk".to_string(),
            asking_price: Decimal::new(220, 0),
            minimum_price: Some(Decimal::new(180, 0)),
            aggressiveness: Aggressiveness::Passive,
            status: ListingStatus::Sold,
        },
    ]
}

pub async fn seed_listings(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
    let repo = SqlListingRepository::new(pool.clone());
    let listings = demo_listings();
    let listings_inserted = listings.len();

    for listing in listings {
        repo.save(listing).await?;
    }

    Ok(SeedResult { listings_inserted })
}

#[cfg(test)]
mod tests {
    use haggle_core::domain::listing::ListingId;

    use crate::repositories::{ListingRepository, SqlListingRepository};
    use crate::{connect_with_settings, migrations};

    use super::seed_listings;

    #[tokio::test]
    async fn seeding_is_idempotent() {
        let pool = connect_with_settings("sqlite::memory:?cache=shared", 1, 30)
            .await
            .expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");

        let first = seed_listings(&pool).await.expect("first seed");
        let second = seed_listings(&pool).await.expect("second seed");
        assert_eq!(first, second);

        let repo = SqlListingRepository::new(pool.clone());
        let bike = repo
            .find_by_id(&ListingId("lst-demo-bike".to_string()))
            .await
            .expect("find seeded listing");
        assert!(bike.is_some());

        pool.close().await;
    }
}
