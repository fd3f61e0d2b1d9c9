use {
    crate::kernel::{
        entities::AuctionId,
        errors::AuctionError,
    },
    async_trait::async_trait,
    time::OffsetDateTime,
};

pub mod memory;
pub mod redis;

/// Ordered set of auctions scheduled to end, keyed by absolute expiration
/// instant. Owns only scheduling keys; the authoritative end time lives in
/// the store.
#[async_trait]
pub trait TimerIndex: Send + Sync {
    /// Enrolls the auction at `end_time`. Re-scheduling overwrites the score.
    async fn schedule(
        &self,
        auction_id: AuctionId,
        end_time: OffsetDateTime,
    ) -> Result<(), AuctionError>;

    /// Auctions whose expiration instant is at or before `now`, capped at
    /// `limit`. Entries stay in the index until removed.
    async fn due(&self, now: OffsetDateTime, limit: usize)
        -> Result<Vec<AuctionId>, AuctionError>;

    /// Idempotent; a no-op when another instance already removed the entry.
    async fn remove(&self, auction_id: AuctionId) -> Result<(), AuctionError>;
}
