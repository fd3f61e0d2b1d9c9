use {
    super::TimerIndex,
    crate::kernel::{
        entities::AuctionId,
        errors::AuctionError,
    },
    async_trait::async_trait,
    std::collections::{
        BTreeSet,
        HashMap,
    },
    time::OffsetDateTime,
    tokio::sync::Mutex,
    uuid::Uuid,
};

#[derive(Default)]
struct Inner {
    by_score: BTreeSet<(i64, AuctionId)>,
    scores:   HashMap<AuctionId, i64>,
}

/// Single-instance timer index ordered by expiration second.
pub struct MemoryTimerIndex {
    inner: Mutex<Inner>,
}

impl MemoryTimerIndex {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }
}

impl Default for MemoryTimerIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TimerIndex for MemoryTimerIndex {
    async fn schedule(
        &self,
        auction_id: AuctionId,
        end_time: OffsetDateTime,
    ) -> Result<(), AuctionError> {
        let score = end_time.unix_timestamp();
        let mut inner = self.inner.lock().await;
        if let Some(previous) = inner.scores.insert(auction_id, score) {
            inner.by_score.remove(&(previous, auction_id));
        }
        inner.by_score.insert((score, auction_id));
        Ok(())
    }

    async fn due(
        &self,
        now: OffsetDateTime,
        limit: usize,
    ) -> Result<Vec<AuctionId>, AuctionError> {
        let cutoff = (now.unix_timestamp(), Uuid::from_u128(u128::MAX));
        let inner = self.inner.lock().await;
        Ok(inner
            .by_score
            .range(..=cutoff)
            .take(limit)
            .map(|(_, auction_id)| *auction_id)
            .collect())
    }

    async fn remove(&self, auction_id: AuctionId) -> Result<(), AuctionError> {
        let mut inner = self.inner.lock().await;
        if let Some(score) = inner.scores.remove(&auction_id) {
            inner.by_score.remove(&(score, auction_id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        time::Duration,
    };

    #[tokio::test]
    async fn due_returns_only_expired_entries_in_score_order() {
        let index = MemoryTimerIndex::new();
        let now = OffsetDateTime::now_utc();
        let early = Uuid::new_v4();
        let later = Uuid::new_v4();
        let future = Uuid::new_v4();
        index.schedule(later, now - Duration::seconds(5)).await.unwrap();
        index.schedule(early, now - Duration::seconds(60)).await.unwrap();
        index.schedule(future, now + Duration::seconds(60)).await.unwrap();

        let due = index.due(now, 10).await.unwrap();
        assert_eq!(due, vec![early, later]);
    }

    #[tokio::test]
    async fn due_honors_the_batch_cap() {
        let index = MemoryTimerIndex::new();
        let now = OffsetDateTime::now_utc();
        for offset in 1..=20 {
            index
                .schedule(Uuid::new_v4(), now - Duration::seconds(offset))
                .await
                .unwrap();
        }
        assert_eq!(index.due(now, 10).await.unwrap().len(), 10);
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let index = MemoryTimerIndex::new();
        let now = OffsetDateTime::now_utc();
        let auction_id = Uuid::new_v4();
        index.schedule(auction_id, now).await.unwrap();
        index.remove(auction_id).await.unwrap();
        index.remove(auction_id).await.unwrap();
        assert!(index.due(now, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn rescheduling_overwrites_the_score() {
        let index = MemoryTimerIndex::new();
        let now = OffsetDateTime::now_utc();
        let auction_id = Uuid::new_v4();
        index.schedule(auction_id, now - Duration::seconds(1)).await.unwrap();
        index.schedule(auction_id, now + Duration::seconds(60)).await.unwrap();
        assert!(index.due(now, 10).await.unwrap().is_empty());
    }
}
