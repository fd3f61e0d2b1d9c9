use {
    super::Service,
    crate::{
        config::{
            EXPIRATION_BATCH,
            EXPIRATION_TICK,
        },
        kernel::errors::AuctionError,
        server::SHOULD_EXIT,
    },
    std::sync::atomic::Ordering,
    time::OffsetDateTime,
};

impl Service {
    /// Expiration worker: polls the timer index at ~1 Hz and finalizes due
    /// auctions. Runs on every instance; at-most-once finalization rests on
    /// the store transition, not on coordination between workers.
    pub async fn run_expiration_loop(&self) {
        tracing::info!("Starting expiration worker...");
        let mut tick = tokio::time::interval(EXPIRATION_TICK);
        while !SHOULD_EXIT.load(Ordering::Acquire) {
            tick.tick().await;
            self.expire_due_auctions().await;
        }
        tracing::info!("Shutting down expiration worker...");
    }

    /// One worker tick. The index entry is removed on successful
    /// finalization or when the auction is known to be terminal; transient
    /// failures leave it in place for the next tick.
    pub async fn expire_due_auctions(&self) {
        let now = OffsetDateTime::now_utc();
        let due = match self.timer_index.due(now, EXPIRATION_BATCH).await {
            Ok(due) => due,
            Err(err) => {
                tracing::error!(error = %err, "Failed to query due auctions");
                return;
            }
        };
        if !due.is_empty() {
            tracing::debug!(count = due.len(), "Found expired auctions");
        }

        for auction_id in due {
            match self.end_auction(auction_id).await {
                Ok(_) => {}
                Err(AuctionError::AuctionAlreadyEnded) | Err(AuctionError::AuctionNotFound) => {
                    // Another instance won the finalization; only the
                    // scheduling key is left to clean up.
                    if let Err(err) = self.timer_index.remove(auction_id).await {
                        tracing::warn!(
                            auction_id = %auction_id,
                            error = %err,
                            "Failed to drop stale timer index entry",
                        );
                    }
                }
                Err(err) => {
                    tracing::error!(
                        auction_id = %auction_id,
                        error = %err,
                        "Failed to end auction, retrying next tick",
                    );
                }
            }
        }
    }

    /// Re-enrolls every non-terminal auction on startup from the relational
    /// `(status, end_time)` index, so a wiped timer index cannot strand
    /// auctions past their deadline.
    pub async fn rebuild_timer_index(&self) -> Result<(), AuctionError> {
        let active = self.store.get_active_auctions().await?;
        let count = active.len();
        for auction in active {
            self.timer_index
                .schedule(auction.id, auction.end_time)
                .await?;
        }
        if count > 0 {
            tracing::info!(count, "Re-enrolled active auctions into the timer index");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            auction::{
                entities::{
                    Auction,
                    AuctionStatus,
                },
                repository::{
                    memory::MemoryDatabase,
                    Database,
                },
                service::Service,
            },
            broadcaster::{
                memory::MemoryBroadcaster,
                EventKind,
            },
            scheduler::memory::MemoryTimerIndex,
        },
        rust_decimal_macros::dec,
        std::sync::Arc,
        time::Duration,
        tokio::sync::mpsc,
        uuid::Uuid,
    };

    fn auction_ending_in(seconds: i64) -> Auction {
        let now = OffsetDateTime::now_utc();
        Auction {
            id:             Uuid::new_v4(),
            item_id:        Uuid::new_v4(),
            creator_id:     Uuid::new_v4(),
            start_time:     now - Duration::seconds(60),
            end_time:       now + Duration::seconds(seconds),
            starting_price: dec!(100),
            current_price:  dec!(100),
            status:         AuctionStatus::Active,
            created_at:     now,
            updated_at:     now,
        }
    }

    fn service(store: Arc<MemoryDatabase>) -> Service {
        Service::new(
            store,
            Arc::new(MemoryTimerIndex::new()),
            Arc::new(MemoryBroadcaster::new()),
        )
    }

    #[tokio::test]
    async fn a_tick_finalizes_due_auctions_and_spares_future_ones() {
        let store = Arc::new(MemoryDatabase::new());
        let due = auction_ending_in(-5);
        let future = auction_ending_in(120);
        store.add_auction(&due).await.unwrap();
        store.add_auction(&future).await.unwrap();
        let service = service(store.clone());
        service.rebuild_timer_index().await.unwrap();

        let (sink, mut events) = mpsc::channel(8);
        service
            .broadcaster
            .subscribe(due.id, "watcher", sink)
            .await
            .unwrap();

        service.expire_due_auctions().await;

        assert!(store.get_auction(due.id).await.unwrap().is_ended());
        assert!(store.get_auction(future.id).await.unwrap().is_active());
        let event = events.recv().await.unwrap();
        assert_eq!(event.kind, EventKind::AuctionEnded);
    }

    #[tokio::test]
    async fn stale_entries_for_terminal_auctions_are_dropped() {
        let store = Arc::new(MemoryDatabase::new());
        let auction = auction_ending_in(-5);
        store.add_auction(&auction).await.unwrap();
        let service = service(store.clone());
        store.end_auction(auction.id).await.unwrap();
        service
            .timer_index
            .schedule(auction.id, auction.end_time)
            .await
            .unwrap();

        service.expire_due_auctions().await;

        let now = OffsetDateTime::now_utc();
        assert!(service.timer_index.due(now, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn ticks_are_idempotent_once_an_auction_is_finalized() {
        let store = Arc::new(MemoryDatabase::new());
        let auction = auction_ending_in(-5);
        store.add_auction(&auction).await.unwrap();
        let service = service(store.clone());
        service.rebuild_timer_index().await.unwrap();

        service.expire_due_auctions().await;
        service.expire_due_auctions().await;

        let stored = store.get_auction(auction.id).await.unwrap();
        assert!(stored.is_ended());
    }

    #[tokio::test]
    async fn rebuild_schedules_only_active_auctions() {
        let store = Arc::new(MemoryDatabase::new());
        let active = auction_ending_in(-1);
        let ended = auction_ending_in(-2);
        store.add_auction(&active).await.unwrap();
        store.add_auction(&ended).await.unwrap();
        store.end_auction(ended.id).await.unwrap();
        let service = service(store);

        service.rebuild_timer_index().await.unwrap();
        let now = OffsetDateTime::now_utc();
        assert_eq!(
            service.timer_index.due(now, 10).await.unwrap(),
            vec![active.id]
        );
    }
}
