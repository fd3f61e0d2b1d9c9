use {
    super::Service,
    crate::{
        auction::entities::AuctionEndResult,
        broadcaster::{
            Event,
            EventKind,
        },
        kernel::{
            entities::AuctionId,
            errors::AuctionError,
        },
    },
    serde_json::json,
};

impl Service {
    /// Finalization: the durable `active -> ended` transition happens at
    /// most once; the terminal event is published after commit and may be
    /// emitted more than once across the fleet, which consumers tolerate.
    pub async fn end_auction(&self, auction_id: AuctionId) -> Result<AuctionEndResult, AuctionError> {
        tracing::info!(auction_id = %auction_id, "Ending auction");
        let result = self.store.end_auction(auction_id).await?;

        if let Err(err) = self.timer_index.remove(auction_id).await {
            tracing::warn!(
                auction_id = %auction_id,
                error = %err,
                "Failed to drop timer index entry for ended auction",
            );
        }

        let mut data = json!({
            "auction_id": result.auction_id,
            "status": result.status,
        });
        if let Some(winner_id) = result.winner_id {
            data["winner_id"] = json!(winner_id);
        }
        if let Some(final_price) = result.final_price {
            data["final_price"] = json!(final_price);
        }
        let event = Event::new(EventKind::AuctionEnded, auction_id, data);
        if let Err(err) = self.broadcaster.publish(auction_id, event).await {
            tracing::error!(
                auction_id = %auction_id,
                error = %err,
                "Failed to broadcast auction end event",
            );
        }

        match (&result.winner_id, &result.final_price) {
            (Some(winner_id), Some(final_price)) => tracing::info!(
                auction_id = %auction_id,
                winner_id = %winner_id,
                final_price = %final_price,
                "Auction ended with winner",
            ),
            _ => tracing::info!(auction_id = %auction_id, "Auction ended with no bids"),
        }
        Ok(result)
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
            bid::entities::Bid,
            broadcaster::memory::MemoryBroadcaster,
            scheduler::memory::MemoryTimerIndex,
        },
        rust_decimal_macros::dec,
        std::sync::Arc,
        time::{
            Duration,
            OffsetDateTime,
        },
        tokio::sync::mpsc,
        uuid::Uuid,
    };

    fn active_auction() -> Auction {
        let now = OffsetDateTime::now_utc();
        Auction {
            id:             Uuid::new_v4(),
            item_id:        Uuid::new_v4(),
            creator_id:     Uuid::new_v4(),
            start_time:     now - Duration::seconds(10),
            end_time:       now + Duration::seconds(60),
            starting_price: dec!(100),
            current_price:  dec!(100),
            status:         AuctionStatus::Active,
            created_at:     now,
            updated_at:     now,
        }
    }

    async fn service_with(auction: &Auction) -> (Service, Arc<MemoryDatabase>) {
        let store = Arc::new(MemoryDatabase::new());
        store.add_auction(auction).await.unwrap();
        let service = Service::new(
            store.clone(),
            Arc::new(MemoryTimerIndex::new()),
            Arc::new(MemoryBroadcaster::new()),
        );
        (service, store)
    }

    #[tokio::test]
    async fn ending_with_a_bid_reports_winner_and_notifies_subscribers() {
        let auction = active_auction();
        let (service, store) = service_with(&auction).await;
        let winner = Uuid::new_v4();
        let bid = Bid::candidate(auction.id, winner, dec!(200));
        store.place_bid(&bid, dec!(100)).await.unwrap();

        let (sink, mut events) = mpsc::channel(8);
        service
            .broadcaster
            .subscribe(auction.id, "watcher", sink)
            .await
            .unwrap();

        let result = service.end_auction(auction.id).await.unwrap();
        assert_eq!(result.status, AuctionStatus::Ended);
        assert_eq!(result.winner_id, Some(winner));
        assert_eq!(result.final_price, Some(dec!(200)));

        let event = events.recv().await.unwrap();
        assert_eq!(event.kind, EventKind::AuctionEnded);
        assert_eq!(event.data["winner_id"], json!(winner));
        assert_eq!(event.data["final_price"], json!(dec!(200)));
        assert!(store.get_auction(auction.id).await.unwrap().is_ended());
    }

    #[tokio::test]
    async fn ending_without_bids_carries_no_winner_fields() {
        let auction = active_auction();
        let (service, _store) = service_with(&auction).await;

        let (sink, mut events) = mpsc::channel(8);
        service
            .broadcaster
            .subscribe(auction.id, "watcher", sink)
            .await
            .unwrap();

        let result = service.end_auction(auction.id).await.unwrap();
        assert_eq!(result.winner_id, None);
        assert_eq!(result.final_price, None);

        let event = events.recv().await.unwrap();
        assert_eq!(event.kind, EventKind::AuctionEnded);
        assert!(event.data.get("winner_id").is_none());
        assert!(event.data.get("final_price").is_none());
    }

    #[tokio::test]
    async fn second_end_reports_already_ended() {
        let auction = active_auction();
        let (service, _store) = service_with(&auction).await;
        service.end_auction(auction.id).await.unwrap();
        assert_eq!(
            service.end_auction(auction.id).await,
            Err(AuctionError::AuctionAlreadyEnded)
        );
    }

    #[tokio::test]
    async fn ending_drops_the_timer_index_entry() {
        let auction = active_auction();
        let (service, _store) = service_with(&auction).await;
        service
            .timer_index
            .schedule(auction.id, auction.end_time)
            .await
            .unwrap();

        service.end_auction(auction.id).await.unwrap();
        let due = service
            .timer_index
            .due(auction.end_time + Duration::seconds(5), 10)
            .await
            .unwrap();
        assert!(due.is_empty());
    }
}
