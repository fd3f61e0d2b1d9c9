use {
    super::Service,
    crate::{
        auction::entities::{
            Auction,
            AuctionStatus,
        },
        kernel::{
            entities::{
                ItemId,
                Price,
                UserId,
            },
            errors::AuctionError,
        },
    },
    rust_decimal::Decimal,
    time::{
        format_description::well_known::Rfc3339,
        OffsetDateTime,
    },
    uuid::Uuid,
};

#[derive(Clone, Debug)]
pub struct CreateAuctionInput {
    pub item_id:        ItemId,
    pub creator_id:     UserId,
    /// RFC-3339 instants with offset, as received on the wire.
    pub start_time:     String,
    pub end_time:       String,
    pub starting_price: Price,
}

impl Service {
    pub async fn create_auction(&self, input: CreateAuctionInput) -> Result<Auction, AuctionError> {
        tracing::info!(
            item_id = %input.item_id,
            creator_id = %input.creator_id,
            start_time = %input.start_time,
            end_time = %input.end_time,
            starting_price = %input.starting_price,
            "Attempting to create auction",
        );

        let item = self.store.get_item(input.item_id).await?;
        let creator = self.store.get_user(input.creator_id).await?;

        let start_time = OffsetDateTime::parse(&input.start_time, &Rfc3339)
            .map_err(|_| AuctionError::InvalidTimeFormat)?;
        let end_time = OffsetDateTime::parse(&input.end_time, &Rfc3339)
            .map_err(|_| AuctionError::InvalidTimeFormat)?;

        let now = OffsetDateTime::now_utc();
        if start_time < now {
            return Err(AuctionError::InvalidStartTime);
        }
        if end_time <= start_time {
            return Err(AuctionError::InvalidEndTime);
        }
        if input.starting_price <= Decimal::ZERO {
            return Err(AuctionError::InvalidStartingPrice);
        }

        if self
            .store
            .get_active_auction_by_item(item.id)
            .await?
            .is_some()
        {
            return Err(AuctionError::ItemAlreadyInAuction);
        }

        let auction = Auction {
            id: Uuid::new_v4(),
            item_id: item.id,
            creator_id: creator.id,
            start_time,
            end_time,
            starting_price: input.starting_price,
            current_price: input.starting_price,
            status: AuctionStatus::Active,
            created_at: now,
            updated_at: now,
        };
        self.store.add_auction(&auction).await?;
        tracing::info!(auction_id = %auction.id, item_id = %auction.item_id, "Auction created");

        // Enrollment failure leaves the auction standing; the startup
        // rebuild or a later re-schedule picks it up.
        if let Err(err) = self.timer_index.schedule(auction.id, auction.end_time).await {
            tracing::error!(
                auction_id = %auction.id,
                error = %err,
                "Failed to schedule auction for expiration",
            );
        } else {
            tracing::info!(
                auction_id = %auction.id,
                end_time = %auction.end_time,
                "Auction scheduled for expiration",
            );
        }

        Ok(auction)
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            auction::{
                repository::{
                    memory::MemoryDatabase,
                    Database,
                },
                service::Service,
            },
            broadcaster::memory::MemoryBroadcaster,
            kernel::entities::{
                Item,
                User,
            },
            scheduler::memory::MemoryTimerIndex,
        },
        rust_decimal_macros::dec,
        std::sync::Arc,
        time::Duration,
    };

    async fn service_with_seed() -> (Service, ItemId, UserId) {
        let store = Arc::new(MemoryDatabase::new());
        let item = Item {
            id:          Uuid::new_v4(),
            name:        "violin".to_string(),
            description: "18th century".to_string(),
        };
        let user = User {
            id:   Uuid::new_v4(),
            name: "alice".to_string(),
        };
        store.add_item(&item).await.unwrap();
        store.add_user(&user).await.unwrap();
        let service = Service::new(
            store,
            Arc::new(MemoryTimerIndex::new()),
            Arc::new(MemoryBroadcaster::new()),
        );
        (service, item.id, user.id)
    }

    fn rfc3339(when: OffsetDateTime) -> String {
        when.format(&Rfc3339).unwrap()
    }

    fn input(item_id: ItemId, creator_id: UserId) -> CreateAuctionInput {
        let now = OffsetDateTime::now_utc();
        CreateAuctionInput {
            item_id,
            creator_id,
            start_time: rfc3339(now + Duration::seconds(5)),
            end_time: rfc3339(now + Duration::seconds(65)),
            starting_price: dec!(100),
        }
    }

    #[tokio::test]
    async fn creates_an_active_auction_at_the_starting_price() {
        let (service, item_id, creator_id) = service_with_seed().await;
        let auction = service
            .create_auction(input(item_id, creator_id))
            .await
            .unwrap();
        assert_eq!(auction.status, AuctionStatus::Active);
        assert_eq!(auction.current_price, dec!(100));
        assert_eq!(
            service.store.get_auction(auction.id).await.unwrap(),
            auction
        );
    }

    #[tokio::test]
    async fn rejects_unknown_item_and_creator() {
        let (service, item_id, creator_id) = service_with_seed().await;
        assert_eq!(
            service.create_auction(input(Uuid::new_v4(), creator_id)).await,
            Err(AuctionError::ItemNotFound)
        );
        assert_eq!(
            service.create_auction(input(item_id, Uuid::new_v4())).await,
            Err(AuctionError::UserNotFound)
        );
    }

    #[tokio::test]
    async fn rejects_malformed_and_out_of_order_times() {
        let (service, item_id, creator_id) = service_with_seed().await;

        let mut malformed = input(item_id, creator_id);
        malformed.start_time = "2030-01-01 10:00".to_string();
        assert_eq!(
            service.create_auction(malformed).await,
            Err(AuctionError::InvalidTimeFormat)
        );

        let now = OffsetDateTime::now_utc();
        let mut past_start = input(item_id, creator_id);
        past_start.start_time = rfc3339(now - Duration::seconds(30));
        assert_eq!(
            service.create_auction(past_start).await,
            Err(AuctionError::InvalidStartTime)
        );

        let mut inverted = input(item_id, creator_id);
        inverted.end_time = rfc3339(now + Duration::seconds(2));
        assert_eq!(
            service.create_auction(inverted).await,
            Err(AuctionError::InvalidEndTime)
        );
    }

    #[tokio::test]
    async fn rejects_non_positive_starting_price() {
        let (service, item_id, creator_id) = service_with_seed().await;
        let mut free = input(item_id, creator_id);
        free.starting_price = dec!(0);
        assert_eq!(
            service.create_auction(free).await,
            Err(AuctionError::InvalidStartingPrice)
        );
    }

    #[tokio::test]
    async fn rejects_item_already_in_an_active_auction() {
        let (service, item_id, creator_id) = service_with_seed().await;
        service
            .create_auction(input(item_id, creator_id))
            .await
            .unwrap();
        assert_eq!(
            service.create_auction(input(item_id, creator_id)).await,
            Err(AuctionError::ItemAlreadyInAuction)
        );
    }

    #[tokio::test]
    async fn enrolls_the_auction_in_the_timer_index() {
        let (service, item_id, creator_id) = service_with_seed().await;
        let auction = service
            .create_auction(input(item_id, creator_id))
            .await
            .unwrap();
        let due = service
            .timer_index
            .due(auction.end_time + Duration::seconds(1), 10)
            .await
            .unwrap();
        assert_eq!(due, vec![auction.id]);
    }
}
