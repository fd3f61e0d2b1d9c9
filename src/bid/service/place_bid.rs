use {
    super::Service,
    crate::{
        bid::entities::{
            Bid,
            PlaceBidInput,
        },
        broadcaster::{
            Event,
            EventKind,
        },
        kernel::errors::AuctionError,
    },
    rust_decimal::Decimal,
    serde_json::json,
    time::OffsetDateTime,
};

impl Service {
    /// Preconditions run in a fixed order and the first failure wins; the
    /// admission itself is the store's conditional-update transaction. The
    /// service never retries a lost race, that choice belongs to the caller.
    pub async fn place_bid(&self, input: PlaceBidInput) -> Result<Bid, AuctionError> {
        tracing::info!(
            auction_id = %input.auction_id,
            user_id = %input.user_id,
            client_id = %input.client_id,
            amount = %input.amount,
            "Attempting to place bid",
        );

        if !self
            .broadcaster
            .is_subscribed(input.auction_id, &input.client_id)
            .await
        {
            tracing::warn!(
                client_id = %input.client_id,
                auction_id = %input.auction_id,
                "Client not subscribed to auction",
            );
            return Err(AuctionError::NotSubscribed);
        }

        let auction = self.store.get_auction(input.auction_id).await?;
        if !auction.can_bid() {
            return Err(AuctionError::AuctionNotAcceptingBids);
        }
        if !auction.started(OffsetDateTime::now_utc()) {
            return Err(AuctionError::AuctionNotStarted);
        }

        let user = self.store.get_user(input.user_id).await?;

        if input.amount <= Decimal::ZERO {
            return Err(AuctionError::BidAmountInvalid);
        }
        let highest = self.store.get_highest_bid(input.auction_id).await?;
        match &highest {
            Some(top) if input.amount <= top.amount => {
                tracing::warn!(
                    auction_id = %input.auction_id,
                    current_highest = %top.amount,
                    amount = %input.amount,
                    "Bid amount too low",
                );
                return Err(AuctionError::BidAmountTooLow);
            }
            None if input.amount <= auction.starting_price => {
                tracing::warn!(
                    auction_id = %input.auction_id,
                    starting_price = %auction.starting_price,
                    amount = %input.amount,
                    "Bid amount below starting price",
                );
                return Err(AuctionError::BidAmountBelowStarting);
            }
            _ => {}
        }

        let bid = Bid::candidate(input.auction_id, user.id, input.amount);
        // `current_price` as read above is the expectation the conditional
        // update is predicated on.
        self.store.place_bid(&bid, auction.current_price).await?;

        if let Err(err) = self
            .broadcaster
            .resubscribe(input.auction_id, &input.client_id)
            .await
        {
            tracing::warn!(
                client_id = %input.client_id,
                auction_id = %input.auction_id,
                error = %err,
                "Failed to refresh subscription after accepted bid",
            );
        }

        let event = Event::new(
            EventKind::BidPlaced,
            input.auction_id,
            json!({
                "bid_id": bid.id,
                "user_id": bid.user_id,
                "amount": bid.amount,
                "timestamp": bid.created_at.unix_timestamp(),
            }),
        );
        // The bid is already durable; fan-out is best-effort.
        if let Err(err) = self.broadcaster.publish(input.auction_id, event).await {
            tracing::error!(
                bid_id = %bid.id,
                auction_id = %input.auction_id,
                error = %err,
                "Failed to broadcast accepted bid",
            );
        } else {
            tracing::info!(
                bid_id = %bid.id,
                auction_id = %bid.auction_id,
                user_id = %bid.user_id,
                amount = %bid.amount,
                "Bid placed and broadcast",
            );
        }

        Ok(bid)
    }
}
