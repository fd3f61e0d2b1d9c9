use {
    super::Service,
    crate::{
        auction::entities::Auction,
        kernel::{
            entities::AuctionId,
            errors::AuctionError,
        },
    },
};

impl Service {
    pub async fn get_auction(&self, auction_id: AuctionId) -> Result<Auction, AuctionError> {
        let auction = self.store.get_auction(auction_id).await?;
        tracing::debug!(
            auction_id = %auction.id,
            status = %auction.status,
            can_bid = auction.can_bid(),
            "Auction retrieved",
        );
        Ok(auction)
    }
}
