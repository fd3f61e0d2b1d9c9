use {
    super::Service,
    crate::{
        auction::entities::{
            Auction,
            AuctionStatus,
        },
        kernel::errors::AuctionError,
    },
};

pub const PAGE_SIZE_CAP: i64 = 100;
const DEFAULT_PAGE_SIZE: i64 = 10;

#[derive(Clone, Copy, Debug, Default)]
pub struct ListAuctionsInput {
    pub status: Option<AuctionStatus>,
    pub limit:  Option<i64>,
    pub offset: Option<i64>,
}

impl Service {
    pub async fn list_auctions(
        &self,
        input: ListAuctionsInput,
    ) -> Result<Vec<Auction>, AuctionError> {
        let limit = input
            .limit
            .filter(|limit| *limit > 0)
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .min(PAGE_SIZE_CAP);
        let offset = input.offset.filter(|offset| *offset >= 0).unwrap_or(0);
        self.store.list_auctions(input.status, limit, offset).await
    }
}
