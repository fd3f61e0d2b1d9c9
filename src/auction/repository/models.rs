use {
    crate::{
        auction::entities::{
            Auction,
            AuctionEndResult,
            AuctionStatus,
        },
        bid::entities::{
            Bid,
            BidStatus,
        },
        kernel::{
            entities::{
                AuctionId,
                Item,
                ItemId,
                Price,
                User,
                UserId,
            },
            errors::AuctionError,
        },
    },
    async_trait::async_trait,
    rust_decimal::Decimal,
    sqlx::FromRow,
    time::OffsetDateTime,
    uuid::Uuid,
};

#[cfg(test)]
use mockall::automock;

/// Authoritative store port. Owns all durable state; uniqueness and the
/// monotonic-price invariant are enforced inside its transactions.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Database: Send + Sync + 'static {
    /// Creates the schema, the partial unique index keeping an item in at
    /// most one active auction, the top-bid ordering index, and the
    /// `(status, end_time)` index used to rebuild the timer index on boot.
    async fn migrate(&self) -> Result<(), AuctionError>;

    async fn add_user(&self, user: &User) -> Result<(), AuctionError>;
    async fn get_user(&self, user_id: UserId) -> Result<User, AuctionError>;
    async fn add_item(&self, item: &Item) -> Result<(), AuctionError>;
    async fn get_item(&self, item_id: ItemId) -> Result<Item, AuctionError>;

    async fn add_auction(&self, auction: &Auction) -> Result<(), AuctionError>;
    async fn get_auction(&self, auction_id: AuctionId) -> Result<Auction, AuctionError>;
    async fn list_auctions(
        &self,
        status: Option<AuctionStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Auction>, AuctionError>;
    async fn get_active_auction_by_item(
        &self,
        item_id: ItemId,
    ) -> Result<Option<Auction>, AuctionError>;
    /// Non-terminal auctions, used to re-enroll the timer index on startup.
    async fn get_active_auctions(&self) -> Result<Vec<Auction>, AuctionError>;

    /// Admission transaction. The conditional price update is the commit
    /// point: its row count decides between acceptance and
    /// `BidAmountTooLow`. No internal retry.
    async fn place_bid(&self, bid: &Bid, expected_current_price: Price)
        -> Result<(), AuctionError>;
    async fn get_highest_bid(&self, auction_id: AuctionId) -> Result<Option<Bid>, AuctionError>;
    async fn get_bids(&self, auction_id: AuctionId) -> Result<Vec<Bid>, AuctionError>;

    /// Finalization transaction: `active -> ended` exactly once, winner
    /// selected from the top accepted bid. Terminal auctions report
    /// `AuctionAlreadyEnded` and are otherwise untouched.
    async fn end_auction(&self, auction_id: AuctionId) -> Result<AuctionEndResult, AuctionError>;
}

#[derive(Clone, Debug, FromRow)]
pub struct AuctionRow {
    pub id:             Uuid,
    pub item_id:        Uuid,
    pub creator_id:     Uuid,
    pub start_time:     OffsetDateTime,
    pub end_time:       OffsetDateTime,
    pub starting_price: Decimal,
    pub current_price:  Decimal,
    pub status:         String,
    pub created_at:     OffsetDateTime,
    pub updated_at:     OffsetDateTime,
}

impl AuctionRow {
    pub fn into_entity(self) -> Result<Auction, AuctionError> {
        Ok(Auction {
            id:             self.id,
            item_id:        self.item_id,
            creator_id:     self.creator_id,
            start_time:     self.start_time,
            end_time:       self.end_time,
            starting_price: self.starting_price,
            current_price:  self.current_price,
            status:         self.status.parse()?,
            created_at:     self.created_at,
            updated_at:     self.updated_at,
        })
    }
}

#[derive(Clone, Debug, FromRow)]
pub struct BidRow {
    pub id:         Uuid,
    pub auction_id: Uuid,
    pub user_id:    Uuid,
    pub amount:     Decimal,
    pub status:     String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl BidRow {
    pub fn into_entity(self) -> Result<Bid, AuctionError> {
        Ok(Bid {
            id:         self.id,
            auction_id: self.auction_id,
            user_id:    self.user_id,
            amount:     self.amount,
            status:     self.status.parse::<BidStatus>()?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Clone, Debug, FromRow)]
pub struct UserRow {
    pub id:   Uuid,
    pub name: String,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id:   row.id,
            name: row.name,
        }
    }
}

#[derive(Clone, Debug, FromRow)]
pub struct ItemRow {
    pub id:          Uuid,
    pub name:        String,
    pub description: String,
}

impl From<ItemRow> for Item {
    fn from(row: ItemRow) -> Self {
        Item {
            id:          row.id,
            name:        row.name,
            description: row.description,
        }
    }
}
