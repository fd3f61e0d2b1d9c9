//! Stateful store fake with the same transactional semantics as the
//! Postgres adapter, used by the concurrency and scenario tests. Every
//! mutating call holds the write lock for its whole critical section, which
//! stands in for one serializable transaction.

use {
    super::models::Database,
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
                BidId,
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
    std::collections::HashMap,
    time::OffsetDateTime,
    tokio::sync::RwLock,
};

#[derive(Default)]
struct Tables {
    users:    HashMap<UserId, User>,
    items:    HashMap<ItemId, Item>,
    auctions: HashMap<AuctionId, Auction>,
    bids:     HashMap<BidId, Bid>,
}

impl Tables {
    fn highest_bid(&self, auction_id: AuctionId) -> Option<Bid> {
        let mut accepted: Vec<&Bid> = self
            .bids
            .values()
            .filter(|bid| bid.auction_id == auction_id && bid.status == BidStatus::Accepted)
            .collect();
        accepted.sort_by(|a, b| {
            b.amount
                .cmp(&a.amount)
                .then(a.created_at.cmp(&b.created_at))
        });
        accepted.first().map(|bid| (*bid).clone())
    }
}

#[derive(Default)]
pub struct MemoryDatabase {
    tables: RwLock<Tables>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn migrate(&self) -> Result<(), AuctionError> {
        Ok(())
    }

    async fn add_user(&self, user: &User) -> Result<(), AuctionError> {
        self.tables
            .write()
            .await
            .users
            .insert(user.id, user.clone());
        Ok(())
    }

    async fn get_user(&self, user_id: UserId) -> Result<User, AuctionError> {
        self.tables
            .read()
            .await
            .users
            .get(&user_id)
            .cloned()
            .ok_or(AuctionError::UserNotFound)
    }

    async fn add_item(&self, item: &Item) -> Result<(), AuctionError> {
        self.tables
            .write()
            .await
            .items
            .insert(item.id, item.clone());
        Ok(())
    }

    async fn get_item(&self, item_id: ItemId) -> Result<Item, AuctionError> {
        self.tables
            .read()
            .await
            .items
            .get(&item_id)
            .cloned()
            .ok_or(AuctionError::ItemNotFound)
    }

    async fn add_auction(&self, auction: &Auction) -> Result<(), AuctionError> {
        let mut tables = self.tables.write().await;
        let item_in_auction = tables.auctions.values().any(|existing| {
            existing.item_id == auction.item_id && existing.status == AuctionStatus::Active
        });
        if item_in_auction && auction.status == AuctionStatus::Active {
            return Err(AuctionError::ItemAlreadyInAuction);
        }
        tables.auctions.insert(auction.id, auction.clone());
        Ok(())
    }

    async fn get_auction(&self, auction_id: AuctionId) -> Result<Auction, AuctionError> {
        self.tables
            .read()
            .await
            .auctions
            .get(&auction_id)
            .cloned()
            .ok_or(AuctionError::AuctionNotFound)
    }

    async fn list_auctions(
        &self,
        status: Option<AuctionStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Auction>, AuctionError> {
        let tables = self.tables.read().await;
        let mut auctions: Vec<Auction> = tables
            .auctions
            .values()
            .filter(|auction| status.map_or(true, |status| auction.status == status))
            .cloned()
            .collect();
        auctions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(auctions
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn get_active_auction_by_item(
        &self,
        item_id: ItemId,
    ) -> Result<Option<Auction>, AuctionError> {
        Ok(self
            .tables
            .read()
            .await
            .auctions
            .values()
            .find(|auction| auction.item_id == item_id && auction.status == AuctionStatus::Active)
            .cloned())
    }

    async fn get_active_auctions(&self) -> Result<Vec<Auction>, AuctionError> {
        let tables = self.tables.read().await;
        let mut active: Vec<Auction> = tables
            .auctions
            .values()
            .filter(|auction| auction.status == AuctionStatus::Active)
            .cloned()
            .collect();
        active.sort_by_key(|auction| auction.end_time);
        Ok(active)
    }

    async fn place_bid(
        &self,
        bid: &Bid,
        expected_current_price: Price,
    ) -> Result<(), AuctionError> {
        let mut guard = self.tables.write().await;
        let tables = &mut *guard;
        let auction = tables
            .auctions
            .get_mut(&bid.auction_id)
            .ok_or(AuctionError::AuctionNotFound)?;
        if auction.status != AuctionStatus::Active {
            return Err(AuctionError::AuctionNotAcceptingBids);
        }
        // The conditional predicate of the relational adapter; holding the
        // write lock for the whole section is what makes it atomic here.
        if auction.current_price != expected_current_price {
            return Err(AuctionError::BidAmountTooLow);
        }
        if bid.amount <= auction.current_price {
            return Err(AuctionError::BidAmountTooLow);
        }
        tables.bids.insert(bid.id, bid.clone());
        auction.current_price = bid.amount;
        auction.updated_at = bid.created_at;
        Ok(())
    }

    async fn get_highest_bid(&self, auction_id: AuctionId) -> Result<Option<Bid>, AuctionError> {
        Ok(self.tables.read().await.highest_bid(auction_id))
    }

    async fn get_bids(&self, auction_id: AuctionId) -> Result<Vec<Bid>, AuctionError> {
        let tables = self.tables.read().await;
        let mut bids: Vec<Bid> = tables
            .bids
            .values()
            .filter(|bid| bid.auction_id == auction_id)
            .cloned()
            .collect();
        bids.sort_by(|a, b| {
            b.amount
                .cmp(&a.amount)
                .then(a.created_at.cmp(&b.created_at))
        });
        Ok(bids)
    }

    async fn end_auction(&self, auction_id: AuctionId) -> Result<AuctionEndResult, AuctionError> {
        let mut guard = self.tables.write().await;
        let tables = &mut *guard;
        {
            let auction = tables
                .auctions
                .get(&auction_id)
                .ok_or(AuctionError::AuctionNotFound)?;
            if auction.status.is_terminal() {
                return Err(AuctionError::AuctionAlreadyEnded);
            }
        }
        let top = tables.highest_bid(auction_id);
        let auction = tables
            .auctions
            .get_mut(&auction_id)
            .ok_or(AuctionError::AuctionNotFound)?;
        auction.status = AuctionStatus::Ended;
        auction.updated_at = OffsetDateTime::now_utc();
        Ok(AuctionEndResult {
            auction_id,
            status: AuctionStatus::Ended,
            winner_id: top.as_ref().map(|bid| bid.user_id),
            final_price: top.map(|bid| bid.amount),
        })
    }
}
