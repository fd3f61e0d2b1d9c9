use {
    super::models::{
        AuctionRow,
        BidRow,
        Database,
        ItemRow,
        UserRow,
    },
    crate::{
        auction::entities::{
            Auction,
            AuctionEndResult,
            AuctionStatus,
        },
        bid::entities::Bid,
        kernel::{
            db::DB,
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
    time::OffsetDateTime,
};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS users (
        id UUID PRIMARY KEY,
        name TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS items (
        id UUID PRIMARY KEY,
        name TEXT NOT NULL,
        description TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS auctions (
        id UUID PRIMARY KEY,
        item_id UUID NOT NULL REFERENCES items (id),
        creator_id UUID NOT NULL REFERENCES users (id),
        start_time TIMESTAMPTZ NOT NULL,
        end_time TIMESTAMPTZ NOT NULL,
        starting_price NUMERIC(20, 2) NOT NULL CHECK (starting_price > 0),
        current_price NUMERIC(20, 2) NOT NULL,
        status TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS bids (
        id UUID PRIMARY KEY,
        auction_id UUID NOT NULL REFERENCES auctions (id),
        user_id UUID NOT NULL REFERENCES users (id),
        amount NUMERIC(20, 2) NOT NULL CHECK (amount > 0),
        status TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )",
    "CREATE UNIQUE INDEX IF NOT EXISTS auctions_one_active_per_item
        ON auctions (item_id) WHERE status = 'active'",
    "CREATE INDEX IF NOT EXISTS bids_top_by_auction
        ON bids (auction_id, status, amount DESC)",
    "CREATE INDEX IF NOT EXISTS auctions_by_status_end_time
        ON auctions (status, end_time)",
];

fn store_error(context: &'static str, err: sqlx::Error) -> AuctionError {
    tracing::error!(error = %err, context, "Store query failed");
    AuctionError::transient(err)
}

#[async_trait]
impl Database for DB {
    async fn migrate(&self) -> Result<(), AuctionError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(self)
                .await
                .map_err(|err| store_error("migrate", err))?;
        }
        Ok(())
    }

    async fn add_user(&self, user: &User) -> Result<(), AuctionError> {
        sqlx::query("INSERT INTO users (id, name) VALUES ($1, $2)")
            .bind(user.id)
            .bind(&user.name)
            .execute(self)
            .await
            .map_err(|err| store_error("add_user", err))?;
        Ok(())
    }

    async fn get_user(&self, user_id: UserId) -> Result<User, AuctionError> {
        let row: Option<UserRow> = sqlx::query_as("SELECT * FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(self)
            .await
            .map_err(|err| store_error("get_user", err))?;
        row.map(User::from).ok_or(AuctionError::UserNotFound)
    }

    async fn add_item(&self, item: &Item) -> Result<(), AuctionError> {
        sqlx::query("INSERT INTO items (id, name, description) VALUES ($1, $2, $3)")
            .bind(item.id)
            .bind(&item.name)
            .bind(&item.description)
            .execute(self)
            .await
            .map_err(|err| store_error("add_item", err))?;
        Ok(())
    }

    async fn get_item(&self, item_id: ItemId) -> Result<Item, AuctionError> {
        let row: Option<ItemRow> = sqlx::query_as("SELECT * FROM items WHERE id = $1")
            .bind(item_id)
            .fetch_optional(self)
            .await
            .map_err(|err| store_error("get_item", err))?;
        row.map(Item::from).ok_or(AuctionError::ItemNotFound)
    }

    async fn add_auction(&self, auction: &Auction) -> Result<(), AuctionError> {
        sqlx::query(
            "INSERT INTO auctions (id, item_id, creator_id, start_time, end_time, \
             starting_price, current_price, status, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(auction.id)
        .bind(auction.item_id)
        .bind(auction.creator_id)
        .bind(auction.start_time)
        .bind(auction.end_time)
        .bind(auction.starting_price)
        .bind(auction.current_price)
        .bind(auction.status.to_string())
        .bind(auction.created_at)
        .bind(auction.updated_at)
        .execute(self)
        .await
        .map_err(|err| {
            // The partial unique index backs up the service-level precheck.
            if err
                .as_database_error()
                .is_some_and(|db_err| db_err.is_unique_violation())
            {
                return AuctionError::ItemAlreadyInAuction;
            }
            store_error("add_auction", err)
        })?;
        Ok(())
    }

    async fn get_auction(&self, auction_id: AuctionId) -> Result<Auction, AuctionError> {
        let row: Option<AuctionRow> = sqlx::query_as("SELECT * FROM auctions WHERE id = $1")
            .bind(auction_id)
            .fetch_optional(self)
            .await
            .map_err(|err| store_error("get_auction", err))?;
        row.ok_or(AuctionError::AuctionNotFound)?.into_entity()
    }

    async fn list_auctions(
        &self,
        status: Option<AuctionStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Auction>, AuctionError> {
        let rows: Vec<AuctionRow> = match status {
            Some(status) => {
                sqlx::query_as(
                    "SELECT * FROM auctions WHERE status = $1 \
                     ORDER BY created_at DESC LIMIT $2 OFFSET $3",
                )
                .bind(status.to_string())
                .bind(limit)
                .bind(offset)
                .fetch_all(self)
                .await
            }
            None => {
                sqlx::query_as("SELECT * FROM auctions ORDER BY created_at DESC LIMIT $1 OFFSET $2")
                    .bind(limit)
                    .bind(offset)
                    .fetch_all(self)
                    .await
            }
        }
        .map_err(|err| store_error("list_auctions", err))?;
        rows.into_iter().map(AuctionRow::into_entity).collect()
    }

    async fn get_active_auction_by_item(
        &self,
        item_id: ItemId,
    ) -> Result<Option<Auction>, AuctionError> {
        let row: Option<AuctionRow> =
            sqlx::query_as("SELECT * FROM auctions WHERE item_id = $1 AND status = 'active'")
                .bind(item_id)
                .fetch_optional(self)
                .await
                .map_err(|err| store_error("get_active_auction_by_item", err))?;
        row.map(AuctionRow::into_entity).transpose()
    }

    async fn get_active_auctions(&self) -> Result<Vec<Auction>, AuctionError> {
        let rows: Vec<AuctionRow> =
            sqlx::query_as("SELECT * FROM auctions WHERE status = 'active' ORDER BY end_time")
                .fetch_all(self)
                .await
                .map_err(|err| store_error("get_active_auctions", err))?;
        rows.into_iter().map(AuctionRow::into_entity).collect()
    }

    async fn place_bid(
        &self,
        bid: &Bid,
        expected_current_price: Price,
    ) -> Result<(), AuctionError> {
        let mut tx = self
            .begin()
            .await
            .map_err(|err| store_error("place_bid: begin", err))?;

        let head: Option<(Price, String)> =
            sqlx::query_as("SELECT current_price, status FROM auctions WHERE id = $1")
                .bind(bid.auction_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(|err| store_error("place_bid: read auction", err))?;
        let (current_price, status) = head.ok_or(AuctionError::AuctionNotFound)?;
        if status.parse::<AuctionStatus>()? != AuctionStatus::Active {
            return Err(AuctionError::AuctionNotAcceptingBids);
        }
        // Early exits only; the conditional update below is the admission
        // decision.
        if current_price != expected_current_price {
            return Err(AuctionError::BidAmountTooLow);
        }
        if bid.amount <= current_price {
            return Err(AuctionError::BidAmountTooLow);
        }

        sqlx::query(
            "INSERT INTO bids (id, auction_id, user_id, amount, status, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(bid.id)
        .bind(bid.auction_id)
        .bind(bid.user_id)
        .bind(bid.amount)
        .bind(bid.status.to_string())
        .bind(bid.created_at)
        .bind(bid.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|err| store_error("place_bid: insert bid", err))?;

        let updated = sqlx::query(
            "UPDATE auctions SET current_price = $2, updated_at = $3 \
             WHERE id = $1 AND current_price = $4",
        )
        .bind(bid.auction_id)
        .bind(bid.amount)
        .bind(bid.created_at)
        .bind(expected_current_price)
        .execute(&mut *tx)
        .await
        .map_err(|err| store_error("place_bid: update price", err))?;
        // A concurrent admission won the slot between the read and here; the
        // dropped transaction rolls the bid insert back.
        if updated.rows_affected() == 0 {
            return Err(AuctionError::BidAmountTooLow);
        }

        tx.commit()
            .await
            .map_err(|err| store_error("place_bid: commit", err))
    }

    async fn get_highest_bid(&self, auction_id: AuctionId) -> Result<Option<Bid>, AuctionError> {
        let row: Option<BidRow> = sqlx::query_as(
            "SELECT * FROM bids WHERE auction_id = $1 AND status = 'accepted' \
             ORDER BY amount DESC, created_at ASC LIMIT 1",
        )
        .bind(auction_id)
        .fetch_optional(self)
        .await
        .map_err(|err| store_error("get_highest_bid", err))?;
        row.map(BidRow::into_entity).transpose()
    }

    async fn get_bids(&self, auction_id: AuctionId) -> Result<Vec<Bid>, AuctionError> {
        let rows: Vec<BidRow> = sqlx::query_as(
            "SELECT * FROM bids WHERE auction_id = $1 ORDER BY amount DESC, created_at ASC",
        )
        .bind(auction_id)
        .fetch_all(self)
        .await
        .map_err(|err| store_error("get_bids", err))?;
        rows.into_iter().map(BidRow::into_entity).collect()
    }

    async fn end_auction(&self, auction_id: AuctionId) -> Result<AuctionEndResult, AuctionError> {
        let mut tx = self
            .begin()
            .await
            .map_err(|err| store_error("end_auction: begin", err))?;

        let row: Option<AuctionRow> =
            sqlx::query_as("SELECT * FROM auctions WHERE id = $1 FOR UPDATE")
                .bind(auction_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(|err| store_error("end_auction: read auction", err))?;
        let auction = row.ok_or(AuctionError::AuctionNotFound)?.into_entity()?;
        if auction.status.is_terminal() {
            return Err(AuctionError::AuctionAlreadyEnded);
        }

        sqlx::query("UPDATE auctions SET status = 'ended', updated_at = $2 WHERE id = $1")
            .bind(auction_id)
            .bind(OffsetDateTime::now_utc())
            .execute(&mut *tx)
            .await
            .map_err(|err| store_error("end_auction: update status", err))?;

        let top: Option<BidRow> = sqlx::query_as(
            "SELECT * FROM bids WHERE auction_id = $1 AND status = 'accepted' \
             ORDER BY amount DESC, created_at ASC LIMIT 1",
        )
        .bind(auction_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|err| store_error("end_auction: read top bid", err))?;

        tx.commit()
            .await
            .map_err(|err| store_error("end_auction: commit", err))?;

        let top = top.map(BidRow::into_entity).transpose()?;
        Ok(AuctionEndResult {
            auction_id,
            status: AuctionStatus::Ended,
            winner_id: top.as_ref().map(|bid| bid.user_id),
            final_price: top.map(|bid| bid.amount),
        })
    }
}
