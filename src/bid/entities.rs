use {
    crate::kernel::{
        entities::{
            AuctionId,
            BidId,
            ClientId,
            Price,
            UserId,
        },
        errors::AuctionError,
    },
    serde::{
        Deserialize,
        Serialize,
    },
    std::{
        fmt,
        str::FromStr,
    },
    time::OffsetDateTime,
    uuid::Uuid,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BidStatus {
    Accepted,
    Rejected,
}

impl fmt::Display for BidStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = match self {
            BidStatus::Accepted => "accepted",
            BidStatus::Rejected => "rejected",
        };
        f.write_str(status)
    }
}

impl FromStr for BidStatus {
    type Err = AuctionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "accepted" => Ok(BidStatus::Accepted),
            "rejected" => Ok(BidStatus::Rejected),
            other => Err(AuctionError::Transient(format!(
                "unknown bid status: {other}"
            ))),
        }
    }
}

/// Immutable after insertion; exists only in the context of one auction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bid {
    pub id:         BidId,
    pub auction_id: AuctionId,
    pub user_id:    UserId,
    pub amount:     Price,
    pub status:     BidStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Bid {
    /// Candidate for admission: fresh identifier, accepted status, `now`
    /// stamps. Whether it survives is decided by the store transaction.
    pub fn candidate(auction_id: AuctionId, user_id: UserId, amount: Price) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: Uuid::new_v4(),
            auction_id,
            user_id,
            amount,
            status: BidStatus::Accepted,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A bid attempt as it enters the admission pipeline.
#[derive(Clone, Debug)]
pub struct PlaceBidInput {
    pub auction_id: AuctionId,
    pub user_id:    UserId,
    pub client_id:  ClientId,
    pub amount:     Price,
}
