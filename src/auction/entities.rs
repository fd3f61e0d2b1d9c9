use {
    crate::kernel::{
        entities::{
            AuctionId,
            ItemId,
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
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuctionStatus {
    Pending,
    Active,
    Ended,
    Cancelled,
}

impl AuctionStatus {
    /// Once terminal, `current_price` is frozen.
    pub fn is_terminal(&self) -> bool {
        matches!(self, AuctionStatus::Ended | AuctionStatus::Cancelled)
    }
}

impl fmt::Display for AuctionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = match self {
            AuctionStatus::Pending => "pending",
            AuctionStatus::Active => "active",
            AuctionStatus::Ended => "ended",
            AuctionStatus::Cancelled => "cancelled",
        };
        f.write_str(status)
    }
}

impl FromStr for AuctionStatus {
    type Err = AuctionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(AuctionStatus::Pending),
            "active" => Ok(AuctionStatus::Active),
            "ended" => Ok(AuctionStatus::Ended),
            "cancelled" => Ok(AuctionStatus::Cancelled),
            other => Err(AuctionError::Transient(format!(
                "unknown auction status: {other}"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Auction {
    pub id:             AuctionId,
    pub item_id:        ItemId,
    pub creator_id:     UserId,
    #[serde(with = "time::serde::rfc3339")]
    pub start_time:     OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub end_time:       OffsetDateTime,
    pub starting_price: Price,
    /// High-water mark of accepted bids; non-decreasing over the auction's
    /// lifetime.
    pub current_price:  Price,
    pub status:         AuctionStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at:     OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at:     OffsetDateTime,
}

impl Auction {
    pub fn is_active(&self) -> bool {
        self.status == AuctionStatus::Active
    }

    pub fn is_ended(&self) -> bool {
        self.status == AuctionStatus::Ended
    }

    pub fn can_bid(&self) -> bool {
        self.status == AuctionStatus::Active
    }

    pub fn started(&self, now: OffsetDateTime) -> bool {
        self.start_time <= now
    }
}

/// Outcome of finalization, fanned out as `auction.ended`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuctionEndResult {
    pub auction_id:  AuctionId,
    pub status:      AuctionStatus,
    pub winner_id:   Option<UserId>,
    pub final_price: Option<Price>,
}
