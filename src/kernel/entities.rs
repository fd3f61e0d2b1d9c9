use {
    rust_decimal::Decimal,
    serde::{
        Deserialize,
        Serialize,
    },
    uuid::Uuid,
};

pub type AuctionId = Uuid;
pub type BidId = Uuid;
pub type ItemId = Uuid;
pub type UserId = Uuid;

/// Server-assigned session identifier, distinct from the user identifier.
/// One user may hold any number of concurrent sessions.
pub type ClientId = String;

/// All prices are fixed-point decimals with two fractional digits.
pub type Price = Decimal;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct User {
    pub id:   UserId,
    pub name: String,
}

/// Immutable after creation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Item {
    pub id:          ItemId,
    pub name:        String,
    pub description: String,
}
