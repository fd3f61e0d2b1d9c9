use thiserror::Error;

/// Domain error surfaced verbatim to the originating client as the text of
/// an `error` frame. Infrastructure failures collapse into `Transient`.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AuctionError {
    #[error("auction not found")]
    AuctionNotFound,
    #[error("auction already ended")]
    AuctionAlreadyEnded,
    #[error("auction is not accepting bids")]
    AuctionNotAcceptingBids,
    #[error("auction not started")]
    AuctionNotStarted,
    #[error("start time cannot be in the past")]
    InvalidStartTime,
    #[error("end time must be after start time")]
    InvalidEndTime,
    #[error("starting price must be greater than 0")]
    InvalidStartingPrice,
    #[error("item is already in an active auction")]
    ItemAlreadyInAuction,
    #[error("item not found")]
    ItemNotFound,

    #[error("bid amount must be higher than current highest bid")]
    BidAmountTooLow,
    #[error("bid amount must be greater than 0")]
    BidAmountInvalid,
    #[error("bid amount must be higher than starting price")]
    BidAmountBelowStarting,

    #[error("user not found")]
    UserNotFound,
    #[error("user not subscribed to auction")]
    NotSubscribed,

    #[error("invalid time format")]
    InvalidTimeFormat,
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error("invalid {0} format")]
    InvalidFieldFormat(&'static str),
    #[error("unknown message type: {0}")]
    UnknownMessageType(String),

    #[error("temporarily unavailable: {0}")]
    Transient(String),
}

impl AuctionError {
    pub fn transient<E: std::fmt::Display>(err: E) -> Self {
        AuctionError::Transient(err.to_string())
    }
}
