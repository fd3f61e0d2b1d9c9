use {
    crate::{
        broadcaster::{
            Event,
            EventKind,
        },
        kernel::{
            entities::{
                AuctionId,
                ItemId,
                Price,
            },
            errors::AuctionError,
        },
    },
    rust_decimal::Decimal,
    serde::{
        Deserialize,
        Serialize,
    },
    serde_json::Value,
    time::OffsetDateTime,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClientMessageType {
    Subscribe,
    Unsubscribe,
    PlaceBid,
    CreateAuction,
    GetAuction,
    ListAuctions,
    Ping,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerMessageType {
    BidPlaced,
    AuctionEnded,
    AuctionUpdate,
    AuctionCreated,
    Error,
    Pong,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ClientMessage {
    #[serde(rename = "type")]
    pub kind:       String,
    #[serde(default)]
    pub auction_id: Option<AuctionId>,
    #[serde(default)]
    pub data:       Option<Value>,
    #[serde(default)]
    pub timestamp:  i64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct PlaceBidData {
    pub amount: Price,
}

#[derive(Clone, Debug)]
pub struct CreateAuctionData {
    pub item_id:        ItemId,
    pub start_time:     String,
    pub end_time:       String,
    pub starting_price: Price,
}

#[derive(Clone, Copy, Debug, Default, Deserialize)]
pub struct ListAuctionsData {
    #[serde(default)]
    pub limit:  Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
}

/// Parses one inbound frame. A frame that is not valid JSON for the envelope
/// is session-fatal upstream; field-level validation failures are not.
pub fn parse_client_message(data: &[u8]) -> Result<ClientMessage, AuctionError> {
    serde_json::from_slice(data).map_err(|_| AuctionError::InvalidFieldFormat("message"))
}

impl ClientMessage {
    pub fn message_type(&self) -> Result<ClientMessageType, AuctionError> {
        match self.kind.as_str() {
            "subscribe" => Ok(ClientMessageType::Subscribe),
            "unsubscribe" => Ok(ClientMessageType::Unsubscribe),
            "place_bid" => Ok(ClientMessageType::PlaceBid),
            "create_auction" => Ok(ClientMessageType::CreateAuction),
            "get_auction" => Ok(ClientMessageType::GetAuction),
            "list_auctions" => Ok(ClientMessageType::ListAuctions),
            "ping" => Ok(ClientMessageType::Ping),
            other => Err(AuctionError::UnknownMessageType(other.to_string())),
        }
    }

    fn require_auction_id(&self) -> Result<AuctionId, AuctionError> {
        self.auction_id
            .filter(|auction_id| !auction_id.is_nil())
            .ok_or(AuctionError::MissingField("auction_id"))
    }

    pub fn validate(&self) -> Result<(), AuctionError> {
        match self.message_type()? {
            ClientMessageType::Subscribe
            | ClientMessageType::Unsubscribe
            | ClientMessageType::GetAuction => self.require_auction_id().map(|_| ()),
            ClientMessageType::PlaceBid => {
                self.require_auction_id()?;
                self.place_bid_data().map(|_| ())
            }
            ClientMessageType::CreateAuction => self.create_auction_data().map(|_| ()),
            ClientMessageType::ListAuctions | ClientMessageType::Ping => Ok(()),
        }
    }

    pub fn place_bid_data(&self) -> Result<PlaceBidData, AuctionError> {
        let data = self
            .data
            .as_ref()
            .ok_or(AuctionError::MissingField("amount"))?;
        let parsed: PlaceBidData =
            serde_json::from_value(data.clone()).map_err(|_| AuctionError::BidAmountInvalid)?;
        if parsed.amount <= Decimal::ZERO {
            return Err(AuctionError::BidAmountInvalid);
        }
        Ok(parsed)
    }

    pub fn create_auction_data(&self) -> Result<CreateAuctionData, AuctionError> {
        let data = self.data.as_ref().ok_or(AuctionError::MissingField("data"))?;
        let item_id = data
            .get("item_id")
            .ok_or(AuctionError::MissingField("item_id"))?;
        let item_id: ItemId = serde_json::from_value(item_id.clone())
            .map_err(|_| AuctionError::InvalidFieldFormat("item_id"))?;
        let start_time = data
            .get("start_time")
            .and_then(Value::as_str)
            .ok_or(AuctionError::MissingField("start_time"))?
            .to_string();
        let end_time = data
            .get("end_time")
            .and_then(Value::as_str)
            .ok_or(AuctionError::MissingField("end_time"))?
            .to_string();
        let starting_price = data
            .get("starting_price")
            .ok_or(AuctionError::MissingField("starting_price"))?;
        let starting_price: Price = serde_json::from_value(starting_price.clone())
            .map_err(|_| AuctionError::InvalidFieldFormat("starting_price"))?;
        Ok(CreateAuctionData {
            item_id,
            start_time,
            end_time,
            starting_price,
        })
    }

    pub fn list_auctions_data(&self) -> ListAuctionsData {
        self.data
            .as_ref()
            .and_then(|data| serde_json::from_value(data.clone()).ok())
            .unwrap_or_default()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ServerMessage {
    #[serde(rename = "type")]
    pub kind:       ServerMessageType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auction_id: Option<AuctionId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data:       Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error:      Option<String>,
    pub timestamp:  i64,
}

impl ServerMessage {
    pub fn new(kind: ServerMessageType) -> Self {
        Self {
            kind,
            auction_id: None,
            data: None,
            error: None,
            timestamp: OffsetDateTime::now_utc().unix_timestamp(),
        }
    }

    pub fn with_auction_id(mut self, auction_id: AuctionId) -> Self {
        self.auction_id = Some(auction_id);
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn error(message: &AuctionError, auction_id: Option<AuctionId>) -> Self {
        Self {
            kind: ServerMessageType::Error,
            auction_id,
            data: None,
            error: Some(message.to_string()),
            timestamp: OffsetDateTime::now_utc().unix_timestamp(),
        }
    }

    /// Bus events map onto client frames by type; anything unrecognized
    /// degrades to a generic update.
    pub fn from_event(event: Event) -> Self {
        let kind = match event.kind {
            EventKind::BidPlaced => ServerMessageType::BidPlaced,
            EventKind::AuctionEnded => ServerMessageType::AuctionEnded,
            EventKind::AuctionCreated => ServerMessageType::AuctionUpdate,
        };
        Self {
            kind,
            auction_id: Some(event.auction_id),
            data: Some(event.data),
            error: None,
            timestamp: event.timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        rust_decimal_macros::dec,
        serde_json::json,
        uuid::Uuid,
    };

    fn frame(value: Value) -> ClientMessage {
        parse_client_message(value.to_string().as_bytes()).unwrap()
    }

    #[test]
    fn malformed_json_is_rejected() {
        assert!(parse_client_message(b"{not json").is_err());
    }

    #[test]
    fn unknown_type_fails_validation() {
        let message = frame(json!({"type": "upgrade_to_admin", "timestamp": 0}));
        assert_eq!(
            message.validate(),
            Err(AuctionError::UnknownMessageType(
                "upgrade_to_admin".to_string()
            ))
        );
    }

    #[test]
    fn subscribe_requires_a_non_nil_auction_id() {
        let missing = frame(json!({"type": "subscribe", "timestamp": 0}));
        assert_eq!(
            missing.validate(),
            Err(AuctionError::MissingField("auction_id"))
        );

        let nil = frame(json!({
            "type": "subscribe",
            "auction_id": Uuid::nil(),
            "timestamp": 0,
        }));
        assert_eq!(nil.validate(), Err(AuctionError::MissingField("auction_id")));

        let ok = frame(json!({
            "type": "subscribe",
            "auction_id": Uuid::new_v4(),
            "timestamp": 0,
        }));
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn place_bid_requires_a_positive_amount() {
        let auction_id = Uuid::new_v4();
        let no_data = frame(json!({
            "type": "place_bid",
            "auction_id": auction_id,
            "timestamp": 0,
        }));
        assert!(no_data.validate().is_err());

        let zero = frame(json!({
            "type": "place_bid",
            "auction_id": auction_id,
            "data": {"amount": 0},
            "timestamp": 0,
        }));
        assert_eq!(zero.validate(), Err(AuctionError::BidAmountInvalid));

        let ok = frame(json!({
            "type": "place_bid",
            "auction_id": auction_id,
            "data": {"amount": 150.5},
            "timestamp": 0,
        }));
        assert!(ok.validate().is_ok());
        assert_eq!(ok.place_bid_data().unwrap().amount, dec!(150.5));

        // Amounts may also arrive as decimal strings.
        let string_amount = frame(json!({
            "type": "place_bid",
            "auction_id": auction_id,
            "data": {"amount": "99.99"},
            "timestamp": 0,
        }));
        assert_eq!(string_amount.place_bid_data().unwrap().amount, dec!(99.99));
    }

    #[test]
    fn create_auction_checks_each_required_field() {
        let complete = json!({
            "item_id": Uuid::new_v4(),
            "start_time": "2031-01-01T10:00:00Z",
            "end_time": "2031-01-01T11:00:00Z",
            "starting_price": 100,
        });
        for field in ["item_id", "start_time", "end_time", "starting_price"] {
            let mut data = complete.clone();
            data.as_object_mut().unwrap().remove(field);
            let message = frame(json!({
                "type": "create_auction",
                "data": data,
                "timestamp": 0,
            }));
            assert_eq!(message.validate(), Err(AuctionError::MissingField(field)));
        }

        let message = frame(json!({
            "type": "create_auction",
            "data": complete,
            "timestamp": 0,
        }));
        let data = message.create_auction_data().unwrap();
        assert_eq!(data.starting_price, dec!(100));
        assert_eq!(data.start_time, "2031-01-01T10:00:00Z");
    }

    #[test]
    fn create_auction_rejects_a_malformed_item_id() {
        let message = frame(json!({
            "type": "create_auction",
            "data": {
                "item_id": "not-a-uuid",
                "start_time": "2031-01-01T10:00:00Z",
                "end_time": "2031-01-01T11:00:00Z",
                "starting_price": 100,
            },
            "timestamp": 0,
        }));
        assert_eq!(
            message.validate(),
            Err(AuctionError::InvalidFieldFormat("item_id"))
        );
    }

    #[test]
    fn list_auctions_data_defaults_when_absent_or_malformed() {
        let bare = frame(json!({"type": "list_auctions", "timestamp": 0}));
        assert!(bare.validate().is_ok());
        let defaults = bare.list_auctions_data();
        assert_eq!(defaults.limit, None);
        assert_eq!(defaults.offset, None);

        let paged = frame(json!({
            "type": "list_auctions",
            "data": {"limit": 5, "offset": 20},
            "timestamp": 0,
        }));
        let data = paged.list_auctions_data();
        assert_eq!(data.limit, Some(5));
        assert_eq!(data.offset, Some(20));
    }

    #[test]
    fn events_translate_onto_client_frame_types() {
        let auction_id = Uuid::new_v4();
        let cases = [
            (EventKind::BidPlaced, ServerMessageType::BidPlaced),
            (EventKind::AuctionEnded, ServerMessageType::AuctionEnded),
            (EventKind::AuctionCreated, ServerMessageType::AuctionUpdate),
        ];
        for (kind, expected) in cases {
            let event = Event::new(kind, auction_id, json!({"k": "v"}));
            let message = ServerMessage::from_event(event.clone());
            assert_eq!(message.kind, expected);
            assert_eq!(message.auction_id, Some(auction_id));
            assert_eq!(message.data, Some(event.data));
            assert_eq!(message.timestamp, event.timestamp);
        }
    }

    #[test]
    fn optional_envelope_fields_are_omitted_when_empty() {
        let pong = ServerMessage::new(ServerMessageType::Pong);
        let encoded = serde_json::to_value(&pong).unwrap();
        assert_eq!(encoded["type"], json!("pong"));
        assert!(encoded.get("auction_id").is_none());
        assert!(encoded.get("data").is_none());
        assert!(encoded.get("error").is_none());

        let auction_id = Uuid::new_v4();
        let failure = ServerMessage::error(&AuctionError::BidAmountTooLow, Some(auction_id));
        let encoded = serde_json::to_value(&failure).unwrap();
        assert_eq!(
            encoded["error"],
            json!("bid amount must be higher than current highest bid")
        );
        assert_eq!(encoded["auction_id"], json!(auction_id));
    }
}
