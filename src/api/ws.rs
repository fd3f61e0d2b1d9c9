use {
    super::messages::{
        parse_client_message,
        ClientMessage,
        ClientMessageType,
        ServerMessage,
        ServerMessageType,
    },
    crate::{
        auction::{
            entities::Auction,
            service::{
                create_auction::CreateAuctionInput,
                list_auctions::ListAuctionsInput,
            },
        },
        bid::entities::PlaceBidInput,
        broadcaster::Event,
        config::{
            EVENT_SINK_CAPACITY,
            INBOUND_QUEUE_CAPACITY,
            OUTBOUND_QUEUE_CAPACITY,
            SEND_FALLBACK_TIMEOUT,
            SESSION_WORKERS,
        },
        kernel::{
            entities::{
                ClientId,
                UserId,
            },
            errors::AuctionError,
        },
        state::AppState,
    },
    axum::{
        extract::{
            ws::{
                Message,
                WebSocket,
                WebSocketUpgrade,
            },
            Query,
            State,
        },
        response::IntoResponse,
    },
    dashmap::DashMap,
    futures::{
        stream::{
            SplitSink,
            SplitStream,
        },
        SinkExt,
        StreamExt,
    },
    serde::Deserialize,
    serde_json::json,
    std::sync::Arc,
    tokio::sync::{
        mpsc,
        Mutex,
    },
    tokio_util::{
        sync::CancellationToken,
        task::TaskTracker,
    },
    uuid::Uuid,
};

pub struct SessionHandle {
    pub user_id: UserId,
    pub cancel:  CancellationToken,
}

/// Router-level registry of live sessions.
pub struct WsState {
    pub sessions: DashMap<ClientId, SessionHandle>,
}

impl WsState {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    /// Cancels every live session; used on server shutdown.
    pub fn shutdown_sessions(&self) {
        for session in self.sessions.iter() {
            tracing::debug!(
                client_id = %session.key(),
                user_id = %session.user_id,
                "Cancelling session for shutdown",
            );
            session.cancel.cancel();
        }
    }
}

impl Default for WsState {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Deserialize)]
pub(crate) struct WsQuery {
    /// Pre-authenticated caller identity; trusted as-is.
    user_id: UserId,
}

pub async fn ws_route_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| session_handler(socket, state, query.user_id))
}

async fn session_handler(socket: WebSocket, state: Arc<AppState>, user_id: UserId) {
    let session = Session::new(state.clone(), user_id);
    state.ws.sessions.insert(
        session.client_id.clone(),
        SessionHandle {
            user_id,
            cancel: session.cancel.clone(),
        },
    );
    tracing::info!(
        client_id = %session.client_id,
        user_id = %user_id,
        total_sessions = state.ws.sessions.len(),
        "Session connected",
    );

    session.clone().run(socket).await;

    state.ws.sessions.remove(&session.client_id);
    state.broadcaster.disconnect(&session.client_id).await;
    tracing::info!(
        client_id = %session.client_id,
        user_id = %user_id,
        total_sessions = state.ws.sessions.len(),
        "Session disconnected",
    );
}

/// Non-blocking enqueue with a short fallback wait. Failure is the
/// producer's signal that the session cannot drain; it is never fatal for
/// the producer itself.
async fn enqueue(outbound: &mpsc::Sender<ServerMessage>, message: ServerMessage) -> bool {
    match outbound.try_send(message) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Closed(_)) => false,
        Err(mpsc::error::TrySendError::Full(message)) => outbound
            .send_timeout(message, SEND_FALLBACK_TIMEOUT)
            .await
            .is_ok(),
    }
}

/// One live duplex connection. Three cooperating task groups synchronized
/// only through bounded queues: the reader (this task), a worker pool for
/// frame handling, and a single writer draining the outbound queue. The bus
/// writes into the event sink; a forwarder translates into client frames.
struct Session {
    client_id:  ClientId,
    user_id:    UserId,
    state:      Arc<AppState>,
    cancel:     CancellationToken,
    outbound:   mpsc::Sender<ServerMessage>,
    event_sink: mpsc::Sender<Event>,

    outbound_rx: Mutex<Option<mpsc::Receiver<ServerMessage>>>,
    events_rx:   Mutex<Option<mpsc::Receiver<Event>>>,
}

impl Session {
    fn new(state: Arc<AppState>, user_id: UserId) -> Arc<Self> {
        let (outbound, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);
        let (event_sink, events_rx) = mpsc::channel(EVENT_SINK_CAPACITY);
        Arc::new(Self {
            client_id: Uuid::new_v4().to_string(),
            user_id,
            state,
            cancel: CancellationToken::new(),
            outbound,
            event_sink,
            outbound_rx: Mutex::new(Some(outbound_rx)),
            events_rx: Mutex::new(Some(events_rx)),
        })
    }

    async fn run(self: Arc<Self>, socket: WebSocket) {
        let (ws_sink, ws_stream) = socket.split();
        let tracker = TaskTracker::new();

        let outbound_rx = self
            .outbound_rx
            .lock()
            .await
            .take()
            .expect("session run twice");
        let events_rx = self.events_rx.lock().await.take().expect("session run twice");

        tracker.spawn(self.clone().write_loop(ws_sink, outbound_rx));
        tracker.spawn(self.clone().forward_loop(events_rx));

        let (work_tx, work_rx) = mpsc::channel::<ClientMessage>(INBOUND_QUEUE_CAPACITY);
        let work_rx = Arc::new(Mutex::new(work_rx));
        for _ in 0..SESSION_WORKERS {
            tracker.spawn(self.clone().work_loop(work_rx.clone()));
        }

        self.read_loop(ws_stream, work_tx).await;

        self.cancel.cancel();
        tracker.close();
        tracker.wait().await;
    }

    /// Serializes all transport writes; a write failure is session-fatal.
    async fn write_loop(
        self: Arc<Self>,
        mut ws_sink: SplitSink<WebSocket, Message>,
        mut outbound_rx: mpsc::Receiver<ServerMessage>,
    ) {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                message = outbound_rx.recv() => {
                    let Some(message) = message else { break };
                    let text = match serde_json::to_string(&message) {
                        Ok(text) => text,
                        Err(err) => {
                            tracing::error!(
                                client_id = %self.client_id,
                                error = %err,
                                "Failed to encode outbound frame",
                            );
                            continue;
                        }
                    };
                    if let Err(err) = ws_sink.send(Message::Text(text)).await {
                        tracing::info!(
                            client_id = %self.client_id,
                            error = %err,
                            "Transport write failed, closing session",
                        );
                        self.cancel.cancel();
                        break;
                    }
                }
            }
        }
        let _ = ws_sink.close().await;
    }

    /// Translates bus events into client frames and feeds the outbound
    /// queue.
    async fn forward_loop(self: Arc<Self>, mut events_rx: mpsc::Receiver<Event>) {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                event = events_rx.recv() => {
                    let Some(event) = event else { break };
                    if !enqueue(&self.outbound, ServerMessage::from_event(event)).await {
                        tracing::warn!(
                            client_id = %self.client_id,
                            "Outbound queue saturated, event not forwarded",
                        );
                    }
                }
            }
        }
    }

    /// Parses frames off the transport and hands them to the worker pool so
    /// one slow handler cannot stall reading.
    async fn read_loop(
        &self,
        mut ws_stream: SplitStream<WebSocket>,
        work_tx: mpsc::Sender<ClientMessage>,
    ) {
        loop {
            let message = tokio::select! {
                _ = self.cancel.cancelled() => break,
                message = ws_stream.next() => message,
            };
            let Some(Ok(message)) = message else {
                // Transport closed or errored.
                break;
            };
            let payload = match message {
                Message::Close(_) => break,
                Message::Text(text) => text.into_bytes(),
                Message::Binary(data) => data,
                // Axum answers pings itself; pongs carry no work.
                Message::Ping(_) | Message::Pong(_) => continue,
            };

            let frame = match parse_client_message(&payload) {
                Ok(frame) => frame,
                Err(err) => {
                    // Unparseable frames are session-fatal.
                    enqueue(&self.outbound, ServerMessage::error(&err, None)).await;
                    tracing::warn!(
                        client_id = %self.client_id,
                        "Unparseable frame, closing session",
                    );
                    break;
                }
            };
            if let Err(err) = frame.validate() {
                enqueue(&self.outbound, ServerMessage::error(&err, frame.auction_id)).await;
                continue;
            }
            if work_tx.send(frame).await.is_err() {
                break;
            }
        }
        self.cancel.cancel();
    }

    async fn work_loop(self: Arc<Self>, work_rx: Arc<Mutex<mpsc::Receiver<ClientMessage>>>) {
        loop {
            let frame = {
                let mut work_rx = work_rx.lock().await;
                tokio::select! {
                    _ = self.cancel.cancelled() => None,
                    frame = work_rx.recv() => frame,
                }
            };
            let Some(frame) = frame else { break };
            if let Err(err) = self.handle_frame(&frame).await {
                let sent = enqueue(
                    &self.outbound,
                    ServerMessage::error(&err, frame.auction_id),
                )
                .await;
                if !sent {
                    tracing::warn!(
                        client_id = %self.client_id,
                        error = %err,
                        "Failed to report handler error to client",
                    );
                }
            }
        }
    }

    async fn reply(&self, message: ServerMessage) -> Result<(), AuctionError> {
        if !enqueue(&self.outbound, message).await {
            tracing::warn!(
                client_id = %self.client_id,
                "Outbound queue saturated, dropping reply",
            );
        }
        Ok(())
    }

    fn auction_record(auction: &Auction) -> serde_json::Value {
        json!({
            "auction_id": auction.id,
            "item_id": auction.item_id,
            "creator_id": auction.creator_id,
            "start_time": auction.start_time.format(&time::format_description::well_known::Rfc3339).ok(),
            "end_time": auction.end_time.format(&time::format_description::well_known::Rfc3339).ok(),
            "starting_price": auction.starting_price,
            "current_price": auction.current_price,
            "status": auction.status,
        })
    }

    async fn handle_frame(&self, frame: &ClientMessage) -> Result<(), AuctionError> {
        match frame.message_type()? {
            ClientMessageType::Ping => {
                self.reply(ServerMessage::new(ServerMessageType::Pong)).await
            }
            ClientMessageType::Subscribe => {
                let auction_id = frame
                    .auction_id
                    .ok_or(AuctionError::MissingField("auction_id"))?;
                self.state
                    .broadcaster
                    .subscribe(auction_id, &self.client_id, self.event_sink.clone())
                    .await?;
                tracing::info!(
                    client_id = %self.client_id,
                    auction_id = %auction_id,
                    "Client subscribed to auction",
                );
                self.reply(
                    ServerMessage::new(ServerMessageType::AuctionUpdate)
                        .with_auction_id(auction_id)
                        .with_data(json!({"status": "subscribed"})),
                )
                .await
            }
            ClientMessageType::Unsubscribe => {
                let auction_id = frame
                    .auction_id
                    .ok_or(AuctionError::MissingField("auction_id"))?;
                self.state
                    .broadcaster
                    .unsubscribe(auction_id, &self.client_id)
                    .await?;
                tracing::info!(
                    client_id = %self.client_id,
                    auction_id = %auction_id,
                    "Client unsubscribed from auction",
                );
                self.reply(
                    ServerMessage::new(ServerMessageType::AuctionUpdate)
                        .with_auction_id(auction_id)
                        .with_data(json!({"status": "unsubscribed"})),
                )
                .await
            }
            ClientMessageType::PlaceBid => {
                let auction_id = frame
                    .auction_id
                    .ok_or(AuctionError::MissingField("auction_id"))?;
                let data = frame.place_bid_data()?;
                let bid = self
                    .state
                    .bid_service
                    .place_bid(PlaceBidInput {
                        auction_id,
                        user_id: self.user_id,
                        client_id: self.client_id.clone(),
                        amount: data.amount,
                    })
                    .await?;
                // The accepted bid reaches this client through fan-out like
                // everyone else; no direct reply.
                tracing::info!(
                    bid_id = %bid.id,
                    auction_id = %auction_id,
                    client_id = %self.client_id,
                    "Bid placed over session",
                );
                Ok(())
            }
            ClientMessageType::CreateAuction => {
                let data = frame.create_auction_data()?;
                let auction = self
                    .state
                    .auction_service
                    .create_auction(CreateAuctionInput {
                        item_id:        data.item_id,
                        creator_id:     self.user_id,
                        start_time:     data.start_time,
                        end_time:       data.end_time,
                        starting_price: data.starting_price,
                    })
                    .await?;
                self.reply(
                    ServerMessage::new(ServerMessageType::AuctionCreated)
                        .with_auction_id(auction.id)
                        .with_data(Self::auction_record(&auction)),
                )
                .await
            }
            ClientMessageType::GetAuction => {
                let auction_id = frame
                    .auction_id
                    .ok_or(AuctionError::MissingField("auction_id"))?;
                let auction = self.state.auction_service.get_auction(auction_id).await?;
                self.reply(
                    ServerMessage::new(ServerMessageType::AuctionUpdate)
                        .with_auction_id(auction_id)
                        .with_data(Self::auction_record(&auction)),
                )
                .await
            }
            ClientMessageType::ListAuctions => {
                let data = frame.list_auctions_data();
                let auctions = self
                    .state
                    .auction_service
                    .list_auctions(ListAuctionsInput {
                        status: None,
                        limit:  data.limit,
                        offset: data.offset,
                    })
                    .await?;
                let records: Vec<_> = auctions.iter().map(Self::auction_record).collect();
                self.reply(
                    ServerMessage::new(ServerMessageType::AuctionUpdate).with_data(json!({
                        "auctions": records,
                        "count": records.len(),
                    })),
                )
                .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::api::messages::ServerMessage,
    };

    #[tokio::test]
    async fn enqueue_fails_fast_once_the_queue_stays_saturated() {
        let (outbound, mut outbound_rx) = mpsc::channel(2);
        for _ in 0..2 {
            assert!(enqueue(&outbound, ServerMessage::new(ServerMessageType::Pong)).await);
        }
        // Queue is full and nothing drains it within the fallback window.
        assert!(!enqueue(&outbound, ServerMessage::new(ServerMessageType::Pong)).await);

        // Draining restores delivery.
        outbound_rx.recv().await.unwrap();
        assert!(enqueue(&outbound, ServerMessage::new(ServerMessageType::Pong)).await);
    }

    #[tokio::test]
    async fn enqueue_reports_closed_sessions() {
        let (outbound, outbound_rx) = mpsc::channel(2);
        drop(outbound_rx);
        assert!(!enqueue(&outbound, ServerMessage::new(ServerMessageType::Pong)).await);
    }
}
