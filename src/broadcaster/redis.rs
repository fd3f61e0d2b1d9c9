use {
    super::{
        Broadcaster,
        Event,
        EventSink,
        Registry,
    },
    crate::kernel::{
        entities::{
            AuctionId,
            ClientId,
        },
        errors::AuctionError,
    },
    async_trait::async_trait,
    futures::StreamExt,
    redis::{
        aio::ConnectionManager,
        AsyncCommands,
    },
    std::{
        sync::Arc,
        time::Duration,
    },
    tokio::sync::mpsc,
};

const PUBLISH_TIMEOUT: Duration = Duration::from_secs(2);

fn topic(auction_id: AuctionId) -> String {
    format!("auction:{auction_id}")
}

fn parse_topic(channel: &str) -> Option<AuctionId> {
    channel.strip_prefix("auction:")?.parse().ok()
}

enum TopicCommand {
    Subscribe(AuctionId),
    Unsubscribe(AuctionId),
}

/// Fleet-wide bus: publications go through Redis pub/sub and come back to
/// every instance holding a subscription on the topic, including this one.
/// Local fan-out from the relay into the per-client sinks reuses the shared
/// registry. One pub/sub connection per instance; a topic is subscribed on
/// its first local subscriber and dropped with its last.
pub struct RedisBroadcaster {
    registry:       Arc<Registry>,
    conn:           ConnectionManager,
    topic_commands: mpsc::UnboundedSender<TopicCommand>,
}

impl RedisBroadcaster {
    pub async fn new(redis_url: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client.clone()).await?;
        let (mut sink, mut stream) = client.get_async_pubsub().await?.split();
        let registry = Arc::new(Registry::new());
        let (topic_commands, mut commands) = mpsc::unbounded_channel();

        let relay_registry = registry.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    command = commands.recv() => {
                        match command {
                            None => break,
                            Some(TopicCommand::Subscribe(auction_id)) => {
                                if let Err(err) = sink.subscribe(topic(auction_id)).await {
                                    tracing::error!(
                                        auction_id = %auction_id,
                                        error = %err,
                                        "Failed to subscribe to bus topic",
                                    );
                                }
                            }
                            Some(TopicCommand::Unsubscribe(auction_id)) => {
                                if let Err(err) = sink.unsubscribe(topic(auction_id)).await {
                                    tracing::error!(
                                        auction_id = %auction_id,
                                        error = %err,
                                        "Failed to unsubscribe from bus topic",
                                    );
                                }
                            }
                        }
                    }
                    message = stream.next() => {
                        let Some(message) = message else {
                            tracing::error!("Bus pub/sub stream ended");
                            break;
                        };
                        let Some(auction_id) = parse_topic(message.get_channel_name()) else {
                            continue;
                        };
                        let payload: String = match message.get_payload() {
                            Ok(payload) => payload,
                            Err(err) => {
                                tracing::warn!(error = %err, "Undecodable bus payload");
                                continue;
                            }
                        };
                        match serde_json::from_str::<Event>(&payload) {
                            Ok(event) => relay_registry.deliver(auction_id, &event).await,
                            Err(err) => {
                                tracing::warn!(
                                    auction_id = %auction_id,
                                    error = %err,
                                    "Discarding malformed bus event",
                                );
                            }
                        }
                    }
                }
            }
            tracing::info!("Bus relay stopped");
        });

        Ok(Self {
            registry,
            conn,
            topic_commands,
        })
    }

    fn request_topic(&self, command: TopicCommand) -> Result<(), AuctionError> {
        self.topic_commands
            .send(command)
            .map_err(|_| AuctionError::Transient("bus relay is gone".to_string()))
    }

    pub fn dropped_events(&self) -> u64 {
        self.registry.dropped_events()
    }
}

#[async_trait]
impl Broadcaster for RedisBroadcaster {
    async fn subscribe(
        &self,
        auction_id: AuctionId,
        client_id: &str,
        sink: EventSink,
    ) -> Result<(), AuctionError> {
        if self.registry.attach(auction_id, client_id, sink).await {
            self.request_topic(TopicCommand::Subscribe(auction_id))?;
        }
        Ok(())
    }

    async fn resubscribe(
        &self,
        auction_id: AuctionId,
        client_id: &str,
    ) -> Result<(), AuctionError> {
        if self.registry.attach_existing(auction_id, client_id).await? {
            self.request_topic(TopicCommand::Subscribe(auction_id))?;
        }
        Ok(())
    }

    async fn unsubscribe(
        &self,
        auction_id: AuctionId,
        client_id: &str,
    ) -> Result<(), AuctionError> {
        if self.registry.detach(auction_id, client_id).await.topic_empty {
            self.request_topic(TopicCommand::Unsubscribe(auction_id))?;
        }
        Ok(())
    }

    async fn disconnect(&self, client_id: &str) {
        for auction_id in self.registry.detach_client(client_id).await {
            if let Err(err) = self.request_topic(TopicCommand::Unsubscribe(auction_id)) {
                tracing::warn!(
                    auction_id = %auction_id,
                    error = %err,
                    "Failed to release bus topic on disconnect",
                );
            }
        }
    }

    async fn publish(&self, auction_id: AuctionId, event: Event) -> Result<(), AuctionError> {
        let payload = serde_json::to_string(&event).map_err(AuctionError::transient)?;
        let mut conn = self.conn.clone();
        let receivers: i64 =
            tokio::time::timeout(PUBLISH_TIMEOUT, conn.publish(topic(auction_id), payload))
                .await
                .map_err(|_| AuctionError::Transient("bus publish timed out".to_string()))?
                .map_err(AuctionError::transient)?;
        tracing::debug!(
            auction_id = %auction_id,
            event_type = ?event.kind,
            receivers,
            "Published event to auction topic",
        );
        Ok(())
    }

    async fn is_subscribed(&self, auction_id: AuctionId, client_id: &str) -> bool {
        self.registry.is_subscribed(auction_id, client_id).await
    }

    async fn subscribers(&self, auction_id: AuctionId) -> Vec<ClientId> {
        self.registry.subscribers(auction_id).await
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        uuid::Uuid,
    };

    #[test]
    fn topic_names_round_trip() {
        let auction_id = Uuid::new_v4();
        assert_eq!(parse_topic(&topic(auction_id)), Some(auction_id));
        assert_eq!(parse_topic("auction:not-a-uuid"), None);
        assert_eq!(parse_topic("other:channel"), None);
    }
}
