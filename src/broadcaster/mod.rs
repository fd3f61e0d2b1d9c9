use {
    crate::kernel::{
        entities::{
            AuctionId,
            ClientId,
        },
        errors::AuctionError,
    },
    async_trait::async_trait,
    serde::{
        Deserialize,
        Serialize,
    },
    std::{
        collections::{
            HashMap,
            HashSet,
        },
        sync::atomic::{
            AtomicU64,
            Ordering,
        },
    },
    time::OffsetDateTime,
    tokio::sync::{
        mpsc,
        RwLock,
    },
};

pub mod memory;
pub mod redis;

/// Bounded queue the bus writes into for one client. The subscriber creates
/// it; the session's forwarder task drains it.
pub type EventSink = mpsc::Sender<Event>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "auction.created")]
    AuctionCreated,
    #[serde(rename = "bid.placed")]
    BidPlaced,
    #[serde(rename = "auction.ended")]
    AuctionEnded,
}

/// Self-describing envelope every event is serialized to before crossing the
/// bus. The bus is a transient delivery channel, not a log of record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub kind:       EventKind,
    pub auction_id: AuctionId,
    pub data:       serde_json::Value,
    pub timestamp:  i64,
}

impl Event {
    pub fn new(kind: EventKind, auction_id: AuctionId, data: serde_json::Value) -> Self {
        Self {
            kind,
            auction_id,
            data,
            timestamp: OffsetDateTime::now_utc().unix_timestamp(),
        }
    }
}

/// Topic-based fan-out, one logical topic per auction. Delivery is
/// best-effort and at-most-once; order is preserved per topic per subscriber
/// as long as the subscriber's sink is not saturated.
#[async_trait]
pub trait Broadcaster: Send + Sync {
    /// Idempotent per `(auction, client)`. The first subscription for a
    /// client attaches its sink; later ones reuse it.
    async fn subscribe(
        &self,
        auction_id: AuctionId,
        client_id: &str,
        sink: EventSink,
    ) -> Result<(), AuctionError>;

    /// Re-attach an already-connected client to a topic using its existing
    /// sink. No-op when the subscription is already present; fails when the
    /// client has no sink registered at all.
    async fn resubscribe(&self, auction_id: AuctionId, client_id: &str)
        -> Result<(), AuctionError>;

    /// Removes the subscription; dropping the last topic for a client closes
    /// its sink.
    async fn unsubscribe(&self, auction_id: AuctionId, client_id: &str)
        -> Result<(), AuctionError>;

    /// Session teardown: removes every subscription the client holds and
    /// releases its sink.
    async fn disconnect(&self, client_id: &str);

    /// Delivers to every current subscriber of the topic, fleet-wide.
    async fn publish(&self, auction_id: AuctionId, event: Event) -> Result<(), AuctionError>;

    /// Local fast check used by the bid admission preconditions.
    async fn is_subscribed(&self, auction_id: AuctionId, client_id: &str) -> bool;

    async fn subscribers(&self, auction_id: AuctionId) -> Vec<ClientId>;
}

#[derive(Default)]
struct RegistryInner {
    sinks:         HashMap<ClientId, EventSink>,
    topic_clients: HashMap<AuctionId, HashSet<ClientId>>,
    client_topics: HashMap<ClientId, HashSet<AuctionId>>,
}

/// Subscription bookkeeping shared by both bus adapters: one sink per
/// client, shared among all its topic subscriptions.
pub(crate) struct Registry {
    inner:          RwLock<RegistryInner>,
    dropped_events: AtomicU64,
}

pub(crate) struct Detach {
    pub removed:     bool,
    pub topic_empty: bool,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            inner:          RwLock::new(RegistryInner::default()),
            dropped_events: AtomicU64::new(0),
        }
    }

    /// Returns true when this is the first local subscriber of the topic.
    pub async fn attach(&self, auction_id: AuctionId, client_id: &str, sink: EventSink) -> bool {
        let mut inner = self.inner.write().await;
        if let Some(topics) = inner.client_topics.get(client_id) {
            if topics.contains(&auction_id) {
                tracing::debug!(
                    client_id = client_id,
                    auction_id = %auction_id,
                    "Client already subscribed to auction",
                );
                return false;
            }
        }
        inner
            .sinks
            .entry(client_id.to_owned())
            .or_insert_with(|| sink);
        inner
            .client_topics
            .entry(client_id.to_owned())
            .or_default()
            .insert(auction_id);
        let clients = inner.topic_clients.entry(auction_id).or_default();
        clients.insert(client_id.to_owned());
        clients.len() == 1
    }

    /// Like `attach` but reuses the sink registered by a prior subscription.
    pub async fn attach_existing(
        &self,
        auction_id: AuctionId,
        client_id: &str,
    ) -> Result<bool, AuctionError> {
        let mut inner = self.inner.write().await;
        if !inner.sinks.contains_key(client_id) {
            return Err(AuctionError::NotSubscribed);
        }
        if let Some(topics) = inner.client_topics.get(client_id) {
            if topics.contains(&auction_id) {
                return Ok(false);
            }
        }
        inner
            .client_topics
            .entry(client_id.to_owned())
            .or_default()
            .insert(auction_id);
        let clients = inner.topic_clients.entry(auction_id).or_default();
        clients.insert(client_id.to_owned());
        Ok(clients.len() == 1)
    }

    pub async fn detach(&self, auction_id: AuctionId, client_id: &str) -> Detach {
        let mut inner = self.inner.write().await;
        let mut removed = false;
        if let Some(topics) = inner.client_topics.get_mut(client_id) {
            removed = topics.remove(&auction_id);
            if topics.is_empty() {
                inner.client_topics.remove(client_id);
                inner.sinks.remove(client_id);
            }
        }
        let mut topic_empty = false;
        if let Some(clients) = inner.topic_clients.get_mut(&auction_id) {
            clients.remove(client_id);
            if clients.is_empty() {
                inner.topic_clients.remove(&auction_id);
                topic_empty = true;
            }
        }
        Detach {
            removed,
            topic_empty,
        }
    }

    /// Removes every subscription of the client. Returns the topics that now
    /// have no local subscriber left.
    pub async fn detach_client(&self, client_id: &str) -> Vec<AuctionId> {
        let mut inner = self.inner.write().await;
        inner.sinks.remove(client_id);
        let topics = inner.client_topics.remove(client_id).unwrap_or_default();
        let mut emptied = Vec::new();
        for auction_id in topics {
            if let Some(clients) = inner.topic_clients.get_mut(&auction_id) {
                clients.remove(client_id);
                if clients.is_empty() {
                    inner.topic_clients.remove(&auction_id);
                    emptied.push(auction_id);
                }
            }
        }
        emptied
    }

    /// Fan-out to every local subscriber of the topic. A saturated sink
    /// drops the event for that subscriber only; the drop is counted.
    pub async fn deliver(&self, auction_id: AuctionId, event: &Event) {
        let inner = self.inner.read().await;
        let Some(clients) = inner.topic_clients.get(&auction_id) else {
            return;
        };
        for client_id in clients {
            let Some(sink) = inner.sinks.get(client_id) else {
                continue;
            };
            if let Err(err) = sink.try_send(event.clone()) {
                self.dropped_events.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    client_id = %client_id,
                    auction_id = %auction_id,
                    error = %err,
                    "Subscriber sink saturated, dropping event",
                );
            }
        }
    }

    pub async fn is_subscribed(&self, auction_id: AuctionId, client_id: &str) -> bool {
        self.inner
            .read()
            .await
            .client_topics
            .get(client_id)
            .is_some_and(|topics| topics.contains(&auction_id))
    }

    pub async fn subscribers(&self, auction_id: AuctionId) -> Vec<ClientId> {
        self.inner
            .read()
            .await
            .topic_clients
            .get(&auction_id)
            .map(|clients| clients.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        serde_json::json,
        uuid::Uuid,
    };

    fn event(auction_id: AuctionId) -> Event {
        Event::new(EventKind::BidPlaced, auction_id, json!({"amount": "150"}))
    }

    #[tokio::test]
    async fn attach_is_idempotent_per_topic_and_client() {
        let registry = Registry::new();
        let auction_id = Uuid::new_v4();
        let (tx, mut rx) = mpsc::channel(4);

        assert!(registry.attach(auction_id, "c1", tx.clone()).await);
        assert!(!registry.attach(auction_id, "c1", tx.clone()).await);
        assert!(registry.is_subscribed(auction_id, "c1").await);

        registry.deliver(auction_id, &event(auction_id)).await;
        registry.deliver(auction_id, &event(auction_id)).await;
        assert_eq!(rx.recv().await.unwrap().kind, EventKind::BidPlaced);
        assert_eq!(rx.recv().await.unwrap().kind, EventKind::BidPlaced);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn saturated_sink_drops_without_blocking_others() {
        let registry = Registry::new();
        let auction_id = Uuid::new_v4();
        let (slow_tx, mut slow_rx) = mpsc::channel(1);
        let (fast_tx, mut fast_rx) = mpsc::channel(16);
        registry.attach(auction_id, "slow", slow_tx).await;
        registry.attach(auction_id, "fast", fast_tx).await;

        for _ in 0..3 {
            registry.deliver(auction_id, &event(auction_id)).await;
        }

        // The slow sink holds one event, the rest were dropped for it only.
        assert_eq!(registry.dropped_events(), 2);
        assert!(slow_rx.recv().await.is_some());
        for _ in 0..3 {
            assert!(fast_rx.recv().await.is_some());
        }
    }

    #[tokio::test]
    async fn detaching_last_topic_releases_the_sink() {
        let registry = Registry::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let (tx, mut rx) = mpsc::channel(4);
        registry.attach(a, "c1", tx.clone()).await;
        registry.attach(b, "c1", tx).await;

        let detach = registry.detach(a, "c1").await;
        assert!(detach.removed);
        assert!(detach.topic_empty);
        assert!(registry.is_subscribed(b, "c1").await);

        registry.detach(b, "c1").await;
        assert!(!registry.is_subscribed(b, "c1").await);
        // Both sender clones are gone, so the channel reports closed.
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn detach_client_reports_emptied_topics() {
        let registry = Registry::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let (tx1, _rx1) = mpsc::channel(4);
        let (tx2, _rx2) = mpsc::channel(4);
        registry.attach(a, "c1", tx1.clone()).await;
        registry.attach(b, "c1", tx1).await;
        registry.attach(b, "c2", tx2).await;

        let mut emptied = registry.detach_client("c1").await;
        emptied.sort();
        let mut expected = vec![a];
        expected.sort();
        assert_eq!(emptied, expected);
        assert_eq!(registry.subscribers(b).await, vec!["c2".to_string()]);
    }

    #[test]
    fn envelope_round_trips_with_dotted_type_names() {
        let auction_id = Uuid::new_v4();
        let event = Event::new(EventKind::AuctionEnded, auction_id, json!({"status": "ended"}));
        let encoded = serde_json::to_string(&event).unwrap();
        assert!(encoded.contains("\"auction.ended\""));
        let decoded: Event = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, event);
    }
}
