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
};

/// In-process bus for single-instance deployments and tests. Fan-out is the
/// shared registry alone; there is no cross-instance transport to fail.
pub struct MemoryBroadcaster {
    registry: Registry,
}

impl MemoryBroadcaster {
    pub fn new() -> Self {
        Self {
            registry: Registry::new(),
        }
    }

    pub fn dropped_events(&self) -> u64 {
        self.registry.dropped_events()
    }
}

impl Default for MemoryBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Broadcaster for MemoryBroadcaster {
    async fn subscribe(
        &self,
        auction_id: AuctionId,
        client_id: &str,
        sink: EventSink,
    ) -> Result<(), AuctionError> {
        self.registry.attach(auction_id, client_id, sink).await;
        Ok(())
    }

    async fn resubscribe(
        &self,
        auction_id: AuctionId,
        client_id: &str,
    ) -> Result<(), AuctionError> {
        self.registry.attach_existing(auction_id, client_id).await?;
        Ok(())
    }

    async fn unsubscribe(
        &self,
        auction_id: AuctionId,
        client_id: &str,
    ) -> Result<(), AuctionError> {
        self.registry.detach(auction_id, client_id).await;
        Ok(())
    }

    async fn disconnect(&self, client_id: &str) {
        self.registry.detach_client(client_id).await;
    }

    async fn publish(&self, auction_id: AuctionId, event: Event) -> Result<(), AuctionError> {
        self.registry.deliver(auction_id, &event).await;
        Ok(())
    }

    async fn is_subscribed(&self, auction_id: AuctionId, client_id: &str) -> bool {
        self.registry.is_subscribed(auction_id, client_id).await
    }

    async fn subscribers(&self, auction_id: AuctionId) -> Vec<ClientId> {
        self.registry.subscribers(auction_id).await
    }
}
