use {
    super::repository::Database,
    crate::{
        broadcaster::Broadcaster,
        scheduler::TimerIndex,
    },
    std::sync::Arc,
};

pub mod create_auction;
pub mod end_auction;
pub mod get_auction;
pub mod list_auctions;
pub mod workers;

pub struct ServiceInner {
    store:       Arc<dyn Database>,
    timer_index: Arc<dyn TimerIndex>,
    broadcaster: Arc<dyn Broadcaster>,
}

/// Auction lifecycle: creation, reads, finalization, and the expiration
/// worker. The worker loop is a method on the service, so the scheduler
/// needs no back-reference to call finalization.
#[derive(Clone)]
pub struct Service(Arc<ServiceInner>);

impl std::ops::Deref for Service {
    type Target = ServiceInner;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Service {
    pub fn new(
        store: Arc<dyn Database>,
        timer_index: Arc<dyn TimerIndex>,
        broadcaster: Arc<dyn Broadcaster>,
    ) -> Self {
        Self(Arc::new(ServiceInner {
            store,
            timer_index,
            broadcaster,
        }))
    }
}
