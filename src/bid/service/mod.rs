use {
    crate::{
        auction::repository::Database,
        broadcaster::Broadcaster,
    },
    std::sync::Arc,
};

pub mod place_bid;

pub struct ServiceInner {
    store:       Arc<dyn Database>,
    broadcaster: Arc<dyn Broadcaster>,
}

/// Bid admission: validates a candidate against the live auction state and
/// runs the optimistic-concurrency transaction against the store.
#[derive(Clone)]
pub struct Service(Arc<ServiceInner>);

impl std::ops::Deref for Service {
    type Target = ServiceInner;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Service {
    pub fn new(store: Arc<dyn Database>, broadcaster: Arc<dyn Broadcaster>) -> Self {
        Self(Arc::new(ServiceInner { store, broadcaster }))
    }
}
