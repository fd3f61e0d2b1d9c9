use {
    crate::{
        api::ws::WsState,
        auction,
        bid,
        broadcaster::Broadcaster,
    },
    std::sync::Arc,
};

pub struct AppState {
    pub auction_service: auction::service::Service,
    pub bid_service:     bid::service::Service,
    pub broadcaster:     Arc<dyn Broadcaster>,
    pub ws:              WsState,
}
