use std::sync::Arc;

use application::{
    ConversationService, DispatchMetrics, FanoutHub, InboxService, StreamNotifier,
};

#[derive(Clone)]
pub struct AppState {
    pub inbox_service: Arc<InboxService>,
    pub conversation_service: Arc<ConversationService>,
    pub notifier: StreamNotifier,
    pub fanout: Arc<FanoutHub>,
    pub metrics: Arc<DispatchMetrics>,
}

impl AppState {
    pub fn new(
        inbox_service: Arc<InboxService>,
        conversation_service: Arc<ConversationService>,
        notifier: StreamNotifier,
        fanout: Arc<FanoutHub>,
        metrics: Arc<DispatchMetrics>,
    ) -> Self {
        Self {
            inbox_service,
            conversation_service,
            notifier,
            fanout,
            metrics,
        }
    }
}
