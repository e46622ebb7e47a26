pub mod conversation_service;
pub mod inbox_service;

pub use conversation_service::{
    ConversationService, ConversationServiceDependencies, ConversationSummary, MessageView,
    ParticipantView,
};
pub use inbox_service::{
    derive_dedupe_key, InboxService, InboxServiceDependencies, IngestOutcome, ListItemsQuery,
};
