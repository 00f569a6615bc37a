pub mod conversation_aggregator;
pub mod conversation_dto;
pub mod conversation_handlers;
pub mod conversation_models;
pub mod conversation_repository;

pub use conversation_aggregator::ConversationAggregator;
pub use conversation_dto::CreateConversationRequest;
pub use conversation_models::{
    normalize_participants, participant_key, Conversation, ConversationView, Participant,
    ReadReceipt, UnreadSummary,
};
pub use conversation_repository::ConversationRepository;
