pub mod message_dto;
pub mod message_handlers;
pub mod message_models;
pub mod message_repository;
pub mod message_service;

pub use message_dto::{EditMessageRequest, SendMessageRequest};
pub use message_models::{Attachment, Message, MessageResponse, MessageType, NewMessage, ReplyPreview};
pub use message_repository::MessageRepository;
pub use message_service::MessageService;
