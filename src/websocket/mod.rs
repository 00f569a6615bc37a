pub mod connection;
pub mod handler;
pub mod publisher;
pub mod types;

pub use connection::{ConnectionManager, WsSender};
pub use handler::ws_handler;
pub use publisher::{run_relay, EventPublisher};
pub use types::WsMessage;
