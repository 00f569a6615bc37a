pub mod auth;
pub mod conversation;
pub mod db;
pub mod error;
pub mod extract;
pub mod message;
pub mod middleware;
pub mod read_state;
pub mod response;
pub mod routes;
pub mod state;
pub mod user;
pub mod websocket;
