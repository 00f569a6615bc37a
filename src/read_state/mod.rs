pub mod read_state_repository;

pub use read_state_repository::{has_unseen_activity, ReadStateRepository};
