// Lobby - multiplayer game session coordination
//
// The coordinator (`session`) only talks to storage through the
// `store::EntityStore` trait; `web_server` is the HTTP front for it.

pub mod config;
pub mod error;
pub mod session;
pub mod store;
pub mod web_server;

pub use config::{LobbyConfig, StaleJoinPolicy};
pub use error::{CoordinatorError, CoordinatorResult, ErrorKind};
pub use session::SessionCoordinator;
