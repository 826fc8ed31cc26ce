//! Session Coordination Module
//!
//! Multiplayer session lifecycle over an injected entity store:
//! - Atomic session + owner creation
//! - Ownership-gated start/end/remove/delete/list
//! - Best-effort cascading delete with skipped-item reporting
//! - Change events over a broadcast channel

pub mod events;
pub mod manager;
pub mod state;

pub use events::{SessionEvent, SessionEventEmitter, TimedEvent};
pub use manager::SessionCoordinator;
pub use state::{DeleteReport, Member, Outcome, Session, SessionPhase, SkipReason, SkippedItem};
