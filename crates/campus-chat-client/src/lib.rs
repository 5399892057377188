//! Browser-side half of campus-chat, for Rust callers.
//!
//! [`RelayClient`] speaks the `/api/chat` HTTP surface; [`ChatSession`]
//! layers the visitor-facing transcript and its Idle/Awaiting state machine
//! on top of it.

pub mod error;
pub mod relay;
pub mod session;

pub use error::ClientError;
pub use relay::{EventStream, RelayClient};
pub use session::{ChatSession, Notice, SessionState, TranscriptEntry, WELCOME_ID, WELCOME_TEXT};
