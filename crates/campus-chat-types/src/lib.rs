//! Wire types shared by the campus-chat relay server and its clients.
//!
//! Everything here is plain data: the stored [`ChatMessage`] record, the
//! request / response bodies of the `/api/chat` routes, the
//! [`StreamEvent`]s pushed over the streaming route, and a small
//! server-sent-events frame decoder used on both sides of the relay.

pub mod message;
pub mod request;
pub mod sse;
pub mod stream;

pub use message::{ChatMessage, HistoryTurn, Role};
pub use request::{
    ChatRequest, ChatResponse, ClearResponse, ErrorBody, FieldError, HistoryResponse,
    MAX_MESSAGE_BYTES,
};
pub use sse::{SseDecoder, SseStep, sse_items};
pub use stream::StreamEvent;
