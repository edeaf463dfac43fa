//! Service layer for the meeting service.
//!
//! # Components
//!
//! - `meeting_service` - Meeting lifecycle: tokens, expiry and write-once rules
//! - `chat_client` - HTTP client closing chats linked to meetings
//! - `call_client` - HTTP client setting variables on call engine calls

pub mod call_client;
pub mod chat_client;
pub mod meeting_service;

pub use call_client::{CallVariables, DisabledCallVariables, HttpCallVariables};
pub use chat_client::{ChatCloser, DisabledChatCloser, HttpChatCloser};
pub use meeting_service::{CallLink, MeetingService};
