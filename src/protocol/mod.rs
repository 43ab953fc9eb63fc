//! # Chirp Wire Protocol
//!
//! JSON messages exchanged between browsers and publishers over multicast.
//!
//! ## Key Types
//!
//! - [`Message`] - A decoded, validated wire message
//! - [`MessageType`] - `new_listener`, `publish`, `remove_service`
//! - [`ValidationError`] - Why a candidate message was rejected
//! - [`DecodeError`] - Malformed JSON or failed validation
//!
//! ## Example
//!
//! ```ignore
//! use chirp::protocol::{Message, new_instance_id};
//!
//! let hello = Message::new_listener(new_instance_id(), "*");
//! let bytes = hello.to_bytes()?;
//! ```

pub mod identity;
pub mod message;

pub use identity::*;
pub use message::*;

mod tests;
