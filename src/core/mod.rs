//! Core chat engines
//!
//! Canned replies for the client-side chat surfaces, the conversations that
//! use them, and the streaming gateway in front of the external model.

mod canned;
mod gateway;
mod registry;
mod session;

pub use gateway::{CompletionGateway, GatewayError};
pub use registry::ConversationRegistry;
pub use session::{ConversationError, ConversationSnapshot, Exchange, ReplyTiming};

#[cfg(test)]
pub(crate) use gateway::tests as gateway_stubs;
