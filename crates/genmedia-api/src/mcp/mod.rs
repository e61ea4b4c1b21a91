//! JSON-RPC protocol façade.
//!
//! Two transports share one method surface:
//! - legacy: `GET /mcp/sse` plus `POST /mcp/messages`, responses delivered
//!   over the SSE channel
//! - streamable: a single `POST /mcp` answering inline, with an SSE body for
//!   generation tools so the caller sees progress without polling

pub mod endpoints;
pub mod protocol;
pub mod streamable;
pub mod transport;

pub use protocol::McpSession;
