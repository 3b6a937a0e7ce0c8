//! The `transport` module exposes the gateway to clients over WebSockets.
//!
//! It defines the JSON protocol spoken on the socket and the server loop that
//! forwards each submission to the `Gateway`.

pub mod message;
pub mod websocket;
