//! The `utils` module collects the pieces every component leans on:
//! the shared error taxonomy, logging setup, and the connection retry helper.

pub mod backoff;
pub mod error;
pub mod logging;
pub mod retry;
