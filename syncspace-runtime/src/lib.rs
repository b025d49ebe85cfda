//! syncspace-runtime - the command surface
//!
//! Composes identity, events, spaces, and documents into one process-wide
//! backend, and routes named commands with protobuf payloads to handlers.
//!
//! The dispatcher is stateless; everything mutable lives in the `Backend`
//! lifecycle controller and is reached through an explicit `Arc` handed to
//! the handler closures at registration time.

pub mod backend;
pub mod dispatcher;
pub mod error;
pub mod handlers;

pub use backend::{Backend, WorldView};
pub use dispatcher::Dispatcher;
pub use error::CommandError;
pub use handlers::register_all;
