//! Port traits defining the engine's external boundaries.
//!
//! The real HTTP client sits behind [`Transport`]; persisted bodies sit
//! behind [`BodyStore`]. Implementations live in `src/adapters/`.

pub mod body_store;
pub mod transport;

pub use body_store::BodyStore;
pub use transport::{Body, Headers, HttpVersion, Request, Response, Transport};
