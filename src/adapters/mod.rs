//! Transport implementations: the live adapters, a scripted fake, and the
//! intercepting decorator that routes calls to sessions.

pub mod fake;
pub mod intercepting;
pub mod live;

pub use fake::{CannedResponse, FakeTransport};
pub use intercepting::InterceptingTransport;
