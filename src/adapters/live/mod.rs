//! Live adapters for real external interactions.

pub mod body_store;
pub mod transport;

pub use body_store::FsBodyStore;
pub use transport::ReqwestTransport;
