//! Record and replay HTTP interactions at the transport boundary.
//!
//! Wrap a real [`Transport`] in an [`InterceptingTransport`] and start a
//! [`Recorder`] or [`Player`] on the [`SharedRegistry`] it consults. While a
//! recorder is active every exchange is forwarded and captured; saving it
//! writes a chain of steps to a directory. A player started on that
//! directory answers the same requests, in order, without any network.
//!
//! ```no_run
//! use httpreel::{
//!     InterceptingTransport, Recorder, Request, ReqwestTransport, SharedRegistry, Transport,
//! };
//!
//! # fn main() -> httpreel::Result<()> {
//! let registry = SharedRegistry::new();
//! let live = ReqwestTransport::new("http://localhost:8080")?;
//! let mut transport = InterceptingTransport::new(live, registry.clone());
//!
//! let recorder = Recorder::global();
//! recorder.recording(&registry, || transport.send(&Request::get("/")))??;
//! recorder.save(std::path::Path::new("recordings/home"))?;
//! # Ok(())
//! # }
//! ```

pub mod adapters;
pub mod cassette;
pub mod cli;
pub mod commands;
pub mod errors;
pub mod ports;
pub mod registry;

pub use adapters::live::{FsBodyStore, ReqwestTransport};
pub use adapters::{CannedResponse, FakeTransport, InterceptingTransport};
pub use cassette::config::ChainConfig;
pub use cassette::recorder::Recorder;
pub use cassette::replayer::Player;
pub use errors::{Error, Result};
pub use ports::{Body, BodyStore, Headers, HttpVersion, Request, Response, Transport};
pub use registry::{Caller, CallerId, CallerKey, CallerKind, SharedRegistry};

use clap::Parser;

/// Run the `reel` CLI with the provided arguments.
///
/// # Errors
///
/// Returns an error string when argument parsing fails or command execution fails.
pub fn run<I, T>(args: I) -> Result<(), String>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let cli = cli::Cli::try_parse_from(args).map_err(|err| err.to_string())?;
    commands::dispatch(&cli)
}
