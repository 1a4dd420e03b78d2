//! Body store port for request and response bodies kept outside the chain file.

use std::io;
use std::path::Path;

/// Loads and writes named body blobs inside a recording directory.
///
/// Implementations hold no per-session state; every call names the blob
/// and the directory it lives in.
pub trait BodyStore: Send + Sync {
    /// Writes `content` as blob `name` inside `directory`.
    ///
    /// A concurrent reader must never observe a partially written blob.
    ///
    /// # Errors
    ///
    /// Returns an error if the blob cannot be written.
    fn write(&self, name: &str, directory: &Path, content: &[u8]) -> io::Result<()>;

    /// Loads blob `name` from `directory`.
    ///
    /// # Errors
    ///
    /// Returns an error if the blob does not exist or cannot be read.
    fn load(&self, name: &str, directory: &Path) -> io::Result<Vec<u8>>;

    /// Returns `true` if blob `name` exists inside `directory`.
    fn contains(&self, name: &str, directory: &Path) -> bool {
        self.load(name, directory).is_ok()
    }
}
