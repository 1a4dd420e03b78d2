//! Live body store adapter using `std::fs`.

use std::io;
use std::path::Path;

use uuid::Uuid;

use crate::ports::body_store::BodyStore;

/// Body store backed by plain files in the recording directory.
///
/// Writes go to a uniquely named temporary file first and are renamed
/// into place, so readers see either the old blob or the complete new one.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsBodyStore;

impl BodyStore for FsBodyStore {
    fn write(&self, name: &str, directory: &Path, content: &[u8]) -> io::Result<()> {
        std::fs::create_dir_all(directory)?;
        let staging = directory.join(format!(".{name}.{}.tmp", Uuid::new_v4().simple()));
        std::fs::write(&staging, content)?;
        if let Err(err) = std::fs::rename(&staging, directory.join(name)) {
            let _ = std::fs::remove_file(&staging);
            return Err(err);
        }
        log::debug!(
            "wrote body blob {name} ({} bytes) to {}",
            content.len(),
            directory.display(),
        );
        Ok(())
    }

    fn load(&self, name: &str, directory: &Path) -> io::Result<Vec<u8>> {
        std::fs::read(directory.join(name))
    }

    fn contains(&self, name: &str, directory: &Path) -> bool {
        directory.join(name).is_file()
    }
}
