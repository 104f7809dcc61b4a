use std::fs::{File, OpenOptions};
use std::path::Path;

use fs2::FileExt;

use crate::error::StoreResult;

/// Exclusive advisory lock over a zero-byte file under `<state_dir>/locks/<name>.lock`.
/// Held for the lifetime of the guard; released (and the fd dropped) on drop.
pub struct FileLock {
    file: File,
}

impl FileLock {
    pub fn acquire(locks_dir: &Path, name: &str) -> StoreResult<Self> {
        std::fs::create_dir_all(locks_dir)?;
        let path = locks_dir.join(format!("{name}.lock"));
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        file.lock_exclusive()?;
        Ok(Self { file })
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}
