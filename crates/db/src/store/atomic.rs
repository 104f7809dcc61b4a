use std::io::Write;
use std::path::Path;

use serde_json::Value;

use crate::error::StoreResult;

/// Read a JSON array file, tolerating a missing file, empty file, or corrupt
/// content by treating all of them as an empty collection: a read failure
/// must never become a write failure.
pub fn read_json_array(path: &Path) -> Vec<Value> {
    let Ok(data) = std::fs::read_to_string(path) else {
        return Vec::new();
    };
    let trimmed = data.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Array(items)) => items,
        _ => Vec::new(),
    }
}

/// Write a JSON array atomically: serialize to a temp file in the same
/// directory, fsync it, then rename over the target. The rename is what
/// makes concurrent readers never observe a half-written file.
pub fn write_json_array_atomic(path: &Path, rows: &[Value]) -> StoreResult<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent)?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    let payload = serde_json::to_string_pretty(rows)?;
    tmp.write_all(payload.as_bytes())?;
    tmp.write_all(b"\n")?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
