use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::StoreResult;
use crate::store::atomic::{read_json_array, write_json_array_atomic};

/// Deserialize the JSON array at `path` into `Vec<T>`, skipping rows that
/// fail to parse (a forward-compatible row shape from a newer build should
/// not take the whole collection down).
pub fn load<T: DeserializeOwned>(path: &Path) -> Vec<T> {
    read_json_array(path)
        .into_iter()
        .filter_map(|v| serde_json::from_value(v).ok())
        .collect()
}

pub fn save<T: Serialize>(path: &Path, rows: &[T]) -> StoreResult<()> {
    let values = rows
        .iter()
        .map(serde_json::to_value)
        .collect::<Result<Vec<_>, _>>()?;
    write_json_array_atomic(path, &values)
}
