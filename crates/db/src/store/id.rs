use std::collections::HashSet;
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use chrono::Local;

use crate::error::{StoreError, StoreResult};

const MAX_DAILY_SERIAL: u32 = 999;
const FALLBACK_MAX_WAIT: Duration = Duration::from_secs(3);

/// Allocate the next free `YYMMDD-NNN` id for today, falling back to
/// `YYMMDD_HHMMSS` (retried across second boundaries) once all 999 serials
/// for the day are in use.
pub fn next_id(existing_ids: &HashSet<String>) -> StoreResult<String> {
    let day = Local::now().format("%y%m%d").to_string();
    for serial in 1..=MAX_DAILY_SERIAL {
        let candidate = format!("{day}-{serial:03}");
        if !existing_ids.contains(&candidate) {
            return Ok(candidate);
        }
    }
    next_id_timestamp_fallback(existing_ids)
}

fn next_id_timestamp_fallback(existing_ids: &HashSet<String>) -> StoreResult<String> {
    let deadline = Instant::now() + FALLBACK_MAX_WAIT;
    loop {
        let candidate = Local::now().format("%y%m%d_%H%M%S").to_string();
        if !existing_ids.contains(&candidate) {
            return Ok(candidate);
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(StoreError::IdSpaceExhausted);
        }

        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
        let wait_to_next_second = Duration::from_secs(1) - Duration::from_nanos((now.as_nanos() % 1_000_000_000) as u64);
        let sleep_for = wait_to_next_second.min(remaining).max(Duration::from_millis(10));
        thread::sleep(sleep_for);
    }
}
