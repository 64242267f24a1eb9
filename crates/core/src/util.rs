use std::time::{SystemTime, UNIX_EPOCH};

use uuid::Uuid;

/// Returns current unix epoch milliseconds.
pub fn now_ms() -> i64 {
    let dur = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock set before UNIX_EPOCH");
    dur.as_millis() as i64
}

/// Generates a fresh opaque task identifier (UUID v4).
pub fn new_task_id() -> String {
    Uuid::new_v4().to_string()
}
