use crate::config::{DEDUP_TOLERANCE, DEDUP_WINDOW_MS};
use crate::types::SnapshotRow;

/// Whether `candidate` is materially new relative to the last stored row for
/// the same key. Only an unchanged price strictly inside the dedup window is
/// rejected: any movement is stored at once, and a call after the window is
/// stored regardless (heartbeat).
pub fn should_insert(candidate: &SnapshotRow, last: Option<&SnapshotRow>) -> bool {
    let Some(last) = last else {
        return true;
    };
    let elapsed_ms = candidate.ts - last.ts;
    if elapsed_ms < DEDUP_WINDOW_MS
        && (candidate.yes - last.yes).abs() <= DEDUP_TOLERANCE
        && (candidate.no - last.no).abs() <= DEDUP_TOLERANCE
    {
        return false;
    }
    true
}
