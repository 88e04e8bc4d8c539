//! Schedule Validator: interval-overlap checking for one machine.

use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::store::Store;
use super::EngineError;

pub(crate) fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as Ms
}

/// Check the raw date pair before anything else runs. A reversed pair is
/// malformed input, not a conflict; it must never reach the overlap scan.
pub(crate) fn validate_span(start: Ms, end: Ms) -> Result<Span, EngineError> {
    if start > end {
        return Err(EngineError::MalformedInput("startDate must not be after endDate"));
    }
    if start < MIN_VALID_TIMESTAMP_MS || end > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::MalformedInput("timestamp out of range"));
    }
    if end - start > MAX_SPAN_DURATION_MS {
        return Err(EngineError::MalformedInput("schedule too long"));
    }
    Ok(Span::new(start, end))
}

/// Scan the machine's booked schedules for an interval overlapping the
/// candidate. `exclude` skips the schedule being updated in place. The first
/// conflicting schedule wins and is named in the error.
///
/// Caller holds the machine's write lock, so the list cannot change under
/// the scan and no concurrent check can interleave with the write that
/// follows a pass.
pub(crate) fn check_no_conflict(
    machine: &MachineState,
    store: &Store,
    candidate: &Span,
    exclude: Option<Ulid>,
) -> Result<(), EngineError> {
    if candidate.is_empty() {
        // Zero-width bookings occupy no time.
        return Ok(());
    }
    for sid in &machine.schedules {
        if exclude == Some(*sid) {
            continue;
        }
        let Some(existing) = store.get_schedule(sid) else {
            continue;
        };
        if candidate.overlaps(&existing.span()) {
            return Err(EngineError::ScheduleConflict {
                machine_id: machine.id,
                schedule_id: *sid,
            });
        }
    }
    Ok(())
}
