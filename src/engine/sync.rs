//! Schedule-Machine Synchronizer.
//!
//! Keeps a machine's `schedules` id list equal to the set of schedules whose
//! `machine` field references it. Both operations are idempotent, so event
//! replay and retried reconciliation cannot duplicate or over-remove ids.

use ulid::Ulid;

use crate::model::MachineState;

/// Record `schedule_id` as booked on `machine`. No-op if already present.
pub(crate) fn attach(machine: &mut MachineState, schedule_id: Ulid) {
    if !machine.schedules.contains(&schedule_id) {
        machine.schedules.push(schedule_id);
    }
}

/// Remove `schedule_id` from `machine`'s bookings. No-op if absent.
pub(crate) fn detach(machine: &mut MachineState, schedule_id: &Ulid) {
    machine.schedules.retain(|s| s != schedule_id);
}
