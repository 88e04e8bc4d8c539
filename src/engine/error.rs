use ulid::Ulid;

#[derive(Debug)]
pub enum EngineError {
    /// Missing/invalid field, bad id format, start after end. Nothing was
    /// persisted.
    MalformedInput(&'static str),
    /// The candidate interval overlaps an existing schedule on the target
    /// machine. Names the machine and the first conflicting schedule.
    ScheduleConflict { machine_id: Ulid, schedule_id: Ulid },
    /// A referenced schedule, machine, or order id does not resolve.
    NotFound(Ulid),
    /// The machine still has booked schedules and cannot be deleted.
    MachineBusy(Ulid),
    /// The underlying persistence operation failed. Propagated, never
    /// retried.
    Store(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::MalformedInput(msg) => write!(f, "malformed input: {msg}"),
            EngineError::ScheduleConflict {
                machine_id,
                schedule_id,
            } => write!(
                f,
                "schedule dates overlap schedule {schedule_id} on machine {machine_id}"
            ),
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::MachineBusy(id) => {
                write!(f, "cannot delete machine {id}: schedules still booked")
            }
            EngineError::Store(e) => write!(f, "store error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
