use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds — the only time type.
pub type Ms = i64;

/// Half-open interval `[start, end)`.
///
/// `start == end` is a legal zero-width span: it books no time and overlaps
/// nothing. `start > end` is malformed and rejected before a `Span` is ever
/// constructed (see `engine::conflict::validate_span`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start <= end, "Span start must not be after end");
        Self { start, end }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// True when the two intervals share at least one instant.
    /// Empty spans overlap nothing, including themselves.
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start.max(other.start) < self.end.min(other.end)
    }
}

/// The four machine variants of a fablab.
///
/// Wire tags match the original collection names, so a `machine.type` of
/// `"millingMachine"` round-trips unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MachineType {
    #[serde(rename = "printer")]
    Printer,
    #[serde(rename = "lasercutter")]
    Lasercutter,
    #[serde(rename = "millingMachine")]
    MillingMachine,
    #[serde(rename = "otherMachine")]
    OtherMachine,
}

impl std::fmt::Display for MachineType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self {
            MachineType::Printer => "printer",
            MachineType::Lasercutter => "lasercutter",
            MachineType::MillingMachine => "millingMachine",
            MachineType::OtherMachine => "otherMachine",
        };
        f.write_str(tag)
    }
}

/// A typed machine reference as carried by schedules and orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineRef {
    #[serde(rename = "type")]
    pub machine_type: MachineType,
    pub id: Ulid,
}

/// A machine document.
///
/// `schedules` holds the ids of every schedule currently booked on this
/// machine — exactly the set of schedules whose `machine` field references
/// it. The synchronizer (`engine::sync`) maintains that equality.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineState {
    pub id: Ulid,
    #[serde(rename = "type")]
    pub machine_type: MachineType,
    pub fablab_id: String,
    pub device_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    pub activated: bool,
    pub schedules: Vec<Ulid>,
}

impl MachineState {
    pub fn reference(&self) -> MachineRef {
        MachineRef {
            machine_type: self.machine_type,
            id: self.id,
        }
    }
}

/// Fields of a new machine, as posted by clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineDraft {
    #[serde(rename = "type")]
    pub machine_type: MachineType,
    pub fablab_id: String,
    pub device_name: String,
    #[serde(default)]
    pub manufacturer: Option<String>,
    #[serde(default = "default_activated")]
    pub activated: bool,
}

fn default_activated() -> bool {
    true
}

/// Partial machine update. The type tag is fixed at creation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MachinePatch {
    pub fablab_id: Option<String>,
    pub device_name: Option<String>,
    pub manufacturer: Option<String>,
    pub activated: Option<bool>,
}

/// A schedule document: one booking of one machine for one order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    pub id: Ulid,
    pub start_date: Ms,
    pub end_date: Ms,
    pub machine: MachineRef,
    pub fablab_id: String,
    pub order_id: Ulid,
}

impl Schedule {
    pub fn span(&self) -> Span {
        Span::new(self.start_date, self.end_date)
    }
}

/// Fields of a new schedule, as posted by clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleDraft {
    pub start_date: Ms,
    pub end_date: Ms,
    pub machine: MachineRef,
    pub fablab_id: String,
    pub order_id: Ulid,
}

/// Partial schedule update. Absent fields keep their stored value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SchedulePatch {
    pub start_date: Option<Ms>,
    pub end_date: Option<Ms>,
    pub machine: Option<MachineRef>,
    pub fablab_id: Option<String>,
    pub order_id: Option<Ulid>,
}

impl SchedulePatch {
    /// True when the patch touches the booked interval or the machine —
    /// the fields that require a fresh conflict check.
    pub fn reschedules(&self) -> bool {
        self.start_date.is_some() || self.end_date.is_some() || self.machine.is_some()
    }
}

/// Order lifecycle states, as used by the shop floor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    New,
    Assigned,
    Production,
    Shipment,
    Archived,
    Representative,
    Deleted,
}

/// A comment on an order. `created_at` is stamped server-side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub author: String,
    pub content: String,
    pub created_at: Ms,
}

/// An order document. Deleting an order is a status transition, not a
/// removal, so schedules referencing it stay resolvable.
///
/// No `skip_serializing_if` here: the whole document rides inside
/// `Event::OrderCreated`, and bincode needs every field present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: Ulid,
    pub status: OrderStatus,
    pub comments: Vec<Comment>,
    pub owner: String,
    pub editor: Option<String>,
    pub files: Vec<String>,
    pub machine: Option<MachineRef>,
    pub token: Option<String>,
}

/// Fields of a new order, as posted by clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDraft {
    #[serde(default)]
    pub status: Option<OrderStatus>,
    pub owner: String,
    #[serde(default)]
    pub editor: Option<String>,
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub machine: Option<MachineRef>,
    #[serde(default)]
    pub token: Option<String>,
}

/// Partial order update. Comments only change through `add_comment`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OrderPatch {
    pub status: Option<OrderStatus>,
    pub owner: Option<String>,
    pub editor: Option<String>,
    pub files: Option<Vec<String>>,
    pub machine: Option<MachineRef>,
    pub token: Option<String>,
}

/// The event types — flat fields, whole documents only where comments ride
/// along. This is the WAL record format; replaying it from an empty store
/// reproduces the current state, machine schedule lists included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    MachineCreated {
        id: Ulid,
        machine_type: MachineType,
        fablab_id: String,
        device_name: String,
        manufacturer: Option<String>,
        activated: bool,
    },
    MachineUpdated {
        id: Ulid,
        fablab_id: String,
        device_name: String,
        manufacturer: Option<String>,
        activated: bool,
    },
    MachineDeleted {
        id: Ulid,
    },
    ScheduleCreated {
        id: Ulid,
        start_date: Ms,
        end_date: Ms,
        machine: MachineRef,
        fablab_id: String,
        order_id: Ulid,
    },
    /// Carries the full post-update state; the machine the schedule moved
    /// away from (if any) is derived from the stored document at apply time.
    ScheduleUpdated {
        id: Ulid,
        start_date: Ms,
        end_date: Ms,
        machine: MachineRef,
        fablab_id: String,
        order_id: Ulid,
    },
    ScheduleDeleted {
        id: Ulid,
    },
    OrderCreated {
        order: Order,
    },
    /// Full post-update state except comments.
    OrderUpdated {
        id: Ulid,
        status: OrderStatus,
        owner: String,
        editor: Option<String>,
        files: Vec<String>,
        machine: Option<MachineRef>,
        token: Option<String>,
    },
    /// Soft delete: flips the order's status to `deleted`.
    OrderDeleted {
        id: Ulid,
    },
    CommentAdded {
        order_id: Ulid,
        comment: Comment,
    },
}
