use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::RwLock;
use ulid::Ulid;

use crate::model::*;

use super::sync;
use super::EngineError;

pub type SharedMachineState = Arc<RwLock<MachineState>>;

/// Equality filters for machine listings. Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct MachineFilter {
    pub machine_type: Option<MachineType>,
    pub fablab_id: Option<String>,
}

impl MachineFilter {
    fn matches(&self, m: &MachineState) -> bool {
        self.machine_type.is_none_or(|t| t == m.machine_type)
            && self.fablab_id.as_ref().is_none_or(|f| *f == m.fablab_id)
    }
}

/// Equality filters for schedule listings.
#[derive(Debug, Clone, Default)]
pub struct ScheduleFilter {
    pub machine_id: Option<Ulid>,
    pub order_id: Option<Ulid>,
    pub fablab_id: Option<String>,
}

impl ScheduleFilter {
    fn matches(&self, s: &Schedule) -> bool {
        self.machine_id.is_none_or(|id| id == s.machine.id)
            && self.order_id.is_none_or(|id| id == s.order_id)
            && self.fablab_id.as_ref().is_none_or(|f| *f == s.fablab_id)
    }
}

/// Equality filter for order listings.
#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
}

impl OrderFilter {
    fn matches(&self, o: &Order) -> bool {
        self.status.is_none_or(|s| s == o.status)
    }
}

/// In-memory document collections, rebuilt from the WAL on startup.
///
/// Machine documents sit behind an async RwLock each: the machine's write
/// lock is the serialization point for every schedule mutation touching it.
/// Schedules and orders are plain documents; they are only written while the
/// owning machine's lock (schedules) or no lock at all (orders) is held.
pub struct Store {
    machines: DashMap<Ulid, SharedMachineState>,
    schedules: DashMap<Ulid, Schedule>,
    orders: DashMap<Ulid, Order>,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    pub fn new() -> Self {
        Self {
            machines: DashMap::new(),
            schedules: DashMap::new(),
            orders: DashMap::new(),
        }
    }

    // ── Machines ─────────────────────────────────────────────

    pub fn insert_machine(&self, state: MachineState) -> SharedMachineState {
        let id = state.id;
        let shared = Arc::new(RwLock::new(state));
        self.machines.insert(id, shared.clone());
        shared
    }

    pub fn get_machine(&self, id: &Ulid) -> Option<SharedMachineState> {
        self.machines.get(id).map(|e| e.value().clone())
    }

    pub fn remove_machine(&self, id: &Ulid) {
        self.machines.remove(id);
    }

    /// Resolve a typed machine reference. The id must exist AND the stored
    /// type tag must equal the declared one — a wrong-type reference is
    /// `NotFound`, never silently accepted.
    pub async fn resolve_machine(
        &self,
        r: &MachineRef,
    ) -> Result<SharedMachineState, EngineError> {
        let rs = self
            .get_machine(&r.id)
            .ok_or(EngineError::NotFound(r.id))?;
        if rs.read().await.machine_type != r.machine_type {
            return Err(EngineError::NotFound(r.id));
        }
        Ok(rs)
    }

    pub async fn list_machines(&self, filter: &MachineFilter) -> Vec<MachineState> {
        // Collect the Arcs first: awaiting while holding a DashMap shard
        // guard could deadlock against writers.
        let arcs: Vec<SharedMachineState> =
            self.machines.iter().map(|e| e.value().clone()).collect();
        let mut out = Vec::new();
        for rs in arcs {
            let guard = rs.read().await;
            if filter.matches(&guard) {
                out.push(guard.clone());
            }
        }
        out
    }

    // ── Schedules ────────────────────────────────────────────

    pub fn insert_schedule(&self, schedule: Schedule) {
        self.schedules.insert(schedule.id, schedule);
    }

    pub fn get_schedule(&self, id: &Ulid) -> Option<Schedule> {
        self.schedules.get(id).map(|e| e.value().clone())
    }

    pub fn remove_schedule(&self, id: &Ulid) -> Option<Schedule> {
        self.schedules.remove(id).map(|(_, s)| s)
    }

    pub fn list_schedules(&self, filter: &ScheduleFilter) -> Vec<Schedule> {
        self.schedules
            .iter()
            .filter(|e| filter.matches(e.value()))
            .map(|e| e.value().clone())
            .collect()
    }

    // ── Orders ───────────────────────────────────────────────

    pub fn insert_order(&self, order: Order) {
        self.orders.insert(order.id, order);
    }

    pub fn get_order(&self, id: &Ulid) -> Option<Order> {
        self.orders.get(id).map(|e| e.value().clone())
    }

    /// Mutate one order in place. Returns the updated document, or `None`
    /// when the id does not resolve.
    pub fn with_order_mut(
        &self,
        id: &Ulid,
        mutate: impl FnOnce(&mut Order),
    ) -> Option<Order> {
        self.orders.get_mut(id).map(|mut e| {
            mutate(e.value_mut());
            e.value().clone()
        })
    }

    pub fn list_orders(&self, filter: &OrderFilter) -> Vec<Order> {
        self.orders
            .iter()
            .filter(|e| filter.matches(e.value()))
            .map(|e| e.value().clone())
            .collect()
    }

    pub fn count_orders(&self, filter: &OrderFilter) -> usize {
        self.orders.iter().filter(|e| filter.matches(e.value())).count()
    }

    // ── Replay ───────────────────────────────────────────────

    /// Rebuild state from the event history. Startup only: we are the sole
    /// owner of every Arc, so try_write always succeeds instantly. Events
    /// against documents the history no longer knows (damaged tail) are
    /// skipped rather than treated as fatal.
    pub(crate) fn replay(&self, events: &[Event]) {
        for event in events {
            match event {
                Event::MachineCreated {
                    id,
                    machine_type,
                    fablab_id,
                    device_name,
                    manufacturer,
                    activated,
                } => {
                    self.insert_machine(MachineState {
                        id: *id,
                        machine_type: *machine_type,
                        fablab_id: fablab_id.clone(),
                        device_name: device_name.clone(),
                        manufacturer: manufacturer.clone(),
                        activated: *activated,
                        schedules: Vec::new(),
                    });
                }
                Event::MachineUpdated {
                    id,
                    fablab_id,
                    device_name,
                    manufacturer,
                    activated,
                } => {
                    if let Some(rs) = self.get_machine(id) {
                        let mut guard = rs.try_write().expect("replay: uncontended write");
                        guard.fablab_id = fablab_id.clone();
                        guard.device_name = device_name.clone();
                        guard.manufacturer = manufacturer.clone();
                        guard.activated = *activated;
                    }
                }
                Event::MachineDeleted { id } => {
                    self.remove_machine(id);
                }
                Event::ScheduleCreated {
                    id,
                    start_date,
                    end_date,
                    machine,
                    fablab_id,
                    order_id,
                } => {
                    let Some(rs) = self.get_machine(&machine.id) else {
                        continue;
                    };
                    self.insert_schedule(Schedule {
                        id: *id,
                        start_date: *start_date,
                        end_date: *end_date,
                        machine: *machine,
                        fablab_id: fablab_id.clone(),
                        order_id: *order_id,
                    });
                    let mut guard = rs.try_write().expect("replay: uncontended write");
                    sync::attach(&mut guard, *id);
                }
                Event::ScheduleUpdated {
                    id,
                    start_date,
                    end_date,
                    machine,
                    fablab_id,
                    order_id,
                } => {
                    let Some(old) = self.get_schedule(id) else {
                        continue;
                    };
                    let Some(new_rs) = self.get_machine(&machine.id) else {
                        continue;
                    };
                    if old.machine.id != machine.id
                        && let Some(old_rs) = self.get_machine(&old.machine.id)
                    {
                        let mut guard = old_rs.try_write().expect("replay: uncontended write");
                        sync::detach(&mut guard, id);
                    }
                    self.insert_schedule(Schedule {
                        id: *id,
                        start_date: *start_date,
                        end_date: *end_date,
                        machine: *machine,
                        fablab_id: fablab_id.clone(),
                        order_id: *order_id,
                    });
                    let mut guard = new_rs.try_write().expect("replay: uncontended write");
                    sync::attach(&mut guard, *id);
                }
                Event::ScheduleDeleted { id } => {
                    if let Some(old) = self.remove_schedule(id)
                        && let Some(rs) = self.get_machine(&old.machine.id)
                    {
                        let mut guard = rs.try_write().expect("replay: uncontended write");
                        sync::detach(&mut guard, id);
                    }
                }
                Event::OrderCreated { order } => {
                    self.insert_order(order.clone());
                }
                Event::OrderUpdated {
                    id,
                    status,
                    owner,
                    editor,
                    files,
                    machine,
                    token,
                } => {
                    self.with_order_mut(id, |o| {
                        o.status = *status;
                        o.owner = owner.clone();
                        o.editor = editor.clone();
                        o.files = files.clone();
                        o.machine = *machine;
                        o.token = token.clone();
                    });
                }
                Event::OrderDeleted { id } => {
                    self.with_order_mut(id, |o| o.status = OrderStatus::Deleted);
                }
                Event::CommentAdded { order_id, comment } => {
                    self.with_order_mut(order_id, |o| o.comments.push(comment.clone()));
                }
            }
        }
    }

    // ── Snapshot ─────────────────────────────────────────────

    /// Emit the minimal event sequence that recreates the current state:
    /// machines first (so schedule attachment resolves), then schedules,
    /// then orders. Feeds WAL compaction.
    pub(crate) async fn snapshot_events(&self) -> Vec<Event> {
        let mut events = Vec::new();

        let mut machines = self.list_machines(&MachineFilter::default()).await;
        machines.sort_by_key(|m| m.id);
        for m in machines {
            events.push(Event::MachineCreated {
                id: m.id,
                machine_type: m.machine_type,
                fablab_id: m.fablab_id,
                device_name: m.device_name,
                manufacturer: m.manufacturer,
                activated: m.activated,
            });
        }

        let mut schedules = self.list_schedules(&ScheduleFilter::default());
        schedules.sort_by_key(|s| s.id);
        for s in schedules {
            events.push(Event::ScheduleCreated {
                id: s.id,
                start_date: s.start_date,
                end_date: s.end_date,
                machine: s.machine,
                fablab_id: s.fablab_id,
                order_id: s.order_id,
            });
        }

        let mut orders = self.list_orders(&OrderFilter::default());
        orders.sort_by_key(|o| o.id);
        for order in orders {
            events.push(Event::OrderCreated { order });
        }

        events
    }
}
