use ulid::Ulid;

use crate::limits::MAX_PAGE_LIMIT;
use crate::model::*;

use super::store::{MachineFilter, OrderFilter, ScheduleFilter};
use super::{Engine, EngineError};

/// Window an id-sorted snapshot: apply `skip`, then a clamped `limit`.
/// ULIDs are creation-ordered, so pagination is stable across requests.
fn paginate<T>(
    mut items: Vec<T>,
    id_of: impl Fn(&T) -> Ulid,
    limit: Option<usize>,
    skip: Option<usize>,
) -> Vec<T> {
    items.sort_by_key(|item| id_of(item));
    let rest = items.into_iter().skip(skip.unwrap_or(0));
    match limit {
        Some(limit) => rest.take(limit.min(MAX_PAGE_LIMIT)).collect(),
        None => rest.collect(),
    }
}

impl Engine {
    // ── Machines ─────────────────────────────────────────────

    pub async fn get_machine(&self, id: Ulid) -> Result<MachineState, EngineError> {
        let rs = self.store.get_machine(&id).ok_or(EngineError::NotFound(id))?;
        let guard = rs.read().await;
        Ok(guard.clone())
    }

    pub async fn list_machines(
        &self,
        filter: &MachineFilter,
        limit: Option<usize>,
        skip: Option<usize>,
    ) -> Vec<MachineState> {
        paginate(
            self.store.list_machines(filter).await,
            |m| m.id,
            limit,
            skip,
        )
    }

    // ── Schedules ────────────────────────────────────────────

    pub fn get_schedule(&self, id: Ulid) -> Result<Schedule, EngineError> {
        self.store.get_schedule(&id).ok_or(EngineError::NotFound(id))
    }

    pub fn list_schedules(
        &self,
        filter: &ScheduleFilter,
        limit: Option<usize>,
        skip: Option<usize>,
    ) -> Vec<Schedule> {
        paginate(self.store.list_schedules(filter), |s| s.id, limit, skip)
    }

    // ── Orders ───────────────────────────────────────────────

    pub fn get_order(&self, id: Ulid) -> Result<Order, EngineError> {
        self.store.get_order(&id).ok_or(EngineError::NotFound(id))
    }

    pub fn list_orders(
        &self,
        filter: &OrderFilter,
        limit: Option<usize>,
        skip: Option<usize>,
    ) -> Vec<Order> {
        paginate(self.store.list_orders(filter), |o| o.id, limit, skip)
    }

    pub fn count_orders(&self, filter: &OrderFilter) -> usize {
        self.store.count_orders(filter)
    }
}
