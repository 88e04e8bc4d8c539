use tokio::sync::OwnedRwLockWriteGuard;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::conflict::{self, now_ms};
use super::sync;
use super::{Engine, EngineError};

fn require_name(value: &str, empty: &'static str, too_long: &'static str) -> Result<(), EngineError> {
    if value.is_empty() {
        return Err(EngineError::MalformedInput(empty));
    }
    if value.len() > MAX_NAME_LEN {
        return Err(EngineError::MalformedInput(too_long));
    }
    Ok(())
}

impl Engine {
    // ── Machines ─────────────────────────────────────────────

    pub async fn create_machine(&self, draft: MachineDraft) -> Result<MachineState, EngineError> {
        require_name(
            &draft.device_name,
            "deviceName must not be empty",
            "deviceName too long",
        )?;

        let id = Ulid::new();
        let event = Event::MachineCreated {
            id,
            machine_type: draft.machine_type,
            fablab_id: draft.fablab_id.clone(),
            device_name: draft.device_name.clone(),
            manufacturer: draft.manufacturer.clone(),
            activated: draft.activated,
        };
        self.wal_append(&event).await?;

        let state = MachineState {
            id,
            machine_type: draft.machine_type,
            fablab_id: draft.fablab_id,
            device_name: draft.device_name,
            manufacturer: draft.manufacturer,
            activated: draft.activated,
            schedules: Vec::new(),
        };
        self.store.insert_machine(state.clone());
        tracing::info!("created machine {id}");
        Ok(state)
    }

    pub async fn update_machine(
        &self,
        id: Ulid,
        patch: MachinePatch,
    ) -> Result<MachineState, EngineError> {
        let rs = self.store.get_machine(&id).ok_or(EngineError::NotFound(id))?;
        let mut guard = rs.write().await;

        let fablab_id = patch.fablab_id.unwrap_or_else(|| guard.fablab_id.clone());
        let device_name = patch.device_name.unwrap_or_else(|| guard.device_name.clone());
        let manufacturer = patch.manufacturer.or_else(|| guard.manufacturer.clone());
        let activated = patch.activated.unwrap_or(guard.activated);
        require_name(
            &device_name,
            "deviceName must not be empty",
            "deviceName too long",
        )?;

        let event = Event::MachineUpdated {
            id,
            fablab_id: fablab_id.clone(),
            device_name: device_name.clone(),
            manufacturer: manufacturer.clone(),
            activated,
        };
        self.wal_append(&event).await?;

        guard.fablab_id = fablab_id;
        guard.device_name = device_name;
        guard.manufacturer = manufacturer;
        guard.activated = activated;
        Ok(guard.clone())
    }

    /// Machines with booked schedules cannot be deleted: removing one would
    /// orphan its schedules' machine references.
    pub async fn delete_machine(&self, id: Ulid) -> Result<MachineState, EngineError> {
        let rs = self.store.get_machine(&id).ok_or(EngineError::NotFound(id))?;
        let guard = rs.write().await;
        if !guard.schedules.is_empty() {
            return Err(EngineError::MachineBusy(id));
        }

        let event = Event::MachineDeleted { id };
        self.wal_append(&event).await?;
        self.store.remove_machine(&id);
        tracing::info!("deleted machine {id}");
        Ok(guard.clone())
    }

    // ── Schedules ────────────────────────────────────────────

    /// Validate → conflict-check → persist → synchronize, all under the
    /// target machine's write lock. Two overlapping creates racing for the
    /// same machine serialize here; the loser sees the winner's booking.
    pub async fn create_schedule(&self, draft: ScheduleDraft) -> Result<Schedule, EngineError> {
        let span = conflict::validate_span(draft.start_date, draft.end_date)?;
        let rs = self.store.resolve_machine(&draft.machine).await?;
        let mut guard = rs.write().await;

        self.reject_conflicts(&guard, &span, None)?;

        let id = Ulid::new();
        let event = Event::ScheduleCreated {
            id,
            start_date: draft.start_date,
            end_date: draft.end_date,
            machine: draft.machine,
            fablab_id: draft.fablab_id.clone(),
            order_id: draft.order_id,
        };
        self.wal_append(&event).await?;

        let schedule = Schedule {
            id,
            start_date: draft.start_date,
            end_date: draft.end_date,
            machine: draft.machine,
            fablab_id: draft.fablab_id,
            order_id: draft.order_id,
        };
        self.store.insert_schedule(schedule.clone());
        sync::attach(&mut guard, id);
        tracing::info!("created schedule {id} on machine {}", draft.machine.id);
        Ok(schedule)
    }

    /// Patch a schedule. When the machine reference changes, both the old
    /// and the new machine are locked (in sorted id order, so two opposite
    /// moves cannot deadlock) and the id is detached from one list and
    /// attached to the other in the same step.
    pub async fn update_schedule(
        &self,
        id: Ulid,
        patch: SchedulePatch,
    ) -> Result<Schedule, EngineError> {
        let current = self.store.get_schedule(&id).ok_or(EngineError::NotFound(id))?;

        let machine = patch.machine.unwrap_or(current.machine);
        let start_date = patch.start_date.unwrap_or(current.start_date);
        let end_date = patch.end_date.unwrap_or(current.end_date);
        let span = conflict::validate_span(start_date, end_date)?;

        let new_rs = self.store.resolve_machine(&machine).await?;
        let moved = machine.id != current.machine.id;
        let (mut new_guard, mut old_guard) = if moved {
            let old_rs = self.store.resolve_machine(&current.machine).await?;
            let (ng, og) = lock_pair(new_rs, machine.id, old_rs, current.machine.id).await;
            (ng, Some(og))
        } else {
            (new_rs.write_owned().await, None)
        };

        if patch.reschedules() {
            self.reject_conflicts(&new_guard, &span, Some(id))?;
        }

        let fablab_id = patch.fablab_id.unwrap_or(current.fablab_id);
        let order_id = patch.order_id.unwrap_or(current.order_id);
        let event = Event::ScheduleUpdated {
            id,
            start_date,
            end_date,
            machine,
            fablab_id: fablab_id.clone(),
            order_id,
        };
        self.wal_append(&event).await?;

        let updated = Schedule {
            id,
            start_date,
            end_date,
            machine,
            fablab_id,
            order_id,
        };
        self.store.insert_schedule(updated.clone());
        if let Some(og) = old_guard.as_mut() {
            sync::detach(og, &id);
        }
        sync::attach(&mut new_guard, id);
        Ok(updated)
    }

    pub async fn delete_schedule(&self, id: Ulid) -> Result<Schedule, EngineError> {
        let current = self.store.get_schedule(&id).ok_or(EngineError::NotFound(id))?;
        let rs = self.store.resolve_machine(&current.machine).await?;
        let mut guard = rs.write().await;

        let event = Event::ScheduleDeleted { id };
        self.wal_append(&event).await?;

        self.store.remove_schedule(&id);
        sync::detach(&mut guard, &id);
        tracing::info!("deleted schedule {id} from machine {}", current.machine.id);
        Ok(current)
    }

    fn reject_conflicts(
        &self,
        machine: &MachineState,
        span: &Span,
        exclude: Option<Ulid>,
    ) -> Result<(), EngineError> {
        conflict::check_no_conflict(machine, &self.store, span, exclude).inspect_err(|e| {
            if matches!(e, EngineError::ScheduleConflict { .. }) {
                metrics::counter!(crate::observability::SCHEDULE_CONFLICTS_TOTAL).increment(1);
            }
        })
    }

    // ── Orders ───────────────────────────────────────────────

    pub async fn create_order(&self, draft: OrderDraft) -> Result<Order, EngineError> {
        require_name(&draft.owner, "owner must not be empty", "owner too long")?;

        let order = Order {
            id: Ulid::new(),
            status: draft.status.unwrap_or(OrderStatus::New),
            comments: Vec::new(),
            owner: draft.owner,
            editor: draft.editor,
            files: draft.files,
            machine: draft.machine,
            token: draft.token,
        };
        let event = Event::OrderCreated {
            order: order.clone(),
        };
        self.wal_append(&event).await?;
        self.store.insert_order(order.clone());
        Ok(order)
    }

    pub async fn update_order(&self, id: Ulid, patch: OrderPatch) -> Result<Order, EngineError> {
        let current = self.store.get_order(&id).ok_or(EngineError::NotFound(id))?;

        let status = patch.status.unwrap_or(current.status);
        let owner = patch.owner.unwrap_or(current.owner);
        let editor = patch.editor.or(current.editor);
        let files = patch.files.unwrap_or(current.files);
        let machine = patch.machine.or(current.machine);
        let token = patch.token.or(current.token);
        require_name(&owner, "owner must not be empty", "owner too long")?;

        let event = Event::OrderUpdated {
            id,
            status,
            owner: owner.clone(),
            editor: editor.clone(),
            files: files.clone(),
            machine,
            token: token.clone(),
        };
        self.wal_append(&event).await?;

        self.store
            .with_order_mut(&id, |o| {
                o.status = status;
                o.owner = owner;
                o.editor = editor;
                o.files = files;
                o.machine = machine;
                o.token = token;
            })
            .ok_or(EngineError::NotFound(id))
    }

    /// Orders are never physically removed; deletion parks them in the
    /// `deleted` status so schedules keep a resolvable `order_id`.
    pub async fn delete_order(&self, id: Ulid) -> Result<Order, EngineError> {
        if self.store.get_order(&id).is_none() {
            return Err(EngineError::NotFound(id));
        }
        let event = Event::OrderDeleted { id };
        self.wal_append(&event).await?;
        self.store
            .with_order_mut(&id, |o| o.status = OrderStatus::Deleted)
            .ok_or(EngineError::NotFound(id))
    }

    pub async fn add_comment(
        &self,
        order_id: Ulid,
        author: String,
        content: String,
    ) -> Result<Order, EngineError> {
        require_name(&author, "author must not be empty", "author too long")?;
        if content.is_empty() {
            return Err(EngineError::MalformedInput("content must not be empty"));
        }
        if content.len() > MAX_COMMENT_LEN {
            return Err(EngineError::MalformedInput("content too long"));
        }
        if self.store.get_order(&order_id).is_none() {
            return Err(EngineError::NotFound(order_id));
        }

        let comment = Comment {
            author,
            content,
            created_at: now_ms(),
        };
        let event = Event::CommentAdded {
            order_id,
            comment: comment.clone(),
        };
        self.wal_append(&event).await?;
        self.store
            .with_order_mut(&order_id, |o| o.comments.push(comment))
            .ok_or(EngineError::NotFound(order_id))
    }
}

/// Acquire two machine write locks in sorted id order.
async fn lock_pair(
    new_rs: super::SharedMachineState,
    new_id: Ulid,
    old_rs: super::SharedMachineState,
    old_id: Ulid,
) -> (
    OwnedRwLockWriteGuard<MachineState>,
    OwnedRwLockWriteGuard<MachineState>,
) {
    if old_id < new_id {
        let og = old_rs.write_owned().await;
        let ng = new_rs.write_owned().await;
        (ng, og)
    } else {
        let ng = new_rs.write_owned().await;
        let og = old_rs.write_owned().await;
        (ng, og)
    }
}
