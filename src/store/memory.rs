use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::assignment::Assignment;
use crate::models::owner::Owner;
use crate::models::position::PositionReport;
use crate::models::requester::Requester;
use crate::models::ride::Ride;
use crate::models::ride_status::{RideHistory, RideStage};
use crate::models::unit::{DistanceCache, ModelClass, Unit};
use crate::store::{AssignmentTx, DispatchStore, FreeUnit};

/// In-process store backing the dispatch core.
///
/// Rows live in `DashMap`s, which serialize writers per key. The
/// `assignment_gate` orders the one cross-row write (a matching commit)
/// against every read of `Ride::unit_id` or of the unit-to-ride index, so a
/// batch is observed either entirely or not at all.
///
/// Rides without a unit are also kept in `waiting`, ordered by
/// `(created_at, id)`, so a matching cycle reads only the head of the queue.
/// `open_rides` maps a requester to its newest ride; intake holds that
/// entry while it checks and inserts.
///
/// Nested locks are only ever taken in this order: `open_rides`, the
/// assignment gate, `waiting`, then any row map.
pub struct MemoryStore {
    owners: DashMap<Uuid, Owner>,
    requesters: DashMap<Uuid, Requester>,
    models: DashMap<String, ModelClass>,
    units: DashMap<Uuid, Unit>,
    rides: DashMap<Uuid, Ride>,
    histories: DashMap<Uuid, RideHistory>,
    unit_rides: DashMap<Uuid, Vec<Uuid>>,
    positions: DashMap<Uuid, Vec<PositionReport>>,
    open_rides: DashMap<Uuid, Uuid>,
    waiting: Mutex<BTreeSet<(DateTime<Utc>, Uuid)>>,
    assignment_gate: RwLock<()>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            owners: DashMap::new(),
            requesters: DashMap::new(),
            models: DashMap::new(),
            units: DashMap::new(),
            rides: DashMap::new(),
            histories: DashMap::new(),
            unit_rides: DashMap::new(),
            positions: DashMap::new(),
            open_rides: DashMap::new(),
            waiting: Mutex::new(BTreeSet::new()),
            assignment_gate: RwLock::new(()),
        }
    }

    fn read_gate(&self) -> Result<RwLockReadGuard<'_, ()>, AppError> {
        self.assignment_gate
            .read()
            .map_err(|_| AppError::Persistence("assignment gate poisoned".to_string()))
    }

    fn write_gate(&self) -> Result<RwLockWriteGuard<'_, ()>, AppError> {
        self.assignment_gate
            .write()
            .map_err(|_| AppError::Persistence("assignment gate poisoned".to_string()))
    }

    fn waiting_queue(&self) -> Result<MutexGuard<'_, BTreeSet<(DateTime<Utc>, Uuid)>>, AppError> {
        self.waiting
            .lock()
            .map_err(|_| AppError::Persistence("waiting queue poisoned".to_string()))
    }

    pub fn insert_owner(&self, owner: Owner) {
        self.owners.insert(owner.id, owner);
    }

    pub fn owner(&self, id: Uuid) -> Result<Owner, AppError> {
        self.owners
            .get(&id)
            .map(|owner| owner.clone())
            .ok_or_else(|| AppError::NotFound(format!("owner {id} not found")))
    }

    pub fn list_owners(&self) -> Vec<Owner> {
        self.owners.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn owner_count(&self) -> usize {
        self.owners.len()
    }

    pub fn insert_requester(&self, requester: Requester) {
        self.requesters.insert(requester.id, requester);
    }

    pub fn list_requesters(&self) -> Vec<Requester> {
        self.requesters
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn register_model(&self, model: ModelClass) {
        self.models.insert(model.name.clone(), model);
    }

    pub fn model(&self, name: &str) -> Option<ModelClass> {
        self.models.get(name).map(|model| model.clone())
    }

    pub fn insert_unit(&self, unit: Unit) -> Result<(), AppError> {
        if !self.owners.contains_key(&unit.owner_id) {
            return Err(AppError::NotFound(format!(
                "owner {} not found",
                unit.owner_id
            )));
        }

        self.units.insert(unit.id, unit);
        Ok(())
    }

    pub fn unit(&self, id: Uuid) -> Result<Unit, AppError> {
        self.units
            .get(&id)
            .map(|unit| unit.clone())
            .ok_or_else(|| AppError::NotFound(format!("unit {id} not found")))
    }

    pub fn list_units(&self) -> Vec<Unit> {
        let mut units: Vec<Unit> = self
            .units
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        units.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        units
    }

    pub fn units_of_owner(&self, owner_id: Uuid) -> Vec<Unit> {
        let mut units = self.list_units();
        units.retain(|unit| unit.owner_id == owner_id);
        units
    }

    pub fn set_unit_active(
        &self,
        id: Uuid,
        active: bool,
        at: DateTime<Utc>,
    ) -> Result<Unit, AppError> {
        let mut unit = self
            .units
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("unit {id} not found")))?;

        unit.is_active = active;
        unit.updated_at = at;
        Ok(unit.clone())
    }

    /// Replaces the unit's distance cache only with one that folded more
    /// reports, and returns whichever cache is current afterwards.
    pub fn store_distance(
        &self,
        id: Uuid,
        cache: DistanceCache,
    ) -> Result<DistanceCache, AppError> {
        let mut unit = self
            .units
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("unit {id} not found")))?;

        if cache.folded > unit.distance.folded {
            unit.distance = cache;
        }
        Ok(unit.distance.clone())
    }

    /// Inserts a new ride together with its initial stage log.
    ///
    /// The requester's entry in `open_rides` stays locked from the
    /// in-progress check until the ride is stored, so concurrent intakes for
    /// one requester cannot both pass. A requester whose newest ride has not
    /// reached COMPLETED gets `Conflict`.
    pub fn insert_ride(&self, ride: Ride, history: RideHistory) -> Result<(), AppError> {
        if ride.unit_id.is_some() {
            return Err(AppError::BadRequest(
                "new rides must not carry a unit".to_string(),
            ));
        }
        if self.rides.contains_key(&ride.id) {
            return Err(AppError::Conflict(format!("ride {} already exists", ride.id)));
        }

        match self.open_rides.entry(ride.requester_id) {
            Entry::Occupied(mut open) => {
                let open_id = *open.get();
                if !self.is_completed(open_id) {
                    return Err(AppError::Conflict(format!(
                        "requester {} already has ride {open_id} in progress",
                        ride.requester_id
                    )));
                }
                self.store_waiting_ride(&ride, history)?;
                open.insert(ride.id);
            }
            Entry::Vacant(slot) => {
                self.store_waiting_ride(&ride, history)?;
                slot.insert(ride.id);
            }
        }

        Ok(())
    }

    fn store_waiting_ride(&self, ride: &Ride, history: RideHistory) -> Result<(), AppError> {
        let mut waiting = self.waiting_queue()?;
        self.histories.insert(ride.id, history);
        self.rides.insert(ride.id, ride.clone());
        waiting.insert((ride.created_at, ride.id));
        Ok(())
    }

    fn is_completed(&self, ride_id: Uuid) -> bool {
        self.histories
            .get(&ride_id)
            .map(|history| history.latest_stage() == Some(RideStage::Completed))
            .unwrap_or(true)
    }

    /// Frees the requester's intake slot once `ride_id` has completed.
    pub fn release_requester(&self, ride_id: Uuid) -> Result<(), AppError> {
        let requester_id = self.ride(ride_id)?.requester_id;
        self.open_rides
            .remove_if(&requester_id, |_, open| *open == ride_id);
        Ok(())
    }

    /// The requester's newest ride, if it has not completed yet.
    pub fn open_ride_of(&self, requester_id: Uuid) -> Option<Uuid> {
        let open_id = self.open_rides.get(&requester_id).map(|open| *open)?;
        (!self.is_completed(open_id)).then_some(open_id)
    }

    pub fn ride(&self, id: Uuid) -> Result<Ride, AppError> {
        let _gate = self.read_gate()?;
        self.rides
            .get(&id)
            .map(|ride| ride.clone())
            .ok_or_else(|| AppError::NotFound(format!("ride {id} not found")))
    }

    pub fn list_rides(&self) -> Result<Vec<Ride>, AppError> {
        let _gate = self.read_gate()?;
        let mut rides: Vec<Ride> = self
            .rides
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        rides.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(rides)
    }

    /// Rides assigned to the unit, in assignment order.
    pub fn rides_of_unit(&self, unit_id: Uuid) -> Result<Vec<Ride>, AppError> {
        let _gate = self.read_gate()?;
        let ride_ids = self
            .unit_rides
            .get(&unit_id)
            .map(|ids| ids.clone())
            .unwrap_or_default();

        Ok(ride_ids
            .iter()
            .filter_map(|id| self.rides.get(id).map(|ride| ride.clone()))
            .collect())
    }

    /// The ride most recently assigned to the unit.
    pub fn current_ride(&self, unit_id: Uuid) -> Result<Option<Uuid>, AppError> {
        let _gate = self.read_gate()?;
        Ok(self.latest_ride_of(unit_id))
    }

    fn latest_ride_of(&self, unit_id: Uuid) -> Option<Uuid> {
        self.unit_rides
            .get(&unit_id)
            .and_then(|ids| ids.last().copied())
    }

    pub fn history(&self, ride_id: Uuid) -> Result<RideHistory, AppError> {
        self.histories
            .get(&ride_id)
            .map(|history| history.clone())
            .ok_or_else(|| AppError::NotFound(format!("ride {ride_id} not found")))
    }

    /// Runs `f` with exclusive access to one ride's stage log. Callers on
    /// different rides do not block each other.
    pub fn update_history<T>(
        &self,
        ride_id: Uuid,
        f: impl FnOnce(&mut RideHistory) -> Result<T, AppError>,
    ) -> Result<T, AppError> {
        let mut history = self
            .histories
            .get_mut(&ride_id)
            .ok_or_else(|| AppError::NotFound(format!("ride {ride_id} not found")))?;

        f(&mut history)
    }

    /// Appends to the unit's position stream. Reports older than the
    /// stream's latest entry are refused so the stream stays ordered.
    pub fn append_position(&self, report: PositionReport) -> Result<(), AppError> {
        if !self.units.contains_key(&report.unit_id) {
            return Err(AppError::NotFound(format!("unit {} not found", report.unit_id)));
        }

        let mut stream = self.positions.entry(report.unit_id).or_default();
        if let Some(last) = stream.last() {
            if report.created_at < last.created_at {
                return Err(AppError::RetroactiveReport(format!(
                    "unit {} reported {} after {}",
                    report.unit_id, report.created_at, last.created_at
                )));
            }
        }

        stream.push(report);
        Ok(())
    }

    /// Reports of the unit starting at stream index `start`.
    pub fn positions_from(&self, unit_id: Uuid, start: usize) -> Vec<PositionReport> {
        self.positions
            .get(&unit_id)
            .map(|stream| stream.iter().skip(start).cloned().collect())
            .unwrap_or_default()
    }

    pub fn is_unit_free(&self, unit_id: Uuid) -> Result<bool, AppError> {
        if !self.units.contains_key(&unit_id) {
            return Err(AppError::NotFound(format!("unit {unit_id} not found")));
        }

        let _gate = self.read_gate()?;
        Ok(self.unit_is_free(unit_id))
    }

    // Callers must hold the assignment gate.
    fn unit_is_free(&self, unit_id: Uuid) -> bool {
        match self.latest_ride_of(unit_id) {
            None => true,
            Some(ride_id) => self
                .histories
                .get(&ride_id)
                .map(|history| history.is_settled())
                .unwrap_or(false),
        }
    }

    pub fn waiting_ride_count(&self) -> Result<usize, AppError> {
        Ok(self.waiting_queue()?.len())
    }

    pub fn ride_count(&self) -> usize {
        self.rides.len()
    }

    pub fn unit_count(&self) -> usize {
        self.units.len()
    }
}

impl DispatchStore for MemoryStore {
    fn waiting_rides(&self, limit: usize) -> Result<Vec<Ride>, AppError> {
        let _gate = self.read_gate()?;
        let waiting = self.waiting_queue()?;
        Ok(waiting
            .iter()
            .take(limit)
            .filter_map(|(_, id)| self.rides.get(id).map(|ride| ride.clone()))
            .collect())
    }

    fn free_units(&self, limit: usize) -> Result<Vec<FreeUnit>, AppError> {
        let _gate = self.read_gate()?;
        let active: Vec<Unit> = self
            .units
            .iter()
            .filter(|entry| entry.is_active)
            .map(|entry| entry.value().clone())
            .collect();

        let mut candidates: Vec<FreeUnit> = active
            .into_iter()
            .filter_map(|unit| {
                let speed = self.model(&unit.model)?.speed;
                self.unit_is_free(unit.id).then_some(FreeUnit { unit, speed })
            })
            .collect();

        candidates.sort_by(|a, b| {
            b.speed
                .cmp(&a.speed)
                .then(a.unit.created_at.cmp(&b.unit.created_at))
                .then(a.unit.id.cmp(&b.unit.id))
        });
        candidates.truncate(limit);
        Ok(candidates)
    }

    fn begin(&self) -> Result<Box<dyn AssignmentTx + '_>, AppError> {
        let gate = self.write_gate()?;
        Ok(Box::new(MemoryTx {
            store: self,
            _gate: gate,
            staged: Vec::new(),
        }))
    }
}

struct MemoryTx<'a> {
    store: &'a MemoryStore,
    _gate: RwLockWriteGuard<'a, ()>,
    staged: Vec<Assignment>,
}

impl AssignmentTx for MemoryTx<'_> {
    fn assign(
        &mut self,
        ride_id: Uuid,
        unit_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let ride_unit = self
            .store
            .rides
            .get(&ride_id)
            .map(|ride| ride.unit_id)
            .ok_or_else(|| AppError::Persistence(format!("ride {ride_id} vanished")))?;

        if let Some(current) = ride_unit {
            return Err(AppError::Persistence(format!(
                "ride {ride_id} already assigned to unit {current}"
            )));
        }

        if self
            .staged
            .iter()
            .any(|pair| pair.ride_id == ride_id || pair.unit_id == unit_id)
        {
            return Err(AppError::Persistence(format!(
                "ride {ride_id} or unit {unit_id} already in this batch"
            )));
        }

        let active = self
            .store
            .units
            .get(&unit_id)
            .map(|unit| unit.is_active)
            .ok_or_else(|| AppError::Persistence(format!("unit {unit_id} vanished")))?;

        if !active || !self.store.unit_is_free(unit_id) {
            return Err(AppError::Persistence(format!(
                "unit {unit_id} is no longer free"
            )));
        }

        self.staged.push(Assignment {
            ride_id,
            unit_id,
            assigned_at: at,
        });
        Ok(())
    }

    fn commit(self: Box<Self>) -> Result<Vec<Assignment>, AppError> {
        let this = *self;

        if let Some(missing) = this
            .staged
            .iter()
            .find(|pair| !this.store.rides.contains_key(&pair.ride_id))
        {
            return Err(AppError::Persistence(format!(
                "ride {} vanished",
                missing.ride_id
            )));
        }

        let mut waiting = this.store.waiting_queue()?;
        for pair in &this.staged {
            if let Some(mut ride) = this.store.rides.get_mut(&pair.ride_id) {
                ride.unit_id = Some(pair.unit_id);
                ride.updated_at = pair.assigned_at;
                waiting.remove(&(ride.created_at, ride.id));
            }
            this.store
                .unit_rides
                .entry(pair.unit_id)
                .or_default()
                .push(pair.ride_id);
        }

        Ok(this.staged)
    }
}
