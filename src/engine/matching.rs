//! Periodic FIFO-to-fastest matching of waiting rides to free units.
//!
//! Each cycle takes the oldest waiting rides and the fastest free units,
//! pairs them by position, and commits the whole batch through one
//! [`AssignmentTx`]. There is no global optimisation: the i-th oldest ride
//! always goes to the i-th fastest unit.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::assignment::Assignment;
use crate::models::ride::Ride;
use crate::state::AppState;
use crate::store::{AssignmentTx, DispatchStore, FreeUnit};

#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// No waiting ride or no free unit.
    Idle,
    Assigned(Vec<Assignment>),
}

impl CycleOutcome {
    fn label(&self) -> &'static str {
        match self {
            CycleOutcome::Idle => "idle",
            CycleOutcome::Assigned(_) => "assigned",
        }
    }
}

/// Positional pairing of two already ordered candidate lists.
pub fn pair_batches(rides: &[Ride], units: &[FreeUnit]) -> Vec<(Uuid, Uuid)> {
    rides
        .iter()
        .zip(units)
        .map(|(ride, candidate)| (ride.id, candidate.unit.id))
        .collect()
}

/// Runs one matching cycle against `store`.
///
/// Selection happens outside the write batch. Every pair is then re-checked
/// and staged inside it; if any single pair fails the batch is dropped and
/// no ride is assigned.
pub fn run_matching_cycle<S>(store: &S, batch_size: usize) -> Result<CycleOutcome, AppError>
where
    S: DispatchStore + ?Sized,
{
    let rides = store.waiting_rides(batch_size)?;
    if rides.is_empty() {
        return Ok(CycleOutcome::Idle);
    }

    let units = store.free_units(batch_size)?;
    if units.is_empty() {
        return Ok(CycleOutcome::Idle);
    }

    let pairs = pair_batches(&rides, &units);
    let assigned_at = Utc::now();

    let mut tx: Box<dyn AssignmentTx + '_> = store.begin()?;
    for (ride_id, unit_id) in &pairs {
        tx.assign(*ride_id, *unit_id, assigned_at)?;
    }
    let assignments = tx.commit()?;

    Ok(CycleOutcome::Assigned(assignments))
}

/// One cycle against the application store, with metrics, logging, and
/// assignment events.
pub fn dispatch(state: &AppState) -> Result<CycleOutcome, AppError> {
    let start = Instant::now();
    let result = run_matching_cycle(&state.store, state.batch_size);
    let elapsed = start.elapsed().as_secs_f64();

    let outcome = match &result {
        Ok(outcome) => outcome.label(),
        Err(_) => "error",
    };
    state
        .metrics
        .matching_cycle_seconds
        .with_label_values(&[outcome])
        .observe(elapsed);
    state
        .metrics
        .matching_cycles_total
        .with_label_values(&[outcome])
        .inc();

    match &result {
        Ok(CycleOutcome::Idle) => debug!("matching cycle idle"),
        Ok(CycleOutcome::Assigned(assignments)) => {
            for assignment in assignments {
                state.assignments.insert(assignment.ride_id, assignment.clone());
                let _ = state.assignment_events_tx.send(assignment.clone());
                debug!(
                    ride_id = %assignment.ride_id,
                    unit_id = %assignment.unit_id,
                    "ride assigned"
                );
            }
            state
                .metrics
                .rides_assigned_total
                .inc_by(assignments.len() as u64);
            info!(assigned = assignments.len(), "matching cycle committed");
        }
        Err(err) => error!(error = %err, "matching cycle aborted"),
    }

    match state.store.waiting_ride_count() {
        Ok(waiting) => state.metrics.rides_waiting.set(waiting as i64),
        Err(err) => error!(error = %err, "failed to count waiting rides"),
    }

    result
}

/// Scheduler loop: one cycle per tick until the runtime shuts down. A failed
/// cycle is not retried; the next tick re-reads current state.
pub async fn run_matching_engine(state: Arc<AppState>, period: Duration) {
    info!(interval_ms = period.as_millis() as u64, "matching engine started");

    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let cycle_state = state.clone();
        // The commit holds a blocking lock, so keep it off the async workers.
        if let Err(err) = tokio::task::spawn_blocking(move || dispatch(&cycle_state)).await {
            error!(error = %err, "matching cycle task failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};

    use super::*;
    use crate::engine::fare::FareCalculator;
    use crate::engine::lifecycle::record_transition;
    use crate::models::ride_status::RideStage;
    use crate::store::MemoryStore;
    use crate::test_helpers::{assign, seed_owner, seed_ride, seed_unit, settle};

    fn assigned(outcome: CycleOutcome) -> Vec<(Uuid, Uuid)> {
        match outcome {
            CycleOutcome::Assigned(list) => list.iter().map(|a| (a.ride_id, a.unit_id)).collect(),
            CycleOutcome::Idle => Vec::new(),
        }
    }

    #[test]
    fn oldest_ride_goes_to_fastest_unit() {
        let store = MemoryStore::new();
        let owner = seed_owner(&store);
        let slow = seed_unit(&store, owner, "slow", 5, true);
        let fast = seed_unit(&store, owner, "fast", 10, true);
        let r2 = seed_ride(&store, 1);
        let r1 = seed_ride(&store, 0);

        let pairs = assigned(run_matching_cycle(&store, 30).unwrap());

        assert_eq!(pairs, vec![(r1, fast), (r2, slow)]);
        assert_eq!(store.ride(r1).unwrap().unit_id, Some(fast));
        assert_eq!(store.ride(r2).unwrap().unit_id, Some(slow));
    }

    #[test]
    fn extra_rides_stay_waiting() {
        let store = MemoryStore::new();
        let owner = seed_owner(&store);
        let unit = seed_unit(&store, owner, "swift", 10, true);
        let first = seed_ride(&store, 0);
        let second = seed_ride(&store, 1);

        let pairs = assigned(run_matching_cycle(&store, 30).unwrap());

        assert_eq!(pairs, vec![(first, unit)]);
        assert!(store.ride(second).unwrap().is_waiting());
    }

    #[test]
    fn batch_size_bounds_the_cycle() {
        let store = MemoryStore::new();
        let owner = seed_owner(&store);
        for _ in 0..4 {
            seed_unit(&store, owner, "swift", 10, true);
        }
        let rides: Vec<Uuid> = (0..4).map(|i| seed_ride(&store, i)).collect();

        let pairs = assigned(run_matching_cycle(&store, 2).unwrap());

        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].0, rides[0]);
        assert_eq!(pairs[1].0, rides[1]);
        assert_eq!(store.waiting_ride_count().unwrap(), 2);
    }

    #[test]
    fn inactive_unknown_model_and_busy_units_are_skipped() {
        let store = MemoryStore::new();
        let owner = seed_owner(&store);
        seed_unit(&store, owner, "parked", 99, false);
        let busy = seed_unit(&store, owner, "busy", 50, true);
        let ready = seed_unit(&store, owner, "ready", 1, true);

        let mut orphan = store.unit(ready).unwrap();
        orphan.id = Uuid::new_v4();
        orphan.model = "unregistered".to_string();
        store.insert_unit(orphan).unwrap();

        let in_flight = seed_ride(&store, 0);
        assign(&store, in_flight, busy);
        record_transition(&store, in_flight, RideStage::Enroute, Utc::now()).unwrap();

        let waiting = seed_ride(&store, 1);
        let pairs = assigned(run_matching_cycle(&store, 30).unwrap());

        assert_eq!(pairs, vec![(waiting, ready)]);
    }

    #[test]
    fn unit_returns_to_pool_once_settled() {
        let store = MemoryStore::new();
        let owner = seed_owner(&store);
        let unit = seed_unit(&store, owner, "swift", 10, true);
        let first = seed_ride(&store, 0);
        run_matching_cycle(&store, 30).unwrap();

        let second = seed_ride(&store, 1);
        assert_eq!(run_matching_cycle(&store, 30).unwrap(), CycleOutcome::Idle);

        settle(&store, first);
        let pairs = assigned(run_matching_cycle(&store, 30).unwrap());
        assert_eq!(pairs, vec![(second, unit)]);
    }

    #[test]
    fn no_waiting_rides_is_idle_and_changes_nothing() {
        let store = MemoryStore::new();
        let owner = seed_owner(&store);
        let unit = seed_unit(&store, owner, "swift", 10, true);
        let ride = seed_ride(&store, 0);
        run_matching_cycle(&store, 30).unwrap();

        let before = (
            serde_json::to_string(&store.list_rides().unwrap()).unwrap(),
            serde_json::to_string(&store.list_units()).unwrap(),
            serde_json::to_string(&store.history(ride).unwrap()).unwrap(),
        );

        assert_eq!(run_matching_cycle(&store, 30).unwrap(), CycleOutcome::Idle);

        let after = (
            serde_json::to_string(&store.list_rides().unwrap()).unwrap(),
            serde_json::to_string(&store.list_units()).unwrap(),
            serde_json::to_string(&store.history(ride).unwrap()).unwrap(),
        );
        assert_eq!(before, after);
        assert_eq!(store.ride(ride).unwrap().unit_id, Some(unit));
    }

    /// Delegates to a real store but fails the n-th staged write.
    struct FlakyStore {
        inner: MemoryStore,
        fail_on: usize,
    }

    struct FlakyTx<'a> {
        inner: Box<dyn AssignmentTx + 'a>,
        seen: usize,
        fail_on: usize,
    }

    impl DispatchStore for FlakyStore {
        fn waiting_rides(&self, limit: usize) -> Result<Vec<Ride>, AppError> {
            self.inner.waiting_rides(limit)
        }

        fn free_units(&self, limit: usize) -> Result<Vec<FreeUnit>, AppError> {
            self.inner.free_units(limit)
        }

        fn begin(&self) -> Result<Box<dyn AssignmentTx + '_>, AppError> {
            Ok(Box::new(FlakyTx {
                inner: self.inner.begin()?,
                seen: 0,
                fail_on: self.fail_on,
            }))
        }
    }

    impl AssignmentTx for FlakyTx<'_> {
        fn assign(
            &mut self,
            ride_id: Uuid,
            unit_id: Uuid,
            at: DateTime<Utc>,
        ) -> Result<(), AppError> {
            self.seen += 1;
            if self.seen == self.fail_on {
                return Err(AppError::Persistence("injected write failure".to_string()));
            }
            self.inner.assign(ride_id, unit_id, at)
        }

        fn commit(self: Box<Self>) -> Result<Vec<Assignment>, AppError> {
            self.inner.commit()
        }
    }

    #[test]
    fn failed_second_write_leaves_every_ride_waiting() {
        let store = FlakyStore {
            inner: MemoryStore::new(),
            fail_on: 2,
        };
        let owner = seed_owner(&store.inner);
        for speed in [3, 2, 1] {
            seed_unit(&store.inner, owner, &format!("m{speed}"), speed, true);
        }
        let rides: Vec<Uuid> = (0..3).map(|i| seed_ride(&store.inner, i)).collect();

        let err = run_matching_cycle(&store, 30).unwrap_err();

        assert!(matches!(err, AppError::Persistence(_)));
        for ride in rides {
            assert!(store.inner.ride(ride).unwrap().is_waiting());
        }
        assert_eq!(store.inner.free_units(30).unwrap().len(), 3);
        assert_eq!(store.inner.waiting_ride_count().unwrap(), 3);
    }

    #[test]
    fn dispatch_records_assignments_and_events() {
        let state = AppState::new(30, 16, FareCalculator::default());
        let mut events = state.assignment_events_tx.subscribe();
        let owner = seed_owner(&state.store);
        let unit = seed_unit(&state.store, owner, "swift", 10, true);
        let ride = seed_ride(&state.store, 0);

        let outcome = dispatch(&state).unwrap();

        assert_eq!(assigned(outcome), vec![(ride, unit)]);
        assert_eq!(state.assignments.get(&ride).unwrap().unit_id, unit);
        assert_eq!(events.try_recv().unwrap().ride_id, ride);
        assert_eq!(state.metrics.rides_assigned_total.get(), 1);
        assert_eq!(state.metrics.rides_waiting.get(), 0);
    }
}
