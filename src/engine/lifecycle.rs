use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::geo;
use crate::models::position::Coordinate;
use crate::models::ride::Ride;
use crate::models::ride_status::{RideHistory, RideStage, StatusEntry};
use crate::store::MemoryStore;

/// Request intake: stores a waiting ride and its MATCHING stage row. A
/// requester whose previous ride has not completed gets `Conflict`.
pub fn create_ride(
    store: &MemoryStore,
    requester_id: Uuid,
    pickup: Coordinate,
    destination: Coordinate,
    at: DateTime<Utc>,
) -> Result<Ride, AppError> {
    geo::validate(&pickup)?;
    geo::validate(&destination)?;

    let ride = Ride {
        id: Uuid::new_v4(),
        requester_id,
        unit_id: None,
        pickup,
        destination,
        created_at: at,
        updated_at: at,
    };

    let mut history = RideHistory::new(ride.id);
    history.append(RideStage::Matching, at)?;

    store.insert_ride(ride.clone(), history)?;
    debug!(ride_id = %ride.id, requester_id = %requester_id, "ride created");
    Ok(ride)
}

/// Appends `next` to the ride's stage log if it directly follows the latest
/// recorded stage. Stages past MATCHING also need an assigned unit.
pub fn record_transition(
    store: &MemoryStore,
    ride_id: Uuid,
    next: RideStage,
    at: DateTime<Utc>,
) -> Result<StatusEntry, AppError> {
    let current = store.history(ride_id)?.latest_stage();
    let expected = match current {
        None => Some(RideStage::Matching),
        Some(stage) => stage.next(),
    };
    if expected != Some(next) {
        warn!(ride_id = %ride_id, requested = %next, "out of order transition rejected");
        return Err(AppError::OutOfOrderTransition {
            ride_id,
            current,
            requested: next,
        });
    }

    if next != RideStage::Matching && store.ride(ride_id)?.unit_id.is_none() {
        return Err(AppError::BadRequest(format!(
            "ride {ride_id} has no assigned unit"
        )));
    }

    // A concurrent caller may have appended in between; append re-checks.
    let entry = store.update_history(ride_id, |history| history.append(next, at).cloned())?;
    if next == RideStage::Completed {
        store.release_requester(ride_id)?;
    }

    debug!(ride_id = %ride_id, stage = %next, "stage recorded");
    Ok(entry)
}

/// Stamps unit-notified-at on the ride's `stage` row. Returns `false` when
/// the row was already stamped, which is not an error.
pub fn mark_notified(
    store: &MemoryStore,
    ride_id: Uuid,
    stage: RideStage,
    at: DateTime<Utc>,
) -> Result<bool, AppError> {
    let stamped = store.update_history(ride_id, |history| history.mark_notified(stage, at))?;

    if stamped {
        debug!(ride_id = %ride_id, stage = %stage, "stage delivered to unit");
    }
    Ok(stamped)
}

/// True iff the unit has never been assigned a ride, or its latest ride has
/// all six stages recorded and delivered.
pub fn is_unit_free(store: &MemoryStore, unit_id: Uuid) -> Result<bool, AppError> {
    store.is_unit_free(unit_id)
}

/// True while the ride can still progress.
pub fn is_ride_actionable(store: &MemoryStore, ride_id: Uuid) -> Result<bool, AppError> {
    Ok(store.history(ride_id)?.latest_stage() != Some(RideStage::Completed))
}

/// Oldest undelivered stage row of the unit's current ride.
pub fn pending_notification(
    store: &MemoryStore,
    unit_id: Uuid,
) -> Result<Option<StatusEntry>, AppError> {
    store.unit(unit_id)?;

    let Some(ride_id) = store.current_ride(unit_id)? else {
        return Ok(None);
    };

    Ok(store.history(ride_id)?.first_undelivered().cloned())
}
