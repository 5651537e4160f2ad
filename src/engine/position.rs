use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::error::AppError;
use crate::geo;
use crate::models::position::{Coordinate, PositionReport};
use crate::models::ride_status::{RideStage, StatusEntry};
use crate::store::MemoryStore;

/// Appends a position report for the unit. Arriving at the pickup while
/// ENROUTE records PICKUP, and arriving at the destination while CARRYING
/// records ARRIVED; the recorded stage is returned.
///
/// The stage check and the append run under the ride's history lock. When a
/// concurrent status update already moved the ride on, the report is kept
/// and nothing is recorded.
pub fn report_position(
    store: &MemoryStore,
    unit_id: Uuid,
    coordinate: Coordinate,
    at: DateTime<Utc>,
) -> Result<Option<StatusEntry>, AppError> {
    geo::validate(&coordinate)?;

    store.append_position(PositionReport {
        unit_id,
        coordinate,
        created_at: at,
    })?;

    let Some(ride_id) = store.current_ride(unit_id)? else {
        return Ok(None);
    };

    let ride = store.ride(ride_id)?;
    let reached = store.update_history(ride_id, |history| {
        let stage = match history.latest_stage() {
            Some(RideStage::Enroute) if coordinate == ride.pickup => RideStage::Pickup,
            Some(RideStage::Carrying) if coordinate == ride.destination => RideStage::Arrived,
            _ => return Ok(None),
        };
        history.append(stage, at).cloned().map(Some)
    })?;

    if let Some(entry) = &reached {
        debug!(
            unit_id = %unit_id,
            ride_id = %ride_id,
            stage = %entry.stage,
            "unit reached stage point"
        );
    }
    Ok(reached)
}

#[cfg(test)]
mod tests {
    use std::sync::Barrier;
    use std::thread;

    use super::*;
    use crate::engine::lifecycle::{create_ride, record_transition};
    use crate::test_helpers::{assign, seed_owner, seed_unit, ts};

    #[test]
    fn reaching_pickup_and_destination_advances_the_ride() {
        let store = MemoryStore::new();
        let owner = seed_owner(&store);
        let unit = seed_unit(&store, owner, "swift", 10, true);
        let pickup = Coordinate::new(2, 2);
        let destination = Coordinate::new(8, 5);
        let ride = create_ride(&store, Uuid::new_v4(), pickup, destination, ts(0))
            .unwrap()
            .id;
        assign(&store, ride, unit);
        record_transition(&store, ride, RideStage::Enroute, ts(1)).unwrap();

        assert!(report_position(&store, unit, Coordinate::new(1, 2), ts(2))
            .unwrap()
            .is_none());

        let entry = report_position(&store, unit, pickup, ts(3)).unwrap().unwrap();
        assert_eq!(entry.stage, RideStage::Pickup);

        record_transition(&store, ride, RideStage::Carrying, ts(4)).unwrap();
        let entry = report_position(&store, unit, destination, ts(5))
            .unwrap()
            .unwrap();
        assert_eq!(entry.stage, RideStage::Arrived);

        assert_eq!(store.positions_from(unit, 0).len(), 3);
    }

    #[test]
    fn invalid_coordinate_is_not_appended() {
        let store = MemoryStore::new();
        let owner = seed_owner(&store);
        let unit = seed_unit(&store, owner, "swift", 10, true);

        let err =
            report_position(&store, unit, Coordinate::new(i64::MAX, 0), ts(0)).unwrap_err();

        assert!(matches!(err, AppError::InvalidCoordinate(_)));
        assert!(store.positions_from(unit, 0).is_empty());
    }

    #[test]
    fn unknown_unit_is_not_found() {
        let store = MemoryStore::new();
        let err =
            report_position(&store, Uuid::new_v4(), Coordinate::new(0, 0), ts(0)).unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[test]
    fn report_after_status_moved_on_is_kept_without_advancing() {
        let store = MemoryStore::new();
        let owner = seed_owner(&store);
        let unit = seed_unit(&store, owner, "swift", 10, true);
        let pickup = Coordinate::new(4, 4);
        let ride = create_ride(&store, Uuid::new_v4(), pickup, Coordinate::new(9, 9), ts(0))
            .unwrap()
            .id;
        assign(&store, ride, unit);
        record_transition(&store, ride, RideStage::Enroute, ts(1)).unwrap();
        record_transition(&store, ride, RideStage::Pickup, ts(2)).unwrap();

        assert!(report_position(&store, unit, pickup, ts(3)).unwrap().is_none());
        assert_eq!(store.positions_from(unit, 0).len(), 1);
        assert_eq!(store.history(ride).unwrap().latest_stage(), Some(RideStage::Pickup));
    }

    #[test]
    fn racing_status_update_and_arrival_record_pickup_once() {
        for round in 0..50 {
            let store = MemoryStore::new();
            let owner = seed_owner(&store);
            let unit = seed_unit(&store, owner, "swift", 10, true);
            let pickup = Coordinate::new(3, 3);
            let ride = create_ride(&store, Uuid::new_v4(), pickup, Coordinate::new(7, 7), ts(0))
                .unwrap()
                .id;
            assign(&store, ride, unit);
            record_transition(&store, ride, RideStage::Enroute, ts(1)).unwrap();

            let barrier = Barrier::new(2);
            let (reported, posted) = thread::scope(|s| {
                let report = s.spawn(|| {
                    barrier.wait();
                    report_position(&store, unit, pickup, ts(2))
                });
                let post = s.spawn(|| {
                    barrier.wait();
                    record_transition(&store, ride, RideStage::Pickup, ts(2))
                });
                (report.join().unwrap(), post.join().unwrap())
            });

            let reported = reported.unwrap();
            assert!(
                reported.is_some() != posted.is_ok(),
                "round {round}: exactly one writer records PICKUP"
            );
            let history = store.history(ride).unwrap();
            assert_eq!(history.entries().len(), 3);
            assert_eq!(history.latest_stage(), Some(RideStage::Pickup));
        }
    }
}
