use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::engine::fare::FareCalculator;
use crate::error::AppError;
use crate::models::ride_status::RideStage;
use crate::store::MemoryStore;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct UnitSales {
    pub id: Uuid,
    pub name: String,
    pub sales: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ModelSales {
    pub model: String,
    pub sales: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SalesReport {
    pub total_sales: u64,
    pub units: Vec<UnitSales>,
    pub models: Vec<ModelSales>,
}

/// Fares of the owner's rides whose COMPLETED stage was recorded within
/// `[since, until]`, per unit, per model, and in total.
pub fn owner_sales(
    store: &MemoryStore,
    fares: &FareCalculator,
    owner_id: Uuid,
    since: DateTime<Utc>,
    until: DateTime<Utc>,
) -> Result<SalesReport, AppError> {
    store.owner(owner_id)?;

    let mut report = SalesReport {
        total_sales: 0,
        units: Vec::new(),
        models: Vec::new(),
    };
    let mut by_model: BTreeMap<String, u64> = BTreeMap::new();

    for unit in store.units_of_owner(owner_id) {
        let mut sales = 0;
        for ride in store.rides_of_unit(unit.id)? {
            let history = store.history(ride.id)?;
            let Some(completed) = history.entry(RideStage::Completed) else {
                continue;
            };
            if completed.created_at < since || completed.created_at > until {
                continue;
            }
            sales += fares.fare(&ride.pickup, &ride.destination)?;
        }

        report.total_sales += sales;
        *by_model.entry(unit.model.clone()).or_default() += sales;
        report.units.push(UnitSales {
            id: unit.id,
            name: unit.name,
            sales,
        });
    }

    report.models = by_model
        .into_iter()
        .map(|(model, sales)| ModelSales { model, sales })
        .collect();

    Ok(report)
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};

    use super::*;
    use crate::engine::lifecycle::{create_ride, record_transition};
    use crate::models::position::Coordinate;
    use crate::test_helpers::{assign, seed_owner, seed_unit, settle, ts};

    fn all_time(store: &MemoryStore, fares: &FareCalculator, owner: Uuid) -> SalesReport {
        owner_sales(store, fares, owner, DateTime::<Utc>::MIN_UTC, DateTime::<Utc>::MAX_UTC)
            .unwrap()
    }

    fn completed_ride(
        store: &MemoryStore,
        unit: Uuid,
        pickup: Coordinate,
        destination: Coordinate,
    ) {
        let ride = create_ride(store, Uuid::new_v4(), pickup, destination, ts(0))
            .unwrap()
            .id;
        assign(store, ride, unit);
        settle(store, ride);
    }

    #[test]
    fn sums_completed_rides_per_unit_and_model() {
        let store = MemoryStore::new();
        let fares = FareCalculator::default();
        let owner = seed_owner(&store);
        let a = seed_unit(&store, owner, "alpha", 10, true);
        let b = seed_unit(&store, owner, "beta", 5, true);

        completed_ride(&store, a, Coordinate::new(0, 0), Coordinate::new(1, 1));
        completed_ride(&store, a, Coordinate::new(0, 0), Coordinate::new(0, 3));
        completed_ride(&store, b, Coordinate::new(5, 5), Coordinate::new(5, 5));

        let report = all_time(&store, &fares, owner);

        assert_eq!(report.total_sales, 700 + 800 + 500);
        assert_eq!(
            report.models,
            vec![
                ModelSales { model: "alpha".to_string(), sales: 1500 },
                ModelSales { model: "beta".to_string(), sales: 500 },
            ]
        );
        let unit_a = report.units.iter().find(|u| u.id == a).unwrap();
        assert_eq!(unit_a.sales, 1500);
    }

    #[test]
    fn unfinished_and_out_of_window_rides_do_not_count() {
        let store = MemoryStore::new();
        let fares = FareCalculator::default();
        let owner = seed_owner(&store);
        let unit = seed_unit(&store, owner, "alpha", 10, true);

        completed_ride(&store, unit, Coordinate::new(0, 0), Coordinate::new(1, 1));

        let in_flight = seed_unit(&store, owner, "beta", 5, true);
        let (p, d) = (Coordinate::new(0, 0), Coordinate::new(9, 9));
        let ride = create_ride(&store, Uuid::new_v4(), p, d, ts(0)).unwrap().id;
        assign(&store, ride, in_flight);
        record_transition(&store, ride, RideStage::Enroute, Utc::now()).unwrap();

        let all = all_time(&store, &fares, owner);
        assert_eq!(all.total_sales, 700);

        let before = owner_sales(&store, &fares, owner, ts(-10), ts(-1)).unwrap();
        assert_eq!(before.total_sales, 0);
        assert_eq!(before.units.len(), 2);
    }

    #[test]
    fn unknown_owner_is_not_found() {
        let store = MemoryStore::new();
        let fares = FareCalculator::default();
        let err = owner_sales(&store, &fares, Uuid::new_v4(), ts(0), ts(1)).unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
