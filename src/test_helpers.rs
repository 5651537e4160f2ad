//! Fixtures shared by unit tests.

use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

use crate::engine::lifecycle::{create_ride, mark_notified, record_transition};
use crate::models::owner::Owner;
use crate::models::position::Coordinate;
use crate::models::ride_status::RideStage;
use crate::models::unit::{DistanceCache, ModelClass, Unit};
use crate::store::{AssignmentTx, DispatchStore, MemoryStore};

pub fn ts(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(1_700_000_000_000 + ms).unwrap()
}

pub fn seed_owner(store: &MemoryStore) -> Uuid {
    let owner = Owner {
        id: Uuid::new_v4(),
        name: "test-owner".to_string(),
        access_token: String::new(),
        unit_register_token: String::new(),
        created_at: ts(0),
    };
    let id = owner.id;
    store.insert_owner(owner);
    id
}

pub fn seed_unit(
    store: &MemoryStore,
    owner_id: Uuid,
    model: &str,
    speed: u32,
    active: bool,
) -> Uuid {
    store.register_model(ModelClass {
        name: model.to_string(),
        speed,
    });

    let unit = Unit {
        id: Uuid::new_v4(),
        owner_id,
        name: format!("{model}-unit"),
        model: model.to_string(),
        is_active: active,
        access_token: String::new(),
        distance: DistanceCache::default(),
        created_at: ts(0),
        updated_at: ts(0),
    };
    let id = unit.id;
    store.insert_unit(unit).unwrap();
    id
}

pub fn seed_ride(store: &MemoryStore, created_ms: i64) -> Uuid {
    create_ride(
        store,
        Uuid::new_v4(),
        Coordinate::new(0, 0),
        Coordinate::new(10, 10),
        ts(created_ms),
    )
    .unwrap()
    .id
}

pub fn assign(store: &MemoryStore, ride_id: Uuid, unit_id: Uuid) {
    let mut tx = store.begin().unwrap();
    tx.assign(ride_id, unit_id, Utc::now()).unwrap();
    tx.commit().unwrap();
}

/// Records every remaining stage of the ride and delivers all of them.
pub fn settle(store: &MemoryStore, ride_id: Uuid) {
    let current = store.history(ride_id).unwrap().latest_stage().unwrap();
    for stage in &RideStage::ALL[current.ordinal() + 1..] {
        record_transition(store, ride_id, *stage, Utc::now()).unwrap();
    }
    for stage in RideStage::ALL {
        mark_notified(store, ride_id, stage, Utc::now()).unwrap();
    }
}
