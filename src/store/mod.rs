//! Persistence boundary of the dispatch core.
//!
//! The matching dispatcher only talks to storage through [`DispatchStore`]
//! and [`AssignmentTx`]: two bounded candidate queries and one all-or-nothing
//! write batch. Everything else operates on [`MemoryStore`] directly.

pub mod memory;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::assignment::Assignment;
use crate::models::ride::Ride;
use crate::models::unit::Unit;

pub use memory::MemoryStore;

/// A unit eligible for matching together with its model's speed rating.
#[derive(Debug, Clone)]
pub struct FreeUnit {
    pub unit: Unit,
    pub speed: u32,
}

pub trait DispatchStore: Send + Sync {
    /// Up to `limit` rides without a unit, oldest first.
    fn waiting_rides(&self, limit: usize) -> Result<Vec<Ride>, AppError>;

    /// Up to `limit` active, free units with a known model, fastest first.
    fn free_units(&self, limit: usize) -> Result<Vec<FreeUnit>, AppError>;

    /// Opens the serialized write batch. Only one batch is open at a time.
    fn begin(&self) -> Result<Box<dyn AssignmentTx + '_>, AppError>;
}

/// Staged assignment writes. Dropping without [`AssignmentTx::commit`]
/// discards every staged pair.
pub trait AssignmentTx {
    /// Stages `ride -> unit`, re-checking that the ride is still waiting and
    /// the unit is still free at the time of the write.
    fn assign(&mut self, ride_id: Uuid, unit_id: Uuid, at: DateTime<Utc>) -> Result<(), AppError>;

    fn commit(self: Box<Self>) -> Result<Vec<Assignment>, AppError>;
}
