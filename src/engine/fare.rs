use crate::error::AppError;
use crate::geo;
use crate::models::position::Coordinate;

pub const DEFAULT_BASE_FARE: u64 = 500;
pub const DEFAULT_FARE_PER_DISTANCE: u64 = 100;

/// `fare = base_fare + per_distance_rate * manhattan(pickup, destination)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FareCalculator {
    pub base_fare: u64,
    pub per_distance_rate: u64,
}

impl Default for FareCalculator {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_FARE, DEFAULT_FARE_PER_DISTANCE)
    }
}

impl FareCalculator {
    pub fn new(base_fare: u64, per_distance_rate: u64) -> Self {
        Self {
            base_fare,
            per_distance_rate,
        }
    }

    pub fn fare(&self, pickup: &Coordinate, destination: &Coordinate) -> Result<u64, AppError> {
        geo::validate(pickup)?;
        geo::validate(destination)?;

        let distance = geo::manhattan(pickup, destination);
        Ok(self
            .base_fare
            .saturating_add(self.per_distance_rate.saturating_mul(distance)))
    }
}
