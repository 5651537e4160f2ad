use crate::error::AppError;
use crate::models::position::Coordinate;

/// Largest absolute latitude/longitude accepted on the grid.
pub const COORDINATE_LIMIT: i64 = 1_000_000_000;

pub fn validate(coordinate: &Coordinate) -> Result<(), AppError> {
    let in_range = |value: i64| (-COORDINATE_LIMIT..=COORDINATE_LIMIT).contains(&value);

    if !in_range(coordinate.latitude) || !in_range(coordinate.longitude) {
        return Err(AppError::InvalidCoordinate(format!(
            "({}, {}) outside ±{COORDINATE_LIMIT}",
            coordinate.latitude, coordinate.longitude
        )));
    }

    Ok(())
}

/// Grid distance between two validated coordinates.
pub fn manhattan(a: &Coordinate, b: &Coordinate) -> u64 {
    a.latitude.abs_diff(b.latitude) + a.longitude.abs_diff(b.longitude)
}

#[cfg(test)]
mod tests {
    use super::{manhattan, validate, COORDINATE_LIMIT};
    use crate::error::AppError;
    use crate::models::position::Coordinate;

    #[test]
    fn zero_distance_for_same_point() {
        let p = Coordinate::new(12, -40);
        assert_eq!(manhattan(&p, &p), 0);
    }

    #[test]
    fn sums_both_axes_regardless_of_direction() {
        let a = Coordinate::new(0, 0);
        let b = Coordinate::new(3, 4);
        let c = Coordinate::new(-3, -4);

        assert_eq!(manhattan(&a, &b), 7);
        assert_eq!(manhattan(&b, &a), 7);
        assert_eq!(manhattan(&b, &c), 14);
    }

    #[test]
    fn limit_is_inclusive() {
        let edge = Coordinate::new(COORDINATE_LIMIT, -COORDINATE_LIMIT);
        assert!(validate(&edge).is_ok());
        let opposite = Coordinate::new(-COORDINATE_LIMIT, COORDINATE_LIMIT);
        assert_eq!(manhattan(&edge, &opposite), 4 * COORDINATE_LIMIT as u64);
    }

    #[test]
    fn out_of_range_is_rejected() {
        let err = validate(&Coordinate::new(0, COORDINATE_LIMIT + 1)).unwrap_err();
        assert!(matches!(err, AppError::InvalidCoordinate(_)));
    }
}
