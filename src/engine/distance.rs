use uuid::Uuid;

use crate::error::AppError;
use crate::geo::manhattan;
use crate::models::position::PositionReport;
use crate::models::unit::DistanceCache;
use crate::store::MemoryStore;

/// Sum of Manhattan steps between consecutive reports.
pub fn replay_distance(reports: &[PositionReport]) -> u64 {
    reports
        .windows(2)
        .map(|pair| manhattan(&pair[0].coordinate, &pair[1].coordinate))
        .sum()
}

/// Extends `cache` with reports that come after the ones it already holds.
pub fn fold_distance(cache: &DistanceCache, newer: &[PositionReport]) -> DistanceCache {
    newer.iter().fold(cache.clone(), |mut acc, report| {
        if let Some(previous) = acc.last {
            acc.total += manhattan(&previous, &report.coordinate);
        }
        acc.last = Some(report.coordinate);
        acc.as_of = Some(report.created_at);
        acc.folded += 1;
        acc
    })
}

/// Brings the unit's cached total up to date by folding only the reports
/// appended since the last call. Reports appended while this runs are
/// picked up by the next call.
pub fn total_distance(store: &MemoryStore, unit_id: Uuid) -> Result<DistanceCache, AppError> {
    let cached = store.unit(unit_id)?.distance;
    let newer = store.positions_from(unit_id, cached.folded);
    if newer.is_empty() {
        return Ok(cached);
    }

    store.store_distance(unit_id, fold_distance(&cached, &newer))
}

/// Replays the unit's whole position stream without touching the cache.
pub fn recompute_distance(store: &MemoryStore, unit_id: Uuid) -> Result<u64, AppError> {
    store.unit(unit_id)?;
    Ok(replay_distance(&store.positions_from(unit_id, 0)))
}
