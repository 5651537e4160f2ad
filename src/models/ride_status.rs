use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RideStage {
    Matching,
    Enroute,
    Pickup,
    Carrying,
    Arrived,
    Completed,
}

impl RideStage {
    pub const ALL: [RideStage; 6] = [
        RideStage::Matching,
        RideStage::Enroute,
        RideStage::Pickup,
        RideStage::Carrying,
        RideStage::Arrived,
        RideStage::Completed,
    ];

    pub fn ordinal(self) -> usize {
        self as usize
    }

    pub fn next(self) -> Option<RideStage> {
        Self::ALL.get(self.ordinal() + 1).copied()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RideStage::Matching => "MATCHING",
            RideStage::Enroute => "ENROUTE",
            RideStage::Pickup => "PICKUP",
            RideStage::Carrying => "CARRYING",
            RideStage::Arrived => "ARRIVED",
            RideStage::Completed => "COMPLETED",
        }
    }
}

impl fmt::Display for RideStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusEntry {
    pub id: Uuid,
    pub ride_id: Uuid,
    pub stage: RideStage,
    pub created_at: DateTime<Utc>,
    pub notified_at: Option<DateTime<Utc>>,
}

/// Append-only stage log of one ride.
///
/// Entries are only ever pushed in `RideStage::ALL` order, so the entry for
/// a stage always sits at index `stage.ordinal()`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RideHistory {
    pub ride_id: Uuid,
    entries: Vec<StatusEntry>,
}

impl RideHistory {
    pub fn new(ride_id: Uuid) -> Self {
        Self {
            ride_id,
            entries: Vec::with_capacity(RideStage::ALL.len()),
        }
    }

    pub fn entries(&self) -> &[StatusEntry] {
        &self.entries
    }

    pub fn latest_stage(&self) -> Option<RideStage> {
        self.entries.last().map(|entry| entry.stage)
    }

    pub fn entry(&self, stage: RideStage) -> Option<&StatusEntry> {
        self.entries.get(stage.ordinal())
    }

    /// Appends `next` if it is the immediate successor of the latest stage
    /// (or `Matching` on an empty log). Rejection leaves the log untouched.
    pub fn append(&mut self, next: RideStage, at: DateTime<Utc>) -> Result<&StatusEntry, AppError> {
        let current = self.latest_stage();
        let expected = match current {
            None => Some(RideStage::Matching),
            Some(stage) => stage.next(),
        };

        if expected != Some(next) {
            return Err(AppError::OutOfOrderTransition {
                ride_id: self.ride_id,
                current,
                requested: next,
            });
        }

        self.entries.push(StatusEntry {
            id: Uuid::new_v4(),
            ride_id: self.ride_id,
            stage: next,
            created_at: at,
            notified_at: None,
        });

        let index = self.entries.len() - 1;
        Ok(&self.entries[index])
    }

    /// Stamps the stage row as delivered. Returns `false` when it already was.
    pub fn mark_notified(&mut self, stage: RideStage, at: DateTime<Utc>) -> Result<bool, AppError> {
        let ride_id = self.ride_id;
        let entry = self
            .entries
            .get_mut(stage.ordinal())
            .ok_or_else(|| AppError::NotFound(format!("ride {ride_id} has no {stage} stage")))?;

        if entry.notified_at.is_some() {
            return Ok(false);
        }

        entry.notified_at = Some(at);
        Ok(true)
    }

    /// All six stages recorded and each one delivered to the unit.
    pub fn is_settled(&self) -> bool {
        self.entries.len() == RideStage::ALL.len()
            && self.entries.iter().all(|entry| entry.notified_at.is_some())
    }

    pub fn first_undelivered(&self) -> Option<&StatusEntry> {
        self.entries.iter().find(|entry| entry.notified_at.is_none())
    }
}
