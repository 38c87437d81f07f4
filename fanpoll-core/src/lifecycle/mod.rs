//! Campaign lifecycle
//!
//! A project is either `Scheduled` (`inProgress = false`) or `Active`
//! (`inProgress = true`). The only timed transition is `Scheduled -> Active`,
//! fired once the activation window has elapsed. Nothing ever moves a
//! project back automatically; only an explicit update does.
//!
//! Timers are not process-local: every armed transition is stored as a
//! [`ScheduledTransition`] record, and [`LifecycleScheduler::sweep_due`]
//! applies the ones whose due time has passed. Firing is idempotent, so a
//! sweep interrupted half-way can simply run again.

mod clock;
mod scheduler;
mod sweeper;

pub use clock::{Clock, ManualClock, SystemClock};
pub use scheduler::{FireOutcome, LifecycleScheduler, SweepReport};
pub use sweeper::Sweeper;

use crate::config::lifecycle::ALLOWED_TIME_COUNTS;
use crate::entity::Entity;
use crate::error::{EngineError, EngineResult};
use crate::id::{EntityId, EntityKind};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Derived from `Project::in_progress`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CampaignStatus {
    Scheduled,
    Active,
}

impl CampaignStatus {
    pub fn from_in_progress(in_progress: bool) -> Self {
        if in_progress {
            CampaignStatus::Active
        } else {
            CampaignStatus::Scheduled
        }
    }

    pub fn in_progress(self) -> bool {
        self == CampaignStatus::Active
    }
}

/// `[start, start + timeCount days]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivationWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl ActivationWindow {
    /// `ValidationFailed` when the end does not fit in a timestamp
    pub fn new(start: DateTime<Utc>, time_count: u32) -> EngineResult<Self> {
        Ok(Self { start, end: add_days(start, time_count)? })
    }

    pub fn has_elapsed(&self, now: DateTime<Utc>) -> bool {
        self.end <= now
    }

    /// Status a project gets at creation time
    pub fn initial_status(&self, now: DateTime<Utc>, activate_now: bool) -> CampaignStatus {
        CampaignStatus::from_in_progress(activate_now || self.has_elapsed(now))
    }
}

/// `from + count` days, refusing dates chrono cannot represent
pub(crate) fn add_days(from: DateTime<Utc>, count: u32) -> EngineResult<DateTime<Utc>> {
    Duration::try_days(i64::from(count))
        .and_then(|span| from.checked_add_signed(span))
        .ok_or_else(|| {
            EngineError::ValidationFailed(format!("timeCount of {} days is out of range", count))
        })
}

/// Check a campaign duration. Strict mode only accepts the fixed menu
/// of durations; otherwise any positive number of days is fine.
pub fn validate_time_count(time_count: u32, strict: bool) -> EngineResult<()> {
    if time_count == 0 {
        return Err(EngineError::ValidationFailed("timeCount must be at least 1 day".into()));
    }
    if strict && !ALLOWED_TIME_COUNTS.contains(&time_count) {
        return Err(EngineError::ValidationFailed(format!(
            "timeCount must be one of {:?}, got {}",
            ALLOWED_TIME_COUNTS, time_count
        )));
    }
    Ok(())
}

/// What a scheduled transition does when it fires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    /// `Scheduled -> Active`
    Activate,
}

/// A pending, durable lifecycle timer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledTransition {
    #[serde(rename = "_id")]
    pub id: EntityId,
    pub project_id: EntityId,
    pub due_at: DateTime<Utc>,
    pub transition: Transition,
    pub armed_at: DateTime<Utc>,
}

impl ScheduledTransition {
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.due_at <= now
    }
}

impl Entity for ScheduledTransition {
    const KIND: EntityKind = EntityKind::Transition;

    fn id(&self) -> &EntityId {
        &self.id
    }
}

/// Fields accepted when creating a project
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProject {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub image: String,
    /// Request immediate activation
    #[serde(default)]
    pub in_progress: bool,
    pub time_count: u32,
    /// Defaults to now
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
}

/// Partial project update; `None` leaves a field untouched
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProjectUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub image: Option<String>,
    pub in_progress: Option<bool>,
    pub time_count: Option<u32>,
    pub start_date: Option<DateTime<Utc>>,
}
