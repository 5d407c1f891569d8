//! Business operating hours
//!
//! A business is open when the evaluated instant, shifted into its local
//! offset, lands inside that day's schedule. Holidays close the whole day,
//! date overrides replace the weekly entry, break intervals are carved out,
//! and a closing time numerically before the opening time wraps the range
//! past midnight.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Datelike, Days, FixedOffset, NaiveDate, NaiveTime, Offset, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use parley_shared::{BusinessId, EphemeralStore};

/// Pause inside an open day, e.g. lunch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakInterval {
    pub starts_at: NaiveTime,
    pub ends_at: NaiveTime,
}

/// One day's opening hours
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaySchedule {
    pub open: bool,
    pub opens_at: NaiveTime,
    pub closes_at: NaiveTime,
    #[serde(default)]
    pub breaks: Vec<BreakInterval>,
}

impl DaySchedule {
    /// A day the business does not open at all
    pub fn closed() -> Self {
        Self {
            open: false,
            opens_at: NaiveTime::MIN,
            closes_at: NaiveTime::MIN,
            breaks: Vec::new(),
        }
    }

    pub fn open_between(opens_at: NaiveTime, closes_at: NaiveTime) -> Self {
        Self {
            open: true,
            opens_at,
            closes_at,
            breaks: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessHoursConfig {
    pub business_id: BusinessId,
    /// Display label only; evaluation uses the fixed offset below
    pub timezone: String,
    pub utc_offset_minutes: i32,
    /// Monday first
    pub weekly: [DaySchedule; 7],
    #[serde(default)]
    pub holidays: BTreeSet<NaiveDate>,
    #[serde(default)]
    pub overrides: BTreeMap<NaiveDate, DaySchedule>,
}

pub struct BusinessHoursGate {
    store: Arc<dyn EphemeralStore>,
}

fn hours_key(business_id: BusinessId) -> String {
    format!("business:{business_id}:hours")
}

impl BusinessHoursGate {
    pub fn new(store: Arc<dyn EphemeralStore>) -> Self {
        Self { store }
    }

    pub async fn set_hours(&self, config: &BusinessHoursConfig) {
        let payload = match serde_json::to_string(config) {
            Ok(payload) => payload,
            Err(error) => {
                warn!(business_id = %config.business_id, %error,
                    "business hours serialization failed");
                return;
            }
        };
        if let Err(error) = self
            .store
            .put(&hours_key(config.business_id), &payload, None)
            .await
        {
            warn!(business_id = %config.business_id, %error, "business hours write failed");
        }
    }

    pub async fn hours(&self, business_id: BusinessId) -> Option<BusinessHoursConfig> {
        match self.store.get(&hours_key(business_id)).await {
            Ok(Some(payload)) => match serde_json::from_str(&payload) {
                Ok(config) => Some(config),
                Err(error) => {
                    warn!(business_id = %business_id, %error, "malformed business hours");
                    None
                }
            },
            Ok(None) => None,
            Err(error) => {
                warn!(business_id = %business_id, %error, "business hours fetch failed");
                None
            }
        }
    }

    /// Whether the business is taking conversations at the given instant.
    /// A business with no configured hours counts as closed.
    pub async fn is_open(&self, business_id: BusinessId, at: DateTime<Utc>) -> bool {
        match self.hours(business_id).await {
            Some(config) => is_open_at(&config, at),
            None => false,
        }
    }

    /// First instant at or after `from` when the business is open, looking up
    /// to seven days ahead; `None` when no opening exists in that window
    pub async fn next_opening(
        &self,
        business_id: BusinessId,
        from: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        let config = self.hours(business_id).await?;
        next_opening_at(&config, from)
    }
}

fn local_offset(offset_minutes: i32) -> FixedOffset {
    FixedOffset::east_opt(offset_minutes * 60).unwrap_or_else(|| Utc.fix())
}

/// Effective schedule for a date: holidays close it outright, an override
/// replaces the weekly entry, and a closed entry yields `None`
fn schedule_for(config: &BusinessHoursConfig, date: NaiveDate) -> Option<&DaySchedule> {
    if config.holidays.contains(&date) {
        return None;
    }
    let schedule = match config.overrides.get(&date) {
        Some(special) => special,
        None => &config.weekly[date.weekday().num_days_from_monday() as usize],
    };
    schedule.open.then_some(schedule)
}

fn wrapping_contains(starts_at: NaiveTime, ends_at: NaiveTime, time: NaiveTime) -> bool {
    if ends_at < starts_at {
        time >= starts_at || time < ends_at
    } else {
        time >= starts_at && time < ends_at
    }
}

fn within_hours(schedule: &DaySchedule, time: NaiveTime) -> bool {
    wrapping_contains(schedule.opens_at, schedule.closes_at, time)
        && !schedule
            .breaks
            .iter()
            .any(|pause| wrapping_contains(pause.starts_at, pause.ends_at, time))
}

fn is_open_at(config: &BusinessHoursConfig, at: DateTime<Utc>) -> bool {
    let local = at.with_timezone(&local_offset(config.utc_offset_minutes));
    match schedule_for(config, local.date_naive()) {
        Some(schedule) => within_hours(schedule, local.time()),
        None => false,
    }
}

/// Instants at which a day's schedule can transition to open: midnight for an
/// overnight tail, the opening time, and the end of each break
fn day_opening_candidates(schedule: &DaySchedule) -> Vec<NaiveTime> {
    let mut times = Vec::new();
    if schedule.closes_at < schedule.opens_at {
        times.push(NaiveTime::MIN);
    }
    times.push(schedule.opens_at);
    for pause in &schedule.breaks {
        times.push(pause.ends_at);
    }
    times.sort();
    times
}

fn next_opening_at(config: &BusinessHoursConfig, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if is_open_at(config, from) {
        return Some(from);
    }
    let offset = local_offset(config.utc_offset_minutes);
    let start_date = from.with_timezone(&offset).date_naive();
    for day in 0..=7 {
        let date = start_date.checked_add_days(Days::new(day))?;
        let Some(schedule) = schedule_for(config, date) else {
            continue;
        };
        for time in day_opening_candidates(schedule) {
            let Some(candidate) = date.and_time(time).and_local_timezone(offset).single() else {
                continue;
            };
            let candidate = candidate.with_timezone(&Utc);
            if candidate >= from && is_open_at(config, candidate) {
                return Some(candidate);
            }
        }
    }
    None
}
