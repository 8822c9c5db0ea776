//! Run windows
//!
//! Decides whether a scheduled run may proceed at a given local time.

use crate::config::ScheduleDefinition;
use crate::error::{Error, Result};
use chrono::{Datelike, FixedOffset, Local, NaiveDateTime, NaiveTime, Utc};

/// Outcome of a schedule check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunDecision {
    /// Run requested regardless of the clock
    Forced,
    /// Inside a daily window
    InWindow,
    /// Inside the year-boundary event window
    NewYearEvent,
    /// Outside every window
    OutsideWindow,
}

impl RunDecision {
    /// Whether the run should proceed
    pub fn should_run(self) -> bool {
        !matches!(self, RunDecision::OutsideWindow)
    }
}

/// Parse `HH:MM` (or `HH:MM:SS`)
pub fn parse_clock(value: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .map_err(|_| Error::invalid_value("schedule.windows", format!("'{value}' is not HH:MM")))
}

/// Compiled run windows
#[derive(Debug, Clone)]
pub struct Schedule {
    windows: Vec<(NaiveTime, NaiveTime)>,
    new_year_event: bool,
    offset: Option<FixedOffset>,
}

impl Schedule {
    /// Compile a schedule definition
    pub fn from_definition(def: &ScheduleDefinition) -> Result<Self> {
        let windows = def
            .windows
            .iter()
            .map(|w| Ok((parse_clock(&w.start)?, parse_clock(&w.end)?)))
            .collect::<Result<Vec<_>>>()?;

        let offset = match def.utc_offset_hours {
            Some(hours) => Some(FixedOffset::east_opt(hours * 3600).ok_or_else(|| {
                Error::invalid_value("schedule.utc_offset_hours", format!("{hours} is out of range"))
            })?),
            None => None,
        };

        Ok(Self {
            windows,
            new_year_event: def.new_year_event,
            offset,
        })
    }

    /// Current wall-clock time in the schedule's zone
    pub fn now(&self) -> NaiveDateTime {
        match self.offset {
            Some(offset) => Utc::now().with_timezone(&offset).naive_local(),
            None => Local::now().naive_local(),
        }
    }

    /// Decide for a given wall-clock time
    pub fn decide_at(&self, at: NaiveDateTime, force: bool) -> RunDecision {
        if force {
            return RunDecision::Forced;
        }
        if self.new_year_event && in_new_year_window(at) {
            return RunDecision::NewYearEvent;
        }
        let time = at.time();
        let open = self.windows.iter().any(|&(start, end)| {
            if start <= end {
                time >= start && time <= end
            } else {
                time >= start || time <= end
            }
        });
        if open {
            RunDecision::InWindow
        } else {
            RunDecision::OutsideWindow
        }
    }

    /// Decide for the current time
    pub fn decide(&self, force: bool) -> RunDecision {
        self.decide_at(self.now(), force)
    }
}

fn in_new_year_window(at: NaiveDateTime) -> bool {
    let time = at.time();
    let eve_start = NaiveTime::from_hms_opt(20, 0, 0).unwrap_or(NaiveTime::MIN);
    let day_end = NaiveTime::from_hms_opt(3, 0, 0).unwrap_or(NaiveTime::MIN);
    (at.month() == 12 && at.day() == 31 && time >= eve_start)
        || (at.month() == 1 && at.day() == 1 && time <= day_end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use test_case::test_case;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    fn default_schedule() -> Schedule {
        Schedule::from_definition(&ScheduleDefinition::default()).unwrap()
    }

    #[test_case(at(2025, 6, 10, 8, 0), RunDecision::InWindow ; "window start inclusive")]
    #[test_case(at(2025, 6, 10, 20, 0), RunDecision::InWindow ; "window end inclusive")]
    #[test_case(at(2025, 6, 10, 7, 59), RunDecision::OutsideWindow ; "before window")]
    #[test_case(at(2025, 6, 10, 22, 30), RunDecision::OutsideWindow ; "after window")]
    #[test_case(at(2025, 12, 31, 23, 0), RunDecision::NewYearEvent ; "new year eve")]
    #[test_case(at(2026, 1, 1, 2, 59), RunDecision::NewYearEvent ; "new year early morning")]
    #[test_case(at(2026, 1, 1, 3, 30), RunDecision::OutsideWindow ; "new year after three")]
    #[test_case(at(2025, 12, 30, 23, 0), RunDecision::OutsideWindow ; "day before eve")]
    fn test_default_windows(when: NaiveDateTime, expected: RunDecision) {
        assert_eq!(default_schedule().decide_at(when, false), expected);
    }

    #[test]
    fn test_force_overrides_clock() {
        let decision = default_schedule().decide_at(at(2025, 6, 10, 3, 0), true);
        assert_eq!(decision, RunDecision::Forced);
        assert!(decision.should_run());
    }

    #[test]
    fn test_new_year_event_disabled() {
        let def = ScheduleDefinition {
            new_year_event: false,
            ..ScheduleDefinition::default()
        };
        let schedule = Schedule::from_definition(&def).unwrap();
        assert_eq!(
            schedule.decide_at(at(2025, 12, 31, 23, 0), false),
            RunDecision::OutsideWindow
        );
    }

    #[test]
    fn test_parse_clock() {
        assert_eq!(parse_clock("08:00").unwrap(), NaiveTime::from_hms_opt(8, 0, 0).unwrap());
        assert!(parse_clock("8am").is_err());
    }
}
