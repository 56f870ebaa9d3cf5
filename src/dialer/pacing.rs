//! Pacing governor and calling window.
//!
//! The governor answers "how many calls may be admitted right now" from the
//! campaign's per-minute rate, its concurrency cap and the number of calls
//! in flight. The window answers "may this campaign dial at all right now".

use std::collections::VecDeque;

use chrono::{DateTime, Datelike, Duration, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::campaign::{Pacing, Schedule};
use crate::error::Result;

/// Admissions older than this no longer count against the rate.
const RATE_WINDOW_SECS: i64 = 60;

/// Local days searched forward when looking for the next opening.
const WINDOW_SEARCH_DAYS: i64 = 8;

#[derive(Debug, Clone)]
pub struct PacingGovernor {
    calls_per_minute: u32,
    max_concurrent_calls: u32,
    admissions: VecDeque<DateTime<Utc>>,
}

impl PacingGovernor {
    pub fn new(pacing: &Pacing) -> Self {
        Self {
            calls_per_minute: pacing.calls_per_minute,
            max_concurrent_calls: pacing.max_concurrent_calls,
            admissions: VecDeque::new(),
        }
    }

    /// Pick up new limits. Admission history is kept.
    pub fn reconfigure(&mut self, pacing: &Pacing) {
        self.calls_per_minute = pacing.calls_per_minute;
        self.max_concurrent_calls = pacing.max_concurrent_calls;
    }

    /// Admissions allowed per trailing minute. Never exceeds the
    /// concurrency cap.
    pub fn effective_rate(&self) -> u32 {
        self.calls_per_minute.min(self.max_concurrent_calls)
    }

    /// Admissions in the trailing minute ending at `now`.
    pub fn recent_admissions(&mut self, now: DateTime<Utc>) -> u32 {
        self.prune(now);
        self.admissions.len() as u32
    }

    /// Calls that may be admitted at `now` with `in_flight` calls live.
    pub fn available_slots(&mut self, in_flight: usize, now: DateTime<Utc>) -> usize {
        let recent = self.recent_admissions(now) as usize;
        let by_concurrency = (self.max_concurrent_calls as usize).saturating_sub(in_flight);
        let by_rate = (self.effective_rate() as usize).saturating_sub(recent);
        by_concurrency.min(by_rate)
    }

    pub fn record_admission(&mut self, at: DateTime<Utc>) {
        self.admissions.push_back(at);
    }

    /// When the oldest counted admission leaves the trailing minute.
    pub fn next_rate_release(&self) -> Option<DateTime<Utc>> {
        self.admissions
            .front()
            .map(|at| *at + Duration::seconds(RATE_WINDOW_SECS))
    }

    fn prune(&mut self, now: DateTime<Utc>) {
        while let Some(front) = self.admissions.front() {
            if *front + Duration::seconds(RATE_WINDOW_SECS) <= now {
                self.admissions.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Resolved form of a campaign `Schedule`.
///
/// Hours are a half-open local interval `[start, end)`. When the start is
/// later than the end the interval wraps past midnight, and the day check
/// applies to the local day of the instant being tested.
#[derive(Debug, Clone)]
pub struct CallingWindow {
    tz: Tz,
    hours: Option<(NaiveTime, NaiveTime)>,
    days: Vec<u8>,
    start_at: Option<DateTime<Utc>>,
    end_at: Option<DateTime<Utc>>,
}

impl CallingWindow {
    pub fn from_schedule(schedule: &Schedule) -> Result<Self> {
        schedule.validate()?;
        Ok(Self {
            tz: schedule.tz()?,
            hours: schedule.hours(),
            days: schedule.calling_days.clone(),
            start_at: schedule.start_at,
            end_at: schedule.end_at,
        })
    }

    /// The campaign's end time has passed; the window will never reopen.
    pub fn has_closed(&self, now: DateTime<Utc>) -> bool {
        self.end_at.is_some_and(|end| now >= end)
    }

    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        if self.start_at.is_some_and(|start| now < start) || self.has_closed(now) {
            return false;
        }
        let local = now.with_timezone(&self.tz);
        if !self.day_allowed(local.weekday().num_days_from_monday() as u8) {
            return false;
        }
        let t = local.time();
        match self.hours {
            None => true,
            Some((start, end)) if start < end => t >= start && t < end,
            Some((start, end)) => t >= start || t < end,
        }
    }

    /// Earliest instant at or after `now` when the window is open, or
    /// `None` if it never opens again.
    pub fn next_open(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if self.is_open(now) {
            return Some(now);
        }
        if self.has_closed(now) {
            return None;
        }
        let base = match self.start_at {
            Some(start) if start > now => {
                if self.is_open(start) {
                    return Some(start);
                }
                start
            }
            _ => now,
        };

        let midnight = NaiveTime::MIN;
        let openings: Vec<NaiveTime> = match self.hours {
            None => vec![midnight],
            Some((start, end)) if start < end => vec![start],
            Some((start, _)) => vec![midnight, start],
        };

        let first_day = base.with_timezone(&self.tz).date_naive();
        for offset in 0..WINDOW_SEARCH_DAYS {
            let day = first_day + Duration::days(offset);
            for opening in &openings {
                let Some(candidate) = self.local_to_utc(day.and_time(*opening)) else {
                    continue;
                };
                if candidate > base && self.is_open(candidate) {
                    return Some(candidate);
                }
            }
        }
        None
    }

    fn day_allowed(&self, weekday: u8) -> bool {
        self.days.is_empty() || self.days.contains(&weekday)
    }

    fn local_to_utc(&self, local: chrono::NaiveDateTime) -> Option<DateTime<Utc>> {
        // A wall time inside a DST gap does not exist; use the first instant after it.
        self.tz
            .from_local_datetime(&local)
            .earliest()
            .or_else(|| self.tz.from_local_datetime(&(local + Duration::hours(1))).earliest())
            .map(|dt| dt.with_timezone(&Utc))
    }
}
