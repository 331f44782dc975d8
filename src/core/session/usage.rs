use chrono::{DateTime, Datelike, Duration, NaiveTime, TimeZone, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::core::error::{ChatError, ChatResult, UsageTier};

pub const DEFAULT_STANDARD_LIMIT: u32 = 100;
pub const DEFAULT_PREMIUM_LIMIT: u32 = 10;

/// Quotas reset every week at this weekday and UTC time of day.
pub const RESET_WEEKDAY: Weekday = Weekday::Mon;
pub const RESET_HOUR_UTC: u32 = 0;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageCounter {
    pub standard_count: u32,
    pub premium_count: u32,
    pub standard_limit: u32,
    pub premium_limit: u32,
    pub reset_at: DateTime<Utc>,
}

impl UsageCounter {
    pub fn new(standard_limit: u32, premium_limit: u32, now: DateTime<Utc>) -> Self {
        Self {
            standard_count: 0,
            premium_count: 0,
            standard_limit,
            premium_limit,
            reset_at: next_reset_after(now),
        }
    }

    /// Zeroes both counts once `now` has passed the stored reset time.
    /// Returns whether a reset happened.
    pub fn refresh(&mut self, now: DateTime<Utc>) -> bool {
        if now < self.reset_at {
            return false;
        }
        self.standard_count = 0;
        self.premium_count = 0;
        self.reset_at = next_reset_after(now);
        true
    }

    pub fn ensure_available(&self, tier: UsageTier) -> ChatResult<()> {
        if self.standard_count >= self.standard_limit {
            return Err(ChatError::LimitReached {
                tier: UsageTier::Standard,
                limit: self.standard_limit,
            });
        }
        if tier == UsageTier::Premium && self.premium_count >= self.premium_limit {
            return Err(ChatError::LimitReached {
                tier: UsageTier::Premium,
                limit: self.premium_limit,
            });
        }
        Ok(())
    }

    pub fn record(&mut self, tier: UsageTier) {
        match tier {
            UsageTier::Standard => self.standard_count = self.standard_count.saturating_add(1),
            UsageTier::Premium => self.premium_count = self.premium_count.saturating_add(1),
        }
    }

    pub fn remaining(&self, tier: UsageTier) -> u32 {
        match tier {
            UsageTier::Standard => self.standard_limit.saturating_sub(self.standard_count),
            UsageTier::Premium => self.premium_limit.saturating_sub(self.premium_count),
        }
    }
}

/// Next occurrence of the weekly reset strictly after `now`.
pub fn next_reset_after(now: DateTime<Utc>) -> DateTime<Utc> {
    let reset_time = NaiveTime::from_hms_opt(RESET_HOUR_UTC, 0, 0).unwrap_or(NaiveTime::MIN);
    let today = now.date_naive();
    let days_ahead = (7 + RESET_WEEKDAY.num_days_from_monday() as i64
        - today.weekday().num_days_from_monday() as i64)
        % 7;
    let candidate_day = today + Duration::days(days_ahead);
    let candidate = Utc.from_utc_datetime(&candidate_day.and_time(reset_time));
    if candidate > now {
        candidate
    } else {
        candidate + Duration::days(7)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn next_reset_is_following_monday_midnight() {
        // 2026-10-21 is a Wednesday.
        assert_eq!(next_reset_after(at(2026, 10, 21, 15)), at(2026, 10, 26, 0));
        // Sunday late evening rolls to the next day.
        assert_eq!(next_reset_after(at(2026, 10, 25, 23)), at(2026, 10, 26, 0));
        // Exactly at the reset instant moves a full week ahead.
        assert_eq!(next_reset_after(at(2026, 10, 26, 0)), at(2026, 11, 2, 0));
    }

    #[test]
    fn refresh_resets_only_after_deadline() {
        let start = at(2026, 10, 21, 12);
        let mut usage = UsageCounter::new(5, 2, start);
        usage.record(UsageTier::Standard);
        usage.record(UsageTier::Premium);

        assert!(!usage.refresh(at(2026, 10, 25, 12)));
        assert_eq!(usage.standard_count, 1);

        assert!(usage.refresh(at(2026, 10, 27, 9)));
        assert_eq!(usage.standard_count, 0);
        assert_eq!(usage.premium_count, 0);
        assert_eq!(usage.reset_at, at(2026, 11, 2, 0));
    }

    #[test]
    fn premium_sends_also_require_standard_headroom() {
        let mut usage = UsageCounter::new(1, 5, Utc::now());
        usage.ensure_available(UsageTier::Premium).unwrap();
        usage.record(UsageTier::Standard);
        let err = usage.ensure_available(UsageTier::Premium).unwrap_err();
        assert!(matches!(
            err,
            ChatError::LimitReached {
                tier: UsageTier::Standard,
                ..
            }
        ));
    }

    #[test]
    fn premium_limit_blocks_premium_only() {
        let mut usage = UsageCounter::new(10, 1, Utc::now());
        usage.record(UsageTier::Premium);
        assert!(usage.ensure_available(UsageTier::Standard).is_ok());
        assert!(matches!(
            usage.ensure_available(UsageTier::Premium),
            Err(ChatError::LimitReached {
                tier: UsageTier::Premium,
                limit: 1
            })
        ));
        assert_eq!(usage.remaining(UsageTier::Premium), 0);
        assert_eq!(usage.remaining(UsageTier::Standard), 10);
    }
}
