//! Exchange session calendar.

use std::collections::BTreeSet;

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Upper bound on the day-increment search for the next open.
const MAX_DAYS_AHEAD: u32 = 366;

/// Session boundaries in exchange-local time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TradingHours {
    /// Regular session open (inclusive).
    pub open: NaiveTime,
    /// Regular session close (exclusive).
    pub close: NaiveTime,
    /// Pre-market start (inclusive).
    pub pre_market_open: NaiveTime,
    /// After-hours end (exclusive).
    pub after_hours_close: NaiveTime,
}

const fn hm(hour: u32, minute: u32) -> NaiveTime {
    match NaiveTime::from_hms_opt(hour, minute, 0) {
        Some(time) => time,
        None => panic!("invalid session time"),
    }
}

impl TradingHours {
    /// US equities: 04:00 pre-market, 09:30 to 16:00 regular, 20:00 close.
    pub const US_EQUITIES: Self = Self {
        open: hm(9, 30),
        close: hm(16, 0),
        pre_market_open: hm(4, 0),
        after_hours_close: hm(20, 0),
    };
}

impl Default for TradingHours {
    fn default() -> Self {
        Self::US_EQUITIES
    }
}

/// Coarse session classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    /// Regular session.
    Open,
    /// Pre-market window.
    PreMarket,
    /// After-hours window.
    AfterHours,
    /// Weekend, holiday, or overnight.
    Closed,
}

impl SessionStatus {
    /// Human-readable label.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::PreMarket => "pre-market",
            Self::AfterHours => "after-hours",
            Self::Closed => "closed",
        }
    }
}

/// Trading calendar for one exchange.
#[derive(Debug, Clone)]
pub struct MarketCalendar {
    tz: Tz,
    hours: TradingHours,
    holidays: BTreeSet<NaiveDate>,
}

impl MarketCalendar {
    /// Create a calendar.
    #[must_use]
    pub fn new(tz: Tz, hours: TradingHours, holidays: impl IntoIterator<Item = NaiveDate>) -> Self {
        Self {
            tz,
            hours,
            holidays: holidays.into_iter().collect(),
        }
    }

    /// New York Stock Exchange with the 2026 holiday list.
    #[must_use]
    pub fn nyse() -> Self {
        Self::new(
            chrono_tz::America::New_York,
            TradingHours::default(),
            nyse_holidays_2026(),
        )
    }

    /// Exchange time zone.
    #[must_use]
    pub const fn timezone(&self) -> Tz {
        self.tz
    }

    /// Whether `date` is a weekday that is not a holiday.
    #[must_use]
    pub fn is_trading_day(&self, date: NaiveDate) -> bool {
        !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) && !self.holidays.contains(&date)
    }

    /// Whether the regular session is open at `now`. The interval is `[open, close)`.
    #[must_use]
    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        let local = now.with_timezone(&self.tz);
        let time = local.time();
        self.is_trading_day(local.date_naive()) && time >= self.hours.open && time < self.hours.close
    }

    /// Whether `now` falls in the pre-market or after-hours window of a trading day.
    #[must_use]
    pub fn is_extended(&self, now: DateTime<Utc>) -> bool {
        matches!(
            self.session(now),
            SessionStatus::PreMarket | SessionStatus::AfterHours
        )
    }

    /// Classify `now`.
    #[must_use]
    pub fn session(&self, now: DateTime<Utc>) -> SessionStatus {
        let local = now.with_timezone(&self.tz);
        if !self.is_trading_day(local.date_naive()) {
            return SessionStatus::Closed;
        }

        let time = local.time();
        let h = &self.hours;
        if time >= h.open && time < h.close {
            SessionStatus::Open
        } else if time >= h.pre_market_open && time < h.open {
            SessionStatus::PreMarket
        } else if time >= h.close && time < h.after_hours_close {
            SessionStatus::AfterHours
        } else {
            SessionStatus::Closed
        }
    }

    /// The next regular-session open, or `now` itself if already open.
    #[must_use]
    pub fn next_open(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if self.is_open(now) {
            return Some(now);
        }

        let local = now.with_timezone(&self.tz);
        let mut date = local.date_naive();
        if local.time() >= self.hours.open {
            date = date.succ_opt()?;
        }

        for _ in 0..MAX_DAYS_AHEAD {
            if self.is_trading_day(date)
                && let Some(open) = self
                    .tz
                    .from_local_datetime(&date.and_time(self.hours.open))
                    .earliest()
            {
                return Some(open.with_timezone(&Utc));
            }
            date = date.succ_opt()?;
        }

        None
    }

    /// Seconds until the next open; `Some(0)` when open, `None` when no
    /// trading day falls within the next year.
    #[must_use]
    pub fn seconds_until_open(&self, now: DateTime<Utc>) -> Option<u64> {
        self.next_open(now)
            .map(|open| (open - now).num_seconds().max(0) as u64)
    }

    /// "Next open in" text for notifications.
    #[must_use]
    pub fn next_open_in(&self, now: DateTime<Utc>) -> String {
        if self.is_open(now) {
            return "now".to_string();
        }
        self.seconds_until_open(now)
            .map_or_else(|| "unknown".to_string(), format_wait)
    }
}

/// Render a wait such as `2h 15m` or `1d 17h 30m`.
#[must_use]
pub fn format_wait(seconds: u64) -> String {
    let total_minutes = seconds / 60;
    let days = total_minutes / (24 * 60);
    let hours = (total_minutes / 60) % 24;
    let minutes = total_minutes % 60;

    if days > 0 {
        format!("{days}d {hours}h {minutes}m")
    } else if hours > 0 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m")
    }
}

/// NYSE full-day closures for 2026.
#[must_use]
pub fn nyse_holidays_2026() -> Vec<NaiveDate> {
    [
        (1, 1),
        (1, 19),
        (2, 16),
        (4, 3),
        (5, 25),
        (7, 3),
        (9, 7),
        (11, 26),
        (12, 25),
    ]
    .into_iter()
    .filter_map(|(m, d)| NaiveDate::from_ymd_opt(2026, m, d))
    .collect()
}
