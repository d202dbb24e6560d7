//! Market Hours Bounded Context
//!
//! Pure session classification for an exchange in its local time zone.

mod calendar;

pub use calendar::{MarketCalendar, SessionStatus, TradingHours, format_wait, nyse_holidays_2026};
