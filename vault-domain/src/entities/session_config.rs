// /////////////////////////////////////////////////////////////////////////////
// Workspace Session Vault
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Per-user session configuration, upserted at first session creation.

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::value_objects::{ClockTime, UserId};

/// Default payload size ceiling: 50 MiB.
pub const DEFAULT_MAX_SESSION_SIZE: u64 = 50 * 1024 * 1024;

/// Default session retention, in days.
pub const DEFAULT_RETENTION_DAYS: i64 = 30;

/// Default checkpoint retention, in days.
pub const DEFAULT_CHECKPOINT_RETENTION_DAYS: i64 = 90;

/// Default auto-save interval, in seconds.
pub const DEFAULT_AUTO_SAVE_INTERVAL_SECS: u32 = 300;

/// One configuration row per user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub user_id: UserId,
    pub auto_save_interval_secs: u32,
    pub retention_days: i64,
    pub checkpoint_retention_days: i64,
    pub max_session_size: u64,
    pub compression_enabled: bool,
    pub encryption_enabled: bool,

    /// Auto-save quiet-hours window (`HH:MM`, half-open, may wrap midnight)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quiet_hours_start: Option<ClockTime>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quiet_hours_end: Option<ClockTime>,
}

impl SessionConfig {
    /// Defaults for a user seen for the first time
    pub fn defaults_for(user_id: UserId) -> Self {
        Self {
            user_id,
            auto_save_interval_secs: DEFAULT_AUTO_SAVE_INTERVAL_SECS,
            retention_days: DEFAULT_RETENTION_DAYS,
            checkpoint_retention_days: DEFAULT_CHECKPOINT_RETENTION_DAYS,
            max_session_size: DEFAULT_MAX_SESSION_SIZE,
            compression_enabled: true,
            encryption_enabled: true,
            quiet_hours_start: None,
            quiet_hours_end: None,
        }
    }

    /// Whether auto-saves are suppressed at the given instant
    pub fn in_quiet_hours(&self, at: DateTime<Utc>) -> bool {
        match (self.quiet_hours_start, self.quiet_hours_end) {
            (Some(start), Some(end)) => match ClockTime::new(at.hour() as u8, at.minute() as u8) {
                Ok(now) => now.within(start, end),
                Err(_) => false,
            },
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::defaults_for(UserId::new());
        assert_eq!(config.retention_days, 30);
        assert_eq!(config.checkpoint_retention_days, 90);
        assert_eq!(config.max_session_size, 50 * 1024 * 1024);
        assert!(config.compression_enabled);
        assert!(config.encryption_enabled);
        assert!(config.quiet_hours_start.is_none());
    }

    #[test]
    fn test_quiet_hours_window() {
        let mut config = SessionConfig::defaults_for(UserId::new());
        assert!(!config.in_quiet_hours(Utc::now()));

        config.quiet_hours_start = Some(ClockTime::parse("22:00").unwrap());
        config.quiet_hours_end = Some(ClockTime::parse("06:00").unwrap());

        let late = Utc.with_ymd_and_hms(2025, 3, 1, 23, 30, 0).unwrap();
        let noon = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        assert!(config.in_quiet_hours(late));
        assert!(!config.in_quiet_hours(noon));
    }
}
