// /////////////////////////////////////////////////////////////////////////////
// Workspace Session Vault
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Wall-clock time of day value object (`HH:MM`), used for quiet-hours
//! windows in per-user configuration. Hours are 00–23, minutes 00–59.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use std::str::FromStr;

use crate::VaultError;

/// A time of day with minute precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClockTime {
    hour: u8,
    minute: u8,
}

impl ClockTime {
    pub fn new(hour: u8, minute: u8) -> Result<Self, VaultError> {
        if hour > 23 || minute > 59 {
            return Err(VaultError::InternalError(format!(
                "invalid clock time {:02}:{:02}",
                hour, minute
            )));
        }
        Ok(Self { hour, minute })
    }

    /// Parses the `HH:MM` wire form
    pub fn parse(s: &str) -> Result<Self, VaultError> {
        let parse_err = || VaultError::InternalError(format!("invalid clock time {:?}, expected HH:MM", s));
        let (hour, minute) = s.split_once(':').ok_or_else(parse_err)?;
        if hour.len() != 2 || minute.len() != 2 {
            return Err(parse_err());
        }
        let hour: u8 = hour.parse().map_err(|_| parse_err())?;
        let minute: u8 = minute.parse().map_err(|_| parse_err())?;
        Self::new(hour, minute)
    }

    pub fn hour(&self) -> u8 {
        self.hour
    }

    pub fn minute(&self) -> u8 {
        self.minute
    }

    /// Minutes since midnight
    pub fn minutes_from_midnight(&self) -> u16 {
        u16::from(self.hour) * 60 + u16::from(self.minute)
    }

    /// Whether this time falls inside `[start, end)`, handling windows that
    /// wrap past midnight (e.g. `22:00`–`06:00`).
    pub fn within(&self, start: ClockTime, end: ClockTime) -> bool {
        let t = self.minutes_from_midnight();
        let s = start.minutes_from_midnight();
        let e = end.minutes_from_midnight();
        if s <= e {
            t >= s && t < e
        } else {
            t >= s || t < e
        }
    }
}

impl Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl FromStr for ClockTime {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for ClockTime {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ClockTime {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(|e| serde::de::Error::custom(e.to_string()))
    }
}
