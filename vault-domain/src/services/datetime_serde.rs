// /////////////////////////////////////////////////////////////////////////////
// Workspace Session Vault
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # DateTime Serde Module
//!
//! RFC3339-compliant serialization for `DateTime<Utc>` fields across the
//! vault. All timestamps serialize as UTC with millisecond precision and a
//! `Z` suffix (`2024-01-15T10:30:45.123Z`), so persisted timestamps are
//! fixed-width and ordered lexicographically the same as chronologically.
//!
//! Use with the serde field attribute:
//!
//! ```ignore
//! #[serde(with = "datetime_serde")]
//! pub created_at: DateTime<Utc>,
//!
//! #[serde(with = "datetime_serde::optional")]
//! pub expires_at: Option<DateTime<Utc>>,
//! ```

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{self, Deserialize, Deserializer, Serializer};

/// Formats a datetime in the canonical persisted form.
pub fn to_canonical(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Serializes a `DateTime<Utc>` as an RFC3339 string with milliseconds
pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&to_canonical(date))
}

/// Deserializes a `DateTime<Utc>` from an RFC3339 string
pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(serde::de::Error::custom)
}

/// Serde helpers for `Option<DateTime<Utc>>` fields
pub mod optional {
    use super::*;

    pub fn serialize<S>(date: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match date {
            Some(dt) => serializer.serialize_some(&to_canonical(dt)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let opt: Option<String> = Option::deserialize(deserializer)?;
        match opt {
            Some(s) => DateTime::parse_from_rfc3339(&s)
                .map(|dt| Some(dt.with_timezone(&Utc)))
                .map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde::Serialize;

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Stamp {
        #[serde(with = "super")]
        at: DateTime<Utc>,
        #[serde(default, with = "super::optional")]
        maybe: Option<DateTime<Utc>>,
    }

    #[test]
    fn test_canonical_form_has_millis_and_z() {
        let dt = Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 45).unwrap();
        assert_eq!(to_canonical(&dt), "2024-01-15T10:30:45.000Z");
    }

    #[test]
    fn test_round_trip() {
        let stamp = Stamp {
            at: Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 45).unwrap(),
            maybe: Some(Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap()),
        };
        let json = serde_json::to_string(&stamp).unwrap();
        assert!(json.contains("2024-01-15T10:30:45.000Z"));
        let back: Stamp = serde_json::from_str(&json).unwrap();
        assert_eq!(stamp, back);
    }

    #[test]
    fn test_accepts_offset_input_and_normalizes_to_utc() {
        let json = r#"{"at": "2024-01-15T12:30:45.000+02:00"}"#;
        let stamp: Stamp = serde_json::from_str(json).unwrap();
        assert_eq!(to_canonical(&stamp.at), "2024-01-15T10:30:45.000Z");
    }
}
