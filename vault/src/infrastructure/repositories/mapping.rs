// /////////////////////////////////////////////////////////////////////////////
// Workspace Session Vault
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Column/value conversions shared by the SQLite repositories.
//!
//! Every on-disk column maps explicitly to a typed field: timestamps are
//! canonical RFC3339 text, ids are their string forms, tag sets and opaque
//! mappings are JSON text.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

use vault_domain::services::datetime_serde;
use vault_domain::VaultError;

/// Maps a sqlx error onto the engine's store-error kind.
pub(crate) fn store_err(e: sqlx::Error) -> VaultError {
    VaultError::StoreError(e.to_string())
}

/// Formats a timestamp into its canonical column form.
pub(crate) fn fmt_dt(dt: &DateTime<Utc>) -> String {
    datetime_serde::to_canonical(dt)
}

/// Parses a canonical timestamp column.
pub(crate) fn parse_dt(s: &str) -> Result<DateTime<Utc>, VaultError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| VaultError::StoreError(format!("malformed timestamp column {:?}: {}", s, e)))
}

/// Parses an optional canonical timestamp column.
pub(crate) fn parse_opt_dt(s: Option<&str>) -> Result<Option<DateTime<Utc>>, VaultError> {
    s.map(parse_dt).transpose()
}

/// Encodes a tag set as its JSON column form.
pub(crate) fn tags_to_json(tags: &BTreeSet<String>) -> String {
    serde_json::to_string(tags).unwrap_or_else(|_| "[]".to_string())
}

/// Decodes a tag-set JSON column.
pub(crate) fn tags_from_json(s: &str) -> Result<BTreeSet<String>, VaultError> {
    serde_json::from_str(s).map_err(|e| VaultError::StoreError(format!("malformed tags column: {}", e)))
}

/// Encodes an opaque mapping as its JSON column form.
pub(crate) fn map_to_json(map: &Map<String, Value>) -> String {
    serde_json::to_string(map).unwrap_or_else(|_| "{}".to_string())
}

/// Decodes an opaque-mapping JSON column.
pub(crate) fn map_from_json(s: &str) -> Result<Map<String, Value>, VaultError> {
    serde_json::from_str(s).map_err(|e| VaultError::StoreError(format!("malformed metadata column: {}", e)))
}
