// /////////////////////////////////////////////////////////////////////////////
// Workspace Session Vault
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Operation Context
//!
//! Per-request context threaded through every externally-invoked engine
//! operation. Carries the operation deadline; services call
//! [`OperationContext::check_deadline`] before each store suspension point,
//! so an expired deadline aborts the operation before its transaction
//! commits and no partial rows are left behind. Crypto work is CPU-bound and
//! non-cancellable once started, which is why the check happens at I/O
//! boundaries rather than inside the primitives.

use chrono::{DateTime, Duration, Utc};

use crate::VaultError;

/// Context for one engine operation.
#[derive(Debug, Clone, Default)]
pub struct OperationContext {
    deadline: Option<DateTime<Utc>>,
}

impl OperationContext {
    /// A context with no deadline
    pub fn new() -> Self {
        Self::default()
    }

    /// A context that expires at the given instant
    pub fn with_deadline(deadline: DateTime<Utc>) -> Self {
        Self {
            deadline: Some(deadline),
        }
    }

    /// A context that expires after the given duration from now
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Some(Utc::now() + timeout),
        }
    }

    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        self.deadline
    }

    /// Time remaining before expiry, if a deadline is set
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline.map(|d| d - Utc::now())
    }

    /// Fails `Deadline` when the deadline has passed.
    pub fn check_deadline(&self) -> Result<(), VaultError> {
        match self.deadline {
            Some(deadline) if Utc::now() >= deadline => Err(VaultError::Deadline(format!(
                "operation deadline {} expired",
                deadline.to_rfc3339()
            ))),
            _ => Ok(()),
        }
    }
}
