// /////////////////////////////////////////////////////////////////////////////
// Workspace Session Vault
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Domain service ports and shared serialization helpers.

pub mod crypto_provider;
pub mod datetime_serde;

pub use crypto_provider::{
    CryptoProvider, KdfAlgorithm, KeyMaterial, IV_LEN, KEY_LEN, PBKDF2_DEFAULT_ITERATIONS, SALT_LEN,
};
