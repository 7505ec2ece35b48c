/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Runtime configuration for im2row.
//!
//! Settings are read once from the environment into a global
//! instance, which tests may override with [`global::set`].

use std::env;

use serde::Deserialize;
use serde::Serialize;

/// Environment variable controlling [`Config::verify_tables`].
pub const VERIFY_TABLES_ENV: &str = "IM2ROW_VERIFY_TABLES";

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Check every freshly built gather table against its window
    /// before handing it to a backend.
    pub verify_tables: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            verify_tables: cfg!(debug_assertions),
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" => Some(true),
        "0" | "false" => Some(false),
        _ => None,
    }
}

/// Builds a configuration from `lookup`, which maps variable names
/// to values. Unset or unparseable variables keep their defaults.
pub fn from_lookup<F>(lookup: F) -> Config
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = Config::default();
    if let Some(value) = lookup(VERIFY_TABLES_ENV) {
        match parse_bool(&value) {
            Some(verify) => config.verify_tables = verify,
            None => tracing::warn!(
                "ignoring {}={:?}: expected a boolean",
                VERIFY_TABLES_ENV,
                value
            ),
        }
    }
    config
}

/// Load configuration from environment variables
pub fn from_env() -> Config {
    from_lookup(|name| env::var(name).ok())
}

/// Global configuration functions
pub mod global {
    use std::sync::LazyLock;

    use parking_lot::RwLock;

    use super::*;

    /// Global configuration instance, initialized from environment variables.
    static CONFIG: LazyLock<RwLock<Config>> = LazyLock::new(|| RwLock::new(from_env()));

    pub fn get() -> Config {
        *CONFIG.read()
    }

    pub fn set(config: Config) {
        *CONFIG.write() = config;
    }

    /// Reset the global configuration to defaults (for testing only)
    pub fn reset_to_defaults() {
        set(Config::default());
    }
}
