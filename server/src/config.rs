// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use std::net::SocketAddr;

use anyhow::{Context, Result, ensure};

pub const DATABASE_URL_VAR: &str = "TASKBOARD_DATABASE_URL";
pub const BIND_ADDR_VAR: &str = "TASKBOARD_BIND_ADDR";
pub const CHANGE_CAPACITY_VAR: &str = "TASKBOARD_CHANGE_CAPACITY";

const DEFAULT_DATABASE_URL: &str = "sqlite://database/sqlite.db";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_CHANGE_CAPACITY: usize = 256;

/// Runtime settings, read once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    /// How many change events a slow subscriber may fall behind
    /// before it is told to resync.
    pub change_capacity: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let database_url = lookup(DATABASE_URL_VAR).unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());

        let bind_addr = lookup(BIND_ADDR_VAR)
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse::<SocketAddr>()
            .with_context(|| format!("Invalid {BIND_ADDR_VAR}"))?;

        let change_capacity = match lookup(CHANGE_CAPACITY_VAR) {
            Some(raw) => raw
                .parse::<usize>()
                .with_context(|| format!("Invalid {CHANGE_CAPACITY_VAR}: {raw:?}"))?,
            None => DEFAULT_CHANGE_CAPACITY,
        };
        ensure!(change_capacity > 0, "{CHANGE_CAPACITY_VAR} must be positive");

        Ok(Self {
            database_url,
            bind_addr,
            change_capacity,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.database_url, "sqlite://database/sqlite.db");
        assert_eq!(config.bind_addr, "0.0.0.0:3000".parse().unwrap());
        assert_eq!(config.change_capacity, 256);
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            (DATABASE_URL_VAR, "sqlite::memory:"),
            (BIND_ADDR_VAR, "127.0.0.1:8080"),
            (CHANGE_CAPACITY_VAR, "16"),
        ])
        .unwrap();
        assert_eq!(config.database_url, "sqlite::memory:");
        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.change_capacity, 16);
    }

    #[test]
    fn test_invalid_values() {
        assert!(config_from(&[(BIND_ADDR_VAR, "not-an-address")]).is_err());
        assert!(config_from(&[(CHANGE_CAPACITY_VAR, "many")]).is_err());
        assert!(config_from(&[(CHANGE_CAPACITY_VAR, "0")]).is_err());
    }
}
