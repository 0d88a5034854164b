//! Helpers for loading service configuration from environment variables.
//!
//! Lookups go through a `Fn(&str) -> Option<String>` so config structs can be
//! built from a map in tests; services pass [`process_env`] at startup.

use std::fmt::Display;
use std::str::FromStr;

use anyhow::{Context as _, anyhow};

/// Read a variable from the process environment. Unset and non-UTF-8 values are `None`.
pub fn process_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// A variable that must be present and non-empty.
pub fn required<F>(lookup: &F, key: &str) -> anyhow::Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| anyhow!("missing required env var {key}"))
}

/// An optional variable; empty counts as unset.
pub fn optional<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).filter(|v| !v.trim().is_empty())
}

/// A parsed variable falling back to `default` when unset. A present but
/// unparsable value is an error rather than a silent fallback.
pub fn or_default<F, T>(lookup: &F, key: &str, default: T) -> anyhow::Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    match optional(lookup, key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow!("{e}"))
            .with_context(|| format!("invalid value for env var {key}: {raw:?}")),
    }
}
