//! Contains the settings of the surface cache.
//!
//! The settings are read from a YAML document, where all values live below a **surface_cache**
//! key. Each value is optional and falls back to its default if absent:
//!
//! ```yaml
//! surface_cache:
//!     # Upper bound of the budget in bytes (supports b, k, m, g, t as suffix).
//!     max_size: 100m
//!     # The budget is the physical memory divided by this factor (but at most max_size).
//!     size_factor: 64
//!     # Surfaces which haven't been used for about this time are evicted.
//!     expiration: 60s
//! ```
//!
//! # Examples
//!
//! ```
//! # use std::time::Duration;
//! # use surface_cache::config::Settings;
//! let settings = Settings::load_from_string("
//! surface_cache:
//!     max_size: 64m
//!     expiration: 2m
//! ").unwrap();
//!
//! assert_eq!(settings.max_size, 64 * 1024 * 1024);
//! assert_eq!(settings.size_factor, 64);
//! assert_eq!(settings.expiration, Duration::from_secs(120));
//!
//! // On a machine with 2 GiB of RAM, we'd use 32 MiB...
//! assert_eq!(settings.budget(2 * 1024 * 1024 * 1024), 32 * 1024 * 1024);
//! // ...whereas on a 16 GiB machine the upper bound kicks in.
//! assert_eq!(settings.budget(16 * 1024 * 1024 * 1024), 64 * 1024 * 1024);
//! ```
use std::time::Duration;

use anyhow::Context;
use yaml_rust::{Yaml, YamlLoader};

use crate::cost::Cost;
use crate::fmt::{format_duration, format_size, parse_duration, parse_size};

/// Contains the default upper bound of the budget (100 MiB).
pub const DEFAULT_MAX_SIZE: Cost = 100 * 1024 * 1024;

/// Contains the default divisor applied to the physical memory.
pub const DEFAULT_SIZE_FACTOR: usize = 64;

/// Contains the default expiration window.
pub const DEFAULT_EXPIRATION: Duration = Duration::from_secs(60);

/// Describes how the surface cache is sized and when its surfaces expire.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    /// The upper bound of the budget in bytes.
    pub max_size: Cost,
    /// The divisor applied to the physical memory to compute the budget.
    pub size_factor: usize,
    /// Surfaces which haven't been used for about this duration are evicted.
    pub expiration: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            max_size: DEFAULT_MAX_SIZE,
            size_factor: DEFAULT_SIZE_FACTOR,
            expiration: DEFAULT_EXPIRATION,
        }
    }
}

impl Settings {
    /// Reads the settings from the given YAML file.
    ///
    /// A file which doesn't exist yields the default settings. A file which cannot be read or
    /// parsed results in an error.
    pub async fn load(file_name: &str) -> anyhow::Result<Settings> {
        match tokio::fs::metadata(file_name).await {
            Ok(metadata) if metadata.is_file() => (),
            _ => {
                log::info!(
                    "Settings file {} doesn't exist - using the defaults.",
                    file_name
                );
                return Ok(Settings::default());
            }
        }

        log::info!("Loading settings from {}...", file_name);
        let data = tokio::fs::read_to_string(file_name)
            .await
            .with_context(|| format!("Cannot read settings file {}", file_name))?;

        Settings::load_from_string(data.as_str())
            .with_context(|| format!("Cannot load settings file {}", file_name))
    }

    /// Parses the settings from the given YAML document.
    pub fn load_from_string(data: &str) -> anyhow::Result<Settings> {
        let docs = YamlLoader::load_from_str(data).context("Cannot parse settings")?;
        let section = match docs.first() {
            Some(doc) => &doc["surface_cache"],
            None => return Ok(Settings::default()),
        };

        let mut settings = Settings::default();
        if let Some(value) = read_value(section, "max_size")? {
            settings.max_size = parse_size(&value).context("Invalid surface_cache.max_size")?;
        }
        if let Some(value) = read_value(section, "size_factor")? {
            settings.size_factor = value
                .parse()
                .with_context(|| format!("Invalid surface_cache.size_factor '{}'", value))?;
        }
        if let Some(value) = read_value(section, "expiration")? {
            settings.expiration =
                parse_duration(&value).context("Invalid surface_cache.expiration")?;
        }

        Ok(settings)
    }

    /// Computes the budget for a machine with the given amount of physical memory.
    ///
    /// This is the physical memory divided by the **size_factor** (where a factor of zero is
    /// treated as one), capped at **max_size**.
    pub fn budget(&self, physical_memory: u64) -> Cost {
        let share = physical_memory / self.size_factor.max(1) as u64;
        usize::try_from(share).map_or(self.max_size, |share| share.min(self.max_size))
    }
}

impl std::fmt::Display for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "max size: {}, size factor: {}, expiration: {}",
            format_size(self.max_size),
            self.size_factor,
            format_duration(self.expiration)
        )
    }
}

/// Reads a scalar as string, so that "64", 64 and "100m" are all handled alike.
fn read_value(section: &Yaml, key: &str) -> anyhow::Result<Option<String>> {
    match &section[key] {
        Yaml::BadValue | Yaml::Null => Ok(None),
        Yaml::String(value) => Ok(Some(value.clone())),
        Yaml::Integer(value) => Ok(Some(value.to_string())),
        other => Err(anyhow::anyhow!(
            "Expected a scalar for surface_cache.{} but got: {:?}",
            key,
            other
        )),
    }
}
