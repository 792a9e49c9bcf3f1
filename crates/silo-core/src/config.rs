//! Configuration loading and typed config structures for the silo engine.
//!
//! The configuration mirrors a YAML document with three sections:
//! `morning`, `germination`, and `stem`. Every field is optional and
//! defaults to the protocol's current constants, so an empty document is a
//! valid configuration.

use std::path::Path;

use rust_decimal::Decimal;
use serde::Deserialize;

use silo_types::{AccountingParams, StemLayout};

/// Environment variable overriding `morning.seconds_per_interval`.
pub const SECONDS_PER_INTERVAL_ENV: &str = "SILO_SECONDS_PER_INTERVAL";

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// A value parsed but is out of range.
    #[error("invalid configuration: {reason}")]
    Invalid {
        /// What is wrong.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SiloConfig {
    /// Morning auction timing.
    #[serde(default)]
    pub morning: MorningConfig,

    /// Germination window.
    #[serde(default)]
    pub germination: GerminationConfig,

    /// Stem scale and deposit id layout.
    #[serde(default)]
    pub stem: StemConfig,
}

impl SiloConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// `SILO_SECONDS_PER_INTERVAL` overrides `morning.seconds_per_interval`
    /// when set. The result is validated.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string, apply environment overrides,
    /// and validate.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yml::from_str(yaml)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Override values with environment variables when set.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if a variable is set but unparsable.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        let value = std::env::var(SECONDS_PER_INTERVAL_ENV).ok();
        self.morning.apply_seconds_override(value.as_deref())
    }

    /// Check every section for out-of-range values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.morning.validate()?;
        self.germination.validate()?;
        self.stem.validate()?;
        if self.germination.season_length_seconds != self.morning.season_length_seconds {
            return invalid(format!(
                "germination.season_length_seconds ({}) differs from morning.season_length_seconds ({})",
                self.germination.season_length_seconds, self.morning.season_length_seconds
            ));
        }
        Ok(())
    }

    /// The ledger parameters this configuration describes.
    pub fn accounting_params(&self) -> AccountingParams {
        AccountingParams {
            stalk_scale: i128::from(self.stem.stalk_scale),
            season_length_seconds: self.germination.season_length_seconds,
            germination_seasons: self.germination.germination_seasons,
            stem_layout: StemLayout {
                stem_bits: self.stem.id_stem_bits,
                signed: self.stem.id_stem_signed,
            },
        }
    }
}

/// Morning auction timing and chain approximations.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MorningConfig {
    /// Intervals in one morning; temperature reaches its maximum at the
    /// last one.
    #[serde(default = "default_intervals_per_morning")]
    pub intervals_per_morning: u32,

    /// Length of one interval in seconds.
    #[serde(default = "default_seconds_per_interval")]
    pub seconds_per_interval: i64,

    /// Approximate L2 blocks produced per L1 block.
    #[serde(default = "default_l2_blocks_per_l1_block")]
    pub approx_l2_blocks_per_l1_block: u64,

    /// Approximate seconds per L2 block.
    #[serde(default = "default_secs_per_l2_block")]
    pub approx_secs_per_l2_block: Decimal,

    /// Length of one season in seconds.
    #[serde(default = "default_season_length_seconds")]
    pub season_length_seconds: i64,
}

impl MorningConfig {
    /// Apply an override of `seconds_per_interval` from its raw text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if `value` is not an integer.
    pub fn apply_seconds_override(&mut self, value: Option<&str>) -> Result<(), ConfigError> {
        if let Some(raw) = value {
            self.seconds_per_interval = raw.trim().parse().map_err(|_err| ConfigError::Invalid {
                reason: format!("{SECONDS_PER_INTERVAL_ENV}={raw:?} is not an integer"),
            })?;
        }
        Ok(())
    }

    /// Seconds the whole morning lasts.
    pub fn morning_length_seconds(&self) -> Option<i64> {
        self.seconds_per_interval
            .checked_mul(i64::from(self.intervals_per_morning))
    }

    /// Check for out-of-range values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.intervals_per_morning < 2 {
            return invalid(format!(
                "morning.intervals_per_morning must be at least 2, got {}",
                self.intervals_per_morning
            ));
        }
        if i32::try_from(self.intervals_per_morning).is_err() {
            return invalid("morning.intervals_per_morning exceeds i32 range".to_owned());
        }
        if self.seconds_per_interval <= 0 {
            return invalid(format!(
                "morning.seconds_per_interval must be positive, got {}",
                self.seconds_per_interval
            ));
        }
        if self.approx_l2_blocks_per_l1_block == 0 {
            return invalid("morning.approx_l2_blocks_per_l1_block must be positive".to_owned());
        }
        if self.approx_secs_per_l2_block <= Decimal::ZERO {
            return invalid(format!(
                "morning.approx_secs_per_l2_block must be positive, got {}",
                self.approx_secs_per_l2_block
            ));
        }
        match self.morning_length_seconds() {
            Some(length) if length <= self.season_length_seconds => Ok(()),
            _ => invalid(format!(
                "a morning of {} x {}s does not fit in a {}s season",
                self.intervals_per_morning, self.seconds_per_interval, self.season_length_seconds
            )),
        }
    }
}

impl Default for MorningConfig {
    fn default() -> Self {
        Self {
            intervals_per_morning: default_intervals_per_morning(),
            seconds_per_interval: default_seconds_per_interval(),
            approx_l2_blocks_per_l1_block: default_l2_blocks_per_l1_block(),
            approx_secs_per_l2_block: default_secs_per_l2_block(),
            season_length_seconds: default_season_length_seconds(),
        }
    }
}

/// Germination window.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GerminationConfig {
    /// Length of one season in seconds.
    #[serde(default = "default_season_length_seconds")]
    pub season_length_seconds: i64,

    /// Seasons a deposit spends germinating.
    #[serde(default = "default_germination_seasons")]
    pub germination_seasons: i64,
}

impl GerminationConfig {
    /// Check for out-of-range values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.season_length_seconds <= 0 {
            return invalid(format!(
                "germination.season_length_seconds must be positive, got {}",
                self.season_length_seconds
            ));
        }
        if self.germination_seasons < 1 {
            return invalid(format!(
                "germination.germination_seasons must be at least 1, got {}",
                self.germination_seasons
            ));
        }
        Ok(())
    }
}

impl Default for GerminationConfig {
    fn default() -> Self {
        Self {
            season_length_seconds: default_season_length_seconds(),
            germination_seasons: default_germination_seasons(),
        }
    }
}

/// Stem scale and deposit id layout.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StemConfig {
    /// Normalization between stem units and stalk units.
    #[serde(default = "default_stalk_scale")]
    pub stalk_scale: u64,

    /// Width of the stem field in a deposit id.
    #[serde(default = "default_id_stem_bits")]
    pub id_stem_bits: u32,

    /// Whether the stem field is two's complement.
    #[serde(default = "default_true")]
    pub id_stem_signed: bool,
}

impl StemConfig {
    /// Check for out-of-range values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stalk_scale == 0 {
            return invalid("stem.stalk_scale must be positive".to_owned());
        }
        if !(1..=127).contains(&self.id_stem_bits) {
            return invalid(format!(
                "stem.id_stem_bits must be in 1..=127, got {}",
                self.id_stem_bits
            ));
        }
        Ok(())
    }
}

impl Default for StemConfig {
    fn default() -> Self {
        Self {
            stalk_scale: default_stalk_scale(),
            id_stem_bits: default_id_stem_bits(),
            id_stem_signed: default_true(),
        }
    }
}

fn invalid<T>(reason: String) -> Result<T, ConfigError> {
    Err(ConfigError::Invalid { reason })
}

// ---------------------------------------------------------------------------
// Default value functions (required by serde)
// ---------------------------------------------------------------------------

const fn default_intervals_per_morning() -> u32 {
    25
}

const fn default_seconds_per_interval() -> i64 {
    24
}

const fn default_l2_blocks_per_l1_block() -> u64 {
    48
}

const fn default_secs_per_l2_block() -> Decimal {
    // 0.25
    Decimal::from_parts(25, 0, 0, false, 2)
}

const fn default_season_length_seconds() -> i64 {
    3_600
}

const fn default_germination_seasons() -> i64 {
    2
}

const fn default_stalk_scale() -> u64 {
    10_000
}

const fn default_id_stem_bits() -> u32 {
    96
}

const fn default_true() -> bool {
    true
}
