use serde::Deserialize;
use std::path::Path;

/// Ring capacities the stress harness is compiled for.
pub const SUPPORTED_CAPACITIES: [usize; 4] = [1 << 10, 1 << 12, 1 << 14, 1 << 16];

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct StressConfig {
    #[serde(default = "defaults::log_level")]
    pub log_level: String,
    #[serde(default = "defaults::capacity")]
    pub capacity: usize,
    #[serde(default = "defaults::producers")]
    pub producers: usize,
    #[serde(default = "defaults::records_per_producer")]
    pub records_per_producer: u64,
    #[serde(default = "defaults::broadcast_readers")]
    pub broadcast_readers: usize,
    #[serde(default = "defaults::event_path")]
    pub event_path: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read '{path}'")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

mod defaults {
    pub fn log_level() -> String {
        "info".into()
    }

    pub fn capacity() -> usize {
        1 << 12 // 4096
    }

    pub fn producers() -> usize {
        4
    }

    pub fn records_per_producer() -> u64 {
        100_000
    }

    pub fn broadcast_readers() -> usize {
        2
    }

    pub fn event_path() -> String {
        "/tmp/quartz_stress_event".into()
    }
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            log_level: defaults::log_level(),
            capacity: defaults::capacity(),
            producers: defaults::producers(),
            records_per_producer: defaults::records_per_producer(),
            broadcast_readers: defaults::broadcast_readers(),
            event_path: defaults::event_path(),
        }
    }
}

impl StressConfig {
    /// Read, parse and validate a TOML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let toml_to_str = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::parse(&toml_to_str)?;
        config.validate()?;
        Ok(config)
    }

    pub fn parse(toml_str: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(toml_str)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !SUPPORTED_CAPACITIES.contains(&self.capacity) {
            return Err(ConfigError::Invalid(format!(
                "capacity {} not one of {:?}",
                self.capacity, SUPPORTED_CAPACITIES
            )));
        }
        if self.producers == 0 {
            return Err(ConfigError::Invalid("producers must be at least 1".into()));
        }
        if self.producers > u16::MAX as usize {
            return Err(ConfigError::Invalid(format!(
                "producers {} exceeds {}",
                self.producers,
                u16::MAX
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_file_gives_defaults() {
        let cfg = StressConfig::parse("").unwrap();
        assert_eq!(cfg, StressConfig::default());
        assert_eq!(cfg.capacity, 4096);
        assert_eq!(cfg.log_level, "info");
        cfg.validate().unwrap();
    }

    #[test]
    fn fields_override_defaults() {
        let cfg = StressConfig::parse(
            r#"
            log_level = "debug"
            capacity = 1024
            producers = 2
            records_per_producer = 10
            broadcast_readers = 0
            event_path = "/tmp/other_event"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.log_level, "debug");
        assert_eq!(cfg.capacity, 1024);
        assert_eq!(cfg.producers, 2);
        assert_eq!(cfg.records_per_producer, 10);
        assert_eq!(cfg.broadcast_readers, 0);
        assert_eq!(cfg.event_path, "/tmp/other_event");
    }

    #[test]
    fn unsupported_capacity_is_rejected() {
        let cfg = StressConfig {
            capacity: 1000,
            ..StressConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn zero_producers_is_rejected() {
        let cfg = StressConfig {
            producers: 0,
            ..StressConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn unknown_key_is_a_parse_error() {
        let err = StressConfig::parse("capacty = 1024").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn load_reads_and_validates_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "capacity = 16384\nproducers = 8").unwrap();
        let cfg = StressConfig::load(file.path()).unwrap();
        assert_eq!(cfg.capacity, 16384);
        assert_eq!(cfg.producers, 8);

        let mut bad = tempfile::NamedTempFile::new().unwrap();
        writeln!(bad, "capacity = 3").unwrap();
        assert!(matches!(
            StressConfig::load(bad.path()),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = StressConfig::load("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
