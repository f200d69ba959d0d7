use core::fmt::{Display, Formatter, Result};

/// Pruning settings, passed explicitly into every pruning entry point.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PruningConfig {
    /// When `false`, pruning leaves every constraint to the solver.
    pub enabled: bool,
    /// Pruning stops once a round solves at most this fraction of the
    /// initial constraints, or at most this fraction remains unsolved.
    pub stop_threshold: f64,
}

impl Default for PruningConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            stop_threshold: 0.01,
        }
    }
}

impl PruningConfig {
    /// # Errors
    ///
    /// [`ConfigError::StopThreshold`] unless `0 <= stop_threshold <= 1`.
    pub fn new(enabled: bool, stop_threshold: f64) -> core::result::Result<Self, ConfigError> {
        if !(0.0..=1.0).contains(&stop_threshold) {
            return Err(ConfigError::StopThreshold(stop_threshold));
        }
        Ok(Self {
            enabled,
            stop_threshold,
        })
    }

    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

/// Settings for a whole verification run.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VerifierConfig {
    pub pruning: PruningConfig,
    /// Bundle every key two transactions both write into one constraint,
    /// instead of one constraint per key.
    pub coalesce_constraints: bool,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            pruning: PruningConfig::default(),
            coalesce_constraints: true,
        }
    }
}

#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConfigError {
    /// The stop threshold is NaN or outside `[0, 1]`.
    StopThreshold(f64),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter) -> Result {
        match self {
            Self::StopThreshold(value) => {
                write!(f, "stop threshold {value} is not within [0, 1]")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = VerifierConfig::default();
        assert!(config.pruning.enabled);
        assert!((config.pruning.stop_threshold - 0.01).abs() < f64::EPSILON);
        assert!(config.coalesce_constraints);
        assert!(!PruningConfig::disabled().enabled);
    }

    #[test]
    fn test_threshold_range() {
        assert!(PruningConfig::new(true, 0.0).is_ok());
        assert!(PruningConfig::new(true, 1.0).is_ok());
        assert_eq!(
            PruningConfig::new(true, 1.5),
            Err(ConfigError::StopThreshold(1.5))
        );
        assert!(PruningConfig::new(true, -0.1).is_err());
        assert!(PruningConfig::new(true, f64::NAN).is_err());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_config_from_json() {
        let config: VerifierConfig = serde_json::from_str(
            r#"{"pruning":{"enabled":false,"stop_threshold":0.2},"coalesce_constraints":false}"#,
        )
        .unwrap();
        assert!(!config.pruning.enabled);
        assert!(!config.coalesce_constraints);
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(serde_json::from_str::<VerifierConfig>(&json).unwrap(), config);
    }
}
