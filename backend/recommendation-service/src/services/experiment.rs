// ============================================
// A/B Experiment Bucketing
// ============================================
//
// Deterministic assignment of users to the control/test cohorts.
// No assignment state is persisted: the group is recomputed from
// the user id and the deployment salt on every request.

use crate::config::ExperimentConfig;
use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Experiment cohort
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExperimentGroup {
    Control,
    Test,
}

impl ExperimentGroup {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExperimentGroup::Control => "control",
            ExperimentGroup::Test => "test",
        }
    }

    /// Subdirectory of the model base path holding this group's artifact
    pub fn model_dir_name(&self) -> &'static str {
        match self {
            ExperimentGroup::Control => "model_control",
            ExperimentGroup::Test => "model_test",
        }
    }
}

impl fmt::Display for ExperimentGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExperimentGroup {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "control" => Ok(ExperimentGroup::Control),
            "test" => Ok(ExperimentGroup::Test),
            other => Err(AppError::InvalidArgument(format!(
                "Invalid group value {:?}. Must be 'control' or 'test'.",
                other
            ))),
        }
    }
}

/// Salted hash bucketing into two cohorts
#[derive(Debug, Clone)]
pub struct Bucketer {
    salt: String,
    control_percentage: u8,
}

impl Bucketer {
    pub fn new(salt: impl Into<String>, control_percentage: u8) -> Self {
        Self {
            salt: salt.into(),
            control_percentage: control_percentage.min(100),
        }
    }

    pub fn from_config(config: &ExperimentConfig) -> Self {
        Self::new(config.salt.clone(), config.control_percentage)
    }

    /// Bucket in 0..100
    ///
    /// MD5 of `user_id ++ salt`, read as a big-endian 128-bit integer, mod 100.
    pub fn bucket<T: fmt::Display + ?Sized>(&self, user_id: &T) -> u8 {
        let mut input = user_id.to_string().into_bytes();
        input.extend_from_slice(self.salt.as_bytes());

        let digest = md5::compute(&input);
        (u128::from_be_bytes(digest.0) % 100) as u8
    }

    pub fn assign<T: fmt::Display + ?Sized>(&self, user_id: &T) -> ExperimentGroup {
        if self.bucket(user_id) < self.control_percentage {
            ExperimentGroup::Control
        } else {
            ExperimentGroup::Test
        }
    }
}

impl Default for Bucketer {
    fn default() -> Self {
        Self::from_config(&ExperimentConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_assignment_deterministic() {
        let bucketer = Bucketer::default();

        for user_id in [1_i64, 42, 200, 1000, 121_245] {
            assert_eq!(bucketer.assign(&user_id), bucketer.assign(&user_id));
            assert_eq!(bucketer.bucket(&user_id), bucketer.bucket(&user_id));
        }
    }

    #[test]
    fn test_known_buckets() {
        let bucketer = Bucketer::new("my_salt", 50);

        assert_eq!(bucketer.bucket(&1), 97);
        assert_eq!(bucketer.bucket(&200), 32);
        assert_eq!(bucketer.bucket(&1000), 74);
        assert_eq!(bucketer.bucket("abc"), 99);

        assert_eq!(bucketer.assign(&1), ExperimentGroup::Test);
        assert_eq!(bucketer.assign(&200), ExperimentGroup::Control);
    }

    #[test]
    fn test_string_and_integer_ids_agree() {
        let bucketer = Bucketer::default();
        assert_eq!(bucketer.bucket(&1234_i64), bucketer.bucket("1234"));
    }

    #[test]
    fn test_allocation_distribution() {
        let bucketer = Bucketer::new("my_salt", 50);

        let control = (0..10_000_i64)
            .filter(|id| bucketer.assign(id) == ExperimentGroup::Control)
            .count();

        // ~50% (4962 with this salt)
        assert!(control > 4_700 && control < 5_300, "Control: {}", control);
    }

    #[test]
    fn test_uneven_split() {
        let bucketer = Bucketer::new("my_salt", 20);

        let control = (0..10_000_i64)
            .filter(|id| bucketer.assign(id) == ExperimentGroup::Control)
            .count();

        assert!(control > 1_700 && control < 2_300, "Control: {}", control);
    }

    #[test]
    fn test_extreme_percentages() {
        let all_control = Bucketer::new("my_salt", 100);
        let all_test = Bucketer::new("my_salt", 0);

        for id in 0..500_i64 {
            assert_eq!(all_control.assign(&id), ExperimentGroup::Control);
            assert_eq!(all_test.assign(&id), ExperimentGroup::Test);
        }
    }

    #[test]
    fn test_salt_changes_assignment() {
        let a = Bucketer::new("my_salt", 50);
        let b = Bucketer::new("other_salt", 50);

        let differing = (0..1_000_i64)
            .filter(|id| a.bucket(id) != b.bucket(id))
            .count();
        assert!(differing > 900);
    }

    #[test]
    fn test_group_parsing() {
        assert_eq!(
            "control".parse::<ExperimentGroup>().unwrap(),
            ExperimentGroup::Control
        );
        assert_eq!("test".parse::<ExperimentGroup>().unwrap(), ExperimentGroup::Test);

        let err = "treatment".parse::<ExperimentGroup>().unwrap_err();
        assert!(matches!(err, AppError::InvalidArgument(_)));
    }

    #[test]
    fn test_group_names() {
        assert_eq!(ExperimentGroup::Control.to_string(), "control");
        assert_eq!(ExperimentGroup::Test.model_dir_name(), "model_test");
        assert_eq!(
            serde_json::to_string(&ExperimentGroup::Control).unwrap(),
            "\"control\""
        );
    }
}
