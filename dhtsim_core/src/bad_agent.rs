//! Adversarial behavior switches.

use serde::{Deserialize, Serialize};

/// Flags that make a cell deviate from honest behavior.
///
/// Each workflow reads only the flags it acts on; unknown future flags are
/// ignored by workflows that do not check them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BadAgentConfig {
    /// Commit and publish records without running app validation first
    pub disable_validation_before_publish: bool,

    /// Integrate received ops as valid even when validation rejects them
    pub pretend_invalid_records_are_valid: bool,
}

impl BadAgentConfig {
    pub fn honest() -> Self {
        Self::default()
    }

    pub fn with_disable_validation_before_publish(mut self, value: bool) -> Self {
        self.disable_validation_before_publish = value;
        self
    }

    pub fn with_pretend_invalid_records_are_valid(mut self, value: bool) -> Self {
        self.pretend_invalid_records_are_valid = value;
        self
    }

    pub fn is_honest(&self) -> bool {
        self == &Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_any_flag_makes_agent_dishonest() {
        assert!(BadAgentConfig::honest().is_honest());
        assert!(!BadAgentConfig::honest()
            .with_disable_validation_before_publish(true)
            .is_honest());
        assert!(!BadAgentConfig::honest()
            .with_pretend_invalid_records_are_valid(true)
            .is_honest());
    }
}
