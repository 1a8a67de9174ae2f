use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Confidence must lie strictly between 0 and 1, got {value}")]
    Confidence { value: f64 },

    #[error("'{field}' must be positive")]
    NotPositive { field: &'static str },
}

/// Settings of a verification run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifierConfig {
    /// Confidence level of every reported interval.
    pub confidence: f64,
    /// Scenes sampled and verified per round.
    pub batch_size: usize,
    /// Simulation step limit per scene.
    pub max_steps: usize,
    /// Worker threads; `None` lets the pool pick.
    pub threads: Option<usize>,
    /// Log the running report after every batch.
    pub verbose: bool,
    /// Conclude a scene as soon as an assumption is definitively false.
    pub stop_on_assumption_violation: bool,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            confidence: 0.95,
            batch_size: 1,
            max_steps: 200,
            threads: None,
            verbose: false,
            stop_on_assumption_violation: false,
        }
    }
}

impl VerifierConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: VerifierConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.confidence > 0.0 && self.confidence < 1.0) {
            return Err(ConfigError::Confidence {
                value: self.confidence,
            });
        }
        if self.batch_size == 0 {
            return Err(ConfigError::NotPositive {
                field: "batch_size",
            });
        }
        if self.max_steps == 0 {
            return Err(ConfigError::NotPositive { field: "max_steps" });
        }
        if self.threads == Some(0) {
            return Err(ConfigError::NotPositive { field: "threads" });
        }
        Ok(())
    }
}
