//! Server configuration read from the environment.

use initiative_core::rng::SeededRng;
use initiative_core::roll::{DiceRollEvaluator, RollEvaluator};
use initiative_tracker::domain::aggregates::DEFAULT_FORMULA;

use crate::error::AppError;

/// Settings the server needs at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    /// Interface to bind.
    pub host: String,
    /// Port to bind.
    pub port: u16,
    /// Formula for encounters created without one.
    pub initiative_formula: String,
    /// Fixed RNG seed; `None` seeds from the operating system.
    pub rng_seed: Option<u64>,
}

impl ApiConfig {
    /// Reads `HOST`, `PORT`, `INITIATIVE_FORMULA` and `RNG_SEED`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if a variable holds an invalid value.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ApiConfig::from_env`] with a custom variable source.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if a variable holds an invalid value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let host = lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = match lookup("PORT") {
            Some(raw) => raw
                .parse()
                .map_err(|e| AppError::Config(format!("PORT must be a valid u16: {e}")))?,
            None => 3000,
        };
        let rng_seed = lookup("RNG_SEED")
            .map(|raw| {
                raw.parse().map_err(|e| {
                    AppError::Config(format!("RNG_SEED must be a valid u64: {e}"))
                })
            })
            .transpose()?;

        let initiative_formula =
            lookup("INITIATIVE_FORMULA").unwrap_or_else(|| DEFAULT_FORMULA.to_string());
        // A trial roll rejects formulas the evaluator cannot read.
        DiceRollEvaluator
            .roll(&initiative_formula, &mut SeededRng::from_seed(0))
            .map_err(|e| AppError::Config(format!("INITIATIVE_FORMULA is invalid: {e}")))?;

        Ok(Self {
            host,
            port,
            initiative_formula,
            rng_seed,
        })
    }

    /// `host:port` for binding.
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(vars: &[(&str, &str)]) -> Result<ApiConfig, AppError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        ApiConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_apply_when_nothing_is_set() {
        let config = config_from(&[]).unwrap();

        assert_eq!(config.bind_address(), "0.0.0.0:3000");
        assert_eq!(config.initiative_formula, DEFAULT_FORMULA);
        assert_eq!(config.rng_seed, None);
    }

    #[test]
    fn test_values_are_read_from_the_environment() {
        let config = config_from(&[
            ("HOST", "127.0.0.1"),
            ("PORT", "8080"),
            ("INITIATIVE_FORMULA", "1d20+2"),
            ("RNG_SEED", "42"),
        ])
        .unwrap();

        assert_eq!(config.bind_address(), "127.0.0.1:8080");
        assert_eq!(config.initiative_formula, "1d20+2");
        assert_eq!(config.rng_seed, Some(42));
    }

    #[test]
    fn test_invalid_port_is_a_config_error() {
        let result = config_from(&[("PORT", "eighty")]);

        match result.unwrap_err() {
            AppError::Config(msg) => assert!(msg.contains("PORT")),
            other => panic!("expected Config, got {other:?}"),
        }
    }

    #[test]
    fn test_invalid_seed_is_a_config_error() {
        assert!(matches!(
            config_from(&[("RNG_SEED", "-1")]),
            Err(AppError::Config(_))
        ));
    }

    #[test]
    fn test_unreadable_formula_is_a_config_error() {
        match config_from(&[("INITIATIVE_FORMULA", "roll well")]).unwrap_err() {
            AppError::Config(msg) => assert!(msg.contains("INITIATIVE_FORMULA")),
            other => panic!("expected Config, got {other:?}"),
        }
    }
}
