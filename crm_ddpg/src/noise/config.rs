//! Exploration noise selection from a comma-separated noise string.
//!
//! Accepted tokens:
//!
//! ```text
//! none
//! adaptive-param_<stddev>
//! normal_<stddev>
//! ou_<stddev>
//! ```
//!
//! e.g. `"adaptive-param_0.2"`, `"none,ou_0.3"` or `"adaptive-param_0.2,ou_0.2"`.
//! Parameter noise and one action noise may be combined; both then apply.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::param_noise::AdaptiveParamNoiseSpec;
use crate::error::{CrmError, Result};

/// Action-space noise process kind and its scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ActionNoiseKind {
    /// Independent Gaussian draw per dimension.
    Normal { sigma: f32 },
    /// Temporally correlated Ornstein-Uhlenbeck process.
    OrnsteinUhlenbeck { sigma: f32 },
}

/// Parsed exploration noise configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NoiseConfig {
    pub param_noise: Option<AdaptiveParamNoiseSpec>,
    pub action_noise: Option<ActionNoiseKind>,
}

impl NoiseConfig {
    /// No exploration noise.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_none(&self) -> bool {
        self.param_noise.is_none() && self.action_noise.is_none()
    }

    /// Parse a noise string.
    pub fn parse(spec: &str) -> Result<Self> {
        let mut config = NoiseConfig::none();

        for token in spec.split(',').map(str::trim) {
            if token == "none" {
                continue;
            }

            let (name, value) = token
                .split_once('_')
                .ok_or_else(|| CrmError::config(format!("unknown noise type \"{}\"", token)))?;
            let stddev: f32 = value.parse().map_err(|_| {
                CrmError::config(format!("invalid noise stddev \"{}\" in \"{}\"", value, token))
            })?;
            if !(stddev.is_finite() && stddev >= 0.0) {
                return Err(CrmError::config(format!(
                    "noise stddev must be non-negative, got {} in \"{}\"",
                    stddev, token
                )));
            }

            match name {
                "adaptive-param" => {
                    if config.param_noise.is_some() {
                        return Err(CrmError::config("parameter noise specified twice"));
                    }
                    config.param_noise = Some(AdaptiveParamNoiseSpec::new(stddev, stddev));
                }
                "normal" | "ou" => {
                    if config.action_noise.is_some() {
                        return Err(CrmError::config("more than one action noise specified"));
                    }
                    config.action_noise = Some(if name == "normal" {
                        ActionNoiseKind::Normal { sigma: stddev }
                    } else {
                        ActionNoiseKind::OrnsteinUhlenbeck { sigma: stddev }
                    });
                }
                _ => {
                    return Err(CrmError::config(format!("unknown noise type \"{}\"", token)));
                }
            }
        }

        Ok(config)
    }
}

impl FromStr for NoiseConfig {
    type Err = CrmError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for NoiseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tokens = Vec::with_capacity(2);
        if let Some(p) = self.param_noise {
            tokens.push(format!("adaptive-param_{}", p.initial_stddev));
        }
        match self.action_noise {
            Some(ActionNoiseKind::Normal { sigma }) => tokens.push(format!("normal_{}", sigma)),
            Some(ActionNoiseKind::OrnsteinUhlenbeck { sigma }) => tokens.push(format!("ou_{}", sigma)),
            None => {}
        }
        if tokens.is_empty() {
            return f.write_str("none");
        }
        f.write_str(&tokens.join(","))
    }
}
