//! Calculator configuration.

use crate::errors::{AtmResult, AtmosphereError};
use serde::{Deserialize, Serialize};

/// One-time options of a [`crate::calculator::TransitDepthCalculator`].
///
/// These are construction-time settings, distinct from the per-call
/// retrieval parameters in [`crate::calculator::DepthParams`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalculatorOptions {
    /// Reference pressure anchoring the planet radius
    /// unit: Pa
    pub ref_pressure: f64,
    /// Floor applied to interpolated mixing ratios (and NaN replacement)
    pub min_abundance: f64,
}

impl Default for CalculatorOptions {
    fn default() -> Self {
        Self {
            ref_pressure: 1e5,
            min_abundance: 1e-99,
        }
    }
}

impl CalculatorOptions {
    /// Parse options from a TOML document; missing keys take defaults.
    pub fn from_toml(text: &str) -> AtmResult<Self> {
        toml::from_str(text).map_err(|e| AtmosphereError::InvalidConfig(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn toml_overrides_defaults() {
        let options = CalculatorOptions::from_toml("ref_pressure = 1e4\n").unwrap();
        assert_relative_eq!(options.ref_pressure, 1e4);
        assert_relative_eq!(options.min_abundance, 1e-99);
    }

    #[test]
    fn bad_toml_is_a_config_error() {
        assert!(matches!(
            CalculatorOptions::from_toml("ref_pressure = []").unwrap_err(),
            AtmosphereError::InvalidConfig(_)
        ));
    }
}
