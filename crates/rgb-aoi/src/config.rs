//! Coordinate system configuration.

use serde::{Deserialize, Serialize};

use crate::error::{AoiError, AoiResult, check_range};

/// Settings of one [`CoordinateSystem`](crate::CoordinateSystem).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AoiConfig {
    /// Maintain the vertical axis sequence. Without it, vertical containment
    /// always holds and triggers behave as infinite columns.
    pub has_y: bool,
    /// Run the invariant checker after every structural mutation.
    pub validate_updates: bool,
    /// Horizontal range used by callers that do not pick one.
    pub default_range_xz: f32,
    /// Vertical half-height used by callers that do not pick one.
    pub default_range_y: f32,
}

impl Default for AoiConfig {
    fn default() -> Self {
        Self {
            has_y: true,
            validate_updates: false,
            default_range_xz: 50.0,
            default_range_y: 50.0,
        }
    }
}

impl AoiConfig {
    /// Reject settings the index cannot run with.
    pub fn validate(&self) -> AoiResult<()> {
        check_range(self.default_range_xz, self.default_range_y)
            .map_err(|err| AoiError::InvalidConfig(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(AoiConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: AoiConfig = serde_json::from_str(r#"{ "has_y": false }"#).unwrap();
        assert!(!config.has_y);
        assert_eq!(config.default_range_xz, 50.0);
    }

    #[test]
    fn test_rejects_non_positive_default_range() {
        let config = AoiConfig {
            default_range_y: 0.0,
            ..AoiConfig::default()
        };
        assert!(matches!(config.validate(), Err(AoiError::InvalidConfig(_))));
    }
}
