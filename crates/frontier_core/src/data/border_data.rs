//! Border and placement configuration.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{GameError, Result};
use crate::math::{fixed_decimal_serde, Fixed};
use crate::placement::PlacementRules;
use crate::terrain::{AreaMask, TerrainAreaId};
use crate::territory::{BorderConfig, CapacityLimit};

/// Capacity entry: at most `max_amount` buildings of `codes` per border.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityLimitData {
    /// Building codes counted together.
    pub codes: Vec<String>,
    /// Maximum tracked buildings with any of these codes.
    pub max_amount: u32,
}

/// Border settings of a building type.
///
/// # Example RON
///
/// ```ron
/// BorderData(
///     code: "town_hall",
///     size: "12",
///     limits: [
///         (codes: ["farm", "orchard"], max_amount: 4),
///     ],
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BorderData {
    /// Code of the building that owns this border.
    pub code: String,

    /// Border radius, as a decimal string.
    #[serde(with = "fixed_decimal_serde")]
    pub size: Fixed,

    /// Capacity table.
    #[serde(default)]
    pub limits: Vec<CapacityLimitData>,
}

impl BorderData {
    /// Runtime border settings.
    #[must_use]
    pub fn to_config(&self) -> BorderConfig {
        self.limits
            .iter()
            .fold(BorderConfig::new(self.size), |config, limit| {
                config.with_limit(CapacityLimit::new(limit.codes.iter().cloned(), limit.max_amount))
            })
    }
}

/// Placement validation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacementData {
    /// Terrain area ids a footprint may rest on; empty means all.
    #[serde(default)]
    pub allowed_areas: Vec<u8>,

    /// Height above the footprint the map rays start from.
    #[serde(with = "fixed_decimal_serde", default = "default_ray_height")]
    pub ray_height: Fixed,

    /// Maximum map ray length.
    #[serde(with = "fixed_decimal_serde", default = "default_max_ray_distance")]
    pub max_ray_distance: Fixed,

    /// Accept positions outside every friendly border.
    #[serde(default)]
    pub allow_outside_border: bool,
}

fn default_ray_height() -> Fixed {
    PlacementRules::default().ray_height
}

fn default_max_ray_distance() -> Fixed {
    PlacementRules::default().max_ray_distance
}

impl Default for PlacementData {
    fn default() -> Self {
        Self {
            allowed_areas: Vec::new(),
            ray_height: default_ray_height(),
            max_ray_distance: default_max_ray_distance(),
            allow_outside_border: false,
        }
    }
}

impl PlacementData {
    /// Runtime placement rules.
    #[must_use]
    pub fn to_rules(&self) -> PlacementRules {
        let allowed_areas = if self.allowed_areas.is_empty() {
            AreaMask::ALL
        } else {
            self.allowed_areas
                .iter()
                .fold(AreaMask::NONE, |mask, &id| {
                    mask.union(AreaMask::of(TerrainAreaId(id)))
                })
        };
        PlacementRules {
            allowed_areas,
            ray_height: self.ray_height,
            max_ray_distance: self.max_ray_distance,
            allow_outside_border: self.allow_outside_border,
        }
    }
}

/// Territory configuration: borders per building type and placement rules.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerritoryConfig {
    /// Border settings, one per owning building code.
    #[serde(default)]
    pub borders: Vec<BorderData>,

    /// Placement validation settings.
    #[serde(default)]
    pub placement: PlacementData,
}

impl TerritoryConfig {
    /// Parse a RON document.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::DataParseError`] on malformed input.
    pub fn from_ron(text: &str) -> Result<Self> {
        ron::from_str(text).map_err(|e| GameError::DataParseError {
            path: "territory config".to_string(),
            message: e.to_string(),
        })
    }

    /// Border settings of a building code.
    #[must_use]
    pub fn border(&self, code: &str) -> Option<&BorderData> {
        self.borders.iter().find(|b| b.code == code)
    }

    /// Validate internal consistency.
    ///
    /// Returns a list of validation errors.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        let mut codes = BTreeSet::new();
        for border in &self.borders {
            if border.code.trim().is_empty() {
                errors.push("Border with an empty building code".to_string());
            } else if !codes.insert(border.code.as_str()) {
                errors.push(format!("Duplicate border for '{}'", border.code));
            }

            if border.size <= Fixed::ZERO {
                errors.push(format!(
                    "Border '{}' has non-positive size {}",
                    border.code, border.size
                ));
            }

            for (index, limit) in border.limits.iter().enumerate() {
                if limit.codes.is_empty() {
                    errors.push(format!(
                        "Border '{}' limit #{index} lists no building codes",
                        border.code
                    ));
                }
                let mut seen = BTreeSet::new();
                for code in &limit.codes {
                    if !seen.insert(code.as_str()) {
                        errors.push(format!(
                            "Border '{}' limit #{index} lists '{code}' twice",
                            border.code
                        ));
                    }
                }
            }
        }

        if self.placement.allowed_areas.iter().any(|&id| id >= 32) {
            errors.push("Placement area ids must be below 32".to_string());
        }
        if self.placement.max_ray_distance <= Fixed::ZERO {
            errors.push("Placement ray distance must be positive".to_string());
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_border_table() {
        let text = r#"
            TerritoryConfig(
                borders: [
                    (
                        code: "town_hall",
                        size: "12.5",
                        limits: [(codes: ["farm", "orchard"], max_amount: 4)],
                    ),
                    (code: "outpost", size: "6"),
                ],
                placement: (allowed_areas: [0, 2], allow_outside_border: true),
            )
        "#;
        let config = TerritoryConfig::from_ron(text).expect("parse");
        assert!(config.validate().is_empty(), "{:?}", config.validate());

        let hall = config.border("town_hall").expect("town hall").to_config();
        assert_eq!(hall.size, Fixed::from_num(12.5));
        assert_eq!(hall.limits.len(), 1);
        assert!(hall.limits[0].codes.contains("orchard"));
        assert!(config.border("outpost").is_some_and(|b| b.limits.is_empty()));

        let rules = config.placement.to_rules();
        assert!(rules.allow_outside_border);
        assert!(rules.allowed_areas.contains(TerrainAreaId(2)));
        assert!(!rules.allowed_areas.contains(TerrainAreaId(1)));
        assert_eq!(rules.ray_height, PlacementRules::default().ray_height);
    }

    #[test]
    fn test_empty_placement_allows_every_area() {
        let rules = PlacementData::default().to_rules();
        assert_eq!(rules, PlacementRules::default());
    }

    #[test]
    fn test_validate_border_table() {
        let config = TerritoryConfig {
            borders: vec![
                BorderData {
                    code: "hall".to_string(),
                    size: Fixed::ZERO,
                    limits: vec![CapacityLimitData {
                        codes: vec![],
                        max_amount: 1,
                    }],
                },
                BorderData {
                    code: "hall".to_string(),
                    size: Fixed::ONE,
                    limits: vec![CapacityLimitData {
                        codes: vec!["farm".to_string(), "farm".to_string()],
                        max_amount: 2,
                    }],
                },
            ],
            placement: PlacementData::default(),
        };
        let errors = config.validate();
        assert_eq!(errors.len(), 4, "{errors:?}");
        assert!(errors.iter().any(|e| e.contains("Duplicate border for 'hall'")));
        assert!(errors.iter().any(|e| e.contains("non-positive size")));
        assert!(errors.iter().any(|e| e.contains("lists no building codes")));
        assert!(errors.iter().any(|e| e.contains("lists 'farm' twice")));
    }
}
