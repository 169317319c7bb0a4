//! Formation definitions and handler wiring.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{GameError, Result};
use crate::formation::{
    CircularFormationHandler, FormationHandler, FormationRegistry, HandlerSettings,
    MovementFormationType, RowFormationHandler, AMOUNT_PER_ROW, HORIZONTAL_SPACING, SPACING,
    VERTICAL_SPACING,
};
use crate::math::{fixed_decimal_serde, Fixed};

/// Named float property default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FloatPropertyData {
    /// Property name.
    pub name: String,
    /// Default value, written as a decimal string.
    #[serde(with = "fixed_decimal_serde")]
    pub value: Fixed,
}

/// Named int property default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntPropertyData {
    /// Property name.
    pub name: String,
    /// Default value.
    pub value: i32,
}

/// Data-driven formation type.
///
/// # Example RON
///
/// ```ron
/// FormationTypeData(
///     code: "line",
///     float_properties: [
///         (name: "spacing", value: "0.5"),
///     ],
///     int_properties: [
///         (name: "amount_per_row", value: 5),
///     ],
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormationTypeData {
    /// Unique formation code.
    pub code: String,

    /// Float property defaults.
    #[serde(default)]
    pub float_properties: Vec<FloatPropertyData>,

    /// Int property defaults.
    #[serde(default)]
    pub int_properties: Vec<IntPropertyData>,
}

impl FormationTypeData {
    /// Runtime formation type.
    #[must_use]
    pub fn to_formation_type(&self) -> MovementFormationType {
        let with_floats = self
            .float_properties
            .iter()
            .fold(MovementFormationType::new(&self.code), |ty, p| {
                ty.with_float(&p.name, p.value)
            });
        self.int_properties
            .iter()
            .fold(with_floats, |ty, p| ty.with_int(&p.name, p.value))
    }

    fn float(&self, name: &str) -> Option<Fixed> {
        self.float_properties
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.value)
    }

    fn int(&self, name: &str) -> Option<i32> {
        self.int_properties
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.value)
    }
}

/// Generation strategy of a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FormationShape {
    /// Concentric rings.
    Circular,
    /// Rows behind the target.
    Row,
}

/// Handler bound to a formation type.
///
/// # Example RON
///
/// ```ron
/// FormationHandlerData(
///     formation: "line",
///     shape: Row,
///     max_empty_attempts: 4,
///     fallback: Some("circle"),
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormationHandlerData {
    /// Formation code handled.
    pub formation: String,

    /// Generation strategy.
    pub shape: FormationShape,

    /// Empty calls tolerated before falling back.
    #[serde(default = "default_max_empty_attempts")]
    pub max_empty_attempts: u32,

    /// Formation to switch to on failure.
    #[serde(default)]
    pub fallback: Option<String>,
}

const fn default_max_empty_attempts() -> u32 {
    3
}

/// Movement configuration: formation types and their handlers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementConfig {
    /// Formation types.
    #[serde(default)]
    pub formations: Vec<FormationTypeData>,

    /// Handlers, one per formation.
    #[serde(default)]
    pub handlers: Vec<FormationHandlerData>,
}

impl MovementConfig {
    /// Parse a RON document.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::DataParseError`] on malformed input.
    pub fn from_ron(text: &str) -> Result<Self> {
        ron::from_str(text).map_err(|e| GameError::DataParseError {
            path: "movement config".to_string(),
            message: e.to_string(),
        })
    }

    /// Find a formation type by code.
    #[must_use]
    pub fn formation(&self, code: &str) -> Option<&FormationTypeData> {
        self.formations.iter().find(|f| f.code == code)
    }

    /// Find the handler of a formation.
    #[must_use]
    pub fn handler(&self, formation: &str) -> Option<&FormationHandlerData> {
        self.handlers.iter().find(|h| h.formation == formation)
    }

    /// Validate internal consistency.
    ///
    /// Returns a list of validation errors.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        let mut codes = BTreeSet::new();
        for formation in &self.formations {
            if formation.code.trim().is_empty() {
                errors.push("Formation type with an empty code".to_string());
                continue;
            }
            if !codes.insert(formation.code.as_str()) {
                errors.push(format!("Duplicate formation type '{}'", formation.code));
            }

            let mut names = BTreeSet::new();
            let all_names = formation
                .float_properties
                .iter()
                .map(|p| &p.name)
                .chain(formation.int_properties.iter().map(|p| &p.name));
            for name in all_names {
                if name.trim().is_empty() {
                    errors.push(format!(
                        "Formation '{}' has a property with an empty name",
                        formation.code
                    ));
                } else if !names.insert(name.as_str()) {
                    errors.push(format!(
                        "Formation '{}' defines property '{}' more than once",
                        formation.code, name
                    ));
                }
            }
        }

        let mut handled = BTreeSet::new();
        for handler in &self.handlers {
            if !handled.insert(handler.formation.as_str()) {
                errors.push(format!(
                    "Formation '{}' has more than one handler",
                    handler.formation
                ));
            }
            if handler.max_empty_attempts == 0 {
                errors.push(format!(
                    "Handler for '{}' must allow at least one empty attempt",
                    handler.formation
                ));
            }

            match self.formation(&handler.formation) {
                Some(formation) => errors.extend(shape_errors(handler.shape, formation)),
                None => errors.push(format!(
                    "Handler references unknown formation '{}'",
                    handler.formation
                )),
            }
        }

        for handler in &self.handlers {
            let Some(fallback) = &handler.fallback else {
                continue;
            };
            if *fallback == handler.formation {
                errors.push(format!(
                    "Formation '{}' falls back to itself",
                    handler.formation
                ));
            } else if !handled.contains(fallback.as_str()) {
                errors.push(format!(
                    "Formation '{}' falls back to '{}', which has no handler",
                    handler.formation, fallback
                ));
            }
        }

        errors
    }

    /// Validate and build the handler registry.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::InvalidConfig`] listing every validation error.
    pub fn build_registry(&self) -> Result<FormationRegistry> {
        let errors = self.validate();
        if !errors.is_empty() {
            return Err(GameError::InvalidConfig(errors));
        }

        let mut registry = FormationRegistry::new();
        for handler in &self.handlers {
            let formation = self
                .formation(&handler.formation)
                .map(FormationTypeData::to_formation_type)
                .ok_or_else(|| {
                    GameError::InvalidConfig(vec![format!(
                        "Handler references unknown formation '{}'",
                        handler.formation
                    )])
                })?;
            let mut settings = HandlerSettings::new(formation, handler.max_empty_attempts);
            settings.fallback.clone_from(&handler.fallback);

            let boxed: Box<dyn FormationHandler> = match handler.shape {
                FormationShape::Circular => Box::new(CircularFormationHandler::new(settings)),
                FormationShape::Row => Box::new(RowFormationHandler::new(settings)),
            };
            registry.register(boxed)?;
        }

        tracing::debug!(
            formations = self.formations.len(),
            handlers = self.handlers.len(),
            "Formation registry built"
        );
        Ok(registry)
    }
}

/// Properties a shape needs to have defaults for.
fn shape_errors(shape: FormationShape, formation: &FormationTypeData) -> Vec<String> {
    let mut errors = Vec::new();
    let spacing = formation.float(SPACING);
    match shape {
        FormationShape::Circular => {
            if spacing.is_none() {
                errors.push(format!(
                    "Circular formation '{}' needs float property '{SPACING}'",
                    formation.code
                ));
            }
        }
        FormationShape::Row => {
            if !formation.int(AMOUNT_PER_ROW).is_some_and(|n| n >= 1) {
                errors.push(format!(
                    "Row formation '{}' needs int property '{AMOUNT_PER_ROW}' of at least 1",
                    formation.code
                ));
            }
            for name in [HORIZONTAL_SPACING, VERTICAL_SPACING] {
                if formation.float(name).or(spacing).is_none() {
                    errors.push(format!(
                        "Row formation '{}' needs float property '{name}' or '{SPACING}'",
                        formation.code
                    ));
                }
            }
        }
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
        MovementConfig(
            formations: [
                (
                    code: "circle",
                    float_properties: [(name: "spacing", value: "0.5")],
                ),
                (
                    code: "line",
                    float_properties: [(name: "spacing", value: "1")],
                    int_properties: [(name: "amount_per_row", value: 4)],
                ),
            ],
            handlers: [
                (formation: "circle", shape: Circular, max_empty_attempts: 3),
                (formation: "line", shape: Row, fallback: Some("circle")),
            ],
        )
    "#;

    #[test]
    fn test_parse_and_build() {
        let config = MovementConfig::from_ron(CONFIG).expect("parse");
        assert!(config.validate().is_empty(), "{:?}", config.validate());
        assert_eq!(
            config.formation("circle").and_then(|f| f.float(SPACING)),
            Some(Fixed::from_num(0.5))
        );
        assert_eq!(config.handler("line").map(|h| h.max_empty_attempts), Some(3));

        let registry = config.build_registry().expect("registry");
        let line = registry.get("line").expect("line handler");
        assert_eq!(line.fallback_formation(), Some("circle"));
        assert_eq!(line.formation().int_property(AMOUNT_PER_ROW), Some(4));
    }

    #[test]
    fn test_bad_decimal_is_a_parse_error() {
        let text = r#"(formations: [(code: "x", float_properties: [(name: "spacing", value: "wide")])])"#;
        assert!(matches!(
            MovementConfig::from_ron(text),
            Err(GameError::DataParseError { .. })
        ));
    }

    #[test]
    fn test_validate_reports_every_problem() {
        let mut config = MovementConfig::from_ron(CONFIG).expect("parse");
        config.formations.push(FormationTypeData {
            code: "circle".to_string(),
            float_properties: vec![],
            int_properties: vec![],
        });
        config.formations[1].int_properties.push(IntPropertyData {
            name: "spacing".to_string(),
            value: 1,
        });
        config.handlers.push(FormationHandlerData {
            formation: "wedge".to_string(),
            shape: FormationShape::Row,
            max_empty_attempts: 0,
            fallback: Some("wedge".to_string()),
        });

        let errors = config.validate();
        assert!(errors.iter().any(|e| e.contains("Duplicate formation type 'circle'")));
        assert!(errors.iter().any(|e| e.contains("defines property 'spacing' more than once")));
        assert!(errors.iter().any(|e| e.contains("unknown formation 'wedge'")));
        assert!(errors.iter().any(|e| e.contains("at least one empty attempt")));
        assert!(errors.iter().any(|e| e.contains("falls back to itself")));
        assert!(matches!(
            config.build_registry(),
            Err(GameError::InvalidConfig(list)) if list.len() == errors.len()
        ));
    }

    #[test]
    fn test_row_needs_amount_per_row() {
        let config = MovementConfig {
            formations: vec![FormationTypeData {
                code: "line".to_string(),
                float_properties: vec![FloatPropertyData {
                    name: SPACING.to_string(),
                    value: Fixed::ONE,
                }],
                int_properties: vec![],
            }],
            handlers: vec![FormationHandlerData {
                formation: "line".to_string(),
                shape: FormationShape::Row,
                max_empty_attempts: 2,
                fallback: None,
            }],
        };
        let errors = config.validate();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains(AMOUNT_PER_ROW));
    }
}
