//! Data validation utilities.
//!
//! A data directory holds [`MOVEMENT_FILE`] and [`TERRITORY_FILE`]. Every
//! problem in every file is collected into one [`ValidationReport`] rather
//! than stopping at the first.

use std::fs;
use std::path::Path;

use frontier_core::data::{MovementConfig, TerritoryConfig};
use frontier_core::error::GameError;
use serde::Serialize;

use crate::error::ToolError;

/// Formation types and handlers.
pub const MOVEMENT_FILE: &str = "movement.ron";

/// Border table and placement rules.
pub const TERRITORY_FILE: &str = "territory.ron";

/// Problems found in one file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FileReport {
    /// File name or path.
    pub path: String,
    /// Every problem found; empty when the file is valid.
    pub problems: Vec<String>,
}

/// Problems found across a data directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    /// One entry per expected file.
    pub files: Vec<FileReport>,
}

impl ValidationReport {
    /// Whether no file reported a problem.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.files.iter().all(|f| f.problems.is_empty())
    }

    /// Total number of problems.
    #[must_use]
    pub fn problem_count(&self) -> usize {
        self.files.iter().map(|f| f.problems.len()).sum()
    }
}

/// Read a data file to a string.
pub fn read_file(path: &Path) -> Result<String, ToolError> {
    if !path.is_file() {
        return Err(ToolError::FileNotFound(path.display().to_string()));
    }
    fs::read_to_string(path).map_err(|source| ToolError::Read {
        path: path.display().to_string(),
        source,
    })
}

/// Point a parse error at the file it came from.
fn with_path(err: GameError, path: &Path) -> GameError {
    match err {
        GameError::DataParseError { message, .. } => GameError::DataParseError {
            path: path.display().to_string(),
            message,
        },
        other => other,
    }
}

/// Load a movement config file.
pub fn load_movement_config(path: &Path) -> Result<MovementConfig, ToolError> {
    let text = read_file(path)?;
    MovementConfig::from_ron(&text).map_err(|e| with_path(e, path).into())
}

/// Load a territory config file.
pub fn load_territory_config(path: &Path) -> Result<TerritoryConfig, ToolError> {
    let text = read_file(path)?;
    TerritoryConfig::from_ron(&text).map_err(|e| with_path(e, path).into())
}

/// Validate a movement config document.
#[must_use]
pub fn validate_movement(path: &str, text: &str) -> FileReport {
    let problems = match MovementConfig::from_ron(text) {
        Ok(config) => config.validate(),
        Err(err) => vec![err.to_string()],
    };
    FileReport {
        path: path.to_string(),
        problems,
    }
}

/// Validate a territory config document.
#[must_use]
pub fn validate_territory(path: &str, text: &str) -> FileReport {
    let problems = match TerritoryConfig::from_ron(text) {
        Ok(config) => config.validate(),
        Err(err) => vec![err.to_string()],
    };
    FileReport {
        path: path.to_string(),
        problems,
    }
}

/// Validate all RON data files in a directory.
///
/// A missing or unreadable file is reported as a problem of that file.
///
/// # Errors
///
/// Returns an error if `dir` is not a directory.
pub fn validate_data_directory(dir: &Path) -> Result<ValidationReport, ToolError> {
    if !dir.is_dir() {
        return Err(ToolError::FileNotFound(dir.display().to_string()));
    }

    let checks: [(&str, fn(&str, &str) -> FileReport); 2] = [
        (MOVEMENT_FILE, validate_movement),
        (TERRITORY_FILE, validate_territory),
    ];

    let mut report = ValidationReport::default();
    for (name, check) in checks {
        let path = dir.join(name);
        let label = path.display().to_string();
        let file = match read_file(&path) {
            Ok(text) => check(&label, &text),
            Err(err) => FileReport {
                path: label,
                problems: vec![err.to_string()],
            },
        };
        if file.problems.is_empty() {
            tracing::info!(file = %file.path, "Valid");
        } else {
            for problem in &file.problems {
                tracing::warn!(file = %file.path, "{problem}");
            }
        }
        report.files.push(file);
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use frontier_test_utils::fixtures::{STANDARD_MOVEMENT_RON, STANDARD_TERRITORY_RON};

    const SHIPPED_MOVEMENT: &str = include_str!("../../../assets/data/movement.ron");
    const SHIPPED_TERRITORY: &str = include_str!("../../../assets/data/territory.ron");

    #[test]
    fn test_shipped_data_is_valid() {
        let movement = validate_movement(MOVEMENT_FILE, SHIPPED_MOVEMENT);
        assert!(movement.problems.is_empty(), "{:?}", movement.problems);
        let territory = validate_territory(TERRITORY_FILE, SHIPPED_TERRITORY);
        assert!(territory.problems.is_empty(), "{:?}", territory.problems);
    }

    #[test]
    fn test_fixture_data_is_valid() {
        assert!(validate_movement("fixture", STANDARD_MOVEMENT_RON)
            .problems
            .is_empty());
        assert!(validate_territory("fixture", STANDARD_TERRITORY_RON)
            .problems
            .is_empty());
    }

    #[test]
    fn test_parse_error_is_one_problem() {
        let report = validate_movement("broken.ron", "MovementConfig(formations: [");
        assert_eq!(report.problems.len(), 1);
        assert!(report.problems[0].contains("movement config"));
    }

    #[test]
    fn test_report_counts_problems() {
        let bad = r#"TerritoryConfig(borders: [(code: "", size: "0")])"#;
        let report = ValidationReport {
            files: vec![
                validate_territory("territory.ron", bad),
                validate_movement("movement.ron", STANDARD_MOVEMENT_RON),
            ],
        };
        assert!(!report.is_clean());
        assert_eq!(report.problem_count(), 2);
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        let result = validate_data_directory(Path::new("does/not/exist"));
        assert!(matches!(result, Err(ToolError::FileNotFound(_))));
    }

    #[test]
    fn test_missing_file_is_reported_per_file() {
        let dir = std::env::temp_dir().join(format!("frontier-validate-{}", std::process::id()));
        fs::create_dir_all(&dir).expect("create temp dir");
        fs::write(dir.join(MOVEMENT_FILE), SHIPPED_MOVEMENT).expect("write movement");

        let report = validate_data_directory(&dir).expect("directory exists");
        let _ = fs::remove_dir_all(&dir);

        assert_eq!(report.files.len(), 2);
        assert!(report.files[0].problems.is_empty());
        assert_eq!(report.files[1].problems.len(), 1);
        assert!(report.files[1].problems[0].contains("not found"));
    }
}
