use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

pub const DEFAULT_EXTENSION: &str = "txt";
pub const DEFAULT_BACKLINKS_HEADING: &str = "Backlinks";

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct LinksConfig {
    #[serde(default)]
    pub structure: StructureSection,
    #[serde(default)]
    pub report: ReportSection,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct StructureSection {
    pub extension: String,
    pub backlinks_heading: String,
    pub no_backlinks_markers: Vec<String>,
    pub require_backlinks_section: bool,
}

impl Default for StructureSection {
    fn default() -> Self {
        Self {
            extension: DEFAULT_EXTENSION.to_string(),
            backlinks_heading: DEFAULT_BACKLINKS_HEADING.to_string(),
            no_backlinks_markers: vec!["no backlinks".to_string(), "root production".to_string()],
            require_backlinks_section: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct ReportSection {
    pub unresolved_limit: usize,
    pub duplicate_limit: usize,
    pub candidate_limit: usize,
}

impl Default for ReportSection {
    fn default() -> Self {
        Self {
            unresolved_limit: 10,
            duplicate_limit: 5,
            candidate_limit: 3,
        }
    }
}

impl LinksConfig {
    /// Full heading line, e.g. `===== Backlinks =====`.
    pub fn backlinks_header(&self) -> String {
        format!("===== {} =====", self.structure.backlinks_heading.trim())
    }

    /// File extension without the leading dot.
    pub fn extension(&self) -> &str {
        self.structure.extension.trim_start_matches('.')
    }

    pub fn is_no_backlinks_marker(&self, body: &str) -> bool {
        let lowered = body.to_lowercase();
        self.structure
            .no_backlinks_markers
            .iter()
            .any(|marker| lowered.contains(&marker.to_lowercase()))
    }

    fn validate(&self, config_path: &Path) -> Result<()> {
        if self.extension().is_empty() {
            bail!(
                "structure.extension cannot be empty in {}",
                config_path.display()
            );
        }
        if self.structure.backlinks_heading.trim().is_empty() {
            bail!(
                "structure.backlinks_heading cannot be empty in {}",
                config_path.display()
            );
        }
        Ok(())
    }
}

/// Load and parse a LinksConfig from a TOML file. Returns default if file doesn't exist.
pub fn load_config(config_path: &Path) -> Result<LinksConfig> {
    if !config_path.exists() {
        return Ok(LinksConfig::default());
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: LinksConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    parsed.validate(config_path)?;
    Ok(parsed)
}

pub fn render_config(config: &LinksConfig) -> Result<String> {
    toml::to_string_pretty(config).context("failed to serialize config TOML")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn load_config_returns_default_for_missing_file() {
        let config = load_config(Path::new("/nonexistent/.zimlinks.toml")).expect("load config");
        assert_eq!(config, LinksConfig::default());
        assert_eq!(config.backlinks_header(), "===== Backlinks =====");
        assert_eq!(config.extension(), "txt");
    }

    #[test]
    fn load_config_parses_partial_sections() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join(".zimlinks.toml");
        fs::write(
            &config_path,
            r#"
[structure]
extension = ".wiki"
require_backlinks_section = true

[report]
unresolved_limit = 3
"#,
        )
        .expect("write config");

        let config = load_config(&config_path).expect("load config");
        assert_eq!(config.extension(), "wiki");
        assert!(config.structure.require_backlinks_section);
        assert_eq!(config.structure.backlinks_heading, "Backlinks");
        assert_eq!(config.report.unresolved_limit, 3);
        assert_eq!(config.report.candidate_limit, 3);
    }

    #[test]
    fn load_config_returns_error_for_invalid_toml() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join(".zimlinks.toml");
        fs::write(&config_path, "[structure\nextension = \"oops\"").expect("write config");
        let error = load_config(&config_path).expect_err("must fail");
        assert!(error.to_string().contains("failed to parse"));
    }

    #[test]
    fn load_config_rejects_empty_heading() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join(".zimlinks.toml");
        fs::write(&config_path, "[structure]\nbacklinks_heading = \"  \"\n").expect("write config");
        let error = load_config(&config_path).expect_err("must fail");
        assert!(error.to_string().contains("backlinks_heading"));
    }

    #[test]
    fn markers_match_case_insensitively() {
        let config = LinksConfig::default();
        assert!(config.is_no_backlinks_marker("(No Backlinks)"));
        assert!(config.is_no_backlinks_marker("This is the ROOT production."));
        assert!(!config.is_no_backlinks_marker("[[module_item]]"));
    }

    #[test]
    fn render_config_round_trips_defaults() {
        let rendered = render_config(&LinksConfig::default()).expect("render");
        assert!(rendered.contains("backlinks_heading = \"Backlinks\""));
        let parsed: LinksConfig = toml::from_str(&rendered).expect("parse");
        assert_eq!(parsed, LinksConfig::default());
    }
}
