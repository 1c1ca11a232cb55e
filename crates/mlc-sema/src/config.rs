use mlc_common::events::Level;
use serde::Deserialize;

/// Knobs for one semantic-analysis pass, read from the `[sema]` table of a
/// project manifest.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SemaConfig {
    /// Reject matches over sum types that leave variants uncovered.
    pub check_exhaustiveness: bool,
    /// Events below this level are dropped by the diagnostics bus.
    pub event_level: Level,
    /// Compute purity/constexpr effect tags for functions.
    pub analyze_effects: bool,
}

impl Default for SemaConfig {
    fn default() -> Self {
        SemaConfig {
            check_exhaustiveness: true,
            event_level: Level::Debug,
            analyze_effects: true,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    sema: SemaConfig,
}

impl SemaConfig {
    /// Parse the `[sema]` table out of a TOML document. Other tables are
    /// ignored; a missing table yields the defaults.
    pub fn from_toml_str(content: &str) -> Result<SemaConfig, String> {
        let file: ConfigFile =
            toml::from_str(content).map_err(|e| format!("Failed to parse sema config: {}", e))?;
        Ok(file.sema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_table_gives_defaults() {
        let config = SemaConfig::from_toml_str("[package]\nname = \"demo\"\n").unwrap();
        assert_eq!(config, SemaConfig::default());
    }

    #[test]
    fn reads_sema_table() {
        let config = SemaConfig::from_toml_str(
            r#"
[sema]
check_exhaustiveness = false
event_level = "warning"
"#,
        )
        .unwrap();
        assert!(!config.check_exhaustiveness);
        assert_eq!(config.event_level, Level::Warning);
        assert!(config.analyze_effects);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = SemaConfig::from_toml_str("[sema]\nstrict = true\n").unwrap_err();
        assert!(err.starts_with("Failed to parse sema config"));
    }
}
