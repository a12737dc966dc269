//! Configuration file loader for the `.story-cycle/` directory.
//!
//! Only `config.toml` is read. Every setting has a default, so a project
//! without the directory or the file gets a working engine.

use crate::config::error::ConfigError;
use crate::config::error::ConfigResult;
use crate::config::models::ProjectConfig;
use sc_protocol::CycleSettings;
use std::path::Path;
use tracing::debug;

/// Directory holding engine configuration, relative to the project root.
pub const CONFIG_DIR: &str = ".story-cycle";

/// Configuration file name inside [`CONFIG_DIR`].
pub const CONFIG_FILE: &str = "config.toml";

/// Loads the engine configuration of the project at `root`.
///
/// # Arguments
///
/// * `root` - Project root containing the `.story-cycle/` folder
///
/// # Returns
///
/// A `ProjectConfig` bound to `root`. Missing directory or file yields the
/// default settings rather than an error.
///
/// # Errors
///
/// Returns `ConfigError` if:
/// - The file exists but cannot be read
/// - The file has invalid TOML syntax or field types
/// - The settings fail validation
pub async fn load_config(root: &Path) -> ConfigResult<ProjectConfig> {
    let config_path = root.join(CONFIG_DIR).join(CONFIG_FILE);

    if !config_path.exists() {
        debug!(path = %config_path.display(), "No config file, using defaults");
        return Ok(ProjectConfig::new(root, CycleSettings::default()));
    }

    let content = tokio::fs::read_to_string(&config_path)
        .await
        .map_err(|source| ConfigError::FileRead {
            path: config_path.clone(),
            source,
        })?;

    let settings = parse_settings(&content, &config_path)?;
    Ok(ProjectConfig::new(root, settings))
}

/// Parse and validate settings from TOML text.
pub fn parse_settings(content: &str, path: &Path) -> ConfigResult<CycleSettings> {
    let settings: CycleSettings =
        toml::from_str(content).map_err(|source| ConfigError::TomlParse {
            path: path.to_path_buf(),
            source,
        })?;

    validate(&settings).map_err(|reason| ConfigError::InvalidConfig {
        path: path.to_path_buf(),
        reason,
    })?;

    Ok(settings)
}

fn validate(settings: &CycleSettings) -> Result<(), String> {
    if settings.git.base_branch.trim().is_empty() {
        return Err("git.base-branch must not be empty".to_string());
    }
    if settings
        .git
        .epic_branch
        .as_deref()
        .is_some_and(|b| b.trim().is_empty())
    {
        return Err("git.epic-branch must not be empty when set".to_string());
    }
    if settings.timing.classifier_window_chars == 0 {
        return Err("timing.classifier-window-chars must be greater than 0".to_string());
    }
    if settings.agents.auto_reply.trim().is_empty() {
        return Err("agents.auto-reply must not be empty".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sc_protocol::ProjectProfile;
    use std::fs;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_load_config_full_file() {
        let dir = tempdir().expect("Failed to create temp dir");
        let root = dir.path();
        let sc_dir = root.join(CONFIG_DIR);
        fs::create_dir_all(&sc_dir).expect("Failed to create config dir");

        let config_toml = r#"
profile = "game-dev"
review-rounds = 2
stories-dir = "stories"

[git]
branch-restriction = true
base-branch = "develop"
epic-branch = "epic-3"

[timing]
auto-reply-settle-ms = 10
story-settle-ms = 20

[agents]
max-auto-replies = 2
step-timeout-secs = 0
"#;
        fs::write(sc_dir.join(CONFIG_FILE), config_toml).expect("Failed to write config.toml");

        let config = load_config(root).await.expect("Failed to load config");

        assert_eq!(config.project_root, root);
        assert_eq!(config.settings.profile, ProjectProfile::GameDev);
        assert_eq!(config.settings.review_rounds, 2);
        assert_eq!(config.settings.git.base_branch, "develop");
        assert_eq!(config.settings.git.merge_target(), "epic-3");
        assert_eq!(config.settings.timing.auto_reply_settle_ms, 10);
        assert_eq!(config.settings.timing.short_output_chars, 200);
        assert_eq!(config.settings.agents.max_auto_replies, 2);
        assert_eq!(config.settings.agents.step_timeout_secs, 0);
        assert_eq!(config.stories_dir(), root.join("stories"));
    }

    /// A project without `.story-cycle/` gets defaults, not an error.
    #[tokio::test]
    async fn test_load_config_empty_directory() {
        let dir = tempdir().expect("Failed to create temp dir");

        let config = load_config(dir.path())
            .await
            .expect("Should handle missing .story-cycle");

        assert_eq!(config.settings, CycleSettings::default());
        assert_eq!(config.stories_dir(), dir.path().join("docs/stories"));
    }

    #[tokio::test]
    async fn test_load_config_invalid_toml() {
        let dir = tempdir().expect("Failed to create temp dir");
        let sc_dir = dir.path().join(CONFIG_DIR);
        fs::create_dir_all(&sc_dir).expect("Failed to create config dir");
        fs::write(sc_dir.join(CONFIG_FILE), "review-rounds = \"many\"")
            .expect("Failed to write config.toml");

        let result = load_config(dir.path()).await;
        assert!(matches!(result, Err(ConfigError::TomlParse { .. })));
    }

    #[test]
    fn test_validation_rejects_empty_base_branch() {
        let result = parse_settings(
            "[git]\nbase-branch = \"\"\n",
            Path::new("config.toml"),
        );
        match result {
            Err(ConfigError::InvalidConfig { reason, .. }) => {
                assert!(reason.contains("base-branch"));
            }
            other => panic!("expected InvalidConfig, got {other:?}"),
        }
    }

    #[test]
    fn test_validation_rejects_zero_window() {
        let result = parse_settings(
            "[timing]\nclassifier-window-chars = 0\n",
            Path::new("config.toml"),
        );
        assert!(matches!(result, Err(ConfigError::InvalidConfig { .. })));
    }
}
