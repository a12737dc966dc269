//! Configuration models bound to a project directory.

use sc_protocol::CycleSettings;
use std::path::{Path, PathBuf};

/// Engine settings together with the project they apply to.
///
/// # Example
///
/// ```rust,no_run
/// use sc_core::config::loader::load_config;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = load_config(Path::new(".")).await?;
/// println!("Stories live in {}", config.stories_dir().display());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectConfig {
    /// Project root; git and agent processes run here.
    pub project_root: PathBuf,

    /// Settings from `.story-cycle/config.toml`, or defaults.
    pub settings: CycleSettings,
}

impl ProjectConfig {
    pub fn new(project_root: impl Into<PathBuf>, settings: CycleSettings) -> Self {
        Self {
            project_root: project_root.into(),
            settings,
        }
    }

    /// Project root as passed to collaborators.
    pub fn project_path(&self) -> String {
        self.project_root.to_string_lossy().into_owned()
    }

    /// Absolute location of the stories directory.
    pub fn stories_dir(&self) -> PathBuf {
        let dir = Path::new(&self.settings.stories_dir);
        if dir.is_absolute() {
            dir.to_path_buf()
        } else {
            self.project_root.join(dir)
        }
    }
}
