//! Configuration file loader with multi-source merging

use super::file_config::FileConfig;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use std::path::{Path, PathBuf};

const PROJECT_FILES: [&str; 2] = ["conclave.toml", ".conclave.toml"];
const ENV_PREFIX: &str = "CONCLAVE_";

/// One place configuration may come from
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigSource {
    pub label: &'static str,
    pub path: PathBuf,
    pub found: bool,
}

/// Configuration loader that handles file discovery and merging
///
/// Priority (highest to lowest):
/// 1. `CONCLAVE_*` environment variables (`__` separates sections, e.g.
///    `CONCLAVE_CONSENSUS__MAX_ROUNDS=6`)
/// 2. Explicit config path (if provided)
/// 3. Project root: `./conclave.toml` or `./.conclave.toml`
/// 4. Global: `$XDG_CONFIG_HOME/conclave/config.toml`
/// 5. Default values
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    global: Option<PathBuf>,
    project_dir: PathBuf,
    explicit: Option<PathBuf>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self {
            global: Self::global_config_path(),
            project_dir: PathBuf::from("."),
            explicit: None,
        }
    }
}

impl ConfigLoader {
    pub fn new(explicit: Option<PathBuf>) -> Self {
        Self {
            explicit,
            ..Self::default()
        }
    }

    // ==================== Builder Methods ====================

    pub fn with_global(mut self, path: Option<PathBuf>) -> Self {
        self.global = path;
        self
    }

    pub fn with_project_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.project_dir = dir.into();
        self
    }

    /// Get the global config file path
    pub fn global_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("conclave").join("config.toml"))
    }

    /// Get the project-level config file path (if it exists)
    pub fn project_config_path(&self) -> Option<PathBuf> {
        Self::find_project_file(&self.project_dir)
    }

    fn find_project_file(dir: &Path) -> Option<PathBuf> {
        PROJECT_FILES
            .iter()
            .map(|name| dir.join(name))
            .find(|path| path.exists())
    }

    /// Config file locations, lowest priority first.
    pub fn sources(&self) -> Vec<ConfigSource> {
        let mut sources = Vec::new();
        if let Some(path) = &self.global {
            sources.push(ConfigSource {
                label: "global",
                path: path.clone(),
                found: path.exists(),
            });
        }
        match self.project_config_path() {
            Some(path) => sources.push(ConfigSource {
                label: "project",
                path,
                found: true,
            }),
            None => sources.push(ConfigSource {
                label: "project",
                path: self.project_dir.join(PROJECT_FILES[0]),
                found: false,
            }),
        }
        if let Some(path) = &self.explicit {
            sources.push(ConfigSource {
                label: "explicit",
                path: path.clone(),
                found: path.exists(),
            });
        }
        sources
    }

    pub fn figment(&self) -> Figment {
        let mut figment = Figment::new().merge(Serialized::defaults(FileConfig::default()));
        for source in self.sources() {
            if source.found {
                figment = figment.merge(Toml::file(&source.path));
            }
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Load configuration from all sources with proper priority.
    ///
    /// A missing explicit path is an error; missing discovered files are
    /// skipped.
    pub fn load(&self) -> Result<FileConfig, Box<figment::Error>> {
        if let Some(path) = &self.explicit
            && !path.exists()
        {
            return Err(Box::new(figment::Error::from(format!(
                "config file not found: {}",
                path.display()
            ))));
        }
        self.figment().extract().map_err(Box::new)
    }
}
