//! Run settings, loaded from a TOML file and overridden by CLI flags.
//!
//! Lookup order: `--config <path>`, then `<config_dir>/reclaim/config.toml`,
//! then built-in defaults. Every field is optional in the file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::catalog::{Category, PathCatalog};
use crate::error::ConfigError;
use crate::executor::ExecutionProfile;
use crate::walker::WalkBudget;

/// How much of the system-optimization catalog a run touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OptimizationMode {
    /// Critical tier only.
    Conservative,
    /// Critical and high tiers.
    #[default]
    Standard,
    /// Down to the medium tier.
    Aggressive,
    /// Every tier.
    Expert,
}

/// Concurrency and walk budgets differ by how risky a category's locations are.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProfileKind {
    General,
    System,
    Development,
    Optimization,
}

impl ProfileKind {
    pub fn for_category(category: Category) -> Self {
        match category {
            Category::SystemFiles => ProfileKind::System,
            Category::DevelopmentFiles => ProfileKind::Development,
            Category::SystemOptimization => ProfileKind::Optimization,
            _ => ProfileKind::General,
        }
    }

    fn key(self) -> &'static str {
        match self {
            ProfileKind::General => "general",
            ProfileKind::System => "system",
            ProfileKind::Development => "development",
            ProfileKind::Optimization => "optimization",
        }
    }

    fn preset(self) -> CategoryProfile {
        let secs = Duration::from_secs;
        match self {
            ProfileKind::General => CategoryProfile {
                exec: ExecutionProfile {
                    batch_size: 100,
                    max_workers: 8,
                    cpu_multiplier: 2,
                    item_timeout: secs(5),
                    batch_timeout: secs(60),
                    category_timeout: secs(300),
                },
                walk: WalkBudget::new(10_000, 10),
            },
            ProfileKind::System => CategoryProfile {
                exec: ExecutionProfile {
                    batch_size: 300,
                    max_workers: 12,
                    cpu_multiplier: 2,
                    item_timeout: secs(10),
                    batch_timeout: secs(60),
                    category_timeout: secs(900),
                },
                walk: WalkBudget::new(20_000, 4),
            },
            ProfileKind::Development => CategoryProfile {
                exec: ExecutionProfile {
                    batch_size: 500,
                    max_workers: 16,
                    cpu_multiplier: 4,
                    item_timeout: secs(5),
                    batch_timeout: secs(60),
                    category_timeout: secs(600),
                },
                walk: WalkBudget::new(50_000, 6),
            },
            ProfileKind::Optimization => CategoryProfile {
                exec: ExecutionProfile {
                    batch_size: 200,
                    max_workers: 8,
                    cpu_multiplier: 2,
                    item_timeout: secs(10),
                    batch_timeout: secs(120),
                    category_timeout: secs(900),
                },
                walk: WalkBudget::new(30_000, 4),
            },
        }
    }
}

/// Execution and walk budgets for one category run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CategoryProfile {
    pub exec: ExecutionProfile,
    pub walk: WalkBudget,
}

/// Partial override of a profile preset, as written in the config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProfileOverride {
    pub batch_size: Option<usize>,
    pub max_workers: Option<usize>,
    pub cpu_multiplier: Option<usize>,
    pub item_timeout_secs: Option<u64>,
    pub batch_timeout_secs: Option<u64>,
    pub category_timeout_secs: Option<u64>,
    pub max_files: Option<usize>,
    pub max_depth: Option<usize>,
}

impl ProfileOverride {
    fn apply(&self, mut profile: CategoryProfile) -> CategoryProfile {
        let exec = &mut profile.exec;
        if let Some(v) = self.batch_size {
            exec.batch_size = v.max(1);
        }
        if let Some(v) = self.max_workers {
            exec.max_workers = v.max(1);
        }
        if let Some(v) = self.cpu_multiplier {
            exec.cpu_multiplier = v.max(1);
        }
        if let Some(v) = self.item_timeout_secs {
            exec.item_timeout = Duration::from_secs(v);
        }
        if let Some(v) = self.batch_timeout_secs {
            exec.batch_timeout = Duration::from_secs(v);
        }
        if let Some(v) = self.category_timeout_secs {
            exec.category_timeout = Duration::from_secs(v);
        }
        if let Some(v) = self.max_files {
            profile.walk.max_files = v;
        }
        if let Some(v) = self.max_depth {
            profile.walk.max_depth = v;
        }
        profile
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClassifierSettings {
    /// Files modified more recently than this are escalated.
    pub min_age_secs: u64,
    /// Files accessed more recently than this are escalated.
    pub recent_access_secs: u64,
    pub large_file_bytes: u64,
    /// Only files up to this size get their content sniffed.
    pub sniff_limit_bytes: u64,
    /// Above this many candidates a category falls back to the quick pre-filter.
    pub full_classification_limit: usize,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            min_age_secs: 30 * 60,
            recent_access_secs: 10 * 60,
            large_file_bytes: 100 * 1024 * 1024,
            sniff_limit_bytes: 1024 * 1024,
            full_classification_limit: 2_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BackupSettings {
    pub enabled: bool,
    /// Defaults to `<data_dir>/reclaim/backups`.
    pub dir: Option<PathBuf>,
    /// Larger files are deleted without a backup copy.
    pub max_file_bytes: u64,
}

impl Default for BackupSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            dir: None,
            max_file_bytes: 100 * 1024 * 1024,
        }
    }
}

impl BackupSettings {
    pub fn resolved_dir(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("reclaim")
                .join("backups")
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub dry_run: bool,
    pub verbose: bool,
    pub security_checks: bool,
    /// Files younger than this look actively used to the delete gate.
    pub min_file_age_secs: u64,
    pub retry_attempts: u32,
    pub retry_backoff_ms: u64,
    /// Minimum gap between progress updates.
    pub progress_interval_ms: u64,
    /// Categories run concurrently during a full run; 1 means sequential.
    pub max_parallel_categories: usize,
    pub optimization_mode: OptimizationMode,
    pub remove_empty_dirs: bool,
    pub report_path: Option<PathBuf>,
    pub classifier: ClassifierSettings,
    pub backup: BackupSettings,
    /// Keyed by "general", "system", "development" or "optimization".
    pub profiles: HashMap<String, ProfileOverride>,
    /// Extra templates per category name, appended to the built-in list.
    pub paths: HashMap<String, Vec<String>>,
    /// Drop the built-in templates and use only `paths`.
    pub replace_builtin_paths: bool,
    pub high_priority: Option<Vec<String>>,
    /// Roots searched for development projects; unset means the usual
    /// project folders under the home directory.
    pub dev_roots: Option<Vec<PathBuf>>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            dry_run: false,
            verbose: false,
            security_checks: true,
            min_file_age_secs: 3600,
            retry_attempts: 3,
            retry_backoff_ms: 200,
            progress_interval_ms: 200,
            max_parallel_categories: 1,
            optimization_mode: OptimizationMode::default(),
            remove_empty_dirs: true,
            report_path: None,
            classifier: ClassifierSettings::default(),
            backup: BackupSettings::default(),
            profiles: HashMap::new(),
            paths: HashMap::new(),
            replace_builtin_paths: false,
            high_priority: None,
            dev_roots: None,
        }
    }
}

impl Settings {
    /// Default config file location.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("reclaim").join("config.toml"))
    }

    /// Load settings. An explicit path must exist; the default path is optional.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => match Self::default_path() {
                Some(path) if path.is_file() => Self::from_file(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let settings: Settings = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        log::debug!("loaded settings from {}", path.display());
        Ok(settings)
    }

    pub fn profile(&self, kind: ProfileKind) -> CategoryProfile {
        let preset = kind.preset();
        match self.profiles.get(kind.key()) {
            Some(over) => over.apply(preset),
            None => preset,
        }
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    /// Build the path catalog: built-ins plus configured templates.
    pub fn catalog(&self) -> Result<PathCatalog, ConfigError> {
        let mut catalog = if self.replace_builtin_paths {
            PathCatalog::empty()
        } else {
            PathCatalog::builtin()
        };
        for (name, templates) in &self.paths {
            let category: Category = name.parse()?;
            if category == Category::All {
                return Err(ConfigError::UnknownCategory(name.clone()));
            }
            if self.replace_builtin_paths {
                catalog.set(category, templates.clone());
            } else {
                catalog.extend(category, templates.iter().cloned());
            }
        }
        if let Some(locations) = &self.high_priority {
            catalog.set_high_priority(locations.clone());
        }
        Ok(catalog)
    }
}
