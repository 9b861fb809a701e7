//! Configuration for the monitor service.
//!
//! This module provides a layered configuration system that supports:
//! - Default values
//! - TOML configuration file
//! - Environment variable overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `WB_` and use double underscores
//! to separate nested levels:
//! - `WB_DEBOUNCE__WORKING_TREE_MS=100` sets `debounce.working_tree_ms`
//! - `WB_WATCH__QUEUE_CAPACITY=1024` sets `watch.queue_capacity`
//! - `WB_LOGGING__DEFAULT=debug` sets `logging.default`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::event::Category;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Workspace root directory (where .watchbus is located)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_root: Option<PathBuf>,

    /// Global debug mode
    #[serde(default = "default_false")]
    pub debug: bool,

    /// Debounce window configuration
    #[serde(default)]
    pub debounce: DebounceConfig,

    /// Watch target configuration
    #[serde(default)]
    pub watch: WatchConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Quiet windows per notification category, in milliseconds.
///
/// These are tuning parameters, not part of the notification contract.
/// A burst keeps re-arming its window; the cap multiplier bounds the total
/// delay so a long burst still flushes.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DebounceConfig {
    /// Window for the repository categories (index, refs, log)
    #[serde(default = "default_repository_ms")]
    pub repository_ms: u64,

    /// Window for working tree changes
    #[serde(default = "default_working_tree_ms")]
    pub working_tree_ms: u64,

    /// Window for notes and docs changes
    #[serde(default = "default_notes_ms")]
    pub notes_ms: u64,

    /// Window for task definition changes
    #[serde(default = "default_tasks_ms")]
    pub tasks_ms: u64,

    /// Maximum total delay as a multiple of the window
    #[serde(default = "default_cap_multiplier")]
    pub cap_multiplier: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WatchConfig {
    /// Capacity of the raw event queue between the native callback and the
    /// worker; overflow triggers a degraded all-categories refresh
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Directories (relative to the project root) classified as notes
    #[serde(default = "default_notes_dirs")]
    pub notes_dirs: Vec<String>,

    /// Extra files (relative to the project root) classified as notes.
    /// None by default; deployments name their own.
    #[serde(default)]
    pub note_files: Vec<String>,

    /// Task definitions file, relative to the project root
    #[serde(default = "default_tasks_file")]
    pub tasks_file: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Default log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-module level overrides
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

// Default value functions
fn default_version() -> u32 {
    1
}
fn default_false() -> bool {
    false
}
fn default_repository_ms() -> u64 {
    200
}
fn default_working_tree_ms() -> u64 {
    150
}
fn default_notes_ms() -> u64 {
    300
}
fn default_tasks_ms() -> u64 {
    300
}
fn default_cap_multiplier() -> u32 {
    3
}
fn default_queue_capacity() -> usize {
    512
}
fn default_notes_dirs() -> Vec<String> {
    vec!["notes".to_string(), "docs".to_string()]
}
fn default_tasks_file() -> String {
    ".vscode/tasks.json".to_string()
}
fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            workspace_root: None,
            debug: false,
            debounce: DebounceConfig::default(),
            watch: WatchConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            repository_ms: default_repository_ms(),
            working_tree_ms: default_working_tree_ms(),
            notes_ms: default_notes_ms(),
            tasks_ms: default_tasks_ms(),
            cap_multiplier: default_cap_multiplier(),
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            notes_dirs: default_notes_dirs(),
            note_files: Vec::new(),
            tasks_file: default_tasks_file(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: HashMap::new(),
        }
    }
}

impl DebounceConfig {
    /// Quiet window for a category.
    pub fn window_for(&self, category: Category) -> Duration {
        let ms = match category {
            Category::RepositoryIndex | Category::RepositoryRefs | Category::RepositoryLog => {
                self.repository_ms
            }
            Category::WorkingTree => self.working_tree_ms,
            Category::Notes => self.notes_ms,
            Category::Tasks => self.tasks_ms,
        };
        Duration::from_millis(ms)
    }

    /// Maximum total delay for a category before a burst is force-flushed.
    pub fn cap_for(&self, category: Category) -> Duration {
        self.window_for(category) * self.cap_multiplier.max(1)
    }
}

impl Settings {
    /// Load configuration from all sources
    pub fn load() -> Result<Self, Box<figment::Error>> {
        // Try to find the workspace root by looking for .watchbus directory
        let config_path =
            Self::find_workspace_config().unwrap_or_else(|| PathBuf::from(".watchbus/settings.toml"));

        Figment::new()
            // Start with defaults
            .merge(Serialized::defaults(Settings::default()))
            // Layer in config file if it exists
            .merge(Toml::file(config_path))
            // Layer in environment variables with WB_ prefix
            // Use double underscore (__) to separate nested levels
            // Single underscore (_) remains as is within field names
            .merge(Env::prefixed("WB_").map(|key| {
                key.as_str()
                    .to_lowercase()
                    .replace("__", ".") // Double underscore becomes dot
                    .into()
            }))
            // Extract into Settings struct
            .extract()
            .map_err(Box::new)
            .map(|mut settings: Settings| {
                // If workspace_root is not set in config, detect it
                if settings.workspace_root.is_none() {
                    settings.workspace_root = Self::workspace_root();
                }
                settings
            })
    }

    /// Find the workspace config by looking for a .watchbus directory,
    /// searching from the current directory up to the filesystem root
    fn find_workspace_config() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        for ancestor in current.ancestors() {
            let config_dir = ancestor.join(".watchbus");
            if config_dir.exists() && config_dir.is_dir() {
                return Some(config_dir.join("settings.toml"));
            }
        }

        None
    }

    /// Check if configuration is properly initialized
    pub fn check_init() -> Result<(), String> {
        let config_path = if let Some(path) = Self::find_workspace_config() {
            path
        } else {
            // No workspace found, check current directory
            PathBuf::from(".watchbus/settings.toml")
        };

        if !config_path.exists() {
            return Err("No configuration file found".to_string());
        }

        // Try to parse the config file to check if it's valid
        match std::fs::read_to_string(&config_path) {
            Ok(content) => {
                if let Err(e) = toml::from_str::<Settings>(&content) {
                    return Err(format!(
                        "Configuration file is corrupted: {e}\nRun 'watchbus init --force' to regenerate."
                    ));
                }
            }
            Err(e) => {
                return Err(format!("Cannot read configuration file: {e}"));
            }
        }

        Ok(())
    }

    /// Get the workspace root directory (where .watchbus is located)
    pub fn workspace_root() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        for ancestor in current.ancestors() {
            let config_dir = ancestor.join(".watchbus");
            if config_dir.exists() && config_dir.is_dir() {
                return Some(ancestor.to_path_buf());
            }
        }

        None
    }

    /// Load configuration from a specific file
    pub fn load_from(path: impl AsRef<std::path::Path>) -> Result<Self, Box<figment::Error>> {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("WB_").map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
            .extract()
            .map_err(Box::new)
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<std::path::Path>) -> Result<(), Box<dyn std::error::Error>> {
        let parent = path.as_ref().parent().ok_or("Invalid path")?;
        std::fs::create_dir_all(parent)?;

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }

    /// Create a default settings file
    pub fn init_config_file(force: bool) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_path = PathBuf::from(".watchbus/settings.toml");

        if !force && config_path.exists() {
            return Err("Configuration file already exists. Use --force to overwrite".into());
        }

        let mut settings = Settings::default();

        // Set workspace root to current directory
        if let Ok(current_dir) = std::env::current_dir() {
            settings.workspace_root = Some(current_dir);
        }

        settings.save(&config_path)?;
        if force && config_path.exists() {
            println!("Overwrote configuration at: {}", config_path.display());
        } else {
            println!("Created default configuration at: {}", config_path.display());
        }

        Ok(config_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.version, 1);
        assert_eq!(settings.debounce.repository_ms, 200);
        assert_eq!(settings.debounce.working_tree_ms, 150);
        assert_eq!(settings.debounce.notes_ms, 300);
        assert_eq!(settings.debounce.tasks_ms, 300);
        assert_eq!(settings.watch.queue_capacity, 512);
        assert_eq!(settings.watch.notes_dirs, vec!["notes", "docs"]);
        assert!(settings.watch.note_files.is_empty());
        assert_eq!(settings.watch.tasks_file, ".vscode/tasks.json");
    }

    #[test]
    fn test_window_lookup() {
        let debounce = DebounceConfig::default();
        assert_eq!(
            debounce.window_for(Category::RepositoryIndex),
            Duration::from_millis(200)
        );
        assert_eq!(
            debounce.window_for(Category::RepositoryRefs),
            Duration::from_millis(200)
        );
        assert_eq!(
            debounce.window_for(Category::WorkingTree),
            Duration::from_millis(150)
        );
        assert_eq!(
            debounce.cap_for(Category::WorkingTree),
            Duration::from_millis(450)
        );
    }

    #[test]
    fn test_load_from_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");

        let toml_content = r#"
version = 2

[debounce]
working_tree_ms = 75
cap_multiplier = 2

[watch]
queue_capacity = 64
notes_dirs = ["wiki"]
"#;

        fs::write(&config_path, toml_content).unwrap();

        let settings = Settings::load_from(&config_path).unwrap();
        assert_eq!(settings.version, 2);
        assert_eq!(settings.debounce.working_tree_ms, 75);
        assert_eq!(settings.debounce.cap_multiplier, 2);
        assert_eq!(settings.watch.queue_capacity, 64);
        // Custom notes dirs replace the defaults
        assert_eq!(settings.watch.notes_dirs, vec!["wiki"]);
        // Unspecified values keep their defaults
        assert_eq!(settings.debounce.repository_ms, 200);
        assert_eq!(settings.watch.tasks_file, ".vscode/tasks.json");
    }

    #[test]
    fn test_save_settings() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");

        let mut settings = Settings::default();
        settings.debounce.notes_ms = 500;
        settings.watch.note_files = vec!["HANDBOOK.md".to_string()];

        settings.save(&config_path).unwrap();

        let loaded = Settings::load_from(&config_path).unwrap();
        assert_eq!(loaded.debounce.notes_ms, 500);
        assert_eq!(loaded.watch.note_files, vec!["HANDBOOK.md"]);
    }

    #[test]
    fn test_partial_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");

        // Only specify a few settings
        let toml_content = r#"
[logging]
default = "info"
"#;

        fs::write(&config_path, toml_content).unwrap();

        let settings = Settings::load_from(&config_path).unwrap();

        // Modified value
        assert_eq!(settings.logging.default, "info");

        // Default values should still be present
        assert_eq!(settings.version, 1);
        assert_eq!(settings.debounce.repository_ms, 200);
        assert!(!settings.watch.notes_dirs.is_empty());
    }

    #[test]
    fn test_layered_config() {
        let temp_dir = TempDir::new().unwrap();
        let original_dir = std::env::current_dir().unwrap();
        std::env::set_current_dir(&temp_dir).unwrap();

        // Create config directory
        let config_dir = temp_dir.path().join(".watchbus");
        fs::create_dir_all(&config_dir).unwrap();

        let toml_content = r#"
[debounce]
tasks_ms = 250

[watch]
queue_capacity = 128
"#;
        fs::write(config_dir.join("settings.toml"), toml_content).unwrap();

        // Environment variables should override the config file. These two
        // fields are asserted by no other test in this module, so the
        // process-wide vars cannot poison a concurrently running sibling.
        unsafe {
            std::env::set_var("WB_DEBOUNCE__TASKS_MS", "100");
            std::env::set_var("WB_DEBUG", "true");
        }

        let settings = Settings::load().unwrap();

        // Environment variable should override config file
        assert_eq!(settings.debounce.tasks_ms, 100);
        // Config file value should be used when no env var
        assert_eq!(settings.watch.queue_capacity, 128);
        // Env var adds new value not in config
        assert!(settings.debug);

        // Clean up
        unsafe {
            std::env::remove_var("WB_DEBOUNCE__TASKS_MS");
            std::env::remove_var("WB_DEBUG");
        }
        std::env::set_current_dir(original_dir).unwrap();
    }
}
