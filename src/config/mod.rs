use crate::console::VerbosityLevel;
use crate::pruning::PruneStrategy;
use crate::tokens::TokenizerConfig;
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, path::PathBuf};

mod error;

pub use error::{ConfigError, ConfigResult};

/// Knobs for the file relevance selector pipeline.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SelectorConfig {
    /// Skip index building and both filter levels entirely.
    #[serde(default)]
    pub skip_indexing: bool,
    /// 0 disables query filtering, 1 enables keyword ranking, 2 adds
    /// related-file expansion on top.
    #[serde(default = "default_filter_level")]
    pub filter_level: u8,
    #[serde(default)]
    pub skip_verification: bool,
    /// Verification pass mark on the oracle's 0-10 scale.
    #[serde(default = "default_pass_threshold")]
    pub pass_threshold: i32,
    /// Hard cap on surviving files; `None` means uncapped.
    #[serde(default)]
    pub max_files: Option<usize>,
    /// Floor for the verification pool width.
    #[serde(default = "default_min_verify_workers")]
    pub min_verify_workers: usize,
    /// Files per oracle batch when rendering index digests.
    #[serde(default = "default_filter_batch_size")]
    pub filter_batch_size: usize,
    /// Per-file token ceiling before the content pruner steps in.
    #[serde(default = "default_file_token_budget")]
    pub file_token_budget: usize,
}

fn default_filter_level() -> u8 {
    1
}

fn default_pass_threshold() -> i32 {
    6
}

fn default_min_verify_workers() -> usize {
    1
}

fn default_filter_batch_size() -> usize {
    10
}

fn default_file_token_budget() -> usize {
    20_000
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            skip_indexing: false,
            filter_level: default_filter_level(),
            skip_verification: false,
            pass_threshold: default_pass_threshold(),
            max_files: None,
            min_verify_workers: default_min_verify_workers(),
            filter_batch_size: default_filter_batch_size(),
            file_token_budget: default_file_token_budget(),
        }
    }
}

/// Knobs for the conversation pruner.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PrunerConfig {
    /// Token budget the pruned conversation must fit.
    #[serde(default = "default_conversation_budget")]
    pub budget: usize,
    #[serde(default)]
    pub strategy: PruneStrategy,
    /// Units scoring below this are dropped under the score strategy.
    #[serde(default = "default_score_threshold")]
    pub score_threshold: i32,
    /// Ceiling for oracle excerpts under the extract strategy.
    #[serde(default = "default_excerpt_token_budget")]
    pub excerpt_token_budget: usize,
}

fn default_conversation_budget() -> usize {
    // 60% of a 128k window.
    76_800
}

fn default_score_threshold() -> i32 {
    6
}

fn default_excerpt_token_budget() -> usize {
    1_024
}

impl Default for PrunerConfig {
    fn default() -> Self {
        Self {
            budget: default_conversation_budget(),
            strategy: PruneStrategy::default(),
            score_threshold: default_score_threshold(),
            excerpt_token_budget: default_excerpt_token_budget(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct ContextConfig {
    #[serde(default)]
    pub tokenizer: TokenizerConfig,
    #[serde(default)]
    pub selection: SelectorConfig,
    #[serde(default)]
    pub pruning: PrunerConfig,
    #[serde(default)]
    pub verbosity: Option<String>,
}

impl ContextConfig {
    pub fn load() -> ConfigResult<Self> {
        let config_path = Self::config_path()?;
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn load_from(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> ConfigResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializationError(e.to_string()))?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn config_path() -> ConfigResult<PathBuf> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDirectory)?;
        Ok(config_dir.join("gharbal").join("config.toml"))
    }

    /// Reject configurations no stage can honor.
    pub fn validate(&self) -> ConfigResult<()> {
        if !(0..=10).contains(&self.selection.pass_threshold) {
            return Err(ConfigError::InvalidValue {
                field: "selection.pass_threshold".to_string(),
                value: self.selection.pass_threshold.to_string(),
            });
        }
        if !(0..=10).contains(&self.pruning.score_threshold) {
            return Err(ConfigError::InvalidValue {
                field: "pruning.score_threshold".to_string(),
                value: self.pruning.score_threshold.to_string(),
            });
        }
        if self.selection.filter_level > 2 {
            return Err(ConfigError::InvalidValue {
                field: "selection.filter_level".to_string(),
                value: self.selection.filter_level.to_string(),
            });
        }
        if self.selection.max_files == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "selection.max_files".to_string(),
                value: "0".to_string(),
            });
        }
        if self.selection.filter_batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "selection.filter_batch_size".to_string(),
                value: "0".to_string(),
            });
        }
        if self.pruning.budget == 0 {
            return Err(ConfigError::InvalidValue {
                field: "pruning.budget".to_string(),
                value: "0".to_string(),
            });
        }
        if self.pruning.excerpt_token_budget == 0 {
            return Err(ConfigError::InvalidValue {
                field: "pruning.excerpt_token_budget".to_string(),
                value: "0".to_string(),
            });
        }
        if self.selection.file_token_budget == 0 {
            return Err(ConfigError::InvalidValue {
                field: "selection.file_token_budget".to_string(),
                value: "0".to_string(),
            });
        }
        Ok(())
    }

    /// Get the configured verbosity level, falling back to Normal if not set
    pub fn get_verbosity(&self) -> VerbosityLevel {
        match self.verbosity.as_deref() {
            Some("quiet") => VerbosityLevel::Quiet,
            Some("verbose") => VerbosityLevel::Verbose,
            Some("debug") => VerbosityLevel::Debug,
            _ => VerbosityLevel::Normal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ContextConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.selection.pass_threshold, 6);
        assert_eq!(config.selection.filter_level, 1);
        assert_eq!(config.pruning.budget, 76_800);
        assert_eq!(config.pruning.strategy, PruneStrategy::Delete);
    }

    #[test]
    fn test_validate_rejects_out_of_range_threshold() {
        let mut config = ContextConfig::default();
        config.selection.pass_threshold = 11;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_zero_cap() {
        let mut config = ContextConfig::default();
        config.selection.max_files = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");

        let mut config = ContextConfig::default();
        config.selection.max_files = Some(7);
        config.pruning.strategy = PruneStrategy::Extract;
        config.verbosity = Some("verbose".to_string());
        config.save_to(&path).expect("save");

        let loaded = ContextConfig::load_from(&path).expect("load");
        assert_eq!(loaded.selection.max_files, Some(7));
        assert_eq!(loaded.pruning.strategy, PruneStrategy::Extract);
        assert_eq!(loaded.get_verbosity(), VerbosityLevel::Verbose);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "[selection]\nmax_files = 3\n").expect("write");

        let loaded = ContextConfig::load_from(&path).expect("load");
        assert_eq!(loaded.selection.max_files, Some(3));
        assert_eq!(loaded.selection.pass_threshold, 6);
        assert_eq!(loaded.pruning.budget, 76_800);
    }
}
