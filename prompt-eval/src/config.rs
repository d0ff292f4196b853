use anyhow::Result;
use config::{Config as ConfigLoader, Environment, File};
use prompt_eval_core::{ExecutorOptions, GeneratorOptions};
use prompt_eval_workflow::{OrchestratorConfig, StageTimeouts};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Stage deadlines in seconds.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct TimeoutSettings {
    pub analyze: u64,
    pub generate: u64,
    pub execute: u64,
    pub error_analysis: u64,
    pub optimize: u64,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        let defaults = StageTimeouts::default();
        Self {
            analyze: defaults.analyze.as_secs(),
            generate: defaults.generate.as_secs(),
            execute: defaults.execute.as_secs(),
            error_analysis: defaults.error_analysis.as_secs(),
            optimize: defaults.optimize.as_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub log_level: String,
    pub log_format: LogFormat,
    /// In-memory repositories are used when unset.
    pub database_url: Option<String>,
    pub simulation_seed: Option<u64>,
    pub generator: GeneratorOptions,
    pub executor: ExecutorOptions,
    pub timeouts: TimeoutSettings,
}

impl Config {
    pub fn load() -> Result<Self> {
        let config = ConfigLoader::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(Environment::with_prefix("PROMPT_EVAL").separator("__"))
            .build()?;

        Ok(config.try_deserialize()?)
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            generator: self.generator,
            executor: self.executor,
            timeouts: StageTimeouts {
                analyze: Duration::from_secs(self.timeouts.analyze),
                generate: Duration::from_secs(self.timeouts.generate),
                execute: Duration::from_secs(self.timeouts.execute),
                error_analysis: Duration::from_secs(self.timeouts.error_analysis),
                optimize: Duration::from_secs(self.timeouts.optimize),
            },
            simulation_seed: self.simulation_seed,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "prompt_eval=info".to_string(),
            log_format: LogFormat::Pretty,
            database_url: None,
            simulation_seed: None,
            generator: GeneratorOptions::default(),
            executor: ExecutorOptions::default(),
            timeouts: TimeoutSettings::default(),
        }
    }
}
