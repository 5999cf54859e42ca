use std::time::Duration;

use anyhow::{Context, Result};
use clap_serde_derive::ClapSerde;
use serde::Deserialize;

use crate::inference::model_config::{Architecture, GenerationConfig, ModelSource};

#[derive(ClapSerde, Debug)]
pub struct Config {
    /// The address the listener binds to
    #[default("0.0.0.0".to_string())]
    #[arg(short, long, env)]
    pub(crate) address: String,

    /// The port the listener binds to
    #[default(8000)]
    #[arg(short, long, env)]
    pub(crate) port: u16,

    /// PEM certificate used to serve HTTPS, requires tls_key
    #[default(String::new())]
    #[arg(long, env)]
    pub(crate) tls_cert: String,

    /// PEM private key used to serve HTTPS, requires tls_cert
    #[default(String::new())]
    #[arg(long, env)]
    pub(crate) tls_key: String,

    /// OTLP collector endpoint, telemetry is only exported when set
    #[default(String::new())]
    #[arg(long, env)]
    pub(crate) otel_endpoint: String,

    /// Keep logging to the console even when exporting telemetry
    #[default(false)]
    #[arg(long, env)]
    pub(crate) console: bool,

    /// Write a chrome trace file of the process into the working directory
    #[default(false)]
    #[arg(long, env)]
    pub(crate) chrome_trace: bool,

    /// Seconds a single request may take before it is answered with 408
    #[default(600)]
    #[arg(long, env)]
    pub(crate) request_timeout: u64,

    /// Seconds without traffic after which the worker shuts down, 0 disables
    #[default(600)]
    #[arg(long, env)]
    pub(crate) idle_timeout: u64,

    /// Maximum number of completions running at the same time
    #[default(10)]
    #[arg(long, env)]
    pub(crate) max_concurrent_requests: usize,

    /// Hugging Face repository holding the weights and tokenizer
    #[default("lmz/candle-quantized-phi".to_string())]
    #[arg(long, env)]
    pub(crate) repo_id: String,

    /// Revision of the repository
    #[default("main".to_string())]
    #[arg(long, env)]
    pub(crate) repo_revision: String,

    /// Tokenizer file inside the repository
    #[default("tokenizer-puffin-phi-v2.json".to_string())]
    #[arg(long, env)]
    pub(crate) tokenizer_file: String,

    /// Quantized GGUF weights file inside the repository
    #[default("model-puffin-phi-v2-q80.gguf".to_string())]
    #[arg(long, env)]
    pub(crate) weights_file: String,

    /// Layout of the weights
    #[default(Architecture::PuffinPhiV2)]
    #[arg(long, env, value_enum)]
    pub(crate) architecture: Architecture,
}

/// Layout of the TOML configuration file. Generation parameters are only
/// configurable through the file.
#[derive(Deserialize)]
struct ConfigFile {
    #[serde(flatten)]
    worker: <Config as ClapSerde>::Opt,
    #[serde(default)]
    generation: GenerationConfig,
}

impl Config {
    pub fn from_toml(path: &str) -> Result<(<Config as ClapSerde>::Opt, GenerationConfig)> {
        let str = std::fs::read_to_string(path)?;
        Self::parse_toml(&str)
    }

    fn parse_toml(str: &str) -> Result<(<Config as ClapSerde>::Opt, GenerationConfig)> {
        let file: ConfigFile = toml::from_str(str).context("Invalid configuration file")?;
        Ok((file.worker, file.generation))
    }

    pub(crate) fn tls_paths(&self) -> Option<(&str, &str)> {
        if self.tls_cert.is_empty() || self.tls_key.is_empty() {
            return None;
        }
        Some((&self.tls_cert, &self.tls_key))
    }

    pub(crate) fn otel_endpoint(&self) -> Option<&str> {
        (!self.otel_endpoint.is_empty()).then_some(self.otel_endpoint.as_str())
    }

    pub(crate) fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    pub(crate) fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout)
    }

    pub(crate) fn model_source(&self) -> ModelSource {
        ModelSource {
            repo_id: self.repo_id.clone(),
            revision: self.repo_revision.clone(),
            tokenizer_file: self.tokenizer_file.clone(),
            weights_file: self.weights_file.clone(),
            architecture: self.architecture,
        }
    }
}
