use candle_transformers::models::mixformer;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Sampling parameters applied to every completion.
#[derive(Deserialize, Debug, Copy, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct GenerationConfig {
    /// Upper bound on the token count of prompt and continuation together
    pub max_length: usize,
    pub temperature: f64,
    pub top_p: Option<f64>,
    /// Fixed seed for reproducible sampling, a random seed is drawn per call otherwise
    pub seed: Option<u64>,
    pub repeat_penalty: f32,
    pub repeat_context_size: usize,
    pub num_return_sequences: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_length: 50,
            temperature: 1.0,
            top_p: None,
            seed: None,
            repeat_penalty: 1.0,
            repeat_context_size: 64,
            num_return_sequences: 1,
        }
    }
}

/// Where the lifecycle hook fetches the model from.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ModelSource {
    /// The id of the model repository
    pub repo_id: String,

    /// The revision of the model repository
    pub revision: String,

    pub tokenizer_file: String,
    pub weights_file: String,
    pub architecture: Architecture,
}

#[derive(Deserialize, Serialize, ValueEnum, Debug, Copy, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Architecture {
    PuffinPhiV2,
    Phi2,
}

impl Architecture {
    pub fn mixformer_config(self) -> mixformer::Config {
        match self {
            Architecture::PuffinPhiV2 => mixformer::Config::puffin_phi_v2(),
            Architecture::Phi2 => mixformer::Config::v2(),
        }
    }
}
