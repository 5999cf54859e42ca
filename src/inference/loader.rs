use std::sync::Arc;

use anyhow::{Context, Result};
use hf_hub::api::sync::Api;
use hf_hub::{Repo, RepoType};

use crate::inference::model_config::{GenerationConfig, ModelSource};
use crate::inference::text_pipeline::{TextGeneration, TextGeneratorPipeline};

/// Startup hook that produces the pipeline a worker serves for its whole lifetime.
///
/// `load` blocks (downloads, file reads) and is called exactly once per worker.
pub trait PipelineLoader: Send + 'static {
    fn load(&self) -> Result<Arc<dyn TextGeneration>>;
}

/// Loads quantized weights and the tokenizer from the Hugging Face hub,
/// reusing the local hub cache when the files are already present.
#[derive(Debug, Clone)]
pub struct HubLoader {
    source: ModelSource,
    generation: GenerationConfig,
}

impl HubLoader {
    pub fn new(source: ModelSource, generation: GenerationConfig) -> Self {
        Self { source, generation }
    }
}

impl PipelineLoader for HubLoader {
    #[tracing::instrument(level = "info", skip(self), fields(repo = %self.source.repo_id))]
    fn load(&self) -> Result<Arc<dyn TextGeneration>> {
        let api = Api::new().context("Failed to create hub API")?;
        let repo = api.repo(Repo::with_revision(
            self.source.repo_id.clone(),
            RepoType::Model,
            self.source.revision.clone(),
        ));

        let pipeline =
            TextGeneratorPipeline::with_quantized_gguf(&repo, &self.source, self.generation)?;
        Ok(Arc::new(pipeline))
    }
}
