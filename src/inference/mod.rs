pub mod loader;
pub mod model_config;
pub mod text_pipeline;
