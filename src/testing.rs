//! Stand-in pipelines and loaders for exercising the worker without model weights.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use anyhow::{bail, Result};

use crate::inference::loader::PipelineLoader;
use crate::inference::text_pipeline::{GeneratedText, TextGeneration};

/// Appends a fixed continuation to the prompt and counts calls.
#[derive(Default)]
pub(crate) struct EchoPipeline {
    pub(crate) calls: AtomicUsize,
}

impl EchoPipeline {
    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TextGeneration for EchoPipeline {
    fn generate(&self, prompt: &str) -> Result<Vec<GeneratedText>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![
            GeneratedText {
                generated_text: format!("{prompt} went outside, call {call}"),
            },
            GeneratedText {
                generated_text: format!("{prompt} stayed in"),
            },
        ])
    }
}

pub(crate) struct FailingPipeline;

impl TextGeneration for FailingPipeline {
    fn generate(&self, _prompt: &str) -> Result<Vec<GeneratedText>> {
        bail!("out of memory")
    }
}

pub(crate) struct EmptyPipeline;

impl TextGeneration for EmptyPipeline {
    fn generate(&self, _prompt: &str) -> Result<Vec<GeneratedText>> {
        Ok(vec![])
    }
}

/// Blocks every call until `open` is called, recording how many ran at once.
#[derive(Default)]
pub(crate) struct GatedPipeline {
    gate: Mutex<bool>,
    opened: Condvar,
    running: AtomicUsize,
    max_running: AtomicUsize,
}

impl GatedPipeline {
    pub(crate) fn open(&self) {
        *self.gate.lock().unwrap() = true;
        self.opened.notify_all();
    }

    pub(crate) fn running(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    pub(crate) fn max_running(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }

    pub(crate) async fn wait_for_running(&self, count: usize) {
        while self.running() < count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

impl TextGeneration for GatedPipeline {
    fn generate(&self, prompt: &str) -> Result<Vec<GeneratedText>> {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(now, Ordering::SeqCst);

        let mut open = self.gate.lock().unwrap();
        while !*open {
            open = self.opened.wait(open).unwrap();
        }
        drop(open);

        self.running.fetch_sub(1, Ordering::SeqCst);
        Ok(vec![GeneratedText {
            generated_text: prompt.to_string(),
        }])
    }
}

/// Hands out a prepared pipeline and counts how often the hook ran.
pub(crate) struct CountingLoader {
    pub(crate) loads: Arc<AtomicUsize>,
    pipeline: Arc<dyn TextGeneration>,
}

impl CountingLoader {
    pub(crate) fn new(pipeline: Arc<dyn TextGeneration>) -> Self {
        Self {
            loads: Arc::new(AtomicUsize::new(0)),
            pipeline,
        }
    }
}

impl PipelineLoader for CountingLoader {
    fn load(&self) -> Result<Arc<dyn TextGeneration>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(self.pipeline.clone())
    }
}

pub(crate) struct FailingLoader;

impl PipelineLoader for FailingLoader {
    fn load(&self) -> Result<Arc<dyn TextGeneration>> {
        bail!("weights unavailable")
    }
}
