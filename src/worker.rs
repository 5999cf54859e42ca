use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::Semaphore;
use tracing::info;

use crate::idle::IdleTracker;
use crate::inference::loader::PipelineLoader;
use crate::inference::text_pipeline::{GeneratedText, TextGeneration};

#[derive(Debug, Clone, Copy)]
pub(crate) struct WorkerLimits {
    pub(crate) max_concurrent_requests: usize,
    pub(crate) idle_timeout: Duration,
}

/// Process-wide state shared by every request a worker serves.
#[derive(Clone)]
pub(crate) struct Worker {
    pub(crate) model_name: String,
    pub(crate) idle: IdleTracker,
    pipeline: Arc<dyn TextGeneration>,
    admission: Arc<Semaphore>,
}

impl Worker {
    /// Runs the lifecycle hook and returns a worker ready to accept traffic.
    pub(crate) async fn start<L: PipelineLoader>(
        loader: L,
        model_name: String,
        limits: WorkerLimits,
    ) -> Result<Self> {
        let started = std::time::Instant::now();
        let pipeline = tokio::task::spawn_blocking(move || loader.load())
            .await
            .context("Lifecycle hook panicked")?
            .context("Failed to load the text generation pipeline")?;
        info!(
            "Loaded {} in {:.2}s",
            model_name,
            started.elapsed().as_secs_f64()
        );

        Ok(Self::with_pipeline(pipeline, model_name, limits))
    }

    pub(crate) fn with_pipeline(
        pipeline: Arc<dyn TextGeneration>,
        model_name: String,
        limits: WorkerLimits,
    ) -> Self {
        Self {
            model_name,
            idle: IdleTracker::new(limits.idle_timeout),
            pipeline,
            admission: Arc::new(Semaphore::new(limits.max_concurrent_requests.max(1))),
        }
    }

    /// Runs the pipeline on a blocking thread once an admission permit is free.
    ///
    /// The permit and an activity guard move into the blocking task, so both
    /// stay held until generation returns even if the caller is cancelled.
    pub(crate) async fn predict(&self, prompt: String) -> Result<Vec<GeneratedText>> {
        let permit = Arc::clone(&self.admission)
            .acquire_owned()
            .await
            .context("Admission semaphore closed")?;
        let activity = self.idle.begin();
        let pipeline = Arc::clone(&self.pipeline);
        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            let _activity = activity;
            pipeline.generate(&prompt)
        })
        .await
        .context("Inference task panicked")?
    }

    #[cfg(test)]
    pub(crate) fn available_permits(&self) -> usize {
        self.admission.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::testing::{CountingLoader, EchoPipeline, FailingLoader, GatedPipeline};

    fn limits(max_concurrent_requests: usize) -> WorkerLimits {
        WorkerLimits {
            max_concurrent_requests,
            idle_timeout: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn lifecycle_hook_runs_once_for_many_requests() {
        let loader = CountingLoader::new(Arc::new(EchoPipeline::default()));
        let loads = loader.loads.clone();
        let worker = Worker::start(loader, "echo".into(), limits(10))
            .await
            .unwrap();

        for index in 0..5 {
            let out = worker.predict(format!("prompt {index}")).await.unwrap();
            assert!(out[0].generated_text.starts_with(&format!("prompt {index}")));
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_hook_prevents_start() {
        let err = Worker::start(FailingLoader, "broken".into(), limits(10))
            .await
            .err()
            .unwrap();

        assert!(format!("{err:#}").contains("weights unavailable"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn admission_limits_concurrent_inference() {
        let pipeline = Arc::new(GatedPipeline::default());
        let worker = Worker::with_pipeline(pipeline.clone(), "gated".into(), limits(2));

        let handles: Vec<_> = (0..3)
            .map(|index| {
                let worker = worker.clone();
                tokio::spawn(async move { worker.predict(format!("p{index}")).await })
            })
            .collect();

        pipeline.wait_for_running(2).await;
        assert_eq!(worker.available_permits(), 0);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(pipeline.running(), 2);

        pipeline.open();
        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }
        assert_eq!(pipeline.max_running(), 2);
        assert_eq!(worker.available_permits(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn cancelled_prediction_keeps_its_permit_until_inference_ends() {
        let pipeline = Arc::new(GatedPipeline::default());
        let worker = Worker::with_pipeline(pipeline.clone(), "gated".into(), limits(1));

        let abandoned =
            tokio::time::timeout(Duration::from_millis(100), worker.predict("first".into())).await;
        assert!(abandoned.is_err());
        pipeline.wait_for_running(1).await;
        assert_eq!(worker.available_permits(), 0);
        assert_eq!(worker.idle.in_flight(), 1);

        let second = tokio::spawn({
            let worker = worker.clone();
            async move { worker.predict("second".into()).await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(pipeline.running(), 1);

        pipeline.open();
        assert!(second.await.unwrap().is_ok());
        assert_eq!(pipeline.max_running(), 1);
        while worker.available_permits() < 1 || worker.idle.in_flight() > 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}
