use std::time::Duration;

use anyhow::{Context, Result};
use opentelemetry::global;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::KeyValue;
use opentelemetry_otlp::{TonicExporterBuilder, WithExportConfig};
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::Config;
use opentelemetry_sdk::{runtime, Resource};
use opentelemetry_semantic_conventions::resource::{SERVICE_NAME, SERVICE_VERSION};
use tracing_chrome::{ChromeLayerBuilder, FlushGuard};
use tracing_opentelemetry::{MetricsLayer, OpenTelemetryLayer};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Registry;

/// Installs the global subscriber. OTLP export is only wired up when an
/// endpoint is given; the returned guard flushes the chrome trace on drop.
pub(crate) fn init_telemetry(
    endpoint: Option<&str>,
    console: bool,
    chrome_trace: bool,
) -> Result<Option<FlushGuard>> {
    let (otel_traces, otel_metrics) = match endpoint {
        Some(endpoint) => {
            let (tracer, meter) = build_otlp_pipelines(endpoint)?;
            global::set_text_map_propagator(TraceContextPropagator::new());
            (
                Some(OpenTelemetryLayer::new(tracer)),
                Some(MetricsLayer::new(meter)),
            )
        }
        None => (None, None),
    };

    let (chrome_layer, chrome_guard) = if chrome_trace {
        let (layer, guard) = ChromeLayerBuilder::new().include_args(true).build();
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    let console_layer = (endpoint.is_none() || console).then(tracing_subscriber::fmt::layer);

    Registry::default()
        .with(EnvFilter::try_from_default_env().unwrap_or(EnvFilter::new("INFO")))
        .with(otel_traces)
        .with(otel_metrics)
        .with(chrome_layer)
        .with(console_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(chrome_guard)
}

fn build_otlp_pipelines(
    endpoint: &str,
) -> Result<(
    opentelemetry_sdk::trace::Tracer,
    opentelemetry_sdk::metrics::SdkMeterProvider,
)> {
    let service_resource = Resource::new(vec![
        KeyValue::new(SERVICE_NAME, env!("CARGO_PKG_NAME")),
        KeyValue::new(SERVICE_VERSION, env!("CARGO_PKG_VERSION")),
    ]);

    let tracer_provider = opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(build_tonic_exporter(endpoint))
        .with_trace_config(Config::default().with_resource(service_resource.clone()))
        .install_batch(runtime::Tokio)
        .context("Failed to install tracer")?;
    // Registered globally so pending spans are flushed by shutdown_tracer_provider
    global::set_tracer_provider(tracer_provider.clone());
    let tracer = tracer_provider.tracer(env!("CARGO_PKG_NAME"));

    let meter = opentelemetry_otlp::new_pipeline()
        .metrics(runtime::Tokio)
        .with_exporter(build_tonic_exporter(endpoint))
        .with_resource(service_resource)
        .build()
        .context("Failed to install meter")?;

    Ok((tracer, meter))
}

fn build_tonic_exporter(endpoint: &str) -> TonicExporterBuilder {
    opentelemetry_otlp::new_exporter()
        .tonic()
        .with_timeout(Duration::from_secs(15))
        .with_endpoint(endpoint)
}
