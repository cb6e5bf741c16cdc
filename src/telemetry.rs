//! Tracing and OpenTelemetry wiring.
//!
//! Logging always goes through `tracing`; when any `OTEL_EXPORTER_OTLP_*` variable is
//! set, spans and metrics are additionally exported over OTLP. An exporter that cannot
//! be built does not prevent startup: the service falls back to plain log output.

use opentelemetry::{KeyValue, global, trace::TracerProvider as _};
use opentelemetry_otlp::ExporterBuildError;
use opentelemetry_sdk::{
    Resource,
    metrics::{MeterProviderBuilder, PeriodicReader, SdkMeterProvider},
    trace::{RandomIdGenerator, Sampler, SdkTracerProvider},
};
use opentelemetry_semantic_conventions::{
    SCHEMA_URL,
    attribute::{DEPLOYMENT_ENVIRONMENT_NAME, SERVICE_VERSION},
};
use std::env;
use std::time::Duration;
use tracing_opentelemetry::{MetricsLayer, OpenTelemetryLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const METRIC_EXPORT_INTERVAL: Duration = Duration::from_secs(30);

/// Transport used for OTLP export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TelemetryProtocol {
    HttpProtobuf,
    Grpc,
}

impl TelemetryProtocol {
    /// `Some` when OTLP export is configured through the standard OTEL variables.
    fn from_env() -> Option<Self> {
        let enabled = [
            "OTEL_EXPORTER_OTLP_ENDPOINT",
            "OTEL_EXPORTER_OTLP_HEADERS",
            "OTEL_EXPORTER_OTLP_PROTOCOL",
        ]
        .iter()
        .any(|name| env::var(name).is_ok());
        if !enabled {
            return None;
        }
        match env::var("OTEL_EXPORTER_OTLP_PROTOCOL").as_deref() {
            Ok("grpc") => Some(TelemetryProtocol::Grpc),
            _ => Some(TelemetryProtocol::HttpProtobuf),
        }
    }
}

/// OpenTelemetry `Resource` describing this service. The service name comes from
/// `OTEL_SERVICE_NAME` when set, otherwise the crate name.
fn resource() -> Resource {
    let service_name =
        env::var("OTEL_SERVICE_NAME").unwrap_or_else(|_| env!("CARGO_PKG_NAME").to_string());
    let deployment_env = env::var("DEPLOYMENT_ENV").unwrap_or_else(|_| "develop".to_string());
    Resource::builder()
        .with_service_name(service_name)
        .with_schema_url(
            [
                KeyValue::new(SERVICE_VERSION, env!("CARGO_PKG_VERSION")),
                KeyValue::new(DEPLOYMENT_ENVIRONMENT_NAME, deployment_env),
            ],
            SCHEMA_URL,
        )
        .build()
}

fn init_meter_provider(
    telemetry_protocol: TelemetryProtocol,
) -> Result<SdkMeterProvider, ExporterBuildError> {
    let exporter = opentelemetry_otlp::MetricExporter::builder();
    let exporter = match telemetry_protocol {
        TelemetryProtocol::HttpProtobuf => exporter.with_http().build()?,
        TelemetryProtocol::Grpc => exporter.with_tonic().build()?,
    };
    let reader = PeriodicReader::builder(exporter)
        .with_interval(METRIC_EXPORT_INTERVAL)
        .build();
    let meter_provider = MeterProviderBuilder::default()
        .with_resource(resource())
        .with_reader(reader)
        .build();
    global::set_meter_provider(meter_provider.clone());
    Ok(meter_provider)
}

fn init_tracer_provider(
    telemetry_protocol: TelemetryProtocol,
) -> Result<SdkTracerProvider, ExporterBuildError> {
    let exporter = opentelemetry_otlp::SpanExporter::builder();
    let exporter = match telemetry_protocol {
        TelemetryProtocol::HttpProtobuf => exporter.with_http().build()?,
        TelemetryProtocol::Grpc => exporter.with_tonic().build()?,
    };
    Ok(SdkTracerProvider::builder()
        .with_sampler(Sampler::ParentBased(Box::new(Sampler::TraceIdRatioBased(
            1.0,
        ))))
        .with_id_generator(RandomIdGenerator::default())
        .with_resource(resource())
        .with_batch_exporter(exporter)
        .build())
}

fn init_fmt_subscriber() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Holds the installed providers so they can be flushed on shutdown.
pub struct Telemetry {
    tracer_provider: Option<SdkTracerProvider>,
    meter_provider: Option<SdkMeterProvider>,
}

impl Telemetry {
    pub fn new() -> Self {
        let Some(telemetry_protocol) = TelemetryProtocol::from_env() else {
            init_fmt_subscriber();
            tracing::info!("OpenTelemetry is not enabled");
            return Self {
                tracer_provider: None,
                meter_provider: None,
            };
        };
        let providers = init_tracer_provider(telemetry_protocol).and_then(|tracer| {
            init_meter_provider(telemetry_protocol).map(|meter| (tracer, meter))
        });
        match providers {
            Ok((tracer_provider, meter_provider)) => {
                let tracer = tracer_provider.tracer("tracing-otel-subscriber");
                // The INFO level filter keeps the exporter's own network stack from
                // reentering the OpenTelemetry layer with its spans while exporting.
                tracing_subscriber::registry()
                    .with(tracing_subscriber::filter::LevelFilter::INFO)
                    .with(tracing_subscriber::fmt::layer())
                    .with(MetricsLayer::new(meter_provider.clone()))
                    .with(OpenTelemetryLayer::new(tracer))
                    .init();
                tracing::info!(
                    "OpenTelemetry tracing and metrics exporter is enabled via {:?}",
                    telemetry_protocol
                );
                Self {
                    tracer_provider: Some(tracer_provider),
                    meter_provider: Some(meter_provider),
                }
            }
            Err(error) => {
                init_fmt_subscriber();
                tracing::error!("Failed to build OTLP exporter, OpenTelemetry disabled: {error}");
                Self {
                    tracer_provider: None,
                    meter_provider: None,
                }
            }
        }
    }
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Telemetry {
    fn drop(&mut self) {
        if let Some(tracer_provider) = self.tracer_provider.as_ref() {
            if let Err(err) = tracer_provider.shutdown() {
                eprintln!("{err:?}");
            }
        }
        if let Some(meter_provider) = self.meter_provider.as_ref() {
            if let Err(err) = meter_provider.shutdown() {
                eprintln!("{err:?}");
            }
        }
    }
}
