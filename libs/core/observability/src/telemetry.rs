//! OpenTelemetry pipeline construction.
//!
//! Providers are returned as explicit handles instead of being installed as
//! process-wide globals; callers hand them to whatever needs them.

use crate::config::{Protocol, ResolvedExporter, Signal, TelemetryConfig};
use crate::error::TelemetryError;
use crate::shutdown::{BoxError, ShutdownChain};
use core_config::tracing::BoxedLayer;
use opentelemetry::InstrumentationScope;
use opentelemetry::logs::LoggerProvider as _;
use opentelemetry::metrics::{Meter, MeterProvider as _};
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge;
use opentelemetry_otlp::{WithExportConfig, WithTonicConfig};
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::logs::{BatchLogProcessor, LogExporter, SdkLogger, SdkLoggerProvider};
use opentelemetry_sdk::metrics::exporter::PushMetricExporter;
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use opentelemetry_sdk::trace::{
    BatchConfigBuilder, BatchSpanProcessor, SdkTracer, SdkTracerProvider, SpanExporter,
};
use std::borrow::Cow;
use std::time::Duration;
use tonic::transport::ClientTlsConfig;
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, Layer};

/// Targets whose own events must not be fed back into the exporters.
const EXPORT_FILTER: &str = "info,h2=off,hyper=off,hyper_util=off,tonic=off,tower=off,reqwest=off,\
opentelemetry=off,opentelemetry_sdk=off,opentelemetry_otlp=off";

/// Handles to the providers of every enabled signal.
#[derive(Clone, Debug, Default)]
pub struct Telemetry {
    tracer_name: String,
    logger_name: String,
    tracer_provider: Option<SdkTracerProvider>,
    meter_provider: Option<SdkMeterProvider>,
    logger_provider: Option<SdkLoggerProvider>,
}

impl Telemetry {
    /// Build a pipeline for every enabled signal and register each provider's
    /// shutdown on `chain`.
    ///
    /// Any failure shuts down what this call already built and leaves `chain`
    /// untouched.
    pub fn init(
        config: &TelemetryConfig,
        service_name: &str,
        chain: &mut ShutdownChain,
    ) -> Result<Self, TelemetryError> {
        let mut telemetry = Telemetry {
            tracer_name: config.tracer_name(service_name).to_string(),
            logger_name: config.logger_name(service_name).to_string(),
            ..Default::default()
        };

        if !config.base.enabled {
            debug!("Telemetry disabled");
            return Ok(telemetry);
        }

        let resource = Resource::builder()
            .with_service_name(service_name.to_string())
            .build();
        let mut local = ShutdownChain::new();

        for signal in [Signal::Metrics, Signal::Tracing, Signal::Logging] {
            if !config.is_enabled(signal) {
                continue;
            }

            let resolved = config.resolve(signal);
            if let Err(source) = telemetry.install(&resolved, resource.clone(), &mut local) {
                let unwound = local.shutdown().err();
                return Err(TelemetryError::Exporter {
                    signal,
                    protocol: resolved.protocol,
                    address: resolved.address,
                    source,
                    unwound,
                });
            }

            info!(
                signal = %signal,
                protocol = %resolved.protocol,
                address = %resolved.address,
                interval = ?resolved.interval,
                "Telemetry exporter initialized"
            );
        }

        chain.append(&mut local);
        Ok(telemetry)
    }

    fn install(
        &mut self,
        resolved: &ResolvedExporter,
        resource: Resource,
        chain: &mut ShutdownChain,
    ) -> Result<(), BoxError> {
        match resolved.signal {
            Signal::Tracing => {
                let provider = build_tracer_provider(resolved, resource)?;
                let handle = provider.clone();
                chain.push("tracer_provider", move || handle.shutdown().map_err(Into::into));
                self.tracer_provider = Some(provider);
            }
            Signal::Metrics => {
                let provider = build_meter_provider(resolved, resource)?;
                let handle = provider.clone();
                chain.push("meter_provider", move || handle.shutdown().map_err(Into::into));
                self.meter_provider = Some(provider);
            }
            Signal::Logging => {
                let provider = build_logger_provider(resolved, resource)?;
                let handle = provider.clone();
                chain.push("logger_provider", move || handle.shutdown().map_err(Into::into));
                self.logger_provider = Some(provider);
            }
        }
        Ok(())
    }

    pub fn is_enabled(&self, signal: Signal) -> bool {
        match signal {
            Signal::Tracing => self.tracer_provider.is_some(),
            Signal::Metrics => self.meter_provider.is_some(),
            Signal::Logging => self.logger_provider.is_some(),
        }
    }

    pub fn tracer_provider(&self) -> Option<&SdkTracerProvider> {
        self.tracer_provider.as_ref()
    }

    pub fn meter_provider(&self) -> Option<&SdkMeterProvider> {
        self.meter_provider.as_ref()
    }

    pub fn logger_provider(&self) -> Option<&SdkLoggerProvider> {
        self.logger_provider.as_ref()
    }

    /// Tracer with the given instrumentation scope.
    pub fn tracer(&self, name: impl Into<Cow<'static, str>>) -> Option<SdkTracer> {
        self.tracer_provider.as_ref().map(|p| p.tracer(name))
    }

    /// Tracer scoped by the configured tracer name.
    pub fn default_tracer(&self) -> Option<SdkTracer> {
        self.tracer(self.tracer_name.clone())
    }

    pub fn meter(&self, name: impl Into<Cow<'static, str>>) -> Option<Meter> {
        self.meter_provider
            .as_ref()
            .map(|p| p.meter_with_scope(InstrumentationScope::builder(name).build()))
    }

    /// Logger scoped by the configured logger name.
    pub fn logger(&self) -> Option<SdkLogger> {
        self.logger_provider
            .as_ref()
            .map(|p| p.logger(self.logger_name.clone()))
    }

    /// Subscriber layer bridging `tracing` spans and events into the enabled
    /// pipelines, or `None` when neither tracing nor logging is exported.
    pub fn tracing_layer(&self) -> Option<BoxedLayer> {
        let mut layers: Vec<BoxedLayer> = Vec::new();

        if let Some(tracer) = self.default_tracer() {
            layers.push(
                tracing_opentelemetry::layer()
                    .with_tracer(tracer)
                    .with_filter(EnvFilter::new(EXPORT_FILTER))
                    .boxed(),
            );
        }

        if let Some(provider) = &self.logger_provider {
            layers.push(
                OpenTelemetryTracingBridge::new(provider)
                    .with_filter(EnvFilter::new(EXPORT_FILTER))
                    .boxed(),
            );
        }

        if layers.is_empty() {
            None
        } else {
            Some(layers.boxed())
        }
    }
}

fn tonic_tls(resolved: &ResolvedExporter) -> Option<ClientTlsConfig> {
    (!resolved.insecure).then(|| ClientTlsConfig::new().with_enabled_roots())
}

fn build_tracer_provider(
    resolved: &ResolvedExporter,
    resource: Resource,
) -> Result<SdkTracerProvider, BoxError> {
    let provider = match resolved.protocol {
        Protocol::Grpc => {
            let mut builder = opentelemetry_otlp::SpanExporter::builder()
                .with_tonic()
                .with_endpoint(resolved.endpoint());
            if let Some(tls) = tonic_tls(resolved) {
                builder = builder.with_tls_config(tls);
            }
            batch_tracer_provider(builder.build()?, resource, resolved.interval)
        }
        Protocol::Http | Protocol::Https => {
            let exporter = opentelemetry_otlp::SpanExporter::builder()
                .with_http()
                .with_endpoint(resolved.endpoint())
                .build()?;
            batch_tracer_provider(exporter, resource, resolved.interval)
        }
        Protocol::Stdout => batch_tracer_provider(
            opentelemetry_stdout::SpanExporter::default(),
            resource,
            resolved.interval,
        ),
    };
    Ok(provider)
}

fn batch_tracer_provider<E>(exporter: E, resource: Resource, interval: Duration) -> SdkTracerProvider
where
    E: SpanExporter + 'static,
{
    let processor = BatchSpanProcessor::builder(exporter)
        .with_batch_config(
            BatchConfigBuilder::default()
                .with_scheduled_delay(interval)
                .build(),
        )
        .build();

    SdkTracerProvider::builder()
        .with_resource(resource)
        .with_span_processor(processor)
        .build()
}

fn build_meter_provider(
    resolved: &ResolvedExporter,
    resource: Resource,
) -> Result<SdkMeterProvider, BoxError> {
    let provider = match resolved.protocol {
        Protocol::Grpc => {
            let mut builder = opentelemetry_otlp::MetricExporter::builder()
                .with_tonic()
                .with_endpoint(resolved.endpoint());
            if let Some(tls) = tonic_tls(resolved) {
                builder = builder.with_tls_config(tls);
            }
            periodic_meter_provider(builder.build()?, resource, resolved.interval)
        }
        Protocol::Http | Protocol::Https => {
            let exporter = opentelemetry_otlp::MetricExporter::builder()
                .with_http()
                .with_endpoint(resolved.endpoint())
                .build()?;
            periodic_meter_provider(exporter, resource, resolved.interval)
        }
        Protocol::Stdout => periodic_meter_provider(
            opentelemetry_stdout::MetricExporter::default(),
            resource,
            resolved.interval,
        ),
    };
    Ok(provider)
}

fn periodic_meter_provider<E>(exporter: E, resource: Resource, interval: Duration) -> SdkMeterProvider
where
    E: PushMetricExporter,
{
    let reader = PeriodicReader::builder(exporter)
        .with_interval(interval)
        .build();

    SdkMeterProvider::builder()
        .with_resource(resource)
        .with_reader(reader)
        .build()
}

fn build_logger_provider(
    resolved: &ResolvedExporter,
    resource: Resource,
) -> Result<SdkLoggerProvider, BoxError> {
    let provider = match resolved.protocol {
        Protocol::Grpc => {
            let mut builder = opentelemetry_otlp::LogExporter::builder()
                .with_tonic()
                .with_endpoint(resolved.endpoint());
            if let Some(tls) = tonic_tls(resolved) {
                builder = builder.with_tls_config(tls);
            }
            batch_logger_provider(builder.build()?, resource, resolved.interval)
        }
        Protocol::Http | Protocol::Https => {
            let exporter = opentelemetry_otlp::LogExporter::builder()
                .with_http()
                .with_endpoint(resolved.endpoint())
                .build()?;
            batch_logger_provider(exporter, resource, resolved.interval)
        }
        Protocol::Stdout => batch_logger_provider(
            opentelemetry_stdout::LogExporter::default(),
            resource,
            resolved.interval,
        ),
    };
    Ok(provider)
}

fn batch_logger_provider<E>(exporter: E, resource: Resource, interval: Duration) -> SdkLoggerProvider
where
    E: LogExporter + 'static,
{
    let processor = BatchLogProcessor::builder(exporter)
        .with_batch_config(
            opentelemetry_sdk::logs::BatchConfigBuilder::default()
                .with_scheduled_delay(interval)
                .build(),
        )
        .build();

    SdkLoggerProvider::builder()
        .with_resource(resource)
        .with_log_processor(processor)
        .build()
}
