#![allow(unused_imports)]
use opentelemetry::trace::TraceId;
use tracing_subscriber::{prelude::*, EnvFilter, Registry};

use crate::config::LogFormat;

/// Fetch an opentelemetry::trace::TraceId as hex through the full tracing stack
pub fn get_trace_id() -> TraceId {
    use opentelemetry::trace::TraceContextExt as _;
    use tracing_opentelemetry::OpenTelemetrySpanExt as _;

    tracing::Span::current()
        .context()
        .span()
        .span_context()
        .trace_id()
}

#[cfg(feature = "telemetry")]
async fn init_tracer() -> anyhow::Result<opentelemetry::sdk::trace::Tracer> {
    use anyhow::Context as _;

    let otlp_endpoint = std::env::var("OPENTELEMETRY_ENDPOINT_URL")
        .context("OPENTELEMETRY_ENDPOINT_URL must point at a trace collector")?;

    let channel = tonic::transport::Channel::from_shared(otlp_endpoint)?
        .connect()
        .await?;

    let tracer = opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(opentelemetry_otlp::new_exporter().tonic().with_channel(channel))
        .with_trace_config(opentelemetry::sdk::trace::config().with_resource(
            opentelemetry::sdk::Resource::new(vec![opentelemetry::KeyValue::new(
                "service.name",
                "sns-operator",
            )]),
        ))
        .install_batch(opentelemetry::runtime::Tokio)?;

    Ok(tracer)
}

/// Initialize tracing
pub async fn init(format: LogFormat) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;
    let logger = match format {
        LogFormat::Json => tracing_subscriber::fmt::layer().json().boxed(),
        LogFormat::Compact => tracing_subscriber::fmt::layer().compact().boxed(),
    };

    let collector = Registry::default().with(logger).with(env_filter);

    #[cfg(feature = "telemetry")]
    let collector = collector.with(tracing_opentelemetry::layer().with_tracer(init_tracer().await?));

    tracing::subscriber::set_global_default(collector)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_trace_outside_a_span() {
        assert_eq!(get_trace_id(), TraceId::INVALID);
    }
}
