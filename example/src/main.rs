#![allow(non_snake_case)]
use aws_embedded_metrics::{Error, MetricsLogger, Unit};
use std::time::Instant;

async fn handle_request(metrics: &MetricsLogger, request_id: usize) -> Result<(), Error> {
    let start = Instant::now();
    let mut metrics = metrics.new_scope();

    metrics
        .put_dimensions([("Method", "Default")])?
        .put_metric("requests", 1.0, Some(Unit::Count))?
        .put_metric("latency", start.elapsed().as_secs_f64() * 1000.0, Some(Unit::Milliseconds))?
        .set_property("RequestId", request_id);

    metrics.flush().await
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::filter::EnvFilter::from_default_env())
        .with_target(false)
        .without_time()
        .compact()
        .init();

    // AWS_EMF_ENVIRONMENT=default sends to the CloudWatch agent instead of stdout
    let builder = aws_embedded_metrics::Builder::from_env();
    let builder = match std::env::var("AWS_EMF_ENVIRONMENT") {
        Ok(_) => builder,
        Err(_) => builder.environment("local"),
    };
    let metrics = builder.namespace("MetricsTest").service_name("example").init()?;

    for request_id in 0..3 {
        handle_request(&metrics, request_id).await?;
    }
    Ok(())
}
