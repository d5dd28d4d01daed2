pub use {
    builder::Builder,
    config::Config,
    context::{DimensionSet, Metric, MetricsContext, DEFAULT_NAMESPACE},
    error::Error,
    logger::MetricsLogger,
    unit::{StorageResolution, Unit},
};

mod builder;
mod config;
mod context;
pub mod emf;
pub mod environment;
mod error;
mod logger;
pub mod sink;
pub mod transport;
mod unit;
pub mod validator;
