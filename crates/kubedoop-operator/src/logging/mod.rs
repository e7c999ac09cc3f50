use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, Registry, layer::SubscriberExt, util::SubscriberInitExt};

pub mod controller;
mod k8s_events;

/// The format of the log lines written to the console.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    #[default]
    Plain,
    Json,
}

/// Initializes `tracing` logging with options from the environment variable
/// given in the `env` parameter.
///
/// We force users to provide a variable name so it can be different per product.
/// We encourage it to be the product name plus `_LOG`, e.g. `SUPERSET_OPERATOR_LOG`.
/// If the environment variable is not set, the maximum log level is INFO.
///
/// When `<env>_DIRECTORY` is set, logs are also written as JSON to hourly rolling files
/// prefixed with `app_name` in that directory. The returned guard must be kept alive for as
/// long as logs should be flushed to those files.
pub fn initialize_logging(env: &str, app_name: &str, format: LogFormat) -> Option<WorkerGuard> {
    let console_layer = match format {
        LogFormat::Plain => tracing_subscriber::fmt::layer()
            .with_filter(env_filter(env))
            .boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_filter(env_filter(env))
            .boxed(),
    };

    let file_appender_directory = std::env::var_os(format!("{env}_DIRECTORY"));
    let (file_layer, guard) = match file_appender_directory {
        Some(directory) => {
            let file_appender = tracing_appender::rolling::hourly(directory, app_name);
            let (writer, guard) = tracing_appender::non_blocking(file_appender);
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(writer)
                .with_filter(env_filter(env));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    Registry::default()
        .with(console_layer)
        .with(file_layer)
        .init();

    guard
}

fn env_filter(env: &str) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .with_env_var(env)
        .from_env_lossy()
}
