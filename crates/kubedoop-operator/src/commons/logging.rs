//! User facing log configuration of a product container.
use std::{collections::BTreeMap, fmt::Display};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::config::merge::Atomic;

/// Log configuration per container, keyed by container name.
#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggingSpec {
    #[serde(default)]
    pub containers: BTreeMap<String, ContainerLogConfig>,
}

impl Atomic for LoggingSpec {}

impl LoggingSpec {
    pub fn container(&self, name: &str) -> Option<&ContainerLogConfig> {
        self.containers.get(name)
    }
}

/// Log configuration of a single container.
#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerLogConfig {
    /// Log levels of individual loggers, `ROOT` configures the root logger.
    #[serde(default)]
    pub loggers: BTreeMap<String, LoggerConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub console: Option<LoggerConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<LoggerConfig>,
}

impl ContainerLogConfig {
    pub const ROOT_LOGGER: &'static str = "ROOT";

    pub fn root_log_level(&self) -> LogLevel {
        self.loggers
            .get(Self::ROOT_LOGGER)
            .map(|logger| logger.level.clone())
            .unwrap_or_default()
    }
}

#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggerConfig {
    pub level: LogLevel,
}

/// Log levels
#[derive(
    Clone, Debug, Default, Deserialize, Eq, JsonSchema, Ord, PartialEq, PartialOrd, Serialize,
)]
pub enum LogLevel {
    TRACE,
    DEBUG,
    #[default]
    INFO,
    WARN,
    ERROR,
    FATAL,
    /// Turn logging off
    NONE,
}

impl LogLevel {
    /// The level name as understood by the Python `logging` module.
    pub fn to_python_log_level(&self) -> &'static str {
        match self {
            Self::TRACE | Self::DEBUG => "DEBUG",
            Self::INFO => "INFO",
            Self::WARN => "WARNING",
            Self::ERROR => "ERROR",
            Self::FATAL => "CRITICAL",
            // Python has no "off" level, CRITICAL + 1 silences everything
            Self::NONE => "CRITICAL + 1",
        }
    }

    /// The level name as understood by Vector.
    pub fn to_vector_literal(&self) -> &'static str {
        match self {
            Self::TRACE => "trace",
            Self::DEBUG => "debug",
            Self::INFO => "info",
            Self::WARN => "warn",
            Self::ERROR | Self::FATAL => "error",
            Self::NONE => "off",
        }
    }
}

impl Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}
