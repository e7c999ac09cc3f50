//! Default probes, derived from the names of the ports a container exposes.
//!
//! | port name                            | handler              |
//! |--------------------------------------|----------------------|
//! | `http`, `ui`, `metrics`, `health`    | HTTP GET `/`         |
//! | `master`                             | TCP socket           |
//!
//! The first port (in declaration order) with a known name wins.
use k8s_openapi::{
    api::core::v1::{ContainerPort, ExecAction, HTTPGetAction, Probe, TCPSocketAction},
    apimachinery::pkg::util::intstr::IntOrString,
};

pub const HTTP_PORT_NAMES: &[&str] = &["http", "ui", "metrics", "health"];
pub const TCP_PORT_NAMES: &[&str] = &["master"];

/// The path probed by [`ProbeHandler::health`].
pub const HEALTH_PATH: &str = "/health";

/// What a probe does, independent of its timings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProbeHandler {
    HttpGet { path: String, port_name: String },
    TcpSocket { port_name: String },
    Exec { command: Vec<String> },
}

impl ProbeHandler {
    /// Picks the handler for the first port with a well known name.
    pub fn from_ports(ports: &[ContainerPort]) -> Option<Self> {
        ports.iter().find_map(|port| {
            let name = port.name.as_deref()?;
            if HTTP_PORT_NAMES.contains(&name) {
                Some(Self::HttpGet {
                    path: "/".to_string(),
                    port_name: name.to_string(),
                })
            } else if TCP_PORT_NAMES.contains(&name) {
                Some(Self::TcpSocket {
                    port_name: name.to_string(),
                })
            } else {
                None
            }
        })
    }

    /// GET [`HEALTH_PATH`] on the port named `http`.
    pub fn health() -> Self {
        Self::HttpGet {
            path: HEALTH_PATH.to_string(),
            port_name: "http".to_string(),
        }
    }

    pub fn exec(command: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self::Exec {
            command: command.into_iter().map(Into::into).collect(),
        }
    }

    fn apply_to(&self, probe: &mut Probe) {
        match self {
            Self::HttpGet { path, port_name } => {
                probe.http_get = Some(HTTPGetAction {
                    path: Some(path.clone()),
                    port: IntOrString::String(port_name.clone()),
                    ..HTTPGetAction::default()
                });
            }
            Self::TcpSocket { port_name } => {
                probe.tcp_socket = Some(TCPSocketAction {
                    port: IntOrString::String(port_name.clone()),
                    ..TCPSocketAction::default()
                });
            }
            Self::Exec { command } => {
                probe.exec = Some(ExecAction {
                    command: Some(command.clone()),
                });
            }
        }
    }
}

/// Timings of a probe, all durations in seconds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProbeTimings {
    pub failure_threshold: i32,
    pub initial_delay_seconds: Option<i32>,
    pub period_seconds: i32,
    pub success_threshold: i32,
    pub timeout_seconds: i32,
}

/// Gives slow starting containers up to three minutes before liveness checks kick in.
pub const STARTUP_TIMINGS: ProbeTimings = ProbeTimings {
    failure_threshold: 30,
    initial_delay_seconds: Some(4),
    period_seconds: 6,
    success_threshold: 1,
    timeout_seconds: 3,
};

pub const LIVENESS_TIMINGS: ProbeTimings = ProbeTimings {
    failure_threshold: 3,
    initial_delay_seconds: None,
    period_seconds: 10,
    success_threshold: 1,
    timeout_seconds: 3,
};

pub const READINESS_TIMINGS: ProbeTimings = LIVENESS_TIMINGS;

/// Combines a handler with timings into a [`Probe`].
pub fn build_probe(handler: &ProbeHandler, timings: ProbeTimings) -> Probe {
    let mut probe = Probe {
        failure_threshold: Some(timings.failure_threshold),
        initial_delay_seconds: timings.initial_delay_seconds,
        period_seconds: Some(timings.period_seconds),
        success_threshold: Some(timings.success_threshold),
        timeout_seconds: Some(timings.timeout_seconds),
        ..Probe::default()
    };
    handler.apply_to(&mut probe);
    probe
}
