//! A framework for Kubernetes operators managing multi-role product clusters.
//!
//! Operators describe the objects of a cluster with the [`builder`]s, compose them into a
//! [`reconciler`] tree and write them through a [`client::ResourceClient`] bound to the cluster
//! object.
pub mod builder;
pub mod cli;
pub mod client;
pub mod commons;
pub mod config;
pub mod crd;
pub mod kvp;
pub mod logging;
pub mod namespace;
pub mod quantity;
pub mod reconciler;
pub mod role_utils;
pub mod status;
pub mod utils;
pub mod yaml;

// External re-exports
pub use k8s_openapi;
pub use kube;
pub use schemars;
pub use yaml::YamlSchema;
