//! This module provides builders for the Kubernetes objects an operator emits.
//!
//! Builders accumulate plain values through `&mut self` setters and produce the final object in a
//! single `build` call. They never talk to the API server.
pub mod configmap;
pub mod ingress;
pub mod meta;
pub mod pdb;
pub mod pod;
pub mod service;
pub mod workload;
