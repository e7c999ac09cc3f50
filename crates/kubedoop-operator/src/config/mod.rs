//! Configuration inheritance between roles and role groups.
//!
//! Every product config can be set on the role and on each role group. Only role groups are
//! realized into running workloads, so before anything is built the role-level config is merged
//! *into* a copy of the role group config with [`merge::Merge`]. A field set on the role group
//! always wins, a field left unset there is inherited from the role.
//!
//! ```
//! # use kubedoop_operator::config::merge::{Merge, merge};
//! #[derive(Clone, Debug, Default, PartialEq)]
//! struct Config {
//!     replicas_hint: Option<u16>,
//!     tags: Vec<String>,
//! }
//!
//! impl Merge for Config {
//!     fn merge(&mut self, defaults: &Self) {
//!         self.replicas_hint.merge(&defaults.replicas_hint);
//!         self.tags.merge(&defaults.tags);
//!     }
//! }
//!
//! let role = Config { replicas_hint: Some(3), tags: vec!["role".to_string()] };
//! let group = Config { replicas_hint: None, tags: vec!["group".to_string()] };
//!
//! assert_eq!(
//!     merge(group, &role),
//!     Config { replicas_hint: Some(3), tags: vec!["group".to_string()] },
//! );
//! ```
//!
//! The merge is shallow: a set field is never looked into, it is taken as a whole.

pub mod merge;
