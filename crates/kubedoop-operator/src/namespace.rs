//! This module provides helpers and constants to deal with namespaces
use k8s_openapi::NamespaceResourceScope;
use kube::{Api, Resource};

use crate::client::Client;

#[derive(Clone, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub enum WatchNamespace {
    All,
    One(String),
}

impl From<&str> for WatchNamespace {
    fn from(s: &str) -> Self {
        if s.is_empty() {
            Self::All
        } else {
            Self::One(s.to_string())
        }
    }
}

impl WatchNamespace {
    /// Gets an API object for the namespace in question or for all namespaces,
    /// depending on which variant we are.
    pub fn get_api<T>(&self, client: &Client) -> Api<T>
    where
        T: Resource<DynamicType = (), Scope = NamespaceResourceScope>,
    {
        match self {
            Self::All => Api::all(client.as_kube_client()),
            Self::One(namespace) => client.get_api::<T>(namespace),
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("", WatchNamespace::All)]
    #[case("superset", WatchNamespace::One("superset".to_string()))]
    fn parse_watch_namespace(#[case] input: &str, #[case] expected: WatchNamespace) {
        assert_eq!(WatchNamespace::from(input), expected);
    }
}
