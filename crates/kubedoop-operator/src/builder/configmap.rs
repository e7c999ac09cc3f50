use std::{collections::BTreeMap, marker::PhantomData};

use k8s_openapi::{
    ByteString,
    api::core::v1::{ConfigMap, Secret},
    apimachinery::pkg::apis::meta::v1::ObjectMeta,
};
use snafu::{OptionExt, Snafu};

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, PartialEq, Eq, Snafu)]
pub enum Error {
    #[snafu(display("object is missing key {key:?}"))]
    MissingObjectKey { key: &'static str },
}

/// Values are stored as plain text, see [`ConfigMapBuilder`].
#[derive(Clone, Copy, Debug)]
pub enum Text {}

/// Values are stored as opaque bytes, see [`SecretBuilder`].
#[derive(Clone, Copy, Debug)]
pub enum Opaque {}

/// Accumulates string keyed configuration data. The `Kind` decides which object is built.
#[derive(Clone, Debug)]
pub struct ConfigBuilder<Kind> {
    metadata: Option<ObjectMeta>,
    data: BTreeMap<String, String>,
    kind: PhantomData<Kind>,
}

pub type ConfigMapBuilder = ConfigBuilder<Text>;
pub type SecretBuilder = ConfigBuilder<Opaque>;

impl<Kind> Default for ConfigBuilder<Kind> {
    fn default() -> Self {
        Self {
            metadata: None,
            data: BTreeMap::new(),
            kind: PhantomData,
        }
    }
}

impl<Kind> ConfigBuilder<Kind> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn metadata(&mut self, metadata: impl Into<ObjectMeta>) -> &mut Self {
        self.metadata = Some(metadata.into());
        self
    }

    pub fn add_data(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.data.insert(key.into(), value.into());
        self
    }

    pub fn add_data_opt(
        &mut self,
        key: impl Into<String>,
        value: Option<impl Into<String>>,
    ) -> &mut Self {
        if let Some(value) = value {
            self.add_data(key, value);
        }
        self
    }

    pub fn data(&self) -> &BTreeMap<String, String> {
        &self.data
    }

    fn metadata_or_err(&self) -> Result<ObjectMeta> {
        self.metadata
            .clone()
            .context(MissingObjectKeySnafu { key: "metadata" })
    }
}

impl ConfigBuilder<Text> {
    pub fn build(&self) -> Result<ConfigMap> {
        Ok(ConfigMap {
            metadata: self.metadata_or_err()?,
            data: (!self.data.is_empty()).then(|| self.data.clone()),
            ..ConfigMap::default()
        })
    }
}

impl ConfigBuilder<Opaque> {
    pub fn build(&self) -> Result<Secret> {
        let data = self
            .data
            .iter()
            .map(|(key, value)| (key.clone(), ByteString(value.clone().into_bytes())))
            .collect::<BTreeMap<_, _>>();

        Ok(Secret {
            metadata: self.metadata_or_err()?,
            data: (!data.is_empty()).then_some(data),
            type_: Some("Opaque".to_string()),
            ..Secret::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::builder::meta::ObjectMetaBuilder;

    use super::*;

    #[test]
    fn config_map_keeps_text() {
        let config_map = ConfigMapBuilder::new()
            .metadata(ObjectMetaBuilder::new().name("config").build())
            .add_data("a.py", "A = 1")
            .add_data_opt("missing", None::<String>)
            .build()
            .expect("metadata is set");

        assert_eq!(
            config_map.data,
            Some(BTreeMap::from([("a.py".to_string(), "A = 1".to_string())]))
        );
    }

    #[test]
    fn secret_stores_bytes() {
        let secret = SecretBuilder::new()
            .metadata(ObjectMetaBuilder::new().name("env").build())
            .add_data("DB_HOST", "db")
            .build()
            .expect("metadata is set");

        assert_eq!(secret.type_.as_deref(), Some("Opaque"));
        assert_eq!(
            secret.data.expect("data").get("DB_HOST"),
            Some(&ByteString(b"db".to_vec()))
        );
    }

    #[test]
    fn metadata_is_required() {
        assert_eq!(
            SecretBuilder::new().build(),
            Err(Error::MissingObjectKey { key: "metadata" })
        );
    }
}
