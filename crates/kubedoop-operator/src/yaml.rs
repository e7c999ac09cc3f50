//! Utility functions for processing data in the YAML file format
use std::io::Write;

use kube::CustomResourceExt;
use serde::ser;
use snafu::{ResultExt, Snafu};

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to serialize YAML"))]
    SerializeYaml { source: serde_yaml::Error },

    #[snafu(display("failed to write YAML document separator"))]
    WriteDocumentSeparator { source: std::io::Error },
}

/// Serializes the given data structure as an explicit YAML document and writes it to a [`Write`].
///
/// Enums are serialized as a YAML map containing one entry in which the key identifies the variant
/// name.
///
/// # Example
///
/// ```
/// use serde::Serialize;
/// use kubedoop_operator::yaml;
///
/// #[derive(Serialize)]
/// #[serde(rename_all = "camelCase")]
/// enum Database {
///     Inline(String),
///     Reference(String),
/// }
///
/// #[derive(Serialize)]
/// struct Spec {
///     database: Database,
/// }
///
/// let value = Spec {
///     database: Database::Reference("superset-db".into()),
/// };
///
/// let mut buf = Vec::new();
/// yaml::serialize_to_explicit_document(&mut buf, &value).expect("serializable");
/// let actual_yaml = std::str::from_utf8(&buf).expect("valid UTF-8");
///
/// let expected_yaml = "---
/// database:
///   reference: superset-db
/// ";
///
/// assert_eq!(expected_yaml, actual_yaml);
/// ```
pub fn serialize_to_explicit_document<T, W>(mut writer: W, value: &T) -> Result<()>
where
    T: ser::Serialize,
    W: Write,
{
    writer
        .write_all(b"---\n")
        .context(WriteDocumentSeparatorSnafu)?;
    let mut serializer = serde_yaml::Serializer::new(writer);
    serde_yaml::with::singleton_map_recursive::serialize(value, &mut serializer)
        .context(SerializeYamlSnafu)?;
    Ok(())
}

/// Prints the CustomResourceDefinition of a type as YAML.
pub trait YamlSchema: CustomResourceExt {
    fn print_yaml_schema() -> Result<()> {
        serialize_to_explicit_document(std::io::stdout().lock(), &Self::crd())
    }
}

impl<T: CustomResourceExt> YamlSchema for T {}
