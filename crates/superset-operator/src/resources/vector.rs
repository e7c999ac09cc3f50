//! Shipping the logs of a role group to a Vector aggregator.
//!
//! Every pod gets a `vector` sidecar tailing the files below [`LOG_DIR`]. Vector ignores `SIGTERM`
//! as it does not run as PID 1, so the main container writes a shutdown file once it terminated
//! and the sidecar exits when the file shows up.
use const_format::concatcp;
use indoc::formatdoc;
use kubedoop_operator::{
    builder::pod::{container::ContainerBuilder, volume::VolumeMountBuilder},
    client::ResourceClient,
    commons::logging::{ContainerLogConfig, LogLevel},
    k8s_openapi::api::core::v1::{ConfigMap, Container},
    role_utils::RoleGroupInfo,
};
use snafu::{OptionExt, ResultExt};

use super::{
    BuildContainerSnafu, CONFIG_DIR, CONFIG_VOLUME_NAME, LOG_DIR, LOG_VOLUME_NAME,
    MissingVectorAggregatorAddressSnafu, Result,
};
use crate::crd::SupersetConfig;

pub const VECTOR_CONTAINER_NAME: &str = "vector";
pub const VECTOR_CONFIG_FILE: &str = "vector.yaml";

/// The key of the aggregator discovery ConfigMap holding `<host>:<port>`.
pub const VECTOR_AGGREGATOR_ADDRESS_KEY: &str = "ADDRESS";

const SHUTDOWN_DIR: &str = concatcp!(LOG_DIR, "/_vector");
const SHUTDOWN_FILE: &str = concatcp!(SHUTDOWN_DIR, "/shutdown");

/// Run before the product starts, so a restarted container does not stop its sidecar right away.
pub const REMOVE_SHUTDOWN_FILE_COMMAND: &str = concatcp!("rm -rf ", SHUTDOWN_FILE);

/// Run after the product terminated.
pub const CREATE_SHUTDOWN_FILE_COMMAND: &str =
    concatcp!("mkdir -p ", SHUTDOWN_DIR, " && touch ", SHUTDOWN_FILE);

/// Reads the address of the aggregator from its discovery ConfigMap in the cluster namespace.
pub async fn aggregator_address(client: &ResourceClient, config_map_name: &str) -> Result<String> {
    let config_map = client.get::<ConfigMap>(config_map_name, None).await?;
    address_from_discovery(&config_map, config_map_name, client.namespace())
}

fn address_from_discovery(config_map: &ConfigMap, name: &str, namespace: &str) -> Result<String> {
    config_map
        .data
        .as_ref()
        .and_then(|data| data.get(VECTOR_AGGREGATOR_ADDRESS_KEY))
        .filter(|address| !address.is_empty())
        .cloned()
        .context(MissingVectorAggregatorAddressSnafu {
            name,
            namespace,
            key: VECTOR_AGGREGATOR_ADDRESS_KEY,
        })
}

/// The log configuration of the sidecar itself.
fn vector_log_config(config: &SupersetConfig) -> Option<&ContainerLogConfig> {
    config
        .logging
        .as_ref()
        .and_then(|logging| logging.container(VECTOR_CONTAINER_NAME))
}

fn vector_log_level(config: &SupersetConfig) -> LogLevel {
    vector_log_config(config).map_or(LogLevel::INFO, |log_config| {
        log_config
            .file
            .as_ref()
            .map_or_else(|| log_config.root_log_level(), |file| file.level.clone())
    })
}

/// The VRL condition keeping the internal Vector logs at or above `level`.
fn filter_expression(level: &LogLevel) -> &'static str {
    match level {
        LogLevel::TRACE => "true",
        LogLevel::DEBUG => r#".metadata.level != "TRACE""#,
        LogLevel::INFO => r#"!includes(["TRACE", "DEBUG"], .metadata.level)"#,
        LogLevel::WARN => r#"!includes(["TRACE", "DEBUG", "INFO"], .metadata.level)"#,
        LogLevel::ERROR => r#"!includes(["TRACE", "DEBUG", "INFO", "WARN"], .metadata.level)"#,
        LogLevel::FATAL | LogLevel::NONE => "false",
    }
}

/// The Vector agent configuration: tail the plain text and JSON logs of all containers, tag them
/// with the role group and forward them to the aggregator.
pub fn vector_config(
    role_group: &RoleGroupInfo,
    aggregator_address: &str,
    config: &SupersetConfig,
) -> String {
    let filter_expression = filter_expression(&vector_log_level(config));
    let cluster = role_group.cluster();

    formatdoc! {r#"
        api:
          enabled: true
        data_dir: /kubedoop/vector/var
        log_schema:
          host_key: pod
        sources:
          vector:
            type: internal_logs
          files_stdout:
            type: file
            include:
              - {LOG_DIR}/*/*.stdout.log
          files_stderr:
            type: file
            include:
              - {LOG_DIR}/*/*.stderr.log
          files_py:
            type: file
            include:
              - {LOG_DIR}/*/*.py.json
        transforms:
          processed_files_stdout:
            inputs:
              - files_stdout
            type: remap
            source: |
              .logger = "ROOT"
              .level = "INFO"
          processed_files_stderr:
            inputs:
              - files_stderr
            type: remap
            source: |
              .logger = "ROOT"
              .level = "ERROR"
          processed_files_py:
            inputs:
              - files_py
            type: remap
            source: |
              parsed_event, err = parse_json(string!(.message))
              if err == null {{
                .timestamp = parse_timestamp(string(parsed_event.asctime) ?? "", "%Y-%m-%d %H:%M:%S,%3f") ?? now()
                .logger = parsed_event.name
                .level = parsed_event.levelname
                .message = parsed_event.message
              }}
          extended_logs_files:
            inputs:
              - processed_files_*
            type: remap
            source: |
              . |= parse_regex!(.file, r'^{LOG_DIR}/(?P<container>.*?)/(?P<file>.*?)$')
              del(.source_type)
          filtered_logs_vector:
            inputs:
              - vector
            type: filter
            condition: '{filter_expression}'
          extended_logs_vector:
            inputs:
              - filtered_logs_vector
            type: remap
            source: |
              .container = "vector"
              .level = .metadata.level
              .logger = .metadata.module_path
              if exists(.file) {{ .processed_file = del(.file) }}
              del(.metadata)
              del(.pid)
              del(.source_type)
          extended_logs:
            inputs:
              - extended_logs_*
            type: remap
            source: |
              .namespace = "{namespace}"
              .cluster = "{cluster_name}"
              .role = "{role}"
              .roleGroup = "{role_group_name}"
        sinks:
          aggregator:
            inputs:
              - extended_logs
            type: vector
            address: {aggregator_address}
        "#,
        namespace = cluster.namespace,
        cluster_name = cluster.name,
        role = role_group.role_name(),
        role_group_name = role_group.role_group,
    }
}

/// The sidecar, reading [`VECTOR_CONFIG_FILE`] from the role group ConfigMap.
pub fn vector_container(
    image: &str,
    image_pull_policy: &str,
    config: &SupersetConfig,
) -> Result<Container> {
    let script = formatdoc! {r#"
        vector --config {CONFIG_DIR}/{VECTOR_CONFIG_FILE} & vector_pid=$!
        if [ ! -f "{SHUTDOWN_FILE}" ]; then
          mkdir -p {SHUTDOWN_DIR} && inotifywait -qq --event create {SHUTDOWN_DIR}
        fi
        sleep 1
        kill $vector_pid
    "#};

    let container = ContainerBuilder::new(VECTOR_CONTAINER_NAME)
        .context(BuildContainerSnafu {
            name: VECTOR_CONTAINER_NAME,
        })?
        .image(image)
        .image_pull_policy(image_pull_policy)
        .command(Vec::from(
            ["bash", "-x", "-euo", "pipefail", "-c"].map(String::from),
        ))
        .args(vec![script])
        .add_env_var("VECTOR_LOG", vector_log_level(config).to_vector_literal())
        .add_volume_mount_struct(
            VolumeMountBuilder::new(CONFIG_VOLUME_NAME, CONFIG_DIR)
                .read_only(true)
                .build(),
        )
        .and_then(|builder| builder.add_volume_mount(LOG_VOLUME_NAME, LOG_DIR))
        .context(BuildContainerSnafu {
            name: VECTOR_CONTAINER_NAME,
        })?
        .build();
    Ok(container)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use kubedoop_operator::role_utils::ClusterInfo;

    use super::*;
    use crate::resources::Error;

    fn role_group() -> RoleGroupInfo {
        ClusterInfo::new("superset", "simple", "default")
            .role("node")
            .role_group("default")
    }

    #[test]
    fn config_tags_logs_with_role_group() {
        let config = vector_config(
            &role_group(),
            "vector-aggregator:6000",
            &SupersetConfig::default(),
        );

        let parsed: serde_yaml::Value = serde_yaml::from_str(&config).expect("valid yaml");
        assert_eq!(
            parsed["sinks"]["aggregator"]["address"].as_str(),
            Some("vector-aggregator:6000")
        );
        assert_eq!(
            parsed["transforms"]["filtered_logs_vector"]["condition"].as_str(),
            Some(r#"!includes(["TRACE", "DEBUG"], .metadata.level)"#)
        );
        let extended = parsed["transforms"]["extended_logs"]["source"]
            .as_str()
            .expect("remap source");
        assert!(extended.contains(r#".roleGroup = "default""#), "{extended}");
        assert!(extended.contains(r#".namespace = "default""#), "{extended}");
    }

    #[test]
    fn vector_log_level_from_logging_config() {
        let config: SupersetConfig = serde_yaml::from_str(
            "logging: {containers: {vector: {loggers: {ROOT: {level: WARN}}}}}",
        )
        .expect("valid config");

        let container = vector_container("superset:4.0.2", "IfNotPresent", &config)
            .expect("container builds");
        let env = container.env.unwrap_or_default();
        assert_eq!(env[0].name, "VECTOR_LOG");
        assert_eq!(env[0].value.as_deref(), Some("warn"));
    }

    #[test]
    fn discovery_needs_address() {
        let discovery = ConfigMap {
            data: Some(BTreeMap::from([(
                VECTOR_AGGREGATOR_ADDRESS_KEY.to_string(),
                "vector-aggregator:6000".to_string(),
            )])),
            ..ConfigMap::default()
        };
        assert_eq!(
            address_from_discovery(&discovery, "vector-aggregator-discovery", "default")
                .expect("address is set"),
            "vector-aggregator:6000"
        );

        assert!(matches!(
            address_from_discovery(&ConfigMap::default(), "vector-aggregator-discovery", "default"),
            Err(Error::MissingVectorAggregatorAddress { name, .. }) if name == "vector-aggregator-discovery"
        ));
    }

    #[test]
    fn shutdown_commands_share_the_file() {
        assert_eq!(REMOVE_SHUTDOWN_FILE_COMMAND, "rm -rf /kubedoop/log/_vector/shutdown");
        assert_eq!(
            CREATE_SHUTDOWN_FILE_COMMAND,
            "mkdir -p /kubedoop/log/_vector && touch /kubedoop/log/_vector/shutdown"
        );
    }
}
