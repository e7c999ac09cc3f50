//! The ConfigMap of a role group: `superset_config.py`, `log_config.py` and, when logs are
//! shipped, `vector.yaml`. The main container copies the Python files onto the `PYTHONPATH`.
use std::sync::Arc;

use async_trait::async_trait;
use indoc::{formatdoc, indoc};
use kubedoop_operator::{
    builder::{configmap::ConfigMapBuilder, meta::ObjectMetaBuilder},
    client::ResourceClient,
    commons::logging::{ContainerLogConfig, LogLevel, LoggerConfig},
    k8s_openapi::api::core::v1::ConfigMap,
    reconciler::ResourceBuilder,
};
use snafu::ResultExt;

use super::{
    BuildConfigSnafu, BuildLabelsSnafu, Error, LOG_DIR, Result, RoleGroupContext,
    authentication_class::ResolvedAuthentication,
    config_secret::{CONNECTIONS_CONFIG, SUPERSET_CONFIG_FILE},
    vector::{VECTOR_CONFIG_FILE, aggregator_address, vector_config},
};

pub const LOG_CONFIG_FILE: &str = "log_config.py";

const APP_CONFIG: &str = indoc! {"
    from flask_appbuilder.security.manager import AUTH_DB, AUTH_LDAP, AUTH_OAUTH
    from superset.stats_logger import StatsdStatsLogger

    from log_config import JsonLoggingConfigurator

    LOGGING_CONFIGURATOR = JsonLoggingConfigurator()

    ROW_LIMIT = 10000

    STATS_LOGGER = StatsdStatsLogger(host='0.0.0.0', port=9125)

    SUPERSET_WEBSERVER_TIMEOUT = 300

    TALISMAN_ENABLED = False
"};

pub struct RoleGroupConfigMapBuilder {
    client: ResourceClient,
    role_group: Arc<RoleGroupContext>,
}

impl RoleGroupConfigMapBuilder {
    pub fn new(client: ResourceClient, role_group: Arc<RoleGroupContext>) -> Self {
        Self { client, role_group }
    }
}

#[async_trait]
impl ResourceBuilder for RoleGroupConfigMapBuilder {
    type Error = Error;
    type Resource = ConfigMap;

    fn name(&self) -> String {
        self.role_group.name()
    }

    async fn build(&self) -> Result<ConfigMap> {
        let spec = &self.role_group.cluster.config.spec;
        let authentication =
            ResolvedAuthentication::fetch(&self.client, spec.authentication.as_ref()).await?;
        let address = match &spec.vector_aggregator_config_map_name {
            Some(name) => Some(aggregator_address(&self.client, name).await?),
            None => None,
        };

        role_group_config_map(&self.role_group, authentication.as_ref(), address.as_deref())
    }
}

pub fn role_group_config_map(
    role_group: &RoleGroupContext,
    authentication: Option<&ResolvedAuthentication>,
    vector_aggregator_address: Option<&str>,
) -> Result<ConfigMap> {
    let name = role_group.name();
    let log_config = role_group
        .config()
        .logging
        .as_ref()
        .and_then(|logging| logging.container(&role_group.role.to_string()));

    ConfigMapBuilder::new()
        .metadata(
            ObjectMetaBuilder::new()
                .name(&name)
                .namespace(&role_group.cluster.cluster.namespace)
                .with_labels(role_group.info.labels().context(BuildLabelsSnafu)?)
                .build(),
        )
        .add_data(SUPERSET_CONFIG_FILE, superset_config(authentication)?)
        .add_data(LOG_CONFIG_FILE, python_log_config(log_config))
        .add_data_opt(
            VECTOR_CONFIG_FILE,
            vector_aggregator_address
                .map(|address| vector_config(&role_group.info, address, role_group.config())),
        )
        .build()
        .context(BuildConfigSnafu { name })
}

fn superset_config(authentication: Option<&ResolvedAuthentication>) -> Result<String> {
    let mut config = format!("{CONNECTIONS_CONFIG}\n{APP_CONFIG}");
    if let Some(authentication) = authentication {
        config.push_str(&authentication.superset_config()?);
    }
    Ok(config)
}

fn python_level(level: &LogLevel) -> String {
    format!("logging.{}", level.to_python_log_level())
}

/// A `LoggingConfigurator` writing plain text to the console and JSON to a rotated file, which
/// the Vector agent picks up.
fn python_log_config(log_config: Option<&ContainerLogConfig>) -> String {
    let root_level = log_config.map(ContainerLogConfig::root_log_level).unwrap_or_default();
    let appender_level = |appender: Option<&LoggerConfig>| {
        python_level(appender.map_or(&root_level, |appender| &appender.level))
    };
    let console_level = appender_level(log_config.and_then(|config| config.console.as_ref()));
    let file_level = appender_level(log_config.and_then(|config| config.file.as_ref()));

    let loggers = log_config
        .map(|config| {
            config
                .loggers
                .iter()
                .filter(|(name, _)| *name != ContainerLogConfig::ROOT_LOGGER)
                .map(|(name, logger)| {
                    format!(
                        "\n        logging.getLogger('{name}').setLevel({})",
                        python_level(&logger.level)
                    )
                })
                .collect::<String>()
        })
        .unwrap_or_default();

    formatdoc! {"
        import logging
        import logging.handlers
        import os
        from pathlib import Path

        import flask.config
        from pythonjsonlogger import jsonlogger

        from superset.utils.logging_configurator import LoggingConfigurator

        LOGDIR = Path('{LOG_DIR}/superset')

        os.makedirs(LOGDIR, exist_ok=True)

        LOGLEVEL = {root}


        class JsonLoggingConfigurator(LoggingConfigurator):
            def configure_logging(self, app_config: flask.config.Config, debug_mode: bool):
                logFormat = '%(asctime)s:%(levelname)s:%(name)s:%(message)s'

                plainTextFormatter = logging.Formatter(logFormat)
                jsonFormatter = jsonlogger.JsonFormatter(logFormat)

                consoleHandler = logging.StreamHandler()
                consoleHandler.setLevel({console_level})
                consoleHandler.setFormatter(plainTextFormatter)

                fileHandler = logging.handlers.RotatingFileHandler(
                    LOGDIR.joinpath('superset.py.json'),
                    maxBytes=1048576,
                    backupCount=1,
                )
                fileHandler.setLevel({file_level})
                fileHandler.setFormatter(jsonFormatter)

                rootLogger = logging.getLogger()
                rootLogger.setLevel(LOGLEVEL)
                rootLogger.addHandler(consoleHandler)
                rootLogger.addHandler(fileHandler){loggers}
        ",
        root = python_level(&root_level),
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;
    use kubedoop_operator::{client::prepare_update, crd::authentication::AuthenticationClass};

    use super::*;
    use crate::{
        crd::AuthenticationSpec,
        resources::{role::role_group_context, test_support},
    };

    fn node_default(yaml: &str) -> RoleGroupContext {
        let superset = test_support::cluster(yaml);
        let ctx = test_support::cluster_context(&superset);
        role_group_context(&superset, &ctx, crate::crd::SupersetRole::Node, "default")
            .expect("role group exists")
    }

    #[test]
    fn minimal_config_map() {
        let role_group = node_default(test_support::MINIMAL_CLUSTER);
        let config_map = role_group_config_map(&role_group, None, None).expect("config map builds");

        assert_eq!(config_map.metadata.name.as_deref(), Some("simple-node-default"));
        let data = config_map.data.expect("config map has data");
        assert_eq!(
            data.keys().collect::<Vec<_>>(),
            vec![LOG_CONFIG_FILE, SUPERSET_CONFIG_FILE]
        );

        let superset_config = &data[SUPERSET_CONFIG_FILE];
        assert!(superset_config.contains("ROW_LIMIT = 10000\n"));
        assert!(superset_config.contains("class CeleryConfig:\n"));
        assert!(!superset_config.contains("AUTH_TYPE"));

        let log_config = &data[LOG_CONFIG_FILE];
        assert!(log_config.contains("LOGLEVEL = logging.INFO\n"), "{log_config}");
        assert!(log_config.contains("LOGDIR = Path('/kubedoop/log/superset')\n"));
    }

    #[test]
    fn stored_config_map_is_up_to_date() {
        let role_group = node_default(test_support::MINIMAL_CLUSTER);
        let config_map = role_group_config_map(&role_group, None, None).expect("config map builds");
        let live = test_support::stored(&config_map, |_| {});

        let update = prepare_update(config_map, &live).expect("objects are comparable");
        assert!(update.is_none(), "unexpected update: {update:?}");

        let with_vector = role_group_config_map(&role_group, None, Some("vector-aggregator:6000"))
            .expect("config map builds");
        let update = prepare_update(with_vector, &live).expect("objects are comparable");
        assert!(update.is_some());
    }

    #[test]
    fn log_levels_from_logging_config() {
        let role_group = node_default(&test_support::MINIMAL_CLUSTER.replace(
            "  node:\n",
            "  node:\n    config:\n      logging: {containers: {node: {\
             loggers: {ROOT: {level: WARN}, flask_appbuilder: {level: DEBUG}}, \
             console: {level: ERROR}}}}\n",
        ));
        let config_map = role_group_config_map(&role_group, None, None).expect("config map builds");
        let log_config = &config_map.data.expect("config map has data")[LOG_CONFIG_FILE];

        assert!(log_config.contains("LOGLEVEL = logging.WARNING\n"), "{log_config}");
        assert!(
            log_config.contains("consoleHandler.setLevel(logging.ERROR)\n"),
            "{log_config}"
        );
        assert!(
            log_config.contains("fileHandler.setLevel(logging.WARNING)\n"),
            "{log_config}"
        );
        assert!(
            log_config.contains("logging.getLogger('flask_appbuilder').setLevel(logging.DEBUG)"),
            "{log_config}"
        );
    }

    #[test]
    fn authentication_and_vector() {
        let role_group = node_default(test_support::MINIMAL_CLUSTER);
        let spec: AuthenticationSpec =
            serde_yaml::from_str("authenticationClass: openldap").expect("valid spec");
        let class: AuthenticationClass = serde_yaml::from_str(indoc! {"
            apiVersion: authentication.kubedoop.dev/v1alpha1
            kind: AuthenticationClass
            metadata:
              name: openldap
            spec:
              provider:
                ldap:
                  hostname: openldap
        "})
        .expect("valid AuthenticationClass");
        let authentication = ResolvedAuthentication::new(&spec, &class).expect("ldap is supported");

        let config_map = role_group_config_map(
            &role_group,
            Some(&authentication),
            Some("vector-aggregator:6000"),
        )
        .expect("config map builds");
        let data = config_map.data.expect("config map has data");

        assert!(data[SUPERSET_CONFIG_FILE].contains("AUTH_TYPE = AUTH_LDAP\n"));
        assert!(data[VECTOR_CONFIG_FILE].contains("address: vector-aggregator:6000\n"));
    }
}
