//! The `<cluster>-config` Secret used by the bootstrap job: a `superset_config.py` connecting to
//! the database and Redis, and the scripts initializing the metadata database.
use std::sync::Arc;

use async_trait::async_trait;
use indoc::indoc;
use kubedoop_operator::{
    builder::{configmap::SecretBuilder, meta::ObjectMetaBuilder},
    k8s_openapi::api::core::v1::Secret,
    reconciler::ResourceBuilder,
};
use snafu::ResultExt;

use super::{BuildConfigSnafu, BuildLabelsSnafu, ClusterContext, Error, Result};

pub const SUPERSET_CONFIG_FILE: &str = "superset_config.py";
pub const INIT_SCRIPT_FILE: &str = "superset_init.sh";
pub const BOOTSTRAP_SCRIPT_FILE: &str = "superset_bootstrap.sh";

/// Connects Superset to the metadata database, the cache and the Celery broker, all read from
/// the variables of the env Secret.
pub const CONNECTIONS_CONFIG: &str = indoc! {r#"
    import os

    from flask_caching.backends.rediscache import RedisCache


    def env(key, default=None):
        return os.getenv(key, default)


    REDIS_BASE_URL = f"{env('REDIS_PROTO', 'redis')}://{env('REDIS_USER', '')}:{env('REDIS_PASSWORD', '')}@{env('REDIS_HOST')}:{env('REDIS_PORT', 6379)}"

    CACHE_REDIS_URL = f"{REDIS_BASE_URL}/{env('REDIS_DB', 1)}"
    CELERY_REDIS_URL = f"{REDIS_BASE_URL}/{env('REDIS_CELERY_DB', 0)}"

    MAPBOX_API_KEY = env('MAPBOX_API_KEY', '')
    CACHE_CONFIG = {
        'CACHE_TYPE': 'RedisCache',
        'CACHE_DEFAULT_TIMEOUT': 300,
        'CACHE_KEY_PREFIX': 'superset_',
        'CACHE_REDIS_URL': CACHE_REDIS_URL,
    }
    DATA_CACHE_CONFIG = CACHE_CONFIG

    SQLALCHEMY_DATABASE_URI = f"{env('DB_DRIVER', 'postgresql')}://{env('DB_USER')}:{env('DB_PASS')}@{env('DB_HOST')}:{env('DB_PORT')}/{env('DB_NAME')}"
    SQLALCHEMY_TRACK_MODIFICATIONS = True

    SECRET_KEY = env('SUPERSET_SECRET_KEY')


    class CeleryConfig:
        imports = ("superset.sql_lab", )
        broker_url = CELERY_REDIS_URL
        result_backend = CELERY_REDIS_URL


    CELERY_CONFIG = CeleryConfig
    RESULTS_BACKEND = RedisCache(
        host=env('REDIS_HOST'),
        password=env('REDIS_PASSWORD') or None,
        port=env('REDIS_PORT', 6379),
        key_prefix='superset_results',
    )
"#};

const INIT_SCRIPT: &str = indoc! {r#"
    #!/bin/sh
    set -eu
    echo "Upgrading DB schema..."
    superset db upgrade
    echo "Initializing roles..."
    superset init

    echo "Creating admin user..."
    superset fab create-admin \
        --username "${ADMIN_USERNAME}" \
        --firstname "${ADMIN_FIRSTNAME:-Superset}" \
        --lastname "${ADMIN_LASTNAME:-Admin}" \
        --email "${ADMIN_EMAIL:-admin@superset.com}" \
        --password "${ADMIN_PASSWORD}" \
        || true

    if [ -f "/app/configs/import_datasources.yaml" ]; then
        echo "Importing database connections..."
        superset import_datasources -p /app/configs/import_datasources.yaml
    fi
"#};

const BOOTSTRAP_SCRIPT: &str = indoc! {r#"
    #!/bin/sh
    if [ ! -f ~/bootstrap ]; then echo "Running Superset with uid $(id -u)" > ~/bootstrap; fi
"#};

pub struct ConfigSecretBuilder {
    ctx: Arc<ClusterContext>,
}

impl ConfigSecretBuilder {
    pub fn new(ctx: Arc<ClusterContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl ResourceBuilder for ConfigSecretBuilder {
    type Error = Error;
    type Resource = Secret;

    fn name(&self) -> String {
        self.ctx.config.config_secret_name.clone()
    }

    async fn build(&self) -> Result<Secret> {
        config_secret(&self.ctx)
    }
}

pub fn config_secret(ctx: &ClusterContext) -> Result<Secret> {
    let name = &ctx.config.config_secret_name;
    SecretBuilder::new()
        .metadata(
            ObjectMetaBuilder::new()
                .name(name)
                .namespace(&ctx.cluster.namespace)
                .with_labels(ctx.cluster.labels().context(BuildLabelsSnafu)?)
                .build(),
        )
        .add_data(SUPERSET_CONFIG_FILE, CONNECTIONS_CONFIG)
        .add_data(INIT_SCRIPT_FILE, INIT_SCRIPT)
        .add_data(BOOTSTRAP_SCRIPT_FILE, BOOTSTRAP_SCRIPT)
        .build()
        .context(BuildConfigSnafu { name })
}
