//! The `<cluster>-env` Secret. Every Superset container imports it as environment variables.
use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use kubedoop_operator::{
    builder::{configmap::SecretBuilder, meta::ObjectMetaBuilder},
    client::{ResourceClient, secret_value},
    k8s_openapi::api::core::v1::Secret,
    reconciler::ResourceBuilder,
};
use snafu::{OptionExt, ResultExt, ensure};
use tracing::debug;

use super::{
    BuildConfigSnafu, BuildLabelsSnafu, ClusterContext, Error, InvalidDatabasePortSnafu,
    MissingDatabaseSnafu, MissingRedisHostSnafu, Result,
};
use crate::crd::{AdministratorSpec, AppSecretKeySpec, ClusterConfigSpec, RedisSpec};

pub const DB_DRIVER: &str = "DB_DRIVER";
pub const DB_HOST: &str = "DB_HOST";
pub const DB_PORT: &str = "DB_PORT";
pub const DB_NAME: &str = "DB_NAME";
pub const DB_USER: &str = "DB_USER";
pub const DB_PASS: &str = "DB_PASS";

pub const REDIS_HOST: &str = "REDIS_HOST";
pub const REDIS_PORT: &str = "REDIS_PORT";
pub const REDIS_DB: &str = "REDIS_DB";
pub const REDIS_CELERY_DB: &str = "REDIS_CELERY_DB";
pub const REDIS_PROTO: &str = "REDIS_PROTO";
pub const REDIS_USER: &str = "REDIS_USER";
pub const REDIS_PASSWORD: &str = "REDIS_PASSWORD";

pub const ADMIN_USERNAME: &str = "ADMIN_USERNAME";
pub const ADMIN_FIRSTNAME: &str = "ADMIN_FIRSTNAME";
pub const ADMIN_LASTNAME: &str = "ADMIN_LASTNAME";
pub const ADMIN_EMAIL: &str = "ADMIN_EMAIL";
pub const ADMIN_PASSWORD: &str = "ADMIN_PASSWORD";

/// Length of the secret key derived from the owner UID.
const GENERATED_SECRET_KEY_LENGTH: usize = 42;

/// Keys of a Secret referenced as database.
mod database_keys {
    pub const DRIVER: &str = "driver";
    pub const HOST: &str = "host";
    pub const PORT: &str = "port";
    pub const DATABASE: &str = "database";
    pub const USERNAME: &str = "username";
    pub const PASSWORD: &str = "password";
}

/// Secrets referenced by the cluster config, read before the env Secret is assembled.
#[derive(Clone, Debug, Default)]
pub struct ReferencedSecrets {
    pub database: Option<Secret>,
    pub redis_password: Option<String>,
    pub administrator: Option<Secret>,
    pub app_secret_key: Option<String>,
}

impl ReferencedSecrets {
    /// Reads every Secret the cluster config references. A missing Secret or key is an error.
    pub async fn fetch(client: &ResourceClient, spec: &ClusterConfigSpec) -> Result<Self> {
        let database = match &spec.database.reference {
            Some(name) => Some(client.get::<Secret>(name, None).await?),
            None => None,
        };

        let redis_password = match &spec.redis.exist_secret {
            Some(name) => Some(
                client
                    .get_secret_value(name, RedisSpec::PASSWORD_KEY)
                    .await?,
            ),
            None => None,
        };

        let administrator = match &spec.administrator.exist_secret {
            Some(name) => Some(client.get::<Secret>(name, None).await?),
            None => None,
        };

        let app_secret_key = match spec
            .app_secret_key
            .as_ref()
            .and_then(|key| key.exist_secret.as_ref())
        {
            Some(name) => Some(
                client
                    .get_secret_value(name, AppSecretKeySpec::SECRET_KEY)
                    .await?,
            ),
            None => None,
        };

        Ok(Self {
            database,
            redis_password,
            administrator,
            app_secret_key,
        })
    }
}

pub struct EnvSecretBuilder {
    client: ResourceClient,
    ctx: Arc<ClusterContext>,
}

impl EnvSecretBuilder {
    pub fn new(client: ResourceClient, ctx: Arc<ClusterContext>) -> Self {
        Self { client, ctx }
    }
}

#[async_trait]
impl ResourceBuilder for EnvSecretBuilder {
    type Error = Error;
    type Resource = Secret;

    fn name(&self) -> String {
        self.ctx.config.env_secret_name.clone()
    }

    async fn build(&self) -> Result<Secret> {
        let referenced = ReferencedSecrets::fetch(&self.client, &self.ctx.config.spec).await?;
        env_secret(&self.ctx, self.client.owner_uid(), &referenced)
    }
}

pub fn env_secret(
    ctx: &ClusterContext,
    owner_uid: &str,
    referenced: &ReferencedSecrets,
) -> Result<Secret> {
    let name = &ctx.config.env_secret_name;
    let mut builder = SecretBuilder::new();
    builder.metadata(
        ObjectMetaBuilder::new()
            .name(name)
            .namespace(&ctx.cluster.namespace)
            .with_labels(ctx.cluster.labels().context(BuildLabelsSnafu)?)
            .build(),
    );
    for (key, value) in env_data(ctx, owner_uid, referenced)? {
        builder.add_data(key, value);
    }
    builder.build().context(BuildConfigSnafu { name })
}

/// The environment variables of the env Secret.
pub fn env_data(
    ctx: &ClusterContext,
    owner_uid: &str,
    referenced: &ReferencedSecrets,
) -> Result<BTreeMap<String, String>> {
    let spec = &ctx.config.spec;
    let mut data = BTreeMap::new();
    data.extend(database_env(ctx, referenced)?);
    data.extend(redis_env(ctx, referenced.redis_password.as_deref())?);
    data.extend(administrator_env(
        &spec.administrator,
        referenced.administrator.as_ref(),
    )?);
    data.insert(
        AppSecretKeySpec::SECRET_KEY.to_string(),
        app_secret_key(
            spec.app_secret_key.as_ref(),
            referenced.app_secret_key.as_deref(),
            owner_uid,
        ),
    );
    Ok(data)
}

fn database_env(
    ctx: &ClusterContext,
    referenced: &ReferencedSecrets,
) -> Result<BTreeMap<String, String>> {
    let spec = &ctx.config.spec.database;

    if let (Some(name), Some(secret)) = (&spec.reference, &referenced.database) {
        debug!(secret = name, "reading database connection from secret");
        let port = secret_value(secret, database_keys::PORT)?;
        let port = port
            .trim()
            .parse::<u16>()
            .context(InvalidDatabasePortSnafu {
                secret: name,
                value: &port,
            })?;
        return Ok(database_vars(
            secret_value(secret, database_keys::DRIVER)?,
            secret_value(secret, database_keys::HOST)?,
            port,
            secret_value(secret, database_keys::DATABASE)?,
            secret_value(secret, database_keys::USERNAME)?,
            secret_value(secret, database_keys::PASSWORD)?,
        ));
    }

    let inline = spec.inline.as_ref().context(MissingDatabaseSnafu {
        cluster: &ctx.cluster.name,
        namespace: &ctx.cluster.namespace,
    })?;
    Ok(database_vars(
        inline.driver.clone(),
        inline.host.clone(),
        inline.port,
        inline.database_name.clone(),
        inline.username.clone(),
        inline.password.clone(),
    ))
}

fn database_vars(
    driver: String,
    host: String,
    port: u16,
    database: String,
    username: String,
    password: String,
) -> BTreeMap<String, String> {
    BTreeMap::from([
        (DB_DRIVER.to_string(), driver),
        (DB_HOST.to_string(), host),
        (DB_PORT.to_string(), port.to_string()),
        (DB_NAME.to_string(), database),
        (DB_USER.to_string(), username),
        (DB_PASS.to_string(), password),
    ])
}

fn redis_env(ctx: &ClusterContext, password: Option<&str>) -> Result<BTreeMap<String, String>> {
    let redis = &ctx.config.spec.redis;
    ensure!(
        !redis.host.is_empty(),
        MissingRedisHostSnafu {
            cluster: &ctx.cluster.name,
            namespace: &ctx.cluster.namespace,
        }
    );

    Ok(BTreeMap::from([
        (REDIS_HOST.to_string(), redis.host.clone()),
        (REDIS_PORT.to_string(), redis.port.to_string()),
        (REDIS_DB.to_string(), redis.db.to_string()),
        (REDIS_CELERY_DB.to_string(), redis.celery_db.to_string()),
        (REDIS_PROTO.to_string(), redis.proto.clone()),
        (
            REDIS_USER.to_string(),
            redis.user.clone().unwrap_or_default(),
        ),
        (
            REDIS_PASSWORD.to_string(),
            password.unwrap_or_default().to_string(),
        ),
    ]))
}

/// The administrator from the referenced Secret, which must contain the user name and password,
/// or from the inline spec.
fn administrator_env(
    spec: &AdministratorSpec,
    secret: Option<&Secret>,
) -> Result<BTreeMap<String, String>> {
    let Some(secret) = secret else {
        return Ok(BTreeMap::from([
            (ADMIN_USERNAME.to_string(), spec.username.clone()),
            (ADMIN_FIRSTNAME.to_string(), spec.first_name.clone()),
            (ADMIN_LASTNAME.to_string(), spec.last_name.clone()),
            (ADMIN_EMAIL.to_string(), spec.email.clone()),
            (ADMIN_PASSWORD.to_string(), spec.password.clone()),
        ]));
    };

    let optional = |key: &str, default: &str| {
        secret_value(secret, key).unwrap_or_else(|_| default.to_string())
    };
    Ok(BTreeMap::from([
        (ADMIN_USERNAME.to_string(), secret_value(secret, ADMIN_USERNAME)?),
        (ADMIN_PASSWORD.to_string(), secret_value(secret, ADMIN_PASSWORD)?),
        (
            ADMIN_FIRSTNAME.to_string(),
            optional(ADMIN_FIRSTNAME, &spec.first_name),
        ),
        (
            ADMIN_LASTNAME.to_string(),
            optional(ADMIN_LASTNAME, &spec.last_name),
        ),
        (ADMIN_EMAIL.to_string(), optional(ADMIN_EMAIL, &spec.email)),
    ]))
}

/// The Flask secret key: the referenced Secret wins over the inline key, without either the key
/// is derived from the owner UID so it stays stable across passes.
pub fn app_secret_key(
    spec: Option<&AppSecretKeySpec>,
    referenced: Option<&str>,
    owner_uid: &str,
) -> String {
    if let Some(key) = referenced {
        return key.to_string();
    }
    if let Some(key) = spec
        .and_then(|spec| spec.secret_key.as_deref())
        .filter(|key| !key.is_empty())
    {
        return key.to_string();
    }
    STANDARD
        .encode(owner_uid)
        .chars()
        .take(GENERATED_SECRET_KEY_LENGTH)
        .collect()
}
