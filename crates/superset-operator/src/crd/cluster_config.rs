//! Cluster wide settings: the metadata database, Redis, the initial administrator, the Flask
//! secret key, authentication and the ingress of the web servers.
use std::collections::BTreeMap;

use kubedoop_operator::schemars::{self, JsonSchema};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterConfigSpec {
    pub database: DatabaseSpec,

    pub redis: RedisSpec,

    #[serde(default)]
    pub administrator: AdministratorSpec,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_secret_key: Option<AppSecretKeySpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication: Option<AuthenticationSpec>,

    /// Name of the discovery ConfigMap of a Vector aggregator. Logs are only shipped when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector_aggregator_config_map_name: Option<String>,

    /// Exposes the web servers through an Ingress.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingress: Option<IngressSpec>,

    /// Runs the `<cluster>-init` Job, which upgrades the metadata database and creates the
    /// administrator. Disable it when the database is prepared elsewhere.
    #[serde(default = "ClusterConfigSpec::default_init_job")]
    pub init_job: bool,
}

impl ClusterConfigSpec {
    const fn default_init_job() -> bool {
        true
    }
}

/// The metadata database. A `reference` takes precedence over `inline`.
#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseSpec {
    /// Name of a Secret with the keys `driver`, `host`, `port`, `database`, `username` and
    /// `password`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline: Option<DatabaseInlineSpec>,
}

#[derive(Clone, Debug, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseInlineSpec {
    /// The SQLAlchemy dialect, e.g. `postgresql` or `mysql`.
    #[serde(default = "DatabaseInlineSpec::default_driver")]
    pub driver: String,

    pub host: String,

    #[serde(default = "DatabaseInlineSpec::default_port")]
    pub port: u16,

    pub database_name: String,

    pub username: String,

    pub password: String,
}

impl DatabaseInlineSpec {
    fn default_driver() -> String {
        "postgresql".to_string()
    }

    const fn default_port() -> u16 {
        5432
    }
}

/// Redis serves as cache, Celery broker and result backend.
#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RedisSpec {
    #[serde(default)]
    pub host: String,

    #[serde(default = "RedisSpec::default_port")]
    pub port: u16,

    /// The database index of the cache.
    #[serde(default = "RedisSpec::default_db")]
    pub db: u16,

    /// The database index of the Celery broker and result backend.
    #[serde(default)]
    pub celery_db: u16,

    #[serde(default = "RedisSpec::default_proto")]
    pub proto: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    /// Name of a Secret holding the Redis password under the key `password`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exist_secret: Option<String>,
}

impl RedisSpec {
    pub const PASSWORD_KEY: &'static str = "password";

    const fn default_port() -> u16 {
        6379
    }

    const fn default_db() -> u16 {
        1
    }

    fn default_proto() -> String {
        "redis".to_string()
    }
}

/// The administrator created by the bootstrap job.
#[derive(Clone, Debug, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdministratorSpec {
    #[serde(default = "AdministratorSpec::default_username")]
    pub username: String,

    #[serde(default = "AdministratorSpec::default_first_name")]
    pub first_name: String,

    #[serde(default = "AdministratorSpec::default_last_name")]
    pub last_name: String,

    #[serde(default = "AdministratorSpec::default_email")]
    pub email: String,

    #[serde(default = "AdministratorSpec::default_password")]
    pub password: String,

    /// Name of a Secret containing `ADMIN_USERNAME` and `ADMIN_PASSWORD`, optionally
    /// `ADMIN_FIRSTNAME`, `ADMIN_LASTNAME` and `ADMIN_EMAIL`. Replaces the inline values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exist_secret: Option<String>,
}

impl AdministratorSpec {
    fn default_username() -> String {
        "admin".to_string()
    }

    fn default_first_name() -> String {
        "Superset".to_string()
    }

    fn default_last_name() -> String {
        "Admin".to_string()
    }

    fn default_email() -> String {
        "admin@superset.com".to_string()
    }

    fn default_password() -> String {
        "admin".to_string()
    }
}

impl Default for AdministratorSpec {
    fn default() -> Self {
        Self {
            username: Self::default_username(),
            first_name: Self::default_first_name(),
            last_name: Self::default_last_name(),
            email: Self::default_email(),
            password: Self::default_password(),
            exist_secret: None,
        }
    }
}

/// The key Flask signs sessions with.
#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppSecretKeySpec {
    /// Name of a Secret containing `SUPERSET_SECRET_KEY`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exist_secret: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_key: Option<String>,
}

impl AppSecretKeySpec {
    pub const SECRET_KEY: &'static str = "SUPERSET_SECRET_KEY";
}

#[derive(Clone, Debug, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationSpec {
    /// Name of an `AuthenticationClass` with an `ldap` or `oidc` provider.
    pub authentication_class: String,

    /// Required for `oidc` providers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oidc: Option<OidcSpec>,

    /// Whether users unknown to Superset are registered on their first login.
    #[serde(default = "AuthenticationSpec::default_user_registration")]
    pub user_registration: bool,

    /// The role given to self registered users.
    #[serde(default = "AuthenticationSpec::default_user_registration_role")]
    pub user_registration_role: String,

    #[serde(default)]
    pub sync_roles_at: SyncRolesAt,
}

impl AuthenticationSpec {
    const fn default_user_registration() -> bool {
        true
    }

    fn default_user_registration_role() -> String {
        "Public".to_string()
    }
}

#[derive(Clone, Debug, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OidcSpec {
    /// Name of a Secret with the keys `CLIENT_ID` and `CLIENT_SECRET`.
    pub client_credentials_secret: String,

    #[serde(default)]
    pub extra_scopes: Vec<String>,
}

/// When the roles of a user are synchronized with the identity provider.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
pub enum SyncRolesAt {
    #[default]
    Registration,
    Login,
}

impl SyncRolesAt {
    /// The value of `AUTH_ROLES_SYNC_AT_LOGIN`.
    pub fn at_login(self) -> bool {
        matches!(self, Self::Login)
    }
}

#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngressSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    #[serde(default = "IngressSpec::default_path")]
    pub path: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingress_class_name: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

impl IngressSpec {
    fn default_path() -> String {
        "/".to_string()
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;

    #[test]
    fn defaults() {
        let config: ClusterConfigSpec = serde_yaml::from_str(indoc! {"
            database:
              reference: superset-db
            redis:
              host: redis
            authentication:
              authenticationClass: openldap
            ingress:
              host: superset.example.com
        "})
        .expect("valid cluster config");

        assert_eq!(config.redis.port, 6379);
        assert_eq!(config.redis.db, 1);
        assert_eq!(config.redis.celery_db, 0);
        assert_eq!(config.redis.proto, "redis");
        assert_eq!(config.administrator, AdministratorSpec::default());

        let authentication = config.authentication.expect("authentication is set");
        assert!(authentication.user_registration);
        assert_eq!(authentication.user_registration_role, "Public");
        assert!(!authentication.sync_roles_at.at_login());

        assert_eq!(config.ingress.expect("ingress is set").path, "/");
        assert!(config.init_job);
    }

    #[test]
    fn inline_database_defaults() {
        let database: DatabaseSpec = serde_yaml::from_str(indoc! {"
            inline:
              host: postgres
              databaseName: superset
              username: superset
              password: superset
        "})
        .expect("valid database config");

        let inline = database.inline.expect("inline is set");
        assert_eq!(inline.driver, "postgresql");
        assert_eq!(inline.port, 5432);
    }
}
