//! The cluster scoped `AuthenticationClass`, describing an identity provider that product
//! clusters can reference by name.
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};
use url::Url;

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to build the URL of host {hostname:?}"))]
    ParseUrl {
        source: url::ParseError,
        hostname: String,
    },

    #[snafu(display("port {port} cannot be set on URL {url}"))]
    SetPort { url: String, port: u16 },
}

#[derive(Clone, CustomResource, Debug, Deserialize, JsonSchema, PartialEq, Serialize)]
#[kube(
    group = "authentication.kubedoop.dev",
    version = "v1alpha1",
    kind = "AuthenticationClass",
    plural = "authenticationclasses",
    doc = "An identity provider product clusters can use to authenticate users"
)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationClassSpec {
    pub provider: AuthenticationProvider,
}

#[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq, Serialize, strum::Display)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "lowercase")]
pub enum AuthenticationProvider {
    Ldap(LdapProvider),
    Oidc(OidcProvider),
    Static(StaticProvider),
    Tls(TlsProvider),
}

#[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LdapProvider {
    pub hostname: String,

    /// Defaults to 389.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// The base DN users are searched in.
    #[serde(default)]
    pub search_base: String,

    #[serde(default)]
    pub search_filter: String,

    #[serde(default)]
    pub ldap_field_names: LdapFieldNames,

    /// Credentials used to bind before searching, provided by the secret operator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind_credentials: Option<SecretClassVolume>,
}

impl LdapProvider {
    pub const DEFAULT_PORT: u16 = 389;

    /// `ldap://<hostname>:<port>`
    pub fn endpoint_url(&self) -> Result<Url> {
        build_url(
            "ldap",
            &self.hostname,
            self.port.unwrap_or(Self::DEFAULT_PORT),
            "",
        )
    }
}

/// The LDAP attributes user details are read from.
#[derive(Clone, Debug, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LdapFieldNames {
    #[serde(default = "LdapFieldNames::default_uid")]
    pub uid: String,

    #[serde(default = "LdapFieldNames::default_group")]
    pub group: String,

    #[serde(default = "LdapFieldNames::default_given_name")]
    pub given_name: String,

    #[serde(default = "LdapFieldNames::default_surname")]
    pub surname: String,

    #[serde(default = "LdapFieldNames::default_email")]
    pub email: String,
}

impl LdapFieldNames {
    fn default_uid() -> String {
        "uid".to_string()
    }

    fn default_group() -> String {
        "memberOf".to_string()
    }

    fn default_given_name() -> String {
        "givenName".to_string()
    }

    fn default_surname() -> String {
        "sn".to_string()
    }

    fn default_email() -> String {
        "mail".to_string()
    }
}

impl Default for LdapFieldNames {
    fn default() -> Self {
        Self {
            uid: Self::default_uid(),
            group: Self::default_group(),
            given_name: Self::default_given_name(),
            surname: Self::default_surname(),
            email: Self::default_email(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretClassVolume {
    pub secret_class: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<SecretClassVolumeScope>,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretClassVolumeScope {
    #[serde(default)]
    pub pod: bool,

    #[serde(default)]
    pub node: bool,

    #[serde(default)]
    pub services: Vec<String>,
}

#[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OidcProvider {
    pub hostname: String,

    /// Defaults to 80.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    #[serde(default = "OidcProvider::default_root_path")]
    pub root_path: String,

    /// The claim holding the user name, e.g. `preferred_username`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub principal_claim: Option<String>,

    /// Scopes always requested.
    #[serde(default)]
    pub scopes: Vec<String>,

    /// The kind of identity provider, e.g. `keycloak`. Used as the provider name in the login
    /// screen.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_hint: Option<String>,
}

impl OidcProvider {
    pub const DEFAULT_PORT: u16 = 80;

    fn default_root_path() -> String {
        "/".to_string()
    }

    /// `http://<hostname>:<port><root path>` without a trailing slash.
    pub fn issuer_url(&self) -> Result<Url> {
        build_url(
            "http",
            &self.hostname,
            self.port.unwrap_or(Self::DEFAULT_PORT),
            self.root_path.trim_end_matches('/'),
        )
    }
}

#[derive(Clone, Debug, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StaticProvider {
    pub user_credentials_secret: String,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TlsProvider {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_cert_secret_class: Option<String>,
}

fn build_url(scheme: &str, hostname: &str, port: u16, path: &str) -> Result<Url> {
    let mut url =
        Url::parse(&format!("{scheme}://{hostname}")).context(ParseUrlSnafu { hostname })?;
    url.set_port(Some(port)).map_err(|()| Error::SetPort {
        url: url.to_string(),
        port,
    })?;
    url.set_path(path);
    Ok(url)
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;

    #[test]
    fn deserialize_ldap_provider() {
        let spec: AuthenticationClassSpec = serde_yaml::from_str(indoc! {"
            provider:
              ldap:
                hostname: openldap.default.svc.cluster.local
                searchBase: ou=users,dc=example,dc=org
                bindCredentials:
                  secretClass: openldap-bind
        "})
        .expect("valid authentication class");

        let AuthenticationProvider::Ldap(ldap) = spec.provider else {
            unreachable!("provider is ldap");
        };
        assert_eq!(ldap.ldap_field_names, LdapFieldNames::default());
        assert_eq!(
            ldap.bind_credentials.clone().map(|credentials| credentials.secret_class),
            Some("openldap-bind".to_string())
        );
        assert_eq!(
            ldap.endpoint_url().expect("valid url").as_str(),
            "ldap://openldap.default.svc.cluster.local:389"
        );
    }

    #[test]
    fn oidc_issuer_url() {
        let spec: AuthenticationClassSpec = serde_yaml::from_str(indoc! {"
            provider:
              oidc:
                hostname: keycloak.default.svc.cluster.local
                port: 8080
                rootPath: /realms/kubedoop/
                providerHint: keycloak
        "})
        .expect("valid authentication class");

        let AuthenticationProvider::Oidc(oidc) = spec.provider else {
            unreachable!("provider is oidc");
        };
        assert_eq!(
            oidc.issuer_url().expect("valid url").as_str(),
            "http://keycloak.default.svc.cluster.local:8080/realms/kubedoop"
        );
    }

    #[test]
    fn provider_names() {
        let provider = AuthenticationProvider::Tls(TlsProvider::default());
        assert_eq!(provider.to_string(), "tls");
    }
}
