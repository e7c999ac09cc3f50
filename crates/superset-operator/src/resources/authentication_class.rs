//! Resolves the `AuthenticationClass` referenced by a cluster into the Flask-AppBuilder settings,
//! volumes and environment the web servers need to log users in.
use indoc::formatdoc;
use kubedoop_operator::{
    builder::pod::volume::{SecretOperatorVolumeSourceBuilder, VolumeBuilder},
    client::ResourceClient,
    crd::authentication::{
        AuthenticationClass, AuthenticationProvider, LdapProvider, OidcProvider,
        SecretClassVolume,
    },
    k8s_openapi::api::core::v1::Volume,
};
use snafu::{OptionExt, ResultExt};
use tracing::debug;

use super::{
    FetchAuthenticationClassSnafu, IdentityProviderUrlSnafu, MissingOidcCredentialsSnafu, Result,
    SECRET_DIR, UnsupportedAuthenticationProviderSnafu,
};
use crate::crd::{AuthenticationSpec, OidcSpec};

pub const LDAP_BIND_CREDENTIALS_VOLUME_NAME: &str = "ldap-bind-credentials";
const LDAP_BIND_USER_FILE: &str = "user";
const LDAP_BIND_PASSWORD_FILE: &str = "password";

const DEFAULT_OIDC_SCOPES: [&str; 3] = ["openid", "email", "profile"];
const DEFAULT_OIDC_PROVIDER_NAME: &str = "oidc";

/// An authentication spec together with the provider of its `AuthenticationClass`.
#[derive(Clone, Debug, PartialEq)]
pub enum ResolvedAuthentication {
    Ldap {
        spec: AuthenticationSpec,
        provider: LdapProvider,
    },
    Oidc {
        spec: AuthenticationSpec,
        oidc: OidcSpec,
        provider: OidcProvider,
    },
}

impl ResolvedAuthentication {
    /// Fetches the referenced `AuthenticationClass`, `None` if authentication is not configured.
    pub async fn fetch(
        client: &ResourceClient,
        spec: Option<&AuthenticationSpec>,
    ) -> Result<Option<Self>> {
        let Some(spec) = spec else {
            return Ok(None);
        };
        let name = &spec.authentication_class;
        debug!(authentication_class = name, "resolving AuthenticationClass");
        let class = client
            .client()
            .get_cluster_scoped::<AuthenticationClass>(name)
            .await
            .context(FetchAuthenticationClassSnafu { name })?;
        Self::new(spec, &class).map(Some)
    }

    /// Only LDAP and OIDC providers are supported. OIDC additionally needs client credentials.
    pub fn new(spec: &AuthenticationSpec, class: &AuthenticationClass) -> Result<Self> {
        let name = &spec.authentication_class;
        match &class.spec.provider {
            AuthenticationProvider::Ldap(provider) => Ok(Self::Ldap {
                spec: spec.clone(),
                provider: provider.clone(),
            }),
            AuthenticationProvider::Oidc(provider) => Ok(Self::Oidc {
                oidc: spec
                    .oidc
                    .clone()
                    .context(MissingOidcCredentialsSnafu { name })?,
                spec: spec.clone(),
                provider: provider.clone(),
            }),
            provider => UnsupportedAuthenticationProviderSnafu {
                name,
                provider: provider.to_string(),
            }
            .fail(),
        }
    }

    /// The section appended to `superset_config.py`.
    pub fn superset_config(&self) -> Result<String> {
        match self {
            Self::Ldap { spec, provider } => ldap_config(spec, provider),
            Self::Oidc {
                spec,
                oidc,
                provider,
            } => oidc_config(spec, oidc, provider),
        }
    }

    /// The secret operator volume holding the LDAP bind credentials and the directory it is
    /// mounted at.
    pub fn bind_credentials_volume(&self) -> Option<(Volume, String)> {
        let Self::Ldap { provider, .. } = self else {
            return None;
        };
        let credentials = provider.bind_credentials.as_ref()?;
        Some((
            bind_credentials_volume(credentials),
            bind_credentials_dir(credentials),
        ))
    }

    /// The Secret with `CLIENT_ID` and `CLIENT_SECRET`, exposed to the web servers as environment.
    pub fn client_credentials_secret(&self) -> Option<&str> {
        match self {
            Self::Oidc { oidc, .. } => Some(&oidc.client_credentials_secret),
            Self::Ldap { .. } => None,
        }
    }
}

fn bind_credentials_dir(credentials: &SecretClassVolume) -> String {
    format!("{SECRET_DIR}/{}", credentials.secret_class)
}

fn bind_credentials_volume(credentials: &SecretClassVolume) -> Volume {
    let mut source = SecretOperatorVolumeSourceBuilder::new(&credentials.secret_class);
    if let Some(scope) = &credentials.scope {
        if scope.node {
            source.with_node_scope();
        }
        if scope.pod {
            source.with_pod_scope();
        }
        for service in &scope.services {
            source.with_service_scope(service);
        }
    }

    VolumeBuilder::new(LDAP_BIND_CREDENTIALS_VOLUME_NAME)
        .ephemeral(source.build())
        .build()
}

fn python_bool(value: bool) -> &'static str {
    if value { "True" } else { "False" }
}

fn ldap_config(spec: &AuthenticationSpec, provider: &LdapProvider) -> Result<String> {
    let server = provider.endpoint_url().context(IdentityProviderUrlSnafu)?;
    let fields = &provider.ldap_field_names;

    let mut config = formatdoc! {"

        AUTH_TYPE = AUTH_LDAP
        AUTH_USER_REGISTRATION = {registration}
        AUTH_USER_REGISTRATION_ROLE = '{registration_role}'
        AUTH_ROLES_SYNC_AT_LOGIN = {sync_at_login}
        AUTH_LDAP_SERVER = '{server}'
        AUTH_LDAP_SEARCH = '{search_base}'
        AUTH_LDAP_SEARCH_FILTER = '{search_filter}'
        AUTH_LDAP_UID_FIELD = '{uid}'
        AUTH_LDAP_GROUP_FIELD = '{group}'
        AUTH_LDAP_FIRSTNAME_FIELD = '{given_name}'
        AUTH_LDAP_LASTNAME_FIELD = '{surname}'
        AUTH_LDAP_EMAIL_FIELD = '{email}'
        ",
        registration = python_bool(spec.user_registration),
        registration_role = spec.user_registration_role,
        sync_at_login = python_bool(spec.sync_roles_at.at_login()),
        server = server.as_str().trim_end_matches('/'),
        search_base = provider.search_base,
        search_filter = provider.search_filter,
        uid = fields.uid,
        group = fields.group,
        given_name = fields.given_name,
        surname = fields.surname,
        email = fields.email,
    };

    if let Some(credentials) = &provider.bind_credentials {
        let dir = bind_credentials_dir(credentials);
        config.push_str(&formatdoc! {"

            with open('{dir}/{LDAP_BIND_USER_FILE}', 'r') as f:
                AUTH_LDAP_BIND_USER = f.readline().strip()

            with open('{dir}/{LDAP_BIND_PASSWORD_FILE}', 'r') as f:
                AUTH_LDAP_BIND_PASSWORD = f.readline().strip()
            "});
    }

    Ok(config)
}

fn oidc_config(
    spec: &AuthenticationSpec,
    oidc: &OidcSpec,
    provider: &OidcProvider,
) -> Result<String> {
    let issuer = provider.issuer_url().context(IdentityProviderUrlSnafu)?;
    let issuer = issuer.as_str().trim_end_matches('/');

    let mut scopes = DEFAULT_OIDC_SCOPES
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>();
    for scope in provider.scopes.iter().chain(&oidc.extra_scopes) {
        if !scopes.contains(scope) {
            scopes.push(scope.clone());
        }
    }

    Ok(formatdoc! {"

        AUTH_TYPE = AUTH_OAUTH
        AUTH_USER_REGISTRATION = {registration}
        AUTH_USER_REGISTRATION_ROLE = '{registration_role}'
        AUTH_ROLES_SYNC_AT_LOGIN = {sync_at_login}
        OAUTH_PROVIDERS = [
            {{
                'name': '{name}',
                'token_key': 'access_token',
                'icon': 'fa-address-card',
                'remote_app': {{
                    'client_id': os.environ.get('CLIENT_ID'),
                    'client_secret': os.environ.get('CLIENT_SECRET'),
                    'client_kwargs': {{
                        'scope': '{scopes}'
                    }},
                    'api_base_url': '{issuer}/protocol/',
                    'server_metadata_url': '{issuer}/.well-known/openid-configuration',
                }},
            }},
        ]
        ",
        registration = python_bool(spec.user_registration),
        registration_role = spec.user_registration_role,
        sync_at_login = python_bool(spec.sync_roles_at.at_login()),
        name = provider
            .provider_hint
            .as_deref()
            .unwrap_or(DEFAULT_OIDC_PROVIDER_NAME),
        scopes = scopes.join(" "),
    })
}
