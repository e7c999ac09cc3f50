use const_format::concatcp;

/// The well-known Kubernetes app key prefix.
const K8S_APP_KEY_PREFIX: &str = "app.kubernetes.io/";

/// The Kubedoop-specific general key prefix.
const KUBEDOOP_KEY_PREFIX: &str = "kubedoop.dev/";

/// The well-known Kubernetes app name key `app.kubernetes.io/name`. It is used
/// to label the application with a name, e.g. `superset`.
pub const K8S_APP_NAME_KEY: &str = concatcp!(K8S_APP_KEY_PREFIX, "name");

/// The well-known Kubernetes app instance key `app.kubernetes.io/instance`. It
/// is used to identify the instance of an application, i.e. the name of the
/// owning cluster object.
pub const K8S_APP_INSTANCE_KEY: &str = concatcp!(K8S_APP_KEY_PREFIX, "instance");

/// The well-known Kubernetes app component key `app.kubernetes.io/component`.
/// Operators use the role name as the component.
pub const K8S_APP_COMPONENT_KEY: &str = concatcp!(K8S_APP_KEY_PREFIX, "component");

/// The well-known Kubernetes app managed-by key `app.kubernetes.io/managed-by`.
pub const K8S_APP_MANAGED_BY_KEY: &str = concatcp!(K8S_APP_KEY_PREFIX, "managed-by");

/// The role group key `app.kubernetes.io/role-group`.
pub const K8S_APP_ROLE_GROUP_KEY: &str = concatcp!(K8S_APP_KEY_PREFIX, "role-group");

/// The annotation holding the last desired state written by the operator. It is used to tell
/// server-defaulted fields apart from fields the operator owns.
pub const LAST_APPLIED_CONFIGURATION_KEY: &str =
    concatcp!(KUBEDOOP_KEY_PREFIX, "last-applied-configuration");
