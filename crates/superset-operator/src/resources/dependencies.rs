//! The init container holding a pod back until the metadata database and Redis accept
//! connections. The bootstrap job and every role group pod start with it.
use kubedoop_operator::{
    builder::pod::container::ContainerBuilder, k8s_openapi::api::core::v1::Container,
};
use snafu::ResultExt;

use super::{BuildContainerSnafu, ClusterContext, Result};

pub const WAIT_CONTAINER_NAME: &str = "wait-for-postgres-redis";
const WAIT_IMAGE: &str = "apache/superset:dockerize";

/// Seconds `dockerize` waits for the database and Redis.
const WAIT_TIMEOUT: &str = "120s";

/// The hosts and ports are read from the env Secret, which also holds the resolved database
/// connection.
pub fn wait_for_dependencies(ctx: &ClusterContext) -> Result<Container> {
    let container = ContainerBuilder::new(WAIT_CONTAINER_NAME)
        .context(BuildContainerSnafu {
            name: WAIT_CONTAINER_NAME,
        })?
        .image(WAIT_IMAGE)
        .image_pull_policy(&ctx.image.image_pull_policy)
        .command(vec!["/bin/sh".to_string(), "-c".to_string()])
        .args(vec![format!(
            r#"dockerize -wait "tcp://$DB_HOST:$DB_PORT" -wait "tcp://$REDIS_HOST:$REDIS_PORT" -timeout {WAIT_TIMEOUT}"#
        )])
        .add_env_from_secret(&ctx.config.env_secret_name)
        .build();
    Ok(container)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::test_support::{MINIMAL_CLUSTER, cluster, cluster_context};

    #[test]
    fn waits_for_database_and_redis() {
        let ctx = cluster_context(&cluster(MINIMAL_CLUSTER));
        let wait = wait_for_dependencies(&ctx).expect("container builds");

        assert_eq!(wait.name, WAIT_CONTAINER_NAME);
        assert_eq!(wait.image.as_deref(), Some(WAIT_IMAGE));
        let args = wait.args.clone().unwrap_or_default().join(" ");
        assert_eq!(
            args,
            r#"dockerize -wait "tcp://$DB_HOST:$DB_PORT" -wait "tcp://$REDIS_HOST:$REDIS_PORT" -timeout 120s"#
        );
        assert_eq!(
            wait.env_from
                .unwrap_or_default()
                .first()
                .and_then(|env| env.secret_ref.as_ref())
                .map(|secret| secret.name.as_str()),
            Some("simple-env")
        );
    }
}
