use k8s_openapi::api::core::v1::LocalObjectReference;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::AsRefStr;

pub const KUBEDOOP_DOCKER_REPO: &str = "quay.io/zncdatadev";

/// Specify which image to use, the easiest way is to only configure the `productVersion`.
/// You can also configure a custom image registry to pull from, as well as completely custom
/// images.
#[derive(Clone, Debug, Default, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductImage {
    /// Overwrite the docker image.
    /// Specify the full docker image name, e.g. `quay.io/zncdatadev/superset:4.0.2-kubedoop0.0.0-dev`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom: Option<String>,

    /// Name of the docker repo, e.g. `quay.io/zncdatadev`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,

    /// Kubedoop version of the product, e.g. `0.0.0-dev`.
    /// If not specified, the operator will use its own version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubedoop_version: Option<String>,

    /// Version of the product, e.g. `4.0.2`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_version: Option<String>,

    /// [Pull policy](https://kubernetes.io/docs/concepts/containers/images/#image-pull-policy)
    /// used when pulling the image.
    #[serde(default)]
    pub pull_policy: PullPolicy,

    /// [Image pull secrets](https://kubernetes.io/docs/concepts/containers/images/#specifying-imagepullsecrets-on-a-pod)
    /// to pull images from a private registry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_secrets: Option<Vec<LocalObjectReference>>,
}

#[derive(AsRefStr, Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
pub enum PullPolicy {
    #[default]
    IfNotPresent,
    Always,
    Never,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedProductImage {
    /// Version of the product, e.g. `4.0.2`.
    pub product_version: String,

    /// App version as used for the `app.kubernetes.io/version` label.
    pub app_version_label: String,

    /// Image to be used for the product image, e.g. `quay.io/zncdatadev/superset:4.0.2-kubedoop0.0.0-dev`
    pub image: String,

    pub image_pull_policy: String,

    pub pull_secrets: Option<Vec<LocalObjectReference>>,
}

impl ProductImage {
    /// `image_base_name` is the name of the image in the registry, e.g. `superset`.
    /// `default_product_version` is used unless the user configured one.
    /// `operator_version` is used as Kubedoop version unless the user configured one.
    pub fn resolve(
        &self,
        image_base_name: &str,
        default_product_version: &str,
        operator_version: &str,
    ) -> ResolvedProductImage {
        let image_pull_policy = self.pull_policy.as_ref().to_string();
        let pull_secrets = self.pull_secrets.clone();
        let product_version = self
            .product_version
            .clone()
            .unwrap_or_else(|| default_product_version.to_string());

        if let Some(custom) = &self.custom {
            let image_tag = custom
                .split_once(':')
                .map_or("latest", |(_, tag)| tag)
                .replace(['@', ':'], "-");
            let app_version_label = format!("{product_version}-{image_tag}");
            return ResolvedProductImage {
                product_version,
                app_version_label,
                image: custom.clone(),
                image_pull_policy,
                pull_secrets,
            };
        }

        let repo = self.repo.as_deref().unwrap_or(KUBEDOOP_DOCKER_REPO);
        let kubedoop_version = self.kubedoop_version.as_deref().unwrap_or(operator_version);
        let app_version_label = format!("{product_version}-kubedoop{kubedoop_version}");
        ResolvedProductImage {
            image: format!("{repo}/{image_base_name}:{app_version_label}"),
            product_version,
            app_version_label,
            image_pull_policy,
            pull_secrets,
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::defaults(
        "",
        "quay.io/zncdatadev/superset:4.0.2-kubedoop0.0.0-dev",
        "4.0.2-kubedoop0.0.0-dev",
        "IfNotPresent"
    )]
    #[case::product_version(
        "productVersion: 3.1.0",
        "quay.io/zncdatadev/superset:3.1.0-kubedoop0.0.0-dev",
        "3.1.0-kubedoop0.0.0-dev",
        "IfNotPresent"
    )]
    #[case::repo_and_kubedoop_version(
        "{repo: my.corp/kubedoop, kubedoopVersion: 0.2.0, pullPolicy: Always}",
        "my.corp/kubedoop/superset:4.0.2-kubedoop0.2.0",
        "4.0.2-kubedoop0.2.0",
        "Always"
    )]
    #[case::custom(
        "{custom: my.corp/superset:latest-and-greatest, productVersion: 4.1.0}",
        "my.corp/superset:latest-and-greatest",
        "4.1.0-latest-and-greatest",
        "IfNotPresent"
    )]
    #[case::custom_without_tag(
        "custom: my.corp/superset",
        "my.corp/superset",
        "4.0.2-latest",
        "IfNotPresent"
    )]
    fn resolve(
        #[case] input: &str,
        #[case] expected_image: &str,
        #[case] expected_label: &str,
        #[case] expected_pull_policy: &str,
    ) {
        let image: ProductImage = if input.is_empty() {
            ProductImage::default()
        } else {
            serde_yaml::from_str(input).expect("valid yaml")
        };
        let resolved = image.resolve("superset", "4.0.2", "0.0.0-dev");

        assert_eq!(resolved.image, expected_image);
        assert_eq!(resolved.app_version_label, expected_label);
        assert_eq!(resolved.image_pull_policy, expected_pull_policy);
    }
}
