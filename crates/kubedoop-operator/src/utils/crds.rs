use schemars::{Schema, SchemaGenerator, json_schema};

/// A schema accepting any object, for embedded Kubernetes types like pod overrides whose full
/// schema would bloat the CRD.
pub fn raw_object_schema(_: &mut SchemaGenerator) -> Schema {
    json_schema!({
        "type": "object",
        "x-kubernetes-preserve-unknown-fields": true,
    })
}

#[cfg(test)]
mod tests {
    use indoc::indoc;
    use k8s_openapi::api::core::v1::PodTemplateSpec;
    use schemars::JsonSchema;
    use serde::{Deserialize, Serialize};

    use super::*;

    #[derive(Clone, Debug, Default, Deserialize, JsonSchema, PartialEq, Serialize)]
    #[serde(rename_all = "camelCase")]
    struct Test {
        #[schemars(schema_with = "raw_object_schema")]
        pub pod_overrides: PodTemplateSpec,
    }

    #[test]
    fn pod_overrides_accept_any_pod_template() {
        let input = indoc! {r#"
          podOverrides:
            spec:
              tolerations:
                - key: "key1"
                  operator: "Equal"
                  value: "value1"
                  effect: "NoSchedule"
        "#};

        let test: Test = serde_yaml::from_str(input).expect("valid pod overrides");
        let tolerations = test
            .pod_overrides
            .spec
            .and_then(|spec| spec.tolerations)
            .expect("tolerations are set");
        assert_eq!(tolerations[0].key.as_deref(), Some("key1"));
    }

    #[test]
    fn schema_preserves_unknown_fields() {
        let schema = serde_json::to_value(schemars::schema_for!(Test)).expect("serializable");
        assert_eq!(
            schema["properties"]["podOverrides"]["x-kubernetes-preserve-unknown-fields"],
            serde_json::json!(true)
        );
    }
}
