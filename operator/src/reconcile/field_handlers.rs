use k8s_openapi::api::apps::v1::StatefulSet;
use kube::Client;
use serde_json::json;
use session_operator_types::JupyterServerResources;

use crate::reconcile::patch::merge_patch_spec;
use crate::Error;

/// `spec.jupyterServer.hibernated` handler: true scales the StatefulSet to
/// zero replicas, false scales it back to one. A missing field is a no-op
/// rather than defaulting to either extreme — the culler is the only
/// other writer of this field and always sets it explicitly.
pub async fn on_hibernated_changed(
    client: &Client,
    namespace: &str,
    statefulset_name: &str,
    hibernated: Option<bool>,
) -> Result<(), Error> {
    let Some(hibernated) = hibernated else { return Ok(()) };
    let replicas = if hibernated { 0 } else { 1 };
    let patch = json!({"spec": {"replicas": replicas}});
    merge_patch_spec::<StatefulSet>(client, namespace, statefulset_name, patch).await
}

/// `spec.jupyterServer.resources` handler: patches the main container's
/// resource requests/limits on the StatefulSet's pod template.
pub async fn on_resources_changed(
    client: &Client,
    namespace: &str,
    statefulset_name: &str,
    main_container_name: &str,
    resources: &JupyterServerResources,
) -> Result<(), Error> {
    let mut shape = json!({});
    if let Some(requests) = &resources.requests {
        shape["requests"] = resource_shape_json(requests);
    }
    if let Some(limits) = &resources.limits {
        shape["limits"] = resource_shape_json(limits);
    }

    let patch = json!({
        "spec": {
            "template": {
                "spec": {
                    "containers": [
                        {"name": main_container_name, "resources": shape}
                    ]
                }
            }
        }
    });
    merge_patch_spec::<StatefulSet>(client, namespace, statefulset_name, patch).await
}

fn resource_shape_json(shape: &session_operator_types::ResourceShape) -> serde_json::Value {
    let mut map = serde_json::Map::new();
    if let Some(cpu) = &shape.cpu {
        map.insert("cpu".into(), json!(cpu));
    }
    if let Some(memory) = &shape.memory {
        map.insert("memory".into(), json!(memory));
    }
    if let Some(ephemeral) = &shape.ephemeral_storage {
        map.insert("ephemeral-storage".into(), json!(ephemeral));
    }
    if let Some(gpu) = &shape.nvidia_gpu {
        map.insert("nvidia.com/gpu".into(), json!(gpu));
    }
    serde_json::Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use session_operator_types::ResourceShape;

    #[test]
    fn resource_shape_only_includes_set_fields() {
        let shape = ResourceShape { cpu: Some("500m".into()), memory: None, ephemeral_storage: None, nvidia_gpu: None };
        let value = resource_shape_json(&shape);
        assert_eq!(value["cpu"], "500m");
        assert!(value.get("memory").is_none());
    }
}
