use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use k8s_openapi::jiff::Timestamp;
use kube::{api::PostParams, Client, ResourceExt};
use serde_json::json;
use session_operator_common::annotations::Keys;
use session_operator_types::{ChildKey, JupyterServer};

use crate::labels::LabelPolicy;
use crate::manifests::{self, ChildManifest};
use crate::reconcile::patch::merge_patch_status;
use crate::Error;

/// Create handler: builds every child manifest, applies canonical labels
/// and owner-reference adoption, creates them, and records the result on
/// the parent — `state = Starting`, `startingSince = now`, the
/// `last-activity-date` annotation set to now, and each created child's
/// UID collected into `status.createdResources`. A 409 on create (the
/// child already exists from a prior partial run) is tolerated; the
/// reconciler isn't the sole source of truth for whether a child exists.
pub async fn create(
    client: &Client,
    parent: &JupyterServer,
    policy: &LabelPolicy,
    keys: &Keys,
) -> Result<(), Error> {
    let namespace = parent
        .namespace()
        .ok_or_else(|| Error::UserInput("JupyterServer is missing metadata.namespace".into()))?;
    let name = parent.name_any();
    let owner_ref = parent
        .controller_owner_ref(&())
        .ok_or_else(|| Error::UserInput("JupyterServer is missing uid; cannot set owner reference".into()))?;

    let children = manifests::build_all(parent, policy, &owner_ref)?;

    let mut created_resources = std::collections::BTreeMap::new();
    for child in &children {
        let uid = apply_child(client, &namespace, child).await?;
        created_resources.insert(child.key(), uid);
    }

    let now = Time(Timestamp::now());
    let status = json!({
        "state": "Starting",
        "startingSince": now,
        "createdResources": created_resources,
    });
    merge_patch_status::<JupyterServer>(client, &namespace, &name, status).await?;

    let mut annotations = std::collections::BTreeMap::new();
    annotations.insert(keys.last_activity_date(), now.0.to_string());
    let spec_patch = json!({"metadata": {"annotations": annotations}});
    crate::reconcile::patch::merge_patch_spec::<JupyterServer>(client, &namespace, &name, spec_patch).await
}

async fn apply_child(client: &Client, namespace: &str, child: &ChildManifest) -> Result<String, Error> {
    match child {
        ChildManifest::Service(svc) => create_or_get_uid(client, namespace, svc).await,
        ChildManifest::Ingress(ing) => create_or_get_uid(client, namespace, ing).await,
        ChildManifest::StatefulSet(sts) => create_or_get_uid(client, namespace, sts).await,
        ChildManifest::ConfigMap(cm) => create_or_get_uid(client, namespace, cm).await,
        ChildManifest::Secret(secret) => create_or_get_uid(client, namespace, secret).await,
        ChildManifest::Pvc(pvc) => create_or_get_uid(client, namespace, pvc).await,
    }
}

async fn create_or_get_uid<T>(client: &Client, namespace: &str, object: &T) -> Result<String, Error>
where
    T: Clone
        + std::fmt::Debug
        + serde::Serialize
        + serde::de::DeserializeOwned
        + kube::Resource<Scope = kube::core::NamespaceResourceScope>,
    <T as kube::Resource>::DynamicType: Default,
{
    let api: kube::Api<T> = kube::Api::namespaced(client.clone(), namespace);
    let name = object.meta().name.clone().unwrap_or_default();
    match api.create(&PostParams::default(), object).await {
        Ok(created) => Ok(created.meta().uid.clone().unwrap_or_default()),
        Err(kube::Error::Api(ae)) if ae.code == 409 => {
            let existing = api.get(&name).await.map_err(Error::from)?;
            Ok(existing.meta().uid.clone().unwrap_or_default())
        }
        Err(e) => Err(Error::from(e)),
    }
}

/// Delete handler: patches `status.state = Stopping` and leaves the rest
/// to owner-reference cascading garbage collection.
pub async fn delete(client: &Client, parent: &JupyterServer) -> Result<(), Error> {
    let namespace = parent
        .namespace()
        .ok_or_else(|| Error::UserInput("JupyterServer is missing metadata.namespace".into()))?;
    let name = parent.name_any();
    let status = json!({"state": "Stopping"});
    merge_patch_status::<JupyterServer>(client, &namespace, &name, status).await
}

pub fn child_keys_to_build(pvc_enabled: bool) -> Vec<ChildKey> {
    ChildKey::ALL
        .into_iter()
        .filter(|k| *k != ChildKey::Pvc || pvc_enabled)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pvc_omitted_when_disabled() {
        let keys = child_keys_to_build(false);
        assert!(!keys.contains(&ChildKey::Pvc));
    }

    #[test]
    fn pvc_included_when_enabled() {
        let keys = child_keys_to_build(true);
        assert!(keys.contains(&ChildKey::Pvc));
    }
}
