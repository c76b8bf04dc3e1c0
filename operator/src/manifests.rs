use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{StatefulSet, StatefulSetSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, PersistentVolumeClaim, PersistentVolumeClaimSpec,
    PersistentVolumeClaimVolumeSource, PodSpec, PodTemplateSpec, ResourceRequirements, Secret,
    Service, ServicePort, ServiceSpec, Volume, VolumeMount,
};
use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule, IngressServiceBackend,
    IngressSpec, IngressTLS, ServiceBackendPort,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, OwnerReference};
use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::ObjectMeta;
use kube::ResourceExt;
use session_operator_types::{ChildKey, JupyterServer};

use crate::labels::LabelPolicy;
use crate::Error;

const MAIN_CONTAINER_NAME: &str = "session";
const DEFAULT_IMAGE: &str = "jupyter/minimal-notebook:latest";
const NOTEBOOK_PORT: i32 = 8888;

pub enum ChildManifest {
    Service(Service),
    Ingress(Ingress),
    StatefulSet(StatefulSet),
    ConfigMap(ConfigMap),
    Secret(Secret),
    Pvc(PersistentVolumeClaim),
}

impl ChildManifest {
    pub fn key(&self) -> ChildKey {
        match self {
            ChildManifest::Service(_) => ChildKey::Service,
            ChildManifest::Ingress(_) => ChildKey::Ingress,
            ChildManifest::StatefulSet(_) => ChildKey::Statefulset,
            ChildManifest::ConfigMap(_) => ChildKey::Configmap,
            ChildManifest::Secret(_) => ChildKey::Secret,
            ChildManifest::Pvc(_) => ChildKey::Pvc,
        }
    }
}

/// Builds every child manifest for a parent. Each manifest carries the
/// canonical label set and an owner reference back to the parent, so
/// garbage collection and the child-event ownership filter both work
/// without any extra bookkeeping.
pub fn build_all(
    parent: &JupyterServer,
    policy: &LabelPolicy,
    owner_ref: &OwnerReference,
) -> Result<Vec<ChildManifest>, Error> {
    let name = parent.name_any();
    let namespace = parent
        .namespace()
        .ok_or_else(|| Error::UserInput("JupyterServer is missing metadata.namespace".into()))?;
    let parent_uid = parent.uid().unwrap_or_default();
    let parent_labels = parent.labels().clone().into_iter().collect::<BTreeMap<_, _>>();

    let mut children = vec![
        ChildManifest::Service(build_service(&name, &namespace, parent, policy, &parent_labels, &parent_uid, owner_ref)),
        ChildManifest::ConfigMap(build_configmap(&name, &namespace, policy, &parent_labels, &parent_uid, owner_ref)),
        ChildManifest::Secret(build_secret(&name, &namespace, parent, policy, &parent_labels, &parent_uid, owner_ref)),
        ChildManifest::StatefulSet(build_statefulset(&name, &namespace, parent, policy, &parent_labels, &parent_uid, owner_ref)),
    ];

    if parent.spec.routing.host.is_some() {
        children.push(ChildManifest::Ingress(build_ingress(
            &name, &namespace, parent, policy, &parent_labels, &parent_uid, owner_ref,
        )));
    }

    if parent.spec.storage.pvc.enabled {
        children.push(ChildManifest::Pvc(build_pvc(
            &name, &namespace, parent, policy, &parent_labels, &parent_uid, owner_ref,
        )));
    }

    Ok(children)
}

fn child_meta(
    name: String,
    namespace: &str,
    key: ChildKey,
    policy: &LabelPolicy,
    parent_labels: &BTreeMap<String, String>,
    parent_name: &str,
    parent_uid: &str,
    owner_ref: &OwnerReference,
) -> ObjectMeta {
    ObjectMeta {
        name: Some(name),
        namespace: Some(namespace.to_string()),
        labels: Some(policy.labels_for(parent_labels, parent_uid, parent_name, Some(key), false)),
        owner_references: Some(vec![owner_ref.clone()]),
        ..Default::default()
    }
}

fn build_service(
    name: &str,
    namespace: &str,
    _parent: &JupyterServer,
    policy: &LabelPolicy,
    parent_labels: &BTreeMap<String, String>,
    parent_uid: &str,
    owner_ref: &OwnerReference,
) -> Service {
    let mut selector = BTreeMap::new();
    selector.insert(policy.main_pod_key(), "true".to_string());
    selector.insert(policy.parent_name_key(), name.to_string());
    Service {
        metadata: child_meta(name.to_string(), namespace, ChildKey::Service, policy, parent_labels, name, parent_uid, owner_ref),
        spec: Some(ServiceSpec {
            selector: Some(selector),
            ports: Some(vec![ServicePort {
                name: Some("notebook".into()),
                port: NOTEBOOK_PORT,
                target_port: Some(k8s_openapi::apimachinery::pkg::util::intstr::IntOrString::Int(NOTEBOOK_PORT)),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        status: None,
    }
}

fn build_ingress(
    name: &str,
    namespace: &str,
    parent: &JupyterServer,
    policy: &LabelPolicy,
    parent_labels: &BTreeMap<String, String>,
    parent_uid: &str,
    owner_ref: &OwnerReference,
) -> Ingress {
    let routing = &parent.spec.routing;
    let host = routing.host.clone();
    let path = routing.path.clone().unwrap_or_else(|| "/".to_string());

    let backend = IngressBackend {
        service: Some(IngressServiceBackend {
            name: name.to_string(),
            port: Some(ServiceBackendPort { name: Some("notebook".into()), ..Default::default() }),
        }),
        ..Default::default()
    };

    let rule = IngressRule {
        host: host.clone(),
        http: Some(HTTPIngressRuleValue {
            paths: vec![HTTPIngressPath {
                path: Some(path),
                path_type: "Prefix".to_string(),
                backend,
            }],
        }),
    };

    let tls = if routing.tls.enabled {
        host.clone().map(|h| vec![IngressTLS { hosts: Some(vec![h]), secret_name: None }])
    } else {
        None
    };

    let mut annotations = routing.ingress_annotations.clone();
    if annotations.is_empty() {
        annotations = BTreeMap::new();
    }

    let mut meta = child_meta(name.to_string(), namespace, ChildKey::Ingress, policy, parent_labels, name, parent_uid, owner_ref);
    if !annotations.is_empty() {
        meta.annotations = Some(annotations);
    }

    Ingress {
        metadata: meta,
        spec: Some(IngressSpec { rules: Some(vec![rule]), tls, ..Default::default() }),
        status: None,
    }
}

fn build_configmap(
    name: &str,
    namespace: &str,
    policy: &LabelPolicy,
    parent_labels: &BTreeMap<String, String>,
    parent_uid: &str,
    owner_ref: &OwnerReference,
) -> ConfigMap {
    ConfigMap {
        metadata: child_meta(name.to_string(), namespace, ChildKey::Configmap, policy, parent_labels, name, parent_uid, owner_ref),
        data: Some(BTreeMap::new()),
        ..Default::default()
    }
}

fn build_secret(
    name: &str,
    namespace: &str,
    parent: &JupyterServer,
    policy: &LabelPolicy,
    parent_labels: &BTreeMap<String, String>,
    parent_uid: &str,
    owner_ref: &OwnerReference,
) -> Secret {
    let mut string_data = BTreeMap::new();
    if let Some(token) = &parent.spec.auth.token {
        string_data.insert("token".to_string(), token.clone());
    }
    Secret {
        metadata: child_meta(name.to_string(), namespace, ChildKey::Secret, policy, parent_labels, name, parent_uid, owner_ref),
        string_data: Some(string_data),
        ..Default::default()
    }
}

fn build_pvc(
    name: &str,
    namespace: &str,
    parent: &JupyterServer,
    policy: &LabelPolicy,
    parent_labels: &BTreeMap<String, String>,
    parent_uid: &str,
    owner_ref: &OwnerReference,
) -> PersistentVolumeClaim {
    let mut requests = BTreeMap::new();
    let size = parent.spec.storage.size.clone().unwrap_or_else(|| "1Gi".to_string());
    requests.insert("storage".to_string(), Quantity(size));

    PersistentVolumeClaim {
        metadata: child_meta(name.to_string(), namespace, ChildKey::Pvc, policy, parent_labels, name, parent_uid, owner_ref),
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(vec!["ReadWriteOnce".to_string()]),
            storage_class_name: parent.spec.storage.pvc.storage_class_name.clone(),
            resources: Some(k8s_openapi::api::core::v1::VolumeResourceRequirements {
                requests: Some(requests),
                ..Default::default()
            }),
            ..Default::default()
        }),
        status: None,
    }
}

fn build_statefulset(
    name: &str,
    namespace: &str,
    parent: &JupyterServer,
    policy: &LabelPolicy,
    parent_labels: &BTreeMap<String, String>,
    parent_uid: &str,
    owner_ref: &OwnerReference,
) -> StatefulSet {
    let image = parent.spec.jupyter_server.image.clone().unwrap_or_else(|| DEFAULT_IMAGE.to_string());

    let mut pod_labels = policy.labels_for(parent_labels, parent_uid, name, None, true);
    let mut selector_labels = BTreeMap::new();
    selector_labels.insert(policy.main_pod_key(), "true".to_string());
    selector_labels.insert(policy.parent_name_key(), name.to_string());

    let resources = build_resource_requirements(&parent.spec.jupyter_server.resources);

    let mut volume_mounts = vec![];
    let mut volumes = vec![];
    if parent.spec.storage.pvc.enabled {
        volume_mounts.push(VolumeMount { name: "workspace".into(), mount_path: "/home/jovyan/work".into(), ..Default::default() });
    } else {
        volumes.push(Volume { name: "workspace".into(), empty_dir: Some(Default::default()), ..Default::default() });
        volume_mounts.push(VolumeMount { name: "workspace".into(), mount_path: "/home/jovyan/work".into(), ..Default::default() });
    }

    let container = Container {
        name: MAIN_CONTAINER_NAME.to_string(),
        image: Some(image),
        ports: Some(vec![ContainerPort { container_port: NOTEBOOK_PORT, ..Default::default() }]),
        resources: Some(resources),
        volume_mounts: Some(volume_mounts),
        env_from: Some(vec![k8s_openapi::api::core::v1::EnvFromSource {
            secret_ref: Some(k8s_openapi::api::core::v1::SecretEnvSource { name: name.to_string(), ..Default::default() }),
            ..Default::default()
        }]),
        ..Default::default()
    };

    pod_labels.extend(selector_labels.clone());

    let volume_claim_templates = if parent.spec.storage.pvc.enabled {
        Some(vec![PersistentVolumeClaim {
            metadata: ObjectMeta { name: Some("workspace".to_string()), ..Default::default() },
            spec: Some(PersistentVolumeClaimSpec {
                access_modes: Some(vec!["ReadWriteOnce".to_string()]),
                storage_class_name: parent.spec.storage.pvc.storage_class_name.clone(),
                resources: Some(k8s_openapi::api::core::v1::VolumeResourceRequirements {
                    requests: Some({
                        let mut m = BTreeMap::new();
                        m.insert("storage".to_string(), Quantity(parent.spec.storage.size.clone().unwrap_or_else(|| "1Gi".to_string())));
                        m
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            status: None,
        }])
    } else {
        None
    };

    StatefulSet {
        metadata: child_meta(name.to_string(), namespace, ChildKey::Statefulset, policy, parent_labels, name, parent_uid, owner_ref),
        spec: Some(StatefulSetSpec {
            replicas: Some(if parent.spec.jupyter_server.hibernated == Some(true) { 0 } else { 1 }),
            service_name: name.to_string(),
            selector: LabelSelector { match_labels: Some(selector_labels), ..Default::default() },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta { labels: Some(pod_labels), ..Default::default() }),
                spec: Some(PodSpec {
                    containers: vec![container],
                    volumes: if volumes.is_empty() { None } else { Some(volumes) },
                    ..Default::default()
                }),
            },
            volume_claim_templates,
            ..Default::default()
        }),
        status: None,
    }
}

fn build_resource_requirements(shape: &session_operator_types::JupyterServerResources) -> ResourceRequirements {
    ResourceRequirements {
        requests: shape.requests.as_ref().map(resource_map),
        limits: shape.limits.as_ref().map(resource_map),
        ..Default::default()
    }
}

fn resource_map(shape: &session_operator_types::ResourceShape) -> BTreeMap<String, Quantity> {
    let mut map = BTreeMap::new();
    if let Some(cpu) = &shape.cpu {
        map.insert("cpu".to_string(), Quantity(cpu.clone()));
    }
    if let Some(memory) = &shape.memory {
        map.insert("memory".to_string(), Quantity(memory.clone()));
    }
    if let Some(ephemeral) = &shape.ephemeral_storage {
        map.insert("ephemeral-storage".to_string(), Quantity(ephemeral.clone()));
    }
    if let Some(gpu) = &shape.nvidia_gpu {
        map.insert("nvidia.com/gpu".to_string(), Quantity(gpu.clone()));
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use session_operator_types::{JupyterServerResources, ResourceShape};

    #[test]
    fn resource_map_includes_gpu_when_present() {
        let shape = ResourceShape {
            cpu: Some("1".into()),
            memory: Some("2Gi".into()),
            ephemeral_storage: None,
            nvidia_gpu: Some("1".into()),
        };
        let map = resource_map(&shape);
        assert_eq!(map.get("nvidia.com/gpu"), Some(&Quantity("1".into())));
        assert!(!map.contains_key("ephemeral-storage"));
    }

    #[test]
    fn requirements_empty_when_no_shape_set() {
        let resources = JupyterServerResources::default();
        let requirements = build_resource_requirements(&resources);
        assert!(requirements.requests.is_none());
        assert!(requirements.limits.is_none());
    }
}
