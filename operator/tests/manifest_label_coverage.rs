//! P1 (label coverage): every child manifest `build_all` produces carries
//! the canonical parent-uid/parent-name labels, and the main pod's pod
//! template carries `main-pod=true` without a `child-key`. Exercises
//! `manifests::build_all` + `labels::LabelPolicy` together the way a real
//! create-handler call composes them, without touching a cluster.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use rstest::rstest;
use session_operator::labels::LabelPolicy;
use session_operator::manifests::{self, ChildManifest};
use session_operator_types::{ChildKey, JupyterServer, JupyterServerSpec, RoutingSpec, StorageSpec, PvcSpec};

fn owner_ref(uid: &str) -> OwnerReference {
    OwnerReference {
        api_version: "amalthea.dev/v1alpha1".into(),
        kind: "JupyterServer".into(),
        name: "my-session".into(),
        uid: uid.into(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

fn parent(uid: &str, routing_host: Option<&str>, pvc_enabled: bool) -> JupyterServer {
    let mut p = JupyterServer::new(
        "my-session",
        session_operator_types::SessionServerSpec {
            jupyter_server: JupyterServerSpec::default(),
            routing: RoutingSpec { host: routing_host.map(String::from), ..Default::default() },
            storage: StorageSpec { pvc: PvcSpec { enabled: pvc_enabled, ..Default::default() }, ..Default::default() },
            ..Default::default()
        },
    );
    p.metadata.uid = Some(uid.to_string());
    p.metadata.namespace = Some("default".to_string());
    p
}

#[rstest]
#[case(None, false, 4)]
#[case(Some("notebook.example.com"), false, 5)]
#[case(Some("notebook.example.com"), true, 6)]
fn every_child_carries_parent_uid_and_name_labels(
    #[case] routing_host: Option<&str>,
    #[case] pvc_enabled: bool,
    #[case] expected_child_count: usize,
) {
    let parent = parent("uid-123", routing_host, pvc_enabled);
    let policy = LabelPolicy::new("amalthea.dev", BTreeMap::new(), "JupyterServer");
    let owner = owner_ref("uid-123");

    let children = manifests::build_all(&parent, &policy, &owner).expect("manifests build");
    assert_eq!(children.len(), expected_child_count);

    for child in &children {
        let labels = child_labels(child);
        assert_eq!(labels.get("amalthea.dev/parent-uid"), Some(&"uid-123".to_string()));
        assert_eq!(labels.get("amalthea.dev/parent-name"), Some(&"my-session".to_string()));
        assert_eq!(labels.get("amalthea.dev/child-key"), Some(&child.key().to_string()));
        assert!(!labels.contains_key("amalthea.dev/main-pod"));
    }
}

#[rstest]
fn statefulset_pod_template_is_the_main_pod_not_a_child() {
    let parent = parent("uid-123", None, false);
    let policy = LabelPolicy::new("amalthea.dev", BTreeMap::new(), "JupyterServer");
    let owner = owner_ref("uid-123");

    let children = manifests::build_all(&parent, &policy, &owner).expect("manifests build");
    let ChildManifest::StatefulSet(sts) = children
        .iter()
        .find(|c| c.key() == ChildKey::Statefulset)
        .expect("statefulset present")
    else {
        panic!("expected StatefulSet variant");
    };

    let pod_labels = sts
        .spec
        .as_ref()
        .and_then(|s| s.template.metadata.as_ref())
        .and_then(|m| m.labels.as_ref())
        .expect("pod template labels");
    assert_eq!(pod_labels.get("amalthea.dev/main-pod"), Some(&"true".to_string()));
    assert!(!pod_labels.contains_key("amalthea.dev/child-key"));

    let sts_labels = sts.metadata.labels.as_ref().expect("statefulset labels");
    assert_eq!(sts_labels.get("amalthea.dev/child-key"), Some(&"statefulset".to_string()));
}

fn child_labels(child: &ChildManifest) -> BTreeMap<String, String> {
    match child {
        ChildManifest::Service(o) => o.metadata.labels.clone(),
        ChildManifest::Ingress(o) => o.metadata.labels.clone(),
        ChildManifest::StatefulSet(o) => o.metadata.labels.clone(),
        ChildManifest::ConfigMap(o) => o.metadata.labels.clone(),
        ChildManifest::Secret(o) => o.metadata.labels.clone(),
        ChildManifest::Pvc(o) => o.metadata.labels.clone(),
    }
    .unwrap_or_default()
}
