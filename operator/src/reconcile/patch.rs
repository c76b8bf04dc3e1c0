use std::fmt::Debug;

use kube::{
    api::{Patch, PatchParams, Resource},
    core::NamespaceResourceScope,
    Api, Client,
};
use serde::{de::DeserializeOwned, Serialize};

use crate::Error;

pub const FIELD_MANAGER: &str = "session-operator";

/// Diffs `before`/`after` and issues a JSON-Patch `status` subresource
/// write. A `NotFound` response is swallowed when `op` is `remove` (the
/// target is already gone, which counts as success); for `add`/`replace`
/// it is propagated, since the parent itself vanished mid-reconcile. A
/// `Conflict` is retried once per §5/§7's write discipline (see
/// [`retry_status_patch_once`]).
///
/// Grounded on the diff-then-apply shape the teacher uses for its own
/// status writes, generalized to accept an arbitrary before/after status
/// pair instead of a single mutation closure, since child-event and
/// parent-event handlers both need to diff two already-computed statuses.
pub async fn patch_status_json<T>(
    client: &Client,
    namespace: &str,
    name: &str,
    before: &serde_json::Value,
    after: &serde_json::Value,
) -> Result<(), Error>
where
    T: Clone + Resource<Scope = NamespaceResourceScope> + Serialize + DeserializeOwned + Debug,
    <T as Resource>::DynamicType: Default,
{
    let diff = json_patch::diff(before, after);
    if diff.0.is_empty() {
        return Ok(());
    }
    let api: Api<T> = Api::namespaced(client.clone(), namespace);
    let patch = Patch::Json::<T>(diff.clone());
    match retry_status_patch_once(&api, name, &patch).await {
        Ok(()) => Ok(()),
        Err(e) if e.is_not_found() && only_remove_ops(&diff) => Ok(()),
        Err(e) => Err(e),
    }
}

fn only_remove_ops(patch: &json_patch::Patch) -> bool {
    patch.0.iter().all(|op| matches!(op, json_patch::PatchOperation::Remove(_)))
}

/// Applies a merge-patch (a plain JSON object merged into the resource) to
/// the `status` subresource, retrying once on `Conflict` per
/// [`retry_status_patch_once`].
pub async fn merge_patch_status<T>(
    client: &Client,
    namespace: &str,
    name: &str,
    value: serde_json::Value,
) -> Result<(), Error>
where
    T: Clone + Resource<Scope = NamespaceResourceScope> + Serialize + DeserializeOwned + Debug,
    <T as Resource>::DynamicType: Default,
{
    let api: Api<T> = Api::namespaced(client.clone(), namespace);
    let patch = Patch::Merge(value);
    match retry_status_patch_once(&api, name, &patch).await {
        Ok(()) => Ok(()),
        Err(e) if e.is_not_found() => Ok(()),
        Err(e) => Err(e),
    }
}

/// Same as [`merge_patch_status`] but against `spec` rather than `status` —
/// used by field handlers patching the downstream StatefulSet, and by the
/// culler patching `spec.jupyterServer.hibernated` on the parent itself.
pub async fn merge_patch_spec<T>(
    client: &Client,
    namespace: &str,
    name: &str,
    value: serde_json::Value,
) -> Result<(), Error>
where
    T: Clone + Resource<Scope = NamespaceResourceScope> + Serialize + DeserializeOwned + Debug,
    <T as Resource>::DynamicType: Default,
{
    let api: Api<T> = Api::namespaced(client.clone(), namespace);
    let patch = Patch::Merge(value);
    match retry_spec_patch_once(&api, name, &patch).await {
        Ok(()) => Ok(()),
        Err(e) if e.is_not_found() => Ok(()),
        Err(e) => Err(e),
    }
}

/// §5's write discipline: "`Conflict` on a patch is retried once after
/// re-reading the current generation; persistent conflict is logged and
/// the event skipped." Re-reads the object once to surface its current
/// resourceVersion/generation to the server before retrying the same
/// patch; a second `Conflict` is swallowed (not propagated as an error) so
/// the caller's event is dropped rather than retried indefinitely — the
/// next periodic reconcile repairs the state.
async fn retry_status_patch_once<T>(api: &Api<T>, name: &str, patch: &Patch<T>) -> Result<(), Error>
where
    T: Clone + Resource<Scope = NamespaceResourceScope> + Serialize + DeserializeOwned + Debug,
    <T as Resource>::DynamicType: Default,
{
    match api.patch_status(name, &PatchParams::apply(FIELD_MANAGER), patch).await {
        Ok(_) => Ok(()),
        Err(err) => {
            let err = Error::from(err);
            if !err.is_conflict() {
                return Err(err);
            }
            tracing::warn!(%name, "status patch conflict; re-reading current generation and retrying once");
            let _ = api.get(name).await;
            match api.patch_status(name, &PatchParams::apply(FIELD_MANAGER), patch).await {
                Ok(_) => Ok(()),
                Err(retry_err) => {
                    let retry_err = Error::from(retry_err);
                    if retry_err.is_conflict() {
                        tracing::warn!(%name, "persistent status patch conflict after retry; skipping this event");
                        Ok(())
                    } else {
                        Err(retry_err)
                    }
                }
            }
        }
    }
}

/// Same retry-once-on-`Conflict` discipline as [`retry_status_patch_once`],
/// against the `spec`/resource body rather than the `status` subresource.
async fn retry_spec_patch_once<T>(api: &Api<T>, name: &str, patch: &Patch<T>) -> Result<(), Error>
where
    T: Clone + Resource<Scope = NamespaceResourceScope> + Serialize + DeserializeOwned + Debug,
    <T as Resource>::DynamicType: Default,
{
    match api.patch(name, &PatchParams::apply(FIELD_MANAGER), patch).await {
        Ok(_) => Ok(()),
        Err(err) => {
            let err = Error::from(err);
            if !err.is_conflict() {
                return Err(err);
            }
            tracing::warn!(%name, "patch conflict; re-reading current generation and retrying once");
            let _ = api.get(name).await;
            match api.patch(name, &PatchParams::apply(FIELD_MANAGER), patch).await {
                Ok(_) => Ok(()),
                Err(retry_err) => {
                    let retry_err = Error::from(retry_err);
                    if retry_err.is_conflict() {
                        tracing::warn!(%name, "persistent patch conflict after retry; skipping this event");
                        Ok(())
                    } else {
                        Err(retry_err)
                    }
                }
            }
        }
    }
}
