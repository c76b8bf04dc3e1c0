//! §4.4.4 resource-usage reporter: execs into the main pod's container and
//! reports how much of the workspace volume is in use. `du -sb` measures an
//! `emptyDir` volume (no independent capacity, so `available`/`total` stay
//! null); `df -Pk` measures a PVC-backed volume (capacity is meaningful).
//!
//! No teacher precedent for pod exec exists in the retrieved pack — this is
//! built directly from `kube::Api::exec`'s documented contract rather than
//! adapted from an existing call site.

use futures::AsyncReadExt;
use kube::api::{Api, AttachParams};
use kube::ResourceExt;
use session_operator_types::{JupyterServer, ResourceUsage};

use crate::context::Context;
use crate::Error;

const WORKSPACE_MOUNT_PATH: &str = "/home/jovyan/work";
const MAIN_CONTAINER_NAME: &str = "session";

pub async fn run_once(ctx: &Context, parent: &JupyterServer) -> Result<(), Error> {
    let namespace = parent
        .namespace()
        .ok_or_else(|| Error::UserInput("JupyterServer is missing metadata.namespace".into()))?;
    let name = parent.name_any();
    let Some(main_pod) = parent.status.as_ref().and_then(|s| s.main_pod.as_ref()) else {
        return Ok(());
    };

    let command = if parent.spec.storage.pvc.enabled {
        vec!["df".to_string(), "-Pk".to_string(), WORKSPACE_MOUNT_PATH.to_string()]
    } else {
        vec!["du".to_string(), "-sb".to_string(), WORKSPACE_MOUNT_PATH.to_string()]
    };

    let output = match exec_capture(ctx, &namespace, &main_pod.name, command).await {
        Ok(output) => output,
        Err(_) => return Ok(()),
    };

    let usage = if parent.spec.storage.pvc.enabled {
        parse_df(&output)
    } else {
        parse_du(&output)
    };

    let status_patch = serde_json::json!({"mainPod": {"resourceUsage": usage}});
    crate::reconcile::patch::merge_patch_status::<JupyterServer>(&ctx.client, &namespace, &name, status_patch).await
}

async fn exec_capture(
    ctx: &Context,
    namespace: &str,
    pod_name: &str,
    command: Vec<String>,
) -> Result<String, Error> {
    let api: Api<k8s_openapi::api::core::v1::Pod> = Api::namespaced(ctx.client.clone(), namespace);
    let params = AttachParams::default().container(MAIN_CONTAINER_NAME).stdout(true).stderr(false);
    let mut attached = api
        .exec(pod_name, command, &params)
        .await
        .map_err(Error::from)?;
    let mut stdout = attached.stdout().ok_or_else(|| Error::MalformedPayload("exec produced no stdout stream".into()))?;
    let mut buf = String::new();
    let _ = stdout.read_to_string(&mut buf).await;
    drop(stdout);
    let _ = attached.join().await;
    Ok(buf)
}

/// `du -sb <path>` output is `<bytes>\t<path>`. An `emptyDir` has no fixed
/// capacity, so only `used_bytes` is ever populated; a malformed line
/// becomes all-null rather than an error (spec's "parse failures become
/// null fields").
fn parse_du(output: &str) -> ResourceUsage {
    let used_bytes = output
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().next())
        .and_then(|n| n.parse::<i64>().ok());
    ResourceUsage { used_bytes, available_bytes: None, total_bytes: None }
}

/// `df -Pk <path>` output is a header line followed by
/// `Filesystem 1024-blocks Used Available Capacity Mounted-on`. Values are
/// in KiB and converted to bytes.
fn parse_df(output: &str) -> ResourceUsage {
    let Some(data_line) = output.lines().nth(1) else {
        return ResourceUsage { used_bytes: None, available_bytes: None, total_bytes: None };
    };
    let fields: Vec<&str> = data_line.split_whitespace().collect();
    let kib = |i: usize| fields.get(i).and_then(|v| v.parse::<i64>().ok()).map(|kib| kib * 1024);
    ResourceUsage {
        total_bytes: kib(1),
        used_bytes: kib(2),
        available_bytes: kib(3),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_du_output() {
        let usage = parse_du("1048576\t/home/jovyan/work\n");
        assert_eq!(usage.used_bytes, Some(1_048_576));
        assert_eq!(usage.available_bytes, None);
        assert_eq!(usage.total_bytes, None);
    }

    #[test]
    fn malformed_du_output_is_all_null() {
        let usage = parse_du("not a number here\n");
        assert_eq!(usage.used_bytes, None);
    }

    #[test]
    fn parses_df_output() {
        let output = "Filesystem     1024-blocks  Used  Available Capacity Mounted on\n\
                       /dev/sdb1           102400 51200      51200      50% /home/jovyan/work\n";
        let usage = parse_df(output);
        assert_eq!(usage.total_bytes, Some(102_400 * 1024));
        assert_eq!(usage.used_bytes, Some(51_200 * 1024));
        assert_eq!(usage.available_bytes, Some(51_200 * 1024));
    }

    #[test]
    fn missing_data_line_is_all_null() {
        let usage = parse_df("Filesystem header only\n");
        assert_eq!(usage.total_bytes, None);
    }
}
