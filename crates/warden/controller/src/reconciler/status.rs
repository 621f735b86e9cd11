//! Status summary fields derived from the merged spec

use crate::config::ControllerConfig;
use warden_types::{Instance, InstanceMode, InstanceStatus};

/// Fill the informational status fields from a fully merged instance.
///
/// `declared_servers` counts shared references plus inline entries before
/// the shared ones were folded in.
pub(super) fn summarize(
    merged: &Instance,
    declared_servers: usize,
    config: &ControllerConfig,
    status: &mut InstanceStatus,
) {
    let bundle = &merged.spec.bundle;

    status.mode = InstanceMode::from_flag(bundle.agent.persistent_mode);
    status.toolchain = if bundle.image.is_empty() || bundle.image == config.default_image {
        String::new()
    } else {
        bundle.image.clone()
    };
    status.plugin_count = count(bundle.plugins.len());
    status.mcp_server_count = count(declared_servers);
}

fn count(len: usize) -> u32 {
    u32::try_from(len).unwrap_or(u32::MAX)
}
