//! Linux backends.
//!
//! [`IpCommand`] implements [`KernelGateway`](crate::KernelGateway) with
//! iproute2's `ip -json` and can be scoped to a named network namespace.
//! [`NetlinkDevice`] implements [`DeviceController`](crate::DeviceController)
//! over the kernel WireGuard netlink API in the current namespace.
//! Running either requires `CAP_NET_ADMIN`.

mod ip;
mod netlink;

pub use ip::IpCommand;
pub use netlink::NetlinkDevice;

use std::process::Stdio;

use tokio::process::Command;
use tracing::debug;

/// Output of a finished command.
#[derive(Debug)]
struct CommandOutput {
    success: bool,
    stdout: String,
    stderr: String,
}

/// Runs `program args...` with captured output.
async fn run(program: &str, args: &[String]) -> std::io::Result<CommandOutput> {
    debug!(program, args = ?args, "running command");
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await?;
    Ok(CommandOutput {
        success: output.status.success(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    })
}
