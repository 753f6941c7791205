//! Control of the user service that keeps the actuator buses open

use std::process::Command;
use tracing::{debug, info, warn};

pub const DEFAULT_SERVICE: &str = "reachy_sdk_server.service";

/// Whether `systemctl is-active` output reports a running unit
fn parse_is_active(stdout: &str) -> bool {
    stdout.lines().next().map(str::trim) == Some("active")
}

fn systemctl(args: &[&str]) -> std::io::Result<std::process::Output> {
    Command::new("systemctl").arg("--user").args(args).output()
}

pub fn is_active(service: &str) -> std::io::Result<bool> {
    let output = systemctl(&["is-active", service])?;
    Ok(parse_is_active(&String::from_utf8_lossy(&output.stdout)))
}

/// Stop `service` if it is running so the buses can be opened
///
/// Failures are logged only: a scan against busy ports still reports those
/// parts as unavailable.
pub fn release_buses(service: &str) {
    match is_active(service) {
        Ok(true) => {
            info!(service = %service, "Stopping service holding the buses");
            match systemctl(&["stop", service]) {
                Ok(output) if output.status.success() => {}
                Ok(output) => warn!(
                    service = %service,
                    stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                    "Failed to stop service"
                ),
                Err(e) => warn!(service = %service, error = %e, "Failed to run systemctl"),
            }
        }
        Ok(false) => debug!(service = %service, "Service not running"),
        Err(e) => warn!(service = %service, error = %e, "Failed to query service state"),
    }
}
