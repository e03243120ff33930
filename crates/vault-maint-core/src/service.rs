use std::process::Command;
use tracing::{debug, warn};

/// Answers "is the vault service live right now?" for the skip rules.
pub trait ServiceProbe {
    fn is_service_running(&self) -> bool;
}

/// Asks the container runtime whether the named container is up. When the
/// runtime cannot answer, the service is reported as running so unattended
/// runs stay conservative.
pub struct DockerProbe {
    container_name: String,
}

impl DockerProbe {
    pub fn new(container_name: &str) -> Self {
        Self {
            container_name: container_name.to_string(),
        }
    }
}

impl ServiceProbe for DockerProbe {
    fn is_service_running(&self) -> bool {
        let filter = format!("name=^{}$", self.container_name);
        let output = Command::new("docker")
            .args(["ps", "--filter", &filter, "--format", "{{.Names}}"])
            .output();

        match output {
            Ok(out) if out.status.success() => {
                let stdout = String::from_utf8_lossy(&out.stdout);
                let running = stdout
                    .lines()
                    .any(|line| line.trim() == self.container_name);
                debug!("Container '{}' running: {}", self.container_name, running);
                running
            }
            Ok(out) => {
                warn!(
                    "docker ps exited with {}; assuming '{}' is running",
                    out.status, self.container_name
                );
                true
            }
            Err(e) => {
                warn!(
                    "Container runtime unavailable ({}); assuming '{}' is running",
                    e, self.container_name
                );
                true
            }
        }
    }
}

/// A probe with a fixed answer, for tests and for deployments without a runtime.
pub struct FixedProbe(pub bool);

impl ServiceProbe for FixedProbe {
    fn is_service_running(&self) -> bool {
        self.0
    }
}
