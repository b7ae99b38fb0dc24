//! SSH tunnel forwarding a local Unix socket to a remote service socket.
//!
//! The tunnel is an `ssh -L local:remote` child process. It lives as long as
//! the [`Tunnel`] value; dropping it kills ssh.

use std::os::unix::fs::FileTypeExt;
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tracing::{debug, info, warn};

use crate::config::RemoteEndpoint;
use crate::error::{PodmanError, Result};

/// How often to check for the forwarded socket while ssh starts.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Running ssh tunnel.
pub struct Tunnel {
    child: Child,
    endpoint: RemoteEndpoint,
}

impl Tunnel {
    /// Build the ssh argument list for `endpoint`.
    pub fn ssh_args(endpoint: &RemoteEndpoint) -> Vec<String> {
        let mut args = vec!["-NTq".to_string()];

        if let Some(identity) = &endpoint.identity_file {
            args.push("-i".to_string());
            args.push(identity.display().to_string());
        }

        if endpoint.ignore_hosts {
            args.extend([
                "-o".to_string(),
                "StrictHostKeyChecking=no".to_string(),
                "-o".to_string(),
                "UserKnownHostsFile=/dev/null".to_string(),
            ]);
        } else if let Some(known_hosts) = &endpoint.known_hosts {
            args.push("-o".to_string());
            args.push(format!("UserKnownHostsFile={}", known_hosts.display()));
        }

        args.extend([
            "-o".to_string(),
            "StreamLocalBindUnlink=yes".to_string(),
            "-L".to_string(),
            format!("{}:{}", endpoint.local.display(), endpoint.remote_path),
        ]);

        if let Some(port) = endpoint.port {
            args.push("-p".to_string());
            args.push(port.to_string());
        }

        args.push(endpoint.destination());
        args
    }

    /// Start ssh and wait until the local socket exists.
    ///
    /// # Errors
    ///
    /// Returns `PodmanError::Tunnel` if the local path holds something other
    /// than a socket, ssh cannot be spawned, exits early, or does not bind
    /// the local socket within `wait`.
    pub async fn bore(endpoint: &RemoteEndpoint, wait: Duration) -> Result<Self> {
        let args = Self::ssh_args(endpoint);
        debug!(?args, "Starting ssh tunnel");

        // A leftover socket would pass the readiness check before ssh binds
        match tokio::fs::symlink_metadata(&endpoint.local).await {
            Ok(meta) if meta.file_type().is_socket() => {
                tokio::fs::remove_file(&endpoint.local).await?;
            }
            Ok(_) => {
                return Err(PodmanError::Tunnel {
                    destination: endpoint.destination(),
                    reason: format!(
                        "{} exists and is not a socket",
                        endpoint.local.display()
                    ),
                });
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let child = Command::new("ssh")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| PodmanError::Tunnel {
                destination: endpoint.destination(),
                reason: format!("failed to run ssh: {}", e),
            })?;

        let mut tunnel = Self {
            child,
            endpoint: endpoint.clone(),
        };
        tunnel.wait_for_socket(wait).await?;
        if let Some(stderr) = tunnel.child.stderr.take() {
            tokio::spawn(drain_stderr(stderr));
        }

        info!(
            destination = %endpoint.destination(),
            local = %endpoint.local.display(),
            remote = %endpoint.remote_path,
            "SSH tunnel established"
        );
        Ok(tunnel)
    }

    async fn wait_for_socket(&mut self, wait: Duration) -> Result<()> {
        let deadline = Instant::now() + wait;

        loop {
            if let Some(status) = self.child.try_wait()? {
                let mut stderr = String::new();
                if let Some(mut pipe) = self.child.stderr.take() {
                    let _ = pipe.read_to_string(&mut stderr).await;
                }
                return Err(self.failure(format!("ssh exited with {}: {}", status, stderr.trim())));
            }

            if is_socket(&self.endpoint.local).await {
                return Ok(());
            }

            if Instant::now() >= deadline {
                self.close().await;
                return Err(self.failure(format!(
                    "socket {} not ready after {:?}",
                    self.endpoint.local.display(),
                    wait
                )));
            }

            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    fn failure(&self, reason: String) -> PodmanError {
        PodmanError::Tunnel {
            destination: self.endpoint.destination(),
            reason,
        }
    }

    pub fn endpoint(&self) -> &RemoteEndpoint {
        &self.endpoint
    }

    /// Whether ssh is still running.
    pub fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Stop ssh and remove the local socket.
    pub async fn close(&mut self) {
        if let Err(e) = self.child.kill().await {
            // already exited
            debug!(error = %e, "ssh tunnel kill");
        }
        if let Err(e) = tokio::fs::remove_file(&self.endpoint.local).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(
                    path = %self.endpoint.local.display(),
                    error = %e,
                    "Failed to remove tunnel socket"
                );
            }
        }
        debug!(destination = %self.endpoint.destination(), "SSH tunnel closed");
    }
}

async fn is_socket(path: &Path) -> bool {
    match tokio::fs::symlink_metadata(path).await {
        Ok(meta) => meta.file_type().is_socket(),
        Err(_) => false,
    }
}

/// Keep reading ssh diagnostics so a full pipe never blocks the tunnel.
async fn drain_stderr(stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!(line = %line, "ssh");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    fn endpoint() -> RemoteEndpoint {
        RemoteEndpoint {
            local: PathBuf::from("/tmp/podman.sock"),
            remote_path: "/run/podman/io.podman".to_string(),
            username: "alice".to_string(),
            hostname: "build.example.com".to_string(),
            port: None,
            identity_file: None,
            ignore_hosts: false,
            known_hosts: None,
        }
    }

    #[test]
    fn test_ssh_args_minimal() {
        assert_eq!(
            Tunnel::ssh_args(&endpoint()),
            vec![
                "-NTq",
                "-o",
                "StreamLocalBindUnlink=yes",
                "-L",
                "/tmp/podman.sock:/run/podman/io.podman",
                "alice@build.example.com",
            ]
        );
    }

    #[test]
    fn test_ssh_args_full() {
        let endpoint = RemoteEndpoint {
            port: Some(2222),
            identity_file: Some(PathBuf::from("/keys/id_rsa")),
            known_hosts: Some(PathBuf::from("/keys/known_hosts")),
            ..endpoint()
        };

        let args = Tunnel::ssh_args(&endpoint);
        let joined = args.join(" ");

        assert!(joined.contains("-i /keys/id_rsa"));
        assert!(joined.contains("-o UserKnownHostsFile=/keys/known_hosts"));
        assert!(joined.contains("-p 2222"));
        assert_eq!(args.last().map(String::as_str), Some("alice@build.example.com"));
    }

    #[tokio::test]
    async fn test_bore_keeps_regular_file_at_local_path() {
        let local = PathBuf::from(format!(
            "/tmp/podman-varlink-tunnel-{}.txt",
            std::process::id()
        ));
        std::fs::write(&local, "user data").expect("Failed to write file");

        let endpoint = RemoteEndpoint {
            local: local.clone(),
            hostname: "unreachable.invalid".to_string(),
            ..endpoint()
        };
        let result = Tunnel::bore(&endpoint, Duration::from_millis(200)).await;

        match result {
            Err(PodmanError::Tunnel { reason, .. }) => assert!(reason.contains("not a socket")),
            Err(other) => panic!("Expected Tunnel error, got {:?}", other),
            Ok(_) => panic!("Expected Tunnel error, got a tunnel"),
        }
        assert_eq!(
            std::fs::read_to_string(&local).expect("File should still exist"),
            "user data"
        );

        let _ = std::fs::remove_file(&local);
    }

    #[tokio::test]
    async fn test_is_socket_only_for_sockets() {
        let path = PathBuf::from(format!(
            "/tmp/podman-varlink-tunnel-{}.sock",
            std::process::id()
        ));
        let _ = std::fs::remove_file(&path);
        assert!(!is_socket(&path).await);

        let _listener = tokio::net::UnixListener::bind(&path).expect("Failed to bind socket");
        assert!(is_socket(&path).await);

        let _ = std::fs::remove_file(&path);
        let manifest = Path::new(env!("CARGO_MANIFEST_DIR")).join("Cargo.toml");
        assert!(!is_socket(&manifest).await);
    }

    #[test]
    fn test_ssh_args_ignore_hosts_wins_over_known_hosts() {
        let endpoint = RemoteEndpoint {
            ignore_hosts: true,
            known_hosts: Some(PathBuf::from("/keys/known_hosts")),
            ..endpoint()
        };

        let joined = Tunnel::ssh_args(&endpoint).join(" ");

        assert!(joined.contains("StrictHostKeyChecking=no"));
        assert!(joined.contains("UserKnownHostsFile=/dev/null"));
        assert!(!joined.contains("/keys/known_hosts"));
    }
}
