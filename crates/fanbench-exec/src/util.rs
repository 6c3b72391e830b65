use std::{io, process::ExitStatus, time::Duration};

use tokio::process::Child;

cfg_if::cfg_if! {
    if #[cfg(target_family = "unix")] {
        use std::os::unix::process::ExitStatusExt;

        use tracing::{debug, warn};

        /// Ask a child (and everything in its process group) to stop, escalating to a kill
        /// only when it is still alive after `grace`.
        pub async fn terminate_group(child: &mut Child, grace: Duration) -> io::Result<ExitStatus> {
            let Some(pid) = child.id() else {
                // Already reaped.
                return child.wait().await;
            };

            signal_group(pid, libc::SIGTERM);
            match tokio::time::timeout(grace, child.wait()).await {
                Ok(status) => status,
                Err(_) => {
                    warn!(target: "fanbench.exec", pid, grace_ms = grace.as_millis() as u64, "process group ignored SIGTERM; killing");
                    signal_group(pid, libc::SIGKILL);
                    child.wait().await
                }
            }
        }

        /// Children are spawned as group leaders, so the group id equals the pid.
        fn signal_group(pid: u32, signal: libc::c_int) {
            let Ok(pgid) = libc::pid_t::try_from(pid) else {
                return;
            };
            // SAFETY: plain syscall on a group id we spawned; no memory is shared.
            let rc = unsafe { libc::kill(-pgid, signal) };
            if rc != 0 {
                let err = io::Error::last_os_error();
                // ESRCH: the group is already gone.
                if err.raw_os_error() != Some(libc::ESRCH) {
                    debug!(target: "fanbench.exec", pid, signal, error = %err, "signal to process group failed");
                }
            }
        }

        pub fn exit_signal(status: &ExitStatus) -> Option<i32> {
            status.signal()
        }
    } else {
        pub async fn terminate_group(child: &mut Child, _grace: Duration) -> io::Result<ExitStatus> {
            child.kill().await?;
            child.wait().await
        }

        pub fn exit_signal(_status: &ExitStatus) -> Option<i32> {
            None
        }
    }
}

#[cfg(all(test, target_family = "unix"))]
mod tests {
    use tokio::process::Command;

    use super::*;

    #[tokio::test]
    async fn terminate_group_stops_a_shell_waiting_on_its_children() {
        let mut child = Command::new("sh")
            .arg("-c")
            .arg("sleep 30 & sleep 30; wait")
            .process_group(0)
            .spawn()
            .unwrap();

        let status = terminate_group(&mut child, Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(exit_signal(&status), Some(libc::SIGTERM));
    }

    #[tokio::test]
    async fn terminate_group_on_exited_child_returns_its_status() {
        let mut child = Command::new("sh").arg("-c").arg("exit 5").spawn().unwrap();
        child.wait().await.unwrap();

        let status = terminate_group(&mut child, Duration::from_millis(50))
            .await
            .unwrap();
        assert_eq!(status.code(), Some(5));
    }
}
