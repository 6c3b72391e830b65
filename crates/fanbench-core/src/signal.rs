use std::{future::Future, io};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Turns the first termination signal into a cancellation of the whole batch.
pub struct CancellationBridge;

impl CancellationBridge {
    /// Subscribe to SIGINT, SIGTERM and SIGPIPE (Ctrl-C elsewhere) and cancel `token` on the first one.
    ///
    /// Subscription happens before this returns, so a signal that arrives while the
    /// batch is being set up is not lost. After the first signal SIGINT and SIGTERM get
    /// their default disposition back: a second one terminates the process.
    pub fn spawn(token: CancellationToken) -> io::Result<JoinHandle<()>> {
        let signals = Signals::subscribe()?;
        Ok(tokio::spawn(Self::forward(token, signals.first())))
    }

    /// Cancel `token` once `interrupt` yields a signal name.
    ///
    /// Returns early when `token` is cancelled by someone else.
    pub async fn forward<F>(token: CancellationToken, interrupt: F)
    where
        F: Future<Output = Option<&'static str>>,
    {
        tokio::select! {
            received = interrupt => match received {
                Some(signal) => {
                    warn!(target: "fanbench.signal", signal, "interrupt received; tearing down all runs");
                    token.cancel();
                }
                None => debug!(target: "fanbench.signal", "signal stream closed"),
            },
            _ = token.cancelled() => {
                debug!(target: "fanbench.signal", "batch cancelled; signal bridge stopped");
            }
        }
    }
}

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        use tokio::signal::unix::{Signal, SignalKind, signal};

        struct Signals {
            int: Signal,
            term: Signal,
            pipe: Signal,
        }

        impl Signals {
            fn subscribe() -> io::Result<Self> {
                Ok(Self {
                    int: signal(SignalKind::interrupt())?,
                    term: signal(SignalKind::terminate())?,
                    pipe: signal(SignalKind::pipe())?,
                })
            }

            async fn first(mut self) -> Option<&'static str> {
                let received = tokio::select! {
                    r = self.int.recv() => r.map(|_| "SIGINT"),
                    r = self.term.recv() => r.map(|_| "SIGTERM"),
                    r = self.pipe.recv() => r.map(|_| "SIGPIPE"),
                };
                if received.is_some() {
                    restore_default_disposition();
                }
                received
            }
        }

        fn restore_default_disposition() {
            for signo in [libc::SIGINT, libc::SIGTERM] {
                // SAFETY: installs the default handler; no Rust state is touched.
                let prev = unsafe { libc::signal(signo, libc::SIG_DFL) };
                if prev == libc::SIG_ERR {
                    warn!(target: "fanbench.signal", signo, "unable to restore default signal handler");
                }
            }
        }
    } else {
        struct Signals;

        impl Signals {
            fn subscribe() -> io::Result<Self> {
                Ok(Self)
            }

            async fn first(self) -> Option<&'static str> {
                tokio::signal::ctrl_c().await.ok().map(|_| "ctrl-c")
            }
        }
    }
}
