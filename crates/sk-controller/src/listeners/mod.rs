//! Listener units, one per enabled covert transport.
//!
//! Units fall into two execution classes behind one interface:
//!
//! - **cooperative** units (HTTP) suspend naturally at I/O boundaries and
//!   run as tokio tasks, cancelled through the orchestrator's
//!   [`CancellationToken`];
//! - **blocking** units (DNS responder, ICMP sniffer, SMB mailbox) have no
//!   native suspension point and run on dedicated threads, polling the same
//!   token at one-second granularity.
//!
//! Every unit binds its own socket inside its run function: a port conflict
//! aborts that unit alone, leaving siblings and the orchestrator's overall
//! state untouched.

pub mod dns;
pub mod http;
pub mod icmp;
pub mod smb;

use tokio_util::sync::CancellationToken;

use sk_core::types::TransportKind;

/// The concurrency primitive backing a running unit
enum UnitRuntime {
    /// A tokio task, cancellable immediately
    Cooperative(tokio::task::JoinHandle<()>),
    /// A dedicated thread, only able to observe cancellation at its polling
    /// granularity. Abandoned (not joined) if it fails to exit within the
    /// orchestrator's grace period.
    Blocking(std::thread::JoinHandle<()>),
}

/// Handle to one running listener unit
pub struct ListenerUnit {
    kind: TransportKind,
    runtime: UnitRuntime,
}

impl ListenerUnit {
    /// Spawn a cooperative unit from a future that observes `cancel` itself
    pub fn spawn_cooperative<F>(kind: TransportKind, future: F) -> Self
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        tracing::info!(transport = %kind, "Starting cooperative listener unit");
        Self {
            kind,
            runtime: UnitRuntime::Cooperative(tokio::spawn(future)),
        }
    }

    /// Spawn a blocking unit on a dedicated thread.
    ///
    /// The run function must poll `cancel` at an interval no coarser than
    /// one second.
    pub fn spawn_blocking<F>(kind: TransportKind, cancel: CancellationToken, run: F) -> Self
    where
        F: FnOnce(CancellationToken) + Send + 'static,
    {
        tracing::info!(transport = %kind, "Starting blocking listener unit");
        Self {
            kind,
            runtime: UnitRuntime::Blocking(std::thread::spawn(move || run(cancel))),
        }
    }

    /// Which transport this unit serves
    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    /// Cancel a cooperative unit immediately.
    ///
    /// Blocking units are only signalled through the shared token; a unit
    /// stuck past the grace period is abandoned when the handle drops.
    pub fn cancel(&self) {
        if let UnitRuntime::Cooperative(handle) = &self.runtime {
            handle.abort();
        }
    }

    /// Whether the unit has already exited on its own
    pub fn is_finished(&self) -> bool {
        match &self.runtime {
            UnitRuntime::Cooperative(handle) => handle.is_finished(),
            UnitRuntime::Blocking(handle) => handle.is_finished(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_cooperative_unit_aborts() {
        let cancel = CancellationToken::new();
        let unit = ListenerUnit::spawn_cooperative(TransportKind::Http, {
            let cancel = cancel.clone();
            async move {
                cancel.cancelled().await;
            }
        });

        assert!(!unit.is_finished());
        unit.cancel();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(unit.is_finished());
    }

    #[tokio::test]
    async fn test_blocking_unit_observes_token() {
        let cancel = CancellationToken::new();
        let unit = ListenerUnit::spawn_blocking(TransportKind::Smb, cancel.clone(), |cancel| {
            while !cancel.is_cancelled() {
                std::thread::sleep(Duration::from_millis(10));
            }
        });

        cancel.cancel();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(unit.is_finished());
        assert_eq!(unit.kind(), TransportKind::Smb);
    }
}
