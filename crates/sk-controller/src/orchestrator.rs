//! Listener lifecycle orchestration
//!
//! Owns one listener unit per enabled transport and drives them through the
//! state machine `Stopped -> Starting -> Running -> Stopping -> Stopped`.
//! A single async mutex guards the whole transition: a start/stop/restart
//! call arriving while another is in flight is rejected with
//! [`ControlError::TransitionInFlight`], never queued or interleaved.
//!
//! Shutdown is cooperative and advisory. `stop_all` raises the
//! cancellation signal, cancels cooperative tasks immediately, and gives
//! blocking units one grace period to observe the signal; after that the
//! orchestrator unconditionally reports Stopped and abandons whatever has
//! not exited. A stuck blocking unit (a capture handle that never returns)
//! can therefore outlive the Stopped transition; that leak is accepted and
//! documented, not silently repaired.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use sk_core::config::ControllerConfig;
use sk_core::error::ControlError;
use sk_core::types::TransportKind;

use crate::directory::AgentDirectory;
use crate::listeners::{self, ListenerUnit};
use crate::queue::TaskQueue;

/// Lifecycle state of the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

struct Inner {
    state: ListenerState,
    units: Vec<ListenerUnit>,
    cancel: CancellationToken,
}

/// Owns and supervises the per-transport listener units
pub struct ListenerOrchestrator {
    config: ControllerConfig,
    directory: Arc<AgentDirectory>,
    queue: Arc<TaskQueue>,
    inner: Mutex<Inner>,
    /// Lock-free view of the Running state for the status endpoint
    running: AtomicBool,
}

impl ListenerOrchestrator {
    /// Create an orchestrator in the Stopped state
    pub fn new(
        config: ControllerConfig,
        directory: Arc<AgentDirectory>,
        queue: Arc<TaskQueue>,
    ) -> Self {
        Self {
            config,
            directory,
            queue,
            inner: Mutex::new(Inner {
                state: ListenerState::Stopped,
                units: Vec::new(),
                cancel: CancellationToken::new(),
            }),
            running: AtomicBool::new(false),
        }
    }

    /// Start one listener unit per enabled transport.
    ///
    /// No-op when already Running. Rejected when another transition holds
    /// the lock.
    pub async fn start_all(&self) -> Result<(), ControlError> {
        let mut inner = self
            .inner
            .try_lock()
            .map_err(|_| ControlError::TransitionInFlight)?;

        if inner.state == ListenerState::Running {
            tracing::info!("Listeners are already running");
            return Ok(());
        }

        tracing::info!("Starting all listener units...");
        inner.state = ListenerState::Starting;
        // Fresh signal each start cycle; the previous one stays raised for
        // any straggler from the last stop.
        inner.cancel = CancellationToken::new();
        let cancel = inner.cancel.clone();

        let transports = &self.config.transports;
        let mut units = Vec::new();

        if transports.http_enabled {
            let state = Arc::new(listeners::http::AgentApiState {
                directory: Arc::clone(&self.directory),
                queue: Arc::clone(&self.queue),
            });
            units.push(ListenerUnit::spawn_cooperative(
                TransportKind::Http,
                listeners::http::serve(transports.http_bind.clone(), state, cancel.clone()),
            ));
        }

        if transports.dns_enabled {
            let bind = transports.dns_bind.clone();
            let fixed_ip = transports.dns_fixed_ip.clone();
            units.push(ListenerUnit::spawn_blocking(
                TransportKind::Dns,
                cancel.clone(),
                move |cancel| listeners::dns::run(bind, fixed_ip, cancel),
            ));
        }

        if transports.icmp_enabled {
            units.push(ListenerUnit::spawn_blocking(
                TransportKind::Icmp,
                cancel.clone(),
                listeners::icmp::run,
            ));
        }

        if transports.smb_enabled {
            let share_dir = transports.smb_share_dir.clone();
            let task_file = transports.smb_task_file.clone();
            units.push(ListenerUnit::spawn_blocking(
                TransportKind::Smb,
                cancel.clone(),
                move |cancel| listeners::smb::run(share_dir, task_file, cancel),
            ));
        }

        tracing::info!(units = units.len(), "All listener units started");
        inner.units = units;
        inner.state = ListenerState::Running;
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Stop all listener units.
    ///
    /// No-op when not Running. The call holds the transition lock across
    /// the grace period, so a concurrent control action is rejected rather
    /// than interleaved.
    pub async fn stop_all(&self) -> Result<(), ControlError> {
        let mut inner = self
            .inner
            .try_lock()
            .map_err(|_| ControlError::TransitionInFlight)?;

        if inner.state != ListenerState::Running {
            tracing::info!("Listeners are not currently running");
            return Ok(());
        }

        tracing::info!("Stopping all listener units...");
        inner.state = ListenerState::Stopping;

        // Raise the shared signal, exactly once per stop cycle
        inner.cancel.cancel();

        // Cooperative tasks can be cancelled immediately
        for unit in &inner.units {
            unit.cancel();
        }

        // Blocking units observe the signal at <=1s granularity
        tokio::time::sleep(self.config.grace_period()).await;

        for unit in &inner.units {
            if !unit.is_finished() {
                tracing::warn!(
                    transport = %unit.kind(),
                    "Listener unit did not exit within the grace period; abandoning"
                );
            }
        }

        inner.units.clear();
        inner.state = ListenerState::Stopped;
        self.running.store(false, Ordering::SeqCst);
        tracing::info!("All listener units stopped");
        Ok(())
    }

    /// Sequential stop then start; not atomic.
    pub async fn restart(&self) -> Result<(), ControlError> {
        self.stop_all().await?;
        self.start_all().await
    }

    /// Whether the orchestrator currently reports Running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Number of live listener units (Stopped orchestrators report zero)
    pub async fn unit_count(&self) -> usize {
        self.inner.lock().await.units.len()
    }

    /// Current cancellation signal; raised while a stop cycle is in
    /// progress or after it completed.
    pub async fn cancellation_signal(&self) -> CancellationToken {
        self.inner.lock().await.cancel.clone()
    }
}
