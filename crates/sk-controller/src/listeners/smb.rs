//! SMB listener unit
//!
//! The task mailbox behind the TASKS share: a directory holding one fixed
//! task file that agents read and never write back. The SMB protocol
//! machinery itself (the share export) is an external collaborator; this
//! unit owns the mailbox contents and keeps the share directory in shape
//! while parked on the cancellation token.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Cancellation polling granularity
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Run the SMB mailbox unit until cancelled.
pub fn run(share_dir: PathBuf, task_file: String, cancel: CancellationToken) {
    if let Err(e) = prepare_mailbox(&share_dir, &task_file) {
        tracing::error!(
            "SMB mailbox setup failed under {}: {}",
            share_dir.display(),
            e
        );
        return;
    }

    tracing::info!(
        share = %share_dir.display(),
        file = task_file,
        "SMB task mailbox ready"
    );

    while !cancel.is_cancelled() {
        std::thread::sleep(POLL_INTERVAL);
    }

    tracing::info!("SMB mailbox unit stopped");
}

/// Ensure the share directory and the fixed task file exist.
///
/// An existing task file is left untouched so queued tasking survives a
/// restart.
pub fn prepare_mailbox(share_dir: &Path, task_file: &str) -> std::io::Result<()> {
    std::fs::create_dir_all(share_dir)?;

    let task_path = share_dir.join(task_file);
    if !task_path.exists() {
        std::fs::write(&task_path, b"")?;
    }
    Ok(())
}

/// Drop a task into the mailbox, replacing whatever was there
pub fn write_task(share_dir: &Path, task_file: &str, payload: &str) -> std::io::Result<()> {
    std::fs::create_dir_all(share_dir)?;
    std::fs::write(share_dir.join(task_file), payload.as_bytes())
}
