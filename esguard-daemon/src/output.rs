//! Event output -- writes each detector event as one wire line.
//!
//! The detector hands events to a bounded channel; this task drains it
//! into an async writer (stdout in production). On shutdown the remaining
//! buffered events are written before the task exits.

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{broadcast, mpsc};

use esguard_core::event::SecurityEvent;

/// Spawn the event writer task.
///
/// The task returns the writer and the number of lines written once the
/// channel closes or shutdown is broadcast.
pub fn spawn_event_writer<W>(
    mut event_rx: mpsc::Receiver<SecurityEvent>,
    mut writer: W,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> tokio::task::JoinHandle<(W, u64)>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut written = 0u64;

        loop {
            tokio::select! {
                event = event_rx.recv() => {
                    match event {
                        Some(event) => {
                            if write_event(&mut writer, &event).await {
                                written += 1;
                            }
                        }
                        None => {
                            tracing::debug!("event channel closed, exiting writer");
                            break;
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    while let Ok(event) = event_rx.try_recv() {
                        if write_event(&mut writer, &event).await {
                            written += 1;
                        }
                    }
                    tracing::debug!(written, "event writer shutting down");
                    break;
                }
            }
        }

        if let Err(e) = writer.flush().await {
            tracing::error!(error = %e, "failed to flush event output");
        }
        (writer, written)
    })
}

async fn write_event<W: AsyncWrite + Unpin>(writer: &mut W, event: &SecurityEvent) -> bool {
    let line = format!("{event}\n");
    match writer.write_all(line.as_bytes()).await {
        Ok(()) => {
            metrics::counter!(esguard_core::metrics::DAEMON_EVENTS_WRITTEN_TOTAL).increment(1);
            tracing::debug!(rule = %event.rule_name, event_id = %event.id, "event written");
            true
        }
        Err(e) => {
            tracing::error!(
                rule = %event.rule_name,
                event_id = %event.id,
                error = %e,
                "failed to write event"
            );
            false
        }
    }
}
