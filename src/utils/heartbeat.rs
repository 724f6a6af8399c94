use tokio::time::{interval, Duration};
use tracing::debug;

/// Logs a periodic "heartbeat" message for a named background component.
///
/// A debugging utility for spotting zombie tasks: if a heartbeat keeps
/// logging after the shutdown signal was sent, the paired task is not
/// respecting the signal.
pub async fn run_heartbeat(
    task_name: &'static str,
    mut shutdown_rx: tokio::sync::watch::Receiver<bool>,
) {
    let mut timer = interval(Duration::from_secs(3));
    debug!(task_name, "heartbeat started");
    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.changed() => {
                debug!(task_name, "heartbeat received shutdown, exiting");
                break;
            }
            _ = timer.tick() => {
                debug!(task_name, "heartbeat alive");
            }
        }
    }
}
