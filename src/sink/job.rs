use super::stream::StreamState;
use crate::reliability::Planner;
use crate::sender::{GateTransport, StreamSender};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Sending loop of one destination. Runs until `cancel` fires; a cycle that
/// already dispatched a request finishes it before the loop exits.
pub(crate) async fn run_sending_job<T: GateTransport>(
    state: Arc<StreamState>,
    sender: StreamSender<T>,
    mut planner: Planner,
    default_api_key: Arc<str>,
    cancel: CancellationToken,
) {
    debug!(stream = state.name(), "Sending job started");

    while !cancel.is_cancelled() {
        state.reset_flush();

        let started = Instant::now();
        let api_key = state.api_key(&default_api_key);
        let result = sender.send_once(&api_key, &cancel).await;
        let delay = planner.next_delay(result, started.elapsed());

        tokio::select! {
            () = cancel.cancelled() => break,
            () = state.flush_requested() => {
                debug!(stream = state.name(), "Flush requested, sending early");
            }
            () = tokio::time::sleep(delay) => {}
        }
    }

    info!(stream = state.name(), "Sending job stopped");
}
