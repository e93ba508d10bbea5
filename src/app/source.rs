use crate::record::EventRecord;
use crate::sender::GateTransport;
use crate::sink::GateSink;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceSummary {
    pub lines: u64,
    pub stored: u64,
    pub dropped: u64,
}

/// Turns every non-empty line of `reader` into an [`EventRecord`] and puts
/// it into `stream`. Stops at end of input or when `cancel` fires.
pub async fn forward_lines<R, T>(
    reader: R,
    sink: &GateSink<T>,
    stream: &str,
    cancel: &CancellationToken,
) -> std::io::Result<SourceSummary>
where
    R: AsyncBufRead + Unpin,
    T: GateTransport,
{
    let mut lines = reader.lines();
    let mut summary = SourceSummary::default();

    loop {
        let line = tokio::select! {
            () = cancel.cancelled() => break,
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            debug!("Input closed");
            break;
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        summary.lines += 1;
        if sink.put_event(stream, &EventRecord::from_line(line)).is_stored() {
            summary.stored += 1;
        } else {
            summary.dropped += 1;
        }
    }

    Ok(summary)
}
