//! Worker stdout/stderr relabelling into the log.

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::task::JoinHandle;

use super::registry::WorkerId;

/// Re-emit every line of `reader` as a log event tagged with `label` and `stream`.
pub fn label_lines<R>(label: String, stream: &'static str, worker: WorkerId, reader: R) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    tracing::info!(target: "monarch::worker", label = %label, stream, pid = %worker, "{}", line)
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::debug!(label = %label, stream, pid = %worker, error = %e, "Worker output unreadable");
                    break;
                }
            }
        }
    })
}
