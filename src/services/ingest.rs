//! JSON-lines bar ingestion.

use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::metrics::Metrics;
use crate::models::{Bar, BarError};

/// Parses and validates one bar event. Unknown fields are ignored.
pub fn parse_bar(line: &str) -> Result<Bar, BarError> {
    let bar: Bar = serde_json::from_str(line)?;
    bar.validate()?;
    Ok(bar)
}

/// Reads bar events from `reader` until end of input or until the receiving side goes
/// away. Returns the number of bars forwarded.
pub async fn read_bars<R>(reader: R, tx: mpsc::Sender<Bar>, metrics: Arc<Metrics>) -> usize
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut forwarded = 0usize;
    let mut line_no = 0usize;

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "Input stream failed, stopping ingestion");
                break;
            }
        };
        line_no += 1;

        if line.trim().is_empty() {
            continue;
        }

        match parse_bar(&line) {
            Ok(bar) => {
                debug!(symbol = %bar.key(), date = %bar.date, "Bar read");
                if tx.send(bar).await.is_err() {
                    warn!("Bar channel closed, stopping ingestion");
                    break;
                }
                forwarded += 1;
            }
            Err(e) => {
                metrics.bars_rejected_total.inc();
                warn!(line = line_no, error = %e, "Rejecting bar on line {}", line_no);
            }
        }
    }

    info!(bars = forwarded, "Input exhausted after {} bars", forwarded);
    forwarded
}
