use anyhow::{Context, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

use common::{Candle, HostEvent};
use engine::SessionHandle;

/// Parse one JSON line: a tagged `HostEvent` or a bare candle.
/// Blank lines and `#` comments yield `None`.
pub fn parse_line(line: &str) -> Result<Option<HostEvent>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    if let Ok(event) = serde_json::from_str::<HostEvent>(line) {
        return Ok(Some(event));
    }
    let candle: Candle = serde_json::from_str(line).context("line is neither a host event nor a candle")?;
    Ok(Some(HostEvent::Candle(candle)))
}

async fn open(input: &str) -> Result<Box<dyn AsyncBufRead + Unpin + Send>> {
    if input == "-" {
        info!("Replaying events from stdin");
        return Ok(Box::new(BufReader::new(tokio::io::stdin())));
    }
    let file = tokio::fs::File::open(input)
        .await
        .with_context(|| format!("opening candle input '{input}'"))?;
    info!(path = %input, "Replaying events from file");
    Ok(Box::new(BufReader::new(file)))
}

/// Feed every event of `input` into the session. Malformed lines are skipped
/// with a warning. Returns the number of events sent; stops early if the
/// session has already finished.
pub async fn replay(input: &str, handle: &SessionHandle) -> Result<usize> {
    let mut lines = open(input).await?.lines();
    let mut sent = 0;
    let mut line_no = 0;
    while let Some(line) = lines.next_line().await.context("reading candle input")? {
        line_no += 1;
        let event = match parse_line(&line) {
            Ok(Some(event)) => event,
            Ok(None) => continue,
            Err(e) => {
                warn!(line = line_no, error = %e, "Skipping malformed event");
                continue;
            }
        };
        let is_stop = matches!(event, HostEvent::Stop);
        if !handle.send(event) {
            warn!(line = line_no, "Session finished before the input ended");
            break;
        }
        sent += 1;
        if is_stop {
            debug!(line = line_no, "Stop event in input");
            break;
        }
    }
    Ok(sent)
}
