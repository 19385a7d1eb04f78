//! Agent read loop
//!
//! Reads requests line by line and writes one response per request. A bad
//! line or a failing handler produces an error envelope and the loop keeps
//! going; only end of input or a broken output pipe stops it.

use super::protocol::{AgentRequest, AgentResponse};
use super::registry::CapabilityRegistry;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

/// Serve requests from `reader` until it is exhausted
pub async fn run_agent<R, W>(
    registry: &CapabilityRegistry,
    reader: R,
    mut writer: W,
) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    let mut handled = 0usize;

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let response = match AgentRequest::parse_line(&line) {
            Ok(request) => {
                debug!("{} <- {}", registry.agent(), request.command);
                registry.dispatch(request).await
            }
            Err(message) => {
                warn!("{}: rejected input line: {}", registry.agent(), message);
                AgentResponse::error(None, "bad_request", &message, None)
            }
        };

        writer.write_all(response.to_line().as_bytes()).await?;
        writer.flush().await?;
        handled += 1;
    }

    info!("{}: input closed after {} requests", registry.agent(), handled);
    Ok(())
}

/// Serve requests on stdin/stdout
pub async fn serve_stdio(registry: &CapabilityRegistry) -> std::io::Result<()> {
    info!(
        "{} agent ready ({})",
        registry.agent(),
        registry.commands().join(", ")
    );
    let stdin = BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();
    run_agent(registry, stdin, stdout).await
}
