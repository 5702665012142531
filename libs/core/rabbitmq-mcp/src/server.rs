//! Stdio transport
//!
//! One JSON-RPC message per line in, one response per line out. Requests are
//! handled sequentially. stdout carries only protocol traffic; logs go to stderr.

use crate::error::Result;
use crate::mcp::McpHandler;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info};

const LOG_PREVIEW: usize = 100;

/// MCP server bound to a handler
pub struct McpServer {
    handler: McpHandler,
}

impl McpServer {
    pub fn new(handler: McpHandler) -> Self {
        Self { handler }
    }

    /// Serve on the process's stdin/stdout until stdin closes
    pub async fn run_stdio(&self) -> Result<()> {
        let stdin = BufReader::new(tokio::io::stdin());
        let stdout = tokio::io::stdout();
        self.serve(stdin, stdout).await
    }

    /// Serve over any line-oriented reader and writer until EOF
    pub async fn serve<R, W>(&self, reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        info!("MCP server started, waiting for messages");
        let mut lines = reader.lines();

        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            debug!(request = %preview(line), "<-");

            let Some(out) = self.handler.handle_json(line).await else {
                continue;
            };
            debug!(response = %preview(&out), "->");

            writer.write_all(out.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await?;
        }

        info!("stdin closed, MCP server shutting down");
        Ok(())
    }
}

fn preview(text: &str) -> String {
    match text.char_indices().nth(LOG_PREVIEW) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
