/*!
Stream ingestor turning a line-oriented telemetry feed into validated events.

The feed may never end. Lines are pulled one at a time, so memory use is bounded
by the longest accepted line regardless of how long the feed runs.
*/

use std::pin::Pin;

use iot_audit_trail::DeviceEvent;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio_stream::Stream;
use tracing::{debug, info};

use crate::core::{
    config::{InputConfig, InputSource},
    error::{AuditorError, IngestionError, IngestionErrorKind},
};

pub type IngestStream = Pin<Box<dyn Stream<Item = IngestEvent> + Send>>;

/// Items emitted by the ingest stream. The stream ends once, at end of input.
#[derive(Debug)]
pub enum IngestEvent {
    /// A well-formed event ready for classification
    Accepted { line: u64, event: DeviceEvent },
    /// A line that was skipped
    Rejected(IngestionError),
    /// The input itself failed; no further items follow
    ReadFailed { line: u64, error: std::io::Error },
}

enum LineRead {
    Eof,
    Line,
    Oversized,
}

/// Pulls lines from any buffered async reader
pub struct LineIngestor<R> {
    reader: R,
    max_line_bytes: usize,
}

impl<R> LineIngestor<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    pub fn new(reader: R, max_line_bytes: usize) -> Self {
        Self {
            reader,
            max_line_bytes,
        }
    }

    /// Lazy, single-pass stream over the input
    pub fn into_stream(self) -> impl Stream<Item = IngestEvent> + Send {
        let LineIngestor {
            mut reader,
            max_line_bytes,
        } = self;

        async_stream::stream! {
            let mut buf = Vec::new();
            let mut line = 0u64;

            loop {
                let read = read_line(&mut reader, &mut buf, max_line_bytes).await;
                line += 1;
                match read {
                    Ok(LineRead::Eof) => {
                        debug!("Input closed after {} lines", line - 1);
                        break;
                    }
                    Ok(LineRead::Oversized) => {
                        yield IngestEvent::Rejected(IngestionError {
                            line,
                            kind: IngestionErrorKind::MalformedRecord(format!(
                                "line exceeds {} bytes",
                                max_line_bytes
                            )),
                        });
                    }
                    Ok(LineRead::Line) => {
                        if let Some(item) = classify_line(line, &buf) {
                            yield item;
                        }
                    }
                    Err(error) => {
                        yield IngestEvent::ReadFailed { line, error };
                        break;
                    }
                }
            }
        }
    }
}

/// Read up to and including the next newline without buffering more than
/// `limit` bytes of line content. An oversized line is drained and discarded.
async fn read_line<R>(reader: &mut R, buf: &mut Vec<u8>, limit: usize) -> std::io::Result<LineRead>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    let read = (&mut *reader).take(limit as u64 + 1).read_until(b'\n', buf).await?;
    if read == 0 {
        return Ok(LineRead::Eof);
    }
    if buf.last() == Some(&b'\n') || buf.len() <= limit {
        return Ok(LineRead::Line);
    }

    let mut scratch = Vec::new();
    loop {
        scratch.clear();
        let drained = (&mut *reader).take(limit as u64).read_until(b'\n', &mut scratch).await?;
        if drained == 0 || scratch.last() == Some(&b'\n') {
            break;
        }
    }
    Ok(LineRead::Oversized)
}

/// Classify one raw line. Blank lines produce nothing.
pub fn classify_line(line: u64, bytes: &[u8]) -> Option<IngestEvent> {
    let text = match std::str::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => {
            return Some(IngestEvent::Rejected(IngestionError {
                line,
                kind: IngestionErrorKind::MalformedRecord(format!("invalid UTF-8: {}", e)),
            }));
        }
    };

    if text.trim().is_empty() {
        return None;
    }

    Some(match DeviceEvent::from_json_line(text) {
        Ok(event) => IngestEvent::Accepted { line, event },
        Err(e) => IngestEvent::Rejected(IngestionError {
            line,
            kind: e.into(),
        }),
    })
}

/// Opens the configured input and hands out its ingest stream
pub struct EventProcessor {
    config: InputConfig,
}

impl EventProcessor {
    pub fn new(config: InputConfig) -> Self {
        Self { config }
    }

    /// Open the input source. For TCP this waits for the event source to connect.
    pub async fn open(&self) -> Result<Box<dyn AsyncBufRead + Unpin + Send>, AuditorError> {
        match &self.config.source {
            InputSource::Stdin => {
                info!("Reading events from standard input");
                Ok(Box::new(BufReader::new(tokio::io::stdin())))
            }
            InputSource::File { path } => {
                let file = tokio::fs::File::open(path).await.map_err(AuditorError::Input)?;
                info!("Reading events from {:?}", path);
                Ok(Box::new(BufReader::new(file)))
            }
            InputSource::Tcp { listen } => {
                let listener = tokio::net::TcpListener::bind(listen.as_str())
                    .await
                    .map_err(AuditorError::Input)?;
                info!("Waiting for event source on {}", listen);
                let (socket, peer) = listener.accept().await.map_err(AuditorError::Input)?;
                info!("Event source connected from {}", peer);
                Ok(Box::new(BufReader::new(socket)))
            }
        }
    }

    /// Start the ingest stream over the configured input
    pub async fn start(&self) -> Result<IngestStream, AuditorError> {
        let reader = self.open().await?;
        Ok(Box::pin(LineIngestor::new(reader, self.config.max_line_bytes).into_stream()))
    }
}
