//! Server-sent-event framing: `data:` lines grouped into blank-line terminated blocks.

use std::collections::VecDeque;

use async_trait::async_trait;

use crate::abort::AbortSignal;
use crate::error::{GogoError, GogoErrorCode};

const DATA_PREFIX: &str = "data:";

#[async_trait]
pub trait ChunkSource: Send {
    /// Next raw chunk of the body, `None` at end of stream.
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, GogoError>;
}

#[async_trait]
impl ChunkSource for reqwest::Response {
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, GogoError> {
        self.chunk()
            .await
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()))
            .map_err(|error| {
                GogoError::new(
                    GogoErrorCode::ProviderTransport,
                    format!("stream read failed: {error}"),
                )
            })
    }
}

#[async_trait]
impl ChunkSource for VecDeque<Vec<u8>> {
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, GogoError> {
        Ok(self.pop_front())
    }
}

pub struct EventReader<S> {
    source: S,
    signal: Option<AbortSignal>,
    buffer: Vec<u8>,
    data_lines: Vec<String>,
    eof: bool,
    failed: bool,
}

impl<S: ChunkSource> EventReader<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            signal: None,
            buffer: Vec::new(),
            data_lines: Vec::new(),
            eof: false,
            failed: false,
        }
    }

    pub fn with_signal(mut self, signal: Option<AbortSignal>) -> Self {
        self.signal = signal;
        self
    }

    /// Returns the next payload, or `None` once the stream is exhausted.
    ///
    /// After an error the reader yields nothing further and anything buffered is dropped.
    pub async fn next_payload(&mut self) -> Result<Option<String>, GogoError> {
        if self.failed {
            return Ok(None);
        }

        loop {
            while let Some(line) = self.take_line()? {
                if line.is_empty() {
                    if let Some(payload) = self.flush_block() {
                        return Ok(Some(payload));
                    }
                    continue;
                }
                self.push_line(&line);
            }

            if self.eof {
                if !self.buffer.is_empty() {
                    let rest = std::mem::take(&mut self.buffer);
                    let line = self.decode_line(rest)?;
                    self.push_line(&line);
                }
                return Ok(self.flush_block());
            }

            match self.read_chunk().await {
                Ok(Some(chunk)) => self.buffer.extend_from_slice(&chunk),
                Ok(None) => self.eof = true,
                Err(error) => return Err(self.fail(error)),
            }
        }
    }

    async fn read_chunk(&mut self) -> Result<Option<Vec<u8>>, GogoError> {
        let Some(signal) = self.signal.as_ref() else {
            return self.source.next_chunk().await;
        };
        if signal.is_aborted() {
            return Err(GogoError::aborted());
        }
        tokio::select! {
            _ = signal.cancelled() => Err(GogoError::aborted()),
            chunk = self.source.next_chunk() => chunk,
        }
    }

    fn take_line(&mut self) -> Result<Option<String>, GogoError> {
        let Some(newline) = self.buffer.iter().position(|byte| *byte == b'\n') else {
            return Ok(None);
        };
        let mut line: Vec<u8> = self.buffer.drain(..=newline).collect();
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        self.decode_line(line).map(Some)
    }

    fn decode_line(&mut self, line: Vec<u8>) -> Result<String, GogoError> {
        String::from_utf8(line).map_err(|error| {
            self.fail(GogoError::new(
                GogoErrorCode::ProviderProtocol,
                format!("stream line is not valid UTF-8: {error}"),
            ))
        })
    }

    fn push_line(&mut self, line: &str) {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if let Some(data) = line.strip_prefix(DATA_PREFIX) {
            self.data_lines.push(data.trim_start().to_string());
        }
    }

    fn flush_block(&mut self) -> Option<String> {
        if self.data_lines.is_empty() {
            return None;
        }
        let payload = self.data_lines.join("\n");
        self.data_lines.clear();
        Some(payload)
    }

    fn fail(&mut self, error: GogoError) -> GogoError {
        self.failed = true;
        self.buffer.clear();
        self.data_lines.clear();
        error
    }
}
