use parking_lot::Mutex;
use std::io::Write;
use std::sync::Arc;

use super::Response;

/// Destination of finalized responses.
///
/// The kernel calls [`emit`](ResponseSink::emit) exactly once per dispatch at
/// SEND_RESPONSE, unless a listener already forced emission.
pub trait ResponseSink: Send + Sync {
    /// Write the response. `headers_only` is set for HEAD requests and quiet mode.
    fn emit(&self, response: &Response, headers_only: bool) -> anyhow::Result<()>;
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ResponseSink for NullSink {
    fn emit(&self, _response: &Response, _headers_only: bool) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Collects emitted bodies in memory; `mock` uses one per call.
#[derive(Debug, Default, Clone)]
pub struct BufferSink {
    buffer: Arc<Mutex<Vec<u8>>>,
    emitted: Arc<Mutex<Vec<Response>>>,
}

impl BufferSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Body bytes emitted so far, concatenated.
    #[must_use]
    pub fn output(&self) -> Vec<u8> {
        self.buffer.lock().clone()
    }

    #[must_use]
    pub fn output_string(&self) -> String {
        String::from_utf8_lossy(&self.buffer.lock()).into_owned()
    }

    /// Every response passed to `emit`, in order.
    #[must_use]
    pub fn responses(&self) -> Vec<Response> {
        self.emitted.lock().clone()
    }
}

impl ResponseSink for BufferSink {
    fn emit(&self, response: &Response, headers_only: bool) -> anyhow::Result<()> {
        if !headers_only {
            self.buffer.lock().extend_from_slice(&response.body);
        }
        self.emitted.lock().push(response.clone());
        Ok(())
    }
}

/// Writes HTTP/1.1 wire text to any writer (a socket, stdout, a file).
pub struct WriterSink<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

impl<W: Write + Send> ResponseSink for WriterSink<W> {
    fn emit(&self, response: &Response, headers_only: bool) -> anyhow::Result<()> {
        let mut writer = self.writer.lock();
        writer.write_all(&response.to_wire(headers_only))?;
        writer.flush()?;
        Ok(())
    }
}
