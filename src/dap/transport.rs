//! DAP message transport with Content-Length framing.
//!
//! TCP for server mode, stdio for embedded mode. The TCP transport can
//! mirror traffic into a [`FileTracer`] for diagnostics.

use std::io::{self, BufRead, BufReader, Read, Stdin, Stdout, Write};
use std::net::TcpStream;

use anyhow::anyhow;
use serde_json::Value;

use crate::dap::tracer::FileTracer;

/// One framed DAP message in, one out.
pub trait DapTransport: Send {
    fn read_message(&mut self) -> anyhow::Result<Value>;
    fn write_message(&mut self, message: &Value) -> anyhow::Result<()>;
}

fn read_framed(reader: &mut impl BufRead) -> anyhow::Result<Value> {
    let mut content_length: Option<usize> = None;
    loop {
        let mut line = String::new();
        let read_n = reader.read_line(&mut line)?;
        if read_n == 0 {
            return Err(anyhow!("DAP connection closed"));
        }
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            break;
        }
        if let Some(value) = line.strip_prefix("Content-Length:") {
            content_length = Some(value.trim().parse()?);
        }
    }

    let len = content_length.ok_or_else(|| anyhow!("Missing Content-Length header"))?;
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;
    Ok(serde_json::from_slice(&buf)?)
}

fn write_framed(writer: &mut impl Write, payload: &[u8]) -> io::Result<()> {
    write!(writer, "Content-Length: {}\r\n\r\n", payload.len())?;
    writer.write_all(payload)?;
    writer.flush()
}

/// TCP-based DAP transport (server mode).
pub struct TcpTransport {
    stream: TcpStream,
    reader: BufReader<TcpStream>,
    tracer: Option<FileTracer>,
    trace: bool,
}

impl TcpTransport {
    pub fn new(
        stream: TcpStream,
        tracer: Option<FileTracer>,
        trace: bool,
    ) -> anyhow::Result<Self> {
        stream.set_nodelay(true)?;
        let reader = BufReader::new(stream.try_clone()?);
        Ok(Self {
            stream,
            reader,
            tracer,
            trace,
        })
    }

    fn trace_line(&self, direction: &str, message: &Value) {
        if !self.trace {
            return;
        }
        if let Some(tracer) = &self.tracer {
            if let Ok(line) = serde_json::to_string(message) {
                tracer.line(&format!("{direction} {line}"));
            }
        }
    }
}

impl DapTransport for TcpTransport {
    fn read_message(&mut self) -> anyhow::Result<Value> {
        let message = read_framed(&mut self.reader)?;
        self.trace_line("<-", &message);
        Ok(message)
    }

    fn write_message(&mut self, message: &Value) -> anyhow::Result<()> {
        self.trace_line("->", message);
        let payload = serde_json::to_vec(message)?;
        write_framed(&mut self.stream, &payload)?;
        Ok(())
    }
}

/// Stdio-based DAP transport (embedded mode).
pub struct StdioTransport {
    reader: BufReader<Stdin>,
    writer: Stdout,
}

impl StdioTransport {
    pub fn new() -> Self {
        Self {
            reader: BufReader::new(io::stdin()),
            writer: io::stdout(),
        }
    }
}

impl Default for StdioTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl DapTransport for StdioTransport {
    fn read_message(&mut self) -> anyhow::Result<Value> {
        read_framed(&mut self.reader)
    }

    fn write_message(&mut self, message: &Value) -> anyhow::Result<()> {
        let payload = serde_json::to_vec(message)?;
        write_framed(&mut self.writer, &payload)?;
        Ok(())
    }
}
