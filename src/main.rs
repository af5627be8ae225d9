//! argdap - Debug Adapter Protocol server for an abstract debugger.
//!
//! Exposes a DAP endpoint over TCP and navigates the abstract reachability
//! graph served by a static analyzer's oracle endpoint. Intended as a
//! building block for IDE integrations (VSCode, etc.).

use anyhow::Context;
use clap::Parser;
use log::{info, warn};
use std::net::{SocketAddr, TcpListener};

use argdap::dap::args::Args;
use argdap::dap::session::DebugSession;
use argdap::dap::tracer::FileTracer;
use argdap::dap::transport::{StdioTransport, TcpTransport};
use argdap::debugger::oracle::JsonRpcOracle;
use argdap::debugger::Debugger;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args = Args::parse();
    if args.stdio {
        let oracle = JsonRpcOracle::connect(&args.oracle).context("connect to analyzer")?;
        let session = DebugSession::new(StdioTransport::new(), Debugger::new(Box::new(oracle)));
        return session.run();
    }

    let addr: SocketAddr = args.listen.parse().context("invalid listen address")?;
    let listener = TcpListener::bind(addr).with_context(|| format!("bind {addr}"))?;
    info!(target: "dap", "argdap listening on {addr}");

    let tracer = match &args.log_file {
        Some(path) => Some(FileTracer::new(path)?),
        None => None,
    };
    if args.trace_dap && tracer.is_none() {
        warn!(target: "dap", "--trace-dap requires --log-file; tracing disabled");
    }

    // Server mode: accept clients sequentially. One client == one debug
    // session, each with a fresh oracle connection.
    loop {
        let (stream, peer) = match listener.accept() {
            Ok(accepted) => accepted,
            Err(err) => {
                warn!(target: "dap", "accept failed: {err:#}");
                continue;
            }
        };
        info!(target: "dap", "DAP client connected: {peer}");
        if let Some(tracer) = &tracer {
            tracer.line(&format!("client connected: {peer}"));
        }

        let transport = match TcpTransport::new(stream, tracer.clone(), args.trace_dap) {
            Ok(transport) => transport,
            Err(err) => {
                warn!(target: "dap", "failed to init DAP I/O: {err:#}");
                continue;
            }
        };
        let oracle = match JsonRpcOracle::connect(&args.oracle) {
            Ok(oracle) => oracle,
            Err(err) => {
                warn!(target: "dap", "analyzer connection failed: {err:#}");
                continue;
            }
        };

        let session = DebugSession::new(transport, Debugger::new(Box::new(oracle)));
        match session.run() {
            Ok(()) => {
                if let Some(tracer) = &tracer {
                    tracer.line("session finished OK");
                }
            }
            Err(err) => {
                warn!(target: "dap", "session ended with error: {err:#}");
                if let Some(tracer) = &tracer {
                    tracer.line(&format!("session error: {err:#}"));
                }
            }
        }

        if args.oneshot {
            break;
        }
    }
    Ok(())
}
