//! One DAP debug session: decode requests, drive the engine, answer.
//!
//! The session is a serialized request loop; the engine never runs outside
//! of it. Engine events are written to the wire before the response of the
//! request that produced them, matching the behavior known DAP clients
//! tolerate; `drain_events` is the single place to invert that order.

use std::path::{Path, PathBuf};

use anyhow::Context;
use log::{error, info, warn};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::dap::protocol::{DapEvent, DapRequest, DapResponse};
use crate::dap::transport::DapTransport;
use crate::debugger::error::Error;
use crate::debugger::{Debugger, EngineEvent};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SourceDto {
    path: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SourceBreakpointDto {
    line: u32,
    #[serde(default)]
    column: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetBreakpointsArgs {
    source: SourceDto,
    #[serde(default)]
    breakpoints: Vec<SourceBreakpointDto>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ThreadArgs {
    thread_id: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StepInArgs {
    thread_id: i64,
    #[serde(default)]
    target_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FrameArgs {
    frame_id: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VariablesArgs {
    variables_reference: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EvaluateArgs {
    expression: String,
    #[serde(default)]
    frame_id: Option<i64>,
}

pub struct DebugSession<T: DapTransport> {
    transport: T,
    debugger: Debugger,
    next_seq: i64,
    workdir: PathBuf,
}

impl<T: DapTransport> DebugSession<T> {
    pub fn new(transport: T, debugger: Debugger) -> Self {
        Self {
            transport,
            debugger,
            next_seq: 1,
            workdir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    pub fn run(mut self) -> anyhow::Result<()> {
        loop {
            let message = self.transport.read_message()?;
            let request: DapRequest =
                serde_json::from_value(message).context("malformed DAP request")?;

            match self.handle(&request) {
                Ok(body) => {
                    self.drain_events()?;
                    let seq = self.bump_seq();
                    let response = DapResponse::success(seq, &request, body);
                    self.transport
                        .write_message(&serde_json::to_value(&response)?)?;
                    match request.command.as_str() {
                        "launch" | "attach" => self.send_event("initialized", None)?,
                        "disconnect" => {
                            info!(target: "dap", "client disconnected");
                            return Ok(());
                        }
                        _ => {}
                    }
                }
                Err(err) => {
                    let message = if err.is_user_facing() || err.is_transport() {
                        err.to_string()
                    } else {
                        error!(target: "dap", "request {} failed: {err}", request.command);
                        "Internal error".to_string()
                    };
                    if err.is_transport() {
                        warn!(target: "dap", "oracle failure on {}: {err}", request.command);
                    }
                    let seq = self.bump_seq();
                    let response = DapResponse::error(seq, &request, message);
                    self.transport
                        .write_message(&serde_json::to_value(&response)?)?;
                }
            }
        }
    }

    fn handle(&mut self, request: &DapRequest) -> Result<Option<Value>, Error> {
        match request.command.as_str() {
            "initialize" => Ok(Some(json!({
                "supportsConfigurationDoneRequest": true,
                "supportsStepInTargetsRequest": true,
                "supportsStepBack": true,
            }))),
            "launch" | "attach" => {
                self.debugger.reset();
                Ok(None)
            }
            "setBreakpoints" => self.set_breakpoints(&request.arguments),
            "setExceptionBreakpoints" => Ok(Some(json!({ "breakpoints": [] }))),
            "configurationDone" => {
                self.debugger.continue_to_next()?;
                Ok(None)
            }
            "disconnect" => Ok(None),
            "continue" => {
                let _args: ThreadArgs = parse(&request.arguments)?;
                self.debugger.continue_to_next()?;
                Ok(Some(json!({ "allThreadsContinued": true })))
            }
            "reverseContinue" => {
                let _args: ThreadArgs = parse(&request.arguments)?;
                self.debugger.continue_to_previous()?;
                Ok(None)
            }
            "next" => {
                let args: ThreadArgs = parse(&request.arguments)?;
                self.debugger.step_over(args.thread_id)?;
                Ok(None)
            }
            "stepIn" => {
                let args: StepInArgs = parse(&request.arguments)?;
                self.debugger.step_in(args.thread_id, args.target_id)?;
                Ok(None)
            }
            "stepInTargets" => {
                let args: FrameArgs = parse(&request.arguments)?;
                let targets = self.debugger.step_in_targets(args.frame_id)?;
                let targets: Vec<Value> = targets
                    .iter()
                    .map(|target| {
                        json!({
                            "id": target.id,
                            "label": target.label,
                            "line": target.line,
                            "column": target.column,
                            "endLine": target.end_line,
                            "endColumn": target.end_column,
                        })
                    })
                    .collect();
                Ok(Some(json!({ "targets": targets })))
            }
            "stepOut" => {
                let args: ThreadArgs = parse(&request.arguments)?;
                self.debugger.step_out(args.thread_id)?;
                Ok(None)
            }
            "stepBack" => {
                let args: ThreadArgs = parse(&request.arguments)?;
                self.debugger.step_back(args.thread_id)?;
                Ok(None)
            }
            "threads" => {
                let threads: Vec<Value> = self
                    .debugger
                    .threads()
                    .iter()
                    .map(|(id, name)| json!({ "id": id, "name": name }))
                    .collect();
                Ok(Some(json!({ "threads": threads })))
            }
            "stackTrace" => self.stack_trace(&request.arguments),
            "scopes" => {
                let args: FrameArgs = parse(&request.arguments)?;
                let scopes: Vec<Value> = self
                    .debugger
                    .scopes(args.frame_id)?
                    .iter()
                    .map(|scope| {
                        json!({
                            "name": scope.name,
                            "variablesReference": scope.variables_reference,
                            "expensive": false,
                        })
                    })
                    .collect();
                Ok(Some(json!({ "scopes": scopes })))
            }
            "variables" => {
                let args: VariablesArgs = parse(&request.arguments)?;
                let variables: Vec<Value> = self
                    .debugger
                    .variables(args.variables_reference)?
                    .iter()
                    .map(|variable| {
                        json!({
                            "name": variable.name,
                            "value": variable.value,
                            "variablesReference": variable.variables_reference,
                        })
                    })
                    .collect();
                Ok(Some(json!({ "variables": variables })))
            }
            "evaluate" => {
                let args: EvaluateArgs = parse(&request.arguments)?;
                let result = self.debugger.evaluate(args.frame_id, &args.expression)?;
                Ok(Some(json!({
                    "result": result.value.to_string(),
                    "variablesReference": 0,
                })))
            }
            unknown => Err(Error::UnsupportedRequest(unknown.to_string())),
        }
    }

    fn set_breakpoints(&mut self, arguments: &Value) -> Result<Option<Value>, Error> {
        let args: SetBreakpointsArgs = parse(arguments)?;
        let path = args
            .source
            .path
            .ok_or_else(|| Error::InvalidArguments("missing source path".to_string()))?;
        let relative = self.relativize(&path);
        let lines: Vec<(u32, u32)> = args
            .breakpoints
            .iter()
            .map(|bp| (bp.line, bp.column.unwrap_or(0)))
            .collect();
        self.debugger.set_breakpoints(&relative, &lines);

        let breakpoints: Vec<Value> = args
            .breakpoints
            .iter()
            .map(|bp| json!({ "verified": true, "line": bp.line }))
            .collect();
        Ok(Some(json!({ "breakpoints": breakpoints })))
    }

    fn stack_trace(&mut self, arguments: &Value) -> Result<Option<Value>, Error> {
        let args: ThreadArgs = parse(arguments)?;
        let frames = self.debugger.stack_trace(args.thread_id)?;
        let frames: Vec<Value> = frames
            .iter()
            .map(|frame| {
                // Frames of a spawning parent thread are marked so the user
                // can tell them from the thread's own frames.
                let prefix = if frame.foreign { "^" } else { "" };
                match (&frame.function, &frame.location) {
                    (Some(function), Some(location)) => json!({
                        "id": frame.id,
                        "name": format!("{prefix}{function}"),
                        "source": {
                            "name": file_name(&location.file),
                            "path": self.absolutize(&location.file),
                        },
                        "line": location.line,
                        "column": location.column,
                        "endLine": location.end_line,
                        "endColumn": location.end_column,
                    }),
                    _ => json!({
                        "id": frame.id,
                        "name": format!("{prefix}<unavailable>"),
                        "line": 0,
                        "column": 0,
                    }),
                }
            })
            .collect();
        Ok(Some(json!({
            "totalFrames": frames.len(),
            "stackFrames": frames,
        })))
    }

    fn drain_events(&mut self) -> anyhow::Result<()> {
        for event in self.debugger.take_events() {
            match event {
                EngineEvent::Stopped { reason, thread_id } => self.send_event(
                    "stopped",
                    Some(json!({
                        "reason": reason.as_str(),
                        "threadId": thread_id,
                        "allThreadsStopped": true,
                    })),
                )?,
                EngineEvent::Terminated => self.send_event("terminated", None)?,
            }
        }
        Ok(())
    }

    fn send_event(&mut self, event: &'static str, body: Option<Value>) -> anyhow::Result<()> {
        let seq = self.bump_seq();
        let message = DapEvent::new(seq, event, body);
        self.transport
            .write_message(&serde_json::to_value(&message)?)
    }

    fn bump_seq(&mut self) -> i64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    /// Client paths arrive absolute; the oracle speaks project-relative
    /// paths rooted at the working directory.
    fn relativize(&self, path: &str) -> String {
        Path::new(path)
            .strip_prefix(&self.workdir)
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|_| path.to_string())
    }

    fn absolutize(&self, path: &str) -> String {
        if Path::new(path).is_absolute() {
            path.to_string()
        } else {
            self.workdir.join(path).to_string_lossy().into_owned()
        }
    }
}

fn parse<A: DeserializeOwned>(arguments: &Value) -> Result<A, Error> {
    serde_json::from_value(arguments.clone()).map_err(|err| Error::InvalidArguments(err.to_string()))
}

fn file_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}
