//! End-to-end DAP session tests over an in-process TCP pair.

mod mock_oracle;

use std::net::TcpListener;
use std::thread;

use serde_json::{json, Value};

use argdap::dap::session::DebugSession;
use argdap::dap::transport::TcpTransport;
use argdap::debugger::Debugger;
use dap_client::DapClient;
use mock_oracle::{loc, span, ArgFixture};

fn spawn_session(fixture: ArgFixture) -> (DapClient, thread::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind test port");
    let addr = listener.local_addr().expect("local addr");
    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().expect("accept");
        let transport = TcpTransport::new(stream, None, false).expect("transport");
        let debugger = Debugger::new(Box::new(fixture.oracle()));
        let _ = DebugSession::new(transport, debugger).run();
    });
    let client = DapClient::connect(addr).expect("connect");
    (client, handle)
}

fn assert_success(response: &Value) {
    assert_eq!(
        response.get("success").and_then(Value::as_bool),
        Some(true),
        "response: {response}"
    );
}

/// `main` spawning `work` as a thread, with state and eval fixtures.
fn spawn_fixture() -> ArgFixture {
    ArgFixture::new()
        .node("A", "cA", "main", loc("main.c", 5, 3))
        .node("A2", "cA2", "main", loc("main.c", 6, 3))
        .node("E", "cE", "work", loc("work.c", 10, 1))
        .node("R", "cR", "work", span("work.c", 11, 1, 12, 2))
        .cfg("A", "A2", "spawn(work);")
        .cfg("E", "R", "r = 0;")
        .entry("A", "E", "work", &["arg"], true)
        .ret("R", "A2")
        .entry_node("A")
        .state(
            "E",
            json!({
                "base": {"x": 5, "tmp___0": 1},
                "mutex": ["m"],
            }),
        )
        .eval("E", "x", 5)
}

#[test]
fn full_session_flow() -> anyhow::Result<()> {
    let (mut client, handle) = spawn_session(spawn_fixture());

    let response = client.request("initialize", json!({ "adapterID": "argdap" }))?;
    assert_success(&response);
    let capabilities = response.get("body").expect("capabilities");
    assert_eq!(
        capabilities.get("supportsStepInTargetsRequest"),
        Some(&Value::Bool(true))
    );
    assert_eq!(capabilities.get("supportsStepBack"), Some(&Value::Bool(true)));

    let response = client.request("launch", json!({}))?;
    assert_success(&response);
    client.wait_for_event("initialized")?;

    let response = client.request(
        "setBreakpoints",
        json!({
            "source": { "path": "main.c" },
            "breakpoints": [{ "line": 5 }],
        }),
    )?;
    assert_success(&response);
    let verified = response["body"]["breakpoints"][0]["verified"].as_bool();
    assert_eq!(verified, Some(true));

    let response = client.request("configurationDone", json!({}))?;
    assert_success(&response);
    let stopped = client.wait_for_event("stopped")?;
    assert_eq!(stopped["body"]["reason"].as_str(), Some("breakpoint"));
    assert_eq!(stopped["body"]["allThreadsStopped"].as_bool(), Some(true));
    let thread_id = stopped["body"]["threadId"].as_i64().expect("thread id");

    let response = client.request("threads", json!({}))?;
    assert_success(&response);
    let threads = response["body"]["threads"].as_array().expect("threads");
    assert_eq!(threads.len(), 1);
    assert_eq!(threads[0]["name"].as_str(), Some("breakpoint A"));

    // The only step-in target is the thread spawn.
    let frame_id = thread_id * 100_000;
    let response = client.request("stepInTargets", json!({ "frameId": frame_id }))?;
    assert_success(&response);
    let targets = response["body"]["targets"].as_array().expect("targets");
    assert_eq!(targets.len(), 1);
    assert_eq!(targets[0]["label"].as_str(), Some("thread: work(arg)"));

    let response = client.request("stepIn", json!({ "threadId": thread_id }))?;
    assert_success(&response);
    client.wait_for_event("stopped")?;

    let response = client.request("stackTrace", json!({ "threadId": thread_id }))?;
    assert_success(&response);
    let frames = response["body"]["stackFrames"].as_array().expect("frames");
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0]["name"].as_str(), Some("work"));
    // The caller frame belongs to the spawning parent thread.
    assert_eq!(frames[1]["name"].as_str(), Some("^main"));
    assert_eq!(frames[0]["id"].as_i64(), Some(frame_id));

    let response = client.request("scopes", json!({ "frameId": frame_id }))?;
    assert_success(&response);
    let scopes = response["body"]["scopes"].as_array().expect("scopes");
    let names: Vec<&str> = scopes
        .iter()
        .filter_map(|scope| scope["name"].as_str())
        .collect();
    assert_eq!(names, vec!["All", "Raw"]);

    let all_ref = scopes[0]["variablesReference"].as_i64().expect("reference");
    let response = client.request("variables", json!({ "variablesReference": all_ref }))?;
    assert_success(&response);
    let variables = response["body"]["variables"].as_array().expect("variables");
    let names: Vec<&str> = variables
        .iter()
        .filter_map(|variable| variable["name"].as_str())
        .collect();
    assert_eq!(names, vec!["x", "<locked>"], "temporaries stay hidden");

    let response = client.request(
        "evaluate",
        json!({ "expression": "x", "frameId": frame_id }),
    )?;
    assert_success(&response);
    assert_eq!(response["body"]["result"].as_str(), Some("5"));

    let response = client.request(
        "evaluate",
        json!({ "expression": "y y", "frameId": frame_id }),
    )?;
    assert_eq!(response["success"].as_bool(), Some(false));
    assert_eq!(response["message"].as_str(), Some("cannot evaluate: y y"));

    // goto stays unsupported instead of growing invented semantics.
    let response = client.request("goto", json!({}))?;
    assert_eq!(response["success"].as_bool(), Some(false));
    assert_eq!(
        response["message"].as_str(),
        Some("Request \"goto\" is not supported")
    );

    let response = client.request("disconnect", json!({}))?;
    assert_success(&response);
    handle.join().expect("session thread");
    Ok(())
}

#[test]
fn entry_stop_and_termination_without_breakpoints() -> anyhow::Result<()> {
    let fixture = ArgFixture::new()
        .node("A", "cA", "main", loc("main.c", 2, 3))
        .node("B", "cB", "main", loc("main.c", 3, 3))
        .cfg("A", "B", "x = 1;")
        .entry_node("A");
    let (mut client, handle) = spawn_session(fixture);

    assert_success(&client.request("initialize", json!({}))?);
    assert_success(&client.request("launch", json!({}))?);
    client.wait_for_event("initialized")?;

    assert_success(&client.request("configurationDone", json!({}))?);
    let stopped = client.wait_for_event("stopped")?;
    assert_eq!(stopped["body"]["reason"].as_str(), Some("entry"));

    let response = client.request("threads", json!({}))?;
    let threads = response["body"]["threads"].as_array().expect("threads");
    assert_eq!(threads[0]["name"].as_str(), Some("entry A"));

    // The synthetic entry stop is the only one: continuing terminates.
    let response = client.request("continue", json!({ "threadId": 1 }))?;
    assert_success(&response);
    client.wait_for_event("terminated")?;

    // Step errors surface verbatim as request failures.
    let response = client.request("next", json!({ "threadId": 1 }))?;
    assert_success(&response);
    let response = client.request("next", json!({ "threadId": 1 }))?;
    assert_eq!(response["success"].as_bool(), Some(false));
    assert_eq!(response["message"].as_str(), Some("Reached last statement"));

    assert_success(&client.request("disconnect", json!({}))?);
    handle.join().expect("session thread");
    Ok(())
}
