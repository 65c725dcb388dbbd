//! End-to-end test over the stdio transport: spawns the real
//! `mcp-core-demo` binary as a child process and drives it with
//! [`McpClient`], the literal shape of scenario 6 in the spec ("a client
//! spawns `my-server --stdio`, writes a request to its stdin, reads the
//! response from its stdout").
//!
//! `env!("CARGO_BIN_EXE_mcp-core-demo")` is populated by cargo for
//! integration tests in a crate that also builds a `[[bin]]` target, so
//! this spawns the actual compiled binary rather than a stand-in.

use serde_json::json;

use mcp_core::config::ClientConfig;
use mcp_core::McpClient;

#[tokio::test]
async fn client_completes_the_handshake_and_calls_a_tool_over_a_real_child_process() {
    let command = format!("{} --transport stdio", env!("CARGO_BIN_EXE_mcp-core-demo"));
    let config = ClientConfig::for_stdio("e2e-test-client", "0.0.1");

    let client = McpClient::connect_stdio(&command, &config).await.expect("demo binary spawns and connects");

    let init = client.initialize("e2e-test-client", "0.0.1").await.expect("initialize succeeds");
    assert_eq!(init.server_info.name, "mcp-core-demo");

    let tools = client.list_tools().await.expect("tools/list succeeds");
    assert!(tools.iter().any(|tool| tool.name == "add"));
    assert!(tools.iter().any(|tool| tool.name == "echo"));

    let result = client.call_tool("add", json!({"a": 4, "b": 5})).await.expect("tools/call succeeds");
    assert!(!result.is_error);
    assert_eq!(result.content[0].as_text(), Some("9"));

    let echoed = client.call_tool("echo", json!({"hello": "world"})).await.expect("echo call succeeds");
    assert!(!echoed.is_error);

    client.close().await;
}

#[tokio::test]
async fn unknown_tool_over_stdio_is_an_error_result_not_a_transport_failure() {
    let command = format!("{} --transport stdio", env!("CARGO_BIN_EXE_mcp-core-demo"));
    let config = ClientConfig::for_stdio("e2e-test-client", "0.0.1");

    let client = McpClient::connect_stdio(&command, &config).await.expect("demo binary spawns and connects");
    client.initialize("e2e-test-client", "0.0.1").await.expect("initialize succeeds");

    let result = client.call_tool("does-not-exist", json!({})).await;
    assert!(result.is_err());

    client.close().await;
}
