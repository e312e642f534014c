//! End-to-end properties of the command gateway, exercised against real
//! harmless binaries through an injected tool name, allow-list and resolver.

use std::sync::Arc;
use std::time::{Duration, Instant};

use vaultkeeper_gateway::config::GatewayConfig;
use vaultkeeper_gateway::gateway::{
    escape_shell_argument, CommandGateway, CommandRequest, FixedResolver, PlatformGateway,
    SENTINEL_EXIT_CODE,
};

fn gateway_for(tool: &str, allow: &[&str], max_concurrent: usize) -> CommandGateway {
    let config = GatewayConfig {
        tool: tool.to_string(),
        allow_list: allow.iter().map(|s| s.to_string()).collect(),
        max_concurrent,
        ..GatewayConfig::default()
    };
    let path = which::which(tool).expect("test binary must exist");
    CommandGateway::new(config, Arc::new(FixedResolver::new(path)))
}

#[tokio::test]
async fn test_admission_cap_rejects_excess_commands() {
    let cap = 2;
    let gateway = Arc::new(gateway_for("sleep", &["sleep"], cap));

    // One more command than the cap allows, all issued concurrently.
    let tasks: Vec<_> = (0..cap + 1)
        .map(|_| {
            let gateway = Arc::clone(&gateway);
            tokio::spawn(async move { gateway.execute(CommandRequest::new("sleep 1")).await })
        })
        .collect();

    // While the admitted commands run, the counter must never exceed the cap.
    for _ in 0..10 {
        assert!(gateway.active_count() <= cap);
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    let results = futures::future::join_all(tasks).await;
    let results: Vec<_> = results.into_iter().map(|r| r.unwrap()).collect();

    let rejected: Vec<_> = results.iter().filter(|r| !r.success).collect();
    assert!(
        !rejected.is_empty(),
        "at least one command must hit the concurrency limit"
    );
    for result in &rejected {
        assert!(result.stderr.contains("too many concurrent commands"));
        assert_eq!(result.exit_code, SENTINEL_EXIT_CODE);
    }
    assert_eq!(gateway.active_count(), 0);
}

#[tokio::test]
async fn test_slot_accounting_round_trip() {
    let gateway = Arc::new(gateway_for("sleep", &["sleep"], 5));

    // A mix of success, non-zero exit and timeout.
    let outcomes = futures::future::join_all([
        gateway.execute(CommandRequest::new("sleep 0.2")),
        gateway.execute(CommandRequest::new("sleep --definitely-bad-flag")),
        gateway.execute(CommandRequest::new("sleep 10").timeout(Duration::from_secs(1))),
    ])
    .await;

    assert!(outcomes[0].success);
    assert!(!outcomes[1].success);
    assert!(outcomes[1].exit_code > 0);
    assert!(!outcomes[2].success);
    assert!(outcomes[2].stderr.contains("timed out"));

    assert_eq!(
        gateway.active_count(),
        0,
        "all slots must be released after mixed outcomes"
    );
}

#[tokio::test]
async fn test_escaped_argument_with_spaces_survives_end_to_end() {
    let gateway = gateway_for("echo", &["echo"], 5);

    let value = "it's got  double  spaces";
    let command = format!("echo {}", escape_shell_argument(value));
    let result = gateway.execute(CommandRequest::new(command)).await;

    assert!(result.success);
    assert_eq!(result.stdout, format!("{value}\n"));
}

#[tokio::test]
async fn test_timeout_is_bounded() {
    let gateway = gateway_for("sleep", &["sleep"], 5);

    let start = Instant::now();
    let result = gateway
        .execute(CommandRequest::new("sleep 10").timeout(Duration::from_secs(1)))
        .await;
    let elapsed = start.elapsed();

    assert!(!result.success);
    assert!(result.stderr.contains("timed out after 1s"));
    assert!(
        elapsed >= Duration::from_secs(1) && elapsed < Duration::from_secs(4),
        "timeout must fire within a bounded margin, took {elapsed:?}"
    );
}

#[tokio::test]
async fn test_tool_not_found_is_distinct_from_signed_out() {
    // Tool absent from every candidate path.
    let missing = PlatformGateway::with_resolver(
        GatewayConfig {
            tool: "az".to_string(),
            allow_list: vec!["az account show".to_string()],
            ..GatewayConfig::default()
        },
        Arc::new(FixedResolver::new("/nonexistent/bin/az")),
    );
    assert!(!missing.check_availability().await);
    let result = missing.execute("az account show").await;
    assert!(result.stderr.contains("not found"));

    // Tool present but the session probe exits non-zero: signed out, not
    // missing.
    let signed_out = gateway_for("false", &["false"], 5);
    assert!(signed_out.check_availability());
    assert!(!signed_out.is_authenticated().await);
    let result = signed_out.execute(CommandRequest::new("false account show")).await;
    assert!(!result.stderr.contains("not found"));
}

#[tokio::test]
async fn test_rejections_do_not_consume_slots() {
    let gateway = gateway_for("echo", &["echo safe"], 1);

    for command in ["", "rm -rf /", "echo safe; id", "echo not-listed"] {
        let result = gateway.execute(CommandRequest::new(command)).await;
        assert!(!result.success, "should reject: {command:?}");
        assert_eq!(gateway.active_count(), 0);
    }

    // The single slot is still usable afterwards.
    let result = gateway.execute(CommandRequest::new("echo safe")).await;
    assert!(result.success);
}

#[tokio::test]
async fn test_config_file_drives_adapter_end_to_end() {
    use std::io::Write;

    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "tool = \"echo\"").unwrap();
    writeln!(file, "allow_list = [\"echo\"]").unwrap();
    writeln!(file, "timeout_secs = 30").unwrap();
    writeln!(file, "max_concurrent = 2").unwrap();
    file.flush().unwrap();

    let config = GatewayConfig::load_from_path(file.path()).unwrap();
    let path = which::which("echo").unwrap();
    let adapter = PlatformGateway::with_resolver(config, Arc::new(FixedResolver::new(path)));

    let result = adapter.execute("echo from-config").await;
    assert!(result.success);
    assert!(result.stdout.contains("from-config"));
}
