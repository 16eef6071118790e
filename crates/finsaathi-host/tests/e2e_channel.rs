// End-to-end tests for the channel daemon.
//
// Spins up a real daemon over TCP, connects a ChannelClient as the application
// layer would, and exercises the full call→handler→reply loop.

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;

use finsaathi_channel::{
    ChannelClient, GOOGLE_SIGN_IN_ERROR, MethodCall, Outcome, PERFORMANCE_CHANNEL,
};
use finsaathi_host::config::HostConfig;
use finsaathi_host::daemon::start_on_listener;
use finsaathi_host::handlers::{SignInProbe, StartupTuner};
use finsaathi_host::shell::{HostServices, HostShell};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct UnavailableProbe;

#[async_trait]
impl SignInProbe for UnavailableProbe {
    async fn readiness(&self) -> anyhow::Result<bool> {
        anyhow::bail!("sign-in client not configured")
    }
}

/// Start a daemon for `shell` and connect a client to it.
async fn setup(shell: HostShell) -> (ChannelClient, tokio::task::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server_handle = tokio::spawn(async move {
        let _ = start_on_listener(&listener, shell).await;
    });

    let stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    let (r, w) = tokio::io::split(stream);
    let client = ChannelClient::spawn(r, w);

    (client, server_handle)
}

async fn default_setup() -> (ChannelClient, tokio::task::JoinHandle<()>) {
    setup(HostShell::configure(HostConfig::default()).unwrap()).await
}

// ---------------------------------------------------------------------------
// Method contracts
// ---------------------------------------------------------------------------

#[tokio::test]
async fn e2e_optimize_performance_is_deterministic() {
    let (client, handle) = default_setup().await;

    for _ in 0..5 {
        let outcome = client
            .invoke(PERFORMANCE_CHANNEL, MethodCall::new("optimizePerformance"))
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::Success(json!(true)));
    }

    handle.abort();
}

#[tokio::test]
async fn e2e_check_google_sign_in() {
    let (client, handle) = default_setup().await;

    let outcome = client
        .invoke(PERFORMANCE_CHANNEL, MethodCall::new("checkGoogleSignIn"))
        .await
        .unwrap();
    assert_eq!(outcome, Outcome::Success(json!(true)));

    handle.abort();
}

#[tokio::test]
async fn e2e_check_google_sign_in_fault() {
    let services = HostServices {
        tuner: Arc::new(StartupTuner),
        sign_in: Arc::new(UnavailableProbe),
    };
    let shell = HostShell::with_services(HostConfig::default(), services).unwrap();
    let (client, handle) = setup(shell).await;

    match client
        .invoke(PERFORMANCE_CHANNEL, MethodCall::new("checkGoogleSignIn"))
        .await
        .unwrap()
    {
        Outcome::Failure(err) => {
            assert_eq!(err.code, GOOGLE_SIGN_IN_ERROR);
            assert!(!err.message.is_empty());
            assert!(err.details.is_none());
        }
        other => panic!("expected failure, got {:?}", other),
    }

    // The failure is per-call; the other method still works.
    let outcome = client
        .invoke(PERFORMANCE_CHANNEL, MethodCall::new("optimizePerformance"))
        .await
        .unwrap();
    assert_eq!(outcome, Outcome::Success(json!(true)));

    handle.abort();
}

#[tokio::test]
async fn e2e_unknown_method_any_payload() {
    let (client, handle) = default_setup().await;

    let payloads = [
        None,
        Some(json!(null)),
        Some(json!({"nested": {"deep": [1, 2, 3]}})),
        Some(json!("x".repeat(256 * 1024))),
    ];
    for args in payloads {
        let call = MethodCall {
            method: "unknownMethod123".into(),
            args,
        };
        let outcome = client.invoke(PERFORMANCE_CHANNEL, call).await.unwrap();
        assert_eq!(outcome, Outcome::Unsupported);
    }

    handle.abort();
}

#[tokio::test]
async fn e2e_unknown_channel() {
    let (client, handle) = default_setup().await;

    let outcome = client
        .invoke("com.finsaathi/other", MethodCall::new("optimizePerformance"))
        .await
        .unwrap();
    assert_eq!(outcome, Outcome::Unsupported);

    handle.abort();
}

// ---------------------------------------------------------------------------
// Concurrency
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn e2e_concurrent_mixed_calls() {
    // An unready probe gives each method a distinct reply, so a swapped reply fails
    let config = HostConfig {
        sign_in_ready: false,
        ..HostConfig::default()
    };
    let (client, handle) = setup(HostShell::configure(config).unwrap()).await;
    let client = Arc::new(client);

    let methods = ["optimizePerformance", "checkGoogleSignIn", "unknownMethod123"];
    let mut tasks = Vec::new();
    for i in 0..150 {
        let client = client.clone();
        let method = methods[i % methods.len()];
        tasks.push(tokio::spawn(async move {
            let outcome = client
                .invoke(
                    PERFORMANCE_CHANNEL,
                    MethodCall::with_args(method, json!({ "seq": i })),
                )
                .await
                .unwrap();
            (method, outcome)
        }));
    }

    let mut replies = 0;
    for task in tasks {
        let (method, outcome) = task.await.unwrap();
        match method {
            "optimizePerformance" => assert_eq!(outcome, Outcome::Success(json!(true))),
            "checkGoogleSignIn" => assert_eq!(outcome, Outcome::Success(json!(false))),
            _ => assert_eq!(outcome, Outcome::Unsupported),
        }
        replies += 1;
    }
    assert_eq!(replies, 150);

    handle.abort();
}
