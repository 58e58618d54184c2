//! Tests for the kube-crd binary's flags and in-memory run

use clap::Parser;
use kube_crd_cli::{exercise, Cli, DemoBuilder, EXAMPLE_STATE_NAME, UPDATED_MESSAGE};
use kube_crd_client::{MemoryStore, ResourceClient};
use kube_crd_resources::ExampleState;
use proptest::prelude::*;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[test]
fn test_cli_parsing_all_flags() {
    let args = vec![
        "kube-crd",
        "--kubeconf",
        "/etc/kube/dev.conf",
        "--namespace",
        "demo",
        "--resync-secs",
        "5",
        "--establish-timeout-secs",
        "2",
        "--in-memory",
    ];
    let config = Cli::try_parse_from(args).unwrap().into_config();

    assert_eq!(config.kubeconf, Some(PathBuf::from("/etc/kube/dev.conf")));
    assert_eq!(config.namespace, "demo");
    assert_eq!(config.resync_period, Duration::from_secs(5));
    assert_eq!(config.establish_timeout, Duration::from_secs(2));
    assert!(config.in_memory);
}

#[test]
fn test_cli_rejects_unknown_flag() {
    assert!(Cli::try_parse_from(["kube-crd", "--master", "https://10.0.0.1"]).is_err());
}

proptest! {
    #[test]
    fn prop_resync_secs_become_period(secs in 1u64..1_000_000) {
        let secs_arg = secs.to_string();
        let config = Cli::try_parse_from(["kube-crd", "--resync-secs", secs_arg.as_str()])
            .unwrap()
            .into_config();
        prop_assert_eq!(config.resync_period, Duration::from_secs(secs));
    }
}

#[tokio::test]
async fn test_exercise_example_state() {
    let client: ResourceClient<ExampleState> =
        ResourceClient::new(Arc::new(MemoryStore::<ExampleState>::new()), "default");

    let updated = exercise(&client, ExampleState::sample(EXAMPLE_STATE_NAME), |state| {
        if let Some(status) = state.status.as_mut() {
            status.message = UPDATED_MESSAGE.to_string();
        }
    })
    .await
    .unwrap();

    assert_eq!(updated.status.unwrap().message, UPDATED_MESSAGE);
    assert!(updated.spec.up);
}

#[tokio::test]
async fn test_in_memory_run_in_custom_namespace() {
    let mut manager = DemoBuilder::new()
        .in_memory(true)
        .namespace("demo")
        .resync_period(Duration::from_millis(20))
        .build()
        .await
        .unwrap();

    manager.start().await.unwrap();
    assert_eq!(manager.config().namespace, "demo");
    assert_eq!(manager.watchers().len(), 2);

    // Let a few resync ticks pass before stopping
    tokio::time::sleep(Duration::from_millis(100)).await;
    manager.stop().await.unwrap();
}
