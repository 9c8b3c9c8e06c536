//! Integration tests against a live ZooKeeper ensemble and a live Dubbo
//! provider. `#[ignore]`d by default since both are external
//! infrastructure this suite can't spin up itself. Run with
//! `cargo test --test zookeeper_integration -- --ignored`.

use std::time::Duration;

use dubbo_client::{DubboClient, DubboClientBuilder, Registry, RegistryConfig};

const ZK_HOSTS: &str = "127.0.0.1:2181";

#[tokio::test]
#[ignore = "Requires a live ZooKeeper ensemble with a registered provider"]
async fn test_discovery_and_call_via_registry() {
    let registry = Registry::connect(RegistryConfig::new(ZK_HOSTS, "dubbo-client-itest")).unwrap();

    let config = DubboClientBuilder::new("com.example.EchoService")
        .group("default")
        .version("1.0.0")
        .build();

    let pool = std::sync::Arc::new(dubbo_client::ConnectionPool::new(Default::default()));
    let client = DubboClient::with_registry(config, registry.clone(), pool);

    let result = client
        .call("echo", "hello", Some(Duration::from_secs(5)))
        .await
        .unwrap();

    assert_eq!(result, dubbo_client::Value::String("hello".to_string()));

    registry.close().unwrap();
}

#[tokio::test]
#[ignore = "Requires a live ZooKeeper ensemble"]
async fn test_empty_provider_list_surfaces_register_exception() {
    let registry = Registry::connect(RegistryConfig::new(ZK_HOSTS, "dubbo-client-itest")).unwrap();

    let err = registry
        .get_provider_host("com.example.NoSuchService", None, None)
        .await
        .unwrap_err();

    assert!(matches!(err, dubbo_client::DubboError::RegisterException(_)));

    registry.close().unwrap();
}
