//! End-to-end test: a live transport + resolver core + event loop,
//! driven by a real UDP client, backed by a CSV driver so no database
//! is needed.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use lnp_core::{decode_reply, encode_tagged_request, Reply, RequestKind};
use lnp_drivers::registry::{DriverRegistry, Registry};
use lnp_drivers::{CsvDriver, Driver};
use lnpd::eventloop::{self, EventLoopConfig};
use lnpd::resolver::ResolverCore;
use lnpd::transport::Transport;
use tokio::net::UdpSocket;
use tokio::time::timeout;

fn write_csv(contents: &str) -> String {
    let path = std::env::temp_dir().join(format!("lnp-resolve-test-{}.csv", std::process::id()));
    let mut f = fs::File::create(&path).unwrap();
    f.write_all(contents.as_bytes()).unwrap();
    path.to_string_lossy().into_owned()
}

#[tokio::test]
async fn tagged_request_round_trips_through_the_live_event_loop() {
    let csv_path = write_csv("14155551234,ported,14155550000\n");
    let csv_driver = CsvDriver::load(1, "csv-test", &csv_path).unwrap();

    let mut drivers: HashMap<u8, Arc<dyn Driver>> = HashMap::new();
    drivers.insert(7, Arc::new(csv_driver));
    let registry = Arc::new(DriverRegistry::empty());
    registry.swap(Registry::from_drivers(drivers));

    let metrics = lnp_drivers::metrics::new_registry();
    let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(1);
    let (_reload_tx, reload_rx) = tokio::sync::broadcast::channel(1);
    let (cache_handle, cache_task) = lnp_drivers::cache::spawn(
        "postgres://localhost/does-not-exist".to_string(),
        Duration::from_millis(50),
        Duration::from_secs(3600),
        16,
        shutdown_rx.resubscribe(),
    );

    let transport = Transport::bind(&["127.0.0.1:0".to_string()]).await.unwrap();
    let listen_addr = transport.local_addrs()[0];

    let resolver = Arc::new(ResolverCore::new(registry.clone(), metrics.clone(), cache_handle));
    let sip_identity = Arc::new(lnp_drivers::SipIdentity {
        from_name: "test".to_string(),
        from_uri: "sip:test@example.org".to_string(),
        contact_user: "test".to_string(),
    });

    let eventloop_config = EventLoopConfig {
        db_conn_string: "postgres://localhost/does-not-exist".to_string(),
        db_connect_timeout: Duration::from_millis(50),
    };

    let loop_handle = tokio::spawn(eventloop::run(
        transport,
        resolver,
        registry,
        sip_identity,
        metrics,
        eventloop_config,
        reload_rx,
        shutdown_rx,
    ));

    let client = UdpSocket::bind("0.0.0.0:0").await.unwrap();
    client.connect(listen_addr).await.unwrap();

    let request = encode_tagged_request(42, 7, "14155551234");
    client.send(&request).await.unwrap();

    let mut buf = vec![0u8; 2048];
    let provisional_len = timeout(Duration::from_secs(2), client.recv(&mut buf)).await.unwrap().unwrap();
    assert_eq!(provisional_len, 4);
    assert_eq!(u32::from_le_bytes(buf[0..4].try_into().unwrap()), 42);

    let final_len = timeout(Duration::from_secs(2), client.recv(&mut buf)).await.unwrap().unwrap();
    let (id, reply) = decode_reply(&buf[..final_len], RequestKind::Tagged).unwrap();
    assert_eq!(id, 42);
    match reply {
        Reply::TaggedSuccess { local_routing_number, local_routing_tag } => {
            assert_eq!(local_routing_number, "14155550000");
            assert_eq!(local_routing_tag, "ported");
        }
        other => panic!("expected a tagged success reply, got {other:?}"),
    }

    let _ = shutdown_tx.send(());
    let _ = timeout(Duration::from_secs(2), loop_handle).await;
    cache_task.abort();
    let _ = fs::remove_file(&csv_path);
}

#[tokio::test]
async fn unknown_db_id_produces_a_tagged_error_reply() {
    let registry = Arc::new(DriverRegistry::empty());
    let metrics = lnp_drivers::metrics::new_registry();
    let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(1);
    let (_reload_tx, reload_rx) = tokio::sync::broadcast::channel(1);
    let (cache_handle, cache_task) = lnp_drivers::cache::spawn(
        "postgres://localhost/does-not-exist".to_string(),
        Duration::from_millis(50),
        Duration::from_secs(3600),
        16,
        shutdown_rx.resubscribe(),
    );

    let transport = Transport::bind(&["127.0.0.1:0".to_string()]).await.unwrap();
    let listen_addr = transport.local_addrs()[0];

    let resolver = Arc::new(ResolverCore::new(registry.clone(), metrics.clone(), cache_handle));
    let sip_identity = Arc::new(lnp_drivers::SipIdentity {
        from_name: "test".to_string(),
        from_uri: "sip:test@example.org".to_string(),
        contact_user: "test".to_string(),
    });
    let eventloop_config = EventLoopConfig {
        db_conn_string: "postgres://localhost/does-not-exist".to_string(),
        db_connect_timeout: Duration::from_millis(50),
    };

    let loop_handle = tokio::spawn(eventloop::run(
        transport,
        resolver,
        registry,
        sip_identity,
        metrics,
        eventloop_config,
        reload_rx,
        shutdown_rx,
    ));

    let client = UdpSocket::bind("0.0.0.0:0").await.unwrap();
    client.connect(listen_addr).await.unwrap();
    client.send(&encode_tagged_request(1, 99, "555")).await.unwrap();

    let mut buf = vec![0u8; 2048];
    let _provisional = timeout(Duration::from_secs(2), client.recv(&mut buf)).await.unwrap().unwrap();
    let final_len = timeout(Duration::from_secs(2), client.recv(&mut buf)).await.unwrap().unwrap();
    let (id, reply) = decode_reply(&buf[..final_len], RequestKind::Tagged).unwrap();
    assert_eq!(id, 1);
    assert!(matches!(reply, Reply::TaggedError { .. }));

    let _ = shutdown_tx.send(());
    let _ = timeout(Duration::from_secs(2), loop_handle).await;
    cache_task.abort();
}
