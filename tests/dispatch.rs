mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use nodevisor::rpc::node_key;
use nodevisor::{
    decode_args, DispatchError, Envelope, EventKind, Handlers, LocalBus, ManagerError,
    MemoryRegistry, NodeService, RequestContext, ServiceInfo, ServiceState,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::time::sleep;

use common::{count, drain, service};

struct Node {
    service: NodeService,
    pings: Arc<AtomicUsize>,
}

fn node(registry: &Arc<MemoryRegistry>, bus: &LocalBus, host: &'static str) -> Node {
    let pings = Arc::new(AtomicUsize::new(0));
    let p = Arc::clone(&pings);

    #[derive(Deserialize)]
    struct Resize {
        flavor: String,
    }

    let manager = Handlers::new()
        .on("ping", move |_ctx, _args| {
            let p = Arc::clone(&p);
            async move {
                p.fetch_add(1, Ordering::SeqCst);
                Ok::<_, DispatchError>(json!(host))
            }
        })
        .on("whoami", |ctx: RequestContext, _args| async move {
            Ok::<_, DispatchError>(json!(ctx.user_id))
        })
        .on("resize", |_ctx, args| async move {
            let req: Resize = decode_args("resize", args)?;
            Ok::<_, DispatchError>(json!({ "flavor": req.flavor }))
        })
        .on("fail", |_ctx, _args| async {
            Err::<Value, _>(DispatchError::from(ManagerError::failed("disk full")))
        });

    let service = service(
        registry.clone(),
        bus,
        host,
        Arc::new(manager),
        Duration::ZERO,
        Duration::ZERO,
    );
    Node { service, pings }
}

async fn settle() {
    for _ in 0..10 {
        sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test(start_paused = true)]
async fn fanout_reaches_every_node() {
    let registry = Arc::new(MemoryRegistry::new());
    let bus = LocalBus::new();
    let a = node(&registry, &bus, "node-1");
    let b = node(&registry, &bus, "node-2");
    a.service.start().await.unwrap();
    b.service.start().await.unwrap();

    let reached = bus.fanout_cast("compute", Envelope::new("ping", json!({}))).unwrap();
    assert_eq!(reached, 2);
    settle().await;

    assert_eq!(a.pings.load(Ordering::SeqCst), 1);
    assert_eq!(b.pings.load(Ordering::SeqCst), 1);

    a.service.stop().await;
    b.service.stop().await;
}

#[tokio::test(start_paused = true)]
async fn node_key_reaches_only_that_node() {
    let registry = Arc::new(MemoryRegistry::new());
    let bus = LocalBus::new();
    let a = node(&registry, &bus, "node-1");
    let b = node(&registry, &bus, "node-2");
    a.service.start().await.unwrap();
    b.service.start().await.unwrap();

    for _ in 0..3 {
        let reply = bus
            .call(&node_key("compute", "node-2"), Envelope::new("ping", Value::Null))
            .await
            .unwrap();
        assert_eq!(reply, Ok(json!("node-2")));
    }
    assert_eq!(a.pings.load(Ordering::SeqCst), 0);
    assert_eq!(b.pings.load(Ordering::SeqCst), 3);

    a.service.stop().await;
    b.service.stop().await;
}

#[tokio::test(start_paused = true)]
async fn topic_key_is_served_exactly_once_per_call() {
    let registry = Arc::new(MemoryRegistry::new());
    let bus = LocalBus::new();
    let a = node(&registry, &bus, "node-1");
    let b = node(&registry, &bus, "node-2");
    a.service.start().await.unwrap();
    b.service.start().await.unwrap();

    for _ in 0..10 {
        let reply = bus.call("compute", Envelope::new("ping", Value::Null)).await.unwrap();
        let host = reply.unwrap();
        assert!(host == json!("node-1") || host == json!("node-2"));
    }
    let total = a.pings.load(Ordering::SeqCst) + b.pings.load(Ordering::SeqCst);
    assert_eq!(total, 10);

    a.service.stop().await;
    b.service.stop().await;
}

#[tokio::test(start_paused = true)]
async fn unknown_method_is_reported_to_caller_and_events() {
    let registry = Arc::new(MemoryRegistry::new());
    let bus = LocalBus::new();
    let a = node(&registry, &bus, "node-1");
    let mut rx = a.service.subscribe_events();
    a.service.start().await.unwrap();

    let reply = bus
        .call("compute.node-1", Envelope::new("reboot", Value::Null))
        .await
        .unwrap();
    assert_eq!(reply, Err(DispatchError::method_not_found("reboot")));

    let events = drain(&mut rx);
    let missing = events
        .iter()
        .find(|e| e.kind == EventKind::MethodNotFound)
        .unwrap();
    assert_eq!(missing.method.as_deref(), Some("reboot"));

    a.service.stop().await;
}

#[tokio::test(start_paused = true)]
async fn own_methods_take_precedence_over_manager() {
    let registry = Arc::new(MemoryRegistry::new());
    let bus = LocalBus::new();
    let a = node(&registry, &bus, "node-1");
    a.service.start().await.unwrap();

    let reply = bus
        .call("compute.node-1", Envelope::new("report_state", Value::Null))
        .await
        .unwrap();
    assert_eq!(reply, Ok(json!({ "report_count": 1 })));
    assert_eq!(registry.list().await[0].report_count, 1);

    let reply = bus
        .call("compute.node-1", Envelope::new("service_info", Value::Null))
        .await
        .unwrap()
        .unwrap();
    let info: ServiceInfo = serde_json::from_value(reply).unwrap();
    assert_eq!(info.host, "node-1");
    assert_eq!(info.topic, "compute");
    assert_eq!(info.state, ServiceState::Running);
    assert_eq!(info.service_id, a.service.service_id());
    assert_eq!(info.timers, 0);

    let reply = bus
        .call("compute", Envelope::new("periodic_tasks", Value::Null))
        .await
        .unwrap();
    assert_eq!(reply, Ok(Value::Null));

    a.service.stop().await;
}

#[tokio::test(start_paused = true)]
async fn caller_context_and_arguments_reach_the_handler() {
    let registry = Arc::new(MemoryRegistry::new());
    let bus = LocalBus::new();
    let a = node(&registry, &bus, "node-1");
    a.service.start().await.unwrap();

    let env = Envelope::new("whoami", Value::Null)
        .with_context(RequestContext::for_user("alice", "ops"));
    let reply = bus.call("compute", env).await.unwrap();
    assert_eq!(reply, Ok(json!("alice")));

    let reply = bus
        .call("compute", Envelope::new("resize", json!({ "flavor": "m1.small" })))
        .await
        .unwrap();
    assert_eq!(reply, Ok(json!({ "flavor": "m1.small" })));

    let reply = bus
        .call("compute", Envelope::new("resize", json!({ "size": 2 })))
        .await
        .unwrap();
    assert!(matches!(reply, Err(DispatchError::InvalidArgs { .. })));

    a.service.stop().await;
}

#[tokio::test(start_paused = true)]
async fn handler_failure_is_returned_and_published() {
    let registry = Arc::new(MemoryRegistry::new());
    let bus = LocalBus::new();
    let a = node(&registry, &bus, "node-1");
    let mut rx = a.service.subscribe_events();
    a.service.start().await.unwrap();

    let reply = bus
        .call("compute.node-1", Envelope::new("fail", Value::Null))
        .await
        .unwrap();
    assert_eq!(
        reply,
        Err(DispatchError::Manager(ManagerError::failed("disk full")))
    );

    let events = drain(&mut rx);
    assert_eq!(count(&events, EventKind::CallFailed), 1);
    let failed = events.iter().find(|e| e.kind == EventKind::CallFailed).unwrap();
    assert_eq!(failed.method.as_deref(), Some("fail"));
    assert!(failed.reason.as_deref().unwrap().contains("disk full"));

    a.service.stop().await;
}

#[tokio::test(start_paused = true)]
async fn stopped_node_no_longer_consumes_casts() {
    let registry = Arc::new(MemoryRegistry::new());
    let bus = LocalBus::new();
    let a = node(&registry, &bus, "node-1");
    a.service.start().await.unwrap();

    bus.cast("compute.node-1", Envelope::new("ping", Value::Null)).unwrap();
    settle().await;
    assert_eq!(a.pings.load(Ordering::SeqCst), 1);

    a.service.stop().await;
    bus.cast("compute.node-1", Envelope::new("ping", Value::Null)).unwrap();
    assert_eq!(bus.fanout_cast("compute", Envelope::new("ping", Value::Null)).unwrap(), 0);
    settle().await;
    assert_eq!(a.pings.load(Ordering::SeqCst), 1);
}
