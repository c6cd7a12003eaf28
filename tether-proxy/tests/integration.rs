//! Integration tests for end-to-end proxy synchronization.
//!
//! These start a real server node and connect real client nodes over
//! TCP, verifying the full pipeline: framing, the init handshake, sync
//! replication, fan-out to several clients, and reconnection.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use tokio::time::{timeout, Duration};

use tether_proxy::{
    MethodId, MethodSpec, NodeConfig, ObjectHandle, ProxyEvent, ProxyNode, ProxyRole, SignalProxy,
    SignalQueue, SyncObject, TypeSpec, Value, ValueKind,
};

const SET_TOPIC: MethodId = 0;
const REQUEST_SET_TOPIC: MethodId = 1;
const UPDATED_REMOTELY: MethodId = 2;

static CHAT_ROOM_SPEC: TypeSpec = TypeSpec {
    type_name: "ChatRoom",
    methods: &[
        MethodSpec { name: "setTopic", args: &[ValueKind::Text], min_args: 1 },
        MethodSpec { name: "requestSetTopic", args: &[ValueKind::Text], min_args: 1 },
        MethodSpec { name: "updatedRemotely", args: &[], min_args: 0 },
    ],
    updated_remotely: Some(UPDATED_REMOTELY),
};

#[derive(Default)]
struct RoomState {
    topic: String,
    remote_updates: usize,
}

/// A chat room double. The server side is authoritative: it applies a
/// requested topic and announces the result. The client side forwards
/// the request upstream and waits for the announcement to come back.
#[derive(Clone)]
struct ChatRoom {
    id: String,
    authority: bool,
    state: Arc<Mutex<RoomState>>,
}

impl ChatRoom {
    fn server(id: &str, topic: &str) -> Self {
        Self {
            id: id.to_string(),
            authority: true,
            state: Arc::new(Mutex::new(RoomState { topic: topic.to_string(), remote_updates: 0 })),
        }
    }

    fn client(id: &str) -> Self {
        Self {
            id: id.to_string(),
            authority: false,
            state: Arc::new(Mutex::new(RoomState::default())),
        }
    }

    fn topic(&self) -> String {
        self.state.lock().unwrap().topic.clone()
    }

    fn remote_updates(&self) -> usize {
        self.state.lock().unwrap().remote_updates
    }
}

impl SyncObject for ChatRoom {
    fn spec(&self) -> &'static TypeSpec {
        &CHAT_ROOM_SPEC
    }

    fn object_id(&self) -> String {
        self.id.clone()
    }

    fn properties(&self) -> BTreeMap<String, Value> {
        let mut map = BTreeMap::new();
        map.insert("topic".to_string(), Value::Text(self.topic()));
        map
    }

    fn set_property(&mut self, name: &str, value: &Value) -> bool {
        match (name, value) {
            ("topic", Value::Text(topic)) => {
                self.state.lock().unwrap().topic = topic.clone();
                true
            }
            _ => false,
        }
    }

    fn invoke(&mut self, method: MethodId, args: &[Value], signals: &mut SignalQueue) -> bool {
        match method {
            SET_TOPIC => {
                if let Some(topic) = args.first().and_then(Value::as_text) {
                    self.state.lock().unwrap().topic = topic.to_string();
                    signals.publish(SET_TOPIC, args.to_vec());
                }
                true
            }
            REQUEST_SET_TOPIC => {
                if self.authority {
                    // Apply and announce.
                    if let Some(topic) = args.first().and_then(Value::as_text) {
                        self.state.lock().unwrap().topic = topic.to_string();
                        signals.publish(SET_TOPIC, args.to_vec());
                    }
                } else {
                    // Forward the request upstream.
                    signals.publish(REQUEST_SET_TOPIC, args.to_vec());
                }
                true
            }
            UPDATED_REMOTELY => {
                self.state.lock().unwrap().remote_updates += 1;
                true
            }
            _ => false,
        }
    }
}

fn free_port_config() -> NodeConfig {
    NodeConfig { bind_addr: "127.0.0.1:0".to_string(), ..NodeConfig::default() }
}

/// Server node with one synchronized room, listening on a free port.
async fn start_server(room: ChatRoom) -> (ProxyNode, std::net::SocketAddr, ObjectHandle) {
    let node = ProxyNode::new(SignalProxy::new(ProxyRole::Server), free_port_config());
    let handle = {
        let proxy = node.proxy();
        let mut proxy = proxy.lock().await;
        let handle = proxy.add_object(Box::new(room));
        assert!(proxy.synchronize(handle));
        handle
    };
    let addr = node.listen().await.unwrap();
    (node, addr, handle)
}

/// Client node mirroring `room`, synchronized but not yet connected.
async fn start_client(
    room: ChatRoom,
) -> (ProxyNode, tokio::sync::mpsc::UnboundedReceiver<ProxyEvent>, ObjectHandle) {
    let node = ProxyNode::with_defaults(SignalProxy::new(ProxyRole::Client));
    let (events, handle) = {
        let proxy = node.proxy();
        let mut proxy = proxy.lock().await;
        let events = proxy.take_event_rx().unwrap();
        let handle = proxy.add_object(Box::new(room));
        assert!(proxy.synchronize(handle));
        (events, handle)
    };
    (node, events, handle)
}

/// Receive events until one matches, with a per-event timeout.
async fn expect_event(
    rx: &mut tokio::sync::mpsc::UnboundedReceiver<ProxyEvent>,
    want: impl Fn(&ProxyEvent) -> bool,
    what: &str,
) -> ProxyEvent {
    for _ in 0..8 {
        let event = timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap_or_else(|_| panic!("timed out waiting for {what}"))
            .unwrap_or_else(|| panic!("event channel closed waiting for {what}"));
        if want(&event) {
            return event;
        }
    }
    panic!("never saw {what}");
}

/// Poll until `check` passes or a couple of seconds elapse.
async fn wait_until(check: impl Fn() -> bool, what: &str) {
    for _ in 0..40 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("timed out waiting until {what}");
}

#[tokio::test]
async fn test_chat_room_init_handshake() {
    // Server holds ChatRoom id "42" with topic "hi"; the client
    // synchronizes its mirror before any connection exists.
    let (_server, addr, _) = start_server(ChatRoom::server("42", "hi")).await;
    let mirror = ChatRoom::client("42");
    let (client, mut events, handle) = start_client(mirror.clone()).await;
    assert!(!client.proxy().lock().await.is_initialized(handle));

    client.connect(&addr.to_string()).await.unwrap();

    expect_event(&mut events, |e| *e == ProxyEvent::Connected, "Connected").await;
    let initialized = expect_event(
        &mut events,
        |e| matches!(e, ProxyEvent::ObjectInitialized(_)),
        "ObjectInitialized",
    )
    .await;
    assert_eq!(initialized, ProxyEvent::ObjectInitialized(handle));

    assert_eq!(mirror.topic(), "hi");
    assert!(client.proxy().lock().await.is_initialized(handle));

    // Exactly once: nothing further is pending.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_server_update_reaches_client() {
    let server_room = ChatRoom::server("42", "old");
    let (server, addr, server_handle) = start_server(server_room.clone()).await;

    let mirror = ChatRoom::client("42");
    let (client, mut events, _) = start_client(mirror.clone()).await;
    client.connect(&addr.to_string()).await.unwrap();
    expect_event(&mut events, |e| matches!(e, ProxyEvent::ObjectInitialized(_)), "init").await;
    assert_eq!(mirror.topic(), "old");

    // Mutate on the server; the change replicates down as a Sync frame.
    server.proxy().lock().await.update(server_handle, |object, signals| {
        object.invoke(SET_TOPIC, &["new topic".into()], signals);
    });

    wait_until(|| mirror.remote_updates() == 1, "remote update lands on the mirror").await;
    assert_eq!(mirror.topic(), "new topic");
}

#[tokio::test]
async fn test_client_request_roundtrip() {
    let server_room = ChatRoom::server("42", "old");
    let (_server, addr, _) = start_server(server_room.clone()).await;

    let mirror = ChatRoom::client("42");
    let (client, mut events, client_handle) = start_client(mirror.clone()).await;
    client.connect(&addr.to_string()).await.unwrap();
    expect_event(&mut events, |e| matches!(e, ProxyEvent::ObjectInitialized(_)), "init").await;

    // The client requests a change; the authoritative server applies it
    // and the result comes back down.
    client.proxy().lock().await.update(client_handle, |object, signals| {
        object.invoke(REQUEST_SET_TOPIC, &["from client".into()], signals);
    });

    wait_until(|| server_room.topic() == "from client", "server applies the request").await;
    wait_until(|| mirror.topic() == "from client", "announcement returns to the client").await;
}

#[tokio::test]
async fn test_update_fans_out_to_every_client() {
    let server_room = ChatRoom::server("42", "old");
    let (_server, addr, _) = start_server(server_room.clone()).await;

    let mirror_a = ChatRoom::client("42");
    let (client_a, mut events_a, handle_a) = start_client(mirror_a.clone()).await;
    client_a.connect(&addr.to_string()).await.unwrap();
    expect_event(&mut events_a, |e| matches!(e, ProxyEvent::ObjectInitialized(_)), "init a").await;

    let mirror_b = ChatRoom::client("42");
    let (client_b, mut events_b, _) = start_client(mirror_b.clone()).await;
    client_b.connect(&addr.to_string()).await.unwrap();
    expect_event(&mut events_b, |e| matches!(e, ProxyEvent::ObjectInitialized(_)), "init b").await;

    // One client's request converges on both mirrors.
    client_a.proxy().lock().await.update(handle_a, |object, signals| {
        object.invoke(REQUEST_SET_TOPIC, &["shared".into()], signals);
    });

    wait_until(|| mirror_a.topic() == "shared", "mirror a converges").await;
    wait_until(|| mirror_b.topic() == "shared", "mirror b converges").await;
    assert_eq!(server_room.topic(), "shared");
}

#[tokio::test]
async fn test_reconnect_reinitializes() {
    let server_room = ChatRoom::server("42", "first");
    let (server, addr, server_handle) = start_server(server_room.clone()).await;

    let mirror = ChatRoom::client("42");
    let (client, mut events, _) = start_client(mirror.clone()).await;
    client.connect(&addr.to_string()).await.unwrap();
    expect_event(&mut events, |e| matches!(e, ProxyEvent::ObjectInitialized(_)), "first init").await;
    assert_eq!(mirror.topic(), "first");

    // Drop the connection from the client side.
    client.proxy().lock().await.remove_peer(None);
    expect_event(&mut events, |e| *e == ProxyEvent::Disconnected, "Disconnected").await;

    // The server's state moves on while the client is away.
    server.proxy().lock().await.update(server_handle, |object, signals| {
        object.invoke(SET_TOPIC, &["second".into()], signals);
    });

    // Reconnecting re-runs the handshake and pulls the fresh snapshot.
    client.connect(&addr.to_string()).await.unwrap();
    expect_event(&mut events, |e| matches!(e, ProxyEvent::ObjectInitialized(_)), "re-init").await;
    assert_eq!(mirror.topic(), "second");
}

#[tokio::test]
async fn test_heartbeat_traffic_flows() {
    let config = NodeConfig {
        bind_addr: "127.0.0.1:0".to_string(),
        heartbeat_interval_secs: 1,
        ..NodeConfig::default()
    };
    let server = ProxyNode::new(SignalProxy::new(ProxyRole::Server), config);
    let addr = server.listen().await.unwrap();
    let heartbeat = server.start_heartbeat();

    let client = ProxyNode::with_defaults(SignalProxy::new(ProxyRole::Client));
    client.connect(&addr.to_string()).await.unwrap();

    // The probe is one-way: the client's inbound counter moves, and the
    // client never sends anything back.
    let client_proxy = client.proxy();
    let mut saw_traffic = false;
    for _ in 0..40 {
        if client_proxy.lock().await.stats().bytes_in > 0 {
            saw_traffic = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert!(saw_traffic, "heartbeat should reach the client");
    assert_eq!(client_proxy.lock().await.stats().bytes_out, 0);

    heartbeat.abort();
}
