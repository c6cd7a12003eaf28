use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tether_proxy::{
    protocol, Frame, MethodId, MethodSpec, ProxyRole, RequestType, SignalProxy, SignalQueue,
    SyncObject, TypeSpec, Value, ValueKind,
};
use tokio::sync::mpsc;
use uuid::Uuid;

const SET_TOPIC: MethodId = 0;

static BENCH_SPEC: TypeSpec = TypeSpec {
    type_name: "BenchRoom",
    methods: &[MethodSpec { name: "setTopic", args: &[ValueKind::Text], min_args: 1 }],
    updated_remotely: None,
};

#[derive(Clone, Default)]
struct BenchRoom {
    topic: Arc<Mutex<String>>,
}

impl SyncObject for BenchRoom {
    fn spec(&self) -> &'static TypeSpec {
        &BENCH_SPEC
    }

    fn object_id(&self) -> String {
        "1".to_string()
    }

    fn properties(&self) -> BTreeMap<String, Value> {
        let mut map = BTreeMap::new();
        map.insert("topic".to_string(), Value::Text(self.topic.lock().unwrap().clone()));
        map
    }

    fn set_property(&mut self, name: &str, value: &Value) -> bool {
        match (name, value) {
            ("topic", Value::Text(topic)) => {
                *self.topic.lock().unwrap() = topic.clone();
                true
            }
            _ => false,
        }
    }

    fn invoke(&mut self, method: MethodId, args: &[Value], signals: &mut SignalQueue) -> bool {
        if method != SET_TOPIC {
            return false;
        }
        if let Some(topic) = args.first().and_then(Value::as_text) {
            *self.topic.lock().unwrap() = topic.to_string();
            signals.publish(SET_TOPIC, args.to_vec());
        }
        true
    }
}

fn sync_frame() -> Frame {
    Frame::new(
        RequestType::Sync,
        vec![
            Value::Text("BenchRoom".into()),
            Value::Text("1".into()),
            Value::Text("setTopic".into()),
            Value::Text("a fairly typical topic line".into()),
        ],
    )
}

fn bench_frame_encode(c: &mut Criterion) {
    let frame = sync_frame();
    c.bench_function("frame_encode_sync", |b| {
        b.iter(|| {
            black_box(protocol::encode_frame(black_box(&frame)).unwrap());
        })
    });
}

fn bench_frame_decode(c: &mut Criterion) {
    let encoded = protocol::encode_frame(&sync_frame()).unwrap();
    c.bench_function("frame_decode_sync", |b| {
        b.iter(|| {
            black_box(protocol::decode_frame(black_box(&encoded)).unwrap().unwrap());
        })
    });
}

fn bench_snapshot_encode(c: &mut Criterion) {
    let mut properties = BTreeMap::new();
    for i in 0..16 {
        properties.insert(format!("property_{i}"), Value::Text(format!("value {i}")));
    }
    let frame = Frame::new(
        RequestType::InitData,
        vec![
            Value::Text("BenchRoom".into()),
            Value::Text("1".into()),
            Value::Map(properties),
        ],
    );
    c.bench_function("frame_encode_16_property_snapshot", |b| {
        b.iter(|| {
            black_box(protocol::encode_frame(black_box(&frame)).unwrap());
        })
    });
}

fn bench_dispatch_sync(c: &mut Criterion) {
    let mut proxy = SignalProxy::new(ProxyRole::Server);
    let handle = proxy.add_object(Box::new(BenchRoom::default()));
    proxy.synchronize(handle);
    let peer = Uuid::new_v4();
    let (tx, mut rx) = mpsc::unbounded_channel();
    proxy.add_peer(peer, tx);
    let bytes = protocol::encode_frame(&sync_frame()).unwrap();

    c.bench_function("dispatch_sync_frame", |b| {
        b.iter(|| {
            proxy.on_readable(peer, black_box(&bytes));
            // Keep the outbound channel from accumulating.
            while rx.try_recv().is_ok() {}
        })
    });
}

fn bench_broadcast_100_peers(c: &mut Criterion) {
    c.bench_function("broadcast_update_100_peers", |b| {
        b.iter(|| {
            let mut proxy = SignalProxy::new(ProxyRole::Server);
            let handle = proxy.add_object(Box::new(BenchRoom::default()));
            proxy.synchronize(handle);

            let mut receivers = Vec::new();
            for _ in 0..100 {
                let (tx, rx) = mpsc::unbounded_channel();
                proxy.add_peer(Uuid::new_v4(), tx);
                receivers.push(rx);
            }

            proxy.update(handle, |object, signals| {
                object.invoke(SET_TOPIC, &["fan out".into()], signals);
            });
            black_box(&receivers);
        })
    });
}

criterion_group!(
    benches,
    bench_frame_encode,
    bench_frame_decode,
    bench_snapshot_encode,
    bench_dispatch_sync,
    bench_broadcast_100_peers,
);
criterion_main!(benches);
