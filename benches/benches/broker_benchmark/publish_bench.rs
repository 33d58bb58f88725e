use std::{
    hint::black_box,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use gatemesh::{
    broker::RoutingIndex, modules::FnModuleFactory, ApiVersion, Broker, BrokerSettings, Gateway,
    GatewayProperties, GatewaySettings, LoaderBinding, Loaders, Message, Module, ModuleApi,
    ModuleEntry, StaticLoader,
};

const BATCH: usize = 1_000;

struct Counter(Arc<AtomicUsize>);

impl Module for Counter {
    fn receive(
        &self,
        _message: &Message,
    ) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }
}

fn counting_loader(hits: &Arc<AtomicUsize>) -> Loaders {
    let hits = Arc::clone(hits);
    let loader = StaticLoader::new().register("counter", move || {
        let hits = Arc::clone(&hits);
        ModuleApi::new(
            ApiVersion::V1,
            Arc::new(FnModuleFactory::new(move |_, _| {
                Ok(Box::new(Counter(Arc::clone(&hits))) as Box<dyn Module>)
            })),
        )
    });
    Loaders::new().with(loader)
}

fn gateway(
    sinks: usize,
    workers: usize,
    hits: &Arc<AtomicUsize>,
) -> Gateway {
    let entry = |name: String| {
        ModuleEntry::new(
            name,
            LoaderBinding::static_symbol("counter"),
            serde_json::Value::Null,
        )
    };
    let mut props = GatewayProperties::new().module(entry("src".to_string()));
    for i in 0..sinks {
        let sink = format!("sink{i}");
        props = props.module(entry(sink.clone())).link("src", sink);
    }
    let settings = GatewaySettings {
        worker_count: workers,
        ..GatewaySettings::default()
    };
    let gateway = Gateway::create(props, counting_loader(hits), settings).unwrap();
    gateway.start().unwrap();
    gateway
}

fn bench_publish_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("gateway_publish_fan_out");
    for sinks in [1usize, 4, 16] {
        let hits = Arc::new(AtomicUsize::new(0));
        let gw = gateway(sinks, 4, &hits);
        let msg = Message::from_payload(&b"benchmark payload"[..]);
        group.throughput(Throughput::Elements((BATCH * sinks) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(sinks), &sinks, |b, &sinks| {
            b.iter(|| {
                let target = hits.load(Ordering::Relaxed) + BATCH * sinks;
                for _ in 0..BATCH {
                    gw.publish("src", black_box(&msg)).unwrap();
                }
                while hits.load(Ordering::Relaxed) < target {
                    std::hint::spin_loop();
                }
            })
        });
        gw.destroy().unwrap();
    }
    group.finish();
}

fn bench_enqueue_only(c: &mut Criterion) {
    c.bench_function("broker_enqueue_before_start", |b| {
        let msg = Message::from_payload(&b"x"[..]);
        b.iter_batched(
            || {
                Broker::new(BrokerSettings {
                    worker_count: 1,
                    ..BrokerSettings::default()
                })
            },
            |broker| {
                for _ in 0..BATCH {
                    broker.publish("src", black_box(&msg)).unwrap();
                }
                broker
            },
            criterion::BatchSize::SmallInput,
        )
    });
}

fn bench_start_stop(c: &mut Criterion) {
    c.bench_function("broker_start_stop_4_workers", |b| {
        b.iter(|| {
            let broker = Broker::new(BrokerSettings {
                worker_count: 4,
                ..BrokerSettings::default()
            });
            broker.start(RoutingIndex::empty()).unwrap();
            broker.stop().unwrap();
        })
    });
}

criterion_group!(
    benches,
    bench_publish_fan_out,
    bench_enqueue_only,
    bench_start_stop
);
criterion_main!(benches);
