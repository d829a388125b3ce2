//
// Copyright 2025-2026 Neptune Developers. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Benchmarks for the Neptune server

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use neptune_client::{Client, ClientConfig};
use neptune_service::{Handler, Request, Server, ServerConfig, ServerMetrics};
use std::hint::black_box;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Runtime;

// Echoes every payload back under the same id
struct EchoHandler;

#[async_trait::async_trait]
impl Handler for EchoHandler {
    async fn handle(&self, request: &Request) {
        let _ = request
            .send_message(request.id(), request.data().clone())
            .await;
    }
}

async fn start_server(worker_pool_size: usize) -> Server {
    let config = ServerConfig::new("127.0.0.1:0")
        .with_max_packet_size(64 * 1024)
        .with_worker_pool_size(worker_pool_size)
        .with_task_queue_size(1024)
        .with_outbound_buffer_size(1024);
    let mut server = Server::new(config).await.unwrap();
    server.add_router(1, EchoHandler);
    server.start().unwrap();
    server
}

async fn connect(server: &Server) -> Client {
    let addr = server.bind_address();
    Client::connect(
        ClientConfig::new(addr.ip().to_string(), addr.port()).with_max_packet_size(64 * 1024),
    )
    .await
    .unwrap()
}

// Benchmark a single request/reply over loopback
fn bench_round_trip(c: &mut Criterion) {
    let runtime = Runtime::new().unwrap();
    let (server, mut client) = runtime.block_on(async {
        let server = start_server(4).await;
        let client = connect(&server).await;
        (server, client)
    });

    let mut group = c.benchmark_group("round_trip");
    for size in [0usize, 64, 1024, 16 * 1024] {
        let payload = vec![0xA5u8; size];
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &payload, |b, payload| {
            b.iter_custom(|iters| {
                runtime.block_on(async {
                    let start = Instant::now();
                    for _ in 0..iters {
                        client.send(1, payload.clone()).await.unwrap();
                        black_box(client.recv().await.unwrap());
                    }
                    start.elapsed()
                })
            });
        });
    }
    group.finish();

    runtime.block_on(async {
        client.close().await.unwrap();
        server.stop().await.unwrap();
    });
}

// Benchmark pipelined bursts against different worker pool sizes
fn bench_pipelined_burst(c: &mut Criterion) {
    const BURST: usize = 256;
    let runtime = Runtime::new().unwrap();

    let mut group = c.benchmark_group("pipelined_burst");
    group.throughput(Throughput::Elements(BURST as u64));
    group.measurement_time(Duration::from_secs(10));

    for workers in [1usize, 4, 16] {
        let (server, mut client) = runtime.block_on(async {
            let server = start_server(workers).await;
            let client = connect(&server).await;
            (server, client)
        });

        group.bench_function(BenchmarkId::from_parameter(workers), |b| {
            b.iter_custom(|iters| {
                runtime.block_on(async {
                    let start = Instant::now();
                    for _ in 0..iters {
                        for _ in 0..BURST {
                            client.send(1, &b"burst"[..]).await.unwrap();
                        }
                        for _ in 0..BURST {
                            black_box(client.recv().await.unwrap());
                        }
                    }
                    start.elapsed()
                })
            });
        });

        runtime.block_on(async {
            client.close().await.unwrap();
            server.stop().await.unwrap();
        });
    }
    group.finish();
}

// Benchmark metrics updates
fn bench_metrics_updates(c: &mut Criterion) {
    let metrics = Arc::new(ServerMetrics::new());

    c.bench_function("metrics_frame_received", |b| {
        b.iter(|| {
            metrics.frame_received(black_box(128));
        });
    });

    c.bench_function("metrics_snapshot", |b| {
        b.iter(|| {
            black_box(metrics.snapshot());
        });
    });
}

criterion_group!(
    benches,
    bench_round_trip,
    bench_pipelined_burst,
    bench_metrics_updates
);
criterion_main!(benches);
