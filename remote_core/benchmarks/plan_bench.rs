use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use remote_core::world::{ControllerView, HomeView, NodeView, ProducerView, TerritoryView};
use remote_core::{MemoryStore, RemoteConfig, RemoteOps, Services, WorldSnapshot};
use remote_schema::{HomeId, NodeId, ObjectId, PlanningInputs, Position, ProducerId, TerritoryId};

fn world(territories: u32) -> (WorldSnapshot, PlanningInputs) {
    let home = HomeId::from("H0");
    let mut world = WorldSnapshot {
        tick: 1_000,
        ..WorldSnapshot::default()
    };
    let mut inputs = PlanningInputs::default();
    world.homes.insert(
        home.clone(),
        HomeView {
            id: home.clone(),
            anchor: Position::new("H0", 25, 25),
            energy_available: 1_300,
            energy_capacity: 1_300,
            producers: vec![ProducerView {
                id: ProducerId::from("H0-p"),
                position: Position::new("H0", 25, 26),
                busy: false,
            }],
            ..HomeView::default()
        },
    );

    for index in 0..territories {
        let name = format!("T{index}");
        let offset = 50 * (index as i32 + 1);
        let territory = TerritoryId::new(name.clone());
        world.territories.insert(
            territory.clone(),
            TerritoryView {
                id: territory.clone(),
                controller: Some(ControllerView {
                    id: ObjectId::new(format!("{name}-ctrl")),
                    position: Position::new(name.as_str(), offset + 25, 25),
                    owner: None,
                    reservation: None,
                }),
                nodes: (0..2)
                    .map(|node| NodeView {
                        id: NodeId::new(format!("{name}-n{node}")),
                        position: Position::new(name.as_str(), offset + 10 + node * 20, 10),
                        capacity: 3_000,
                        regen_period: 300,
                        seat_candidates: vec![Position::new(
                            name.as_str(),
                            offset + 11 + node * 20,
                            11,
                        )],
                    })
                    .collect(),
                ..TerritoryView::default()
            },
        );
        inputs.assign(home.clone(), territory);
    }
    (world, inputs)
}

fn bench_plan(c: &mut Criterion) {
    let mut group = c.benchmark_group("plan_tick");

    for size in [1u32, 8, 32] {
        let (world, inputs) = world(size);
        group.bench_with_input(BenchmarkId::new("territories", size), &size, |b, _| {
            b.iter_batched(
                || {
                    let mut ops =
                        RemoteOps::new(RemoteConfig::builtin(), MemoryStore::new(), Services::default());
                    ops.set_inputs(&inputs).expect("inputs should persist");
                    ops
                },
                |mut ops| {
                    ops.plan_tick(&world).expect("plan tick should succeed");
                },
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

criterion_group!(plan_benches, bench_plan);
criterion_main!(plan_benches);
