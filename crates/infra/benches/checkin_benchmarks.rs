use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use std::sync::Arc;

use checkin_building::{
    AllowList, Building, BuildingId, CheckUserIntoBuilding, CheckUserOutOfBuilding,
    RegisterNewBuilding,
};
use checkin_infra::handlers::{
    CheckUserIntoBuildingHandler, CheckUserOutOfBuildingHandler, RegisterNewBuildingHandler,
};
use checkin_infra::projections::{CheckedInUsers, CheckedInUsersProjector};
use checkin_infra::read_model::InMemoryReadModelStore;
use checkin_infra::{AggregateRepository, CommandBus, EventLog, InMemoryEventLog};

type Projector = CheckedInUsersProjector<InMemoryReadModelStore<BuildingId, CheckedInUsers>>;

fn staff() -> AllowList {
    AllowList::new(["fritz", "franz", "otto"])
}

fn setup_bus() -> (CommandBus, Arc<InMemoryEventLog>, Arc<Projector>) {
    let log = Arc::new(InMemoryEventLog::new());
    let projector = Arc::new(CheckedInUsersProjector::new(InMemoryReadModelStore::new()));
    let bus = CommandBus::builder(log.clone())
        .handler::<RegisterNewBuilding, _>(RegisterNewBuildingHandler)
        .handler::<CheckUserIntoBuilding, _>(CheckUserIntoBuildingHandler::new(Arc::new(staff())))
        .handler::<CheckUserOutOfBuilding, _>(CheckUserOutOfBuildingHandler)
        .projector(projector.clone())
        .build()
        .unwrap();
    (bus, log, projector)
}

/// Stream with `pairs` check-in/check-out cycles after registration.
fn populate(repo: &AggregateRepository<Arc<InMemoryEventLog>>, pairs: usize) -> BuildingId {
    let mut building = Building::new("B1").unwrap();
    for _ in 0..pairs {
        building.check_in_user(&staff(), "fritz").unwrap();
        building.check_out_user("fritz").unwrap();
    }
    let mut uow = repo.unit_of_work();
    uow.add(&mut building).unwrap();
    uow.commit().unwrap();
    building.id_typed()
}

fn bench_dispatch_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch_latency");

    group.bench_function("check_in_out_cycle", |b| {
        let (bus, _, _) = setup_bus();
        let building_id = BuildingId::generate();
        bus.dispatch(&RegisterNewBuilding {
            building_id,
            name: "B1".to_string(),
        })
        .unwrap();

        b.iter(|| {
            bus.dispatch(&CheckUserIntoBuilding {
                building_id,
                username: black_box("fritz".to_string()),
            })
            .unwrap();
            bus.dispatch(&CheckUserOutOfBuilding {
                building_id,
                username: black_box("fritz".to_string()),
            })
            .unwrap();
        });
    });

    group.finish();
}

fn bench_replay(c: &mut Criterion) {
    let mut group = c.benchmark_group("aggregate_replay");

    for pairs in [10usize, 100, 1_000] {
        let repo = AggregateRepository::new(Arc::new(InMemoryEventLog::new()));
        let id = populate(&repo, pairs);

        group.throughput(Throughput::Elements((pairs * 2 + 1) as u64));
        group.bench_with_input(BenchmarkId::new("get_building", pairs), &id, |b, id| {
            b.iter(|| {
                let building: Building = repo.get(*id).unwrap();
                black_box(building);
            });
        });
    }

    group.finish();
}

fn bench_projection_rebuild(c: &mut Criterion) {
    let mut group = c.benchmark_group("projection_rebuild");

    for buildings in [10usize, 100] {
        let (_, log, projector) = setup_bus();
        let repo = AggregateRepository::new(log.clone());
        for _ in 0..buildings {
            populate(&repo, 10);
        }
        let events = log.read_all().unwrap().len();

        group.throughput(Throughput::Elements(events as u64));
        group.bench_with_input(
            BenchmarkId::new("rebuild_from_log", buildings),
            &buildings,
            |b, _| {
                b.iter(|| projector.rebuild_from_log(log.as_ref()).unwrap());
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_dispatch_latency,
    bench_replay,
    bench_projection_rebuild
);
criterion_main!(benches);
