use criterion::*;
use std::hint::black_box;

use relecs::{Entity, Query, Up};

mod common;
use common::*;

fn iterate_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("iterate");

    group.bench_function("write_wealth_100k", |b| {
        let mut world = make_world();
        populate(&mut world, AGENTS_MED);
        let mut query = Query::<&mut Wealth>::new(&world);
        b.iter(|| {
            let mut view = query.view(&mut world);
            while let Some(wealth) = view.next() {
                wealth.value *= 1.0001;
            }
        });
    });

    group.bench_function("read_write_prod_to_wealth_100k", |b| {
        let mut world = make_world();
        populate(&mut world, AGENTS_MED);
        let mut query = Query::<(&Productivity, &mut Wealth)>::new(&world);
        b.iter(|| {
            let mut view = query.view(&mut world);
            while let Some((productivity, wealth)) = view.next() {
                wealth.value += productivity.rate;
            }
        });
    });

    group.bench_function("par_write_wealth_100k", |b| {
        let mut world = make_world();
        populate(&mut world, AGENTS_MED);
        b.iter(|| {
            world.par_for_each_mut::<Wealth, _>(|_, wealth| wealth.value *= 1.0001);
        });
    });

    group.bench_function("relation_join_10k_x4", |b| {
        let mut world = make_world();
        let agents = populate(&mut world, AGENTS_SMALL);
        connect(&mut world, &agents, 4);
        let mut query = Query::<(&Wealth, &Trades, Entity)>::new(&world);
        b.iter(|| {
            let total: f32 = query.view_ref(&world).iter().map(|(wealth, _, _)| wealth.value).sum();
            black_box(total);
        });
    });

    group.bench_function("tree_up_10k", |b| {
        let mut world = make_world();
        let agents = populate(&mut world, AGENTS_SMALL);
        nest(&mut world, &agents);
        let mut query = Query::<(Entity, Up<&Owns>, Entity)>::new(&world);
        b.iter(|| {
            black_box(query.view_ref(&world).iter().count());
        });
    });

    group.finish();
}

criterion_group!(benches, iterate_benchmark);
criterion_main!(benches);
