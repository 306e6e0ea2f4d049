use std::cell::Cell;
use std::hint::black_box;
use std::rc::Rc;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use fluids::{
    Event, FluidCell, FluidId, Observer, add_fluid_observer, call_fluid_observers,
    get_fluid_value, remove_fluid_observer, set_fluid_getter,
};

const FAN_OUT: &[usize] = &[1, 8, 64, 512];

fn fluid_target() -> Rc<Cell<i64>> {
    let target = Rc::new(Cell::new(0_i64));
    let source = Rc::downgrade(&target);
    set_fluid_getter(&target, move || source.upgrade().map_or(0, |c| c.get())).ok();
    target
}

fn bench_broadcast(c: &mut Criterion) {
    let mut group = c.benchmark_group("fluids/broadcast");
    for &observers in FAN_OUT {
        let target = fluid_target();
        let sum = Rc::new(Cell::new(0_i64));
        let handles: Vec<Observer<Event<i64>>> = (0..observers)
            .map(|_| {
                let sum = Rc::clone(&sum);
                add_fluid_observer(
                    &target,
                    Observer::from_fn(move |e: &Event<i64>| sum.set(sum.get() + e.payload)),
                )
            })
            .collect();
        let event = Event::change(FluidId::of(&target), 1_i64);

        group.throughput(Throughput::Elements(observers as u64));
        group.bench_with_input(BenchmarkId::from_parameter(observers), &event, |b, event| {
            b.iter(|| call_fluid_observers(black_box(&target), black_box(event)));
        });
        drop(handles);
    }
    group.finish();
}

fn bench_subscribe_cycle(c: &mut Criterion) {
    let target = fluid_target();
    c.bench_function("fluids/subscribe_unsubscribe", |b| {
        b.iter(|| {
            let obs = add_fluid_observer(&target, Observer::<Event<i64>>::from_fn(|_| {}));
            remove_fluid_observer(&target, black_box(&obs));
        });
    });
}

fn bench_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("fluids/read");
    let target = fluid_target();
    group.bench_function("fluid", |b| {
        b.iter(|| get_fluid_value::<_, i64>(black_box(&target)).fluid());
    });
    group.bench_function("plain", |b| {
        b.iter(|| get_fluid_value::<_, i64>(black_box(&7_i64)).into_value());
    });
    group.finish();
}

fn bench_cell_set(c: &mut Criterion) {
    let Ok(cell) = FluidCell::builder().initial(0_i64).build() else {
        return;
    };
    let _obs = add_fluid_observer(
        &cell,
        Observer::from_fn(|e: &Event<i64>| {
            black_box(e.payload);
        }),
    );
    let mut next = 0_i64;
    c.bench_function("fluids/cell_set", |b| {
        b.iter(|| {
            next += 1;
            cell.set(next);
        });
    });
}

criterion_group!(
    benches,
    bench_broadcast,
    bench_subscribe_cycle,
    bench_read,
    bench_cell_set
);
criterion_main!(benches);
