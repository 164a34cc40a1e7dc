use criterion::{criterion_group, criterion_main, Criterion};
use rand::Rng;
use plane_allocator::utils::{Logical, Rectangle, Region, Size};

fn visible_region(view: Rectangle<i32, Logical>, opaque: &[Region<Logical>]) -> i64 {
    let occluded = opaque
        .iter()
        .fold(Region::new(), |acc: Region<Logical>, region| acc.union(region));
    Region::from_rect(view).subtract(&occluded).area()
}

fn criterion_benchmark(c: &mut Criterion) {
    let stage: Size<i32, Logical> = Size::from((1920, 1080));
    let view_size: Size<i32, Logical> = Size::from((400, 300));
    let max_x = stage.w - view_size.w;
    let max_y = stage.h - view_size.h;

    let mut rand = rand::thread_rng();
    let x = rand.gen_range(0..max_x);
    let y = rand.gen_range(0..max_y);
    let view = Rectangle::new((x, y).into(), view_size);

    let x_min = (view.loc.x - view_size.w) + 1;
    let x_max = (view.loc.x + view_size.w) - 1;
    let y_min = (view.loc.y - view_size.h) + 1;
    let y_max = (view.loc.y + view_size.h) - 1;

    // a typical stack of a few dozen windows above the view
    let opaque = (0..64)
        .map(|_| {
            let x = rand.gen_range(x_min..=x_max);
            let y = rand.gen_range(y_min..=y_max);
            Region::from_rect(Rectangle::new((x, y).into(), view_size))
        })
        .collect::<Vec<_>>();

    c.bench_function("view_visible_region", |b| {
        b.iter(|| visible_region(view, &opaque));
    });

    let rects = opaque.iter().flat_map(|r| r.rects().iter().copied()).collect::<Vec<_>>();
    c.bench_function("subtract_rects_many", |b| {
        b.iter(|| {
            Rectangle::subtract_rects_many_in_place(vec![view], rects.iter().copied())
                .iter()
                .fold(0i64, |acc, item| acc + (item.size.w * item.size.h) as i64)
        });
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
