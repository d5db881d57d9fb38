use common::{CartOwner, Money, ProductId, SessionId, UserId};
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use domain::{AddItem, Aggregate, Cart, CartEngine, MergeCarts};
use record_store::InMemoryStore;

fn bench_add_new_line(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("cart/add_new_line", |b| {
        b.iter(|| {
            rt.block_on(async {
                let engine = CartEngine::new(InMemoryStore::new());
                engine
                    .add_item(AddItem::new(UserId::new(), "SKU-1", Money::from_minor(1000)))
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_increment_line(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let engine = CartEngine::new(InMemoryStore::new());
    let owner = CartOwner::User(UserId::new());
    rt.block_on(async {
        engine
            .add_item(AddItem::new(owner.clone(), "SKU-1", Money::from_minor(1000)))
            .await
            .unwrap()
    });

    c.bench_function("cart/increment_line", |b| {
        b.iter(|| {
            rt.block_on(async {
                engine
                    .add_item(AddItem::new(owner.clone(), "SKU-1", Money::from_minor(1000)))
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_merge(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("cart/merge");

    for lines in [1usize, 10, 50] {
        group.bench_with_input(BenchmarkId::from_parameter(lines), &lines, |b, &lines| {
            b.iter(|| {
                rt.block_on(async {
                    let engine = CartEngine::new(InMemoryStore::new());
                    let session = SessionId::new("bench-session");
                    let user_id = UserId::new();

                    for i in 0..lines {
                        let sku = format!("SKU-{i}");
                        engine
                            .add_item(AddItem::new(
                                session.clone(),
                                sku.clone(),
                                Money::from_minor(100),
                            ))
                            .await
                            .unwrap();
                        if i % 2 == 0 {
                            engine
                                .add_item(AddItem::new(user_id, sku, Money::from_minor(100)))
                                .await
                                .unwrap();
                        }
                    }

                    engine
                        .merge_guest_into_user(MergeCarts::new(session, user_id))
                        .await
                        .unwrap();
                });
            });
        });
    }

    group.finish();
}

fn bench_totals(c: &mut Criterion) {
    let mut cart = Cart::new(CartOwner::User(UserId::new()));
    for i in 0..100 {
        let (writes, _) = cart
            .add_item(
                &ProductId::new(format!("SKU-{i}")),
                None,
                (i % 5) + 1,
                Money::from_minor(100 + i),
            )
            .unwrap();
        cart.apply_all(writes);
        cart.set_version(cart.version().next());
    }

    c.bench_function("cart/totals_100_lines", |b| {
        b.iter(|| cart.totals());
    });
}

criterion_group!(
    benches,
    bench_add_new_line,
    bench_increment_line,
    bench_merge,
    bench_totals
);
criterion_main!(benches);
