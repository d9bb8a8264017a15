use criterion::{Criterion, black_box, criterion_group, criterion_main};
use droid_login::{Snapshot, UiElement, classify};

fn feed_snapshot() -> Snapshot {
    let elements = (1..=200)
        .map(|i| {
            UiElement::new(i, format!("Post {} from a friend", i))
                .with_class_name("android.widget.TextView")
                .with_resource_id(format!("app:id/feed_item_{}", i))
        })
        .chain(std::iter::once(UiElement::new(201, "What's on your mind?")))
        .collect();
    Snapshot::from_elements(elements, serde_json::Value::Null)
}

fn benchmark_classify(c: &mut Criterion) {
    let snapshot = feed_snapshot();

    c.bench_function("classify_feed_screen", |b| {
        b.iter(|| classify(black_box(&snapshot.formatted_text)))
    });

    c.bench_function("classify_no_match", |b| {
        b.iter(|| classify(black_box("Save your login info? Not now")))
    });
}

criterion_group!(benches, benchmark_classify);
criterion_main!(benches);
