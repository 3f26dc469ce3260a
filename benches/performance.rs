use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use lacuna::buffer::TextBuffer;

fn benchmark_local_edit_burst(c: &mut Criterion) {
    c.bench_function("local_edit_burst", |b| {
        b.iter(|| {
            let mut buffer = TextBuffer::new();
            for i in 0..1000 {
                buffer.insert(black_box(i), black_box("a")).unwrap();
            }
        });
    });
}

fn benchmark_alternating_far_edits(c: &mut Criterion) {
    // バッファ両端への交互の編集はギャップ移動の最悪ケース
    let text = "x".repeat(100_000);
    c.bench_function("alternating_far_edits", |b| {
        b.iter_batched(
            || TextBuffer::from_text(&text),
            |mut buffer| {
                for _ in 0..50 {
                    buffer.insert(black_box(0), "a").unwrap();
                    let end = buffer.len();
                    buffer.insert(black_box(end), "b").unwrap();
                }
                buffer
            },
            BatchSize::SmallInput,
        );
    });
}

fn benchmark_bulk_set_text(c: &mut Criterion) {
    let text = "line of sample text\n".repeat(5000);
    c.bench_function("bulk_set_text", |b| {
        b.iter_batched(
            TextBuffer::new,
            |mut buffer| {
                buffer.set_text(black_box(&text));
                buffer
            },
            BatchSize::SmallInput,
        );
    });
}

fn benchmark_rectangular_insert(c: &mut Criterion) {
    let text = "abcdefghijklmnop\n".repeat(200);
    let column_text = "XY\n".repeat(199) + "XY";
    c.bench_function("rectangular_insert", |b| {
        b.iter_batched(
            || TextBuffer::from_text(&text),
            |mut buffer| {
                buffer
                    .insert_column(black_box(4), 0, black_box(&column_text))
                    .unwrap();
                buffer
            },
            BatchSize::SmallInput,
        );
    });
}

fn benchmark_view_after_scattered_edits(c: &mut Criterion) {
    let text = "y".repeat(50_000);
    c.bench_function("view_after_scattered_edits", |b| {
        b.iter_batched(
            || {
                let mut buffer = TextBuffer::from_text(&text);
                for i in 0..20 {
                    buffer.insert(i * 2000, "edit").unwrap();
                }
                buffer
            },
            |mut buffer| {
                let len = buffer.to_view().len();
                black_box(len)
            },
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(
    benches,
    benchmark_local_edit_burst,
    benchmark_alternating_far_edits,
    benchmark_bulk_set_text,
    benchmark_rectangular_insert,
    benchmark_view_after_scattered_edits
);
criterion_main!(benches);
