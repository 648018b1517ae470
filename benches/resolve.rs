use criterion::{criterion_group, criterion_main, Criterion};

use mailmerge::template::Placeholders;

const BODY: &str = "<p>Dear {{Title}} {{Name}},</p>\n\
<p>Thank you for registering for {{Event}} on {{Date}}.</p>\n\
{{Company}}\n\
<p>Your seat is {{Seat}}, {{Section}}.</p>\n\
<p>Regards,<br>{{Organizer}}</p>";

fn headers() -> Vec<String> {
    ["Title", "Name", "Event", "Date", "Company", "Seat", "Section", "Organizer", "Email"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn bench_resolve_full_row(c: &mut Criterion) {
    let placeholders = Placeholders::compile(&headers()).unwrap();
    let row: Vec<Option<String>> = [
        "Dr.", "Ann", "RustConf", "May 4", "Acme", "A12", "Left", "Bob", "ann@x.com",
    ]
    .iter()
    .map(|s| Some(s.to_string()))
    .collect();

    c.bench_function("resolve_full_row", |b| b.iter(|| placeholders.resolve(BODY, &row)));
}

fn bench_resolve_sparse_row(c: &mut Criterion) {
    let placeholders = Placeholders::compile(&headers()).unwrap();
    let row: Vec<Option<String>> = vec![None, Some("Ann".into()), Some("RustConf".into())];

    c.bench_function("resolve_sparse_row", |b| {
        b.iter(|| placeholders.resolve(BODY, &row))
    });
}

fn bench_compile(c: &mut Criterion) {
    let headers = headers();
    c.bench_function("compile_placeholders", |b| {
        b.iter(|| Placeholders::compile(&headers).unwrap())
    });
}

criterion_group!(
    benches,
    bench_resolve_full_row,
    bench_resolve_sparse_row,
    bench_compile
);
criterion_main!(benches);
