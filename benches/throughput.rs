use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};

use libcat::{
    book::BookDraft,
    core::catalog::{Catalog, CatalogConfig},
    loan::{LoanDraft, PatronDraft},
};

fn catalog_with(n: u64) -> Catalog {
    let mut catalog = Catalog::with_config(CatalogConfig {
        current_year: Some(2026),
    });
    for i in 0..n {
        let _ = catalog
            .register_book(BookDraft::new(format!("Volume {i}"), 1990, 120))
            .expect("register");
    }
    catalog
}

fn bench_register(c: &mut Criterion) {
    c.bench_function("register_10k", |b| {
        b.iter(|| catalog_with(10_000));
    });
}

fn bench_loan_cycle(c: &mut Criterion) {
    c.bench_function("loan_return_delete_5k", |b| {
        b.iter(|| {
            let mut catalog = catalog_with(5_000);
            for id in 1..=5_000u64 {
                let (loan, _) = catalog
                    .create_loan(LoanDraft::new(id, PatronDraft::new("Ana", "ana@x.com")))
                    .expect("loan");
                catalog.return_book(id).expect("return");
                catalog.delete_loan(loan.id).expect("delete");
            }
            catalog.drain_pending_ops()
        });
    });
}

fn bench_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("search_by_title");
    let catalog = catalog_with(50_000);

    for query in ["volume 4999", "VOLUME", ""] {
        group.bench_with_input(BenchmarkId::from_parameter(query), &query, |b, query| {
            b.iter(|| catalog.search_by_title(query));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_register, bench_loan_cycle, bench_search);
criterion_main!(benches);
