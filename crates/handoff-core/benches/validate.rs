use criterion::{black_box, criterion_group, criterion_main, Criterion};
use handoff_core::{Contract, MetricCriterion, SchemaValidator, Stage};

fn typical_contract() -> Contract {
    let mut contract = Contract::new("STORY-GH-1024", Stage::TestEngineer, Stage::QaTester)
        .with_metric("performance", "response_time_ms", MetricCriterion::max(120.0, 200.0))
        .with_metric("test_quality", "coverage_pct", MetricCriterion::min(88.0, 80.0))
        .with_metric("accessibility", "wcag_compliance_pct", MetricCriterion::min(97.0, 95.0));
    for i in 0..40 {
        contract = contract
            .with_deliverable(format!("src/module_{}.rs", i))
            .with_handoff_criterion(format!("criterion_{}", i), true);
    }
    contract
}

fn bench_validate(c: &mut Criterion) {
    let validator = SchemaValidator::new();
    let contract = typical_contract();
    let value = contract.to_value().expect("serializable");

    c.bench_function("validate_value", |b| {
        b.iter(|| validator.validate(black_box(&value)))
    });
    c.bench_function("validate_contract", |b| {
        b.iter(|| validator.validate_contract(black_box(&contract)))
    });
}

criterion_group!(benches, bench_validate);
criterion_main!(benches);
