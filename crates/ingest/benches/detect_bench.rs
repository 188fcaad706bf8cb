//! 규칙 평가 벤치마크

use chrono::{TimeZone, Utc};
use criterion::{Criterion, black_box, criterion_group, criterion_main};

use azlure_core::config::RulesConfig;
use azlure_core::types::{NormalizedRecord, SourceCategory};
use azlure_ingest::RuleSet;

fn sample_record(uri: &str) -> NormalizedRecord {
    NormalizedRecord {
        category: SourceCategory::StorageRead,
        occurred_at: Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
        operation: "GetBlob".to_owned(),
        caller: None,
        caller_ip: Some("203.0.113.7".to_owned()),
        request_uri: Some(uri.to_owned()),
        request_uri_redacted: Some(uri.to_owned()),
        resource_id: None,
        status_code: Some("200".to_owned()),
        user_agent: Some("azcopy/10.0".to_owned()),
        auth_type: Some("SAS".to_owned()),
        fields: vec![
            ("properties.serviceType".to_owned(), "blob".to_owned()),
            ("category".to_owned(), "StorageRead".to_owned()),
        ],
    }
}

fn bench_evaluate(c: &mut Criterion) {
    let rules = RuleSet::from_config(&RulesConfig::default()).unwrap();

    let hit = sample_record(
        "https://acct.blob.core.windows.net/backup/credential?sv=2021-01-01&sig=abcd",
    );
    c.bench_function("evaluate_matching_record", |b| {
        b.iter(|| black_box(rules.evaluate(black_box(&hit), "bench-object")))
    });

    let miss = sample_record("https://acct.blob.core.windows.net/container/readme.txt");
    c.bench_function("evaluate_non_matching_record", |b| {
        b.iter(|| black_box(rules.evaluate(black_box(&miss), "bench-object")))
    });
}

criterion_group!(benches, bench_evaluate);
criterion_main!(benches);
