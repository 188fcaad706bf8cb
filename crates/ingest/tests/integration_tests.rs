//! 통합 테스트 — 디렉토리 미러에서 저장소까지 전체 파이프라인 검증

use std::sync::Arc;

use azlure_core::config::{RulesConfig, SourceConfig};
use azlure_core::types::{Severity, SourceCategory};
use azlure_ingest::{
    CategoryCoordinator, DirSource, EventFilter, EventStore, MalformedPolicy, RuleSet,
};

const STORAGE_HIT: &str = r#"{"time":"2024-06-01T12:00:00Z","operationName":"GetBlob","callerIpAddress":"203.0.113.7","uri":"https://acct.blob.core.windows.net/backup/credential?sv=2021-01-01&sig=abcd"}"#;
const STORAGE_MISS: &str = r#"{"time":"2024-06-01T12:05:00Z","operationName":"GetBlob","uri":"/container/readme.txt"}"#;
const VAULT_HIT: &str = r#"{"time":"2024-06-01T12:10:00Z","operationName":"SecretGet","callerIpAddress":"203.0.113.7","resourceId":"/subscriptions/x/vaults/kv-azlure"}"#;

struct Pipeline {
    _mirror: tempfile::TempDir,
    source: Arc<DirSource>,
    store: Arc<EventStore>,
    rules: Arc<RuleSet>,
}

impl Pipeline {
    /// 컨테이너 미러 + 인메모리 저장소로 파이프라인을 조립합니다.
    fn new(objects: &[(&str, &str, &str)]) -> Self {
        let mirror = tempfile::tempdir().unwrap();
        for (container, name, content) in objects {
            let path = mirror.path().join(container).join(name);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, content).unwrap();
        }

        let source_config = SourceConfig {
            root_dir: mirror.path().display().to_string(),
            ..Default::default()
        };

        Self {
            source: Arc::new(DirSource::from_config(&source_config)),
            store: Arc::new(EventStore::open_in_memory().unwrap()),
            rules: Arc::new(RuleSet::from_config(&RulesConfig::default()).unwrap()),
            _mirror: mirror,
        }
    }

    fn coordinator(&self, category: SourceCategory) -> CategoryCoordinator<DirSource> {
        CategoryCoordinator::new(
            category,
            Arc::clone(&self.source),
            Arc::clone(&self.store),
            Arc::clone(&self.rules),
        )
    }
}

#[tokio::test]
async fn storage_read_pass_end_to_end() {
    let pipeline = Pipeline::new(&[
        (
            "insights-logs-storageread",
            "y=2024/m=06/d=01/h=12/PT1H.json",
            STORAGE_HIT,
        ),
        (
            "insights-logs-storageread",
            "y=2024/m=06/d=01/h=13/PT1H.json",
            STORAGE_MISS,
        ),
    ]);

    let report = pipeline
        .coordinator(SourceCategory::StorageRead)
        .run_once()
        .await
        .unwrap();

    assert_eq!(report.objects_processed, 2);
    assert_eq!(report.records_normalized, 2);
    // 디코이 경로 + SAS 토큰 -> 이벤트 2개, 병합 없음
    assert_eq!(report.events_recorded, 2);

    let events = pipeline.store.query(&EventFilter::default()).unwrap();
    assert_eq!(events.len(), 2);
    let rules: Vec<_> = events.iter().map(|e| e.rule_id.as_str()).collect();
    assert!(rules.contains(&"decoy_credential_read"));
    assert!(rules.contains(&"sas_token_usage"));

    // 저장된 URI에서 SAS 서명 값이 읽히지 않아야 함
    for event in &events {
        if let Some(uri) = &event.request_uri {
            assert!(!uri.contains("sig=abcd"), "unredacted uri stored: {uri}");
        }
    }
}

#[tokio::test]
async fn reingesting_same_objects_adds_zero_rows() {
    let pipeline = Pipeline::new(&[(
        "insights-logs-storageread",
        "y=2024/m=06/d=01/h=12/PT1H.json",
        STORAGE_HIT,
    )]);
    let coordinator = pipeline.coordinator(SourceCategory::StorageRead);

    let first = coordinator.run_once().await.unwrap();
    assert_eq!(first.events_recorded, 2);

    // 워터마크를 무시하고 전체 재인제스트 — 두 번째 실행은 0행 추가
    let second = coordinator.run_once_from(None).await.unwrap();
    assert_eq!(second.events_emitted, 2);
    assert_eq!(second.events_recorded, 0);
    assert_eq!(second.events_duplicate, 2);

    assert_eq!(pipeline.store.query(&EventFilter::default()).unwrap().len(), 2);
}

#[tokio::test]
async fn key_vault_audit_pass_records_secret_read() {
    let pipeline = Pipeline::new(&[(
        "insights-logs-auditevent",
        "y=2024/m=06/d=01/h=12/PT1H.json",
        VAULT_HIT,
    )]);

    let report = pipeline
        .coordinator(SourceCategory::KeyVaultAudit)
        .run_once()
        .await
        .unwrap();
    assert_eq!(report.events_recorded, 1);

    let events = pipeline.store.query(&EventFilter::default()).unwrap();
    assert_eq!(events[0].rule_id, "vault_secret_read");
    assert_eq!(events[0].severity, Severity::High);
}

#[tokio::test]
async fn categories_share_store_but_not_watermarks() {
    let pipeline = Pipeline::new(&[
        (
            "insights-logs-storageread",
            "y=2024/m=06/d=01/h=12/PT1H.json",
            STORAGE_HIT,
        ),
        (
            "insights-logs-auditevent",
            "y=2024/m=06/d=01/h=20/PT1H.json",
            VAULT_HIT,
        ),
    ]);

    pipeline
        .coordinator(SourceCategory::StorageRead)
        .run_once()
        .await
        .unwrap();
    pipeline
        .coordinator(SourceCategory::KeyVaultAudit)
        .run_once()
        .await
        .unwrap();

    let storage_mark = pipeline
        .store
        .watermark(SourceCategory::StorageRead)
        .unwrap()
        .unwrap();
    let vault_mark = pipeline
        .store
        .watermark(SourceCategory::KeyVaultAudit)
        .unwrap()
        .unwrap();
    assert_eq!(storage_mark.object_id, "y=2024/m=06/d=01/h=12/PT1H.json");
    assert_eq!(vault_mark.object_id, "y=2024/m=06/d=01/h=20/PT1H.json");

    assert_eq!(pipeline.store.query(&EventFilter::default()).unwrap().len(), 3);
}

#[tokio::test]
async fn partial_failure_preserves_valid_entries() {
    // 유효 엔트리 2개 + 깨진 엔트리 1개 -> 레코드 2개
    let content = format!("{STORAGE_HIT}\nnot-json-at-all\n{STORAGE_MISS}");
    let pipeline = Pipeline::new(&[(
        "insights-logs-storageread",
        "y=2024/m=06/d=01/h=12/PT1H.json",
        content.as_str(),
    )]);

    let report = pipeline
        .coordinator(SourceCategory::StorageRead)
        .run_once()
        .await
        .unwrap();
    assert_eq!(report.records_normalized, 2);
    assert_eq!(report.entries_dropped, 1);
    assert_eq!(report.objects_malformed, 0);
}

#[tokio::test]
async fn malformed_object_halts_then_skip_policy_moves_on() {
    let pipeline = Pipeline::new(&[
        (
            "insights-logs-storageread",
            "y=2024/m=06/d=01/h=11/PT1H.json",
            "<xml>not a log container</xml>",
        ),
        (
            "insights-logs-storageread",
            "y=2024/m=06/d=01/h=12/PT1H.json",
            STORAGE_HIT,
        ),
    ]);

    // 기본 halt 정책: 워터마크가 전진하지 않음
    let halted = pipeline
        .coordinator(SourceCategory::StorageRead)
        .run_once()
        .await
        .unwrap();
    assert!(halted.halted);
    assert!(pipeline
        .store
        .watermark(SourceCategory::StorageRead)
        .unwrap()
        .is_none());

    // 운영자가 skip 정책으로 전환하면 지나가고 나머지를 처리
    let skipped = pipeline
        .coordinator(SourceCategory::StorageRead)
        .with_malformed_policy(MalformedPolicy::Skip)
        .run_once()
        .await
        .unwrap();
    assert_eq!(skipped.objects_malformed, 1);
    assert_eq!(skipped.objects_processed, 1);
    assert_eq!(
        pipeline
            .store
            .watermark(SourceCategory::StorageRead)
            .unwrap()
            .unwrap()
            .object_id,
        "y=2024/m=06/d=01/h=12/PT1H.json"
    );
}

#[tokio::test]
async fn gzip_objects_normalize_identically_to_plain() {
    use std::io::Write;

    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(STORAGE_HIT.as_bytes()).unwrap();
    let compressed = encoder.finish().unwrap();

    let mirror = tempfile::tempdir().unwrap();
    let base = mirror.path().join("insights-logs-storageread");
    std::fs::create_dir_all(&base).unwrap();
    std::fs::write(base.join("01-plain.json"), STORAGE_HIT).unwrap();
    std::fs::write(base.join("02-compressed.json.gz"), &compressed).unwrap();

    let source_config = SourceConfig {
        root_dir: mirror.path().display().to_string(),
        ..Default::default()
    };
    let source = Arc::new(DirSource::from_config(&source_config));
    let store = Arc::new(EventStore::open_in_memory().unwrap());
    let rules = Arc::new(RuleSet::from_config(&RulesConfig::default()).unwrap());

    let report = CategoryCoordinator::new(
        SourceCategory::StorageRead,
        source,
        Arc::clone(&store),
        rules,
    )
    .run_once()
    .await
    .unwrap();

    // 같은 논리적 레코드이므로 dedup key가 같아 한 번만 기록됨
    assert_eq!(report.objects_processed, 2);
    assert_eq!(report.events_emitted, 4);
    assert_eq!(report.events_recorded, 2);
    assert_eq!(report.events_duplicate, 2);
}

#[tokio::test]
async fn events_query_is_time_ordered_across_objects() {
    let late = r#"{"time":"2024-06-01T15:00:00Z","operationName":"SecretGet"}"#;
    let early = r#"{"time":"2024-06-01T09:00:00Z","operationName":"SecretGet"}"#;
    let pipeline = Pipeline::new(&[
        ("insights-logs-auditevent", "a-01.json", late),
        ("insights-logs-auditevent", "b-02.json", early),
    ]);

    pipeline
        .coordinator(SourceCategory::KeyVaultAudit)
        .run_once()
        .await
        .unwrap();

    let events = pipeline.store.query(&EventFilter::default()).unwrap();
    assert_eq!(events.len(), 2);
    assert!(events[0].occurred_at < events[1].occurred_at);
}
