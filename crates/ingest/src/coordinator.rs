//! 인제스트 코디네이터 — 카테고리 하나의 수집/정규화/탐지/영속 흐름을 관리합니다.
//!
//! 카테고리마다 코디네이터 인스턴스 하나가 할당되며, 인스턴스들은
//! [`EventStore`]만 공유합니다. 워터마크 전진은 카테고리 내에서 엄격히
//! 순차적이고 단조이며, 카테고리 간 순서는 보장하지 않습니다.
//!
//! # 패스 흐름
//! ```text
//! list > watermark -> fetch(+bounded retry) -> normalize -> evaluate -> upsert(tx) -> advance watermark
//! ```
//!
//! # 실패 정책
//! - 페치 실패: 지수 백오프로 제한된 횟수만 재시도 후 오브젝트를 건너뛰고
//!   카운트합니다. 하나의 불량 오브젝트가 파이프라인을 멈추지 않습니다.
//! - 파싱 불가 오브젝트: 설정 정책에 따라 패스를 멈추거나(halt, 워터마크 유지)
//!   집계 후 전진합니다(skip).
//! - 저장소 장애: 패스 전체가 워터마크 전진 없이 중단됩니다. 다음 패스가
//!   마지막 정상 상태에서 깨끗하게 재시도합니다.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use azlure_core::config::IngestConfig;
use azlure_core::error::IngestError;
use azlure_core::types::{DetectionEvent, SourceCategory};

use crate::detect::RuleSet;
use crate::normalize::Normalizer;
use crate::source::{LogSource, ObjectMeta, RawLogObject};
use crate::store::EventStore;

/// 파싱 불가 오브젝트 처리 정책
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MalformedPolicy {
    /// 워터마크를 유지하고 해당 카테고리 패스를 중단 (기본값)
    ///
    /// 운영자가 확인할 때까지 같은 오브젝트에서 패스가 멈춰 있습니다.
    #[default]
    Halt,
    /// 집계 후 워터마크를 전진시키고 계속 진행
    Skip,
}

impl MalformedPolicy {
    /// 설정 문자열에서 정책을 파싱합니다. 알 수 없는 값은 기본값(halt)입니다.
    pub fn from_config(config: &IngestConfig) -> Self {
        match config.on_malformed.as_str() {
            "skip" => Self::Skip,
            _ => Self::Halt,
        }
    }
}

/// 페치 재시도 정책 — 명시적 시도 카운터를 가진 유한 루프
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// 최대 시도 횟수 (첫 시도 포함)
    pub max_attempts: u32,
    /// 지수 백오프 시작 지연
    pub base_delay: Duration,
    /// 지연 상한
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// 설정의 `[ingest]` 섹션에서 정책을 생성합니다.
    pub fn from_config(config: &IngestConfig) -> Self {
        Self {
            max_attempts: config.retry_max_attempts,
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
            max_delay: Duration::from_millis(config.retry_max_delay_ms),
        }
    }

    /// n번째 시도 실패 후 대기 시간을 반환합니다 (1부터 시작).
    fn delay_after(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(20);
        let delay = self.base_delay.saturating_mul(1 << shift);
        delay.min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
        }
    }
}

/// 인제스트 패스 하나의 운영자 보고서
///
/// 모든 드롭/스킵은 여기 집계됩니다 — 조용한 데이터 손실은 없습니다.
#[derive(Debug, Default, serde::Serialize)]
pub struct PassReport {
    /// 패스 추적 ID (로그 상관용 UUID v4)
    pub pass_id: String,
    /// 워터마크 이후로 나열된 오브젝트 수
    pub objects_listed: u64,
    /// 끝까지 처리되어 워터마크가 전진한 오브젝트 수
    pub objects_processed: u64,
    /// 페치 실패로 건너뛴 오브젝트 수
    pub objects_skipped: u64,
    /// 파싱 불가로 분류된 오브젝트 수
    pub objects_malformed: u64,
    /// 정규화된 레코드 수
    pub records_normalized: u64,
    /// 드롭된 개별 엔트리 수
    pub entries_dropped: u64,
    /// 규칙 매칭으로 생성된 이벤트 수
    pub events_emitted: u64,
    /// 저장소에 새로 기록된 이벤트 수
    pub events_recorded: u64,
    /// dedup key 충돌로 무시된 이벤트 수
    pub events_duplicate: u64,
    /// 패스 종료 시점의 워터마크
    pub watermark: Option<String>,
    /// 파싱 불가 오브젝트 때문에 halt 정책으로 중단되었는지
    pub halted: bool,
    /// 이번 패스에서 새로 기록된 이벤트 (알림 디스패치용)
    #[serde(skip)]
    pub new_events: Vec<DetectionEvent>,
}

impl fmt::Display for PassReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "objects {}/{} (skipped {}, malformed {}), records {} (dropped {}), \
             events {} emitted / {} recorded / {} duplicate",
            self.objects_processed,
            self.objects_listed,
            self.objects_skipped,
            self.objects_malformed,
            self.records_normalized,
            self.entries_dropped,
            self.events_emitted,
            self.events_recorded,
            self.events_duplicate,
        )
    }
}

/// 카테고리별 인제스트 코디네이터
pub struct CategoryCoordinator<S: LogSource> {
    /// 담당 카테고리
    category: SourceCategory,
    /// 로그 오브젝트 소스
    source: Arc<S>,
    /// 공유 이벤트 저장소
    store: Arc<EventStore>,
    /// 규칙 집합
    rules: Arc<RuleSet>,
    /// 정규화기
    normalizer: Normalizer,
    /// 페치 재시도 정책
    retry: RetryPolicy,
    /// 파싱 불가 오브젝트 정책
    on_malformed: MalformedPolicy,
    /// 협조적 중단 토큰 (오브젝트 경계에서만 반영)
    cancel: CancellationToken,
    /// 새 이벤트 전달 채널 (daemon의 알림 디스패처로 연결)
    alert_tx: Option<mpsc::Sender<DetectionEvent>>,
}

impl<S: LogSource> CategoryCoordinator<S> {
    /// 새 코디네이터를 생성합니다.
    pub fn new(
        category: SourceCategory,
        source: Arc<S>,
        store: Arc<EventStore>,
        rules: Arc<RuleSet>,
    ) -> Self {
        Self {
            category,
            source,
            store,
            rules,
            normalizer: Normalizer::new(),
            retry: RetryPolicy::default(),
            on_malformed: MalformedPolicy::default(),
            cancel: CancellationToken::new(),
            alert_tx: None,
        }
    }

    /// 재시도 정책을 설정합니다.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// 파싱 불가 오브젝트 정책을 설정합니다.
    pub fn with_malformed_policy(mut self, policy: MalformedPolicy) -> Self {
        self.on_malformed = policy;
        self
    }

    /// 중단 토큰을 연결합니다.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// 새 이벤트 전달 채널을 연결합니다.
    pub fn with_alert_sender(mut self, tx: mpsc::Sender<DetectionEvent>) -> Self {
        self.alert_tx = Some(tx);
        self
    }

    /// 담당 카테고리를 반환합니다.
    pub fn category(&self) -> SourceCategory {
        self.category
    }

    /// 저장소의 워터마크에서 시작하는 인제스트 패스 하나를 실행합니다.
    pub async fn run_once(&self) -> Result<PassReport, IngestError> {
        let watermark = self
            .store
            .watermark(self.category)?
            .map(|w| w.object_id);
        self.run_once_from(watermark).await
    }

    /// 명시적 워터마크에서 시작하는 패스를 실행합니다.
    ///
    /// 워터마크를 입력으로 받고 갱신된 값을 보고서로 돌려주므로
    /// 고정 입력에 대해 순수하게 테스트할 수 있습니다. 내구 워터마크는
    /// 오브젝트 단위로 저장소에서 CAS 전진합니다.
    pub async fn run_once_from(
        &self,
        watermark: Option<String>,
    ) -> Result<PassReport, IngestError> {
        let mut report = PassReport {
            pass_id: uuid::Uuid::new_v4().to_string(),
            watermark: watermark.clone(),
            ..Default::default()
        };

        let objects = self.source.list(self.category).await?;

        for meta in objects {
            // 이미 처리된 오브젝트는 나열 대상에서 제외
            if let Some(ref mark) = report.watermark
                && meta.name.as_str() <= mark.as_str()
            {
                continue;
            }

            // 협조적 중단: 오브젝트 경계에서만 반영
            if self.cancel.is_cancelled() {
                tracing::info!(
                    category = %self.category,
                    pass_id = %report.pass_id,
                    "cancellation requested, stopping between objects"
                );
                break;
            }

            report.objects_listed += 1;

            let object = match self.fetch_with_retry(&meta).await {
                Ok(object) => object,
                Err(e) => {
                    tracing::warn!(
                        category = %self.category,
                        object = %meta.object_id(),
                        error = %e,
                        "object skipped after retries, operator follow-up needed"
                    );
                    metrics::counter!(
                        azlure_core::metrics::INGEST_OBJECTS_SKIPPED_TOTAL,
                        azlure_core::metrics::LABEL_CATEGORY => self.category.as_str(),
                    )
                    .increment(1);
                    report.objects_skipped += 1;
                    continue;
                }
            };

            if !self.process_object(&object, &mut report)? {
                break; // halt 정책
            }
        }

        Ok(report)
    }

    /// 오브젝트 하나를 정규화/탐지/영속하고 워터마크를 전진시킵니다.
    ///
    /// 패스를 계속해야 하면 `true`를 반환합니다.
    fn process_object(
        &self,
        object: &RawLogObject,
        report: &mut PassReport,
    ) -> Result<bool, IngestError> {
        let object_id = object.meta.object_id();

        let batch = match self.normalizer.normalize(object) {
            Ok(batch) => batch,
            Err(e) => {
                report.objects_malformed += 1;
                metrics::counter!(
                    azlure_core::metrics::INGEST_OBJECTS_MALFORMED_TOTAL,
                    azlure_core::metrics::LABEL_CATEGORY => self.category.as_str(),
                )
                .increment(1);

                match self.on_malformed {
                    MalformedPolicy::Halt => {
                        tracing::error!(
                            category = %self.category,
                            object = %object_id,
                            content_hash = %object.content_hash,
                            error = %e,
                            "malformed log object, halting pass (watermark unchanged)"
                        );
                        report.halted = true;
                        return Ok(false);
                    }
                    MalformedPolicy::Skip => {
                        tracing::warn!(
                            category = %self.category,
                            object = %object_id,
                            content_hash = %object.content_hash,
                            error = %e,
                            "malformed log object, skipping past it"
                        );
                        self.store
                            .advance_watermark(self.category, &object.meta.name)?;
                        report.watermark = Some(object.meta.name.clone());
                        return Ok(true);
                    }
                }
            }
        };

        report.records_normalized += batch.records.len() as u64;
        report.entries_dropped += batch.dropped;
        metrics::counter!(
            azlure_core::metrics::INGEST_RECORDS_NORMALIZED_TOTAL,
            azlure_core::metrics::LABEL_CATEGORY => self.category.as_str(),
        )
        .increment(batch.records.len() as u64);
        if batch.dropped > 0 {
            metrics::counter!(
                azlure_core::metrics::INGEST_ENTRIES_DROPPED_TOTAL,
                azlure_core::metrics::LABEL_CATEGORY => self.category.as_str(),
            )
            .increment(batch.dropped);
        }

        let mut events = Vec::new();
        for record in &batch.records {
            for event in self.rules.evaluate(record, &object_id) {
                metrics::counter!(
                    azlure_core::metrics::INGEST_EVENTS_EMITTED_TOTAL,
                    azlure_core::metrics::LABEL_RULE => event.rule_id.clone(),
                    azlure_core::metrics::LABEL_SEVERITY => event.severity.to_string(),
                )
                .increment(1);
                events.push(event);
            }
        }
        report.events_emitted += events.len() as u64;

        // 오브젝트 하나의 이벤트는 단일 트랜잭션 — 저장소 장애는 패스를 중단시킴
        let stats = self.store.upsert_batch(&events)?;
        report.events_recorded += stats.inserted.len() as u64;
        report.events_duplicate += stats.duplicates;
        report.new_events.extend(stats.inserted);

        // 레코드가 모두 내구 기록된 뒤에만 워터마크 전진
        self.store
            .advance_watermark(self.category, &object.meta.name)?;
        report.watermark = Some(object.meta.name.clone());
        report.objects_processed += 1;
        metrics::counter!(
            azlure_core::metrics::INGEST_OBJECTS_PROCESSED_TOTAL,
            azlure_core::metrics::LABEL_CATEGORY => self.category.as_str(),
        )
        .increment(1);

        Ok(true)
    }

    /// 제한된 지수 백오프로 오브젝트를 페치합니다.
    ///
    /// 무한 재시도는 불량 오브젝트 하나로 라이브락을 만들 수 있으므로
    /// 시도 횟수는 항상 유한합니다.
    async fn fetch_with_retry(&self, meta: &ObjectMeta) -> Result<RawLogObject, IngestError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.source.fetch(meta).await {
                Ok(object) => return Ok(object),
                Err(e) => {
                    if attempt >= self.retry.max_attempts {
                        return Err(IngestError::FetchFailed {
                            object_id: meta.object_id(),
                            attempts: attempt,
                            reason: e.to_string(),
                        });
                    }
                    let delay = self.retry.delay_after(attempt);
                    tracing::debug!(
                        object = %meta.object_id(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "fetch failed, backing off"
                    );
                    metrics::counter!(
                        azlure_core::metrics::INGEST_FETCH_RETRIES_TOTAL,
                        azlure_core::metrics::LABEL_CATEGORY => self.category.as_str(),
                    )
                    .increment(1);
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// 중단될 때까지 폴링 주기로 패스를 반복합니다.
    ///
    /// 저장소 장애로 패스가 중단되어도 루프는 계속되며,
    /// 다음 주기에 마지막 정상 워터마크에서 재시도합니다.
    pub async fn run_forever(&self, poll_interval: Duration) {
        tracing::info!(
            category = %self.category,
            poll_secs = poll_interval.as_secs(),
            "coordinator loop started"
        );

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            match self.run_once().await {
                Ok(report) => {
                    tracing::info!(
                        category = %self.category,
                        pass_id = %report.pass_id,
                        halted = report.halted,
                        "pass complete: {report}"
                    );
                    metrics::counter!(
                        azlure_core::metrics::DAEMON_PASSES_TOTAL,
                        azlure_core::metrics::LABEL_CATEGORY => self.category.as_str(),
                    )
                    .increment(1);

                    if let Some(ref tx) = self.alert_tx {
                        for event in report.new_events {
                            if tx.send(event).await.is_err() {
                                tracing::warn!("alert channel closed, dropping notifications");
                                break;
                            }
                        }
                    }
                }
                Err(e) => {
                    tracing::error!(
                        category = %self.category,
                        error = %e,
                        "pass aborted, will retry from last good watermark"
                    );
                    metrics::counter!(
                        azlure_core::metrics::DAEMON_PASSES_ABORTED_TOTAL,
                        azlure_core::metrics::LABEL_CATEGORY => self.category.as_str(),
                    )
                    .increment(1);
                }
            }

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(poll_interval) => {}
            }
        }

        tracing::info!(category = %self.category, "coordinator loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use azlure_core::config::RulesConfig;
    use bytes::Bytes;
    use chrono::Utc;
    use std::collections::HashMap;
    use std::sync::Mutex;

    const HIT_ENTRY: &str = r#"{"time":"2024-06-01T12:00:00Z","operationName":"GetBlob","callerIpAddress":"203.0.113.7","uri":"/backup/credential"}"#;
    const MISS_ENTRY: &str = r#"{"time":"2024-06-01T12:05:00Z","operationName":"GetBlob","uri":"/other/file.txt"}"#;

    /// 테스트용 인메모리 소스 — 오브젝트별 페치 실패 주입을 지원합니다.
    struct StaticSource {
        objects: Vec<(ObjectMeta, Vec<u8>)>,
        failures_left: Mutex<HashMap<String, u32>>,
    }

    impl StaticSource {
        fn new(entries: &[(&str, &str)]) -> Self {
            let objects = entries
                .iter()
                .map(|(name, content)| {
                    (
                        ObjectMeta {
                            category: SourceCategory::StorageRead,
                            container: "insights-logs-storageread".to_owned(),
                            name: (*name).to_owned(),
                            size: content.len() as u64,
                        },
                        content.as_bytes().to_vec(),
                    )
                })
                .collect();
            Self {
                objects,
                failures_left: Mutex::new(HashMap::new()),
            }
        }

        fn fail_fetches(self, name: &str, times: u32) -> Self {
            self.failures_left
                .lock()
                .unwrap()
                .insert(name.to_owned(), times);
            self
        }
    }

    impl LogSource for StaticSource {
        async fn list(&self, _category: SourceCategory) -> Result<Vec<ObjectMeta>, IngestError> {
            let mut metas: Vec<_> = self.objects.iter().map(|(m, _)| m.clone()).collect();
            metas.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(metas)
        }

        async fn fetch(&self, meta: &ObjectMeta) -> Result<RawLogObject, IngestError> {
            let mut failures = self.failures_left.lock().unwrap();
            if let Some(left) = failures.get_mut(&meta.name)
                && *left > 0
            {
                *left -= 1;
                return Err(IngestError::FetchFailed {
                    object_id: meta.object_id(),
                    attempts: 1,
                    reason: "injected failure".to_owned(),
                });
            }
            drop(failures);

            let content = self
                .objects
                .iter()
                .find(|(m, _)| m.name == meta.name)
                .map(|(_, c)| c.clone())
                .unwrap_or_default();
            Ok(RawLogObject {
                meta: meta.clone(),
                content: Bytes::from(content),
                content_hash: "0".repeat(64),
                discovered_at: Utc::now(),
            })
        }
    }

    fn coordinator(source: StaticSource) -> CategoryCoordinator<StaticSource> {
        coordinator_with_store(source, Arc::new(EventStore::open_in_memory().unwrap()))
    }

    fn coordinator_with_store(
        source: StaticSource,
        store: Arc<EventStore>,
    ) -> CategoryCoordinator<StaticSource> {
        let rules = Arc::new(RuleSet::from_config(&RulesConfig::default()).unwrap());
        CategoryCoordinator::new(SourceCategory::StorageRead, Arc::new(source), store, rules)
            .with_retry_policy(RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(2),
            })
    }

    #[tokio::test]
    async fn pass_processes_objects_and_records_events() {
        let source = StaticSource::new(&[("01.json", HIT_ENTRY), ("02.json", MISS_ENTRY)]);
        let coordinator = coordinator(source);

        let report = coordinator.run_once().await.unwrap();
        assert_eq!(report.objects_listed, 2);
        assert_eq!(report.objects_processed, 2);
        assert_eq!(report.records_normalized, 2);
        assert_eq!(report.events_emitted, 1);
        assert_eq!(report.events_recorded, 1);
        assert_eq!(report.watermark.as_deref(), Some("02.json"));
        assert_eq!(report.new_events.len(), 1);
        assert_eq!(report.new_events[0].rule_id, "decoy_credential_read");
    }

    #[tokio::test]
    async fn second_pass_sees_nothing_new() {
        let source = StaticSource::new(&[("01.json", HIT_ENTRY)]);
        let coordinator = coordinator(source);

        let first = coordinator.run_once().await.unwrap();
        assert_eq!(first.objects_processed, 1);

        let second = coordinator.run_once().await.unwrap();
        assert_eq!(second.objects_listed, 0);
        assert_eq!(second.events_recorded, 0);
        // 워터마크는 유지
        assert_eq!(second.watermark.as_deref(), Some("01.json"));
    }

    #[tokio::test]
    async fn reingest_from_scratch_is_idempotent() {
        // 워터마크를 무시하고 같은 오브젝트를 다시 처리해도 새 행이 없어야 함
        let source = StaticSource::new(&[("01.json", HIT_ENTRY)]);
        let coordinator = coordinator(source);

        let first = coordinator.run_once_from(None).await.unwrap();
        assert_eq!(first.events_recorded, 1);

        let second = coordinator.run_once_from(None).await.unwrap();
        assert_eq!(second.objects_processed, 1);
        assert_eq!(second.events_emitted, 1);
        assert_eq!(second.events_recorded, 0);
        assert_eq!(second.events_duplicate, 1);
    }

    #[tokio::test]
    async fn fetch_failure_skips_object_but_continues() {
        let source = StaticSource::new(&[("01.json", HIT_ENTRY), ("02.json", MISS_ENTRY)])
            .fail_fetches("01.json", 10); // 재시도 한도 초과
        let coordinator = coordinator(source);

        let report = coordinator.run_once().await.unwrap();
        assert_eq!(report.objects_skipped, 1);
        assert_eq!(report.objects_processed, 1);
        // 후속 오브젝트가 워터마크를 전진시킴
        assert_eq!(report.watermark.as_deref(), Some("02.json"));
    }

    #[tokio::test]
    async fn transient_fetch_failure_is_retried() {
        let source =
            StaticSource::new(&[("01.json", HIT_ENTRY)]).fail_fetches("01.json", 2);
        let coordinator = coordinator(source);

        let report = coordinator.run_once().await.unwrap();
        assert_eq!(report.objects_skipped, 0);
        assert_eq!(report.objects_processed, 1);
    }

    #[tokio::test]
    async fn malformed_object_halts_by_default() {
        let source = StaticSource::new(&[
            ("01.json", "<not json>"),
            ("02.json", HIT_ENTRY),
        ]);
        let coordinator = coordinator(source);

        let report = coordinator.run_once().await.unwrap();
        assert!(report.halted);
        assert_eq!(report.objects_malformed, 1);
        assert_eq!(report.objects_processed, 0);
        // 워터마크는 파싱 불가 오브젝트를 지나치지 않음
        assert_eq!(report.watermark, None);

        // 다음 패스도 같은 오브젝트에서 멈춤
        let next = coordinator.run_once().await.unwrap();
        assert!(next.halted);
        assert_eq!(next.objects_processed, 0);
    }

    #[tokio::test]
    async fn malformed_object_skipped_when_configured() {
        let source = StaticSource::new(&[
            ("01.json", "<not json>"),
            ("02.json", HIT_ENTRY),
        ]);
        let coordinator = coordinator(source).with_malformed_policy(MalformedPolicy::Skip);

        let report = coordinator.run_once().await.unwrap();
        assert!(!report.halted);
        assert_eq!(report.objects_malformed, 1);
        assert_eq!(report.objects_processed, 1);
        assert_eq!(report.watermark.as_deref(), Some("02.json"));
    }

    #[tokio::test]
    async fn store_failure_aborts_pass_without_watermark() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("azlure.db");

        // 스키마 생성 후 읽기 전용으로 다시 열어 저장소 장애를 시뮬레이션
        let writable = Arc::new(EventStore::open(&path).unwrap());
        drop(writable);
        let read_only = Arc::new(EventStore::open_read_only(&path).unwrap());

        let source = StaticSource::new(&[("01.json", HIT_ENTRY)]);
        let coordinator = coordinator_with_store(source, read_only);

        let result = coordinator.run_once().await;
        assert!(matches!(result, Err(IngestError::StoreUnavailable(_))));

        // 워터마크와 이벤트 모두 비어 있어야 함 — 다음 패스가 깨끗하게 재시도
        let check = EventStore::open(&path).unwrap();
        assert_eq!(check.watermark(SourceCategory::StorageRead).unwrap(), None);
        assert!(check
            .query(&crate::store::EventFilter::default())
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn cancellation_stops_between_objects() {
        let source = StaticSource::new(&[("01.json", HIT_ENTRY), ("02.json", MISS_ENTRY)]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let coordinator = coordinator(source).with_cancellation(cancel);

        let report = coordinator.run_once().await.unwrap();
        // 이미 중단 요청 상태이므로 어떤 오브젝트도 시작하지 않음
        assert_eq!(report.objects_processed, 0);
        assert_eq!(report.watermark, None);
    }

    #[tokio::test]
    async fn watermark_only_advances_forward_across_passes() {
        let source = StaticSource::new(&[("01.json", HIT_ENTRY), ("02.json", MISS_ENTRY)]);
        let store = Arc::new(EventStore::open_in_memory().unwrap());
        let coordinator = coordinator_with_store(source, Arc::clone(&store));

        coordinator.run_once().await.unwrap();
        let after_first = store
            .watermark(SourceCategory::StorageRead)
            .unwrap()
            .unwrap()
            .object_id;

        // 처음부터 재실행해도 내구 워터마크는 후퇴하지 않음 (CAS)
        coordinator.run_once_from(None).await.unwrap();
        let after_second = store
            .watermark(SourceCategory::StorageRead)
            .unwrap()
            .unwrap()
            .object_id;
        assert_eq!(after_first, after_second);
    }

    #[tokio::test]
    async fn alert_channel_receives_new_events_only() {
        let (tx, mut rx) = mpsc::channel(16);
        let source = StaticSource::new(&[("01.json", HIT_ENTRY)]);
        let store = Arc::new(EventStore::open_in_memory().unwrap());
        let rules = Arc::new(RuleSet::from_config(&RulesConfig::default()).unwrap());
        let cancel = CancellationToken::new();
        let coordinator = CategoryCoordinator::new(
            SourceCategory::StorageRead,
            Arc::new(source),
            store,
            rules,
        )
        .with_cancellation(cancel.clone())
        .with_alert_sender(tx);

        let handle = tokio::spawn(async move {
            coordinator.run_forever(Duration::from_millis(10)).await;
        });

        let event = rx.recv().await.expect("expected one alert");
        assert_eq!(event.rule_id, "decoy_credential_read");

        // 이후 패스에서는 중복이므로 새 알림이 없어야 함
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());

        cancel.cancel();
        handle.await.unwrap();
    }

    #[test]
    fn retry_delay_is_exponential_and_capped() {
        let retry = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(450),
        };
        assert_eq!(retry.delay_after(1), Duration::from_millis(100));
        assert_eq!(retry.delay_after(2), Duration::from_millis(200));
        assert_eq!(retry.delay_after(3), Duration::from_millis(400));
        assert_eq!(retry.delay_after(4), Duration::from_millis(450)); // capped
    }

    #[test]
    fn malformed_policy_from_config() {
        let mut config = IngestConfig::default();
        assert_eq!(MalformedPolicy::from_config(&config), MalformedPolicy::Halt);
        config.on_malformed = "skip".to_owned();
        assert_eq!(MalformedPolicy::from_config(&config), MalformedPolicy::Skip);
    }
}
