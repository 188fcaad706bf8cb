//! 이벤트 저장소 — SQLite 기반 멱등 영속 계층
//!
//! 탐지 이벤트와 인제스트 워터마크를 담는 유일한 내구 상태입니다.
//! 멱등성은 `dedup_key`의 UNIQUE 제약으로 저장소 계층에서 강제됩니다 —
//! 애플리케이션 락이 아니라 제약 충돌이 동시 쓰기를 직렬화합니다.
//!
//! 오브젝트 하나의 이벤트 배치는 단일 트랜잭션으로 기록되므로
//! 중간 크래시가 부분 기록 상태를 남기지 않습니다. 재시작 후 같은 배치를
//! 다시 실행해도 dedup key 불변식 덕분에 안전합니다.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OpenFlags, params};

use azlure_core::error::StoreError;
use azlure_core::types::{DetectionEvent, Severity, SourceCategory, Watermark};

/// 단일 upsert 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// 새로 기록됨
    Inserted,
    /// 이미 같은 dedup key가 존재 — 에러가 아닌 정상 no-op
    AlreadyRecorded,
}

/// 배치 upsert 통계
#[derive(Debug, Default)]
pub struct UpsertStats {
    /// 새로 기록된 이벤트 (first_seen이 채워진 상태)
    pub inserted: Vec<DetectionEvent>,
    /// dedup key 충돌로 무시된 이벤트 수
    pub duplicates: u64,
}

/// 이벤트 조회 필터
///
/// 시간 범위, 규칙 ID, 최소 심각도로 조회를 제한합니다.
/// 결과는 항상 이벤트 발생 시각 오름차순입니다.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// 발생 시각 하한 (포함)
    pub from: Option<DateTime<Utc>>,
    /// 발생 시각 상한 (미포함)
    pub until: Option<DateTime<Utc>>,
    /// 규칙 ID 일치
    pub rule_id: Option<String>,
    /// 최소 심각도
    pub min_severity: Option<Severity>,
    /// 최대 반환 행 수
    pub limit: Option<usize>,
}

/// 규칙별 이벤트 집계
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct RuleCount {
    /// 규칙 ID
    pub rule_id: String,
    /// 규칙 심각도
    pub severity: Severity,
    /// 이벤트 수
    pub count: u64,
}

/// 저장소 전체 집계 (운영자 status 출력용)
#[derive(Debug, Clone, serde::Serialize)]
pub struct StoreTotals {
    /// 전체 이벤트 수
    pub events: u64,
    /// 심각도별 이벤트 수
    pub by_severity: Vec<(Severity, u64)>,
    /// 카테고리별 워터마크
    pub watermarks: Vec<Watermark>,
}

/// SQLite 이벤트 저장소
///
/// 내부 `Connection`은 `Mutex`로 감싸 여러 코디네이터 태스크가 공유합니다.
pub struct EventStore {
    conn: Mutex<Connection>,
}

impl EventStore {
    /// 파일 경로에서 저장소를 열고 스키마를 초기화합니다.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn =
            Connection::open(path.as_ref()).map_err(|e| StoreError::Open(e.to_string()))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// 인메모리 저장소를 생성합니다 (테스트용).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(|e| StoreError::Open(e.to_string()))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// 저장소를 읽기 전용으로 엽니다.
    ///
    /// CLI 조회 명령이 사용합니다. 스키마 초기화를 건너뛰므로
    /// 존재하지 않는 파일은 에러입니다.
    pub fn open_read_only(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open_with_flags(
            path.as_ref(),
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| StoreError::Open(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                dedup_key TEXT NOT NULL UNIQUE,
                rule_id TEXT NOT NULL,
                severity INTEGER NOT NULL,
                category TEXT NOT NULL,
                occurred_at TEXT NOT NULL,
                description TEXT NOT NULL,
                operation TEXT NOT NULL,
                caller_ip TEXT,
                request_uri TEXT,
                object_id TEXT NOT NULL,
                first_seen TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_events_occurred
                ON events(occurred_at);

            CREATE INDEX IF NOT EXISTS idx_events_rule
                ON events(rule_id);

            CREATE INDEX IF NOT EXISTS idx_events_severity
                ON events(severity);

            CREATE TABLE IF NOT EXISTS watermarks (
                category TEXT PRIMARY KEY,
                object_id TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )
        .map_err(|e| StoreError::Open(e.to_string()))
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Open("connection mutex poisoned".to_owned()))
    }

    /// 이벤트 하나를 멱등하게 기록합니다.
    ///
    /// dedup key가 이미 존재하면 아무것도 하지 않고
    /// [`UpsertOutcome::AlreadyRecorded`]를 반환합니다.
    pub fn upsert(&self, event: &DetectionEvent) -> Result<UpsertOutcome, StoreError> {
        let conn = self.lock()?;
        let changed = Self::insert_ignore(&conn, event, Utc::now())
            .map_err(|e| StoreError::Write(e.to_string()))?;
        Ok(if changed {
            UpsertOutcome::Inserted
        } else {
            UpsertOutcome::AlreadyRecorded
        })
    }

    /// 오브젝트 하나에서 나온 이벤트 배치를 단일 트랜잭션으로 기록합니다.
    ///
    /// 트랜잭션이 실패하면 배치 전체가 롤백되어 부분 기록이 남지 않습니다.
    pub fn upsert_batch(&self, events: &[DetectionEvent]) -> Result<UpsertStats, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction()
            .map_err(|e| StoreError::Write(e.to_string()))?;

        let mut stats = UpsertStats::default();
        let first_seen = Utc::now();
        for event in events {
            let changed = Self::insert_ignore(&tx, event, first_seen)
                .map_err(|e| StoreError::Write(e.to_string()))?;
            if changed {
                metrics::counter!(
                    azlure_core::metrics::STORE_EVENTS_RECORDED_TOTAL,
                    azlure_core::metrics::LABEL_RULE => event.rule_id.clone(),
                )
                .increment(1);
                let mut recorded = event.clone();
                recorded.first_seen = Some(first_seen);
                stats.inserted.push(recorded);
            } else {
                metrics::counter!(
                    azlure_core::metrics::STORE_EVENTS_DUPLICATE_TOTAL,
                    azlure_core::metrics::LABEL_RULE => event.rule_id.clone(),
                )
                .increment(1);
                stats.duplicates += 1;
            }
        }

        tx.commit().map_err(|e| StoreError::Write(e.to_string()))?;
        Ok(stats)
    }

    fn insert_ignore(
        conn: &Connection,
        event: &DetectionEvent,
        first_seen: DateTime<Utc>,
    ) -> rusqlite::Result<bool> {
        let changed = conn.execute(
            r#"
            INSERT OR IGNORE INTO events
                (dedup_key, rule_id, severity, category, occurred_at,
                 description, operation, caller_ip, request_uri, object_id, first_seen)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
            params![
                event.dedup_key,
                event.rule_id,
                severity_rank(event.severity),
                event.category.as_str(),
                canonical_time(event.occurred_at),
                event.description,
                event.operation,
                event.caller_ip,
                event.request_uri,
                event.object_id,
                canonical_time(event.first_seen.unwrap_or(first_seen)),
            ],
        )?;
        Ok(changed > 0)
    }

    /// 필터 조건에 맞는 이벤트를 발생 시각 오름차순으로 조회합니다.
    pub fn query(&self, filter: &EventFilter) -> Result<Vec<DetectionEvent>, StoreError> {
        let conn = self.lock()?;

        let mut sql = String::from(
            "SELECT dedup_key, rule_id, severity, category, occurred_at, description, \
             operation, caller_ip, request_uri, object_id, first_seen \
             FROM events WHERE 1=1",
        );
        let mut bind: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(from) = filter.from {
            sql.push_str(" AND occurred_at >= ?");
            bind.push(Box::new(canonical_time(from)));
        }
        if let Some(until) = filter.until {
            sql.push_str(" AND occurred_at < ?");
            bind.push(Box::new(canonical_time(until)));
        }
        if let Some(ref rule_id) = filter.rule_id {
            sql.push_str(" AND rule_id = ?");
            bind.push(Box::new(rule_id.clone()));
        }
        if let Some(min) = filter.min_severity {
            sql.push_str(" AND severity >= ?");
            bind.push(Box::new(severity_rank(min)));
        }

        sql.push_str(" ORDER BY occurred_at ASC, id ASC");
        if let Some(limit) = filter.limit {
            sql.push_str(" LIMIT ?");
            bind.push(Box::new(limit as i64));
        }

        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| StoreError::Query(e.to_string()))?;
        let bind_refs: Vec<&dyn rusqlite::ToSql> = bind.iter().map(|b| b.as_ref()).collect();
        let rows = stmt
            .query_map(bind_refs.as_slice(), row_to_event)
            .map_err(|e| StoreError::Query(e.to_string()))?;

        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| StoreError::Query(e.to_string()))
    }

    /// 시간 창 내 규칙별 이벤트 수를 집계합니다 (건수 내림차순).
    pub fn summarize(
        &self,
        from: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> Result<Vec<RuleCount>, StoreError> {
        let conn = self.lock()?;

        let mut sql = String::from(
            "SELECT rule_id, MAX(severity), COUNT(*) FROM events WHERE 1=1",
        );
        let mut bind: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
        if let Some(from) = from {
            sql.push_str(" AND occurred_at >= ?");
            bind.push(Box::new(canonical_time(from)));
        }
        if let Some(until) = until {
            sql.push_str(" AND occurred_at < ?");
            bind.push(Box::new(canonical_time(until)));
        }
        sql.push_str(" GROUP BY rule_id ORDER BY COUNT(*) DESC, rule_id ASC");

        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| StoreError::Query(e.to_string()))?;
        let bind_refs: Vec<&dyn rusqlite::ToSql> = bind.iter().map(|b| b.as_ref()).collect();
        let rows = stmt
            .query_map(bind_refs.as_slice(), |row| {
                Ok(RuleCount {
                    rule_id: row.get(0)?,
                    severity: severity_from_rank(row.get(1)?),
                    count: row.get::<_, i64>(2)? as u64,
                })
            })
            .map_err(|e| StoreError::Query(e.to_string()))?;

        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| StoreError::Query(e.to_string()))
    }

    /// 카테고리의 현재 워터마크를 조회합니다.
    pub fn watermark(&self, category: SourceCategory) -> Result<Option<Watermark>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT object_id, updated_at FROM watermarks WHERE category = ?1")
            .map_err(|e| StoreError::Query(e.to_string()))?;
        let mut rows = stmt
            .query(params![category.as_str()])
            .map_err(|e| StoreError::Query(e.to_string()))?;

        match rows.next().map_err(|e| StoreError::Query(e.to_string()))? {
            Some(row) => {
                let object_id: String = row.get(0).map_err(|e| StoreError::Query(e.to_string()))?;
                let updated_at: String =
                    row.get(1).map_err(|e| StoreError::Query(e.to_string()))?;
                Ok(Some(Watermark {
                    category,
                    object_id,
                    updated_at: parse_time(&updated_at),
                }))
            }
            None => Ok(None),
        }
    }

    /// 모든 카테고리의 워터마크를 조회합니다.
    pub fn watermarks(&self) -> Result<Vec<Watermark>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT category, object_id, updated_at FROM watermarks ORDER BY category")
            .map_err(|e| StoreError::Query(e.to_string()))?;
        let rows = stmt
            .query_map([], |row| {
                let category: String = row.get(0)?;
                let object_id: String = row.get(1)?;
                let updated_at: String = row.get(2)?;
                Ok((category, object_id, updated_at))
            })
            .map_err(|e| StoreError::Query(e.to_string()))?;

        let mut watermarks = Vec::new();
        for row in rows {
            let (category, object_id, updated_at) =
                row.map_err(|e| StoreError::Query(e.to_string()))?;
            // 알 수 없는 카테고리 행은 스킵 (이전 버전 잔재일 수 있음)
            if let Some(category) = SourceCategory::from_key(&category) {
                watermarks.push(Watermark {
                    category,
                    object_id,
                    updated_at: parse_time(&updated_at),
                });
            }
        }
        Ok(watermarks)
    }

    /// 워터마크를 compare-and-swap 방식으로 전진시킵니다.
    ///
    /// 같은 카테고리의 코디네이터 인스턴스가 둘 이상 돌아도
    /// 워터마크는 절대 후퇴하지 않습니다. 전진했으면 `true`를 반환합니다.
    pub fn advance_watermark(
        &self,
        category: SourceCategory,
        object_id: &str,
    ) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let changed = conn
            .execute(
                r#"
                INSERT INTO watermarks (category, object_id, updated_at)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(category) DO UPDATE SET
                    object_id = excluded.object_id,
                    updated_at = excluded.updated_at
                WHERE excluded.object_id > watermarks.object_id
                "#,
                params![category.as_str(), object_id, canonical_time(Utc::now())],
            )
            .map_err(|e| StoreError::Write(e.to_string()))?;
        Ok(changed > 0)
    }

    /// 운영자 status 출력용 전체 집계를 반환합니다.
    pub fn totals(&self) -> Result<StoreTotals, StoreError> {
        let events = {
            let conn = self.lock()?;
            let count: i64 = conn
                .query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))
                .map_err(|e| StoreError::Query(e.to_string()))?;

            count as u64
        };

        let by_severity = {
            let conn = self.lock()?;
            let mut stmt = conn
                .prepare(
                    "SELECT severity, COUNT(*) FROM events GROUP BY severity ORDER BY severity DESC",
                )
                .map_err(|e| StoreError::Query(e.to_string()))?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        severity_from_rank(row.get(0)?),
                        row.get::<_, i64>(1)? as u64,
                    ))
                })
                .map_err(|e| StoreError::Query(e.to_string()))?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .map_err(|e| StoreError::Query(e.to_string()))?
        };

        Ok(StoreTotals {
            events,
            by_severity,
            watermarks: self.watermarks()?,
        })
    }
}

/// 저장용 고정 폭 시각 표현 — 사전식 정렬이 시간 정렬과 일치해야 합니다.
fn canonical_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_time(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_default()
}

fn severity_rank(severity: Severity) -> i64 {
    match severity {
        Severity::Info => 0,
        Severity::Low => 1,
        Severity::Medium => 2,
        Severity::High => 3,
        Severity::Critical => 4,
    }
}

fn severity_from_rank(rank: i64) -> Severity {
    match rank {
        1 => Severity::Low,
        2 => Severity::Medium,
        3 => Severity::High,
        4 => Severity::Critical,
        _ => Severity::Info,
    }
}

fn row_to_event(row: &rusqlite::Row<'_>) -> rusqlite::Result<DetectionEvent> {
    let category: String = row.get(3)?;
    let occurred_at: String = row.get(4)?;
    let first_seen: String = row.get(10)?;
    Ok(DetectionEvent {
        dedup_key: row.get(0)?,
        rule_id: row.get(1)?,
        severity: severity_from_rank(row.get(2)?),
        category: SourceCategory::from_key(&category).unwrap_or(SourceCategory::StorageRead),
        occurred_at: parse_time(&occurred_at),
        description: row.get(5)?,
        operation: row.get(6)?,
        caller_ip: row.get(7)?,
        request_uri: row.get(8)?,
        object_id: row.get(9)?,
        first_seen: Some(parse_time(&first_seen)),
    })
}
