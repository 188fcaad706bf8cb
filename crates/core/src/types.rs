//! 도메인 타입 — 파이프라인 전역에서 사용되는 공통 타입
//!
//! 정규화된 로그 레코드, 탐지 이벤트, 워터마크 등
//! 모든 크레이트가 공유하는 데이터 구조를 정의합니다.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 로그 소스 카테고리
///
/// Azure 진단 로그 컨테이너가 어떤 서비스에서 유래했는지를 나타냅니다.
/// 컨테이너 네이밍 컨벤션(`insights-logs-*`)으로 구분됩니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceCategory {
    /// 스토리지 읽기 로그 (insights-logs-storageread)
    StorageRead,
    /// 스토리지 쓰기 로그 (insights-logs-storagewrite)
    StorageWrite,
    /// Key Vault 감사 로그 (insights-logs-auditevent)
    KeyVaultAudit,
    /// 구독 Activity 로그 (insights-activity-logs, 선택적)
    ActivityLog,
}

impl SourceCategory {
    /// 전체 카테고리 목록 (워터마크/코디네이터 순회용)
    pub const ALL: [SourceCategory; 4] = [
        SourceCategory::StorageRead,
        SourceCategory::StorageWrite,
        SourceCategory::KeyVaultAudit,
        SourceCategory::ActivityLog,
    ];

    /// 저장소 키로 사용되는 안정적인 식별자를 반환합니다.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StorageRead => "storage_read",
            Self::StorageWrite => "storage_write",
            Self::KeyVaultAudit => "key_vault_audit",
            Self::ActivityLog => "activity_log",
        }
    }

    /// 저장소 키에서 카테고리를 복원합니다.
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "storage_read" => Some(Self::StorageRead),
            "storage_write" => Some(Self::StorageWrite),
            "key_vault_audit" => Some(Self::KeyVaultAudit),
            "activity_log" => Some(Self::ActivityLog),
            _ => None,
        }
    }

    /// 컨테이너 이름에서 카테고리를 추정합니다.
    ///
    /// 진단 로그 컨테이너 네이밍 컨벤션을 따릅니다.
    /// 매칭되지 않으면 `None`을 반환합니다.
    pub fn from_container_name(name: &str) -> Option<Self> {
        let lower = name.to_lowercase();
        if lower.contains("storageread") {
            Some(Self::StorageRead)
        } else if lower.contains("storagewrite") {
            Some(Self::StorageWrite)
        } else if lower.contains("auditevent") {
            Some(Self::KeyVaultAudit)
        } else if lower.contains("activity") {
            Some(Self::ActivityLog)
        } else {
            None
        }
    }
}

impl fmt::Display for SourceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 심각도 레벨
///
/// 탐지 이벤트의 심각도를 나타냅니다.
/// `Ord` 구현으로 심각도 비교가 가능합니다 (`Info < Low < Medium < High < Critical`).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// 정보성 이벤트
    #[default]
    Info,
    /// 낮은 심각도
    Low,
    /// 중간 심각도
    Medium,
    /// 높은 심각도
    High,
    /// 치명적 — 즉시 대응 필요
    Critical,
}

impl Severity {
    /// 문자열에서 심각도를 파싱합니다.
    ///
    /// 대소문자를 구분하지 않습니다.
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "info" | "informational" => Some(Self::Info),
            "low" => Some(Self::Low),
            "medium" | "med" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" | "crit" => Some(Self::Critical),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "Info"),
            Self::Low => write!(f, "Low"),
            Self::Medium => write!(f, "Medium"),
            Self::High => write!(f, "High"),
            Self::Critical => write!(f, "Critical"),
        }
    }
}

/// 정규화된 로그 레코드
///
/// 이기종 진단 로그 레코드(스토리지 읽기/쓰기, Key Vault 감사, Activity)를
/// 단일 형식으로 통합한 결과입니다. 하나의 인제스트 패스 동안만 살아있고
/// 저장되지 않습니다.
///
/// 불변식: `occurred_at`과 `operation`은 항상 존재합니다.
/// 둘 중 하나라도 없는 원본 레코드는 정규화 단계에서 드롭됩니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedRecord {
    /// 소스 카테고리
    pub category: SourceCategory,
    /// 이벤트 발생 시각
    pub occurred_at: DateTime<Utc>,
    /// 오퍼레이션 이름 (예: "GetBlob", "SecretGet")
    pub operation: String,
    /// 호출자 신원 (UPN, 오브젝트 ID 등 — 로그에 있는 경우)
    pub caller: Option<String>,
    /// 호출자 IP
    pub caller_ip: Option<String>,
    /// 요청 URI 또는 리소스 경로 (원본 그대로)
    pub request_uri: Option<String>,
    /// SAS 파라미터가 가려진 요청 URI (표시용)
    pub request_uri_redacted: Option<String>,
    /// 리소스 ID
    pub resource_id: Option<String>,
    /// HTTP 상태 코드 또는 결과 타입
    pub status_code: Option<String>,
    /// User-Agent 헤더
    pub user_agent: Option<String>,
    /// 인증 방식 (SAS, OAuth 등)
    pub auth_type: Option<String>,
    /// 평탄화된 원본 필드 (포렌식 리플레이용으로 보존)
    pub fields: Vec<(String, String)>,
}

impl NormalizedRecord {
    /// 평탄화된 원본 필드에서 값을 조회합니다.
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

impl fmt::Display for NormalizedRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} op={} ip={}",
            self.category,
            self.occurred_at.to_rfc3339(),
            self.operation,
            self.caller_ip.as_deref().unwrap_or("-"),
        )
    }
}

/// 탐지 이벤트 — 저장소에 영속되는 유일한 탐지 산출물
///
/// 규칙 하나가 레코드 하나에 매칭될 때마다 생성됩니다.
/// `dedup_key`는 규칙 ID + 소스 카테고리 + 매칭 필드의 안정 해시로 파생되어
/// 동일 입력의 재인제스트가 절대 새 행을 만들지 않도록 보장합니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionEvent {
    /// 매칭된 규칙 ID
    pub rule_id: String,
    /// 규칙 고유 심각도
    pub severity: Severity,
    /// 소스 카테고리
    pub category: SourceCategory,
    /// 매칭된 레코드의 발생 시각
    pub occurred_at: DateTime<Utc>,
    /// 결정적 중복 제거 키 (SHA-256 hex)
    pub dedup_key: String,
    /// 사람이 읽을 수 있는 설명
    pub description: String,
    /// 매칭된 레코드의 오퍼레이션
    pub operation: String,
    /// 호출자 IP (있는 경우)
    pub caller_ip: Option<String>,
    /// SAS 파라미터가 가려진 요청 URI (표시용)
    pub request_uri: Option<String>,
    /// 레코드가 유래한 로그 오브젝트 식별자
    pub object_id: String,
    /// 저장소에 처음 기록된 시각 (insert 시 부여, dedup_key에 불포함)
    pub first_seen: Option<DateTime<Utc>>,
}

impl fmt::Display for DetectionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} at {} (key: {})",
            self.severity,
            self.rule_id,
            self.occurred_at.to_rfc3339(),
            &self.dedup_key[..12.min(self.dedup_key.len())],
        )
    }
}

/// 인제스트 워터마크
///
/// 카테고리별로 마지막으로 완전히 처리된 로그 오브젝트의 경계를 나타냅니다.
/// 코디네이터만 갱신하며, 항상 전진만 합니다 (저장소의 CAS 갱신으로 강제).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Watermark {
    /// 소스 카테고리
    pub category: SourceCategory,
    /// 마지막으로 처리된 오브젝트 식별자
    pub object_id: String,
    /// 갱신 시각
    pub updated_at: DateTime<Utc>,
}

impl fmt::Display for Watermark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.category, self.object_id)
    }
}
