//! 설정 관리 — azlure.toml 파싱 및 런타임 설정
//!
//! [`AzlureConfig`]는 모든 크레이트의 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`AZLURE_STORAGE_DB_PATH=/var/lib/azlure/azlure.db` 형식)
//! 3. 설정 파일 (`azlure.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), azlure_core::error::AzlureError> {
//! use azlure_core::config::AzlureConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = AzlureConfig::load("azlure.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = AzlureConfig::parse("[general]\nlog_level = \"debug\"")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AzlureError, ConfigError};
use crate::types::SourceCategory;

/// AzLure 통합 설정
///
/// `azlure.toml` 파일의 최상위 구조를 나타냅니다.
/// 각 크레이트는 자기 섹션만 읽어 사용합니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AzlureConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 로그 소스 설정
    #[serde(default)]
    pub source: SourceConfig,
    /// 인제스트 설정
    #[serde(default)]
    pub ingest: IngestConfig,
    /// 탐지 규칙 설정
    #[serde(default)]
    pub rules: RulesConfig,
    /// 이벤트 저장소 설정
    #[serde(default)]
    pub storage: StorageConfig,
    /// 알림 설정
    #[serde(default)]
    pub alerts: AlertsConfig,
    /// 메트릭 설정
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl AzlureConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, AzlureError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, AzlureError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AzlureError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                AzlureError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, AzlureError> {
        toml::from_str(toml_str).map_err(|e| {
            AzlureError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `AZLURE_{SECTION}_{FIELD}`
    /// 예: `AZLURE_STORAGE_DB_PATH=/tmp/azlure.db`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "AZLURE_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "AZLURE_GENERAL_LOG_FORMAT");
        override_string(&mut self.general.data_dir, "AZLURE_GENERAL_DATA_DIR");

        // Source
        override_string(&mut self.source.root_dir, "AZLURE_SOURCE_ROOT_DIR");
        override_string(
            &mut self.source.storage_read_container,
            "AZLURE_SOURCE_STORAGE_READ_CONTAINER",
        );
        override_string(
            &mut self.source.storage_write_container,
            "AZLURE_SOURCE_STORAGE_WRITE_CONTAINER",
        );
        override_string(
            &mut self.source.key_vault_audit_container,
            "AZLURE_SOURCE_KEY_VAULT_AUDIT_CONTAINER",
        );
        override_string(
            &mut self.source.activity_log_container,
            "AZLURE_SOURCE_ACTIVITY_LOG_CONTAINER",
        );
        override_bool(
            &mut self.source.activity_log_enabled,
            "AZLURE_SOURCE_ACTIVITY_LOG_ENABLED",
        );

        // Ingest
        override_u64(
            &mut self.ingest.poll_interval_secs,
            "AZLURE_INGEST_POLL_INTERVAL_SECS",
        );
        override_u32(
            &mut self.ingest.retry_max_attempts,
            "AZLURE_INGEST_RETRY_MAX_ATTEMPTS",
        );
        override_u64(
            &mut self.ingest.retry_base_delay_ms,
            "AZLURE_INGEST_RETRY_BASE_DELAY_MS",
        );
        override_u64(
            &mut self.ingest.retry_max_delay_ms,
            "AZLURE_INGEST_RETRY_MAX_DELAY_MS",
        );
        override_string(&mut self.ingest.on_malformed, "AZLURE_INGEST_ON_MALFORMED");

        // Rules
        override_csv(&mut self.rules.decoy_paths, "AZLURE_RULES_DECOY_PATHS");
        override_string(&mut self.rules.decoy_match, "AZLURE_RULES_DECOY_MATCH");
        override_bool(
            &mut self.rules.case_insensitive,
            "AZLURE_RULES_CASE_INSENSITIVE",
        );
        override_bool(
            &mut self.rules.decoy_credential_read,
            "AZLURE_RULES_DECOY_CREDENTIAL_READ",
        );
        override_bool(&mut self.rules.sas_token_usage, "AZLURE_RULES_SAS_TOKEN_USAGE");
        override_bool(
            &mut self.rules.vault_secret_read,
            "AZLURE_RULES_VAULT_SECRET_READ",
        );
        override_bool(
            &mut self.rules.automation_account_read,
            "AZLURE_RULES_AUTOMATION_ACCOUNT_READ",
        );

        // Storage
        override_string(&mut self.storage.db_path, "AZLURE_STORAGE_DB_PATH");

        // Alerts
        override_bool(&mut self.alerts.stdout, "AZLURE_ALERTS_STDOUT");
        if let Ok(url) = std::env::var("AZLURE_ALERTS_WEBHOOK_URL") {
            self.alerts.webhook_url = if url.is_empty() { None } else { Some(url) };
        }

        // Metrics
        override_bool(&mut self.metrics.enabled, "AZLURE_METRICS_ENABLED");
        override_string(&mut self.metrics.bind, "AZLURE_METRICS_BIND");
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), AzlureError> {
        const MAX_RETRY_ATTEMPTS: u32 = 20;
        const MAX_POLL_INTERVAL_SECS: u64 = 86_400; // 1 day

        // log_level 검증
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_level".to_owned(),
                reason: format!("must be one of: {}", valid_levels.join(", ")),
            }
            .into());
        }

        // log_format 검증
        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_format".to_owned(),
                reason: format!("must be one of: {}", valid_formats.join(", ")),
            }
            .into());
        }

        if self.source.root_dir.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "source.root_dir".to_owned(),
                reason: "must not be empty".to_owned(),
            }
            .into());
        }

        if self.ingest.poll_interval_secs == 0
            || self.ingest.poll_interval_secs > MAX_POLL_INTERVAL_SECS
        {
            return Err(ConfigError::InvalidValue {
                field: "ingest.poll_interval_secs".to_owned(),
                reason: format!("must be 1-{}", MAX_POLL_INTERVAL_SECS),
            }
            .into());
        }

        if self.ingest.retry_max_attempts == 0
            || self.ingest.retry_max_attempts > MAX_RETRY_ATTEMPTS
        {
            return Err(ConfigError::InvalidValue {
                field: "ingest.retry_max_attempts".to_owned(),
                reason: format!("must be 1-{}", MAX_RETRY_ATTEMPTS),
            }
            .into());
        }

        if self.ingest.retry_base_delay_ms == 0
            || self.ingest.retry_base_delay_ms > self.ingest.retry_max_delay_ms
        {
            return Err(ConfigError::InvalidValue {
                field: "ingest.retry_base_delay_ms".to_owned(),
                reason: "must be > 0 and <= retry_max_delay_ms".to_owned(),
            }
            .into());
        }

        // on_malformed 검증
        let valid_policies = ["halt", "skip"];
        if !valid_policies.contains(&self.ingest.on_malformed.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "ingest.on_malformed".to_owned(),
                reason: format!("must be one of: {}", valid_policies.join(", ")),
            }
            .into());
        }

        // decoy_match 검증
        let valid_match_modes = ["substring", "regex"];
        if !valid_match_modes.contains(&self.rules.decoy_match.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "rules.decoy_match".to_owned(),
                reason: format!("must be one of: {}", valid_match_modes.join(", ")),
            }
            .into());
        }

        if self.rules.decoy_credential_read && self.rules.decoy_paths.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "rules.decoy_paths".to_owned(),
                reason: "must not be empty when decoy_credential_read is enabled".to_owned(),
            }
            .into());
        }

        if self.storage.db_path.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "storage.db_path".to_owned(),
                reason: "must not be empty".to_owned(),
            }
            .into());
        }

        Ok(())
    }

    /// 카테고리에 대응하는 컨테이너 이름을 반환합니다.
    ///
    /// 비활성화된 카테고리(예: activity log)는 `None`을 반환합니다.
    pub fn container_for(&self, category: SourceCategory) -> Option<&str> {
        match category {
            SourceCategory::StorageRead => Some(&self.source.storage_read_container),
            SourceCategory::StorageWrite => Some(&self.source.storage_write_container),
            SourceCategory::KeyVaultAudit => Some(&self.source.key_vault_audit_container),
            SourceCategory::ActivityLog => self
                .source
                .activity_log_enabled
                .then_some(self.source.activity_log_container.as_str()),
        }
    }

    /// 인제스트 대상 카테고리 목록을 반환합니다.
    pub fn enabled_categories(&self) -> Vec<SourceCategory> {
        SourceCategory::ALL
            .into_iter()
            .filter(|c| self.container_for(*c).is_some())
            .collect()
    }
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
    /// 데이터 디렉토리
    pub data_dir: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
            data_dir: "/var/lib/azlure".to_owned(),
        }
    }
}

/// 로그 소스 설정
///
/// 진단 로그 컨테이너가 미러링된 로컬 디렉토리와
/// 카테고리별 컨테이너 이름 매핑을 정의합니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// 컨테이너 미러 루트 디렉토리
    pub root_dir: String,
    /// 스토리지 읽기 로그 컨테이너 이름
    pub storage_read_container: String,
    /// 스토리지 쓰기 로그 컨테이너 이름
    pub storage_write_container: String,
    /// Key Vault 감사 로그 컨테이너 이름
    pub key_vault_audit_container: String,
    /// Activity 로그 컨테이너 이름
    pub activity_log_container: String,
    /// Activity 로그 인제스트 활성화 여부 (선택적 소스)
    pub activity_log_enabled: bool,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            root_dir: "/var/lib/azlure/mirror".to_owned(),
            storage_read_container: "insights-logs-storageread".to_owned(),
            storage_write_container: "insights-logs-storagewrite".to_owned(),
            key_vault_audit_container: "insights-logs-auditevent".to_owned(),
            activity_log_container: "insights-activity-logs".to_owned(),
            activity_log_enabled: false,
        }
    }
}

/// 인제스트 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// 폴링 주기 (초)
    pub poll_interval_secs: u64,
    /// 오브젝트 페치 최대 시도 횟수
    pub retry_max_attempts: u32,
    /// 지수 백오프 시작 지연 (밀리초)
    pub retry_base_delay_ms: u64,
    /// 지수 백오프 상한 (밀리초)
    pub retry_max_delay_ms: u64,
    /// 파싱 불가 오브젝트 처리 정책 (halt: 워터마크 유지 후 패스 중단, skip: 집계 후 전진)
    pub on_malformed: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 60,
            retry_max_attempts: 3,
            retry_base_delay_ms: 500,
            retry_max_delay_ms: 10_000,
            on_malformed: "halt".to_owned(),
        }
    }
}

/// 탐지 규칙 설정
///
/// 규칙 자체는 고정된 술어 집합이며, 여기서는 개별 활성화 여부와
/// 매칭 시맨틱만 설정합니다.
///
/// 매칭 시맨틱은 업스트림 탐지 가이드에 명시되지 않아 설정 항목으로
/// 노출합니다: `decoy_match`는 `substring`(기본) 또는 `regex`,
/// `case_insensitive`는 디코이 경로/오퍼레이션 비교에만 적용됩니다.
/// SAS 토큰(`sv=`, `sig=`) 탐지는 항상 대소문자 구분 부분 문자열입니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    /// 디코이 블롭 경로 패턴 목록
    pub decoy_paths: Vec<String>,
    /// 디코이 경로 매칭 방식 (substring, regex)
    pub decoy_match: String,
    /// 디코이 경로 비교 시 대소문자 무시 여부
    pub case_insensitive: bool,
    /// 공개 디코이 자격증명 읽기 규칙 활성화
    pub decoy_credential_read: bool,
    /// SAS 토큰 사용 규칙 활성화
    pub sas_token_usage: bool,
    /// Key Vault 시크릿 읽기 규칙 활성화
    pub vault_secret_read: bool,
    /// Automation 계정 읽기 규칙 활성화
    pub automation_account_read: bool,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            decoy_paths: vec!["/backup/credential".to_owned()],
            decoy_match: "substring".to_owned(),
            case_insensitive: true,
            decoy_credential_read: true,
            sas_token_usage: true,
            vault_secret_read: true,
            automation_account_read: true,
        }
    }
}

/// 이벤트 저장소 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite 데이터베이스 파일 경로
    pub db_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: "/var/lib/azlure/azlure.db".to_owned(),
        }
    }
}

/// 알림 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertsConfig {
    /// 새 이벤트를 로그 라인으로 출력할지 여부
    pub stdout: bool,
    /// 웹훅 URL (설정 시 새 이벤트를 POST)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
    /// 웹훅 요청 타임아웃 (초)
    pub webhook_timeout_secs: u64,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            stdout: true,
            webhook_url: None,
            webhook_timeout_secs: 5,
        }
    }
}

/// 메트릭 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Prometheus exporter 활성화 여부
    pub enabled: bool,
    /// exporter 바인드 주소
    pub bind: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind: "127.0.0.1:9187".to_owned(),
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, var: &str) {
    if let Ok(value) = std::env::var(var)
        && !value.is_empty()
    {
        *target = value;
    }
}

fn override_bool(target: &mut bool, var: &str) {
    if let Ok(value) = std::env::var(var) {
        match value.to_lowercase().as_str() {
            "true" | "1" | "yes" => *target = true,
            "false" | "0" | "no" => *target = false,
            other => {
                tracing::warn!(var, value = other, "ignoring invalid boolean override");
            }
        }
    }
}

fn override_u32(target: &mut u32, var: &str) {
    if let Ok(value) = std::env::var(var) {
        match value.parse() {
            Ok(parsed) => *target = parsed,
            Err(_) => {
                tracing::warn!(var, value = %value, "ignoring invalid integer override");
            }
        }
    }
}

fn override_u64(target: &mut u64, var: &str) {
    if let Ok(value) = std::env::var(var) {
        match value.parse() {
            Ok(parsed) => *target = parsed,
            Err(_) => {
                tracing::warn!(var, value = %value, "ignoring invalid integer override");
            }
        }
    }
}

fn override_csv(target: &mut Vec<String>, var: &str) {
    if let Ok(value) = std::env::var(var)
        && !value.is_empty()
    {
        *target = value
            .split(',')
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
            .collect();
    }
}
