//! 탐지 규칙 엔진 — 정규화된 레코드에 고정 규칙 집합을 평가합니다.
//!
//! 규칙은 레코드 필드에 대한 순수 술어이며 레코드 하나가 여러 규칙에
//! 매칭될 수 있습니다. 매칭된 규칙은 각각 독립적인 이벤트를 냅니다 —
//! 이 계층에는 억제/병합이 없고, 중복 제거는 저장소의 dedup key가 담당합니다.
//!
//! # 내장 규칙
//! - `decoy_credential_read` (High): 스토리지 읽기/쓰기 로그에서 디코이 블롭
//!   경로에 대한 read/GET
//! - `sas_token_usage` (Medium): 요청 URI 또는 원본 필드에 `sv=`와 `sig=` 동시 존재
//! - `vault_secret_read` (High): Key Vault 감사 로그의 `SecretGet`
//! - `automation_account_read` (Medium): activity 로그의
//!   `Microsoft.Automation/automationAccounts` 읽기
//!
//! # 아키텍처
//! - [`types`]: 규칙 종류/심각도 정의
//! - [`dedup`]: 결정적 dedup key 파생

pub mod dedup;
pub mod types;

pub use types::{RuleKind, RuleSpec};

use regex::RegexBuilder;

use azlure_core::config::RulesConfig;
use azlure_core::error::ConfigError;
use azlure_core::types::{DetectionEvent, NormalizedRecord, SourceCategory};

/// 디코이 경로 매칭 패턴
///
/// 업스트림 탐지 가이드가 매칭 시맨틱을 명시하지 않아 설정으로 노출합니다.
/// 기본은 대소문자 무시 부분 문자열이며 `decoy_match = "regex"`로 전환할 수 있습니다.
enum DecoyPatterns {
    /// 부분 문자열 매칭 (대소문자 무시 시 소문자로 정규화해 둠)
    Substring(Vec<String>),
    /// 정규식 매칭 (로딩 시 한 번만 컴파일)
    Regex(Vec<regex::Regex>),
}

/// 규칙 집합 — 고정 순서로 평가되는 술어 모음
pub struct RuleSet {
    /// 규칙 활성 상태 (평가 순서 고정)
    rules: Vec<RuleSpec>,
    /// 디코이 경로 패턴
    decoy: DecoyPatterns,
    /// 디코이/오퍼레이션 비교 시 대소문자 무시
    case_insensitive: bool,
}

impl RuleSet {
    /// 설정의 `[rules]` 섹션에서 규칙 집합을 생성합니다.
    ///
    /// # Errors
    /// `decoy_match = "regex"`에서 패턴 컴파일이 실패하면 설정 에러를 반환합니다.
    pub fn from_config(config: &RulesConfig) -> Result<Self, ConfigError> {
        let decoy = match config.decoy_match.as_str() {
            "regex" => {
                let mut patterns = Vec::with_capacity(config.decoy_paths.len());
                for path in &config.decoy_paths {
                    let compiled = RegexBuilder::new(path)
                        .case_insensitive(config.case_insensitive)
                        .build()
                        .map_err(|e| ConfigError::InvalidValue {
                            field: "rules.decoy_paths".to_owned(),
                            reason: format!("invalid regex '{path}': {e}"),
                        })?;
                    patterns.push(compiled);
                }
                DecoyPatterns::Regex(patterns)
            }
            _ => {
                let patterns = config
                    .decoy_paths
                    .iter()
                    .map(|p| {
                        if config.case_insensitive {
                            p.to_lowercase()
                        } else {
                            p.clone()
                        }
                    })
                    .collect();
                DecoyPatterns::Substring(patterns)
            }
        };

        let rules = vec![
            RuleSpec {
                kind: RuleKind::DecoyCredentialRead,
                enabled: config.decoy_credential_read,
            },
            RuleSpec {
                kind: RuleKind::SasTokenUsage,
                enabled: config.sas_token_usage,
            },
            RuleSpec {
                kind: RuleKind::VaultSecretRead,
                enabled: config.vault_secret_read,
            },
            RuleSpec {
                kind: RuleKind::AutomationAccountRead,
                enabled: config.automation_account_read,
            },
        ];

        Ok(Self {
            rules,
            decoy,
            case_insensitive: config.case_insensitive,
        })
    }

    /// 규칙 활성 상태 목록을 반환합니다.
    pub fn rules(&self) -> &[RuleSpec] {
        &self.rules
    }

    /// 활성화된 규칙 수를 반환합니다.
    pub fn enabled_count(&self) -> usize {
        self.rules.iter().filter(|r| r.enabled).count()
    }

    /// 레코드 하나에 모든 활성 규칙을 평가합니다.
    ///
    /// 매칭된 규칙마다 이벤트 하나를 반환하며, 매칭이 없으면 빈 벡터를
    /// 반환합니다 (에러가 아닙니다).
    pub fn evaluate(&self, record: &NormalizedRecord, object_id: &str) -> Vec<DetectionEvent> {
        let mut events = Vec::new();

        for rule in &self.rules {
            if !rule.enabled {
                continue;
            }

            let description = match rule.kind {
                RuleKind::DecoyCredentialRead => self.match_decoy_credential_read(record),
                RuleKind::SasTokenUsage => self.match_sas_token_usage(record),
                RuleKind::VaultSecretRead => self.match_vault_secret_read(record),
                RuleKind::AutomationAccountRead => self.match_automation_account_read(record),
            };

            if let Some(description) = description {
                events.push(self.make_event(rule, record, object_id, description));
            }
        }

        events
    }

    /// 공개 디코이 자격증명 읽기: 스토리지 로그 + read 오퍼레이션 + 디코이 경로
    fn match_decoy_credential_read(&self, record: &NormalizedRecord) -> Option<String> {
        if !matches!(
            record.category,
            SourceCategory::StorageRead | SourceCategory::StorageWrite
        ) {
            return None;
        }
        if !Self::is_read_operation(&record.operation) {
            return None;
        }

        let path = record
            .request_uri
            .as_deref()
            .or(record.resource_id.as_deref())?;
        if !self.matches_decoy_path(path) {
            return None;
        }

        Some(format!(
            "decoy credential blob read: {} on {} from {}",
            record.operation,
            record.request_uri_redacted.as_deref().unwrap_or(path),
            record.caller_ip.as_deref().unwrap_or("unknown ip"),
        ))
    }

    /// SAS 사용: URI 또는 원본 필드 값 하나에 `sv=`와 `sig=`가 함께 존재
    ///
    /// SAS 파라미터는 항상 소문자이므로 토큰 비교는 대소문자를 구분합니다.
    fn match_sas_token_usage(&self, record: &NormalizedRecord) -> Option<String> {
        let has_sas = |value: &str| value.contains("sv=") && value.contains("sig=");

        let matched = record
            .request_uri
            .as_deref()
            .is_some_and(has_sas)
            || record.fields.iter().any(|(_, v)| has_sas(v));
        if !matched {
            return None;
        }

        Some(format!(
            "SAS-signed request from {}: {}",
            record.caller_ip.as_deref().unwrap_or("unknown ip"),
            record
                .request_uri_redacted
                .as_deref()
                .unwrap_or("(uri in raw fields)"),
        ))
    }

    /// Key Vault 시크릿 읽기: 감사 로그의 SecretGet
    fn match_vault_secret_read(&self, record: &NormalizedRecord) -> Option<String> {
        if record.category != SourceCategory::KeyVaultAudit {
            return None;
        }
        if !record.operation.eq_ignore_ascii_case("SecretGet") {
            return None;
        }

        Some(format!(
            "key vault decoy secret read by {} from {}",
            record.caller.as_deref().unwrap_or("unknown caller"),
            record.caller_ip.as_deref().unwrap_or("unknown ip"),
        ))
    }

    /// Automation 계정 읽기: activity 로그의 automationAccounts read verb
    fn match_automation_account_read(&self, record: &NormalizedRecord) -> Option<String> {
        if record.category != SourceCategory::ActivityLog {
            return None;
        }

        let operation = record.operation.to_lowercase();
        let targets_automation = operation.contains("microsoft.automation/automationaccounts")
            || record
                .resource_id
                .as_deref()
                .is_some_and(|rid| {
                    rid.to_lowercase()
                        .contains("microsoft.automation/automationaccounts")
                });
        if !targets_automation || !operation.ends_with("/read") {
            return None;
        }

        Some(format!(
            "automation account enumerated: {} by {}",
            record.operation,
            record.caller.as_deref().unwrap_or("unknown caller"),
        ))
    }

    /// 오퍼레이션이 읽기인지 판별합니다 (`GET`, `GetBlob`, `GetBlobProperties` 등).
    fn is_read_operation(operation: &str) -> bool {
        let lower = operation.to_lowercase();
        lower.contains("get") || lower.contains("read")
    }

    /// 경로가 디코이 패턴에 매칭되는지 확인합니다.
    fn matches_decoy_path(&self, path: &str) -> bool {
        match &self.decoy {
            DecoyPatterns::Substring(patterns) => {
                let haystack = if self.case_insensitive {
                    path.to_lowercase()
                } else {
                    path.to_owned()
                };
                patterns.iter().any(|p| haystack.contains(p.as_str()))
            }
            DecoyPatterns::Regex(patterns) => patterns.iter().any(|p| p.is_match(path)),
        }
    }

    /// 매칭 결과에서 탐지 이벤트를 조립합니다.
    fn make_event(
        &self,
        rule: &RuleSpec,
        record: &NormalizedRecord,
        object_id: &str,
        description: String,
    ) -> DetectionEvent {
        DetectionEvent {
            rule_id: rule.rule_id().to_owned(),
            severity: rule.severity(),
            category: record.category,
            occurred_at: record.occurred_at,
            dedup_key: dedup::dedup_key(rule.rule_id(), record),
            description,
            operation: record.operation.clone(),
            caller_ip: record.caller_ip.clone(),
            request_uri: record.request_uri_redacted.clone(),
            object_id: object_id.to_owned(),
            first_seen: None,
        }
    }
}
