//! 탐지 규칙 데이터 타입
//!
//! 규칙 집합은 작고 닫힌 변형 집합이므로 태그된 술어로 표현합니다.
//! 규칙 추가는 [`RuleKind`] 변형 하나와 술어 하나를 추가하는 것으로 끝납니다.

use std::fmt;

use serde::{Deserialize, Serialize};

use azlure_core::types::Severity;

/// 내장 탐지 규칙 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    /// 공개 디코이 자격증명 블롭 읽기
    DecoyCredentialRead,
    /// SAS 서명 URL 사용
    SasTokenUsage,
    /// Key Vault 디코이 시크릿 읽기
    VaultSecretRead,
    /// Automation 계정 조회 (activity log 소스 필요)
    AutomationAccountRead,
}

impl RuleKind {
    /// 고정 평가 순서의 전체 규칙 목록
    pub const ALL: [RuleKind; 4] = [
        RuleKind::DecoyCredentialRead,
        RuleKind::SasTokenUsage,
        RuleKind::VaultSecretRead,
        RuleKind::AutomationAccountRead,
    ];

    /// 저장소와 알림에 쓰이는 안정적인 규칙 ID
    pub fn rule_id(&self) -> &'static str {
        match self {
            Self::DecoyCredentialRead => "decoy_credential_read",
            Self::SasTokenUsage => "sas_token_usage",
            Self::VaultSecretRead => "vault_secret_read",
            Self::AutomationAccountRead => "automation_account_read",
        }
    }

    /// 사람이 읽는 규칙 제목
    pub fn title(&self) -> &'static str {
        match self {
            Self::DecoyCredentialRead => "Public credential hit",
            Self::SasTokenUsage => "SAS usage",
            Self::VaultSecretRead => "Secret read",
            Self::AutomationAccountRead => "Automation account read",
        }
    }

    /// 규칙 고유 심각도
    ///
    /// 자격증명/시크릿 접근은 디코이 체인의 핵심 신호라 high,
    /// SAS 사용 단독은 medium입니다.
    pub fn severity(&self) -> Severity {
        match self {
            Self::DecoyCredentialRead => Severity::High,
            Self::SasTokenUsage => Severity::Medium,
            Self::VaultSecretRead => Severity::High,
            Self::AutomationAccountRead => Severity::Medium,
        }
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.rule_id())
    }
}

/// 규칙 하나의 활성 상태
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RuleSpec {
    /// 규칙 종류
    pub kind: RuleKind,
    /// 활성화 여부 (설정으로 개별 토글)
    pub enabled: bool,
}

impl RuleSpec {
    /// 규칙 ID를 반환합니다.
    pub fn rule_id(&self) -> &'static str {
        self.kind.rule_id()
    }

    /// 규칙 심각도를 반환합니다.
    pub fn severity(&self) -> Severity {
        self.kind.severity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_ids_are_unique() {
        let mut ids: Vec<_> = RuleKind::ALL.iter().map(|k| k.rule_id()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), RuleKind::ALL.len());
    }

    #[test]
    fn credential_and_secret_rules_are_high() {
        assert_eq!(RuleKind::DecoyCredentialRead.severity(), Severity::High);
        assert_eq!(RuleKind::VaultSecretRead.severity(), Severity::High);
        assert_eq!(RuleKind::SasTokenUsage.severity(), Severity::Medium);
        assert_eq!(RuleKind::AutomationAccountRead.severity(), Severity::Medium);
    }

    #[test]
    fn display_matches_rule_id() {
        assert_eq!(
            RuleKind::DecoyCredentialRead.to_string(),
            "decoy_credential_read"
        );
    }
}
