//! Dedup key 파생 — 탐지 이벤트의 결정적 신원
//!
//! 동일한 레코드 집합에 대해 탐지를 몇 번 재실행해도 같은 키가 나와야
//! 저장소의 UNIQUE 제약이 at-most-once 기록을 보장할 수 있습니다.
//! 따라서 키는 규칙 ID + 소스 카테고리 + 레코드 고유 필드 튜플의
//! SHA-256으로만 파생하며, 기록 시각 같은 가변 입력은 섞지 않습니다.
//!
//! 오브젝트 ID는 의도적으로 제외합니다. 같은 논리적 레코드가 다른 블롭으로
//! 재전달되어도 키가 같아야 중복 행이 생기지 않습니다.

use sha2::{Digest, Sha256};

use azlure_core::types::NormalizedRecord;

/// 필드 구분자 — 필드 경계가 섞여 다른 입력이 같은 키를 만드는 것을 방지
const FIELD_SEPARATOR: [u8; 1] = [0u8];

/// 규칙 ID와 레코드에서 결정적 dedup key를 파생합니다.
pub fn dedup_key(rule_id: &str, record: &NormalizedRecord) -> String {
    let mut hasher = Sha256::new();

    let occurred = record.occurred_at.to_rfc3339();
    let parts: [&str; 8] = [
        rule_id,
        record.category.as_str(),
        &occurred,
        &record.operation,
        record.request_uri.as_deref().unwrap_or(""),
        record.caller_ip.as_deref().unwrap_or(""),
        record.status_code.as_deref().unwrap_or(""),
        record.resource_id.as_deref().unwrap_or(""),
    ];

    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update(FIELD_SEPARATOR);
    }

    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}
