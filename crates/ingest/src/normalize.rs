//! 레코드 정규화 — 진단 로그 오브젝트를 통합 레코드 형식으로 변환합니다.
//!
//! 하나의 로그 오브젝트는 독립적으로 인코딩된 엔트리 여러 개의 묶음입니다.
//! 지원하는 컨테이너 형식:
//! - `{"records": [...]}` 래퍼 (진단 로그 기본 형식)
//! - 최상위 JSON 배열
//! - 단일 JSON 객체
//! - NDJSON (한 줄에 하나의 JSON)
//!
//! 정규화는 부수 효과 없는 순수 변환입니다. 배치 내 개별 엔트리의 파싱 실패는
//! 해당 엔트리만 드롭하고 카운트하며, 오브젝트 전체가 어떤 컨테이너 형식도
//! 아닌 경우에만 [`NormalizeError::UnrecognizedContainer`]를 반환합니다.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde_json::Value;

use azlure_core::error::NormalizeError;
use azlure_core::types::{NormalizedRecord, SourceCategory};

use crate::source::RawLogObject;

/// 필드 선호 키 목록 — 소스별로 다른 스키마를 흡수합니다.
///
/// 스토리지 로그는 최상위에, Key Vault/Activity 로그는 `properties.*` 아래에
/// 같은 의미의 필드를 두는 경우가 많아 순서대로 첫 번째 값을 취합니다.
const TIME_KEYS: &[&str] = &["time", "TimeGenerated"];
const OPERATION_KEYS: &[&str] = &[
    "operationName",
    "operationNameValue",
    "properties.operationName",
    "properties.operation",
];
const URI_KEYS: &[&str] = &["requestUri", "properties.requestUri", "uri", "properties.uri"];
const CALLER_IP_KEYS: &[&str] = &[
    "callerIpAddress",
    "properties.callerIpAddress",
    "callerIp",
    "properties.callerIp",
];
const CALLER_KEYS: &[&str] = &[
    "caller",
    "identity",
    "properties.requesterUpn",
    "properties.requesterObjectId",
];
const USER_AGENT_KEYS: &[&str] = &[
    "userAgentHeader",
    "properties.userAgentHeader",
    "userAgent",
    "properties.userAgent",
];
const STATUS_KEYS: &[&str] = &[
    "statusCode",
    "properties.httpStatusCode",
    "properties.statusCode",
    "resultType",
];
const AUTH_KEYS: &[&str] = &[
    "authenticationType",
    "properties.authenticationType",
    "properties.authType",
];
const RESOURCE_ID_KEYS: &[&str] = &["resourceId", "properties.resourceId"];

/// 가려야 하는 SAS 쿼리 파라미터
const SAS_PARAMS: &str = "sig|se|st|sp|spr|sv|skoid|sktid";

/// 정규화 결과 배치
#[derive(Debug, Default)]
pub struct NormalizedBatch {
    /// 정규화된 레코드 (오브젝트 내 등장 순서 유지)
    pub records: Vec<NormalizedRecord>,
    /// 드롭된 엔트리 수 (파싱 실패 또는 필수 필드 누락)
    pub dropped: u64,
}

/// 레코드 정규화기
///
/// 상태 없는 순수 변환기이며 오브젝트 단위 병렬 처리에 안전합니다.
pub struct Normalizer {
    /// 최대 허용 입력 크기 (바이트)
    max_input_size: usize,
    /// SAS 파라미터 마스킹 패턴 (생성 시 한 번 컴파일)
    sas_pattern: Regex,
}

impl Normalizer {
    /// 새 정규화기를 생성합니다.
    pub fn new() -> Self {
        Self {
            max_input_size: 8 * 1024 * 1024, // 8MB
            sas_pattern: Regex::new(&format!(r"\b({SAS_PARAMS})=[^&\s]*"))
                .expect("static SAS pattern must compile"),
        }
    }

    /// 최대 입력 크기를 설정합니다.
    pub fn with_max_input_size(mut self, size: usize) -> Self {
        self.max_input_size = size;
        self
    }

    /// 로그 오브젝트 하나를 정규화된 레코드 시퀀스로 변환합니다.
    ///
    /// 빈 페이로드는 빈 배치를 반환합니다.
    pub fn normalize(&self, object: &RawLogObject) -> Result<NormalizedBatch, NormalizeError> {
        if object.content.len() > self.max_input_size {
            return Err(NormalizeError::TooLarge {
                size: object.content.len(),
                max: self.max_input_size,
            });
        }

        let body = String::from_utf8_lossy(&object.content);
        let body = body.trim();
        if body.is_empty() {
            return Ok(NormalizedBatch::default());
        }

        let (entries, mut dropped) = Self::split_entries(body)?;

        let mut records = Vec::with_capacity(entries.len());
        for entry in entries {
            match self.normalize_entry(object.meta.category, &entry) {
                Some(record) => records.push(record),
                None => dropped += 1,
            }
        }

        Ok(NormalizedBatch { records, dropped })
    }

    /// 컨테이너 형식을 판별하여 개별 엔트리로 분해합니다.
    ///
    /// 반환값: (JSON 객체 엔트리 목록, 객체가 아니어서 드롭된 엔트리 수)
    fn split_entries(body: &str) -> Result<(Vec<Value>, u64), NormalizeError> {
        if let Ok(parsed) = serde_json::from_str::<Value>(body) {
            return Ok(match parsed {
                Value::Object(mut map) => {
                    if let Some(Value::Array(records)) = map.remove("records") {
                        Self::keep_objects(records)
                    } else {
                        (vec![Value::Object(map)], 0)
                    }
                }
                Value::Array(items) => Self::keep_objects(items),
                other => {
                    return Err(NormalizeError::UnrecognizedContainer {
                        reason: format!("top-level JSON {} is not a log container", kind_of(&other)),
                    });
                }
            });
        }

        // NDJSON 폴백: 한 줄이라도 파싱되면 유효한 컨테이너로 취급
        let mut entries = Vec::new();
        let mut dropped = 0u64;
        for line in body.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<Value>(line) {
                Ok(Value::Object(map)) => entries.push(Value::Object(map)),
                Ok(_) | Err(_) => dropped += 1,
            }
        }

        if entries.is_empty() {
            return Err(NormalizeError::UnrecognizedContainer {
                reason: "payload is neither JSON, a records wrapper, nor NDJSON".to_owned(),
            });
        }

        Ok((entries, dropped))
    }

    /// 배열에서 JSON 객체만 남기고 나머지는 드롭 카운트합니다.
    fn keep_objects(items: Vec<Value>) -> (Vec<Value>, u64) {
        let mut dropped = 0u64;
        let entries = items
            .into_iter()
            .filter(|item| {
                let keep = item.is_object();
                if !keep {
                    dropped += 1;
                }
                keep
            })
            .collect();
        (entries, dropped)
    }

    /// 단일 엔트리를 정규화합니다.
    ///
    /// 필수 필드(시각, 오퍼레이션)가 없으면 `None`을 반환하여 드롭됩니다.
    fn normalize_entry(&self, category: SourceCategory, entry: &Value) -> Option<NormalizedRecord> {
        let fields = Self::flatten(entry);

        let occurred_at = pick(&fields, TIME_KEYS).and_then(|raw| Self::parse_timestamp(&raw))?;
        let operation = pick(&fields, OPERATION_KEYS).filter(|op| !op.is_empty())?;

        let request_uri = pick(&fields, URI_KEYS);
        let request_uri_redacted = request_uri.as_deref().map(|uri| self.redact_sas(uri));

        Some(NormalizedRecord {
            category,
            occurred_at,
            operation,
            caller: pick(&fields, CALLER_KEYS),
            caller_ip: pick(&fields, CALLER_IP_KEYS),
            request_uri,
            request_uri_redacted,
            resource_id: pick(&fields, RESOURCE_ID_KEYS),
            status_code: pick(&fields, STATUS_KEYS),
            user_agent: pick(&fields, USER_AGENT_KEYS),
            auth_type: pick(&fields, AUTH_KEYS),
            fields,
        })
    }

    /// 엔트리를 평탄한 key-value 목록으로 변환합니다.
    ///
    /// 최상위 필드는 그대로, `properties` 아래의 필드는 `properties.` 접두어로
    /// 보존합니다. null은 스킵하고 중첩 객체/배열은 JSON 문자열로 직렬화합니다.
    fn flatten(entry: &Value) -> Vec<(String, String)> {
        let mut fields = Vec::new();
        let Some(map) = entry.as_object() else {
            return fields;
        };

        for (key, value) in map {
            if key == "properties" {
                if let Some(props) = value.as_object() {
                    for (prop_key, prop_value) in props {
                        if let Some(text) = stringify(prop_value) {
                            fields.push((format!("properties.{prop_key}"), text));
                        }
                    }
                    continue;
                }
            }
            if let Some(text) = stringify(value) {
                fields.push((key.clone(), text));
            }
        }

        fields
    }

    /// 타임스탬프 문자열을 파싱합니다.
    ///
    /// 지원 형식:
    /// - RFC 3339 (ISO 8601): `2024-06-01T12:00:00Z`
    /// - Unix timestamp (초): `1717243200`
    /// - Unix timestamp (밀리초): `1717243200000`
    fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
        if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
            return Some(parsed.with_timezone(&Utc));
        }

        if let Ok(numeric) = raw.parse::<i64>() {
            // 10자리 = 초, 13자리 = 밀리초
            let secs = if numeric > 9_999_999_999 {
                numeric / 1000
            } else {
                numeric
            };
            return DateTime::from_timestamp(secs, 0);
        }

        None
    }

    /// URI에서 SAS 쿼리 파라미터 값을 가립니다.
    ///
    /// 이벤트 표시와 웹훅 전송에 사용되는 URI에서 서명 재사용이 불가능하도록
    /// `sig=`, `sv=` 등 서명 관련 파라미터의 값을 `REDACTED`로 치환합니다.
    pub fn redact_sas(&self, uri: &str) -> String {
        self.sas_pattern.replace_all(uri, "$1=REDACTED").into_owned()
    }
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new()
    }
}

/// 평탄화된 필드 목록에서 선호 키 순서대로 첫 번째 비어있지 않은 값을 고릅니다.
fn pick(fields: &[(String, String)], keys: &[&str]) -> Option<String> {
    for key in keys {
        if let Some((_, value)) = fields.iter().find(|(k, _)| k == key)
            && !value.is_empty()
        {
            return Some(value.clone());
        }
    }
    None
}

/// JSON 값을 문자열로 변환합니다. null은 `None`을 반환합니다.
fn stringify(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Object(_) | Value::Array(_) => serde_json::to_string(value).ok(),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
