#![doc = include_str!("../README.md")]
//!
//! # 모듈 구성
//!
//! - [`source`]: 미러링된 컨테이너 디렉토리에서 원시 로그 오브젝트 나열/페치
//! - [`normalize`]: 진단 로그 컨테이너 형식 파싱 및 레코드 정규화
//! - [`detect`]: 고정 술어 기반 탐지 규칙 엔진 및 dedup key 파생
//! - [`store`]: SQLite 기반 멱등 이벤트/워터마크 저장소
//! - [`coordinator`]: 카테고리별 인제스트 패스 오케스트레이션
//!
//! # 아키텍처
//!
//! ```text
//! LogSource -> RawLogObject -> Normalizer -> RuleSet -> EventStore
//!     |                           |             |           |
//!  list/fetch              partial-failure   tagged     UNIQUE dedup key
//!  (+ retry)                  tolerant      predicates  + CAS watermark
//! ```

pub mod coordinator;
pub mod detect;
pub mod normalize;
pub mod source;
pub mod store;

// --- 주요 타입 re-export ---

// 코디네이터
pub use coordinator::{CategoryCoordinator, MalformedPolicy, PassReport, RetryPolicy};

// 정규화
pub use normalize::{NormalizedBatch, Normalizer};

// 규칙 엔진
pub use detect::{RuleKind, RuleSet, RuleSpec};

// 저장소
pub use store::{EventFilter, EventStore, RuleCount, StoreTotals, UpsertOutcome, UpsertStats};

// 소스
pub use source::{DirSource, LogSource, ObjectMeta, RawLogObject};
