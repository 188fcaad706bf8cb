//! 디렉토리 미러 소스
//!
//! 외부 동기화 도구(azcopy cron 등)가 받아 둔 컨테이너 미러 디렉토리를
//! 나열 가능한 오브젝트 네임스페이스로 취급합니다.
//! 진단 로그 블롭의 `y=/m=/d=/h=` 경로 구조가 그대로 하위 디렉토리가 되므로
//! 재귀적으로 순회하고 상대 경로를 오브젝트 이름으로 사용합니다.

use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use chrono::Utc;
use sha2::{Digest, Sha256};

use azlure_core::config::SourceConfig;
use azlure_core::error::IngestError;
use azlure_core::types::SourceCategory;

use super::{LogSource, ObjectMeta, RawLogObject};

/// 디렉토리 기반 로그 소스
///
/// 컨테이너별 하위 디렉토리를 가진 루트 디렉토리를 감싸며,
/// 파일 하나를 로그 오브젝트 하나로 취급합니다.
pub struct DirSource {
    /// 미러 루트 디렉토리
    root: PathBuf,
    /// 카테고리 -> 컨테이너 이름 매핑
    containers: HashMap<SourceCategory, String>,
}

impl DirSource {
    /// 명시적 매핑으로 소스를 생성합니다.
    pub fn new(root: impl Into<PathBuf>, containers: HashMap<SourceCategory, String>) -> Self {
        Self {
            root: root.into(),
            containers,
        }
    }

    /// 설정의 `[source]` 섹션에서 소스를 생성합니다.
    ///
    /// 비활성화된 카테고리(activity log)는 매핑에서 제외됩니다.
    pub fn from_config(config: &SourceConfig) -> Self {
        let mut containers = HashMap::new();
        containers.insert(
            SourceCategory::StorageRead,
            config.storage_read_container.clone(),
        );
        containers.insert(
            SourceCategory::StorageWrite,
            config.storage_write_container.clone(),
        );
        containers.insert(
            SourceCategory::KeyVaultAudit,
            config.key_vault_audit_container.clone(),
        );
        if config.activity_log_enabled {
            containers.insert(
                SourceCategory::ActivityLog,
                config.activity_log_container.clone(),
            );
        }
        Self::new(config.root_dir.clone(), containers)
    }

    /// 컨테이너 디렉토리를 재귀적으로 순회하여 파일 목록을 수집합니다.
    async fn walk(base: &Path) -> std::io::Result<Vec<(String, u64)>> {
        let mut found = Vec::new();
        let mut pending = vec![base.to_path_buf()];

        while let Some(dir) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    pending.push(path);
                } else if file_type.is_file() {
                    let metadata = entry.metadata().await?;
                    let relative = path
                        .strip_prefix(base)
                        .unwrap_or(&path)
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy())
                        .collect::<Vec<_>>()
                        .join("/");
                    found.push((relative, metadata.len()));
                }
            }
        }

        Ok(found)
    }

    /// `.gz` 오브젝트를 압축 해제합니다.
    ///
    /// 손상된 gzip 스트림은 원본 바이트를 그대로 반환합니다.
    /// 일부 진단 내보내기가 `.gz` 확장자를 붙이고도 압축하지 않는 경우가 있습니다.
    fn maybe_gunzip(name: &str, data: Vec<u8>) -> Vec<u8> {
        if !name.ends_with(".gz") {
            return data;
        }
        let mut decoder = flate2::read::GzDecoder::new(data.as_slice());
        let mut decompressed = Vec::new();
        match decoder.read_to_end(&mut decompressed) {
            Ok(_) => decompressed,
            Err(e) => {
                tracing::debug!(object = name, error = %e, "gzip decode failed, using raw bytes");
                data
            }
        }
    }
}

impl LogSource for DirSource {
    async fn list(&self, category: SourceCategory) -> Result<Vec<ObjectMeta>, IngestError> {
        let Some(container) = self.containers.get(&category) else {
            return Err(IngestError::ListFailed {
                category: category.to_string(),
                reason: "no container mapped for category".to_owned(),
            });
        };

        let base = self.root.join(container);
        if !base.is_dir() {
            // 미러가 아직 동기화되지 않은 컨테이너는 빈 목록으로 취급
            tracing::debug!(container = %container, "container directory absent, nothing to list");
            return Ok(Vec::new());
        }

        let mut entries =
            Self::walk(&base)
                .await
                .map_err(|e| IngestError::ListFailed {
                    category: category.to_string(),
                    reason: e.to_string(),
                })?;
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        Ok(entries
            .into_iter()
            .map(|(name, size)| ObjectMeta {
                category,
                container: container.clone(),
                name,
                size,
            })
            .collect())
    }

    async fn fetch(&self, meta: &ObjectMeta) -> Result<RawLogObject, IngestError> {
        let path = self.root.join(&meta.container).join(&meta.name);
        let raw = tokio::fs::read(&path)
            .await
            .map_err(|e| IngestError::FetchFailed {
                object_id: meta.object_id(),
                attempts: 1,
                reason: e.to_string(),
            })?;

        let content = Self::maybe_gunzip(&meta.name, raw);
        let content_hash = {
            let mut hasher = Sha256::new();
            hasher.update(&content);
            hasher
                .finalize()
                .iter()
                .map(|b| format!("{b:02x}"))
                .collect()
        };

        Ok(RawLogObject {
            meta: meta.clone(),
            content: Bytes::from(content),
            content_hash,
            discovered_at: Utc::now(),
        })
    }
}
