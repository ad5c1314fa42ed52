//! 원본 문서 수집 모듈
//!
//! 지식베이스로 변환할 Markdown / 구조화 텍스트 파일을 찾습니다.
//! 숨김 파일과 너무 큰 파일은 건너뜁니다.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ignore::WalkBuilder;
use thiserror::Error;

// ============================================================================
// Source Formats
// ============================================================================

/// 지원하는 원본 형식
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    /// `## ` / `### Q:` 규칙의 Markdown 지식베이스
    Markdown,
    /// 문서에서 추출한 구조화 Q&A 텍스트
    StructuredText,
}

impl SourceFormat {
    /// 확장자로 형식 결정
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "md" | "markdown" => Some(SourceFormat::Markdown),
            "txt" => Some(SourceFormat::StructuredText),
            _ => None,
        }
    }

    /// 파일 경로에서 형식 결정
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }
}

// ============================================================================
// Collected File
// ============================================================================

/// 수집된 파일 정보
#[derive(Debug, Clone)]
pub struct CollectedFile {
    /// 파일 절대 경로
    pub path: PathBuf,
    pub format: SourceFormat,
    /// 파일 크기 (바이트)
    pub size: u64,
}

impl CollectedFile {
    /// 파일에서 CollectedFile 생성 (지원하지 않는 형식이면 None)
    pub fn from_path(path: PathBuf) -> Result<Option<Self>> {
        let format = match SourceFormat::from_path(&path) {
            Some(format) => format,
            None => return Ok(None),
        };

        let metadata = std::fs::metadata(&path)
            .with_context(|| format!("Failed to read metadata: {:?}", path))?;

        if !metadata.is_file() {
            return Ok(None);
        }

        Ok(Some(Self {
            path,
            format,
            size: metadata.len(),
        }))
    }
}

// ============================================================================
// File Collector
// ============================================================================

/// 단일 파일이 수집되지 않은 이유
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SkipReason {
    #[error("hidden file")]
    Hidden,
    #[error("unsupported format (expected .md, .markdown or .txt)")]
    UnsupportedFormat,
    #[error("{0:?} files are not accepted here")]
    ExcludedFormat(SourceFormat),
    #[error("file too large ({size} bytes, limit {limit} bytes)")]
    TooLarge { size: u64, limit: u64 },
}

/// 파일 수집기 설정
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// .gitignore 패턴 존중 여부
    pub respect_gitignore: bool,
    /// 숨김 파일 포함 여부
    pub include_hidden: bool,
    /// 최대 파일 크기 (바이트, 0이면 제한 없음)
    pub max_file_size: u64,
    /// 수집할 형식 (비어있으면 모든 형식)
    pub formats: Vec<SourceFormat>,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            respect_gitignore: true,
            include_hidden: false,
            max_file_size: 10 * 1024 * 1024, // 10MB
            formats: vec![],
        }
    }
}

/// 파일 수집기
pub struct FileCollector {
    config: CollectorConfig,
}

impl FileCollector {
    /// 새 수집기 생성
    pub fn new(config: CollectorConfig) -> Self {
        Self { config }
    }

    /// 기본 설정으로 수집기 생성
    pub fn with_defaults() -> Self {
        Self::new(CollectorConfig::default())
    }

    /// 단일 파일 검사 (필터에 걸리면 어떤 필터인지 반환)
    pub fn inspect_file(
        &self,
        path: &Path,
    ) -> Result<std::result::Result<CollectedFile, SkipReason>> {
        let abs_path = absolute(path)?;

        if !abs_path.is_file() {
            anyhow::bail!("File not found: {:?}", abs_path);
        }

        let hidden = abs_path
            .file_name()
            .and_then(|name| name.to_str())
            .map_or(false, |name| name.starts_with('.'));
        if hidden && !self.config.include_hidden {
            return Ok(Err(SkipReason::Hidden));
        }

        let Some(file) = CollectedFile::from_path(abs_path)? else {
            return Ok(Err(SkipReason::UnsupportedFormat));
        };
        Ok(self.check(&file).map(|()| file))
    }

    /// 폴더 바로 아래 파일 수집 (하위 폴더 제외, 경로 순 정렬)
    pub fn collect_directory(&self, path: &Path) -> Result<Vec<CollectedFile>> {
        let abs_path = absolute(path)?;

        if !abs_path.is_dir() {
            anyhow::bail!("Directory not found: {:?}", abs_path);
        }

        let mut files = Vec::new();

        let walker = WalkBuilder::new(&abs_path)
            .max_depth(Some(1))
            .hidden(!self.config.include_hidden)
            .git_ignore(self.config.respect_gitignore)
            .git_global(self.config.respect_gitignore)
            .git_exclude(self.config.respect_gitignore)
            .build();

        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!("Failed to read entry: {}", e);
                    continue;
                }
            };

            if !entry.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
                continue;
            }

            match CollectedFile::from_path(entry.path().to_path_buf()) {
                Ok(Some(file)) => {
                    if self.should_include(&file) {
                        files.push(file);
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!("Failed to collect file: {}", e);
                }
            }
        }

        files.sort_by(|a, b| a.path.cmp(&b.path));
        tracing::info!("Collected {} files from {:?}", files.len(), abs_path);
        Ok(files)
    }

    /// 파일이 필터 조건을 만족하는지 확인
    fn should_include(&self, file: &CollectedFile) -> bool {
        match self.check(file) {
            Ok(()) => true,
            Err(reason) => {
                tracing::debug!("Skipping {:?}: {}", file.path, reason);
                false
            }
        }
    }

    /// 크기/형식 필터
    fn check(&self, file: &CollectedFile) -> std::result::Result<(), SkipReason> {
        if self.config.max_file_size > 0 && file.size > self.config.max_file_size {
            return Err(SkipReason::TooLarge {
                size: file.size,
                limit: self.config.max_file_size,
            });
        }

        if !self.config.formats.is_empty() && !self.config.formats.contains(&file.format) {
            return Err(SkipReason::ExcludedFormat(file.format));
        }
        Ok(())
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

// ============================================================================
// Statistics
// ============================================================================

/// 수집 통계
#[derive(Debug, Default)]
pub struct CollectionStats {
    pub total_files: usize,
    pub markdown_files: usize,
    pub text_files: usize,
    pub total_size: u64,
}

impl CollectionStats {
    /// 수집된 파일 목록에서 통계 계산
    pub fn from_files(files: &[CollectedFile]) -> Self {
        let mut stats = Self::default();

        for file in files {
            stats.total_files += 1;
            stats.total_size += file.size;

            match file.format {
                SourceFormat::Markdown => stats.markdown_files += 1,
                SourceFormat::StructuredText => stats.text_files += 1,
            }
        }

        stats
    }
}

// ============================================================================
// Tests
// ============================================================================
