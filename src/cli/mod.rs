//! CLI 모듈
//!
//! campus-kb CLI 명령어 정의 및 구현

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tokio::io::AsyncBufReadExt;

use crate::assistant::{SupportAssistant, DEFAULT_TOP_K};
use crate::chat::OpenAIChat;
use crate::collector::{CollectionStats, CollectorConfig, FileCollector, SourceFormat};
use crate::config::{Settings, OPENAI_API_KEY_VAR};
use crate::embedding::{dimension_for_model, EmbeddingProvider, OpenAIEmbedding};
use crate::index::{
    export_embeddings, open_index, save_embeddings, IndexBackend, Indexer, LanceVectorIndex,
    VectorIndex, LANCE_DIR_NAME,
};
use crate::knowledge::{convert_structured_folder, merge_files, KnowledgeBase, MarkdownParser};

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "campus-kb")]
#[command(version, about = "대학 학생지원 지식베이스 & RAG 챗봇", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Markdown 지식베이스 문서를 JSON으로 변환
    Build {
        /// Markdown 파일 경로
        input: PathBuf,

        /// 출력 JSON 경로
        #[arg(short, long, default_value = "knowledge_base.json")]
        output: PathBuf,

        /// metadata.source 값
        #[arg(long)]
        source: Option<String>,
    },

    /// 구조화 텍스트(.txt) 폴더를 JSON으로 변환
    Convert {
        /// .txt 파일이 있는 폴더
        dir: PathBuf,

        /// 출력 JSON 경로
        #[arg(short, long, default_value = "extracted_structured.json")]
        output: PathBuf,
    },

    /// 두 지식베이스 JSON 병합
    Merge {
        /// 기존 지식베이스
        existing: PathBuf,

        /// 추출 문서 지식베이스
        extracted: PathBuf,

        /// 출력 JSON 경로
        #[arg(short, long, default_value = "merged_knowledge_base.json")]
        output: PathBuf,
    },

    /// QA 쌍 임베딩을 JSON 파일로 export
    Embed {
        /// 지식베이스 JSON
        kb: PathBuf,

        /// 출력 JSON 경로
        #[arg(short, long, default_value = "knowledgebase_embeddings.json")]
        output: PathBuf,
    },

    /// QA 쌍을 벡터 인덱스에 등록
    Index {
        /// 지식베이스 JSON
        kb: PathBuf,

        #[command(flatten)]
        target: IndexArgs,
    },

    /// 지식베이스 검색
    Query {
        /// 검색 쿼리
        query: String,

        /// 결과 개수
        #[arg(short = 'k', long, default_value_t = DEFAULT_TOP_K)]
        top_k: usize,

        #[command(flatten)]
        target: IndexArgs,
    },

    /// 대화형 챗봇 (exit / quit 으로 종료)
    Chat {
        /// 검색 개수
        #[arg(short = 'k', long, default_value_t = DEFAULT_TOP_K)]
        top_k: usize,

        /// 끊긴 답변 이어쓰기 끄기
        #[arg(long)]
        no_continue: bool,

        #[command(flatten)]
        target: IndexArgs,
    },

    /// 상태 확인
    Status,
}

/// 인덱스 백엔드 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// 로컬 LanceDB
    Lance,
    /// Pinecone 호스팅 인덱스
    Pinecone,
    /// 임베딩 export 파일 (--embeddings)
    Memory,
}

/// 인덱스 선택 옵션
#[derive(Debug, Clone, Args)]
pub struct IndexArgs {
    /// 인덱스 백엔드
    #[arg(long, value_enum, default_value_t = Backend::Lance)]
    pub backend: Backend,

    /// memory 백엔드용 임베딩 export 파일
    #[arg(long)]
    pub embeddings: Option<PathBuf>,
}

impl IndexArgs {
    fn to_backend(&self) -> Result<IndexBackend> {
        Ok(match self.backend {
            Backend::Lance => IndexBackend::Lance,
            Backend::Pinecone => IndexBackend::Pinecone,
            Backend::Memory => {
                let embeddings = self.embeddings.clone().ok_or_else(|| {
                    anyhow::anyhow!("memory 백엔드는 --embeddings <파일> 이 필요합니다")
                })?;
                IndexBackend::Memory { embeddings }
            }
        })
    }
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Build {
            input,
            output,
            source,
        } => cmd_build(&input, &output, source),
        Commands::Convert { dir, output } => cmd_convert(&dir, &output),
        Commands::Merge {
            existing,
            extracted,
            output,
        } => cmd_merge(&existing, &extracted, &output),
        Commands::Embed { kb, output } => cmd_embed(&kb, &output).await,
        Commands::Index { kb, target } => cmd_index(&kb, &target).await,
        Commands::Query {
            query,
            top_k,
            target,
        } => cmd_query(&query, top_k, &target).await,
        Commands::Chat {
            top_k,
            no_continue,
            target,
        } => cmd_chat(top_k, !no_continue, &target).await,
        Commands::Status => cmd_status().await,
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

/// Markdown → JSON 변환 명령어 (build)
fn cmd_build(input: &Path, output: &Path, source: Option<String>) -> Result<()> {
    let collector = FileCollector::new(CollectorConfig {
        formats: vec![SourceFormat::Markdown],
        ..Default::default()
    });
    let file = match collector.inspect_file(input)? {
        Ok(file) => file,
        Err(reason) => bail!("Markdown 입력으로 쓸 수 없습니다 ({}): {:?}", reason, input),
    };

    println!(
        "[*] 파싱 중: {} ({})",
        file.path.display(),
        format_bytes(file.size as usize)
    );

    let mut parser = MarkdownParser::new();
    if let Some(source) = source {
        parser = parser.with_source(source);
    }

    let kb = parser.parse_file(&file.path)?;
    kb.save(output).context("지식베이스 저장 실패")?;

    print_kb_summary(&kb);
    println!("[OK] 저장됨: {}", output.display());
    Ok(())
}

/// 구조화 텍스트 폴더 변환 명령어 (convert)
fn cmd_convert(dir: &Path, output: &Path) -> Result<()> {
    let files = FileCollector::with_defaults().collect_directory(dir)?;
    let stats = CollectionStats::from_files(&files);

    println!(
        "[*] 변환 대상: .txt {} 파일 ({})",
        stats.text_files,
        format_bytes(stats.total_size as usize)
    );

    if stats.text_files == 0 {
        println!("[!] 변환할 .txt 파일이 없습니다.");
    }

    let kb = convert_structured_folder(dir)?;
    kb.save(output).context("지식베이스 저장 실패")?;

    print_kb_summary(&kb);
    println!("[OK] 저장됨: {}", output.display());
    Ok(())
}

/// 병합 명령어 (merge)
fn cmd_merge(existing: &Path, extracted: &Path, output: &Path) -> Result<()> {
    println!(
        "[*] 병합 중: {} + {}",
        existing.display(),
        extracted.display()
    );

    let report = merge_files(existing, extracted, output)?;

    println!(
        "[OK] 카테고리 +{}, QA +{}, 긴급 {}",
        report.added_categories, report.added_qa_pairs, report.emergency_count
    );
    if report.renumbered > 0 {
        println!(
            "[!] id가 겹친 QA {}개에 새 번호를 부여했습니다",
            report.renumbered
        );
    }
    println!("[OK] 저장됨: {}", output.display());
    Ok(())
}

/// 임베딩 export 명령어 (embed)
async fn cmd_embed(kb_path: &Path, output: &Path) -> Result<()> {
    let settings = Settings::from_env();
    let embedder = require_embedder(&settings)?;
    let kb = KnowledgeBase::load(kb_path).context("지식베이스 로드 실패")?;

    println!(
        "[*] {} QA 쌍 임베딩 중 ({})...",
        kb.qa_pairs.len(),
        embedder.name()
    );

    let records = export_embeddings(&embedder, &kb.qa_pairs).await?;
    save_embeddings(output, &records)?;

    println!(
        "[OK] 임베딩 {} 건 저장됨: {}",
        records.len(),
        output.display()
    );
    if records.len() < kb.qa_pairs.len() {
        println!(
            "[!] 텍스트가 비어 건너뛴 QA: {} 건",
            kb.qa_pairs.len() - records.len()
        );
    }
    Ok(())
}

/// 인덱싱 명령어 (index)
async fn cmd_index(kb_path: &Path, target: &IndexArgs) -> Result<()> {
    if target.backend == Backend::Memory {
        bail!("memory 백엔드는 저장되지 않습니다. `campus-kb embed` 로 export 파일을 만드세요");
    }

    let settings = Settings::from_env();
    let embedder = require_embedder(&settings)?;
    let kb = KnowledgeBase::load(kb_path).context("지식베이스 로드 실패")?;
    let index = open_index(&target.to_backend()?, &settings, embedder.dimension()).await?;

    println!(
        "[*] {} QA 쌍을 {} 인덱스에 등록 중...",
        kb.qa_pairs.len(),
        index.name()
    );

    let report = Indexer::new(&embedder)
        .index_pairs(index.as_ref(), &kb.qa_pairs)
        .await?;

    println!(
        "[OK] 등록 {}, 건너뜀 {}",
        report.indexed, report.skipped
    );
    Ok(())
}

/// 검색 명령어 (query)
async fn cmd_query(query: &str, top_k: usize, target: &IndexArgs) -> Result<()> {
    let settings = Settings::from_env();
    let assistant = open_assistant(&settings, target, top_k).await?;

    println!("[*] 검색 중: \"{}\"", query);

    let matches = assistant.search(query).await.context("검색 실패")?;

    if matches.is_empty() {
        println!("\n[!] 검색 결과가 없습니다.");
        return Ok(());
    }

    println!("\n[OK] 검색 결과 ({} 건):\n", matches.len());

    for (i, m) in matches.iter().enumerate() {
        let category = m.metadata.category_id.as_deref().unwrap_or("-");
        println!("{}. [{}] [점수: {:.4}] {}", i + 1, category, m.score, m.id);
        println!("   Q: {}", truncate_text(&m.metadata.question, 120));
        println!("   A: {}", truncate_text(&m.metadata.answer, 200));
        println!();
    }

    Ok(())
}

/// 대화 명령어 (chat)
async fn cmd_chat(top_k: usize, continue_truncated: bool, target: &IndexArgs) -> Result<()> {
    let settings = Settings::from_env();
    let assistant = open_assistant(&settings, target, top_k)
        .await?
        .with_continuation(continue_truncated);

    println!("[*] 학생지원 챗봇입니다. 'exit' 또는 'quit' 으로 종료합니다.");

    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("\nYou: ");
        std::io::stdout().flush()?;

        let line = match lines.next_line().await? {
            Some(line) => line,
            None => break,
        };

        let query = line.trim();
        if query.is_empty() {
            continue;
        }

        print!("Bot: ");
        std::io::stdout().flush()?;

        let result = assistant
            .respond_streaming(query, |token| {
                print!("{}", token);
                let _ = std::io::stdout().flush();
            })
            .await;
        println!();

        if let Err(e) = result {
            println!("[!] 응답 생성 실패: {:#}", e);
            continue;
        }

        if is_exit_command(query) {
            break;
        }
    }

    Ok(())
}

/// 상태 명령어 (status)
async fn cmd_status() -> Result<()> {
    println!("campus-kb v{}", env!("CARGO_PKG_VERSION"));
    println!();

    let settings = Settings::from_env();

    println!("[*] 데이터 디렉토리: {}", settings.data_dir.display());

    if settings.has_openai_key() {
        println!("[OK] OpenAI API 키: 설정됨");
    } else {
        println!("[!] OpenAI API 키: 미설정");
        println!("    설정: export {}=your-key", OPENAI_API_KEY_VAR);
    }
    println!(
        "[*] 모델: 임베딩 {}, 채팅 {}",
        settings.embedding_model, settings.chat_model
    );

    match &settings.pinecone {
        Some(pinecone) => println!("[OK] Pinecone: {}", pinecone.host),
        None => println!("[*] Pinecone: 미설정"),
    }

    let lance_path = settings.data_dir.join(LANCE_DIR_NAME);
    if !lance_path.exists() {
        println!("[*] 로컬 인덱스: 없음");
        return Ok(());
    }

    let dimension = match dimension_for_model(&settings.embedding_model) {
        Some(dimension) => dimension,
        None => {
            println!("[!] 알 수 없는 임베딩 모델: {}", settings.embedding_model);
            return Ok(());
        }
    };

    match LanceVectorIndex::open(&lance_path, dimension).await {
        Ok(index) => match index.count().await {
            Ok(count) => println!("[OK] 로컬 인덱스: {} QA", count),
            Err(e) => println!("[!] 인덱스 통계 조회 실패: {}", e),
        },
        Err(e) => {
            tracing::debug!("LanceDB 열기 실패: {}", e);
            println!("[!] 로컬 인덱스를 열 수 없습니다");
        }
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// API 키를 확인하고 임베딩 클라이언트 생성
fn require_embedder(settings: &Settings) -> Result<OpenAIEmbedding> {
    if settings.openai_api_key.is_none() {
        bail!(
            "API 키가 설정되지 않았습니다.\n\n\
             설정 방법:\n  \
             export {}=your-api-key\n\n\
             API 키 발급: https://platform.openai.com/api-keys",
            OPENAI_API_KEY_VAR
        );
    }
    OpenAIEmbedding::from_settings(settings)
}

/// 임베딩 + 인덱스 + 채팅으로 어시스턴트 구성
async fn open_assistant(
    settings: &Settings,
    target: &IndexArgs,
    top_k: usize,
) -> Result<SupportAssistant> {
    let embedder = require_embedder(settings)?;
    let index = open_index(&target.to_backend()?, settings, embedder.dimension()).await?;
    let chat = OpenAIChat::from_settings(settings)?;

    Ok(
        SupportAssistant::new(Box::new(embedder), index, Box::new(chat)).with_top_k(top_k),
    )
}

/// 대화 종료 명령인지
fn is_exit_command(query: &str) -> bool {
    matches!(query.trim().to_lowercase().as_str(), "exit" | "quit")
}

/// 지식베이스 요약 출력
fn print_kb_summary(kb: &KnowledgeBase) {
    println!(
        "[OK] 카테고리 {}, QA {}",
        kb.metadata.topics_count, kb.metadata.qa_pairs_count
    );
    for category in kb.categories.iter().take(10) {
        let count = kb
            .qa_pairs
            .iter()
            .filter(|qa| qa.category_id == category.id)
            .count();
        println!("     {:<32} {:>4} QA", truncate_text(&category.title, 32), count);
    }
    if kb.categories.len() > 10 {
        println!("     ... 외 {} 카테고리", kb.categories.len() - 10);
    }
}

/// 텍스트 자르기 (UTF-8 안전)
fn truncate_text(text: &str, max_chars: usize) -> String {
    let cleaned = text.replace('\n', " ").replace('\r', "");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= max_chars {
        cleaned.to_string()
    } else {
        let truncated: String = cleaned.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

/// 바이트 크기 포맷팅
fn format_bytes(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

// ============================================================================
// Tests
// ============================================================================
