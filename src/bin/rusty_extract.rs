use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use futures_util::{StreamExt, stream};
use rustyextract::{
    config,
    extraction::{
        DocumentSource, ExtractionApi, ExtractionOptions, ExtractionRequest, Extractor,
        OcrStrategy,
    },
    logging::{self, Console},
};
use serde_json::json;
use walkdir::WalkDir;

#[derive(Parser)]
#[command(
    name = "rusty-extract",
    about = "Extract text from documents through the extraction backend"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Extract a local file.
    File {
        path: PathBuf,
        #[command(flatten)]
        options: SharedOptions,
    },
    /// Download and extract a remote document.
    Url {
        url: String,
        #[command(flatten)]
        options: SharedOptions,
    },
    /// Extract inline text.
    Text {
        text: String,
        #[arg(long, default_value = "document.txt")]
        file_name: String,
        #[command(flatten)]
        options: SharedOptions,
    },
    /// Extract every matching file under a directory.
    Batch {
        dir: PathBuf,
        /// Only include files with these extensions (repeatable, case-insensitive).
        #[arg(long = "extension")]
        extensions: Vec<String>,
        #[arg(long, default_value_t = 4)]
        concurrency: usize,
        #[command(flatten)]
        options: SharedOptions,
    },
    /// Invalidate the local and backend caches.
    ClearCache,
}

#[derive(Args, Clone)]
struct SharedOptions {
    /// OCR engine to request (`tesseract` or `easyocr`).
    #[arg(long)]
    ocr_strategy: Option<OcrStrategy>,
    /// Skip the cache lookup and refresh the entry.
    #[arg(long)]
    no_cache: bool,
    /// Print results as JSON.
    #[arg(long)]
    json: bool,
}

impl SharedOptions {
    fn extraction_options(&self) -> ExtractionOptions {
        ExtractionOptions {
            ocr_strategy: self.ocr_strategy,
            use_cache: self.no_cache.then_some(false),
        }
    }
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    config::init_config();
    logging::init_tracing_to(Console::Stderr);
    let extractor = Arc::new(
        Extractor::from_config(config::get_config())
            .context("failed to configure extraction backend")?,
    );

    match cli.command {
        Command::File { path, options } => {
            extract_one(&*extractor, DocumentSource::File(path), &options).await
        }
        Command::Url { url, options } => {
            extract_one(&*extractor, DocumentSource::Url(url), &options).await
        }
        Command::Text {
            text,
            file_name,
            options,
        } => extract_one(&*extractor, DocumentSource::text(file_name, text), &options).await,
        Command::Batch {
            dir,
            extensions,
            concurrency,
            options,
        } => extract_batch(extractor, &dir, &extensions, concurrency, &options).await,
        Command::ClearCache => {
            extractor
                .clear_cache()
                .await
                .context("failed to clear caches")?;
            println!("Cache cleared");
            Ok(())
        }
    }
}

async fn extract_one<S>(service: &S, source: DocumentSource, options: &SharedOptions) -> Result<()>
where
    S: ExtractionApi + ?Sized,
{
    let origin = source.origin();
    let request = ExtractionRequest::new(source).with_options(options.extraction_options());
    let result = service
        .extract_text(request)
        .await
        .with_context(|| format!("extraction failed for {origin}"))?;

    if options.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("{}", result.content);
    }
    Ok(())
}

async fn extract_batch(
    service: Arc<Extractor>,
    dir: &Path,
    extensions: &[String],
    concurrency: usize,
    options: &SharedOptions,
) -> Result<()> {
    if !dir.is_dir() {
        bail!("{} is not a directory", dir.display());
    }
    let files = collect_files(dir, extensions)?;
    tracing::info!(
        dir = %dir.display(),
        files = files.len(),
        concurrency,
        "Starting batch extraction"
    );

    let extraction_options = options.extraction_options();
    let outcomes: Vec<_> = stream::iter(files)
        .map(move |path| {
            let service = Arc::clone(&service);
            async move {
                let request = ExtractionRequest::new(DocumentSource::File(path.clone()))
                    .with_options(extraction_options);
                let outcome = service.extract_text(request).await;
                (path, outcome)
            }
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    let mut failures = 0usize;
    for (path, outcome) in &outcomes {
        match outcome {
            Ok(result) if options.json => println!(
                "{}",
                json!({
                    "path": path.display().to_string(),
                    "status": "ok",
                    "characters": result.content.chars().count(),
                    "metadata": result.metadata,
                })
            ),
            Ok(result) => println!(
                "ok\t{}\t{} chars",
                path.display(),
                result.content.chars().count()
            ),
            Err(err) => {
                failures += 1;
                if options.json {
                    println!(
                        "{}",
                        json!({
                            "path": path.display().to_string(),
                            "status": "error",
                            "kind": err.kind(),
                            "error": err.to_string(),
                        })
                    );
                } else {
                    println!("{}\t{}\t{err}", err.kind(), path.display());
                }
            }
        }
    }

    if failures > 0 {
        bail!("{failures} of {} files failed", outcomes.len());
    }
    Ok(())
}

fn collect_files(dir: &Path, extensions: &[String]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.with_context(|| format!("failed to walk {}", dir.display()))?;
        if entry.file_type().is_file() && matches_extension(entry.path(), extensions) {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

fn matches_extension(path: &Path, extensions: &[String]) -> bool {
    if extensions.is_empty() {
        return true;
    }
    let Some(ext) = path.extension().and_then(|ext| ext.to_str()) else {
        return false;
    };
    extensions
        .iter()
        .any(|wanted| wanted.trim_start_matches('.').eq_ignore_ascii_case(ext))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn shared_flags_map_to_extraction_options() {
        let cli = Cli::parse_from([
            "rusty-extract",
            "file",
            "scan.pdf",
            "--ocr-strategy",
            "easyocr",
            "--no-cache",
        ]);
        let Command::File { path, options } = cli.command else {
            panic!("expected file command");
        };
        assert_eq!(path, PathBuf::from("scan.pdf"));
        let options = options.extraction_options();
        assert_eq!(options.ocr_strategy, Some(OcrStrategy::EasyOcr));
        assert_eq!(options.use_cache, Some(false));
    }

    #[test]
    fn extension_filter_ignores_case_and_leading_dot() {
        let wanted = vec![".PDF".to_string(), "png".to_string()];
        assert!(matches_extension(Path::new("a/b.pdf"), &wanted));
        assert!(matches_extension(Path::new("scan.PNG"), &wanted));
        assert!(!matches_extension(Path::new("notes.txt"), &wanted));
        assert!(!matches_extension(Path::new("Makefile"), &wanted));
        assert!(matches_extension(Path::new("Makefile"), &[]));
    }

    #[test]
    fn batch_collects_matching_files_recursively() {
        let dir = tempfile::tempdir().expect("temp dir");
        let nested = dir.path().join("nested");
        std::fs::create_dir(&nested).expect("nested dir");
        std::fs::write(dir.path().join("a.pdf"), b"a").expect("write");
        std::fs::write(nested.join("b.pdf"), b"b").expect("write");
        std::fs::write(nested.join("c.txt"), b"c").expect("write");

        let files = collect_files(dir.path(), &["pdf".to_string()]).expect("walk");

        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|path| path.extension().unwrap() == "pdf"));
    }
}
