use anyhow::{bail, Context};
use futures::StreamExt;
use serde::Serialize;
use signsafe_lib::models::{
    Document, ExtractedDocument, RiskSummary, TranslationOutcome, TranslationProgress,
};
use signsafe_lib::services::{clause_recommendations, ConfigStore, DocumentPipeline, TranslationJob};

fn preview(s: &str, max_chars: usize) -> String {
    let mut out: String = s.chars().take(max_chars).collect();
    if s.chars().count() > max_chars {
        out.push_str("...");
    }
    out.replace('\n', " ")
}

fn parse_arg_value(args: &[String], key: &str) -> Option<String> {
    args.iter()
        .position(|a| a == key)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

fn has_flag(args: &[String], key: &str) -> bool {
    args.iter().any(|a| a == key)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Output {
    file: String,
    offline: bool,
    document: Document,
    summary: RiskSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    translation: Option<TranslationProgress>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    translations: Vec<TranslationOutcome>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 || args[1].starts_with("--") {
        eprintln!(
            "Usage:\n  analyze_document <path.txt> [--lang <code>] [--offline] [--out <json_path>] [--clauses <n>] [--verbose]\n\nNotes:\n  - `--offline` skips external providers and uses the local substitution rules only.\n  - `--lang` accepts a language code (hi, ta, ...) or English name (Hindi, Tamil, ...).\n  - API keys come from OPENAI_API_KEY / GEMINI_API_KEY or the config file.\n  - `--verbose` logs at debug level; RUST_LOG and SIGNSAFE_LOG_DIR override the config file."
        );
        return Ok(());
    }

    let path = args[1].clone();
    let lang = parse_arg_value(&args, "--lang");
    let offline = has_flag(&args, "--offline");
    let out_path = parse_arg_value(&args, "--out");
    let clauses_n: usize = parse_arg_value(&args, "--clauses")
        .and_then(|s| s.parse().ok())
        .unwrap_or(50);

    let store = ConfigStore::open_default();
    let config = store
        .load()
        .with_context(|| format!("load config failed: {}", store.config_file().display()))?;

    let mut log_config = config.logging.clone().with_env_overrides();
    if has_flag(&args, "--verbose") {
        log_config.level = "debug".to_string();
    }
    let logging = signsafe_lib::start_logging(&log_config);

    let raw_text = std::fs::read_to_string(&path).with_context(|| format!("read file failed: {}", path))?;
    let pipeline = DocumentPipeline::from_config(&config, offline)?;

    // reject an unknown language before spending provider calls on simplification
    if let Some(lang) = lang.as_deref() {
        TranslationJob::new(lang, Vec::new())?;
        if pipeline.translator().is_none() {
            bail!("translation to '{}' needs an enabled translation provider (drop --offline)", lang);
        }
    }

    let mut input = ExtractedDocument::from_text(raw_text);
    input.document_id = std::path::Path::new(&path)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string());
    let document = pipeline.process(input).await;
    let summary = pipeline.summary(&document);

    println!("File: {}", path);
    if let Some(log_file) = logging.log_file() {
        println!("Log: {}", log_file.display());
    }
    println!("Normalized: {} chars", document.text.chars().count());
    println!("Strategy: {:?}", document.strategy);
    if let Some(warning) = &document.input_warning {
        println!("Warning: {}", warning);
    }
    println!(
        "Providers: {}",
        pipeline
            .orchestrator()
            .chain_kinds()
            .iter()
            .map(|k| k.as_str())
            .collect::<Vec<_>>()
            .join(" -> ")
    );
    println!();

    println!("Clauses: {}", document.clauses.len());
    for clause in document.clauses.iter().take(clauses_n) {
        let risk = clause.risk_level().unwrap_or_default();
        println!(
            "[C{:03}] bytes=[{},{}] {:<15} risk={:<6} importance={:<6}  {}",
            clause.index,
            clause.start,
            clause.end,
            clause.category.as_str(),
            risk.as_str(),
            clause.importance.as_str(),
            preview(&clause.text, 100)
        );
        if let Some(result) = &clause.simplification {
            let source = if result.provider.is_external() {
                "provider"
            } else {
                "offline rules"
            };
            println!(
                "        plain ({}, {}): {}",
                result.provider,
                source,
                preview(&result.text, 120)
            );
        }
        if let Some(explanation) = &clause.explanation {
            println!("        why it matters: {}", preview(&explanation.text, 160));
            for warning in &explanation.warnings {
                println!("        ! {}", warning);
            }
        }
        if let Some(assessment) = clause.risk.as_ref().filter(|r| r.is_flagged()) {
            println!("        rules: {}", assessment.matched_rules.join(", "));
            for advice in clause_recommendations(clause.category, assessment) {
                println!("        - {}", advice);
            }
        }
    }
    if document.clauses.len() > clauses_n {
        println!("... ({} more clauses)", document.clauses.len() - clauses_n);
    }
    println!();

    println!(
        "Overall risk: {} [{}] (high={} medium={} low={})",
        summary.overall,
        summary.overall.color(),
        summary.high_count,
        summary.medium_count,
        summary.low_count
    );
    if !summary.top_rules.is_empty() {
        println!("Top rules: {}", summary.top_rules.join(", "));
    }
    println!("Recommendation: {}", summary.recommendation);

    let mut translation = None;
    let mut translations: Vec<TranslationOutcome> = Vec::new();
    if let (Some(lang), Some(translator)) = (lang.as_deref(), pipeline.translator()) {
        let mut job = pipeline.start_translation(&document, lang)?;
        println!();
        println!("Translation ({}):", job.language().name);
        {
            let mut stream = std::pin::pin!(translator.stream(&mut job));
            while let Some(outcome) = stream.next().await {
                match outcome.translated_text() {
                    Some(text) => println!("[C{:03}] {}", outcome.clause_index, preview(text, 120)),
                    None => println!("[C{:03}] (translation failed)", outcome.clause_index),
                }
            }
        }
        let progress = job.progress();
        println!(
            "Translated {}/{} clauses, {} failed",
            progress.completed, progress.total, progress.failed
        );
        translation = Some(progress);
        translations = job.into_outcomes();
    }

    if let Some(out_path) = out_path {
        let out = Output {
            file: path.clone(),
            offline,
            document,
            summary,
            translation,
            translations,
        };
        let json = serde_json::to_string_pretty(&out)?;
        std::fs::write(&out_path, json).with_context(|| format!("write out failed: {}", out_path))?;
        println!();
        println!("Wrote JSON: {}", out_path);
    }

    Ok(())
}
