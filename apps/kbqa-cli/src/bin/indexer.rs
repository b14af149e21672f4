use std::env;
use std::process::ExitCode;

use kbqa_cli::init_logging;
use kbqa_cli::pipeline::{build_index, resolve_docs_dir};
use kbqa_core::config::AppConfig;

fn main() -> ExitCode {
    init_logging("info");
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("❌ {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> anyhow::Result<()> {
    let config = AppConfig::load()?;
    let docs_dir = resolve_docs_dir(&config, env::args().nth(1).as_deref());

    println!("Knowledge base indexer\n======================");
    println!("Documents: {}", docs_dir.display());
    println!("Index:     {}", config.index_dir().display());

    let report = build_index(&config, &docs_dir)?;
    if report.documents == 0 {
        println!("⚠️  No documents loaded; wrote an empty index.");
    }
    println!("\n✅ Indexing completed successfully!");
    println!("📊 {} documents -> {} chunks (dim {})", report.documents, report.stats.chunks, report.stats.dim);
    println!("📁 Saved to {}", report.stats.index_dir.display());
    Ok(())
}
