use std::io;
use std::process::ExitCode;

use kbqa_cli::init_logging;
use kbqa_cli::pipeline::build_generator;
use kbqa_cli::shell::{Shell, BANNER};
use kbqa_core::config::AppConfig;

fn main() -> ExitCode {
    init_logging("warn");
    println!("{BANNER}");
    println!("Initializing the Enterprise Knowledge Assistant...");

    let assistant = match AppConfig::load().and_then(|config| build_generator(&config)) {
        Ok(assistant) => assistant,
        Err(e) => {
            eprintln!("❌ {e:#}");
            return ExitCode::FAILURE;
        }
    };

    println!("📚 Index loaded: {} chunks", assistant.indexed_chunks);
    println!("✅ Retrieval QA chain created successfully!");

    let mut shell = Shell::new(assistant.generator);
    match shell.run(io::stdin().lock(), &mut io::stdout()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("❌ {e:#}");
            ExitCode::FAILURE
        }
    }
}
