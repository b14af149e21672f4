//! Interactive question loop.

use anyhow::Result;
use std::io::{BufRead, Write};
use tracing::warn;

use kbqa_answer::{Answer, AnswerGenerator};

pub const BANNER: &str = "
    ╭────────────────────────────────────────────────╮
    │                                                │
    │        Enterprise Knowledge Assistant          │
    │                                                │
    ╰────────────────────────────────────────────────╯
";

pub const HELP: &str = "
    Available commands:

    /help       - Display this help information
    /exit       - Exit the application
    /examples   - Show example questions

    Just type your question to get an answer from the knowledge base.
";

pub const EXAMPLES: &str = "
    Example questions:

    1. What is the company's remote work policy?
    2. How many vacation days do employees get?
    3. What is the process for requesting time off?
    4. What security protocols should I follow?
    5. How do I set up my development environment?
";

pub const GOODBYE: &str = "Thank you for using the Enterprise Knowledge Assistant. Goodbye!";
pub const EMPTY_INPUT: &str = "Please enter a question or command.";

const EXCERPT_CHARS: usize = 150;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Exit,
    Examples,
    Blank,
    Question(String),
}

impl Command {
    /// Commands are matched case-insensitively, ignoring surrounding whitespace.
    pub fn parse(line: &str) -> Self {
        let trimmed = line.trim();
        match trimmed.to_lowercase().as_str() {
            "" => Self::Blank,
            "/help" => Self::Help,
            "/exit" => Self::Exit,
            "/examples" => Self::Examples,
            _ => Self::Question(trimmed.to_string()),
        }
    }
}

/// Anything that can answer a question.
pub trait Ask {
    fn ask(&self, question: &str) -> Result<Answer>;
}

impl Ask for AnswerGenerator {
    fn ask(&self, question: &str) -> Result<Answer> { AnswerGenerator::ask(self, question) }
}

pub struct Shell<A: Ask> {
    asker: A,
    history: Vec<String>,
}

impl<A: Ask> Shell<A> {
    pub fn new(asker: A) -> Self { Self { asker, history: Vec::new() } }

    /// Questions forwarded to the answer chain, oldest first.
    pub fn history(&self) -> &[String] { &self.history }

    /// Read lines until `/exit` or end of input. Errors while answering a
    /// question are printed and the loop continues; only I/O errors on the
    /// terminal itself end it early.
    pub fn run<R: BufRead, W: Write>(&mut self, mut input: R, out: &mut W) -> Result<()> {
        writeln!(out, "\nReady to answer your questions! Type /help for available commands.")?;
        loop {
            write!(out, "\n> ")?;
            out.flush()?;
            let mut line = String::new();
            if input.read_line(&mut line)? == 0 {
                writeln!(out)?;
                writeln!(out, "{GOODBYE}")?;
                return Ok(());
            }
            match Command::parse(&line) {
                Command::Exit => {
                    writeln!(out, "{GOODBYE}")?;
                    return Ok(());
                }
                Command::Help => writeln!(out, "{HELP}")?,
                Command::Examples => writeln!(out, "{EXAMPLES}")?,
                Command::Blank => writeln!(out, "{EMPTY_INPUT}")?,
                Command::Question(question) => self.answer(&question, out)?,
            }
        }
    }

    fn answer<W: Write>(&mut self, question: &str, out: &mut W) -> Result<()> {
        self.history.push(question.to_string());
        writeln!(out, "\n🔍 Question: {question}")?;
        match self.asker.ask(question) {
            Ok(answer) => print_answer(out, &answer)?,
            Err(e) => {
                warn!(error = %e, "question failed");
                writeln!(out, "❌ Error: {e:#}")?;
            }
        }
        Ok(())
    }
}

pub fn print_answer<W: Write>(out: &mut W, answer: &Answer) -> Result<()> {
    writeln!(out, "\n📝 Answer:")?;
    writeln!(out, "{}", answer.text)?;
    writeln!(out, "\n📄 Sources:")?;
    if answer.sources.is_empty() {
        writeln!(out, "(no matching documents)")?;
    }
    for (i, source) in answer.sources.iter().enumerate() {
        let metadata = source
            .chunk
            .metadata
            .iter()
            .map(|(k, v)| format!("{k}: {v}"))
            .collect::<Vec<_>>()
            .join(", ");
        writeln!(out, "\nSource {} (score {:.3}):", i + 1, source.score)?;
        writeln!(out, "Content (excerpt): {}", source.chunk.excerpt(EXCERPT_CHARS))?;
        writeln!(out, "Metadata: {{{metadata}}}")?;
    }
    Ok(())
}
