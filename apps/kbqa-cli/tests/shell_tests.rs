use std::cell::RefCell;
use std::io::Cursor;

use kbqa_answer::Answer;
use kbqa_cli::shell::{Ask, Shell, EMPTY_INPUT, GOODBYE};
use kbqa_core::types::{Chunk, Meta, MetaValue, ScoredChunk};

#[derive(Default)]
struct Scripted {
    asked: RefCell<Vec<String>>,
}

impl Ask for Scripted {
    fn ask(&self, question: &str) -> anyhow::Result<Answer> {
        self.asked.borrow_mut().push(question.to_string());
        if question.contains("fail") {
            anyhow::bail!("model unavailable");
        }
        let mut metadata = Meta::new();
        metadata.insert("category".into(), MetaValue::from("HR"));
        metadata.insert("source".into(), MetaValue::from("policy.txt"));
        Ok(Answer {
            question: question.to_string(),
            text: "Employees get 15 vacation days.".to_string(),
            sources: vec![ScoredChunk {
                chunk: Chunk { id: "policy.txt_chunk_0".into(), content: "x".repeat(400), metadata },
                score: 0.87,
            }],
        })
    }
}

fn run(input: &str) -> (Shell<Scripted>, String) {
    let mut shell = Shell::new(Scripted::default());
    let mut out = Vec::new();
    shell.run(Cursor::new(input.to_string()), &mut out).expect("shell run");
    (shell, String::from_utf8(out).unwrap())
}

#[test]
fn exit_stops_the_loop() {
    let (shell, out) = run("/exit\nHow many vacation days?\n");
    assert!(out.contains(GOODBYE));
    assert!(shell.history().is_empty(), "nothing after /exit is read");
}

#[test]
fn help_prints_commands_and_leaves_history_alone() {
    let (shell, out) = run("/help\n/EXAMPLES\n/exit\n");
    for command in ["/help", "/exit", "/examples"] {
        assert!(out.contains(command));
    }
    assert!(out.contains("How many vacation days do employees get?"));
    assert!(shell.history().is_empty());
}

#[test]
fn blank_input_asks_again() {
    let (shell, out) = run("   \n\n/exit\n");
    assert_eq!(out.matches(EMPTY_INPUT).count(), 2);
    assert!(shell.history().is_empty());
}

#[test]
fn questions_print_answer_and_sources() {
    let (shell, out) = run("  How many vacation days?  \n/exit\n");
    assert_eq!(shell.history(), ["How many vacation days?".to_string()]);
    assert!(out.contains("Employees get 15 vacation days."));
    assert!(out.contains("Source 1 (score 0.870):"));
    assert!(out.contains(&format!("Content (excerpt): {}...", "x".repeat(150))));
    assert!(out.contains("category: HR"));
}

#[test]
fn a_failed_question_does_not_end_the_session() {
    let (shell, out) = run("please fail\nsecond question\n/exit\n");
    assert!(out.contains("❌ Error: model unavailable"));
    assert!(out.contains("Employees get 15 vacation days."));
    assert_eq!(shell.history().len(), 2);
}

#[test]
fn end_of_input_behaves_like_exit() {
    let (shell, out) = run("first question\n");
    assert!(out.trim_end().ends_with(GOODBYE));
    assert_eq!(shell.history().len(), 1);
}
