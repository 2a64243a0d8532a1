/* Run the whole pipeline for a list of expressions and collect serializable reports. A
 * failing expression is reported on its own and never stops the rest of the batch. */

use color_eyre::eyre::Result;
use serde::Serialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{info, warn};

use crate::dfa::{construct_dfa, construct_minimal_dfa, DFA};
use crate::fa::{AutomatonView, FA};
use crate::nfa::{construct_nfa, NFA};
use crate::regex::{parse, Postfix};
use crate::simulator::{run_with_trace, TraceStep};

/// Test strings used when the caller supplies none.
pub const DEFAULT_TEST_STRINGS: [&str; 4] = ["babbaaaaa", "abb", "a", ""];

#[derive(Debug)]
pub enum BatchError {
    FileOpenError(String),
    FileReadError(String),
}

impl std::fmt::Display for BatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BatchError::FileOpenError(err_line) => write!(f, "{}", err_line),
            BatchError::FileReadError(err_line) => write!(f, "{}", err_line),
        }
    }
}

impl std::error::Error for BatchError {}

/// Every stage of the pipeline for a single expression.
#[derive(Debug, Clone)]
pub struct Pipeline {
    pub expression: String,
    pub postfix: Postfix,
    pub nfa: NFA,
    pub dfa: DFA,
    pub minimal_dfa: DFA,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub input: String,
    pub accepted: bool,
    pub trace: Vec<TraceStep>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExpressionReport {
    pub expression: String,
    pub postfix: String,
    pub nfa: AutomatonView,
    pub dfa: AutomatonView,
    pub minimal_dfa: AutomatonView,
    pub simulations: Vec<SimulationReport>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExpressionOutcome {
    Compiled(ExpressionReport),
    Failed { expression: String, error: String },
}

impl Pipeline {
    pub fn run(expression: &str, epsilon: char) -> Result<Self> {
        let postfix = parse(expression, epsilon)?;
        let mut nfa = construct_nfa(&postfix)?;
        nfa.set_regex(expression.to_string());
        let dfa = construct_dfa(&nfa);
        let minimal_dfa = construct_minimal_dfa(&dfa);

        info!(
            expression,
            %postfix,
            nfa_states = nfa.get_num_states(),
            dfa_states = dfa.get_num_states(),
            minimal_states = minimal_dfa.get_num_states(),
            "compiled expression"
        );

        Ok(Pipeline {
            expression: expression.to_string(),
            postfix,
            nfa,
            dfa,
            minimal_dfa,
        })
    }

    /// Simulate every test string against the minimal DFA and collect the views of all
    /// three automata.
    pub fn report<S: AsRef<str>>(&self, tests: &[S]) -> ExpressionReport {
        let simulations = tests
            .iter()
            .map(|input| {
                let input = input.as_ref();
                let simulation = run_with_trace(&self.minimal_dfa, input);
                SimulationReport {
                    input: input.to_string(),
                    accepted: simulation.accepted,
                    trace: simulation.trace,
                }
            })
            .collect();

        ExpressionReport {
            expression: self.expression.clone(),
            postfix: self.postfix.to_string(),
            nfa: self.nfa.to_view(),
            dfa: self.dfa.to_view(),
            minimal_dfa: self.minimal_dfa.to_view(),
            simulations,
        }
    }
}

/// Process every expression, skipping blank ones. An expression that fails to compile
/// yields a `Failed` outcome and the batch carries on with the next one.
pub fn process_batch<E: AsRef<str>, T: AsRef<str>>(
    expressions: &[E],
    tests: &[T],
    epsilon: char,
) -> Vec<ExpressionOutcome> {
    let mut outcomes = Vec::new();

    for expression in expressions {
        let expression = expression.as_ref().trim();
        if expression.is_empty() {
            continue;
        }

        match Pipeline::run(expression, epsilon) {
            Ok(pipeline) => outcomes.push(ExpressionOutcome::Compiled(pipeline.report(tests))),
            Err(err) => {
                warn!(expression, "skipping expression: {}", err);
                outcomes.push(ExpressionOutcome::Failed {
                    expression: expression.to_string(),
                    error: err.to_string(),
                });
            }
        }
    }
    outcomes
}

/// The given test strings, or [`DEFAULT_TEST_STRINGS`] when there are none.
pub fn test_strings_or_default(tests: Vec<String>) -> Vec<String> {
    if tests.is_empty() {
        DEFAULT_TEST_STRINGS.iter().map(|s| s.to_string()).collect()
    } else {
        tests
    }
}

fn read_lines(file_path: &Path, what: &str) -> Result<Vec<String>, BatchError> {
    let file = match File::open(file_path) {
        Ok(file) => file,
        Err(error) => {
            let err_line = format!(
                "Error: Failed to open the {} file {}: {}",
                what,
                file_path.display(),
                error
            );
            return Err(BatchError::FileOpenError(err_line));
        }
    };
    let reader = BufReader::new(file);

    let mut lines = Vec::new();
    for (line_number, line) in reader.lines().enumerate() {
        match line {
            Ok(line) => lines.push(line),
            Err(error) => {
                let err_line = format!(
                    "Error: Failed to read line number {} in {} file {}",
                    line_number, what, error
                );
                return Err(BatchError::FileReadError(err_line));
            }
        }
    }
    Ok(lines)
}

/// Read a file with one expression per line. Lines are trimmed and blank lines skipped.
pub fn read_expressions(file_path: &Path) -> Result<Vec<String>, BatchError> {
    let lines = read_lines(file_path, "expressions")?;
    Ok(lines
        .iter()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

/// Read a file with one test string per line. Blank lines and lines starting with `#` are
/// skipped.
pub fn read_test_strings(file_path: &Path) -> Result<Vec<String>, BatchError> {
    let lines = read_lines(file_path, "tests")?;
    Ok(lines
        .iter()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

/// Turn an expression into something usable as a directory name: anything outside
/// `[0-9A-Za-z-_.]` becomes `_` and the result is cut to `max_len` characters.
pub fn safe_folder_name(expression: &str, max_len: usize) -> String {
    expression
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.') {
                ch
            } else {
                '_'
            }
        })
        .take(max_len)
        .collect()
}

/// Folder for the `index`th outcome of a batch. The index keeps expressions which map to the
/// same safe name, such as `a|b` and `a+b`, apart.
pub fn output_folder_name(index: usize, expression: &str, max_len: usize) -> String {
    format!("{:03}_{}", index + 1, safe_folder_name(expression, max_len))
}
