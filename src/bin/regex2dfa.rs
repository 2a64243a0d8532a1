use clap::{Arg, Command};
use color_eyre::eyre::Result;
use regex2dfa::batch::{
    output_folder_name, process_batch, read_expressions, read_test_strings,
    test_strings_or_default, ExpressionOutcome, ExpressionReport,
};
use regex2dfa::fa::{AutomatonView, EPSILON_MARKER};
use regex2dfa::regex::check_epsilon;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

const MAX_FOLDER_NAME_LEN: usize = 40;

fn print_automaton(name: &str, view: &AutomatonView) {
    let accept_states: Vec<String> = view.accept_states.iter().map(|s| s.to_string()).collect();

    println!("{}:", name);
    println!("  states: {}", view.states.len());
    println!("  start: {}", view.start);
    println!("  accept: {{{}}}", accept_states.join(", "));
    println!("  transitions:");
    for (source, label, destination) in &view.transitions {
        println!("    ({}) -{}-> ({})", source, label, destination);
    }
}

fn print_report(report: &ExpressionReport) {
    println!("postfix: {}", report.postfix);
    print_automaton("NFA", &report.nfa);
    println!("DFA states: {}", report.dfa.states.len());
    println!("minimal DFA states: {}", report.minimal_dfa.states.len());

    for simulation in &report.simulations {
        let verdict = if simulation.accepted {
            "ACCEPT"
        } else {
            "REJECT"
        };
        println!("  {:?}: {}", simulation.input, verdict);
        for step in &simulation.trace {
            println!("    {}", step);
        }
    }
}

fn write_file(path: &Path, contents: &str) {
    if let Err(error) = fs::write(path, contents) {
        warn!("Failed to write {}: {}", path.display(), error);
    }
}

fn save_report(report: &ExpressionReport, folder: &Path, save_dot: bool) {
    if let Err(error) = fs::create_dir_all(folder) {
        warn!("Failed to create {}: {}", folder.display(), error);
        return;
    }

    let automata = [
        ("nfa", &report.nfa),
        ("dfa", &report.dfa),
        ("mdfa", &report.minimal_dfa),
    ];

    for (name, view) in automata {
        match view.to_json() {
            Ok(json) => write_file(&folder.join(format!("{}.json", name)), &json),
            Err(error) => warn!("Failed to serialize the {}: {}", name, error),
        }
        if save_dot {
            write_file(&folder.join(format!("{}.dot", name)), &view.to_dot());
        }
    }

    match serde_json::to_string_pretty(report) {
        Ok(json) => write_file(&folder.join("report.json"), &json),
        Err(error) => warn!("Failed to serialize the report: {}", error),
    }
    info!("Saved results to {}", folder.display());
}

fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Command::new("regex2dfa")
        .version("0.1")
        .about("Compile regular expressions into minimal DFAs by way of Thompson Construction, Subset Construction and Hopcroft's Algorithm")
        .arg(
            Arg::new("expressions")
                .value_name("EXPRESSIONS FILE")
                .help("A file with one regular expression per line")
                .default_value("regexes.txt")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("tests")
                .short('t')
                .long("tests")
                .value_name("TESTS FILE")
                .help("A file with one test string per line. Lines starting with # are ignored. A built in set of strings is used when the file is missing or empty")
                .default_value("tests.txt")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("OUTPUT DIRECTORY")
                .help("The directory under which a numbered folder is created for every expression")
                .default_value("results")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("epsilon")
                .short('e')
                .long("epsilon")
                .value_name("CHAR")
                .help("The character standing for the empty string inside expressions. Whitespace and operators are not allowed")
                .default_value("ε")
                .value_parser(clap::value_parser!(char)),
        )
        .arg(
            Arg::new("dot")
                .short('d')
                .long("dot")
                .help("Also save every automaton in Graphviz DOT format")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("no-save")
                .long("no-save")
                .help("Only print the results, do not write anything to disk")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    let expressions_path = args
        .get_one::<PathBuf>("expressions")
        .cloned()
        .unwrap_or_else(|| PathBuf::from("regexes.txt"));
    let tests_path = args
        .get_one::<PathBuf>("tests")
        .cloned()
        .unwrap_or_else(|| PathBuf::from("tests.txt"));
    let output_dir = args
        .get_one::<PathBuf>("output")
        .cloned()
        .unwrap_or_else(|| PathBuf::from("results"));
    let epsilon = args
        .get_one::<char>("epsilon")
        .copied()
        .unwrap_or(EPSILON_MARKER);
    let save_dot = args.get_flag("dot");
    let save = !args.get_flag("no-save");

    check_epsilon(epsilon)?;

    let expressions = read_expressions(&expressions_path)?;

    let tests = match read_test_strings(&tests_path) {
        Ok(tests) => tests,
        Err(error) => {
            warn!("{}, falling back to the default test strings", error);
            Vec::new()
        }
    };
    let tests = test_strings_or_default(tests);

    let outcomes = process_batch(&expressions, &tests, epsilon);

    for (index, outcome) in outcomes.iter().enumerate() {
        match outcome {
            ExpressionOutcome::Failed { expression, error } => {
                println!("=== {} ===", expression);
                println!("{}\n", error);
            }
            ExpressionOutcome::Compiled(report) => {
                println!("=== {} ===", report.expression);
                print_report(report);
                println!();

                if save {
                    let folder = output_dir.join(output_folder_name(
                        index,
                        &report.expression,
                        MAX_FOLDER_NAME_LEN,
                    ));
                    save_report(report, &folder, save_dot);
                }
            }
        }
    }

    let failed = outcomes
        .iter()
        .filter(|outcome| matches!(outcome, ExpressionOutcome::Failed { .. }))
        .count();
    info!(
        compiled = outcomes.len() - failed,
        failed, "processed expressions"
    );

    Ok(())
}
