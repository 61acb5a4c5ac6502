use anyhow::Context as _;
use canlr::{
    dfa::DFA,
    grammar::{Grammar, GrammarElement, NonTerminal, Production, Terminal},
    parse_table::ParseTable,
    parser::{self, ParseError, Token, TokenDefinitions},
    serialize::{self, Loaded},
    tree::SyntaxTreeBuilder,
};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::{
    fs,
    io::{BufReader, BufWriter},
    path::{Path, PathBuf},
    process::ExitCode,
};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Build the ACTION/GOTO tables for a grammar and persist them.
    ///
    /// Conflicts are printed to stderr; the table is written regardless.
    /// Exits with 0 when the grammar is conflict-free, 2 otherwise.
    BuildTable {
        /// The path of the grammar description file.
        grammar: PathBuf,

        /// Where to write the table document.
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Parse a token stream with a previously built table.
    ///
    /// Exits with 0 on success, 1 on a parse error and 2 on a
    /// serialization or table-internal error.
    Parse {
        /// The path of the table document.
        table: PathBuf,

        /// The path of the token stream (a JSON list of tokens).
        tokens: PathBuf,
    },
}

/// The on-disk grammar description, with `keep`/`negated` defaulting to
/// the common case.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct GrammarFile {
    start: String,
    end_of_input: String,
    productions: Vec<ProductionFile>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ProductionFile {
    lhs: String,
    rhs: Vec<SymbolFile>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "snake_case")]
enum SymbolFile {
    Terminal {
        value: String,
        #[serde(default = "default_keep")]
        keep: bool,
        #[serde(default)]
        negated: bool,
    },
    Nonterminal {
        name: String,
        #[serde(default = "default_keep")]
        keep: bool,
    },
}

fn default_keep() -> bool {
    true
}

impl SymbolFile {
    fn into_element(self) -> GrammarElement<String> {
        match self {
            Self::Terminal {
                value,
                keep,
                negated,
            } => {
                let mut terminal = if negated {
                    Terminal::negated(value)
                } else {
                    Terminal::new(value)
                };
                if !keep {
                    terminal = terminal.discard();
                }
                GrammarElement::Terminal(terminal)
            }
            Self::Nonterminal { name, keep } => {
                let mut symbol = NonTerminal::new(name);
                if !keep {
                    symbol = symbol.discard();
                }
                GrammarElement::NonTerminal(symbol)
            }
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    tracing::debug!("parsed CLI args = {:?}", args);

    let result = match &args.command {
        Command::BuildTable { grammar, output } => build_table(grammar, output),
        Command::Parse { table, tokens } => parse(table, tokens),
    };

    match result {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {:#}", err);
            ExitCode::from(2)
        }
    }
}

fn build_table(grammar_path: &Path, output: &Path) -> anyhow::Result<ExitCode> {
    let text = fs::read_to_string(grammar_path).with_context(|| {
        format!(
            "failed to read the grammar description from {}",
            grammar_path.display()
        )
    })?;
    let file: GrammarFile =
        serde_json::from_str(&text).context("failed to parse the grammar description")?;

    let productions: Vec<Production<String>> = file
        .productions
        .into_iter()
        .map(|rule| {
            Production::new(
                NonTerminal::new(rule.lhs),
                rule.rhs.into_iter().map(SymbolFile::into_element),
            )
        })
        .collect();
    let grammar = Grammar::new(NonTerminal::new(file.start), file.end_of_input, productions)
        .context("invalid grammar")?;

    let dfa = DFA::generate(&grammar);
    let (table, conflicts) = ParseTable::generate(&grammar, &dfa);
    for conflict in &conflicts {
        eprint!("{}", conflict.display(&grammar));
    }

    let out = fs::File::create(output)
        .with_context(|| format!("failed to create {}", output.display()))?;
    serialize::save(&grammar, &dfa, &table, BufWriter::new(out))
        .context("failed to write the table document")?;
    tracing::info!(
        states = dfa.len(),
        conflicts = conflicts.len(),
        "wrote {}",
        output.display()
    );

    Ok(if conflicts.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(2)
    })
}

fn parse(table_path: &Path, tokens_path: &Path) -> anyhow::Result<ExitCode> {
    let table_file = fs::File::open(table_path)
        .with_context(|| format!("failed to open {}", table_path.display()))?;
    let loaded: Loaded<String> = match serialize::load(BufReader::new(table_file)) {
        Ok(loaded) => loaded,
        Err(err) => {
            eprintln!("error: {:#}", anyhow::Error::from(err));
            return Ok(ExitCode::from(2));
        }
    };

    let text = fs::read_to_string(tokens_path).with_context(|| {
        format!(
            "failed to read the token stream from {}",
            tokens_path.display()
        )
    })?;
    let tokens: Vec<Token<String>> =
        serde_json::from_str(&text).context("failed to parse the token stream")?;

    let definitions = TokenDefinitions::from_grammar(&loaded.grammar);
    let driver = parser::Parser::new(&loaded.grammar, &loaded.table, &definitions);
    let mut builder = SyntaxTreeBuilder::new();

    match driver.parse(tokens, &mut builder) {
        Ok(root) => {
            println!("{}", builder.tree(root));
            Ok(ExitCode::SUCCESS)
        }
        Err(err @ ParseError::DefectiveTable { .. }) => {
            eprintln!("error: {}", err);
            Ok(ExitCode::from(2))
        }
        Err(err) => {
            eprintln!("error: {}", err);
            Ok(ExitCode::from(1))
        }
    }
}
