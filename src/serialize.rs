//! Parse table persistence.
//!
//! The table, the automaton item sets and the grammar they were built
//! for are stored together in one versioned JSON document. Unknown
//! versions and unknown fields are rejected rather than skipped, so the
//! format cannot drift silently.

use crate::{
    dfa::{StateID, DFA},
    grammar::{Grammar, GrammarError, NonTerminal, Production, Terminal},
    item::LRItem,
    parse_table::{Action, Actions, ParseTable},
    types::Map,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{
    hash::Hash,
    io::{Read, Write},
};

pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum SerializationError {
    #[error("failed to read or write the table document")]
    Io(#[from] std::io::Error),

    #[error("malformed table document")]
    Malformed(#[from] serde_json::Error),

    #[error("the table document carries no version tag")]
    MissingVersion,

    #[error("unsupported table document version {0}")]
    UnsupportedVersion(u64),

    #[error("the stored grammar is invalid")]
    Grammar(#[from] GrammarError),

    #[error("the table document references {0} out of range")]
    InvalidReference(String),
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct TableDocument<T> {
    version: u32,
    start: NonTerminal,
    end_of_input: T,
    productions: Vec<Production<T>>,
    states: Vec<StateDoc<T>>,
    actions: Vec<ActionDoc<T>>,
    gotos: Vec<GotoDoc>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct StateDoc<T> {
    index: StateID,
    items: Vec<LRItem<T>>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct ActionDoc<T> {
    state: StateID,
    terminal: Terminal<T>,
    actions: Vec<Action>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct GotoDoc {
    state: StateID,
    symbol: NonTerminal,
    target: StateID,
}

/// A table restored from a document, together with the grammar it was
/// built for and the stored item sets of the automaton states.
#[derive(Debug)]
pub struct Loaded<T> {
    pub grammar: Grammar<T>,
    pub table: ParseTable<T>,
    pub states: Vec<(StateID, Vec<LRItem<T>>)>,
}

/// Persist the grammar, automaton states and tables as one document.
pub fn save<T, W>(
    grammar: &Grammar<T>,
    dfa: &DFA<T>,
    table: &ParseTable<T>,
    mut writer: W,
) -> Result<(), SerializationError>
where
    T: Serialize + Clone + Eq + Hash,
    W: Write,
{
    let doc = TableDocument {
        version: FORMAT_VERSION,
        start: grammar.start().clone(),
        end_of_input: grammar.end_of_input().value().clone(),
        productions: grammar.user_rules().cloned().collect(),
        states: dfa
            .states()
            .map(|(index, state)| StateDoc {
                index,
                items: state.items().cloned().collect(),
            })
            .collect(),
        actions: table
            .rows()
            .flat_map(|(state, row)| {
                row.actions().map(move |(terminal, cell)| ActionDoc {
                    state,
                    terminal: terminal.clone(),
                    actions: cell.to_vec(),
                })
            })
            .collect(),
        gotos: table
            .rows()
            .flat_map(|(state, row)| {
                row.gotos().map(move |(symbol, target)| GotoDoc {
                    state,
                    symbol: symbol.clone(),
                    target,
                })
            })
            .collect(),
    };

    serde_json::to_writer_pretty(&mut writer, &doc)?;
    writer.write_all(b"\n")?;
    Ok(())
}

/// Restore a table document written by [`save`].
pub fn load<T, R>(reader: R) -> Result<Loaded<T>, SerializationError>
where
    T: DeserializeOwned + Clone + Eq + Hash,
    R: Read,
{
    // Probe the version tag before committing to the full layout, so a
    // document from a different version fails with the right error.
    let value: serde_json::Value = serde_json::from_reader(reader)?;
    let version = value
        .get("version")
        .and_then(|v| v.as_u64())
        .ok_or(SerializationError::MissingVersion)?;
    if version != u64::from(FORMAT_VERSION) {
        return Err(SerializationError::UnsupportedVersion(version));
    }

    let doc: TableDocument<T> = serde_json::from_value(value)?;
    let grammar = Grammar::new(doc.start, doc.end_of_input, doc.productions)?;

    let state_count = doc.states.len();
    let rule_count = grammar.rules().count();
    let check_state = |id: StateID| {
        if id.index() < state_count {
            Ok(id)
        } else {
            Err(SerializationError::InvalidReference(format!("state {}", id)))
        }
    };

    let mut actions: Vec<Map<Terminal<T>, Actions>> = Vec::new();
    actions.resize_with(state_count, Map::default);
    let mut gotos: Vec<Map<NonTerminal, StateID>> = Vec::new();
    gotos.resize_with(state_count, Map::default);

    for entry in doc.actions {
        let state = check_state(entry.state)?;
        for action in &entry.actions {
            match action {
                Action::Shift(target) => {
                    check_state(*target)?;
                }
                Action::Reduce(rule) => {
                    if rule.index() >= rule_count {
                        return Err(SerializationError::InvalidReference(format!(
                            "rule {}",
                            rule
                        )));
                    }
                }
                Action::Accept => {}
            }
        }
        actions[state.index()].insert(entry.terminal, entry.actions.into_iter().collect());
    }

    for entry in doc.gotos {
        let state = check_state(entry.state)?;
        let target = check_state(entry.target)?;
        gotos[state.index()].insert(entry.symbol, target);
    }

    let rows = actions
        .into_iter()
        .zip(gotos)
        .map(|(actions, gotos)| ParseTable::new_row(actions, gotos))
        .collect();

    Ok(Loaded {
        grammar,
        table: ParseTable::from_rows(rows),
        states: doc
            .states
            .into_iter()
            .map(|state| (state.index, state.items))
            .collect(),
    })
}
