//! The table-driven shift-reduce parser.

use crate::{
    dfa::StateID,
    grammar::{Grammar, Terminal},
    parse_table::{Action, ParseTable},
    tree::TreeBuilder,
    types::Map,
};
use serde::{Deserialize, Serialize};
use std::{fmt, hash::Hash};

/// A token handed over by the lexical analyzer.
///
/// The lexer terminates its output with a token of the designated
/// end-of-input kind; tokens whose definition is not kept never reach the
/// parser in the first place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token<T> {
    pub kind: T,
    pub text: String,
    pub offset: u64,
}

impl<T> Token<T> {
    pub fn new(kind: T, text: impl Into<String>, offset: u64) -> Self {
        Self {
            kind,
            text: text.into(),
            offset,
        }
    }

    /// The byte width of the matched text.
    pub fn width(&self) -> u64 {
        self.text.len() as u64
    }
}

/// Maps token kinds to the terminals used in productions. Lookup is by
/// exact equality of the kind; a token without a definition is rejected
/// before it can touch the parse stack.
#[derive(Debug, Clone, Default)]
pub struct TokenDefinitions<T> {
    map: Map<T, Terminal<T>>,
}

impl<T> TokenDefinitions<T>
where
    T: Clone + Eq + Hash,
{
    pub fn new() -> Self {
        Self {
            map: Map::default(),
        }
    }

    /// The identity mapping: every non-negated terminal of the grammar
    /// stands for tokens of its own value.
    pub fn from_grammar(grammar: &Grammar<T>) -> Self {
        let mut map = Map::default();
        for terminal in grammar.terminals() {
            if !terminal.is_negated() {
                map.insert(terminal.value().clone(), terminal.clone());
            }
        }
        Self { map }
    }

    pub fn define(&mut self, kind: T, terminal: Terminal<T>) -> &mut Self {
        self.map.insert(kind, terminal);
        self
    }

    pub fn lookup(&self, kind: &T) -> Option<&Terminal<T>> {
        self.map.get(kind)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("unknown token `{kind}` at offset {offset}")]
    UnknownToken { kind: String, offset: u64 },

    #[error("unexpected token `{lookahead}` at offset {offset} (state {state})")]
    Unexpected {
        state: StateID,
        lookahead: String,
        offset: u64,
    },

    #[error("the parse table is unusable in state {state} (offset {offset})")]
    DefectiveTable { state: StateID, offset: u64 },
}

/// The shift-reduce driver. Holds only borrowed, immutable inputs; the
/// parse stack lives inside a single `parse` call.
#[derive(Debug)]
pub struct Parser<'g, T> {
    grammar: &'g Grammar<T>,
    table: &'g ParseTable<T>,
    definitions: &'g TokenDefinitions<T>,
}

impl<'g, T> Parser<'g, T>
where
    T: Clone + Eq + Hash + fmt::Display,
{
    pub fn new(
        grammar: &'g Grammar<T>,
        table: &'g ParseTable<T>,
        definitions: &'g TokenDefinitions<T>,
    ) -> Self {
        Self {
            grammar,
            table,
            definitions,
        }
    }

    /// Drive the tables over a token stream and build the syntax tree.
    ///
    /// The stack holds `(state, node)` pairs with a node-less bottom
    /// entry for the start state. Children of a reduction whose grammar
    /// element is not kept are dropped before the builder runs.
    pub fn parse<I, B>(&self, tokens: I, builder: &mut B) -> Result<B::Node, ParseError>
    where
        I: IntoIterator<Item = Token<T>>,
        B: TreeBuilder<T>,
    {
        let mut stack: Vec<(StateID, Option<B::Node>)> = vec![(StateID::START, None)];
        let mut tokens = tokens.into_iter();
        let mut last_offset = 0;
        let mut lookahead = self.next_token(&mut tokens, &mut last_offset);

        loop {
            let state = stack.last().map(|entry| entry.0).unwrap();
            let terminal = self.terminal_for(&lookahead)?;

            let cell = if terminal.is_negated() {
                self.table.cell(state, terminal)
            } else {
                self.table.actions_for(state, terminal.value())
            };
            let cell = cell.ok_or_else(|| ParseError::Unexpected {
                state,
                lookahead: lookahead.kind.to_string(),
                offset: lookahead.offset,
            })?;
            let action = match cell {
                [action] => *action,
                _ => {
                    return Err(ParseError::DefectiveTable {
                        state,
                        offset: lookahead.offset,
                    })
                }
            };

            match action {
                Action::Shift(next) => {
                    let node = builder.make_terminal_node(terminal, &lookahead);
                    stack.push((next, Some(node)));
                    lookahead = self.next_token(&mut tokens, &mut last_offset);
                }

                Action::Reduce(rule) => {
                    let production = self.grammar.rule(rule);
                    let count = production.rhs().len();
                    // The bottom entry must survive the pop; a table that
                    // reduces deeper than the stack is defective.
                    if stack.len() <= count {
                        return Err(ParseError::DefectiveTable {
                            state,
                            offset: lookahead.offset,
                        });
                    }
                    let popped = stack.split_off(stack.len() - count);

                    let mut children = Vec::with_capacity(count);
                    for ((_, node), element) in popped.into_iter().zip(production.rhs()) {
                        if !element.is_kept() {
                            continue;
                        }
                        if let Some(node) = node {
                            children.push(node);
                        }
                    }

                    let current = stack.last().map(|entry| entry.0).unwrap();
                    let target =
                        self.table
                            .goto(current, production.lhs())
                            .ok_or(ParseError::DefectiveTable {
                                state: current,
                                offset: lookahead.offset,
                            })?;
                    let node = builder.make_nonterminal_node(production, children);
                    stack.push((target, Some(node)));
                }

                Action::Accept => {
                    return match stack.pop() {
                        Some((_, Some(node))) => Ok(node),
                        _ => Err(ParseError::DefectiveTable {
                            state,
                            offset: lookahead.offset,
                        }),
                    };
                }
            }
        }
    }

    fn terminal_for(&self, token: &Token<T>) -> Result<&'g Terminal<T>, ParseError> {
        if token.kind == *self.grammar.end_of_input().value() {
            return Ok(self.grammar.end_of_input());
        }
        self.definitions
            .lookup(&token.kind)
            .ok_or_else(|| ParseError::UnknownToken {
                kind: token.kind.to_string(),
                offset: token.offset,
            })
    }

    /// An exhausted lexer acts as the implicit end-of-input terminator.
    fn next_token<I>(&self, tokens: &mut I, last_offset: &mut u64) -> Token<T>
    where
        I: Iterator<Item = Token<T>>,
    {
        match tokens.next() {
            Some(token) => {
                *last_offset = token.offset + token.width();
                token
            }
            None => Token::new(
                self.grammar.end_of_input().value().clone(),
                "",
                *last_offset,
            ),
        }
    }
}
