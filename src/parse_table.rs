//! Translation of the LR(1) automaton into ACTION/GOTO tables.

use crate::{
    dfa::{StateID, DFA},
    grammar::{Grammar, GrammarElement, NonTerminal, RuleID, Terminal},
    item::LRItem,
    types::Map,
};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::{fmt, hash::Hash};

/// A single entry of the ACTION table.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    /// Read the lookahead and transition to the specified state.
    Shift(StateID),

    /// Reduce by the specified production rule.
    Reduce(RuleID),

    Accept,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shift(id) => write!(f, "shift({:02})", id),
            Self::Reduce(id) => write!(f, "reduce({})", id),
            Self::Accept => f.write_str("accept"),
        }
    }
}

/// The contents of one ACTION cell. A cell only ever holds more than one
/// entry when the grammar has a conflict there; the inline capacity keeps
/// the conflict-free case off the heap.
pub type Actions = SmallVec<[Action; 2]>;

#[derive(Debug)]
pub struct TableRow<T> {
    actions: Map<Terminal<T>, Actions>,
    gotos: Map<NonTerminal, StateID>,
}

impl<T: Eq + Hash> PartialEq for TableRow<T> {
    fn eq(&self, other: &Self) -> bool {
        self.actions == other.actions && self.gotos == other.gotos
    }
}

impl<T> TableRow<T> {
    pub fn actions(&self) -> impl Iterator<Item = (&Terminal<T>, &[Action])> + '_ {
        self.actions.iter().map(|(t, cell)| (t, &cell[..]))
    }

    pub fn gotos(&self) -> impl Iterator<Item = (&NonTerminal, StateID)> + '_ {
        self.gotos.iter().map(|(n, id)| (n, *id))
    }
}

/// A cell that received more than one action. The assembler records every
/// conflict but still completes the table; resolution is left to the
/// grammar author.
#[derive(Debug, Clone)]
pub struct Conflict<T> {
    pub state: StateID,
    pub terminal: Terminal<T>,
    pub actions: Vec<Action>,
    /// The items of the state that shift on, or reduce under, the terminal.
    pub items: Vec<LRItem<T>>,
}

impl<T> Conflict<T> {
    pub fn display<'g>(&'g self, grammar: &'g Grammar<T>) -> impl fmt::Display + 'g
    where
        T: fmt::Display,
    {
        ConflictDisplay {
            conflict: self,
            grammar,
        }
    }
}

struct ConflictDisplay<'g, T> {
    conflict: &'g Conflict<T>,
    grammar: &'g Grammar<T>,
}

impl<T: fmt::Display> fmt::Display for ConflictDisplay<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Self { conflict, grammar } = self;
        write!(
            f,
            "conflict in state {:02} on `{}`:",
            conflict.state, conflict.terminal
        )?;
        for action in &conflict.actions {
            write!(f, " {}", action)?;
        }
        writeln!(f)?;
        for item in &conflict.items {
            writeln!(f, "  - [{}]", item.display(grammar))?;
        }
        Ok(())
    }
}

/// The ACTION/GOTO tables of a grammar, indexed by the BFS state
/// numbering of the automaton. Read-only once assembled.
#[derive(Debug)]
pub struct ParseTable<T> {
    rows: Vec<TableRow<T>>,
}

impl<T: Eq + Hash> PartialEq for ParseTable<T> {
    fn eq(&self, other: &Self) -> bool {
        self.rows == other.rows
    }
}

impl<T> ParseTable<T>
where
    T: Clone + Eq + Hash,
{
    /// Walk the automaton states in id order and fill the tables: terminal
    /// edges become shifts, nonterminal edges become gotos, reducible
    /// items become reduces (or accept for the augmented rule) under their
    /// lookahead. Conflicted cells are reported alongside the table.
    pub fn generate(grammar: &Grammar<T>, dfa: &DFA<T>) -> (Self, Vec<Conflict<T>>) {
        let mut rows = Vec::with_capacity(dfa.len());
        for (_, state) in dfa.states() {
            let mut actions: Map<Terminal<T>, Actions> = Map::default();
            let mut gotos: Map<NonTerminal, StateID> = Map::default();

            for (symbol, target) in state.edges() {
                match symbol {
                    GrammarElement::Terminal(t) => {
                        actions.entry(t.clone()).or_default().push(Action::Shift(target));
                    }
                    GrammarElement::NonTerminal(n) => {
                        gotos.insert(n.clone(), target);
                    }
                }
            }

            for item in state.items() {
                if !item.is_reducible(grammar) {
                    continue;
                }
                let action = if item.rule() == RuleID::ACCEPT {
                    Action::Accept
                } else {
                    Action::Reduce(item.rule())
                };
                actions.entry(item.lookahead().clone()).or_default().push(action);
            }

            rows.push(TableRow { actions, gotos });
        }

        let table = Self { rows };
        let conflicts = table.collect_conflicts(grammar, dfa);
        if !conflicts.is_empty() {
            tracing::debug!(count = conflicts.len(), "parse table has conflicts");
        }
        (table, conflicts)
    }

    fn collect_conflicts(&self, grammar: &Grammar<T>, dfa: &DFA<T>) -> Vec<Conflict<T>> {
        let mut conflicts = vec![];
        for ((id, state), row) in dfa.states().zip(&self.rows) {
            for (terminal, cell) in &row.actions {
                if cell.len() <= 1 {
                    continue;
                }
                let items = state
                    .items()
                    .filter(|item| match item.next_symbol(grammar) {
                        Some(GrammarElement::Terminal(t)) => t == terminal,
                        _ => item.is_reducible(grammar) && item.lookahead() == terminal,
                    })
                    .cloned()
                    .collect();
                conflicts.push(Conflict {
                    state: id,
                    terminal: terminal.clone(),
                    actions: cell.iter().copied().collect(),
                    items,
                });
            }
        }
        conflicts
    }

    /// The ACTION cell for a state and token value.
    ///
    /// A cell keyed by the exact terminal wins; failing that, a single
    /// negated row whose value differs acts as the default. Several
    /// candidate negated rows match nothing.
    pub fn actions_for(&self, state: StateID, value: &T) -> Option<&[Action]> {
        let row = self.rows.get(state.index())?;
        if let Some(cell) = row.actions.get(&Terminal::new(value.clone())) {
            return Some(cell);
        }

        let mut fallback = None;
        for (t, cell) in &row.actions {
            if t.is_negated() && t.value() != value {
                if fallback.is_some() {
                    return None;
                }
                fallback = Some(&cell[..]);
            }
        }
        fallback
    }

    /// The ACTION cell keyed by this exact terminal, without the
    /// default-terminal fallback. Used when the token definition itself
    /// names a negated terminal.
    pub fn cell(&self, state: StateID, terminal: &Terminal<T>) -> Option<&[Action]> {
        self.rows
            .get(state.index())?
            .actions
            .get(terminal)
            .map(|cell| &cell[..])
    }

    pub fn goto(&self, state: StateID, symbol: &NonTerminal) -> Option<StateID> {
        self.rows.get(state.index())?.gotos.get(symbol).copied()
    }
}

impl<T> ParseTable<T> {
    pub fn rows(&self) -> impl Iterator<Item = (StateID, &TableRow<T>)> + '_ {
        self.rows
            .iter()
            .enumerate()
            .map(|(i, row)| (StateID::from_index(i), row))
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub(crate) fn from_rows(rows: Vec<TableRow<T>>) -> Self {
        Self { rows }
    }

    pub(crate) fn new_row(
        actions: Map<Terminal<T>, Actions>,
        gotos: Map<NonTerminal, StateID>,
    ) -> TableRow<T> {
        TableRow { actions, gotos }
    }
}

impl<T: fmt::Display> fmt::Display for ParseTable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (id, row) in self.rows() {
            writeln!(f, "- {:02}:", id)?;
            for (terminal, cell) in row.actions() {
                write!(f, "  - {} =>", terminal)?;
                for action in cell {
                    write!(f, " {}", action)?;
                }
                writeln!(f)?;
            }
            for (symbol, target) in row.gotos() {
                writeln!(f, "  - {} => goto({:02})", symbol, target)?;
            }
        }
        Ok(())
    }
}
