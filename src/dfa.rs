//! Canonical LR(1) automaton construction.

use crate::{
    first_sets::FirstSets,
    grammar::{Grammar, GrammarElement, RuleID},
    item::{canonical_hash, ItemSet, LRItem},
    types::Map,
};
use serde::{Deserialize, Serialize};
use std::{collections::VecDeque, fmt, hash::Hash};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct StateID {
    raw: u32,
}

impl StateID {
    /// The start state, holding `S' : • start  [$]`.
    pub const START: Self = Self::new(0);

    #[inline]
    const fn new(raw: u32) -> Self {
        Self { raw }
    }

    pub(crate) fn from_index(index: usize) -> Self {
        assert!(index <= u32::MAX as usize, "too many states");
        Self::new(index as u32)
    }

    pub(crate) fn index(self) -> usize {
        self.raw as usize
    }
}

impl fmt::Display for StateID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.raw, f)
    }
}

/// A node of the automaton: a closed LR(1) item set plus its labelled
/// transitions. There is at most one outgoing edge per symbol.
#[derive(Debug)]
pub struct State<T> {
    items: ItemSet<T>,
    edges: Map<GrammarElement<T>, StateID>,
}

impl<T> State<T> {
    pub fn items(&self) -> impl Iterator<Item = &LRItem<T>> + '_ {
        self.items.iter()
    }

    pub fn item_set(&self) -> &ItemSet<T> {
        &self.items
    }

    pub fn edges(&self) -> impl Iterator<Item = (&GrammarElement<T>, StateID)> + '_ {
        self.edges.iter().map(|(symbol, id)| (symbol, *id))
    }
}

/// The canonical collection of LR(1) item sets for a grammar.
///
/// States are numbered in breadth-first discovery order from the start
/// state; the same grammar always yields the same numbering.
#[derive(Debug)]
pub struct DFA<T> {
    states: Vec<State<T>>,
}

impl<T> DFA<T>
where
    T: Clone + Eq + Hash,
{
    pub fn generate(grammar: &Grammar<T>) -> Self {
        DFAGenerator {
            grammar,
            first_sets: FirstSets::new(grammar),
            states: vec![],
            index: Map::default(),
            pending: VecDeque::new(),
        }
        .generate()
    }
}

impl<T> DFA<T> {
    pub fn states(&self) -> impl Iterator<Item = (StateID, &State<T>)> + '_ {
        self.states
            .iter()
            .enumerate()
            .map(|(i, state)| (StateID::from_index(i), state))
    }

    pub fn state(&self, id: StateID) -> &State<T> {
        &self.states[id.index()]
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn display<'g>(&'g self, grammar: &'g Grammar<T>) -> impl fmt::Display + 'g
    where
        T: fmt::Display,
    {
        DFADisplay { dfa: self, grammar }
    }
}

struct DFADisplay<'g, T> {
    dfa: &'g DFA<T>,
    grammar: &'g Grammar<T>,
}

impl<T: fmt::Display> fmt::Display for DFADisplay<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (id, state) in self.dfa.states() {
            writeln!(f, "- {:02}:", id)?;
            writeln!(f, "  item_set:")?;
            for item in state.items() {
                writeln!(f, "  - [{}]", item.display(self.grammar))?;
            }
            if !state.edges.is_empty() {
                writeln!(f, "  edges:")?;
                for (symbol, target) in state.edges() {
                    writeln!(f, "  - {} -> {:02}", symbol, target)?;
                }
            }
        }
        Ok(())
    }
}

/// Expand an item set to its closure.
///
/// For every `A : α • B β  [a]` with nonterminal `B`, the items
/// `B : • γ  [b]` are added for each production of `B` and each
/// `b ∈ First(β a)`. Newly added items are processed off a work list
/// rather than re-scanning the whole set; the set itself deduplicates.
pub fn closure<T>(
    grammar: &Grammar<T>,
    first_sets: &FirstSets<T>,
    mut items: ItemSet<T>,
) -> ItemSet<T>
where
    T: Clone + Eq + Hash,
{
    let mut queue: VecDeque<LRItem<T>> = items.iter().cloned().collect();
    while let Some(item) = queue.pop_front() {
        let symbol = match item.next_symbol(grammar) {
            Some(GrammarElement::NonTerminal(n)) => n.clone(),
            _ => continue,
        };
        let lookaheads = first_sets.follow(grammar, &item);
        for (rule, _) in grammar.rules_for(&symbol) {
            for lookahead in &lookaheads {
                let new_item = LRItem::start_of(rule, lookahead.clone());
                if items.insert(new_item.clone()) {
                    queue.push_back(new_item);
                }
            }
        }
    }
    items
}

#[derive(Debug)]
struct DFAGenerator<'g, T> {
    grammar: &'g Grammar<T>,
    first_sets: FirstSets<T>,
    states: Vec<State<T>>,
    // Buckets of candidate states by order-independent item-set hash;
    // full set equality decides within a bucket.
    index: Map<u64, Vec<StateID>>,
    pending: VecDeque<StateID>,
}

impl<T> DFAGenerator<'_, T>
where
    T: Clone + Eq + Hash,
{
    fn generate(mut self) -> DFA<T> {
        let start_item = LRItem::start_of(RuleID::ACCEPT, self.grammar.end_of_input().clone());
        let start_set = closure(
            self.grammar,
            &self.first_sets,
            Some(start_item).into_iter().collect(),
        );
        self.intern(start_set);

        while let Some(id) = self.pending.pop_front() {
            let mut edges = Map::default();
            for (symbol, kernel) in self.extract_transitions(id) {
                let target_set = closure(self.grammar, &self.first_sets, kernel);
                let target = self.intern(target_set);
                edges.insert(symbol, target);
            }
            self.states[id.index()].edges = edges;
        }

        tracing::debug!(states = self.states.len(), "generated LR(1) automaton");
        DFA {
            states: self.states,
        }
    }

    /// Group the kernels of the successor sets by the symbol after the
    /// marker, in first-occurrence order.
    fn extract_transitions(&self, id: StateID) -> Map<GrammarElement<T>, ItemSet<T>> {
        let mut kernels: Map<GrammarElement<T>, ItemSet<T>> = Map::default();
        for item in self.states[id.index()].items() {
            let label = match item.next_symbol(self.grammar) {
                Some(symbol) => symbol.clone(),
                None => continue,
            };
            kernels.entry(label).or_default().insert(item.shifted());
        }
        kernels
    }

    /// Map a closed item set to its state, creating and enqueueing a new
    /// state when the set has not been seen before.
    fn intern(&mut self, items: ItemSet<T>) -> StateID {
        let hash = canonical_hash(&items);
        if let Some(ids) = self.index.get(&hash) {
            for &id in ids {
                if self.states[id.index()].items == items {
                    return id;
                }
            }
        }

        let id = StateID::from_index(self.states.len());
        self.states.push(State {
            items,
            edges: Map::default(),
        });
        self.index.entry(hash).or_default().push(id);
        self.pending.push_back(id);
        id
    }
}
