//! LR(1) items and item sets.

use crate::{
    grammar::{Grammar, GrammarElement, Production, RuleID, Terminal},
    types::Set,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{BuildHasher, BuildHasherDefault, Hash};

/// A production with a marker position and a lookahead terminal.
///
/// The production is referenced by its `RuleID`; since productions are
/// value-deduplicated at grammar construction, equality over
/// `(rule, dot, lookahead)` coincides with structural equality over the
/// dotted production plus lookahead.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LRItem<T> {
    rule: RuleID,
    dot: usize,
    lookahead: Terminal<T>,
}

impl<T> LRItem<T> {
    /// The item `lhs : • rhs  [lookahead]`.
    pub fn start_of(rule: RuleID, lookahead: Terminal<T>) -> Self {
        Self {
            rule,
            dot: 0,
            lookahead,
        }
    }

    /// A copy of this item with the marker advanced over one symbol.
    pub fn shifted(&self) -> Self
    where
        T: Clone,
    {
        Self {
            rule: self.rule,
            dot: self.dot + 1,
            lookahead: self.lookahead.clone(),
        }
    }

    pub fn rule(&self) -> RuleID {
        self.rule
    }

    pub fn dot(&self) -> usize {
        self.dot
    }

    pub fn lookahead(&self) -> &Terminal<T> {
        &self.lookahead
    }

    pub fn production<'g>(&self, grammar: &'g Grammar<T>) -> &'g Production<T> {
        grammar.rule(self.rule)
    }

    /// Whether the marker has reached the end of the production body.
    ///
    /// An item over an epsilon production is reducible at `dot == 0`.
    pub fn is_reducible(&self, grammar: &Grammar<T>) -> bool {
        self.dot == grammar.rule(self.rule).rhs().len()
    }

    /// The symbol immediately after the marker, if any.
    pub fn next_symbol<'g>(&self, grammar: &'g Grammar<T>) -> Option<&'g GrammarElement<T>> {
        grammar.rule(self.rule).rhs().get(self.dot)
    }

    /// The symbol one past the next one, if any.
    pub fn symbol_after_next<'g>(&self, grammar: &'g Grammar<T>) -> Option<&'g GrammarElement<T>> {
        grammar.rule(self.rule).rhs().get(self.dot + 1)
    }

    pub fn display<'g>(&'g self, grammar: &'g Grammar<T>) -> impl fmt::Display + 'g
    where
        T: fmt::Display,
    {
        ItemDisplay {
            item: self,
            grammar,
        }
    }
}

struct ItemDisplay<'g, T> {
    item: &'g LRItem<T>,
    grammar: &'g Grammar<T>,
}

impl<T: fmt::Display> fmt::Display for ItemDisplay<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Self { item, grammar } = self;
        let rule = grammar.rule(item.rule);
        write!(f, "{} :", rule.lhs())?;
        for (i, symbol) in rule.rhs().iter().enumerate() {
            if i == item.dot {
                f.write_str(" .")?;
            }
            write!(f, " {}", symbol)?;
        }
        if item.dot == rule.rhs().len() {
            f.write_str(" .")?;
        }
        write!(f, "  [{}]", item.lookahead)
    }
}

/// An unordered set of LR(1) items; equality is set equality.
pub type ItemSet<T> = Set<LRItem<T>>;

/// An order-independent hash of an item set, used to bucket candidate
/// states during deduplication. Full set equality decides within a bucket.
pub fn canonical_hash<T: Hash>(items: &ItemSet<T>) -> u64 {
    let hasher = BuildHasherDefault::<rustc_hash::FxHasher>::default();
    items
        .iter()
        .fold(0u64, |acc, item| acc.wrapping_add(hasher.hash_one(item)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::NonTerminal;

    fn grammar() -> Grammar<&'static str> {
        Grammar::new(
            NonTerminal::new("S"),
            "$",
            vec![
                Production::new(
                    NonTerminal::new("S"),
                    [
                        GrammarElement::Terminal(Terminal::new("(")),
                        GrammarElement::NonTerminal(NonTerminal::new("S")),
                        GrammarElement::Terminal(Terminal::new(")")),
                    ],
                ),
                Production::new(NonTerminal::new("S"), []),
            ],
        )
        .unwrap()
    }

    #[test]
    fn marker_movement() {
        let g = grammar();
        let (rule, _) = g.rules().nth(1).unwrap();
        let item = LRItem::start_of(rule, Terminal::new("$"));

        assert_eq!(
            item.next_symbol(&g),
            Some(&GrammarElement::Terminal(Terminal::new("(")))
        );
        assert_eq!(
            item.symbol_after_next(&g),
            Some(&GrammarElement::NonTerminal(NonTerminal::new("S")))
        );
        assert!(!item.is_reducible(&g));

        let end = item.shifted().shifted().shifted();
        assert!(end.is_reducible(&g));
        assert_eq!(end.next_symbol(&g), None);
    }

    #[test]
    fn epsilon_item_is_reducible() {
        let g = grammar();
        let (rule, _) = g.rules().nth(2).unwrap();
        let item = LRItem::start_of(rule, Terminal::new(")"));
        assert!(item.is_reducible(&g));
        assert_eq!(item.dot(), 0);
    }

    #[test]
    fn canonical_hash_ignores_insertion_order() {
        let g = grammar();
        let (r1, _) = g.rules().nth(1).unwrap();
        let (r2, _) = g.rules().nth(2).unwrap();
        let a = LRItem::start_of(r1, Terminal::new("$"));
        let b = LRItem::start_of(r2, Terminal::new(")"));

        let fwd: ItemSet<_> = [a.clone(), b.clone()].into_iter().collect();
        let rev: ItemSet<_> = [b, a].into_iter().collect();
        assert_eq!(canonical_hash(&fwd), canonical_hash(&rev));
        assert_eq!(fwd, rev);
    }
}
