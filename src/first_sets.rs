//! Calculation of nullable and FIRST set functions.

use crate::{
    grammar::{Grammar, GrammarElement, NonTerminal, RuleID, Terminal},
    item::LRItem,
    types::{Map, Set},
};
use std::hash::Hash;

#[derive(Debug)]
pub struct FirstSets<T> {
    nulls: Set<NonTerminal>,
    map: Map<NonTerminal, Set<Terminal<T>>>,
}

impl<T> FirstSets<T>
where
    T: Clone + Eq + Hash,
{
    pub fn new(grammar: &Grammar<T>) -> Self {
        let nulls = nulls_set(grammar);
        let map = first_set(grammar, &nulls);
        Self { nulls, map }
    }

    pub fn is_nullable(&self, symbol: &GrammarElement<T>) -> bool {
        match symbol {
            GrammarElement::Terminal(..) => false,
            GrammarElement::NonTerminal(n) => self.nulls.contains(n),
        }
    }

    /// `First(X)` for a single symbol.
    pub fn first(&self, symbol: &GrammarElement<T>) -> Set<Terminal<T>> {
        match symbol {
            GrammarElement::Terminal(t) => Some(t.clone()).into_iter().collect(),
            GrammarElement::NonTerminal(n) => self.map.get(n).cloned().unwrap_or_default(),
        }
    }

    /// `First(prefix lookahead)`: the lookahead stands in wherever the
    /// whole prefix derives epsilon.
    pub fn first_of_sequence(
        &self,
        prefix: &[GrammarElement<T>],
        lookahead: &Terminal<T>,
    ) -> Set<Terminal<T>> {
        let mut res = Set::default();
        for symbol in prefix {
            match symbol {
                GrammarElement::Terminal(t) => {
                    res.insert(t.clone());
                    return res;
                }
                GrammarElement::NonTerminal(n) => {
                    if let Some(first) = self.map.get(n) {
                        res.extend(first.iter().cloned());
                    }
                    if !self.nulls.contains(n) {
                        return res;
                    }
                }
            }
        }
        res.insert(lookahead.clone());
        res
    }

    /// The terminals that may follow `item` once it reduces: for
    /// `A : α • B β  [a]` this is `First(β a)`.
    pub fn follow(&self, grammar: &Grammar<T>, item: &LRItem<T>) -> Set<Terminal<T>> {
        let rhs = item.production(grammar).rhs();
        let beta = &rhs[(item.dot() + 1).min(rhs.len())..];
        self.first_of_sequence(beta, item.lookahead())
    }
}

/// Calculate the set of nullable symbols in this grammar.
fn nulls_set<T>(grammar: &Grammar<T>) -> Set<NonTerminal>
where
    T: Clone + Eq + Hash,
{
    let mut nulls: Set<NonTerminal> = grammar
        .rules()
        .filter(|(_, rule)| rule.rhs().is_empty())
        .map(|(_, rule)| rule.lhs().clone())
        .collect();

    let mut changed = true;
    while changed {
        changed = false;
        for (_, rule) in grammar.rules() {
            if nulls.contains(rule.lhs()) {
                continue;
            }
            let is_rhs_nullable = rule
                .rhs()
                .iter()
                .all(|s| matches!(s, GrammarElement::NonTerminal(n) if nulls.contains(n)));
            if is_rhs_nullable {
                changed = true;
                nulls.insert(rule.lhs().clone());
            }
        }
    }

    nulls
}

/// Solve the FIRST sets of all nonterminals by fixed-point iteration.
fn first_set<T>(
    grammar: &Grammar<T>,
    nulls: &Set<NonTerminal>,
) -> Map<NonTerminal, Set<Terminal<T>>>
where
    T: Clone + Eq + Hash,
{
    let mut map: Map<NonTerminal, Set<Terminal<T>>> = Map::default();
    for symbol in grammar.nonterminals() {
        map.insert(symbol.clone(), Set::default());
    }

    // For a rule X : Y1 Y2 ... Yn, walk Y1, Y2, ... up to and including
    // the first non-nullable symbol Yk; each of Y1..=Yk contributes the
    // constraint First(X) ⊇ First(Yi).
    struct Constraint<'g, T> {
        sup: &'g NonTerminal,
        sub: &'g GrammarElement<T>,
    }
    let mut constraints = vec![];
    for (id, rule) in grammar.rules() {
        if id == RuleID::ACCEPT {
            continue;
        }
        for symbol in rule.rhs() {
            if !matches!(symbol, GrammarElement::NonTerminal(n) if n == rule.lhs()) {
                constraints.push(Constraint {
                    sup: rule.lhs(),
                    sub: symbol,
                });
            }
            if !matches!(symbol, GrammarElement::NonTerminal(n) if nulls.contains(n)) {
                break;
            }
        }
    }

    // Iterating until no set grows handles left recursion and mutual
    // reference; sets only ever gain elements.
    let mut changed = true;
    while changed {
        changed = false;

        for Constraint { sup, sub } in &constraints {
            match sub {
                GrammarElement::Terminal(t) => {
                    let superset = map.get_mut(*sup).expect("lhs registered above");
                    changed |= superset.insert(t.clone());
                }
                GrammarElement::NonTerminal(n) => {
                    let subset = map.get(n).cloned().unwrap_or_default();
                    let superset = map.get_mut(*sup).expect("lhs registered above");
                    for tok in subset {
                        changed |= superset.insert(tok);
                    }
                }
            }
        }
    }

    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::Production;

    fn t(value: &'static str) -> GrammarElement<&'static str> {
        GrammarElement::Terminal(Terminal::new(value))
    }

    fn n(name: &'static str) -> GrammarElement<&'static str> {
        GrammarElement::NonTerminal(NonTerminal::new(name))
    }

    fn rule(
        lhs: &'static str,
        rhs: Vec<GrammarElement<&'static str>>,
    ) -> Production<&'static str> {
        Production::new(NonTerminal::new(lhs), rhs)
    }

    #[test]
    fn left_recursive_first() {
        // L : L , id | id
        let g = Grammar::new(
            NonTerminal::new("L"),
            "$",
            vec![
                rule("L", vec![n("L"), t(","), t("id")]),
                rule("L", vec![t("id")]),
            ],
        )
        .unwrap();
        let first = FirstSets::new(&g);

        assert!(!first.is_nullable(&n("L")));
        assert_eq!(
            first.first(&n("L")),
            Some(Terminal::new("id")).into_iter().collect::<Set<_>>()
        );
    }

    #[test]
    fn nullable_chain() {
        // S : ( S ) | ε
        let g = Grammar::new(
            NonTerminal::new("S"),
            "$",
            vec![rule("S", vec![t("("), n("S"), t(")")]), rule("S", vec![])],
        )
        .unwrap();
        let first = FirstSets::new(&g);

        assert!(first.is_nullable(&n("S")));
        assert_eq!(
            first.first(&n("S")),
            Some(Terminal::new("(")).into_iter().collect::<Set<_>>()
        );
    }

    #[test]
    fn sequence_substitutes_lookahead_through_nullable_prefix() {
        let g = Grammar::new(
            NonTerminal::new("S"),
            "$",
            vec![rule("S", vec![t("("), n("S"), t(")")]), rule("S", vec![])],
        )
        .unwrap();
        let first = FirstSets::new(&g);

        // S is nullable, so First(S x) = First(S) ∪ {x}.
        let got = first.first_of_sequence(&[n("S")], &Terminal::new("x"));
        let want: Set<_> = [Terminal::new("("), Terminal::new("x")].into_iter().collect();
        assert_eq!(got, want);

        // An empty sequence is just the lookahead.
        let got = first.first_of_sequence(&[], &Terminal::new("$"));
        assert_eq!(got, Some(Terminal::new("$")).into_iter().collect::<Set<_>>());
    }

    #[test]
    fn follow_of_item() {
        let g = Grammar::new(
            NonTerminal::new("S"),
            "$",
            vec![rule("S", vec![t("("), n("S"), t(")")]), rule("S", vec![])],
        )
        .unwrap();
        let first = FirstSets::new(&g);

        // S : ( • S )  [$]  →  follow = First( ) $ ) = { ) }
        let (id, _) = g.rules().nth(1).unwrap();
        let item = LRItem::start_of(id, Terminal::new("$")).shifted();
        assert_eq!(
            first.follow(&g, &item),
            Some(Terminal::new(")")).into_iter().collect::<Set<_>>()
        );

        // At the end of the body the follow set is the lookahead alone.
        let end = item.shifted().shifted();
        assert_eq!(
            first.follow(&g, &end),
            Some(Terminal::new("$")).into_iter().collect::<Set<_>>()
        );
    }

    #[test]
    fn fixed_point_is_stable() {
        let g = Grammar::new(
            NonTerminal::new("E"),
            "$",
            vec![
                rule("E", vec![n("E"), t("+"), n("T")]),
                rule("E", vec![n("T")]),
                rule("T", vec![t("id")]),
            ],
        )
        .unwrap();
        let a = FirstSets::new(&g);
        let b = FirstSets::new(&g);
        assert_eq!(a.first(&n("E")), b.first(&n("E")));
        assert_eq!(a.first(&n("T")), b.first(&n("T")));
    }
}
