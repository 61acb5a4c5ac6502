//! Grammar types.

use crate::types::Set;
use serde::{Deserialize, Serialize};
use std::{
    borrow::Cow,
    fmt,
    hash::{Hash, Hasher},
};

/// The reserved name of the augmented start symbol.
pub const AUGMENTED_START: &str = "S'";

/// A terminal symbol, identified by its token-type value.
///
/// `keep` controls whether the matched token is retained as a child when
/// the tree is assembled; it never participates in equality or hashing.
/// A `negated` terminal matches any terminal other than its value and is
/// only consulted when no exact row matches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Terminal<T> {
    value: T,
    keep: bool,
    negated: bool,
}

impl<T> Terminal<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            keep: true,
            negated: false,
        }
    }

    /// A terminal matching any token value other than `value`.
    pub fn negated(value: T) -> Self {
        Self {
            value,
            keep: true,
            negated: true,
        }
    }

    /// Mark the matched token to be dropped during tree assembly.
    pub fn discard(mut self) -> Self {
        self.keep = false;
        self
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn is_kept(&self) -> bool {
        self.keep
    }

    pub fn is_negated(&self) -> bool {
        self.negated
    }
}

impl<T: PartialEq> PartialEq for Terminal<T> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value && self.negated == other.negated
    }
}

impl<T: Eq> Eq for Terminal<T> {}

impl<T: Hash> Hash for Terminal<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.hash(state);
        self.negated.hash(state);
    }
}

impl<T: fmt::Display> fmt::Display for Terminal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negated {
            write!(f, "!{}", self.value)
        } else {
            fmt::Display::fmt(&self.value, f)
        }
    }
}

/// A nonterminal symbol, identified by its name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NonTerminal {
    name: Cow<'static, str>,
    keep: bool,
}

impl NonTerminal {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            name: name.into(),
            keep: true,
        }
    }

    pub(crate) fn augmented_start() -> Self {
        Self::new(AUGMENTED_START)
    }

    /// Mark the matched subtree to be dropped during tree assembly.
    pub fn discard(mut self) -> Self {
        self.keep = false;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_kept(&self) -> bool {
        self.keep
    }
}

impl PartialEq for NonTerminal {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for NonTerminal {}

impl Hash for NonTerminal {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl fmt::Display for NonTerminal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// A symbol occurring on the right-hand side of a production.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GrammarElement<T> {
    Terminal(Terminal<T>),
    NonTerminal(NonTerminal),
}

impl<T> GrammarElement<T> {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminal(..))
    }

    pub fn as_terminal(&self) -> Option<&Terminal<T>> {
        match self {
            Self::Terminal(t) => Some(t),
            Self::NonTerminal(..) => None,
        }
    }

    pub fn as_nonterminal(&self) -> Option<&NonTerminal> {
        match self {
            Self::Terminal(..) => None,
            Self::NonTerminal(n) => Some(n),
        }
    }

    pub fn is_kept(&self) -> bool {
        match self {
            Self::Terminal(t) => t.is_kept(),
            Self::NonTerminal(n) => n.is_kept(),
        }
    }
}

impl<T> From<Terminal<T>> for GrammarElement<T> {
    fn from(t: Terminal<T>) -> Self {
        Self::Terminal(t)
    }
}

impl<T> From<NonTerminal> for GrammarElement<T> {
    fn from(n: NonTerminal) -> Self {
        Self::NonTerminal(n)
    }
}

impl<T: fmt::Display> fmt::Display for GrammarElement<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Terminal(t) => fmt::Display::fmt(t, f),
            Self::NonTerminal(n) => fmt::Display::fmt(n, f),
        }
    }
}

/// The type that represents a production rule in grammar.
///
/// An empty right-hand side is an epsilon production.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Production<T> {
    lhs: NonTerminal,
    rhs: Vec<GrammarElement<T>>,
}

impl<T> Production<T> {
    pub fn new<I>(lhs: NonTerminal, rhs: I) -> Self
    where
        I: IntoIterator<Item = GrammarElement<T>>,
    {
        Self {
            lhs,
            rhs: rhs.into_iter().collect(),
        }
    }

    pub fn lhs(&self) -> &NonTerminal {
        &self.lhs
    }

    pub fn rhs(&self) -> &[GrammarElement<T>] {
        &self.rhs
    }
}

impl<T: fmt::Display> fmt::Display for Production<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} :", self.lhs)?;
        for symbol in &self.rhs {
            write!(f, " {}", symbol)?;
        }
        Ok(())
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct RuleID {
    raw: u32,
}

impl RuleID {
    /// Reserved ID of the augmented production `S' : <start-symbol>`.
    pub const ACCEPT: Self = Self::new(0);

    #[inline]
    const fn new(raw: u32) -> Self {
        Self { raw }
    }

    pub(crate) fn from_index(index: usize) -> Self {
        assert!(index <= u32::MAX as usize, "too many rules");
        Self::new(index as u32)
    }

    pub(crate) fn index(self) -> usize {
        self.raw as usize
    }
}

impl fmt::Display for RuleID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.raw, f)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GrammarError {
    #[error("the grammar must contain at least one production")]
    EmptyProductions,

    #[error("symbol names must not be empty")]
    EmptyName,

    #[error("the name `S'` is reserved for the augmented start symbol")]
    ReservedStartName,

    #[error("the end-of-input terminal must not appear in a production body (rule {rule})")]
    EndOfInputInBody { rule: usize },

    #[error("duplicate production: {0}")]
    DuplicateProduction(String),
}

/// The grammar definition used to derive the parser tables.
///
/// Immutable once constructed; the augmented production `S' : start` is
/// stored at index 0.
#[derive(Debug, Clone)]
pub struct Grammar<T> {
    productions: Vec<Production<T>>,
    start: NonTerminal,
    end_of_input: Terminal<T>,
    terminals: Set<Terminal<T>>,
    nonterminals: Set<NonTerminal>,
}

impl<T: Eq + Hash> PartialEq for Grammar<T> {
    fn eq(&self, other: &Self) -> bool {
        self.productions == other.productions
            && self.start == other.start
            && self.end_of_input == other.end_of_input
            && self.terminals == other.terminals
            && self.nonterminals == other.nonterminals
    }
}

impl<T> Grammar<T>
where
    T: Clone + Eq + Hash,
{
    /// Construct the augmented grammar from a start symbol, the designated
    /// end-of-input token value and the user productions.
    pub fn new<I>(start: NonTerminal, end_of_input: T, productions: I) -> Result<Self, GrammarError>
    where
        I: IntoIterator<Item = Production<T>>,
    {
        let user_rules: Vec<Production<T>> = productions.into_iter().collect();
        if user_rules.is_empty() {
            return Err(GrammarError::EmptyProductions);
        }
        if start.name().is_empty() {
            return Err(GrammarError::EmptyName);
        }
        if start.name() == AUGMENTED_START {
            return Err(GrammarError::ReservedStartName);
        }

        let end_of_input = Terminal::new(end_of_input);

        for (i, rule) in user_rules.iter().enumerate() {
            if rule.lhs().name().is_empty() {
                return Err(GrammarError::EmptyName);
            }
            if rule.lhs().name() == AUGMENTED_START {
                return Err(GrammarError::ReservedStartName);
            }
            for symbol in rule.rhs() {
                match symbol {
                    GrammarElement::Terminal(t) => {
                        if t == &end_of_input {
                            return Err(GrammarError::EndOfInputInBody { rule: i });
                        }
                    }
                    GrammarElement::NonTerminal(n) => {
                        if n.name().is_empty() {
                            return Err(GrammarError::EmptyName);
                        }
                        if n.name() == AUGMENTED_START {
                            return Err(GrammarError::ReservedStartName);
                        }
                    }
                }
            }
            if user_rules[..i].contains(rule) {
                return Err(GrammarError::DuplicateProduction(format!(
                    "{} (rule {})",
                    rule.lhs(),
                    i
                )));
            }
        }

        let mut productions = Vec::with_capacity(user_rules.len() + 1);
        productions.push(Production::new(
            NonTerminal::augmented_start(),
            [GrammarElement::NonTerminal(start.clone())],
        ));
        productions.extend(user_rules);

        let mut terminals = Set::default();
        let mut nonterminals = Set::default();
        nonterminals.insert(start.clone());
        for rule in &productions {
            nonterminals.insert(rule.lhs().clone());
            for symbol in rule.rhs() {
                match symbol {
                    GrammarElement::Terminal(t) => {
                        terminals.insert(t.clone());
                    }
                    GrammarElement::NonTerminal(n) => {
                        nonterminals.insert(n.clone());
                    }
                }
            }
        }
        terminals.insert(end_of_input.clone());

        // Referencing a nonterminal before any production defines it is
        // allowed, but a nonterminal that never gets one is suspicious.
        for symbol in &nonterminals {
            if symbol.name() == AUGMENTED_START {
                continue;
            }
            if productions.iter().all(|rule| rule.lhs() != symbol) {
                tracing::warn!("nonterminal `{}` has no associated production rule", symbol);
            }
        }

        Ok(Self {
            productions,
            start,
            end_of_input,
            terminals,
            nonterminals,
        })
    }
}

impl<T> Grammar<T> {
    pub fn start(&self) -> &NonTerminal {
        &self.start
    }

    pub fn end_of_input(&self) -> &Terminal<T> {
        &self.end_of_input
    }

    pub fn rules(&self) -> impl Iterator<Item = (RuleID, &Production<T>)> + '_ {
        self.productions
            .iter()
            .enumerate()
            .map(|(i, rule)| (RuleID::from_index(i), rule))
    }

    /// The user productions, without the augmented rule 0.
    pub fn user_rules(&self) -> impl Iterator<Item = &Production<T>> + '_ {
        self.productions.iter().skip(1)
    }

    pub fn rule(&self, id: RuleID) -> &Production<T> {
        &self.productions[id.index()]
    }

    pub fn rules_for<'g>(
        &'g self,
        lhs: &'g NonTerminal,
    ) -> impl Iterator<Item = (RuleID, &'g Production<T>)> + 'g {
        self.rules().filter(move |(_, rule)| rule.lhs() == lhs)
    }

    pub fn terminals(&self) -> impl Iterator<Item = &Terminal<T>> + '_ {
        self.terminals.iter()
    }

    pub fn nonterminals(&self) -> impl Iterator<Item = &NonTerminal> + '_ {
        self.nonterminals.iter()
    }
}

impl<T: fmt::Display> fmt::Display for Grammar<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "terminals: ")?;
        for (i, sym) in self.terminals.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", sym)?;
        }
        write!(f, "\nnonterminals: ")?;
        for (i, sym) in self.nonterminals.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", sym)?;
        }
        writeln!(f, "\nstart: {}", self.start)?;
        writeln!(f, "rules:")?;
        for (id, rule) in self.rules() {
            writeln!(f, "  [{:02}] {}", id, rule)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(value: &'static str) -> GrammarElement<&'static str> {
        GrammarElement::Terminal(Terminal::new(value))
    }

    fn n(name: &'static str) -> GrammarElement<&'static str> {
        GrammarElement::NonTerminal(NonTerminal::new(name))
    }

    #[test]
    fn augmentation() {
        let grammar = Grammar::new(
            NonTerminal::new("S"),
            "$",
            vec![
                Production::new(NonTerminal::new("S"), [t("("), n("S"), t(")")]),
                Production::new(NonTerminal::new("S"), []),
            ],
        )
        .unwrap();

        let accept = grammar.rule(RuleID::ACCEPT);
        assert_eq!(accept.lhs().name(), AUGMENTED_START);
        assert_eq!(accept.rhs(), &[n("S")]);
        assert_eq!(grammar.rules().count(), 3);
        assert!(grammar.terminals().any(|t| t == grammar.end_of_input()));
    }

    #[test]
    fn keep_flag_is_not_identity() {
        assert_eq!(Terminal::new("x"), Terminal::new("x").discard());
        assert_ne!(Terminal::new("x"), Terminal::negated("x"));
        assert_eq!(
            NonTerminal::new("E"),
            NonTerminal::new(String::from("E")).discard()
        );
    }

    #[test]
    fn rejects_reserved_start_name() {
        let err = Grammar::new(
            NonTerminal::new("S"),
            "$",
            vec![Production::new(NonTerminal::new(AUGMENTED_START), [t("x")])],
        )
        .unwrap_err();
        assert!(matches!(err, GrammarError::ReservedStartName));
    }

    #[test]
    fn rejects_end_of_input_in_body() {
        let err = Grammar::new(
            NonTerminal::new("S"),
            "$",
            vec![Production::new(NonTerminal::new("S"), [t("x"), t("$")])],
        )
        .unwrap_err();
        assert!(matches!(err, GrammarError::EndOfInputInBody { rule: 0 }));
    }

    #[test]
    fn rejects_duplicate_production() {
        let err = Grammar::new(
            NonTerminal::new("S"),
            "$",
            vec![
                Production::new(NonTerminal::new("S"), [t("x")]),
                Production::new(NonTerminal::new("S"), [t("x")]),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, GrammarError::DuplicateProduction(..)));
    }

    #[test]
    fn rejects_empty_grammar() {
        let err = Grammar::new(NonTerminal::new("S"), "$", vec![]).unwrap_err();
        assert!(matches!(err, GrammarError::EmptyProductions));
    }
}
