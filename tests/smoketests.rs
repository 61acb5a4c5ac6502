use canlr::{
    dfa::DFA,
    grammar::{Grammar, GrammarElement, NonTerminal, Production, Terminal},
    parse_table::{Action, Conflict, ParseTable},
    parser::{ParseError, Parser, Token, TokenDefinitions},
    serialize::{self, Loaded},
    tree::{NodeRef, SyntaxTree, SyntaxTreeBuilder},
};

fn t(value: &str) -> GrammarElement<String> {
    GrammarElement::Terminal(Terminal::new(value.to_owned()))
}

fn n(name: &str) -> GrammarElement<String> {
    GrammarElement::NonTerminal(NonTerminal::new(name.to_owned()))
}

fn rule(lhs: &str, rhs: Vec<GrammarElement<String>>) -> Production<String> {
    Production::new(NonTerminal::new(lhs.to_owned()), rhs)
}

fn build(
    start: &str,
    rules: Vec<Production<String>>,
) -> (
    Grammar<String>,
    DFA<String>,
    ParseTable<String>,
    Vec<Conflict<String>>,
) {
    let grammar = Grammar::new(NonTerminal::new(start.to_owned()), "$".to_owned(), rules).unwrap();
    let dfa = DFA::generate(&grammar);
    let (table, conflicts) = ParseTable::generate(&grammar, &dfa);
    (grammar, dfa, table, conflicts)
}

/// Tokens with running byte offsets, each one character wide except for
/// multi-character kinds, whose text equals the kind.
fn lex(kinds: &[&str]) -> Vec<Token<String>> {
    let mut offset = 0;
    kinds
        .iter()
        .map(|kind| {
            let token = Token::new(kind.to_string(), kind.to_string(), offset);
            offset += token.width();
            token
        })
        .collect()
}

fn parse_to_tree(
    grammar: &Grammar<String>,
    table: &ParseTable<String>,
    input: &[&str],
) -> Result<SyntaxTree, ParseError> {
    let definitions = TokenDefinitions::from_grammar(grammar);
    let parser = Parser::new(grammar, table, &definitions);
    let mut builder = SyntaxTreeBuilder::new();
    let root = parser.parse(lex(input), &mut builder)?;
    Ok(builder.tree(root))
}

#[test]
fn balanced_parentheses() {
    let (grammar, _, table, conflicts) = build(
        "S",
        vec![rule("S", vec![t("("), n("S"), t(")")]), rule("S", vec![])],
    );
    assert!(conflicts.is_empty());

    let tree = parse_to_tree(&grammar, &table, &["(", "(", ")", ")", "$"]).unwrap();
    assert_eq!(
        tree.to_string(),
        r#"(S "(" (S "(" (S) ")") ")")"#,
        "two nested groups around the empty core"
    );
}

#[test]
fn arithmetic_precedence_shape() {
    // E : E + T | T
    // T : T * F | F
    // F : ( E ) | id
    let (grammar, _, table, conflicts) = build(
        "E",
        vec![
            rule("E", vec![n("E"), t("+"), n("T")]),
            rule("E", vec![n("T")]),
            rule("T", vec![n("T"), t("*"), n("F")]),
            rule("T", vec![n("F")]),
            rule("F", vec![t("("), n("E"), t(")")]),
            rule("F", vec![t("id")]),
        ],
    );
    assert!(conflicts.is_empty());

    let tree = parse_to_tree(&grammar, &table, &["id", "+", "id", "*", "id", "$"]).unwrap();

    // `+` reduces above `*`: the root is E : E + T and its right child
    // holds the multiplication.
    let root = tree.root();
    assert_eq!(root.label().as_deref(), Some("E"));
    let children = root.children();
    assert_eq!(children.len(), 3);
    assert_eq!(children[1].text().as_deref(), Some("+"));

    let right = &children[2];
    assert_eq!(right.label().as_deref(), Some("T"));
    let factors = right.children();
    assert_eq!(factors.len(), 3);
    assert_eq!(factors[1].text().as_deref(), Some("*"));
}

#[test]
fn dangling_else_conflict() {
    let (_, _, _, conflicts) = build(
        "S",
        vec![
            rule("S", vec![t("if"), n("E"), t("then"), n("S")]),
            rule(
                "S",
                vec![t("if"), n("E"), t("then"), n("S"), t("else"), n("S")],
            ),
            rule("S", vec![t("x")]),
            rule("E", vec![t("e")]),
        ],
    );

    let conflict = conflicts
        .iter()
        .find(|c| c.terminal == Terminal::new("else".to_owned()))
        .expect("expected a shift/reduce conflict on `else`");
    assert!(conflict
        .actions
        .iter()
        .any(|a| matches!(a, Action::Shift(..))));
    assert!(conflict
        .actions
        .iter()
        .any(|a| matches!(a, Action::Reduce(..))));
}

#[test]
fn reduce_reduce_conflict() {
    let (_, _, _, conflicts) = build(
        "S",
        vec![
            rule("S", vec![n("A")]),
            rule("S", vec![n("B")]),
            rule("A", vec![t("x")]),
            rule("B", vec![t("x")]),
        ],
    );

    let conflict = conflicts
        .iter()
        .find(|c| c.terminal == Terminal::new("$".to_owned()))
        .expect("expected a reduce/reduce conflict on `$`");
    let reduces = conflict
        .actions
        .iter()
        .filter(|a| matches!(a, Action::Reduce(..)))
        .count();
    assert_eq!(reduces, 2);
}

#[test]
fn left_recursive_list_is_left_associative() {
    // L : L , id | id
    let (grammar, _, table, conflicts) = build(
        "L",
        vec![
            rule("L", vec![n("L"), t(","), t("id")]),
            rule("L", vec![t("id")]),
        ],
    );
    assert!(conflicts.is_empty());

    let tree = parse_to_tree(&grammar, &table, &["id", ",", "id", ",", "id", "$"]).unwrap();

    // ((id , id) , id): descending through the first child stays on L.
    fn depth(node: NodeRef<'_>) -> usize {
        match node.children().first() {
            Some(first) if node.label().is_some() => 1 + depth(*first),
            _ => 0,
        }
    }
    let root = tree.root();
    assert_eq!(root.label().as_deref(), Some("L"));
    assert_eq!(root.children().len(), 3);
    assert_eq!(root.children()[0].children().len(), 3);
    assert_eq!(root.children()[0].children()[0].children().len(), 1);
    assert_eq!(depth(root), 3);
}

#[test]
fn unknown_token_fails_with_offset() {
    let (grammar, _, table, conflicts) = build("S", vec![rule("S", vec![t("x")])]);
    assert!(conflicts.is_empty());

    let mut definitions = TokenDefinitions::new();
    definitions.define("x".to_owned(), Terminal::new("x".to_owned()));
    let parser = Parser::new(&grammar, &table, &definitions);
    let mut builder = SyntaxTreeBuilder::new();

    let input = vec![
        Token::new("x".to_owned(), "x", 0),
        Token::new("mystery".to_owned(), "?", 1),
    ];
    let err = parser.parse(input, &mut builder).unwrap_err();
    match err {
        ParseError::UnknownToken { offset, .. } => assert_eq!(offset, 1),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn saved_table_parses_like_the_original() {
    let (grammar, dfa, table, conflicts) = build(
        "E",
        vec![
            rule("E", vec![n("E"), t("+"), n("T")]),
            rule("E", vec![n("T")]),
            rule("T", vec![t("id")]),
        ],
    );
    assert!(conflicts.is_empty());

    let mut buf = Vec::new();
    serialize::save(&grammar, &dfa, &table, &mut buf).unwrap();
    let loaded: Loaded<String> = serialize::load(&buf[..]).unwrap();

    assert_eq!(loaded.table, table);
    assert_eq!(loaded.grammar, grammar);

    let direct = parse_to_tree(&grammar, &table, &["id", "+", "id", "$"]).unwrap();
    let restored = parse_to_tree(&loaded.grammar, &loaded.table, &["id", "+", "id", "$"]).unwrap();
    assert_eq!(direct, restored);
}

#[test]
fn empty_action_cells_mean_no_transition_and_no_reduction() {
    let (grammar, dfa, table, conflicts) = build(
        "E",
        vec![
            rule("E", vec![n("E"), t("+"), n("T")]),
            rule("E", vec![n("T")]),
            rule("T", vec![t("id")]),
        ],
    );
    assert!(conflicts.is_empty());

    for ((id, state), terminal) in dfa
        .states()
        .flat_map(|entry| grammar.terminals().map(move |t| (entry, t)))
    {
        let cell = table.cell(id, terminal);
        let has_shift = state
            .edges()
            .any(|(symbol, _)| symbol.as_terminal() == Some(terminal));
        let has_reduction = state
            .items()
            .any(|item| item.is_reducible(&grammar) && item.lookahead() == terminal);
        assert_eq!(
            cell.is_some(),
            has_shift || has_reduction,
            "state {} terminal {}",
            id,
            terminal
        );
        if let Some(cell) = cell {
            assert_eq!(cell.len(), 1);
        }
    }
}
