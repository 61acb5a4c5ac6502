//! Concrete syntax trees.
//!
//! The parser hands every reduction to a [`TreeBuilder`], so the same
//! tables can materialise different tree representations. The builder
//! bundled here targets a persistent tree: an append-only arena of
//! immutable node records keyed by integer id, with the parent relation
//! derived lazily per rooted tree.

use crate::{
    grammar::{Production, Terminal},
    parser::Token,
    types::Map,
};
use std::{
    cell::{OnceCell, RefCell},
    fmt,
    rc::Rc,
};

/// Receives reductions from the parser and produces tree nodes.
pub trait TreeBuilder<T> {
    type Node;

    fn make_terminal_node(&mut self, terminal: &Terminal<T>, token: &Token<T>) -> Self::Node;

    fn make_nonterminal_node(
        &mut self,
        production: &Production<T>,
        children: Vec<Self::Node>,
    ) -> Self::Node;
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct NodeID {
    raw: u32,
}

impl NodeID {
    fn from_index(index: usize) -> Self {
        assert!(index <= u32::MAX as usize, "too many nodes");
        Self { raw: index as u32 }
    }

    fn index(self) -> usize {
        self.raw as usize
    }
}

impl fmt::Display for NodeID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.raw, f)
    }
}

#[derive(Debug)]
enum NodeData {
    /// A leaf holding the matched token text.
    Token { text: String },
    /// An interior node labelled with the name of the reduced nonterminal.
    Branch {
        label: String,
        children: Vec<NodeID>,
    },
}

/// Append-only storage of immutable node records. Every tree derived from
/// one parse (and from subsequent edits) shares the same arena.
#[derive(Debug, Default)]
pub struct NodeArena {
    nodes: RefCell<Vec<Rc<NodeData>>>,
}

impl NodeArena {
    fn push(&self, data: NodeData) -> NodeID {
        let mut nodes = self.nodes.borrow_mut();
        let id = NodeID::from_index(nodes.len());
        nodes.push(Rc::new(data));
        id
    }

    fn get(&self, id: NodeID) -> Rc<NodeData> {
        Rc::clone(&self.nodes.borrow()[id.index()])
    }
}

/// Produces [`SyntaxTree`] nodes from parser reductions.
#[derive(Debug, Default)]
pub struct SyntaxTreeBuilder {
    arena: Rc<NodeArena>,
}

impl SyntaxTreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a leaf outside of a parse, e.g. as a replacement node.
    pub fn token(&self, text: impl Into<String>) -> NodeID {
        self.arena.push(NodeData::Token { text: text.into() })
    }

    /// Create a branch outside of a parse.
    pub fn branch(&self, label: impl Into<String>, children: Vec<NodeID>) -> NodeID {
        self.arena.push(NodeData::Branch {
            label: label.into(),
            children,
        })
    }

    /// Root a tree at the given node.
    pub fn tree(&self, root: NodeID) -> SyntaxTree {
        SyntaxTree {
            arena: Rc::clone(&self.arena),
            root,
            parents: OnceCell::new(),
        }
    }
}

impl<T> TreeBuilder<T> for SyntaxTreeBuilder {
    type Node = NodeID;

    fn make_terminal_node(&mut self, _terminal: &Terminal<T>, token: &Token<T>) -> Self::Node {
        self.arena.push(NodeData::Token {
            text: token.text.clone(),
        })
    }

    fn make_nonterminal_node(
        &mut self,
        production: &Production<T>,
        children: Vec<Self::Node>,
    ) -> Self::Node {
        self.arena.push(NodeData::Branch {
            label: production.lhs().name().to_owned(),
            children,
        })
    }
}

/// A rooted, immutable view into the arena. Edits never mutate existing
/// nodes; they append replacements along the spine and return a new tree
/// sharing the arena.
#[derive(Debug)]
pub struct SyntaxTree {
    arena: Rc<NodeArena>,
    root: NodeID,
    // child → parent, computed on first use. Rebuilt per rooted tree; a
    // shared subtree keeps its first-seen parent.
    parents: OnceCell<Map<NodeID, NodeID>>,
}

impl SyntaxTree {
    pub fn root(&self) -> NodeRef<'_> {
        NodeRef {
            tree: self,
            id: self.root,
        }
    }

    pub fn node(&self, id: NodeID) -> NodeRef<'_> {
        NodeRef { tree: self, id }
    }

    fn data(&self, id: NodeID) -> Rc<NodeData> {
        self.arena.get(id)
    }

    fn parents(&self) -> &Map<NodeID, NodeID> {
        self.parents.get_or_init(|| {
            let mut parents = Map::default();
            let mut stack = vec![self.root];
            while let Some(id) = stack.pop() {
                if let NodeData::Branch { children, .. } = &*self.data(id) {
                    for &child in children {
                        if !parents.contains_key(&child) {
                            parents.insert(child, id);
                            stack.push(child);
                        }
                    }
                }
            }
            parents
        })
    }

    /// Rebuild the spine from `old` up to the root, substituting `new`,
    /// and root a fresh tree at the result.
    fn reroot(&self, mut old: NodeID, mut new: NodeID) -> SyntaxTree {
        while let Some(&parent) = self.parents().get(&old) {
            let replacement = match &*self.data(parent) {
                NodeData::Branch { label, children } => NodeData::Branch {
                    label: label.clone(),
                    children: children
                        .iter()
                        .map(|&c| if c == old { new } else { c })
                        .collect(),
                },
                NodeData::Token { .. } => unreachable!("a parent is always a branch"),
            };
            new = self.arena.push(replacement);
            old = parent;
        }
        SyntaxTree {
            arena: Rc::clone(&self.arena),
            root: new,
            parents: OnceCell::new(),
        }
    }
}

impl PartialEq for SyntaxTree {
    fn eq(&self, other: &Self) -> bool {
        self.root() == other.root()
    }
}

impl fmt::Display for SyntaxTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.root(), f)
    }
}

/// A node within a rooted tree.
#[derive(Copy, Clone)]
pub struct NodeRef<'t> {
    tree: &'t SyntaxTree,
    id: NodeID,
}

impl<'t> NodeRef<'t> {
    pub fn id(&self) -> NodeID {
        self.id
    }

    pub fn is_token(&self) -> bool {
        matches!(&*self.tree.data(self.id), NodeData::Token { .. })
    }

    /// The matched text of a leaf.
    pub fn text(&self) -> Option<String> {
        match &*self.tree.data(self.id) {
            NodeData::Token { text } => Some(text.clone()),
            NodeData::Branch { .. } => None,
        }
    }

    /// The nonterminal name of a branch.
    pub fn label(&self) -> Option<String> {
        match &*self.tree.data(self.id) {
            NodeData::Token { .. } => None,
            NodeData::Branch { label, .. } => Some(label.clone()),
        }
    }

    pub fn children(&self) -> Vec<NodeRef<'t>> {
        match &*self.tree.data(self.id) {
            NodeData::Token { .. } => vec![],
            NodeData::Branch { children, .. } => children
                .iter()
                .map(|&id| NodeRef {
                    tree: self.tree,
                    id,
                })
                .collect(),
        }
    }

    /// The parent within this rooted tree; triggers the one-time parent
    /// computation on first use.
    pub fn parent(&self) -> Option<NodeRef<'t>> {
        self.tree.parents().get(&self.id).map(|&id| NodeRef {
            tree: self.tree,
            id,
        })
    }

    /// The byte length covered by this node: the token width for leaves,
    /// the sum of the children's lengths otherwise.
    pub fn len(&self) -> u64 {
        match &*self.tree.data(self.id) {
            NodeData::Token { text } => text.len() as u64,
            NodeData::Branch { .. } => self.children().iter().map(NodeRef::len).sum(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The byte offset of this node: the parent's offset plus the summed
    /// lengths of the earlier siblings. The root sits at offset 0.
    pub fn offset(&self) -> u64 {
        let Some(parent) = self.parent() else {
            return 0;
        };
        let mut offset = parent.offset();
        for sibling in parent.children() {
            if sibling.id == self.id {
                break;
            }
            offset += sibling.len();
        }
        offset
    }

    /// Replace every occurrence of the child `old` with `new`, returning
    /// the tree rooted at the updated spine. Replacing a child with
    /// itself yields a structurally equal tree.
    pub fn replace_child(&self, old: NodeID, new: NodeID) -> SyntaxTree {
        self.edit(|children| {
            for child in children.iter_mut() {
                if *child == old {
                    *child = new;
                }
            }
        })
    }

    /// Insert `new` at `index` among the children.
    pub fn insert_child(&self, index: usize, new: NodeID) -> SyntaxTree {
        self.edit(|children| children.insert(index, new))
    }

    /// Remove the first occurrence of `child`.
    pub fn remove_child(&self, child: NodeID) -> SyntaxTree {
        self.edit(|children| {
            if let Some(index) = children.iter().position(|&c| c == child) {
                children.remove(index);
            }
        })
    }

    fn edit(&self, f: impl FnOnce(&mut Vec<NodeID>)) -> SyntaxTree {
        let replacement = match &*self.tree.data(self.id) {
            NodeData::Branch { label, children } => {
                let mut children = children.clone();
                f(&mut children);
                NodeData::Branch {
                    label: label.clone(),
                    children,
                }
            }
            // Editing a leaf is a no-op; reroot an identical tree.
            NodeData::Token { text } => NodeData::Token { text: text.clone() },
        };
        let new = self.tree.arena.push(replacement);
        self.tree.reroot(self.id, new)
    }
}

impl PartialEq for NodeRef<'_> {
    /// Recursive structural equality over children; ids and arenas are
    /// irrelevant.
    fn eq(&self, other: &Self) -> bool {
        match (&*self.tree.data(self.id), &*other.tree.data(other.id)) {
            (NodeData::Token { text: a }, NodeData::Token { text: b }) => a == b,
            (
                NodeData::Branch {
                    label: a,
                    children: ca,
                },
                NodeData::Branch {
                    label: b,
                    children: cb,
                },
            ) => a == b && ca.len() == cb.len() && self.children() == other.children(),
            _ => false,
        }
    }
}

impl fmt::Debug for NodeRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeRef({})", self.id)
    }
}

impl fmt::Display for NodeRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.tree.data(self.id) {
            NodeData::Token { text } => write!(f, "{:?}", text),
            NodeData::Branch { label, .. } => {
                write!(f, "({}", label)?;
                for child in self.children() {
                    write!(f, " {}", child)?;
                }
                f.write_str(")")
            }
        }
    }
}
