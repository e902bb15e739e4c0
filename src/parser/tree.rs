//! Parse tree produced by the frontend and consumed by the bytecode encoder.

use super::state::{Token, TokenKind};
use std::fmt;

/// Grammar production a node was built from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Grammar {
    /// Statement+
    Program,
    /// variable '=' Expression ';'
    Assignment,
    /// Type variable '=' Expression ';'
    Declaration,
    /// Node ('+' | '-') Node
    Expression,
    /// Node ('*' | '/') Node
    Term,
    /// '(' Expression ')'
    Parenthesized,
    /// ('+' | '-') (variable | constant)
    Signed,
    /// variable | constant
    Primary,
}

impl Grammar {
    /// Fixed element count, `None` for the variadic program node
    pub fn arity(self) -> Option<usize> {
        match self {
            Grammar::Program => None,
            Grammar::Assignment => Some(4),
            Grammar::Declaration => Some(5),
            Grammar::Expression | Grammar::Term | Grammar::Parenthesized => Some(3),
            Grammar::Signed => Some(2),
            Grammar::Primary => Some(1),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Grammar::Program => "Program",
            Grammar::Assignment => "Assignment",
            Grammar::Declaration => "Declaration",
            Grammar::Expression => "Expression",
            Grammar::Term => "Term",
            Grammar::Parenthesized => "Parenthesized",
            Grammar::Signed => "Signed",
            Grammar::Primary => "Primary",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Element {
    Token(Token),
    Node(ParseNode),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseNode {
    pub grammar: Grammar,
    pub elements: Vec<Element>,
    /// Set by name resolution on the final top-level statement.
    pub is_last: bool,
}

impl ParseNode {
    pub fn new(grammar: Grammar, elements: Vec<Element>) -> Self {
        Self {
            grammar,
            elements,
            is_last: false,
        }
    }

    pub fn token(&self, index: usize) -> Option<&Token> {
        match self.elements.get(index) {
            Some(Element::Token(token)) => Some(token),
            _ => None,
        }
    }

    pub fn node(&self, index: usize) -> Option<&ParseNode> {
        match self.elements.get(index) {
            Some(Element::Node(node)) => Some(node),
            _ => None,
        }
    }

    /// Child nodes in element order
    pub fn child_nodes(&self) -> impl Iterator<Item = &ParseNode> {
        self.elements.iter().filter_map(|e| match e {
            Element::Node(node) => Some(node),
            Element::Token(_) => None,
        })
    }

    fn write_indented(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        write!(f, "{:indent$}{}", "", self.grammar.name(), indent = depth * 2)?;
        if self.is_last {
            write!(f, " (last)")?;
        }
        writeln!(f)?;
        for element in &self.elements {
            match element {
                Element::Token(token) => {
                    write!(f, "{:indent$}{}", "", token.kind, indent = (depth + 1) * 2)?;
                    if let (TokenKind::Identifier(_), Some(slot)) = (&token.kind, token.slot) {
                        write!(f, " [slot {}]", slot)?;
                    }
                    writeln!(f)?;
                }
                Element::Node(node) => node.write_indented(f, depth + 1)?,
            }
        }
        Ok(())
    }
}

/// Indented dump used by debug logging
impl fmt::Display for ParseNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_indented(f, 0)
    }
}
