//! Name resolution: binds variables to local slots and marks the last statement.

use super::ParseError;
use super::state::TokenKind;
use super::tree::{Element, Grammar, ParseNode};
use std::collections::HashMap;

/// Locals are 4 bytes each and the local frame region is capped at 1024 bytes.
pub const MAX_VARIABLES: u32 = 256;

/// A program whose identifiers carry slot indices
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedProgram {
    pub tree: ParseNode,
    pub var_count: u32,
}

#[derive(Default)]
struct Scope {
    slots: HashMap<String, u32>,
}

impl Scope {
    fn define(&mut self, element: &mut Element) -> Result<(), ParseError> {
        let Element::Token(token) = element else {
            return Ok(());
        };
        let TokenKind::Identifier(name) = &token.kind else {
            return Ok(());
        };
        if self.slots.contains_key(name) {
            return Err(ParseError::DuplicateSymbol {
                name: name.clone(),
                span: token.span,
            });
        }
        let slot = self.slots.len() as u32;
        if slot >= MAX_VARIABLES {
            return Err(ParseError::TooManyVariables {
                limit: MAX_VARIABLES,
            });
        }
        self.slots.insert(name.clone(), slot);
        token.slot = Some(slot);
        Ok(())
    }

    fn lookup(&self, element: &mut Element) -> Result<(), ParseError> {
        let Element::Token(token) = element else {
            return Ok(());
        };
        let TokenKind::Identifier(name) = &token.kind else {
            return Ok(());
        };
        match self.slots.get(name) {
            Some(&slot) => {
                token.slot = Some(slot);
                Ok(())
            }
            None => Err(ParseError::UndefinedSymbol {
                name: name.clone(),
                span: token.span,
            }),
        }
    }

    fn resolve_node(&mut self, node: &mut ParseNode) -> Result<(), ParseError> {
        match node.grammar {
            // right-hand side first: `int32_t x = x;` uses x before it exists
            Grammar::Declaration | Grammar::Assignment => {
                for element in node.elements.iter_mut() {
                    if let Element::Node(child) = element {
                        self.resolve_node(child)?;
                    }
                }
                let is_declaration = node.grammar == Grammar::Declaration;
                for element in node.elements.iter_mut() {
                    if is_declaration {
                        self.define(element)?;
                    } else {
                        self.lookup(element)?;
                    }
                }
                Ok(())
            }
            _ => {
                for element in node.elements.iter_mut() {
                    match element {
                        Element::Node(child) => self.resolve_node(child)?,
                        Element::Token(_) => self.lookup(element)?,
                    }
                }
                Ok(())
            }
        }
    }
}

/// Bind every identifier to a slot and flag the final statement
pub fn resolve(mut tree: ParseNode) -> Result<ResolvedProgram, ParseError> {
    let mut scope = Scope::default();
    scope.resolve_node(&mut tree)?;

    if let Some(Element::Node(last)) = tree.elements.last_mut() {
        last.is_last = true;
    }

    let var_count = scope.slots.len() as u32;
    tracing::debug!(var_count, "resolved program\n{}", tree);
    Ok(ResolvedProgram { tree, var_count })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn resolve_source(source: &str) -> Result<ResolvedProgram, ParseError> {
        resolve(parse(source)?)
    }

    #[test]
    fn test_slots_follow_declaration_order() {
        let program = resolve_source(
            "int32_t a = 1;\nint32_t b = a + 2;\na = b * a;\n",
        )
        .unwrap();
        assert_eq!(program.var_count, 2);

        let second = program.tree.node(1).unwrap();
        assert_eq!(second.token(1).unwrap().slot, Some(1));
        let use_of_a = second.node(3).unwrap().node(0).unwrap().token(0).unwrap();
        assert_eq!(use_of_a.slot, Some(0));

        let third = program.tree.node(2).unwrap();
        assert_eq!(third.token(0).unwrap().slot, Some(0));
    }

    #[test]
    fn test_only_final_statement_is_last() {
        let program = resolve_source("int32_t a = 1;\nint32_t b = 2;\n").unwrap();
        assert!(!program.tree.node(0).unwrap().is_last);
        assert!(program.tree.node(1).unwrap().is_last);
    }

    #[test]
    fn test_undefined_symbol() {
        let err = resolve_source("int32_t a = b;").unwrap_err();
        assert_eq!(err.to_string(), "use undefined symbol(b)");
        assert!(matches!(
            resolve_source("a = 1;"),
            Err(ParseError::UndefinedSymbol { .. })
        ));
        // not visible in its own initializer
        assert!(matches!(
            resolve_source("int32_t a = a;"),
            Err(ParseError::UndefinedSymbol { .. })
        ));
    }

    #[test]
    fn test_duplicate_symbol() {
        assert!(matches!(
            resolve_source("int32_t a = 1;\nint32_t a = 2;"),
            Err(ParseError::DuplicateSymbol { .. })
        ));
    }

    #[test]
    fn test_variable_limit() {
        let mut source = String::new();
        for i in 0..=MAX_VARIABLES {
            source.push_str(&format!("int32_t v{} = {};\n", i, i));
        }
        assert!(matches!(
            resolve_source(&source),
            Err(ParseError::TooManyVariables { limit: MAX_VARIABLES })
        ));
    }
}
