//! Recursive-descent parser for the calculator language.
//!
//! ```text
//! Program     := Statement+
//! Statement   := [int32_t] variable '=' Expression ';'
//! Expression  := Term (('+' | '-') Term)*
//! Term        := Factor (('*' | '/') Factor)*
//! Factor      := '(' Expression ')' | ('+' | '-') (variable | constant) | variable | constant
//! ```
//!
//! Operator chains are built left-associatively as binary nodes; a lone term or factor is
//! returned as-is rather than wrapped.

use super::ParseError;
use super::state::{Token, TokenKind, tokenize};
use super::tree::{Element, Grammar, ParseNode};

pub struct Parser {
    tokens: Vec<Token>,
    position: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            position: 0,
        }
    }

    fn peek(&self) -> Option<&TokenKind> {
        self.tokens.get(self.position).map(|t| &t.kind)
    }

    fn next(&mut self, expected: &str) -> Result<Token, ParseError> {
        match self.tokens.get(self.position) {
            Some(token) => {
                self.position += 1;
                Ok(token.clone())
            }
            None => Err(ParseError::UnexpectedEof {
                expected: expected.to_string(),
            }),
        }
    }

    fn expect(
        &mut self,
        expected: &str,
        accept: impl Fn(&TokenKind) -> bool,
    ) -> Result<Token, ParseError> {
        let token = self.next(expected)?;
        if accept(&token.kind) {
            Ok(token)
        } else {
            Err(ParseError::UnexpectedToken {
                expected: expected.to_string(),
                found: token.kind.to_string(),
                span: token.span,
            })
        }
    }

    pub fn parse_program(&mut self) -> Result<ParseNode, ParseError> {
        let mut statements = Vec::new();
        while self.peek().is_some() {
            statements.push(Element::Node(self.parse_statement()?));
        }
        if statements.is_empty() {
            return Err(ParseError::EmptyProgram);
        }
        Ok(ParseNode::new(Grammar::Program, statements))
    }

    fn parse_statement(&mut self) -> Result<ParseNode, ParseError> {
        let mut elements = Vec::with_capacity(5);
        let grammar = if self.peek() == Some(&TokenKind::TypeInt32) {
            elements.push(Element::Token(self.next("int32_t")?));
            Grammar::Declaration
        } else {
            Grammar::Assignment
        };

        let variable = self.expect("variable", |k| matches!(k, TokenKind::Identifier(_)))?;
        elements.push(Element::Token(variable));
        elements.push(Element::Token(
            self.expect("'='", |k| *k == TokenKind::Assign)?,
        ));
        elements.push(Element::Node(self.parse_expression()?));
        elements.push(Element::Token(
            self.expect("';'", |k| *k == TokenKind::Semicolon)?,
        ));

        Ok(ParseNode::new(grammar, elements))
    }

    fn parse_expression(&mut self) -> Result<ParseNode, ParseError> {
        let mut lhs = self.parse_term()?;
        while matches!(self.peek(), Some(TokenKind::Plus | TokenKind::Minus)) {
            let op = self.next("'+' or '-'")?;
            let rhs = self.parse_term()?;
            lhs = ParseNode::new(
                Grammar::Expression,
                vec![Element::Node(lhs), Element::Token(op), Element::Node(rhs)],
            );
        }
        Ok(lhs)
    }

    fn parse_term(&mut self) -> Result<ParseNode, ParseError> {
        let mut lhs = self.parse_factor()?;
        while matches!(self.peek(), Some(TokenKind::Star | TokenKind::Slash)) {
            let op = self.next("'*' or '/'")?;
            let rhs = self.parse_factor()?;
            lhs = ParseNode::new(
                Grammar::Term,
                vec![Element::Node(lhs), Element::Token(op), Element::Node(rhs)],
            );
        }
        Ok(lhs)
    }

    fn parse_factor(&mut self) -> Result<ParseNode, ParseError> {
        let is_operand = |k: &TokenKind| matches!(k, TokenKind::Identifier(_) | TokenKind::Constant(_));

        match self.peek() {
            Some(TokenKind::LParen) => {
                let open = self.next("'('")?;
                let inner = self.parse_expression()?;
                let close = self.expect("')'", |k| *k == TokenKind::RParen)?;
                Ok(ParseNode::new(
                    Grammar::Parenthesized,
                    vec![
                        Element::Token(open),
                        Element::Node(inner),
                        Element::Token(close),
                    ],
                ))
            }
            Some(TokenKind::Plus | TokenKind::Minus) => {
                let sign = self.next("'+' or '-'")?;
                let operand = self.expect("variable or constant", is_operand)?;
                check_constant(&operand, sign.kind == TokenKind::Minus)?;
                Ok(ParseNode::new(
                    Grammar::Signed,
                    vec![Element::Token(sign), Element::Token(operand)],
                ))
            }
            _ => {
                let operand = self.expect("variable, constant or '('", is_operand)?;
                check_constant(&operand, false)?;
                Ok(ParseNode::new(Grammar::Primary, vec![Element::Token(operand)]))
            }
        }
    }
}

/// A constant must fit `int32_t` once its sign is applied, so `-2147483648` is the one
/// magnitude only valid when negated
fn check_constant(token: &Token, negated: bool) -> Result<(), ParseError> {
    let TokenKind::Constant(magnitude) = token.kind else {
        return Ok(());
    };
    let limit = if negated {
        i32::MIN.unsigned_abs()
    } else {
        i32::MAX.unsigned_abs()
    };
    if magnitude > limit {
        let sign = if negated { "-" } else { "" };
        return Err(ParseError::ConstantOverflow {
            text: format!("{}{}", sign, magnitude),
            span: token.span,
        });
    }
    Ok(())
}

/// Tokenize and parse `source` into a program tree
pub fn parse(source: &str) -> Result<ParseNode, ParseError> {
    let tokens = tokenize(source)?;
    let program = Parser::new(tokens).parse_program()?;
    tracing::debug!(statements = program.elements.len(), "parsed program");
    Ok(program)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn statement(source: &str) -> ParseNode {
        let program = parse(source).unwrap();
        program.node(0).unwrap().clone()
    }

    #[test]
    fn test_declaration_shape() {
        let decl = statement("int32_t value1 = 1 + 2;");
        assert_eq!(decl.grammar, Grammar::Declaration);
        assert_eq!(decl.elements.len(), 5);
        let rhs = decl.node(3).unwrap();
        assert_eq!(rhs.grammar, Grammar::Expression);
        assert_eq!(rhs.node(0).unwrap().grammar, Grammar::Primary);
        assert_eq!(rhs.token(1).unwrap().kind, TokenKind::Plus);
    }

    #[test]
    fn test_assignment_shape() {
        let assign = statement("value1 = value2;");
        assert_eq!(assign.grammar, Grammar::Assignment);
        assert_eq!(assign.elements.len(), 4);
        assert_eq!(assign.node(2).unwrap().grammar, Grammar::Primary);
    }

    #[test]
    fn test_precedence_and_associativity() {
        // 1 - 2 - 3 * 4 => ((1 - 2) - (3 * 4))
        let decl = statement("int32_t x = 1 - 2 - 3 * 4;");
        let outer = decl.node(3).unwrap();
        assert_eq!(outer.grammar, Grammar::Expression);
        assert_eq!(outer.node(0).unwrap().grammar, Grammar::Expression);
        assert_eq!(outer.node(2).unwrap().grammar, Grammar::Term);
    }

    #[test]
    fn test_parenthesized_and_signed_factors() {
        let decl = statement("int32_t x = (1 + -y) * +2;");
        let term = decl.node(3).unwrap();
        assert_eq!(term.grammar, Grammar::Term);
        let paren = term.node(0).unwrap();
        assert_eq!(paren.grammar, Grammar::Parenthesized);
        assert_eq!(paren.node(1).unwrap().node(2).unwrap().grammar, Grammar::Signed);
        assert_eq!(term.node(2).unwrap().grammar, Grammar::Signed);
    }

    #[test]
    fn test_most_negative_constant() {
        let decl = statement("int32_t x = -2147483648;");
        let signed = decl.node(3).unwrap();
        assert_eq!(signed.grammar, Grammar::Signed);
        assert_eq!(signed.token(1).unwrap().kind, TokenKind::Constant(2147483648));
    }

    #[test]
    fn test_syntax_errors() {
        assert!(matches!(parse(""), Err(ParseError::EmptyProgram)));
        assert!(matches!(
            parse("int32_t x = 1"),
            Err(ParseError::UnexpectedEof { .. })
        ));
        assert!(matches!(
            parse("int32_t = 1;"),
            Err(ParseError::UnexpectedToken { .. })
        ));
        assert!(matches!(
            parse("x = 2147483648;"),
            Err(ParseError::ConstantOverflow { .. })
        ));
        assert!(matches!(
            parse("x = +2147483648;"),
            Err(ParseError::ConstantOverflow { .. })
        ));
        assert!(matches!(
            parse("x = -2147483649;"),
            Err(ParseError::ConstantOverflow { .. })
        ));
        // a sign only applies to a variable or constant
        assert!(matches!(
            parse("x = -(1);"),
            Err(ParseError::UnexpectedToken { .. })
        ));
    }
}
