//! Bytecode module encoder.
//!
//! Walks the resolved parse tree in post order (operands before their operator, a
//! statement's right-hand side before its store) and emits the code section
//! instructions. The walk runs once against a counting sink and once into an exactly
//! sized buffer; see [`two_pass`](super::module::two_pass).

use super::module::{WasmModule, build_module, two_pass};
use super::opcode::Instruction;
use crate::error::{CompileError, Result};
use crate::parser::{Element, Grammar, ParseNode, ResolvedProgram, Token, TokenKind};
use ras::ByteSink;

/// Encode a resolved program as a complete module
pub fn encode_program(program: &ResolvedProgram) -> Result<WasmModule> {
    let instructions = encode_instructions(&program.tree)?;
    tracing::debug!(
        code_bytes = instructions.len(),
        var_count = program.var_count,
        "encoded instruction stream"
    );
    let module = build_module(program.var_count, &instructions)?;
    tracing::info!(bytes = module.len(), "built bytecode module");
    Ok(module)
}

/// The code stream for `tree`, terminated by `end`
pub fn encode_instructions(tree: &ParseNode) -> Result<Vec<u8>> {
    two_pass("code stream", |sink| Emitter { sink }.program(tree))
}

fn contract(msg: String) -> CompileError {
    CompileError::Internal(msg)
}

struct Emitter<'s> {
    sink: &'s mut dyn ByteSink,
}

impl Emitter<'_> {
    fn emit(&mut self, instruction: Instruction) -> Result<()> {
        instruction.encode(&mut *self.sink)?;
        Ok(())
    }

    fn program(&mut self, tree: &ParseNode) -> Result<()> {
        if tree.grammar != Grammar::Program {
            return Err(contract(format!(
                "expected Program at the root, found {}",
                tree.grammar.name()
            )));
        }
        for element in &tree.elements {
            match element {
                Element::Node(statement) => self.statement(statement)?,
                Element::Token(token) => {
                    return Err(contract(format!(
                        "unexpected token {} at program level",
                        token.kind
                    )));
                }
            }
        }
        self.emit(Instruction::End)
    }

    fn statement(&mut self, node: &ParseNode) -> Result<()> {
        check_arity(node)?;
        let (target, value) = match node.grammar {
            Grammar::Declaration => (token_at(node, 1)?, node_at(node, 3)?),
            Grammar::Assignment => (token_at(node, 0)?, node_at(node, 2)?),
            other => {
                return Err(contract(format!(
                    "expected a statement, found {}",
                    other.name()
                )));
            }
        };
        self.expression(value)?;
        let slot = slot_of(target)?;
        if node.is_last {
            self.emit(Instruction::TeeLocal(slot))
        } else {
            self.emit(Instruction::SetLocal(slot))
        }
    }

    fn expression(&mut self, node: &ParseNode) -> Result<()> {
        check_arity(node)?;
        match node.grammar {
            Grammar::Expression | Grammar::Term => {
                self.expression(node_at(node, 0)?)?;
                self.expression(node_at(node, 2)?)?;
                let op = token_at(node, 1)?;
                let instruction = match (node.grammar, &op.kind) {
                    (Grammar::Expression, TokenKind::Plus) => Instruction::I32Add,
                    (Grammar::Expression, TokenKind::Minus) => Instruction::I32Sub,
                    (Grammar::Term, TokenKind::Star) => Instruction::I32Mul,
                    (Grammar::Term, TokenKind::Slash) => Instruction::I32DivS,
                    (grammar, kind) => {
                        return Err(contract(format!(
                            "operator {} in {} node",
                            kind,
                            grammar.name()
                        )));
                    }
                };
                self.emit(instruction)
            }
            Grammar::Parenthesized => self.expression(node_at(node, 1)?),
            Grammar::Signed => {
                let negate = match token_at(node, 0)?.kind {
                    TokenKind::Minus => true,
                    TokenKind::Plus => false,
                    ref other => {
                        return Err(contract(format!("sign token {}", other)));
                    }
                };
                self.operand(token_at(node, 1)?, negate)
            }
            Grammar::Primary => self.operand(token_at(node, 0)?, false),
            other => Err(contract(format!(
                "{} node inside an expression",
                other.name()
            ))),
        }
    }

    fn operand(&mut self, token: &Token, negate: bool) -> Result<()> {
        match token.kind {
            TokenKind::Constant(magnitude) => {
                // the parser bounds the magnitude, so only -2147483648 wraps here
                let value = magnitude as i32;
                let value = if negate { value.wrapping_neg() } else { value };
                self.emit(Instruction::I32Const(value))
            }
            TokenKind::Identifier(_) if negate => {
                // two's complement: (x ^ -1) + 1
                let slot = slot_of(token)?;
                self.emit(Instruction::I32Const(-1))?;
                self.emit(Instruction::GetLocal(slot))?;
                self.emit(Instruction::I32Xor)?;
                self.emit(Instruction::I32Const(1))?;
                self.emit(Instruction::I32Add)
            }
            TokenKind::Identifier(_) => self.emit(Instruction::GetLocal(slot_of(token)?)),
            ref other => Err(contract(format!("operand token {}", other))),
        }
    }
}

fn check_arity(node: &ParseNode) -> Result<()> {
    match node.grammar.arity() {
        Some(expected) if expected != node.elements.len() => Err(contract(format!(
            "{} node has {} elements, grammar requires {}",
            node.grammar.name(),
            node.elements.len(),
            expected
        ))),
        _ => Ok(()),
    }
}

fn token_at(node: &ParseNode, index: usize) -> Result<&Token> {
    node.token(index).ok_or_else(|| {
        contract(format!(
            "{} node element {} is not a token",
            node.grammar.name(),
            index
        ))
    })
}

fn node_at(node: &ParseNode, index: usize) -> Result<&ParseNode> {
    node.node(index).ok_or_else(|| {
        contract(format!(
            "{} node element {} is not a node",
            node.grammar.name(),
            index
        ))
    })
}

fn slot_of(token: &Token) -> Result<u32> {
    match (&token.kind, token.slot) {
        (TokenKind::Identifier(_), Some(slot)) => Ok(slot),
        (kind, _) => Err(contract(format!(
            "{} at {} has no resolved slot",
            kind, token.span
        ))),
    }
}
