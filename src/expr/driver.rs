//! Parse driver: runs the lexer and parser, then validates the input
//! variable layout across the whole statement list.

use std::collections::BTreeMap;

use log::debug;

use super::ast::{Ast, NodeId, VarKind, Variable};
use super::error::CompileError;
use super::lexer::Lexer;
use super::parser::Parser;

/// A parsed and validated statement list.
///
/// One root per output channel. `inputs` is sorted by index and its
/// position equals the variable index, so it is also the argument layout
/// of a compiled function.
#[derive(Debug, Clone)]
pub struct StatementList {
    pub ast: Ast,
    pub roots: Vec<NodeId>,
    pub inputs: Vec<Variable>,
}

impl StatementList {
    pub fn outputs(&self) -> usize {
        self.roots.len()
    }
}

#[derive(Debug, Default)]
pub struct Driver {
    registry: BTreeMap<usize, VarKind>,
    inputs: Vec<Variable>,
}

impl Driver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inputs of the most recent successful parse.
    pub fn inputs(&self) -> &[Variable] {
        &self.inputs
    }

    pub fn parse(&mut self, text: &str) -> Result<StatementList, CompileError> {
        self.registry.clear();
        self.inputs.clear();

        let tokens = Lexer::new(text).tokenize()?;
        let mut ast = Ast::new();
        let roots = Parser::new(tokens, &mut ast).parse()?;

        self.validate(&ast, &roots)?;
        self.inputs = self
            .registry
            .iter()
            .map(|(&index, &kind)| Variable::new(kind, index))
            .collect();

        debug!(
            "parsed {} statement(s), {} input(s), {} node(s)",
            roots.len(),
            self.inputs.len(),
            ast.len()
        );

        Ok(StatementList {
            ast,
            roots,
            inputs: self.inputs.clone(),
        })
    }

    fn validate(&mut self, ast: &Ast, roots: &[NodeId]) -> Result<(), CompileError> {
        let mut result = Ok(());
        let outputs = roots.len();
        let registry = &mut self.registry;

        for root in roots {
            ast.for_each_variable(*root, &mut |var| {
                if result.is_err() {
                    return;
                }
                if var.kind == VarKind::Output {
                    if var.index >= outputs {
                        result = Err(CompileError::validation(format!(
                            "output variable {var} is out of range, there are {outputs} output(s)"
                        )));
                    }
                    return;
                }
                match registry.get(&var.index) {
                    Some(kind) if *kind != var.kind => {
                        result = Err(CompileError::validation(format!(
                            "mismatched input types at index {}",
                            var.index + 1
                        )));
                    }
                    Some(_) => {}
                    None => {
                        registry.insert(var.index, var.kind);
                    }
                }
            });
            result.clone()?;
        }

        if let Some((&max, _)) = self.registry.iter().next_back() {
            if let Some(missing) = (0..=max).find(|i| !self.registry.contains_key(i)) {
                return Err(CompileError::validation(format!(
                    "missing an input variable at index {}",
                    missing + 1
                )));
            }
        }

        Ok(())
    }
}
