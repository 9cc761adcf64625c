//! Indented tree rendering of a statement list, for `--ast` and debugging.

use std::fmt::{self, Write};

use super::ast::{Ast, Literal, NodeId, NodeKind, OutputType, Quoted, TableRef};
use super::driver::StatementList;

/// Render every statement as an indented tree, one block per output.
pub fn render(list: &StatementList) -> String {
    list.to_string()
}

impl fmt::Display for StatementList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, root) in self.roots.iter().enumerate() {
            writeln!(f, "statement {}:", i + 1)?;
            render_node(&self.ast, *root, 1, f)?;
        }
        Ok(())
    }
}

/// Render a single subtree.
pub fn render_node(ast: &Ast, id: NodeId, depth: usize, out: &mut dyn Write) -> fmt::Result {
    let indent = "  ".repeat(depth);
    let ty = match ast.output_type(id) {
        OutputType::Float => "float",
        OutputType::Int => "int",
        OutputType::String => "string",
    };

    match ast.kind(id) {
        NodeKind::Variable(v) => writeln!(out, "{indent}var {v} : {ty}"),
        NodeKind::Value(Literal::Int(v)) => writeln!(out, "{indent}const {v} : {ty}"),
        NodeKind::Value(Literal::Float(v)) => writeln!(out, "{indent}const {v:?} : {ty}"),
        NodeKind::Quoted(Quoted::Literal(s)) => writeln!(out, "{indent}quoted \"{s}\""),
        NodeKind::Quoted(Quoted::Variable(var)) => {
            writeln!(out, "{indent}quoted")?;
            render_node(ast, *var, depth + 1, out)
        }
        NodeKind::Unary { op, operand } => {
            writeln!(out, "{indent}unary {} : {ty}", op.symbol())?;
            render_node(ast, *operand, depth + 1, out)
        }
        NodeKind::Binary { op, lhs, rhs } => {
            writeln!(out, "{indent}binary {} : {ty}", op.symbol())?;
            render_node(ast, *lhs, depth + 1, out)?;
            render_node(ast, *rhs, depth + 1, out)
        }
        NodeKind::Call { name, args } => {
            writeln!(out, "{indent}call {name} : {ty}")?;
            for arg in args {
                render_node(ast, *arg, depth + 1, out)?;
            }
            Ok(())
        }
        NodeKind::SampleAccess { var, offset } => {
            writeln!(out, "{indent}history")?;
            render_node(ast, *var, depth + 1, out)?;
            render_node(ast, *offset, depth + 1, out)
        }
        NodeKind::ArrayAccess { table, index } => {
            match table {
                TableRef::Named(name) => writeln!(out, "{indent}table {name}")?,
                TableRef::Variable(var) => {
                    writeln!(out, "{indent}table")?;
                    render_node(ast, *var, depth + 1, out)?;
                }
            }
            render_node(ast, *index, depth + 1, out)
        }
        NodeKind::ValueRead { name } => writeln!(out, "{indent}value {name}"),
        NodeKind::ValueAssignment { name, value } => {
            writeln!(out, "{indent}assign {name} : {ty}")?;
            render_node(ast, *value, depth + 1, out)
        }
        NodeKind::ArrayAssignment { access, value } => {
            writeln!(out, "{indent}assign cell : {ty}")?;
            render_node(ast, *access, depth + 1, out)?;
            render_node(ast, *value, depth + 1, out)
        }
        NodeKind::Deref { access } => {
            writeln!(out, "{indent}read")?;
            render_node(ast, *access, depth + 1, out)
        }
    }
}
