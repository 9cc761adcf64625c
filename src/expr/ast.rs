//! Typed abstract syntax tree for expression statements.
//!
//! Nodes live in an [`Ast`] arena and refer to each other by [`NodeId`].
//! Every constructor checks the node's type rules, so a node that exists
//! is well typed.

use std::fmt;

use super::error::CompileError;
use super::functions::{self, Param};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

/// Statically computed result type of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputType {
    Float,
    Int,
    String,
}

impl OutputType {
    pub fn is_numeric(self) -> bool {
        self != OutputType::String
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VarKind {
    Float,
    Int,
    Symbol,
    Vector,
    Input,
    Output,
}

impl VarKind {
    pub fn from_letter(c: char) -> Option<Self> {
        match c {
            'f' => Some(VarKind::Float),
            'i' => Some(VarKind::Int),
            's' => Some(VarKind::Symbol),
            'v' => Some(VarKind::Vector),
            'x' => Some(VarKind::Input),
            'y' => Some(VarKind::Output),
            _ => None,
        }
    }

    pub fn letter(self) -> char {
        match self {
            VarKind::Float => 'f',
            VarKind::Int => 'i',
            VarKind::Symbol => 's',
            VarKind::Vector => 'v',
            VarKind::Input => 'x',
            VarKind::Output => 'y',
        }
    }

    /// INPUT and OUTPUT variables carry sample history.
    pub fn has_history(self) -> bool {
        matches!(self, VarKind::Input | VarKind::Output)
    }
}

/// An external slot: `$<kind><index>` with a zero-based index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Variable {
    pub kind: VarKind,
    pub index: usize,
}

impl Variable {
    pub fn new(kind: VarKind, index: usize) -> Self {
        Self { kind, index }
    }

    /// Parse a sigil such as `$f2` (index 1) or `$x` (index 0).
    pub fn parse(text: &str) -> Result<Self, CompileError> {
        let body = text
            .strip_prefix('$')
            .ok_or_else(|| CompileError::semantic(format!("{text} is not a valid variable declaration")))?;
        let mut chars = body.chars();
        let letter = chars
            .next()
            .ok_or_else(|| CompileError::semantic(format!("{text} is not a valid variable declaration")))?;
        let digits = chars.as_str();

        if !letter.is_ascii_alphabetic() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(CompileError::semantic(format!(
                "{text} is not a valid variable declaration"
            )));
        }
        let kind = VarKind::from_letter(letter)
            .ok_or_else(|| CompileError::semantic(format!("{text} has unknown type")))?;

        let index = if digits.is_empty() {
            0
        } else {
            let n: usize = digits.parse().map_err(|_| {
                CompileError::semantic(format!("{text} has an out of range index"))
            })?;
            if n == 0 {
                return Err(CompileError::semantic(format!(
                    "{text}: variable index must be at least 1"
                )));
            }
            n - 1
        };

        Ok(Self { kind, index })
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}{}", self.kind.letter(), self.index + 1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f32),
}

impl Literal {
    pub fn as_f32(self) -> f32 {
        match self {
            Literal::Int(v) => v as f32,
            Literal::Float(v) => v,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Quoted {
    Literal(String),
    /// A SYMBOL variable node.
    Variable(NodeId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Negate,
    BitNot,
    Not,
}

impl UnaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Negate => "-",
            UnaryOp::BitNot => "~",
            UnaryOp::Not => "!",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    ShiftLeft,
    ShiftRight,
    Equal,
    NotEqual,
    Greater,
    Less,
    GreaterEqual,
    LessEqual,
    LogicalOr,
    LogicalAnd,
    BitOr,
    BitAnd,
    BitXor,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::ShiftLeft => "<<",
            BinaryOp::ShiftRight => ">>",
            BinaryOp::Equal => "==",
            BinaryOp::NotEqual => "!=",
            BinaryOp::Greater => ">",
            BinaryOp::Less => "<",
            BinaryOp::GreaterEqual => ">=",
            BinaryOp::LessEqual => "<=",
            BinaryOp::LogicalOr => "||",
            BinaryOp::LogicalAnd => "&&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitXor => "^",
        }
    }

    /// Float arithmetic; everything else works on truncated integers.
    pub fn is_arithmetic(self) -> bool {
        matches!(
            self,
            BinaryOp::Add | BinaryOp::Subtract | BinaryOp::Multiply | BinaryOp::Divide
        )
    }
}

/// The table an [`NodeKind::ArrayAccess`] addresses.
#[derive(Debug, Clone, PartialEq)]
pub enum TableRef {
    Named(String),
    /// A SYMBOL or VECTOR variable node.
    Variable(NodeId),
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Variable(Variable),
    Value(Literal),
    Quoted(Quoted),
    Unary { op: UnaryOp, operand: NodeId },
    Binary { op: BinaryOp, lhs: NodeId, rhs: NodeId },
    Call { name: String, args: Vec<NodeId> },
    SampleAccess { var: NodeId, offset: NodeId },
    ArrayAccess { table: TableRef, index: NodeId },
    ValueRead { name: String },
    ValueAssignment { name: String, value: NodeId },
    ArrayAssignment { access: NodeId, value: NodeId },
    Deref { access: NodeId },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    pub output_type: OutputType,
    /// Height of the subtree rooted here, leaves are 1.
    pub depth: usize,
}

/// Tallest expression tree accepted. Tree walkers recurse once per level.
pub const MAX_DEPTH: usize = 256;

/// Node arena.
#[derive(Debug, Clone, Default)]
pub struct Ast {
    nodes: Vec<Node>,
}

impl Ast {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.0].kind
    }

    pub fn output_type(&self, id: NodeId) -> OutputType {
        self.nodes[id.0].output_type
    }

    /// The variable held by `id`, if it is a variable node.
    pub fn as_variable(&self, id: NodeId) -> Option<Variable> {
        match self.kind(id) {
            NodeKind::Variable(v) => Some(*v),
            _ => None,
        }
    }

    fn push(&mut self, kind: NodeKind, output_type: OutputType) -> NodeId {
        self.nodes.push(Node {
            kind,
            output_type,
            depth: 1,
        });
        NodeId(self.nodes.len() - 1)
    }

    /// Push a node with children, rejecting trees taller than [`MAX_DEPTH`].
    fn push_nested(
        &mut self,
        kind: NodeKind,
        output_type: OutputType,
    ) -> Result<NodeId, CompileError> {
        let depth = 1 + children(&kind)
            .into_iter()
            .map(|c| self.nodes[c.0].depth)
            .max()
            .unwrap_or(0);
        if depth > MAX_DEPTH {
            return Err(CompileError::syntax("expression nested too deeply", 0, 0));
        }
        self.nodes.push(Node {
            kind,
            output_type,
            depth,
        });
        Ok(NodeId(self.nodes.len() - 1))
    }

    fn require_numeric(&self, id: NodeId, what: &str) -> Result<(), CompileError> {
        if self.output_type(id).is_numeric() {
            Ok(())
        } else {
            Err(CompileError::semantic(format!(
                "{what} must be numeric, got a string"
            )))
        }
    }

    pub fn variable(&mut self, var: Variable) -> NodeId {
        let ty = if var.kind == VarKind::Int {
            OutputType::Int
        } else {
            OutputType::Float
        };
        self.push(NodeKind::Variable(var), ty)
    }

    pub fn int(&mut self, value: i64) -> NodeId {
        self.push(NodeKind::Value(Literal::Int(value)), OutputType::Int)
    }

    pub fn float(&mut self, value: f32) -> NodeId {
        self.push(NodeKind::Value(Literal::Float(value)), OutputType::Float)
    }

    pub fn quoted_literal(&mut self, text: impl Into<String>) -> NodeId {
        self.push(
            NodeKind::Quoted(Quoted::Literal(text.into())),
            OutputType::String,
        )
    }

    pub fn quoted_variable(&mut self, var: NodeId) -> Result<NodeId, CompileError> {
        match self.as_variable(var) {
            Some(v) if v.kind == VarKind::Symbol => self.push_nested(
                NodeKind::Quoted(Quoted::Variable(var)),
                OutputType::String,
            ),
            _ => Err(CompileError::semantic(
                "quoted values can only be strings or symbol variables",
            )),
        }
    }

    pub fn unary(&mut self, op: UnaryOp, operand: NodeId) -> Result<NodeId, CompileError> {
        self.require_numeric(operand, &format!("operand of '{}'", op.symbol()))?;
        let ty = self.output_type(operand);
        self.push_nested(NodeKind::Unary { op, operand }, ty)
    }

    pub fn binary(
        &mut self,
        op: BinaryOp,
        lhs: NodeId,
        rhs: NodeId,
    ) -> Result<NodeId, CompileError> {
        let what = format!("operands of '{}'", op.symbol());
        self.require_numeric(lhs, &what)?;
        self.require_numeric(rhs, &what)?;
        let ty = if self.output_type(lhs) == OutputType::Int
            && self.output_type(rhs) == OutputType::Int
        {
            OutputType::Int
        } else {
            OutputType::Float
        };
        self.push_nested(NodeKind::Binary { op, lhs, rhs }, ty)
    }

    pub fn call(&mut self, name: &str, args: Vec<NodeId>) -> Result<NodeId, CompileError> {
        let params = functions::signature(name).ok_or_else(|| {
            CompileError::semantic(format!("function not found with name: {name}"))
        })?;
        if params.len() != args.len() {
            return Err(CompileError::semantic(format!(
                "function {name} expects {} arguments, got: {}",
                params.len(),
                args.len()
            )));
        }
        for (i, (param, arg)) in params.iter().zip(&args).enumerate() {
            let is_string = self.output_type(*arg) == OutputType::String;
            if is_string != (*param == Param::Symbol) {
                return Err(CompileError::semantic(format!(
                    "function {name} arg {i} type mismatch"
                )));
            }
        }

        let ty = match name {
            "int" => OutputType::Int,
            "float" => OutputType::Float,
            _ if !args.is_empty()
                && args.iter().all(|a| self.output_type(*a) == OutputType::Int) =>
            {
                OutputType::Int
            }
            _ => OutputType::Float,
        };
        self.push_nested(
            NodeKind::Call {
                name: name.to_string(),
                args,
            },
            ty,
        )
    }

    pub fn sample_access(&mut self, var: NodeId, offset: NodeId) -> Result<NodeId, CompileError> {
        match self.as_variable(var) {
            Some(v) if v.kind.has_history() => {}
            _ => {
                return Err(CompileError::semantic(
                    "sample history access requires an $x or $y variable",
                ))
            }
        }
        self.require_numeric(offset, "history offset")?;
        self.push_nested(NodeKind::SampleAccess { var, offset }, OutputType::Float)
    }

    pub fn array_access(&mut self, table: TableRef, index: NodeId) -> Result<NodeId, CompileError> {
        if let TableRef::Variable(var) = &table {
            match self.as_variable(*var) {
                Some(v) if matches!(v.kind, VarKind::Symbol | VarKind::Vector) => {}
                _ => {
                    return Err(CompileError::semantic(
                        "only $s and $v variables can be indexed as tables",
                    ))
                }
            }
        }
        self.require_numeric(index, "table index")?;
        self.push_nested(NodeKind::ArrayAccess { table, index }, OutputType::Float)
    }

    pub fn value_read(&mut self, name: impl Into<String>) -> NodeId {
        self.push(NodeKind::ValueRead { name: name.into() }, OutputType::Float)
    }

    pub fn value_assignment(
        &mut self,
        name: impl Into<String>,
        value: NodeId,
    ) -> Result<NodeId, CompileError> {
        self.require_numeric(value, "assigned value")?;
        let ty = self.output_type(value);
        self.push_nested(
            NodeKind::ValueAssignment {
                name: name.into(),
                value,
            },
            ty,
        )
    }

    pub fn array_assignment(&mut self, access: NodeId, value: NodeId) -> Result<NodeId, CompileError> {
        match self.kind(access) {
            NodeKind::ArrayAccess {
                table: TableRef::Named(_),
                ..
            } => {}
            NodeKind::ArrayAccess {
                table: TableRef::Variable(var),
                ..
            } => {
                if self.as_variable(*var).map(|v| v.kind) != Some(VarKind::Symbol) {
                    return Err(CompileError::semantic(
                        "only named tables can be assigned to, not $v inputs",
                    ));
                }
            }
            _ => {
                return Err(CompileError::semantic(
                    "assignment target must be a table cell",
                ))
            }
        }
        self.require_numeric(value, "assigned value")?;
        let ty = self.output_type(value);
        self.push_nested(NodeKind::ArrayAssignment { access, value }, ty)
    }

    pub fn deref(&mut self, access: NodeId) -> Result<NodeId, CompileError> {
        if !matches!(self.kind(access), NodeKind::ArrayAccess { .. }) {
            return Err(CompileError::semantic("only table accesses can be read"));
        }
        self.push_nested(NodeKind::Deref { access }, OutputType::Float)
    }

    /// Visit every variable reachable from `root`.
    pub fn for_each_variable(&self, root: NodeId, f: &mut impl FnMut(Variable)) {
        match self.kind(root) {
            NodeKind::Variable(v) => f(*v),
            NodeKind::Value(_) | NodeKind::ValueRead { .. } => {}
            NodeKind::Quoted(Quoted::Literal(_)) => {}
            NodeKind::Quoted(Quoted::Variable(var)) => self.for_each_variable(*var, f),
            NodeKind::Unary { operand, .. } => self.for_each_variable(*operand, f),
            NodeKind::Binary { lhs, rhs, .. } => {
                self.for_each_variable(*lhs, f);
                self.for_each_variable(*rhs, f);
            }
            NodeKind::Call { args, .. } => {
                for arg in args {
                    self.for_each_variable(*arg, f);
                }
            }
            NodeKind::SampleAccess { var, offset } => {
                self.for_each_variable(*var, f);
                self.for_each_variable(*offset, f);
            }
            NodeKind::ArrayAccess { table, index } => {
                if let TableRef::Variable(var) = table {
                    self.for_each_variable(*var, f);
                }
                self.for_each_variable(*index, f);
            }
            NodeKind::ValueAssignment { value, .. } => self.for_each_variable(*value, f),
            NodeKind::ArrayAssignment { access, value } => {
                self.for_each_variable(*access, f);
                self.for_each_variable(*value, f);
            }
            NodeKind::Deref { access } => self.for_each_variable(*access, f),
        }
    }
}

/// Direct children of a node.
fn children(kind: &NodeKind) -> Vec<NodeId> {
    match kind {
        NodeKind::Variable(_)
        | NodeKind::Value(_)
        | NodeKind::ValueRead { .. }
        | NodeKind::Quoted(Quoted::Literal(_)) => Vec::new(),
        NodeKind::Quoted(Quoted::Variable(var)) => vec![*var],
        NodeKind::Unary { operand, .. } => vec![*operand],
        NodeKind::Binary { lhs, rhs, .. } => vec![*lhs, *rhs],
        NodeKind::Call { args, .. } => args.clone(),
        NodeKind::SampleAccess { var, offset } => vec![*var, *offset],
        NodeKind::ArrayAccess { table, index } => match table {
            TableRef::Named(_) => vec![*index],
            TableRef::Variable(var) => vec![*var, *index],
        },
        NodeKind::ValueAssignment { value, .. } => vec![*value],
        NodeKind::ArrayAssignment { access, value } => vec![*access, *value],
        NodeKind::Deref { access } => vec![*access],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::error::ErrorKind;

    #[test]
    fn parse_variable_sigils() {
        assert_eq!(Variable::parse("$f1").unwrap(), Variable::new(VarKind::Float, 0));
        assert_eq!(Variable::parse("$i3").unwrap(), Variable::new(VarKind::Int, 2));
        assert_eq!(Variable::parse("$x").unwrap(), Variable::new(VarKind::Input, 0));
        assert_eq!(Variable::parse("$y12").unwrap(), Variable::new(VarKind::Output, 11));
    }

    #[test]
    fn reject_bad_sigils() {
        for text in ["$q1", "$f0", "$fx", "f1", "$"] {
            let err = Variable::parse(text).unwrap_err();
            assert_eq!(err.kind, ErrorKind::Semantic, "{text}");
        }
        assert!(Variable::parse("$q1").unwrap_err().message.contains("unknown type"));
    }

    #[test]
    fn variable_display_is_one_based() {
        assert_eq!(Variable::new(VarKind::Vector, 1).to_string(), "$v2");
    }

    #[test]
    fn binary_type_inference() {
        let mut ast = Ast::new();
        let a = ast.int(1);
        let b = ast.int(2);
        let c = ast.float(0.5);
        let ii = ast.binary(BinaryOp::Add, a, b).unwrap();
        let fi = ast.binary(BinaryOp::Add, a, c).unwrap();
        assert_eq!(ast.output_type(ii), OutputType::Int);
        assert_eq!(ast.output_type(fi), OutputType::Float);
    }

    #[test]
    fn depth_is_tracked_and_capped() {
        let mut ast = Ast::new();
        let mut node = ast.int(1);
        assert_eq!(ast.node(node).depth, 1);
        for _ in 1..MAX_DEPTH {
            let one = ast.int(1);
            node = ast.binary(BinaryOp::Add, node, one).unwrap();
        }
        assert_eq!(ast.node(node).depth, MAX_DEPTH);

        let one = ast.int(1);
        let err = ast.binary(BinaryOp::Add, node, one).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Syntax);
        assert!(err.message.contains("nested too deeply"));
    }

    #[test]
    fn unary_mirrors_operand() {
        let mut ast = Ast::new();
        let i = ast.variable(Variable::new(VarKind::Int, 0));
        let n = ast.unary(UnaryOp::Negate, i).unwrap();
        assert_eq!(ast.output_type(n), OutputType::Int);
    }

    #[test]
    fn string_operands_rejected() {
        let mut ast = Ast::new();
        let s = ast.quoted_literal("tab");
        let one = ast.int(1);
        assert!(ast.binary(BinaryOp::Add, s, one).is_err());
        assert!(ast.unary(UnaryOp::Negate, s).is_err());
    }

    #[test]
    fn call_signature_checks() {
        let mut ast = Ast::new();
        let a = ast.float(1.0);
        let b = ast.float(2.0);
        let err = ast.call("sin", vec![a, b]).unwrap_err();
        assert_eq!(err.message, "function sin expects 1 arguments, got: 2");

        let err = ast.call("nope", vec![a]).unwrap_err();
        assert_eq!(err.message, "function not found with name: nope");

        let err = ast.call("size", vec![a]).unwrap_err();
        assert_eq!(err.message, "function size arg 0 type mismatch");

        let s = ast.quoted_literal("tab");
        let err = ast.call("sin", vec![s]).unwrap_err();
        assert_eq!(err.message, "function sin arg 0 type mismatch");
        assert!(ast.call("size", vec![s]).is_ok());
    }

    #[test]
    fn call_type_inference() {
        let mut ast = Ast::new();
        let i = ast.int(3);
        let f = ast.float(3.0);
        let int_of_float = ast.call("int", vec![f]).unwrap();
        let float_of_int = ast.call("float", vec![i]).unwrap();
        let abs_int = ast.call("abs", vec![i]).unwrap();
        let abs_float = ast.call("abs", vec![f]).unwrap();
        assert_eq!(ast.output_type(int_of_float), OutputType::Int);
        assert_eq!(ast.output_type(float_of_int), OutputType::Float);
        assert_eq!(ast.output_type(abs_int), OutputType::Int);
        assert_eq!(ast.output_type(abs_float), OutputType::Float);
    }

    #[test]
    fn quoting_requires_symbol_variable() {
        let mut ast = Ast::new();
        let s = ast.variable(Variable::new(VarKind::Symbol, 0));
        let f = ast.variable(Variable::new(VarKind::Float, 0));
        let q = ast.quoted_variable(s).unwrap();
        assert_eq!(ast.output_type(q), OutputType::String);
        assert!(ast.quoted_variable(f).is_err());
    }

    #[test]
    fn sample_access_requires_history_variable() {
        let mut ast = Ast::new();
        let x = ast.variable(Variable::new(VarKind::Input, 0));
        let f = ast.variable(Variable::new(VarKind::Float, 0));
        let off = ast.int(-1);
        assert!(ast.sample_access(x, off).is_ok());
        assert!(ast.sample_access(f, off).is_err());
    }

    #[test]
    fn array_assignment_rejects_vectors() {
        let mut ast = Ast::new();
        let v = ast.variable(Variable::new(VarKind::Vector, 0));
        let s = ast.variable(Variable::new(VarKind::Symbol, 1));
        let idx = ast.int(0);
        let val = ast.float(1.0);
        let va = ast.array_access(TableRef::Variable(v), idx).unwrap();
        let sa = ast.array_access(TableRef::Variable(s), idx).unwrap();
        assert!(ast.array_assignment(va, val).is_err());
        assert!(ast.array_assignment(sa, val).is_ok());

        let f = ast.variable(Variable::new(VarKind::Float, 2));
        assert!(ast.array_access(TableRef::Variable(f), idx).is_err());
    }

    #[test]
    fn assignment_mirrors_value_type() {
        let mut ast = Ast::new();
        let i = ast.int(4);
        let a = ast.value_assignment("count", i).unwrap();
        assert_eq!(ast.output_type(a), OutputType::Int);
    }

    #[test]
    fn collect_variables() {
        let mut ast = Ast::new();
        let a = ast.variable(Variable::new(VarKind::Float, 0));
        let b = ast.variable(Variable::new(VarKind::Int, 1));
        let sum = ast.binary(BinaryOp::Add, a, b).unwrap();
        let call = ast.call("sin", vec![sum]).unwrap();
        let mut seen = Vec::new();
        ast.for_each_variable(call, &mut |v| seen.push(v));
        assert_eq!(
            seen,
            vec![Variable::new(VarKind::Float, 0), Variable::new(VarKind::Int, 1)]
        );
    }
}
