//! Sandboxed filter expressions over configuration entries
//!
//! A small predicate language used to select entries of a repeating group
//! ("unused disks of a given bus protocol") without ever evaluating
//! host-language code. The grammar covers comparisons, boolean composition,
//! and a `parent` traversal segment; evaluation fails closed: an ill-formed
//! expression is a parse error, and an expression that cannot be resolved
//! against an entry matches nothing.
//!
//! ```
//! use scpkit_expr::{compile, eval, ExprValue, Scope};
//!
//! struct Disk;
//! impl Scope for Disk {
//!     fn field(&self, name: &str) -> Option<ExprValue> {
//!         match name {
//!             "BusProtocol" => Some(ExprValue::Str("SAS".into())),
//!             "Size" => Some(ExprValue::Int(500)),
//!             _ => None,
//!         }
//!     }
//!     fn parent(&self) -> Option<Box<dyn Scope + '_>> {
//!         None
//!     }
//! }
//!
//! let expr = compile("BusProtocol == 'SAS' and Size >= 100").unwrap();
//! assert!(eval(&expr, &Disk).unwrap());
//! ```

mod parser;

use thiserror::Error;

pub use parser::compile;

#[derive(Error, Debug)]
pub enum ExprError {
    #[error("parse error: {0}")]
    Parse(String),
    #[error("unknown field '{0}'")]
    UnknownField(String),
    #[error("no parent scope to traverse")]
    NoParent,
    #[error("type error: {0}")]
    Type(String),
}

/// Value produced by resolving a path against a scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExprValue {
    Str(String),
    Int(i64),
    Bool(bool),
}

impl ExprValue {
    fn wire(&self) -> String {
        match self {
            ExprValue::Str(s) => s.clone(),
            ExprValue::Int(i) => i.to_string(),
            ExprValue::Bool(true) => "True".to_string(),
            ExprValue::Bool(false) => "False".to_string(),
        }
    }
}

/// Resolution surface an entry exposes to the evaluator.
pub trait Scope {
    /// Look up a field value by name on this entry.
    fn field(&self, name: &str) -> Option<ExprValue>;
    /// Climb to the enclosing entry, if any.
    fn parent(&self) -> Option<Box<dyn Scope + '_>>;
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Parsed expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(ExprValue),
    /// Dotted path; `parent` segments climb the scope chain
    Path(Vec<String>),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Cmp(CmpOp, Box<Expr>, Box<Expr>),
}

/// Evaluate an expression as a predicate against one scope.
pub fn eval(expr: &Expr, scope: &dyn Scope) -> Result<bool, ExprError> {
    match expr {
        Expr::Not(inner) => Ok(!eval(inner, scope)?),
        Expr::And(l, r) => Ok(eval(l, scope)? && eval(r, scope)?),
        Expr::Or(l, r) => Ok(eval(l, scope)? || eval(r, scope)?),
        Expr::Cmp(op, l, r) => {
            let lv = eval_value(l, scope)?;
            let rv = eval_value(r, scope)?;
            compare(*op, &lv, &rv)
        }
        other => match eval_value(other, scope)? {
            ExprValue::Bool(b) => Ok(b),
            v => Err(ExprError::Type(format!(
                "'{}' is not a boolean",
                v.wire()
            ))),
        },
    }
}

fn eval_value(expr: &Expr, scope: &dyn Scope) -> Result<ExprValue, ExprError> {
    match expr {
        Expr::Literal(v) => Ok(v.clone()),
        Expr::Path(segments) => resolve_path(segments, scope),
        other => Ok(ExprValue::Bool(eval(other, scope)?)),
    }
}

fn resolve_path(segments: &[String], scope: &dyn Scope) -> Result<ExprValue, ExprError> {
    match segments {
        [] => Err(ExprError::Type("empty path".to_string())),
        [name] => {
            if name == "parent" {
                return Err(ExprError::Type(
                    "'parent' must be followed by a field name".to_string(),
                ));
            }
            scope
                .field(name)
                .ok_or_else(|| ExprError::UnknownField(name.clone()))
        }
        [head, rest @ ..] => {
            if head != "parent" {
                return Err(ExprError::Type(format!(
                    "'{}' cannot be traversed; only 'parent' segments may precede a field",
                    head
                )));
            }
            let up = scope.parent().ok_or(ExprError::NoParent)?;
            resolve_path(rest, up.as_ref())
        }
    }
}

fn compare(op: CmpOp, lhs: &ExprValue, rhs: &ExprValue) -> Result<bool, ExprError> {
    use ExprValue::*;
    match (lhs, rhs) {
        (Int(l), Int(r)) => Ok(cmp_ordered(op, l.cmp(r))),
        (Bool(l), Bool(r)) => match op {
            CmpOp::Eq => Ok(l == r),
            CmpOp::Ne => Ok(l != r),
            _ => Err(ExprError::Type("booleans only support == and !=".to_string())),
        },
        (Str(l), Str(r)) => match op {
            CmpOp::Eq => Ok(l == r),
            CmpOp::Ne => Ok(l != r),
            _ => match (l.trim().parse::<i64>(), r.trim().parse::<i64>()) {
                (Ok(li), Ok(ri)) => Ok(cmp_ordered(op, li.cmp(&ri))),
                _ => Err(ExprError::Type(format!(
                    "cannot order '{}' against '{}'",
                    l, r
                ))),
            },
        },
        (Str(s), Int(i)) | (Int(i), Str(s)) => match s.trim().parse::<i64>() {
            Ok(si) => {
                let (l, r) = if matches!(lhs, Str(_)) { (si, *i) } else { (*i, si) };
                Ok(cmp_ordered(op, l.cmp(&r)))
            }
            Err(_) => match op {
                CmpOp::Eq => Ok(false),
                CmpOp::Ne => Ok(true),
                _ => Err(ExprError::Type(format!(
                    "cannot order '{}' against {}",
                    s, i
                ))),
            },
        },
        (Bool(b), Str(s)) | (Str(s), Bool(b)) => match op {
            CmpOp::Eq | CmpOp::Ne => {
                let eq = s.eq_ignore_ascii_case(if *b { "true" } else { "false" });
                Ok(if op == CmpOp::Eq { eq } else { !eq })
            }
            _ => Err(ExprError::Type("cannot order a boolean".to_string())),
        },
        (Bool(_), Int(_)) | (Int(_), Bool(_)) => {
            Err(ExprError::Type("cannot compare boolean and integer".to_string()))
        }
    }
}

fn cmp_ordered(op: CmpOp, ord: std::cmp::Ordering) -> bool {
    use std::cmp::Ordering::*;
    match op {
        CmpOp::Eq => ord == Equal,
        CmpOp::Ne => ord != Equal,
        CmpOp::Lt => ord == Less,
        CmpOp::Le => ord != Greater,
        CmpOp::Gt => ord == Greater,
        CmpOp::Ge => ord != Less,
    }
}
