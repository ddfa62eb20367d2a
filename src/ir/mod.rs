//! Block-structured three-address intermediate representation.
//!
//! A [`Block`] is a named, ordered list of instructions; its value is
//! the value of its last instruction. Instruction identifiers are
//! either fresh temporaries `$k<N>` or a user binding's unique name.
//!
//! The textual form, used by the tests and for debugging, prints one
//! instruction per line as `<ident> = <op> <operands> ; type=<T>`, with
//! nested blocks delimited by `BEGIN: <name>` / `END: <name>`.

pub mod elim_ref;
pub mod lower;

use std::fmt;

use crate::ast::{BinOp, UnaryOp};
use crate::types::Type;

#[derive(Debug)]
pub struct Block {
    pub name: String,
    pub insns: Vec<Insn>,
}

impl Block {
    pub fn new(name: impl Into<String>) -> Block {
        Block {
            name: name.into(),
            insns: Vec::new(),
        }
    }
}

#[derive(Debug)]
pub struct Insn {
    pub ident: String,
    pub kind: InsnKind,
    pub ty: Type,
}

#[derive(Debug)]
pub enum InsnKind {
    Unit,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Unary {
        op: UnaryOp,
        child: String,
    },
    Binary {
        op: BinOp,
        left: String,
        right: String,
    },
    /// Reference to a binding defined in this unit.
    Ref(String),
    /// Reference to an external symbol, resolved at link time.
    XRef(String),
    If {
        cond: String,
        then_blk: Block,
        else_blk: Block,
    },
    App {
        callee: String,
        args: Vec<String>,
    },
    Fun {
        params: Vec<String>,
        body: Block,
        is_recursive: bool,
    },
    Tuple(Vec<String>),
    TplLoad {
        index: usize,
        tuple: String,
    },
    Array {
        size: String,
        elem: String,
    },
    ArrLen(String),
    ArrLoad {
        index: String,
        array: String,
    },
    ArrStore {
        index: String,
        array: String,
        value: String,
    },
    Some(String),
    None,
    IsSome(String),
    DerefSome(String),
    /// Closure allocation: function pointer plus captured values.
    /// Introduced by closure conversion.
    MakeCls {
        fun: String,
        captures: Vec<String>,
    },
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_block(self, f)
    }
}

fn write_block(b: &Block, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    writeln!(f, "BEGIN: {}", b.name)?;
    for insn in &b.insns {
        write_insn(insn, f)?;
    }
    writeln!(f, "END: {}", b.name)
}

fn write_insn(insn: &Insn, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    writeln!(f, "{} = {} ; type={}", insn.ident, op_text(&insn.kind), insn.ty)?;
    match &insn.kind {
        InsnKind::If {
            then_blk, else_blk, ..
        } => {
            write_block(then_blk, f)?;
            write_block(else_blk, f)
        }
        InsnKind::Fun { body, .. } => write_block(body, f),
        _ => Ok(()),
    }
}

fn op_text(kind: &InsnKind) -> String {
    use InsnKind::*;
    match kind {
        Unit => "unit".to_string(),
        Bool(b) => format!("bool {}", b),
        Int(i) => format!("int {}", i),
        Float(v) => format!("float {:.6}", v),
        String(s) => format!("string {:?}", s),
        Unary { op, child } => format!("unary {} {}", op.op_str(), child),
        Binary { op, left, right } => format!("binary {} {} {}", op.op_str(), left, right),
        Ref(name) => format!("ref {}", name),
        XRef(name) => format!("xref {}", name),
        If { cond, .. } => format!("if {}", cond),
        App { callee, args } => format!("app {} {}", callee, args.join(" ")),
        Fun { params, .. } => format!("fun {}", params.join(",")),
        Tuple(elems) => format!("tuple {}", elems.join(",")),
        TplLoad { index, tuple } => format!("tplload {} {}", index, tuple),
        Array { size, elem } => format!("array {} {}", size, elem),
        ArrLen(arr) => format!("arrlen {}", arr),
        ArrLoad { index, array } => format!("arrload {} {}", index, array),
        ArrStore {
            index,
            array,
            value,
        } => format!("arrstore {} {} {}", index, array, value),
        Some(v) => format!("some {}", v),
        None => "none".to_string(),
        IsSome(v) => format!("issome {}", v),
        DerefSome(v) => format!("derefsome {}", v),
        MakeCls { fun, captures } => format!("makecls {} ({})", fun, captures.join(",")),
    }
}
