//! Closure conversion.
//!
//! Lifts every nested `fun` instruction to the top level. A function
//! with no free variables whose references only flow into call position
//! becomes a plain top-level function and its defining instruction
//! disappears. Anything else becomes a closure: the body keeps reading
//! the captured names, the capture list fixes their environment slots,
//! and the use site is replaced by a `makecls` instruction producing
//! the closure value.
//!
//! Run after reference elimination, so free names of the unit are
//! already `xref`s and never show up as captures.

use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::ir::{Block, Insn, InsnKind};
use crate::types::Env;

/// A lifted top-level function.
#[derive(Debug)]
pub struct Function {
    pub name: String,
    pub params: Vec<String>,
    /// Captured free variables, in environment-slot order. Empty for a
    /// plain function.
    pub captures: Vec<String>,
    pub body: Block,
    pub is_recursive: bool,
}

/// The closure-converted unit handed to code generation.
#[derive(Debug)]
pub struct Program {
    pub toplevel: Vec<Function>,
    pub entry: Block,
    pub env: Env,
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for func in &self.toplevel {
            writeln!(
                f,
                "FUNCTION {} params=({}) captures=({}) recursive={}",
                func.name,
                func.params.join(","),
                func.captures.join(","),
                func.is_recursive
            )?;
            write!(f, "{}", func.body)?;
        }
        write!(f, "{}", self.entry)
    }
}

pub fn transform(mut entry: Block, env: Env) -> Program {
    let mut usage = Usage::default();
    collect_usage(&entry, &mut usage);
    let mut conv = Converter {
        toplevel: Vec::new(),
        known: HashSet::new(),
        usage,
    };
    conv.transform_block(&mut entry);
    Program {
        toplevel: conv.toplevel,
        entry,
        env,
    }
}

/// Where each identifier is used across the whole program, classified
/// into "result of a `ref`" versus any other operand position. A call
/// through `app`'s callee slot is a direct call and is not recorded.
#[derive(Default)]
struct Usage {
    other_uses: HashSet<String>,
    ref_results: HashMap<String, Vec<String>>,
}

impl Usage {
    fn escapes(&self, name: &str) -> bool {
        if self.other_uses.contains(name) {
            return true;
        }
        match self.ref_results.get(name) {
            Some(refs) => refs
                .iter()
                .any(|r| self.other_uses.contains(r) || self.ref_results.contains_key(r)),
            None => false,
        }
    }
}

fn collect_usage(block: &Block, u: &mut Usage) {
    for insn in &block.insns {
        match &insn.kind {
            InsnKind::Unit
            | InsnKind::Bool(_)
            | InsnKind::Int(_)
            | InsnKind::Float(_)
            | InsnKind::String(_)
            | InsnKind::XRef(_)
            | InsnKind::None => {}
            InsnKind::Ref(name) => {
                u.ref_results
                    .entry(name.clone())
                    .or_default()
                    .push(insn.ident.clone());
            }
            InsnKind::Unary { child, .. } => {
                u.other_uses.insert(child.clone());
            }
            InsnKind::Binary { left, right, .. } => {
                u.other_uses.insert(left.clone());
                u.other_uses.insert(right.clone());
            }
            InsnKind::If {
                cond,
                then_blk,
                else_blk,
            } => {
                u.other_uses.insert(cond.clone());
                collect_usage(then_blk, u);
                collect_usage(else_blk, u);
            }
            InsnKind::App { args, .. } => {
                for a in args {
                    u.other_uses.insert(a.clone());
                }
            }
            InsnKind::Fun { body, .. } => collect_usage(body, u),
            InsnKind::Tuple(elems) => {
                for e in elems {
                    u.other_uses.insert(e.clone());
                }
            }
            InsnKind::TplLoad { tuple, .. } => {
                u.other_uses.insert(tuple.clone());
            }
            InsnKind::Array { size, elem } => {
                u.other_uses.insert(size.clone());
                u.other_uses.insert(elem.clone());
            }
            InsnKind::ArrLen(arr) => {
                u.other_uses.insert(arr.clone());
            }
            InsnKind::ArrLoad { index, array } => {
                u.other_uses.insert(index.clone());
                u.other_uses.insert(array.clone());
            }
            InsnKind::ArrStore {
                index,
                array,
                value,
            } => {
                u.other_uses.insert(index.clone());
                u.other_uses.insert(array.clone());
                u.other_uses.insert(value.clone());
            }
            InsnKind::Some(v) | InsnKind::IsSome(v) | InsnKind::DerefSome(v) => {
                u.other_uses.insert(v.clone());
            }
            InsnKind::MakeCls { captures, .. } => {
                for c in captures {
                    u.other_uses.insert(c.clone());
                }
            }
        }
    }
    // A block's last instruction is its value: it flows out of the
    // block, which is a use like any other.
    if let Some(last) = block.insns.last() {
        u.other_uses.insert(last.ident.clone());
    }
}

struct Converter {
    toplevel: Vec<Function>,
    /// Plain lifted functions: references to them are not captures.
    known: HashSet<String>,
    usage: Usage,
}

impl Converter {
    fn transform_block(&mut self, block: &mut Block) {
        let mut i = 0;
        while i < block.insns.len() {
            if matches!(block.insns[i].kind, InsnKind::Fun { .. }) {
                let insn = block.insns.remove(i);
                let ty = insn.ty;
                let name = insn.ident;
                let (params, mut body, is_recursive) = match insn.kind {
                    InsnKind::Fun {
                        params,
                        body,
                        is_recursive,
                    } => (params, body, is_recursive),
                    _ => unreachable!(),
                };
                // Inner functions first, so their captures appear as
                // makecls operands of this body.
                self.transform_block(&mut body);
                let captures = self.free_vars(&name, &params, &body);
                if captures.is_empty() && !self.usage.escapes(&name) {
                    self.known.insert(name.clone());
                    self.toplevel.push(Function {
                        name,
                        params,
                        captures,
                        body,
                        is_recursive,
                    });
                    // instruction removed; index stays
                } else {
                    block.insns.insert(
                        i,
                        Insn {
                            ident: name.clone(),
                            kind: InsnKind::MakeCls {
                                fun: name.clone(),
                                captures: captures.clone(),
                            },
                            ty,
                        },
                    );
                    self.toplevel.push(Function {
                        name,
                        params,
                        captures,
                        body,
                        is_recursive,
                    });
                    i += 1;
                }
                continue;
            }
            if let InsnKind::If {
                then_blk, else_blk, ..
            } = &mut block.insns[i].kind
            {
                self.transform_block(then_blk);
                self.transform_block(else_blk);
            }
            i += 1;
        }
    }

    /// Free variables of a function body: names used but neither bound
    /// in the body, nor parameters, nor lifted plain functions. A
    /// direct-call-only self reference is not a capture; a self
    /// reference escaping within the body puts the function into its
    /// own environment.
    fn free_vars(&self, name: &str, params: &[String], body: &Block) -> Vec<String> {
        let mut local = Usage::default();
        collect_usage(body, &mut local);
        let self_escapes = local.escapes(name);

        let mut bound: HashSet<String> = params.iter().cloned().collect();
        if !self_escapes {
            bound.insert(name.to_string());
        }
        let mut free = Vec::new();
        collect_free(body, &mut bound, &mut free, &self.known);
        free.sort();
        free.dedup();
        free
    }
}

fn use_name(n: &str, bound: &HashSet<String>, known: &HashSet<String>, free: &mut Vec<String>) {
    if !bound.contains(n) && !known.contains(n) {
        free.push(n.to_string());
    }
}

fn collect_free(
    block: &Block,
    bound: &mut HashSet<String>,
    free: &mut Vec<String>,
    known: &HashSet<String>,
) {
    for insn in &block.insns {
        match &insn.kind {
            InsnKind::Unit
            | InsnKind::Bool(_)
            | InsnKind::Int(_)
            | InsnKind::Float(_)
            | InsnKind::String(_)
            | InsnKind::XRef(_)
            | InsnKind::None => {}
            InsnKind::Ref(name) => use_name(name, bound, known, free),
            InsnKind::Unary { child, .. } => use_name(child, bound, known, free),
            InsnKind::Binary { left, right, .. } => {
                use_name(left, bound, known, free);
                use_name(right, bound, known, free);
            }
            InsnKind::If {
                cond,
                then_blk,
                else_blk,
            } => {
                use_name(cond, bound, known, free);
                collect_free(then_blk, bound, free, known);
                collect_free(else_blk, bound, free, known);
            }
            InsnKind::App { callee, args } => {
                use_name(callee, bound, known, free);
                for a in args {
                    use_name(a, bound, known, free);
                }
            }
            InsnKind::Fun { params, body, .. } => {
                let mut inner: HashSet<String> = bound.clone();
                inner.extend(params.iter().cloned());
                collect_free(body, &mut inner, free, known);
            }
            InsnKind::Tuple(elems) => {
                for e in elems {
                    use_name(e, bound, known, free);
                }
            }
            InsnKind::TplLoad { tuple, .. } => use_name(tuple, bound, known, free),
            InsnKind::Array { size, elem } => {
                use_name(size, bound, known, free);
                use_name(elem, bound, known, free);
            }
            InsnKind::ArrLen(arr) => use_name(arr, bound, known, free),
            InsnKind::ArrLoad { index, array } => {
                use_name(index, bound, known, free);
                use_name(array, bound, known, free);
            }
            InsnKind::ArrStore {
                index,
                array,
                value,
            } => {
                use_name(index, bound, known, free);
                use_name(array, bound, known, free);
                use_name(value, bound, known, free);
            }
            InsnKind::Some(v) | InsnKind::IsSome(v) | InsnKind::DerefSome(v) => {
                use_name(v, bound, known, free)
            }
            InsnKind::MakeCls { captures, .. } => {
                for c in captures {
                    use_name(c, bound, known, free);
                }
            }
        }
        bound.insert(insn.ident.clone());
    }
}
