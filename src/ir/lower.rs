//! Lowering from the typed AST to IR.
//!
//! Every sub-expression is bound to a temporary, in left-to-right
//! evaluation order. Instructions that carry a user binding are emitted
//! under the binder's unique name and do not draw from the `$k`
//! counter; a plain `let` lowers its bound expression and renames the
//! resulting instruction to the binder.
//!
//! `match` is rewritten here:
//! `if issome x then (y = derefsome x; …) else …`.
//!
//! The comparison operand restriction lives in this phase because it
//! constrains the operand type *after* inference has finished.

use std::fmt;

use crate::ast::{self, BinOp, Expr, UnaryOp};
use crate::source::Span;
use crate::types::{Env, Type};

use super::{Block, Insn, InsnKind};

/// An error raised while emitting IR (comparison on a forbidden type).
#[derive(Debug, Clone)]
pub struct EmitError {
    pub msg: String,
    pub span: Span,
}

impl fmt::Display for EmitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Semantic error at {}: {}", self.span.start, self.msg)
    }
}

impl std::error::Error for EmitError {}

/// Lowers a typed, alpha-transformed AST into the root `program` block.
pub fn from_ast(root: &Expr, env: &Env) -> Result<Block, EmitError> {
    let mut emitter = Emitter { env, count: 0 };
    let mut block = Block::new("program");
    emitter.emit(&mut block, root)?;
    Ok(block)
}

struct Emitter<'a> {
    env: &'a Env,
    count: usize,
}

impl Emitter<'_> {
    fn fresh(&mut self) -> String {
        self.count += 1;
        format!("$k{}", self.count)
    }

    /// Pushes an anonymous instruction under a fresh `$k` identifier.
    fn push(&mut self, block: &mut Block, kind: InsnKind, ty: Type) -> (String, Type) {
        let ident = self.fresh();
        block.insns.push(Insn {
            ident: ident.clone(),
            kind,
            ty: ty.clone(),
        });
        (ident, ty)
    }

    /// Pushes an instruction carrying a user binding's unique name.
    fn push_named(
        &mut self,
        block: &mut Block,
        ident: String,
        kind: InsnKind,
        ty: Type,
    ) -> (String, Type) {
        block.insns.push(Insn {
            ident: ident.clone(),
            kind,
            ty: ty.clone(),
        });
        (ident, ty)
    }

    fn lookup_var(&self, name: &str) -> Type {
        match self
            .env
            .table
            .get(name)
            .or_else(|| self.env.externals.get(name))
        {
            Some(t) => t.clone(),
            None => unreachable!("variable '{}' has no inferred type", name),
        }
    }

    fn check_comparable(&self, ty: &Type, op: BinOp, span: Span) -> Result<(), EmitError> {
        match ty.resolve() {
            Type::Unit | Type::Tuple(_) | Type::Option(_) | Type::Array(_) | Type::Fun { .. } => {
                Err(EmitError {
                    msg: format!("'{}' can't be compared with operator '{}'", ty, op.op_str()),
                    span,
                })
            }
            _ => Ok(()),
        }
    }

    fn emit(&mut self, block: &mut Block, e: &Expr) -> Result<(String, Type), EmitError> {
        match e {
            Expr::Unit { .. } => Ok(self.push(block, InsnKind::Unit, Type::Unit)),
            Expr::Bool { value, .. } => Ok(self.push(block, InsnKind::Bool(*value), Type::Bool)),
            Expr::Int { value, .. } => Ok(self.push(block, InsnKind::Int(*value), Type::Int)),
            Expr::Float { value, .. } => {
                Ok(self.push(block, InsnKind::Float(*value), Type::Float))
            }
            Expr::String { value, .. } => Ok(self.push(
                block,
                InsnKind::String(value.clone()),
                Type::String,
            )),

            Expr::VarRef { symbol, .. } => {
                let ty = self.lookup_var(&symbol.name);
                Ok(self.push(block, InsnKind::Ref(symbol.name.clone()), ty))
            }

            Expr::Unary { op, child, .. } => {
                let (c, _) = self.emit(block, child)?;
                let ty = match op {
                    UnaryOp::Not => Type::Bool,
                    UnaryOp::Neg => Type::Int,
                    UnaryOp::FNeg => Type::Float,
                };
                Ok(self.push(block, InsnKind::Unary { op: *op, child: c }, ty))
            }

            Expr::Binary {
                op,
                left,
                right,
                span,
            } => {
                let (l, lt) = self.emit(block, left)?;
                let (r, _) = self.emit(block, right)?;
                if op.is_relational() {
                    self.check_comparable(&lt, *op, *span)?;
                }
                let ty = binary_type(*op);
                Ok(self.push(
                    block,
                    InsnKind::Binary {
                        op: *op,
                        left: l,
                        right: r,
                    },
                    ty,
                ))
            }

            Expr::If {
                cond,
                then_expr,
                else_expr,
                ..
            } => {
                let (c, _) = self.emit(block, cond)?;
                let mut then_blk = Block::new("then");
                let (_, then_ty) = self.emit(&mut then_blk, then_expr)?;
                let mut else_blk = Block::new("else");
                self.emit(&mut else_blk, else_expr)?;
                Ok(self.push(
                    block,
                    InsnKind::If {
                        cond: c,
                        then_blk,
                        else_blk,
                    },
                    then_ty,
                ))
            }

            Expr::Let {
                symbol,
                bound,
                body,
                ..
            } => {
                self.emit(block, bound)?;
                if let Some(last) = block.insns.last_mut() {
                    last.ident = symbol.name.clone();
                }
                self.emit(block, body)
            }

            Expr::LetRec { func, body, .. } => {
                let fun_ty = self.lookup_var(&func.symbol.name);
                let mut body_blk = Block::new(format!("body ({})", func.symbol.name));
                self.emit(&mut body_blk, &func.body)?;
                let is_recursive = ast::find(&func.body, &|n| {
                    matches!(n, Expr::VarRef { symbol, .. } if symbol.name == func.symbol.name)
                });
                self.push_named(
                    block,
                    func.symbol.name.clone(),
                    InsnKind::Fun {
                        params: func.params.iter().map(|p| p.symbol.name.clone()).collect(),
                        body: body_blk,
                        is_recursive,
                    },
                    fun_ty,
                );
                self.emit(block, body)
            }

            Expr::LetTuple {
                symbols,
                bound,
                body,
                ..
            } => {
                let (bid, bty) = self.emit(block, bound)?;
                let elem_tys = match bty.resolve() {
                    Type::Tuple(ts) => ts,
                    _ => unreachable!("tuple binding must have tuple type"),
                };
                for (i, sym) in symbols.iter().enumerate() {
                    self.push_named(
                        block,
                        sym.name.clone(),
                        InsnKind::TplLoad {
                            index: i,
                            tuple: bid.clone(),
                        },
                        elem_tys[i].clone(),
                    );
                }
                self.emit(block, body)
            }

            Expr::Apply { callee, args, .. } => {
                let (cid, cty) = self.emit(block, callee)?;
                let mut arg_ids = Vec::with_capacity(args.len());
                for a in args {
                    let (id, _) = self.emit(block, a)?;
                    arg_ids.push(id);
                }
                let ret = match cty.resolve() {
                    Type::Fun { ret, .. } => *ret,
                    _ => unreachable!("callee must have function type"),
                };
                Ok(self.push(
                    block,
                    InsnKind::App {
                        callee: cid,
                        args: arg_ids,
                    },
                    ret,
                ))
            }

            Expr::Tuple { elems, .. } => {
                let mut ids = Vec::with_capacity(elems.len());
                let mut tys = Vec::with_capacity(elems.len());
                for elem in elems {
                    let (id, ty) = self.emit(block, elem)?;
                    ids.push(id);
                    tys.push(ty);
                }
                Ok(self.push(block, InsnKind::Tuple(ids), Type::Tuple(tys)))
            }

            Expr::ArrayCreate { size, elem, .. } => {
                let (s, _) = self.emit(block, size)?;
                let (el, elem_ty) = self.emit(block, elem)?;
                Ok(self.push(
                    block,
                    InsnKind::Array { size: s, elem: el },
                    Type::Array(Box::new(elem_ty)),
                ))
            }

            Expr::ArraySize { target, .. } => {
                let (t, _) = self.emit(block, target)?;
                Ok(self.push(block, InsnKind::ArrLen(t), Type::Int))
            }

            Expr::Get { array, index, .. } => {
                let (a, at) = self.emit(block, array)?;
                let (i, _) = self.emit(block, index)?;
                let elem_ty = array_elem(&at);
                Ok(self.push(block, InsnKind::ArrLoad { index: i, array: a }, elem_ty))
            }

            Expr::Put {
                array,
                index,
                value,
                ..
            } => {
                let (a, _) = self.emit(block, array)?;
                let (i, _) = self.emit(block, index)?;
                let (v, vt) = self.emit(block, value)?;
                Ok(self.push(
                    block,
                    InsnKind::ArrStore {
                        index: i,
                        array: a,
                        value: v,
                    },
                    vt,
                ))
            }

            Expr::Some { child, .. } => {
                let (c, ct) = self.emit(block, child)?;
                Ok(self.push(block, InsnKind::Some(c), Type::Option(Box::new(ct))))
            }

            Expr::None { span } => {
                let key = (span.start.offset, span.end.offset);
                let ty = match self.env.none_types.get(&key) {
                    Some(t) => t.clone(),
                    None => unreachable!("'None' literal has no inferred type"),
                };
                Ok(self.push(block, InsnKind::None, ty))
            }

            Expr::Match {
                target,
                if_some,
                if_none,
                some_sym,
                ..
            } => {
                let (tid, tty) = self.emit(block, target)?;
                let (cond, _) = self.push(block, InsnKind::IsSome(tid.clone()), Type::Bool);
                let elem_ty = option_elem(&tty);
                let mut then_blk = Block::new("then");
                self.push_named(
                    &mut then_blk,
                    some_sym.name.clone(),
                    InsnKind::DerefSome(tid),
                    elem_ty,
                );
                let (_, then_ty) = self.emit(&mut then_blk, if_some)?;
                let mut else_blk = Block::new("else");
                self.emit(&mut else_blk, if_none)?;
                Ok(self.push(
                    block,
                    InsnKind::If {
                        cond,
                        then_blk,
                        else_blk,
                    },
                    then_ty,
                ))
            }

            Expr::Typed { child, .. } => self.emit(block, child),
        }
    }
}

fn binary_type(op: BinOp) -> Type {
    use BinOp::*;
    match op {
        Add | Sub | Mul | Div | Mod => Type::Int,
        FAdd | FSub | FMul | FDiv => Type::Float,
        Eq | NotEq | Less | LessEq | Greater | GreaterEq | And | Or => Type::Bool,
    }
}

fn array_elem(ty: &Type) -> Type {
    match ty.resolve() {
        Type::Array(elem) => *elem,
        _ => unreachable!("array type expected"),
    }
}

fn option_elem(ty: &Type) -> Type {
    match ty.resolve() {
        Type::Option(elem) => *elem,
        _ => unreachable!("option type expected"),
    }
}
