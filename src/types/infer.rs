//! Type inference.
//!
//! Syntax-directed constraint generation with immediate unification.
//! There is no let-generalization for user bindings; builtins are
//! monomorphic. `let rec` registers the function type before its body
//! is inferred, which is what makes recursion type-check.

use std::collections::HashMap;

use crate::ast::{BinOp, Expr, TypeDecl, TypeExpr, UnaryOp, AST};
use crate::source::Span;

use super::env::Env;
use super::error::TypeError;
use super::ty::Type;
use super::unify::{ordinal, unify};

/// Runs inference over a whole (alpha-transformed) AST and returns the
/// populated environment with every type fully resolved.
pub fn type_inference(ast: &AST) -> Result<Env, TypeError> {
    let conv = TypeExprConv::new(&ast.type_decls)?;
    let mut inferer = Inferer {
        env: Env::new(),
        conv,
    };
    inferer.infer(&ast.root)?;
    inferer.env.dereference();
    Ok(inferer.env)
}

/// Resolves written type expressions against the builtin constructors
/// and the `type name = ty` declarations of the unit.
struct TypeExprConv {
    decls: HashMap<String, Type>,
}

impl TypeExprConv {
    fn new(decls: &[TypeDecl]) -> Result<TypeExprConv, TypeError> {
        let mut conv = TypeExprConv {
            decls: HashMap::new(),
        };
        for d in decls {
            let t = conv.conv(&d.type_expr)?;
            conv.decls.insert(d.name.clone(), t);
        }
        Ok(conv)
    }

    fn conv(&self, te: &TypeExpr) -> Result<Type, TypeError> {
        match te {
            TypeExpr::Ctor { name, args, span } => match (name.as_str(), args.len()) {
                ("unit", 0) => Ok(Type::Unit),
                ("bool", 0) => Ok(Type::Bool),
                ("int", 0) => Ok(Type::Int),
                ("float", 0) => Ok(Type::Float),
                ("string", 0) => Ok(Type::String),
                ("array", 1) => Ok(Type::Array(Box::new(self.conv(&args[0])?))),
                ("option", 1) => Ok(Type::Option(Box::new(self.conv(&args[0])?))),
                ("array", n) | ("option", n) => Err(TypeError::new(
                    format!(
                        "Wrong number of type parameters for '{}': 1 is expected but given {}",
                        name, n
                    ),
                    *span,
                )),
                (other, 0) => match self.decls.get(other) {
                    Some(t) => Ok(t.clone()),
                    None => Err(TypeError::new(
                        format!("Unknown type constructor '{}'", other),
                        *span,
                    )),
                },
                (other, _) if self.decls.contains_key(other) => Err(TypeError::new(
                    format!("Type constructor '{}' cannot take type parameters", other),
                    *span,
                )),
                (other, _) => Err(TypeError::new(
                    format!("Unknown type constructor '{}'", other),
                    *span,
                )),
            },
            TypeExpr::Tuple { elems, .. } => {
                let mut ts = Vec::with_capacity(elems.len());
                for e in elems {
                    ts.push(self.conv(e)?);
                }
                Ok(Type::Tuple(ts))
            }
            TypeExpr::Func { params, ret, .. } => {
                let mut ps = Vec::with_capacity(params.len());
                for p in params {
                    ps.push(self.conv(p)?);
                }
                Ok(Type::fun(ps, self.conv(ret)?))
            }
        }
    }
}

struct Inferer {
    env: Env,
    conv: TypeExprConv,
}

impl Inferer {
    fn unify_at(&self, l: &Type, r: &Type, span: Span) -> Result<(), TypeError> {
        unify(l, r).map_err(|e| TypeError::from_unify(e, span))
    }

    fn infer(&mut self, e: &Expr) -> Result<Type, TypeError> {
        match e {
            Expr::Unit { .. } => Ok(Type::Unit),
            Expr::Bool { .. } => Ok(Type::Bool),
            Expr::Int { .. } => Ok(Type::Int),
            Expr::Float { .. } => Ok(Type::Float),
            Expr::String { .. } => Ok(Type::String),

            Expr::VarRef { symbol, .. } => {
                if let Some(t) = self.env.table.get(&symbol.name) {
                    return Ok(t.clone());
                }
                if let Some(t) = self.env.externals.get(&symbol.name) {
                    return Ok(t.clone());
                }
                // First use of an undefined name: a free variable whose
                // type is pinned down by its uses.
                let v = Type::fresh_var();
                self.env
                    .externals
                    .insert(symbol.name.clone(), v.clone());
                Ok(v)
            }

            Expr::Unary { op, child, .. } => {
                let t = self.infer(child)?;
                match op {
                    UnaryOp::Not => {
                        self.unify_at(&Type::Bool, &t, child.span())?;
                        Ok(Type::Bool)
                    }
                    UnaryOp::Neg => {
                        self.unify_at(&Type::Int, &t, child.span())?;
                        Ok(Type::Int)
                    }
                    UnaryOp::FNeg => {
                        unify(&Type::Float, &t).map_err(|_| {
                            TypeError::new(
                                format!(
                                    "operand of unary operator '-.' must be 'float' but found '{}'",
                                    t
                                ),
                                child.span(),
                            )
                        })?;
                        Ok(Type::Float)
                    }
                }
            }

            Expr::Binary {
                op,
                left,
                right,
                span,
            } => self.infer_binary(*op, left, right, *span),

            Expr::If {
                cond,
                then_expr,
                else_expr,
                ..
            } => {
                let cond_t = self.infer(cond)?;
                self.unify_at(&Type::Bool, &cond_t, cond.span())?;
                let then_t = self.infer(then_expr)?;
                let else_t = self.infer(else_expr)?;
                self.unify_at(&then_t, &else_t, else_expr.span())?;
                Ok(then_t)
            }

            Expr::Let {
                symbol,
                type_ann,
                bound,
                body,
                ..
            } => {
                let bound_t = self.infer(bound)?;
                if let Some(ann) = type_ann {
                    let ann_t = self.conv.conv(ann)?;
                    self.unify_at(&ann_t, &bound_t, bound.span())?;
                }
                self.env.table.insert(symbol.name.clone(), bound_t);
                self.infer(body)
            }

            Expr::LetRec { func, body, .. } => {
                let fname = &func.symbol.display_name;
                let mut param_types = Vec::with_capacity(func.params.len());
                for (i, p) in func.params.iter().enumerate() {
                    let t = match &p.type_ann {
                        Some(ann) => self.conv.conv(ann).map_err(|e| {
                            e.note(format!(
                                "{} parameter of function '{}'",
                                ordinal(i + 1),
                                fname
                            ))
                        })?,
                        None => Type::fresh_var(),
                    };
                    self.env.table.insert(p.symbol.name.clone(), t.clone());
                    param_types.push(t);
                }
                let ret_t = match &func.ret_type {
                    Some(ann) => self
                        .conv
                        .conv(ann)
                        .map_err(|e| e.note(format!("return type of function '{}'", fname)))?,
                    None => Type::fresh_var(),
                };
                // The function's type is visible inside its own body.
                self.env.table.insert(
                    func.symbol.name.clone(),
                    Type::fun(param_types, ret_t.clone()),
                );
                let body_t = self.infer(&func.body)?;
                unify(&ret_t, &body_t).map_err(|e| {
                    TypeError::from_unify(e, func.body.span())
                        .note(format!("return type of function '{}'", fname))
                })?;
                self.infer(body)
            }

            Expr::LetTuple {
                symbols,
                type_ann,
                bound,
                body,
                span,
            } => {
                let bound_t = self.infer(bound)?;
                let mut elem_types = Vec::with_capacity(symbols.len());
                for sym in symbols {
                    let v = Type::fresh_var();
                    self.env.table.insert(sym.name.clone(), v.clone());
                    elem_types.push(v);
                }
                let syms_t = Type::Tuple(elem_types);
                if let Some(ann) = type_ann {
                    let ann_t = self.conv.conv(ann)?;
                    if !matches!(ann_t.resolve(), Type::Tuple(_)) {
                        return Err(TypeError::new(
                            format!(
                                "type of 'let' tuple binding must be tuple, but found '{}'",
                                ann_t
                            ),
                            ann.span(),
                        ));
                    }
                    self.unify_at(&ann_t, &syms_t, *span)?;
                }
                self.unify_at(&syms_t, &bound_t, bound.span())?;
                self.infer(body)
            }

            Expr::Apply {
                callee, args, span, ..
            } => {
                let callee_t = self.infer(callee)?;
                let mut arg_types = Vec::with_capacity(args.len());
                for a in args {
                    arg_types.push(self.infer(a)?);
                }
                let ret = Type::fresh_var();
                self.unify_at(&callee_t, &Type::fun(arg_types, ret.clone()), *span)?;
                Ok(ret)
            }

            Expr::Tuple { elems, .. } => {
                let mut ts = Vec::with_capacity(elems.len());
                for e in elems {
                    ts.push(self.infer(e)?);
                }
                Ok(Type::Tuple(ts))
            }

            Expr::ArrayCreate { size, elem, .. } => {
                let size_t = self.infer(size)?;
                self.unify_at(&Type::Int, &size_t, size.span())?;
                let elem_t = self.infer(elem)?;
                Ok(Type::Array(Box::new(elem_t)))
            }

            Expr::ArraySize { target, .. } => {
                let t = self.infer(target)?;
                self.unify_at(
                    &Type::Array(Box::new(Type::fresh_var())),
                    &t,
                    target.span(),
                )?;
                Ok(Type::Int)
            }

            Expr::Get { array, index, .. } => {
                let arr_t = self.infer(array)?;
                let idx_t = self.infer(index)?;
                self.unify_at(&Type::Int, &idx_t, index.span())?;
                let elem = Type::fresh_var();
                self.unify_at(&Type::Array(Box::new(elem.clone())), &arr_t, array.span())?;
                Ok(elem)
            }

            Expr::Put {
                array,
                index,
                value,
                ..
            } => {
                let arr_t = self.infer(array)?;
                let idx_t = self.infer(index)?;
                self.unify_at(&Type::Int, &idx_t, index.span())?;
                let val_t = self.infer(value)?;
                self.unify_at(&Type::Array(Box::new(val_t)), &arr_t, array.span())?;
                Ok(Type::Unit)
            }

            Expr::Some { child, .. } => {
                let t = self.infer(child)?;
                Ok(Type::Option(Box::new(t)))
            }

            Expr::None { span } => {
                let t = Type::Option(Box::new(Type::fresh_var()));
                self.env
                    .none_types
                    .insert((span.start.offset, span.end.offset), t.clone());
                Ok(t)
            }

            Expr::Match {
                target,
                if_some,
                if_none,
                some_sym,
                span,
            } => {
                let target_t = self.infer(target)?;
                let elem = Type::fresh_var();
                let opt = Type::Option(Box::new(elem.clone()));
                if unify(&opt, &target_t).is_err() {
                    return Err(TypeError::new(
                        format!(
                            "type of matching target in 'match' expression must be '{}' but found '{}'",
                            opt, target_t
                        ),
                        target.span(),
                    ));
                }
                self.env.table.insert(some_sym.name.clone(), elem);
                let some_t = self.infer(if_some)?;
                let none_t = self.infer(if_none)?;
                unify(&some_t, &none_t).map_err(|e| {
                    TypeError::from_unify(e, *span).note(
                        "mismatch of types between 'Some' arm and 'None' arm in 'match' expression",
                    )
                })?;
                Ok(some_t)
            }

            Expr::Typed {
                child, type_expr, ..
            } => {
                let t = self.infer(child)?;
                let ann_t = self.conv.conv(type_expr)?;
                unify(&ann_t, &t).map_err(|e| {
                    TypeError::from_unify(e, child.span())
                        .note("mismatch between inferred type and specified type of expression")
                })?;
                Ok(t)
            }
        }
    }

    fn infer_binary(
        &mut self,
        op: BinOp,
        left: &Expr,
        right: &Expr,
        span: Span,
    ) -> Result<Type, TypeError> {
        use BinOp::*;
        match op {
            Add | Sub | Mul | Div | Mod => {
                let lt = self.infer(left)?;
                self.unify_at(&Type::Int, &lt, left.span())?;
                let rt = self.infer(right)?;
                self.unify_at(&Type::Int, &rt, right.span())?;
                Ok(Type::Int)
            }
            FAdd | FSub | FMul | FDiv => {
                let lt = self.infer(left)?;
                self.unify_at(&Type::Float, &lt, left.span())?;
                let rt = self.infer(right)?;
                self.unify_at(&Type::Float, &rt, right.span())?;
                Ok(Type::Float)
            }
            And | Or => {
                let lt = self.infer(left)?;
                self.unify_at(&Type::Bool, &lt, left.span())?;
                let rt = self.infer(right)?;
                self.unify_at(&Type::Bool, &rt, right.span())?;
                Ok(Type::Bool)
            }
            // Operand type restrictions for comparisons are enforced
            // during lowering, once the operand types are final.
            Eq | NotEq | Less | LessEq | Greater | GreaterEq => {
                let lt = self.infer(left)?;
                let rt = self.infer(right)?;
                self.unify_at(&lt, &rt, span)?;
                Ok(Type::Bool)
            }
        }
    }
}
