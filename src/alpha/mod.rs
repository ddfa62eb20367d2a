//! Alpha transform.
//!
//! Rewrites every binder to a globally unique name (`display$t<N>`, with
//! one counter for the whole program) and redirects each bound variable
//! reference to its binder's `Rc<Symbol>`. After the pass, pointer
//! identity between a use and a binder means "defined there"; a
//! reference that resolves to nothing keeps `name == display_name` and
//! is treated as external from then on.
//!
//! Scoping rules: in `let x = e1 in e2` the binder is not visible in
//! `e1`; in `let rec f … = body in cont` the function name is visible in
//! `body` (and may be shadowed by a parameter); the `match` some-binding
//! is visible only in the `Some` arm.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;

use crate::ast::{Expr, Symbol};
use crate::source::Span;

#[derive(Debug, Clone)]
pub struct AlphaError {
    pub msg: String,
    pub span: Span,
}

impl fmt::Display for AlphaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Semantic error at {}: {}", self.span.start, self.msg)
    }
}

impl std::error::Error for AlphaError {}

/// Transforms the tree in place.
pub fn transform(root: &mut Expr) -> Result<(), AlphaError> {
    let mut t = Transformer {
        count: 0,
        scopes: vec![HashMap::new()],
    };
    t.transform_expr(root)
}

struct Transformer {
    count: usize,
    scopes: Vec<HashMap<String, Rc<Symbol>>>,
}

impl Transformer {
    fn new_symbol(&mut self, display: &str) -> Rc<Symbol> {
        self.count += 1;
        Symbol::with_unique_name(display, format!("{}$t{}", display, self.count))
    }

    fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    fn register(&mut self, sym: &Rc<Symbol>) {
        if sym.is_ignored() {
            return;
        }
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(sym.display_name.clone(), Rc::clone(sym));
        }
    }

    fn resolve(&self, display: &str) -> Option<Rc<Symbol>> {
        for scope in self.scopes.iter().rev() {
            if let Some(sym) = scope.get(display) {
                return Some(Rc::clone(sym));
            }
        }
        None
    }

    fn transform_expr(&mut self, e: &mut Expr) -> Result<(), AlphaError> {
        match e {
            Expr::Unit { .. }
            | Expr::Bool { .. }
            | Expr::Int { .. }
            | Expr::Float { .. }
            | Expr::String { .. }
            | Expr::None { .. } => Ok(()),

            Expr::VarRef { symbol, span } => {
                if symbol.is_ignored() {
                    return Err(AlphaError {
                        msg: "Cannot refer '_' variable".to_string(),
                        span: *span,
                    });
                }
                if let Some(bind) = self.resolve(&symbol.display_name) {
                    *symbol = bind;
                }
                // Unresolved references stay as-is: they are external.
                Ok(())
            }

            Expr::Unary { child, .. } => self.transform_expr(child),
            Expr::Binary { left, right, .. } => {
                self.transform_expr(left)?;
                self.transform_expr(right)
            }
            Expr::If {
                cond,
                then_expr,
                else_expr,
                ..
            } => {
                self.transform_expr(cond)?;
                self.transform_expr(then_expr)?;
                self.transform_expr(else_expr)
            }

            Expr::Let {
                symbol,
                bound,
                body,
                ..
            } => {
                self.transform_expr(bound)?;
                let fresh = self.new_symbol(&symbol.display_name.clone());
                *symbol = Rc::clone(&fresh);
                self.push_scope();
                self.register(&fresh);
                let result = self.transform_expr(body);
                self.pop_scope();
                result
            }

            Expr::LetRec { func, body, span } => {
                let mut seen = HashSet::new();
                for p in &func.params {
                    if !seen.insert(p.symbol.display_name.clone()) {
                        return Err(AlphaError {
                            msg: format!(
                                "Duplicate parameter '{}' in definition of function '{}'",
                                p.symbol.display_name, func.symbol.display_name
                            ),
                            span: *span,
                        });
                    }
                }

                let fresh = self.new_symbol(&func.symbol.display_name.clone());
                func.symbol = Rc::clone(&fresh);
                self.push_scope();
                self.register(&fresh);

                // Parameters enter scope after the function name and may
                // shadow it.
                self.push_scope();
                for p in &mut func.params {
                    let psym = self.new_symbol(&p.symbol.display_name.clone());
                    p.symbol = Rc::clone(&psym);
                    self.register(&psym);
                }
                let body_result = self.transform_expr(&mut func.body);
                self.pop_scope();
                body_result?;

                let result = self.transform_expr(body);
                self.pop_scope();
                result
            }

            Expr::LetTuple {
                symbols,
                bound,
                body,
                span,
                ..
            } => {
                let mut seen = HashSet::new();
                for sym in symbols.iter() {
                    if !seen.insert(sym.display_name.clone()) {
                        return Err(AlphaError {
                            msg: format!(
                                "Duplicate symbol '{}' in pattern of tuple binding",
                                sym.display_name
                            ),
                            span: *span,
                        });
                    }
                }
                self.transform_expr(bound)?;
                self.push_scope();
                for sym in symbols.iter_mut() {
                    let fresh = self.new_symbol(&sym.display_name.clone());
                    *sym = Rc::clone(&fresh);
                    self.register(&fresh);
                }
                let result = self.transform_expr(body);
                self.pop_scope();
                result
            }

            Expr::Apply { callee, args, .. } => {
                self.transform_expr(callee)?;
                for a in args {
                    self.transform_expr(a)?;
                }
                Ok(())
            }
            Expr::Tuple { elems, .. } => {
                for e in elems {
                    self.transform_expr(e)?;
                }
                Ok(())
            }
            Expr::ArrayCreate { size, elem, .. } => {
                self.transform_expr(size)?;
                self.transform_expr(elem)
            }
            Expr::ArraySize { target, .. } => self.transform_expr(target),
            Expr::Get { array, index, .. } => {
                self.transform_expr(array)?;
                self.transform_expr(index)
            }
            Expr::Put {
                array,
                index,
                value,
                ..
            } => {
                self.transform_expr(array)?;
                self.transform_expr(index)?;
                self.transform_expr(value)
            }
            Expr::Some { child, .. } => self.transform_expr(child),

            Expr::Match {
                target,
                if_some,
                if_none,
                some_sym,
                ..
            } => {
                self.transform_expr(target)?;
                let fresh = self.new_symbol(&some_sym.display_name.clone());
                *some_sym = Rc::clone(&fresh);
                self.push_scope();
                self.register(&fresh);
                let some_result = self.transform_expr(if_some);
                self.pop_scope();
                some_result?;
                self.transform_expr(if_none)
            }

            Expr::Typed { child, .. } => self.transform_expr(child),
        }
    }
}
