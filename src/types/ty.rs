//! Type terms.
//!
//! A type is a tree of concrete constructors with [`VarCell`]
//! indirection cells at the leaves that are still unknown. Unification
//! fills the cells in place; every clone of a type shares the same
//! cells, so resolving a variable is visible through all of its
//! occurrences. The occurs check keeps the graph acyclic.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// A unification variable: unresolved, or resolved to another type.
#[derive(Debug, Clone)]
pub struct VarCell(Rc<RefCell<Option<Type>>>);

impl VarCell {
    pub fn new() -> VarCell {
        VarCell(Rc::new(RefCell::new(None)))
    }

    pub fn get(&self) -> Option<Type> {
        self.0.borrow().clone()
    }

    pub fn set(&self, t: Type) {
        *self.0.borrow_mut() = Some(t);
    }

    pub fn ptr_eq(&self, other: &VarCell) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Default for VarCell {
    fn default() -> Self {
        VarCell::new()
    }
}

#[derive(Debug, Clone)]
pub enum Type {
    Unit,
    Bool,
    Int,
    Float,
    String,
    Fun { params: Vec<Type>, ret: Box<Type> },
    Tuple(Vec<Type>),
    Array(Box<Type>),
    Option(Box<Type>),
    Var(VarCell),
}

impl Type {
    pub fn fresh_var() -> Type {
        Type::Var(VarCell::new())
    }

    pub fn fun(params: Vec<Type>, ret: Type) -> Type {
        Type::Fun {
            params,
            ret: Box::new(ret),
        }
    }

    /// Follows the outermost chain of resolved variables, compressing
    /// the path so later lookups are one step.
    pub fn resolve(&self) -> Type {
        match self {
            Type::Var(cell) => match cell.get() {
                Some(inner) => {
                    let resolved = inner.resolve();
                    if matches!(inner, Type::Var(_)) {
                        cell.set(resolved.clone());
                    }
                    resolved
                }
                None => self.clone(),
            },
            _ => self.clone(),
        }
    }

    /// Fully resolves a type. A variable that is still unbound after
    /// inference defaults to unit.
    pub fn deref(&self) -> Type {
        match self.resolve() {
            Type::Fun { params, ret } => Type::Fun {
                params: params.iter().map(Type::deref).collect(),
                ret: Box::new(ret.deref()),
            },
            Type::Tuple(elems) => Type::Tuple(elems.iter().map(Type::deref).collect()),
            Type::Array(elem) => Type::Array(Box::new(elem.deref())),
            Type::Option(elem) => Type::Option(Box::new(elem.deref())),
            Type::Var(_) => Type::Unit,
            t => t,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.resolve() {
            Type::Unit => write!(f, "()"),
            Type::Bool => write!(f, "bool"),
            Type::Int => write!(f, "int"),
            Type::Float => write!(f, "float"),
            Type::String => write!(f, "string"),
            Type::Fun { params, ret } => {
                for p in &params {
                    write!(f, "{} -> ", fun_operand(p))?;
                }
                write!(f, "{}", fun_operand(&ret))
            }
            Type::Tuple(elems) => {
                let ss: Vec<String> = elems.iter().map(|e| e.to_string()).collect();
                write!(f, "{}", ss.join(" * "))
            }
            Type::Array(elem) => write!(f, "{} array", elem),
            Type::Option(elem) => write!(f, "{} option", elem),
            Type::Var(_) => write!(f, "?"),
        }
    }
}

// Function operands of a function type are parenthesized.
fn fun_operand(t: &Type) -> String {
    if matches!(t.resolve(), Type::Fun { .. }) {
        format!("({})", t)
    } else {
        t.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_primitives() {
        assert_eq!(Type::Unit.to_string(), "()");
        assert_eq!(Type::Bool.to_string(), "bool");
        assert_eq!(Type::Int.to_string(), "int");
        assert_eq!(Type::Float.to_string(), "float");
        assert_eq!(Type::String.to_string(), "string");
    }

    #[test]
    fn test_display_fun() {
        let t = Type::fun(vec![Type::Int, Type::Int], Type::Bool);
        assert_eq!(t.to_string(), "int -> int -> bool");
    }

    #[test]
    fn test_display_fun_operand_parens() {
        let inner = Type::fun(vec![Type::Int], Type::Int);
        let t = Type::fun(vec![inner.clone()], inner);
        assert_eq!(t.to_string(), "(int -> int) -> (int -> int)");
    }

    #[test]
    fn test_display_compound() {
        let t = Type::Tuple(vec![
            Type::Int,
            Type::Array(Box::new(Type::Bool)),
            Type::Option(Box::new(Type::Float)),
        ]);
        assert_eq!(t.to_string(), "int * bool array * float option");
    }

    #[test]
    fn test_var_resolution_is_shared() {
        let v = Type::fresh_var();
        let copy = v.clone();
        if let Type::Var(cell) = &v {
            cell.set(Type::Int);
        }
        assert_eq!(copy.to_string(), "int");
    }

    #[test]
    fn test_resolve_compresses_chains() {
        let a = VarCell::new();
        let b = VarCell::new();
        a.set(Type::Var(b.clone()));
        b.set(Type::Int);
        let t = Type::Var(a.clone());
        assert!(matches!(t.resolve(), Type::Int));
        // after compression the outer cell points directly at int
        assert!(matches!(a.get(), Some(Type::Int)));
    }

    #[test]
    fn test_deref_defaults_unresolved_to_unit() {
        let t = Type::Array(Box::new(Type::fresh_var()));
        assert_eq!(t.deref().to_string(), "() array");
    }
}
