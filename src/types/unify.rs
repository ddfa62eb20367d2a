//! Unification with occurs check.

use std::fmt;

use super::ty::{Type, VarCell};

/// A failed unification: a root cause plus context notes added while
/// the error travels up the term.
#[derive(Debug, Clone)]
pub struct UnifyError {
    messages: Vec<String>,
}

impl UnifyError {
    fn new(msg: String) -> UnifyError {
        UnifyError {
            messages: vec![msg],
        }
    }

    pub fn note(mut self, msg: String) -> UnifyError {
        self.messages.push(msg);
        self
    }
}

impl fmt::Display for UnifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.messages[0])?;
        for note in &self.messages[1..] {
            write!(f, "\n  Note: {}", note)?;
        }
        Ok(())
    }
}

impl std::error::Error for UnifyError {}

pub fn ordinal(n: usize) -> String {
    match n {
        1 => "1st".to_string(),
        2 => "2nd".to_string(),
        3 => "3rd".to_string(),
        _ => format!("{}th", n),
    }
}

fn occurs(cell: &VarCell, t: &Type) -> bool {
    match t.resolve() {
        Type::Var(other) => other.ptr_eq(cell),
        Type::Fun { params, ret } => {
            params.iter().any(|p| occurs(cell, p)) || occurs(cell, &ret)
        }
        Type::Tuple(elems) => elems.iter().any(|e| occurs(cell, e)),
        Type::Array(elem) | Type::Option(elem) => occurs(cell, &elem),
        _ => false,
    }
}

/// Makes `lhs` and `rhs` equal, resolving variables in place.
///
/// Function types unify their return types before checking parameter
/// counts, so an arity error reports both sides with the return
/// variable already resolved.
pub fn unify(lhs: &Type, rhs: &Type) -> Result<(), UnifyError> {
    let l = lhs.resolve();
    let r = rhs.resolve();
    match (&l, &r) {
        (Type::Unit, Type::Unit)
        | (Type::Bool, Type::Bool)
        | (Type::Int, Type::Int)
        | (Type::Float, Type::Float)
        | (Type::String, Type::String) => Ok(()),

        (Type::Var(a), Type::Var(b)) if a.ptr_eq(b) => Ok(()),
        (Type::Var(cell), other) | (other, Type::Var(cell)) => {
            if occurs(cell, other) {
                Err(UnifyError::new(format!(
                    "Cyclic dependency found while unification with '{}'",
                    other
                )))
            } else {
                cell.set(other.clone());
                Ok(())
            }
        }

        (
            Type::Fun {
                params: lp,
                ret: lr,
            },
            Type::Fun {
                params: rp,
                ret: rr,
            },
        ) => {
            unify(lr, rr)?;
            if lp.len() != rp.len() {
                return Err(UnifyError::new(format!(
                    "Number of parameters of function does not match: {} vs {} (between '{}' and '{}')",
                    lp.len(),
                    rp.len(),
                    l,
                    r
                )));
            }
            for (i, (a, b)) in lp.iter().zip(rp.iter()).enumerate() {
                unify(a, b).map_err(|e| {
                    e.note(format!(
                        "On unifying {} parameter of function '{}' and '{}'",
                        ordinal(i + 1),
                        l,
                        r
                    ))
                })?;
            }
            Ok(())
        }

        (Type::Tuple(le), Type::Tuple(re)) => {
            if le.len() != re.len() {
                return Err(UnifyError::new(format!(
                    "Number of elements of tuple does not match: {} vs {} (between '{}' and '{}')",
                    le.len(),
                    re.len(),
                    l,
                    r
                )));
            }
            for (i, (a, b)) in le.iter().zip(re.iter()).enumerate() {
                unify(a, b).map_err(|e| {
                    e.note(format!(
                        "On unifying {} element of tuple '{}' and '{}'",
                        ordinal(i + 1),
                        l,
                        r
                    ))
                })?;
            }
            Ok(())
        }

        (Type::Array(a), Type::Array(b)) => unify(a, b),
        (Type::Option(a), Type::Option(b)) => unify(a, b),

        _ => Err(UnifyError::new(format!(
            "Type mismatch between '{}' and '{}'",
            l, r
        ))),
    }
}
