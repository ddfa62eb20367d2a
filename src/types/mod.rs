//! Type terms, unification and type inference.

pub mod env;
pub mod error;
pub mod infer;
pub mod ty;
pub mod unify;

pub use env::Env;
pub use error::TypeError;
pub use infer::type_inference;
pub use ty::{Type, VarCell};
pub use unify::{unify, UnifyError};
