//! Result of type analysis.

use std::collections::HashMap;
use std::io::{self, Write};

use super::ty::Type;

/// Key identifying one `None` literal: the byte offsets of its span.
/// Every `None` comes from source, so the offsets are unique.
pub type NoneKey = (usize, usize);

/// Type environment produced by inference and consumed by lowering and
/// code generation.
#[derive(Debug)]
pub struct Env {
    /// Types of all defined bindings, keyed by unique name.
    pub table: HashMap<String, Type>,
    /// Free names referenced but not defined in the compilation unit.
    /// They are exposed as external symbols at link time. Pre-populated
    /// with the builtin functions.
    pub externals: HashMap<String, Type>,
    /// The inferred option type of each `None` literal. Lowering needs
    /// it to give the `none` instruction its element type.
    pub none_types: HashMap<NoneKey, Type>,
}

impl Env {
    pub fn new() -> Env {
        Env {
            table: HashMap::new(),
            externals: builtin_table(),
            none_types: HashMap::new(),
        }
    }

    /// Resolves every type in the environment. Variables still unbound
    /// after inference default to unit.
    pub fn dereference(&mut self) {
        for t in self.table.values_mut() {
            *t = t.deref();
        }
        for t in self.externals.values_mut() {
            *t = t.deref();
        }
        for t in self.none_types.values_mut() {
            *t = t.deref();
        }
    }

    pub fn dump<W: Write>(&self, w: &mut W) -> io::Result<()> {
        writeln!(w, "Variables:")?;
        let mut names: Vec<_> = self.table.keys().collect();
        names.sort();
        for name in names {
            writeln!(w, "  {}: {}", name, self.table[name])?;
        }
        writeln!(w)?;
        self.dump_externals(w)
    }

    pub fn dump_externals<W: Write>(&self, w: &mut W) -> io::Result<()> {
        writeln!(w, "External Variables:")?;
        let mut names: Vec<_> = self.externals.keys().collect();
        names.sort();
        for name in names {
            writeln!(w, "  {}: {}", name, self.externals[name])?;
        }
        Ok(())
    }
}

impl Default for Env {
    fn default() -> Self {
        Env::new()
    }
}

fn fun1(param: Type, ret: Type) -> Type {
    Type::fun(vec![param], ret)
}

// Builtin functions known to the runtime, plus the `argv` global. All
// monomorphic.
fn builtin_table() -> HashMap<String, Type> {
    let mut table = HashMap::new();
    table.insert("print_int".to_string(), fun1(Type::Int, Type::Unit));
    table.insert("print_bool".to_string(), fun1(Type::Bool, Type::Unit));
    table.insert("print_char".to_string(), fun1(Type::Int, Type::Unit));
    table.insert("print_float".to_string(), fun1(Type::Float, Type::Unit));
    table.insert("print_str".to_string(), fun1(Type::String, Type::Unit));
    table.insert("print_newline".to_string(), fun1(Type::Unit, Type::Unit));
    table.insert("println_int".to_string(), fun1(Type::Int, Type::Unit));
    table.insert("println_bool".to_string(), fun1(Type::Bool, Type::Unit));
    table.insert("println_str".to_string(), fun1(Type::String, Type::Unit));
    table.insert("str_length".to_string(), fun1(Type::String, Type::Int));
    table.insert(
        "str_concat".to_string(),
        Type::fun(vec![Type::String, Type::String], Type::String),
    );
    table.insert("int_to_float".to_string(), fun1(Type::Int, Type::Float));
    table.insert("float_to_int".to_string(), fun1(Type::Float, Type::Int));
    table.insert("argv".to_string(), Type::Array(Box::new(Type::String)));
    table
}
