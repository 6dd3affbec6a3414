use std::collections::HashMap;

use crate::emit::Segment;

/// Storage class of a Jack identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VarKind {
    Static,
    Field,
    Argument,
    Local,
}

impl VarKind {
    /// The VM memory segment backing this kind.
    pub fn segment(self) -> Segment {
        match self {
            VarKind::Static => Segment::Static,
            VarKind::Field => Segment::This,
            VarKind::Argument => Segment::Argument,
            VarKind::Local => Segment::Local,
        }
    }

}

/// One named variable: its declared type, storage kind, and running index
/// within the scope that owns it.
#[derive(Clone, Debug, PartialEq)]
pub struct Symbol {
    pub ty: String,
    pub kind: VarKind,
    pub index: u16,
}

/// The name `name` is already bound in the scope it was being added to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AlreadyDefined;

/// Two-scope symbol table: class scope persists for a whole class,
/// subroutine scope is reset at each subroutine.
#[derive(Default)]
pub struct SymbolTable {
    class_scope: HashMap<String, Symbol>,
    subroutine_scope: HashMap<String, Symbol>,
    n_static: u16,
    n_field: u16,
    n_args: u16,
    n_locals: u16,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset the subroutine scope. Class scope and its counters persist.
    pub fn start_subroutine(&mut self) {
        self.subroutine_scope.clear();
        self.n_args = 0;
        self.n_locals = 0;
    }

    /// Bind `name` in the scope its kind belongs to, assigning the next
    /// free index of that kind.
    pub fn define(&mut self, name: &str, ty: &str, kind: VarKind) -> Result<u16, AlreadyDefined> {
        let (scope, counter) = match kind {
            VarKind::Static => (&mut self.class_scope, &mut self.n_static),
            VarKind::Field => (&mut self.class_scope, &mut self.n_field),
            VarKind::Argument => (&mut self.subroutine_scope, &mut self.n_args),
            VarKind::Local => (&mut self.subroutine_scope, &mut self.n_locals),
        };
        if scope.contains_key(name) {
            return Err(AlreadyDefined);
        }
        let index = *counter;
        *counter += 1;
        scope.insert(
            name.to_string(),
            Symbol {
                ty: ty.to_string(),
                kind,
                index,
            },
        );
        Ok(index)
    }

    /// Number of variables of `kind` defined so far in its scope.
    pub fn var_count(&self, kind: VarKind) -> u16 {
        match kind {
            VarKind::Static => self.n_static,
            VarKind::Field => self.n_field,
            VarKind::Argument => self.n_args,
            VarKind::Local => self.n_locals,
        }
    }

    /// Resolve `name`, subroutine scope first, then class scope.
    /// `None` means the engine treats the name as a class at call sites.
    pub fn lookup(&self, name: &str) -> Option<&Symbol> {
        self.subroutine_scope
            .get(name)
            .or_else(|| self.class_scope.get(name))
    }
}
