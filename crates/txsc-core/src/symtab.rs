//! The scoped symbol table (spec §3, §4.2).
//!
//! A stack of [`Scope`]s, the bottom one always the distinguished global
//! scope. Declarations, assignments, and lookups walk this stack the way a
//! lexically-scoped interpreter would; [`SymbolTable::clone`] deep-copies the
//! whole stack so concurrent compiles never alias (spec §5).

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::SymbolError;
use crate::sir::{Node, SirType};

/// The kind of scope a symbol lives in, used by the SIR optimizer to decide
/// whether a name may be declared at all (functions: global only) and by the
/// lowering pass to decide conditional-branch scoping (spec §4.4, §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScopeKind {
    General,
    Conditional,
    Function,
}

/// One declared name. `value` holds the symbol's current SIR expression --
/// for a constant-valued symbol this lets the optimizer inline it by value;
/// for a `StackItem` symbol it instead carries stack-position bookkeeping via
/// `depth`/`height` (spec §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Symbol {
    pub name: String,
    pub value: Option<Node>,
    pub ty: SirType,
    pub mutable: bool,
    /// Distance from the top of the stack, 0 = top. `Some` only for
    /// `StackItem` symbols once the stack-state simulator has placed them.
    pub depth: Option<u32>,
    /// Distance from the bottom of the stack, 0 = bottom.
    pub height: Option<u32>,
}

impl Symbol {
    fn new(name: String, value: Option<Node>, ty: SirType, mutable: bool) -> Self {
        Symbol {
            name,
            value,
            ty,
            mutable,
            depth: None,
            height: None,
        }
    }
}

/// One level of nesting. The name the ordered list of assumed input names is
/// stored under; see [`SymbolTable::add_stack_assumptions`].
pub const STACK_NAMES_KEY: &str = "_stack_names";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scope {
    pub kind: ScopeKind,
    pub symbols: IndexMap<String, Symbol>,
}

impl Scope {
    fn new(kind: ScopeKind) -> Self {
        Scope {
            kind,
            symbols: IndexMap::new(),
        }
    }
}

/// The full scope stack for one compilation. Index 0 is always the global
/// scope; the last element is the current scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolTable {
    scopes: Vec<Scope>,
}

impl Default for SymbolTable {
    fn default() -> Self {
        SymbolTable {
            scopes: vec![Scope::new(ScopeKind::General)],
        }
    }
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin_scope(&mut self, kind: ScopeKind) {
        self.scopes.push(Scope::new(kind));
    }

    /// Pops the current scope. Never pops the global scope at index 0.
    pub fn end_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    fn current_mut(&mut self) -> &mut Scope {
        self.scopes.last_mut().expect("global scope always present")
    }

    fn current(&self) -> &Scope {
        self.scopes.last().expect("global scope always present")
    }

    /// Declares `name` in the current scope.
    ///
    /// Fails with [`SymbolError::MultipleDeclarations`] if `name` is already
    /// declared in this exact scope (spec §4.2 -- "single declaration per
    /// name per scope" is enforced per scope, not across the whole chain).
    pub fn declare(
        &mut self,
        name: &str,
        value: Option<Node>,
        ty: SirType,
        mutable: bool,
    ) -> Result<(), SymbolError> {
        if self.current().symbols.contains_key(name) {
            return Err(SymbolError::MultipleDeclarations { name: name.to_string() });
        }
        self.current_mut()
            .symbols
            .insert(name.to_string(), Symbol::new(name.to_string(), value, ty, mutable));
        Ok(())
    }

    /// Reassigns an already-declared `name`, searching outward through
    /// enclosing scopes.
    ///
    /// Fails with [`SymbolError::Undeclared`] if no enclosing scope declares
    /// `name`, or [`SymbolError::Immutable`] if the declaration found is
    /// immutable (spec §3's mutability invariant: "once declared immutable,
    /// a symbol may not be reassigned in the same or a nested scope").
    pub fn assign(&mut self, name: &str, value: Node, ty: SirType) -> Result<(), SymbolError> {
        for scope in self.scopes.iter_mut().rev() {
            if let Some(sym) = scope.symbols.get_mut(name) {
                if !sym.mutable {
                    return Err(SymbolError::Immutable { name: name.to_string() });
                }
                sym.value = Some(value);
                sym.ty = ty;
                return Ok(());
            }
        }
        Err(SymbolError::Undeclared { name: name.to_string() })
    }

    /// Looks up `name`, walking outward unless `one_scope` restricts the
    /// search to the current scope only.
    pub fn lookup(&self, name: &str, one_scope: bool) -> Option<&Symbol> {
        if one_scope {
            return self.current().symbols.get(name);
        }
        for scope in self.scopes.iter().rev() {
            if let Some(sym) = scope.symbols.get(name) {
                return Some(sym);
            }
        }
        None
    }

    /// Looks up `name` in the global scope only, regardless of current
    /// nesting -- used for function definitions (spec §3: "Functions may be
    /// declared only in the global scope").
    pub fn lookup_global(&self, name: &str) -> Option<&Symbol> {
        self.scopes[0].symbols.get(name)
    }

    /// Deletes `name`. If `all_scopes` is set, removes the nearest
    /// declaration found walking outward from the current scope; otherwise
    /// only removes it from the current scope.
    pub fn delete(&mut self, name: &str, all_scopes: bool) -> Result<(), SymbolError> {
        if all_scopes {
            for scope in self.scopes.iter_mut().rev() {
                if scope.symbols.shift_remove(name).is_some() {
                    return Ok(());
                }
            }
            return Err(SymbolError::Undeclared { name: name.to_string() });
        }
        self.current_mut()
            .symbols
            .shift_remove(name)
            .map(|_| ())
            .ok_or_else(|| SymbolError::Undeclared { name: name.to_string() })
    }

    /// Declares `k = names.len()` `StackItem` symbols, one per assumed input
    /// name, with `height = i` and `depth = k - 1 - i` (spec §4.2), and
    /// records the ordered list under [`STACK_NAMES_KEY`] so later passes can
    /// reconstitute the initial stack layout.
    pub fn add_stack_assumptions(&mut self, names: &[String]) -> Result<(), SymbolError> {
        let k = names.len();
        for (i, name) in names.iter().enumerate() {
            let mut sym = Symbol::new(name.clone(), None, SirType::StackItem, false);
            sym.height = Some(i as u32);
            sym.depth = Some((k - 1 - i) as u32);
            if self.scopes[0].symbols.contains_key(name) {
                return Err(SymbolError::MultipleDeclarations { name: name.clone() });
            }
            self.scopes[0].symbols.insert(name.clone(), sym);
        }
        let stack_names_value = Node::new(
            crate::sir::SirNode::Bytes(names.join(",").into_bytes()),
            0,
        );
        self.scopes[0].symbols.insert(
            STACK_NAMES_KEY.to_string(),
            Symbol::new(
                STACK_NAMES_KEY.to_string(),
                Some(stack_names_value),
                SirType::Expr,
                false,
            ),
        );
        Ok(())
    }

    /// Returns the ordered list of assumed input names, if any were declared.
    pub fn stack_names(&self) -> Vec<String> {
        match self.scopes[0].symbols.get(STACK_NAMES_KEY) {
            Some(Symbol {
                value: Some(Node { kind: crate::sir::SirNode::Bytes(b), .. }),
                ..
            }) if !b.is_empty() => String::from_utf8_lossy(b)
                .split(',')
                .map(|s| s.to_string())
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Declares a function definition in the global scope. Fails with
    /// [`SymbolError::MultipleDeclarations`] if the name is already a global
    /// symbol, per spec §3's "Functions may be declared only in the global
    /// scope".
    pub fn add_function_def(&mut self, name: &str, def: Node) -> Result<(), SymbolError> {
        if self.scopes[0].symbols.contains_key(name) {
            return Err(SymbolError::MultipleDeclarations { name: name.to_string() });
        }
        self.scopes[0].symbols.insert(
            name.to_string(),
            Symbol::new(name.to_string(), Some(def), SirType::Func, false),
        );
        Ok(())
    }

    /// Number of scopes currently on the stack (1 = only the global scope).
    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    pub fn current_kind(&self) -> ScopeKind {
        self.current().kind
    }
}
