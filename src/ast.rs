//! The typed AST and the scope chain used to resolve identifiers to it.
//!
//! Every node carries its own payload directly (a Rust enum) rather than a
//! tagged union with a side-table of fields, so the exhaustive `match` in
//! [`crate::codegen`] is a compile-time guarantee that every kind is handled.

use std::cell::{Cell, RefCell};

use bumpalo::Bump;
use hashbrown::HashMap;
use smallvec::SmallVec;

use crate::types::Type;

/// A declared variable or function, identified by pointer once allocated.
#[derive(Debug)]
pub struct LocalVariable<'a> {
    pub name: &'a str,
    pub ty: &'a Type<'a>,
    pub is_global: bool,
    /// True for a function name declared in the global scope; distinguishes
    /// it from a global variable of the same kind of scope entry, so a call
    /// naming an ordinary variable is rejected rather than emitting `call`
    /// against a nonexistent label.
    pub is_function: bool,
    /// Offset from `rbp` for locals; unused (0) for globals and functions.
    pub offset: u64,
}

/// One level of the scope chain. The outermost scope holds globals and
/// function declarations; a function body introduces exactly one new scope;
/// blocks do not introduce scopes. Redeclaration within a scope is
/// rejected at parse time, so `name -> variable` is always one-to-one and a
/// hash map gives O(1) lookup in place of the base language's linked-list
/// scan.
pub struct Scope<'a> {
    pub parent: Option<&'a Scope<'a>>,
    variables: RefCell<HashMap<&'a str, &'a LocalVariable<'a>>>,
    /// Running total of declared local sizes, used both to assign the next
    /// offset and as the function's frame size.
    next_offset: Cell<u64>,
}

impl<'a> Scope<'a> {
    pub fn new(arena: &'a Bump, parent: Option<&'a Scope<'a>>) -> &'a Scope<'a> {
        arena.alloc(Scope {
            parent,
            variables: RefCell::new(HashMap::new()),
            next_offset: Cell::new(0),
        })
    }

    /// Declares `name` with the next-available offset within this scope,
    /// matching the base language's `prev == None ? size : prev.offset +
    /// size` accumulation.
    pub fn declare(
        &self,
        arena: &'a Bump,
        name: &'a str,
        ty: &'a Type<'a>,
        is_global: bool,
    ) -> &'a LocalVariable<'a> {
        self.declare_inner(arena, name, ty, is_global, false)
    }

    /// Declares a function name in this scope, marking it so call sites can
    /// tell it apart from an ordinary variable of the same name.
    pub fn declare_function(
        &self,
        arena: &'a Bump,
        name: &'a str,
        return_ty: &'a Type<'a>,
    ) -> &'a LocalVariable<'a> {
        self.declare_inner(arena, name, return_ty, true, true)
    }

    fn declare_inner(
        &self,
        arena: &'a Bump,
        name: &'a str,
        ty: &'a Type<'a>,
        is_global: bool,
        is_function: bool,
    ) -> &'a LocalVariable<'a> {
        let offset = if is_global {
            0
        } else {
            let offset = self.next_offset.get() + ty.size();
            self.next_offset.set(offset);
            offset
        };
        let variable = arena.alloc(LocalVariable {
            name,
            ty,
            is_global,
            is_function,
            offset,
        });
        self.variables.borrow_mut().insert(name, variable);
        variable
    }

    /// True if `name` is already declared directly in this scope (not an
    /// ancestor) -- used to reject redeclaration.
    pub fn declared_here(&self, name: &str) -> bool {
        self.variables.borrow().contains_key(name)
    }

    /// Walks the scope chain from innermost to outermost.
    pub fn lookup(&self, name: &str) -> Option<&'a LocalVariable<'a>> {
        if let Some(&found) = self.variables.borrow().get(name) {
            return Some(found);
        }
        self.parent.and_then(|parent| parent.lookup(name))
    }

    /// Total size reserved for this scope's non-global locals, i.e. the
    /// function frame size before 8-byte alignment.
    pub fn frame_size(&self) -> u64 {
        self.next_offset.get()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Ne,
    Lt,
    Le,
    AddPointer,
    SubPointer,
    DiffPointer,
}

pub enum NodeKind<'a> {
    Number(i64),
    LocalVariable(&'a LocalVariable<'a>),
    Address(&'a Node<'a>),
    Dereference(&'a Node<'a>),
    Binary(BinOp, &'a Node<'a>, &'a Node<'a>),
    Assign(&'a Node<'a>, &'a Node<'a>),
    Block(Vec<&'a Node<'a>>),
    If(&'a Node<'a>, &'a Node<'a>, Option<&'a Node<'a>>),
    While(&'a Node<'a>, &'a Node<'a>),
    For(
        Option<&'a Node<'a>>,
        Option<&'a Node<'a>>,
        Option<&'a Node<'a>>,
        &'a Node<'a>,
    ),
    Return(&'a Node<'a>),
    FunctionCall(&'a str, SmallVec<[&'a Node<'a>; 6]>),
    FunctionDefinition {
        name: &'a str,
        parameters: SmallVec<[&'a LocalVariable<'a>; 6]>,
        body: &'a Node<'a>,
        scope: &'a Scope<'a>,
    },
    GlobalVariableDefinition(&'a LocalVariable<'a>),
    Program(Vec<&'a Node<'a>>),
}

pub struct Node<'a> {
    pub kind: NodeKind<'a>,
    /// Non-null for every expression-producing node; unused for statements.
    pub ty: Option<&'a Type<'a>>,
}

impl<'a> Node<'a> {
    pub fn new(arena: &'a Bump, kind: NodeKind<'a>, ty: Option<&'a Type<'a>>) -> &'a Node<'a> {
        arena.alloc(Node { kind, ty })
    }

    /// Whether evaluating this statement leaves a value on the codegen
    /// stack that a sibling statement in a `Block` must pop.
    pub fn produces_value(&self) -> bool {
        !matches!(
            self.kind,
            NodeKind::Block(_)
                | NodeKind::If(..)
                | NodeKind::While(..)
                | NodeKind::For(..)
                | NodeKind::Return(_)
        )
    }

    pub fn is_lvalue(&self) -> bool {
        matches!(self.kind, NodeKind::LocalVariable(_) | NodeKind::Dereference(_))
    }
}
