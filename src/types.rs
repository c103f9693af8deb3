//! Elementary type representation: [`Int`](Type::Int), [`Char`](Type::Char),
//! [`Pointer`](Type::Pointer) and [`Array`](Type::Array).
//!
//! `int` and `char` are shared `'static` singletons; pointer and array types
//! are allocated in the compile's [`Bump`] arena and referenced by shared
//! reference thereafter.

use bumpalo::Bump;

/// A miniC type. `Pointer` and `Array` own their payload through an
/// arena-allocated reference rather than `Box`, so every `Type` is `Copy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Type<'a> {
    Int,
    Char,
    Pointer(&'a Type<'a>),
    Array(&'a Type<'a>, u64),
}

/// The 8-byte `int` singleton. Non-standard: real C has a 4-byte `int`.
pub static INT: Type<'static> = Type::Int;
/// The 1-byte `char` singleton.
pub static CHAR: Type<'static> = Type::Char;

impl<'a> Type<'a> {
    /// Size in bytes. Pointers are 16 bytes here, not the usual 8.
    pub fn size(&self) -> u64 {
        match self {
            Type::Int => 8,
            Type::Char => 1,
            Type::Pointer(_) => 16,
            Type::Array(element, length) => element.size() * length,
        }
    }

    pub fn is_int(&self) -> bool {
        matches!(self, Type::Int | Type::Char)
    }

    pub fn is_pointer_like(&self) -> bool {
        matches!(self, Type::Pointer(_) | Type::Array(_, _))
    }

    /// The pointee type of a pointer or the element type of an array.
    /// `None` for `Int`/`Char`.
    pub fn pointee(&self) -> Option<&'a Type<'a>> {
        match self {
            Type::Pointer(pointee) => Some(pointee),
            Type::Array(element, _) => Some(element),
            Type::Int | Type::Char => None,
        }
    }

}

pub fn new_pointer<'a>(arena: &'a Bump, pointee: &'a Type<'a>) -> &'a Type<'a> {
    arena.alloc(Type::Pointer(pointee))
}

pub fn new_array<'a>(arena: &'a Bump, element: &'a Type<'a>, length: u64) -> &'a Type<'a> {
    arena.alloc(Type::Array(element, length))
}

/// Same-pointee-size check used to validate `DiffPointer` operands: the base
/// language has no structural type equality, only this narrower comparison.
pub fn same_pointee_size(a: &Type<'_>, b: &Type<'_>) -> bool {
    match (a.pointee(), b.pointee()) {
        (Some(x), Some(y)) => x.size() == y.size(),
        _ => false,
    }
}
