//! Types and the per-compilation TypeTable
//!
//! All `Type` instances live in one arena owned by [`TypeTable`];
//! references between types are indices ([`TypeId`]). This keeps cyclic
//! shapes (a struct containing a pointer to itself) representable without
//! shared ownership. Named types (typedefs, struct/union tags) are interned
//! under a category-tagged key so `struct foo` and a typedef `foo` never
//! collide.
//!
//! Targets ILP32 32-bit x86: char 1, short 2, int 4, long 4, pointer 4.

use crate::error::{Diagnostics, Location};
use std::collections::HashMap;

pub type TypeId = usize;

pub const POINTER_SIZE: u32 = 4;
pub const POINTER_ALIGN: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntKind {
    Char,
    Short,
    Int,
    Long,
}

impl IntKind {
    pub fn size(self) -> u32 {
        match self {
            IntKind::Char => 1,
            IntKind::Short => 2,
            IntKind::Int | IntKind::Long => 4,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            IntKind::Char => "char",
            IntKind::Short => "short",
            IntKind::Int => "int",
            IntKind::Long => "long",
        }
    }
}

/// One member of a struct or union. The offset is filled in by
/// [`TypeTable::semantic_check`] when layouts are computed.
#[derive(Debug, Clone)]
pub struct Member {
    pub name: String,
    pub ty: TypeId,
    pub offset: u32,
    pub location: Location,
}

#[derive(Debug, Clone)]
pub struct CompositeType {
    pub name: String,
    pub members: Vec<Member>,
    pub size: u32,
    pub align: u32,
    /// False for tags that were referenced but never defined.
    pub complete: bool,
    pub location: Location,
}

#[derive(Debug, Clone)]
pub enum Type {
    Void,
    Integer { kind: IntKind, signed: bool },
    Pointer { base: TypeId },
    Array { base: TypeId, length: Option<u64> },
    Function {
        ret: TypeId,
        params: Vec<TypeId>,
        variadic: bool,
    },
    Struct(CompositeType),
    Union(CompositeType),
}

/// Category-tagged name key for the table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeName {
    Plain(String),
    Struct(String),
    Union(String),
}

impl std::fmt::Display for TypeName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TypeName::Plain(n) => write!(f, "{}", n),
            TypeName::Struct(n) => write!(f, "struct {}", n),
            TypeName::Union(n) => write!(f, "union {}", n),
        }
    }
}

pub struct TypeTable {
    types: Vec<Type>,
    named: HashMap<TypeName, TypeId>,
    pointers: HashMap<TypeId, TypeId>,
    arrays: HashMap<(TypeId, Option<u64>), TypeId>,

    void_id: TypeId,
    ints: HashMap<(IntKind, bool), TypeId>,
}

impl TypeTable {
    pub fn new() -> Self {
        let mut table = TypeTable {
            types: Vec::new(),
            named: HashMap::new(),
            pointers: HashMap::new(),
            arrays: HashMap::new(),
            void_id: 0,
            ints: HashMap::new(),
        };
        table.void_id = table.push(Type::Void);
        for kind in [IntKind::Char, IntKind::Short, IntKind::Int, IntKind::Long] {
            for signed in [true, false] {
                let id = table.push(Type::Integer { kind, signed });
                table.ints.insert((kind, signed), id);
            }
        }
        table
    }

    fn push(&mut self, ty: Type) -> TypeId {
        self.types.push(ty);
        self.types.len() - 1
    }

    pub fn get(&self, id: TypeId) -> &Type {
        &self.types[id]
    }

    pub fn void(&self) -> TypeId {
        self.void_id
    }

    pub fn integer(&self, kind: IntKind, signed: bool) -> TypeId {
        self.ints[&(kind, signed)]
    }

    pub fn signed_int(&self) -> TypeId {
        self.integer(IntKind::Int, true)
    }

    pub fn unsigned_int(&self) -> TypeId {
        self.integer(IntKind::Int, false)
    }

    pub fn signed_char(&self) -> TypeId {
        self.integer(IntKind::Char, true)
    }

    pub fn unsigned_long(&self) -> TypeId {
        self.integer(IntKind::Long, false)
    }

    pub fn pointer_to(&mut self, base: TypeId) -> TypeId {
        if let Some(&id) = self.pointers.get(&base) {
            return id;
        }
        let id = self.push(Type::Pointer { base });
        self.pointers.insert(base, id);
        id
    }

    pub fn array_of(&mut self, base: TypeId, length: Option<u64>) -> TypeId {
        if let Some(&id) = self.arrays.get(&(base, length)) {
            return id;
        }
        let id = self.push(Type::Array { base, length });
        self.arrays.insert((base, length), id);
        id
    }

    pub fn function(&mut self, ret: TypeId, params: Vec<TypeId>, variadic: bool) -> TypeId {
        self.push(Type::Function {
            ret,
            params,
            variadic,
        })
    }

    pub fn lookup(&self, name: &TypeName) -> Option<TypeId> {
        self.named.get(name).copied()
    }

    /// Reference a struct/union tag, creating an incomplete placeholder if
    /// it has not been defined yet. This is what makes self-referential
    /// pointers inside a definition work.
    pub fn declare_composite(&mut self, name: &TypeName, location: Location) -> TypeId {
        if let Some(&id) = self.named.get(name) {
            return id;
        }
        let composite = CompositeType {
            name: match name {
                TypeName::Plain(n) | TypeName::Struct(n) | TypeName::Union(n) => n.clone(),
            },
            members: Vec::new(),
            size: 0,
            align: 1,
            complete: false,
            location,
        };
        let ty = match name {
            TypeName::Struct(_) => Type::Struct(composite),
            TypeName::Union(_) => Type::Union(composite),
            TypeName::Plain(_) => unreachable!("plain names are typedefs"),
        };
        let id = self.push(ty);
        self.named.insert(name.clone(), id);
        id
    }

    /// Attach members to a previously declared tag. Returns false if the
    /// tag already had a definition.
    pub fn define_composite(
        &mut self,
        name: &TypeName,
        members: Vec<Member>,
        location: Location,
    ) -> bool {
        let id = self.declare_composite(name, location.clone());
        match &mut self.types[id] {
            Type::Struct(c) | Type::Union(c) => {
                if c.complete {
                    return false;
                }
                c.members = members;
                c.complete = true;
                c.location = location;
                true
            }
            _ => unreachable!("composite key resolved to non-composite"),
        }
    }

    /// Define a typedef alias. The chain is flattened at definition time:
    /// `target` is already a resolved id. Returns false on redefinition.
    pub fn define_typedef(&mut self, name: &str, target: TypeId) -> bool {
        self.named
            .insert(TypeName::Plain(name.to_string()), target)
            .is_none()
    }

    pub fn composites(&self) -> impl Iterator<Item = (TypeId, &CompositeType)> {
        self.types.iter().enumerate().filter_map(|(id, ty)| match ty {
            Type::Struct(c) | Type::Union(c) => Some((id, c)),
            _ => None,
        })
    }

    // ---- predicates -------------------------------------------------

    pub fn is_void(&self, id: TypeId) -> bool {
        matches!(self.get(id), Type::Void)
    }

    pub fn is_integer(&self, id: TypeId) -> bool {
        matches!(self.get(id), Type::Integer { .. })
    }

    pub fn is_signed(&self, id: TypeId) -> bool {
        matches!(self.get(id), Type::Integer { signed: true, .. })
    }

    pub fn is_pointer(&self, id: TypeId) -> bool {
        matches!(self.get(id), Type::Pointer { .. })
    }

    pub fn is_array(&self, id: TypeId) -> bool {
        matches!(self.get(id), Type::Array { .. })
    }

    pub fn is_function(&self, id: TypeId) -> bool {
        matches!(self.get(id), Type::Function { .. })
    }

    pub fn is_composite(&self, id: TypeId) -> bool {
        matches!(self.get(id), Type::Struct(_) | Type::Union(_))
    }

    /// Usable in a boolean context: integers and pointers.
    pub fn is_scalar(&self, id: TypeId) -> bool {
        self.is_integer(id) || self.is_pointer(id)
    }

    /// Pointer or array; something `*` and `[]` apply to.
    pub fn is_dereferencable(&self, id: TypeId) -> bool {
        self.is_pointer(id) || self.is_array(id)
    }

    pub fn pointee(&self, id: TypeId) -> Option<TypeId> {
        match self.get(id) {
            Type::Pointer { base } => Some(*base),
            _ => None,
        }
    }

    /// Element type behind a pointer or array.
    pub fn base_of(&self, id: TypeId) -> Option<TypeId> {
        match self.get(id) {
            Type::Pointer { base } | Type::Array { base, .. } => Some(*base),
            _ => None,
        }
    }

    pub fn composite(&self, id: TypeId) -> Option<&CompositeType> {
        match self.get(id) {
            Type::Struct(c) | Type::Union(c) => Some(c),
            _ => None,
        }
    }

    pub fn member(&self, id: TypeId, name: &str) -> Option<&Member> {
        self.composite(id)?.members.iter().find(|m| m.name == name)
    }

    /// Return type of a function, or of a pointer to function.
    pub fn return_type(&self, id: TypeId) -> Option<TypeId> {
        match self.get(id) {
            Type::Function { ret, .. } => Some(*ret),
            Type::Pointer { base } => match self.get(*base) {
                Type::Function { ret, .. } => Some(*ret),
                _ => None,
            },
            _ => None,
        }
    }

    /// Structural equality; struct/union compare nominally (same id).
    pub fn is_same(&self, a: TypeId, b: TypeId) -> bool {
        if a == b {
            return true;
        }
        match (self.get(a), self.get(b)) {
            (Type::Void, Type::Void) => true,
            (
                Type::Integer { kind: k1, signed: s1 },
                Type::Integer { kind: k2, signed: s2 },
            ) => k1 == k2 && s1 == s2,
            (Type::Pointer { base: b1 }, Type::Pointer { base: b2 }) => self.is_same(*b1, *b2),
            (
                Type::Array { base: b1, length: l1 },
                Type::Array { base: b2, length: l2 },
            ) => l1 == l2 && self.is_same(*b1, *b2),
            (
                Type::Function { ret: r1, params: p1, variadic: v1 },
                Type::Function { ret: r2, params: p2, variadic: v2 },
            ) => {
                v1 == v2
                    && p1.len() == p2.len()
                    && self.is_same(*r1, *r2)
                    && p1.iter().zip(p2).all(|(&a, &b)| self.is_same(a, b))
            }
            _ => false,
        }
    }

    // ---- sizes ------------------------------------------------------

    /// Size in bytes, or None for void, functions, incomplete composites
    /// and unsized arrays.
    pub fn size_of(&self, id: TypeId) -> Option<u32> {
        match self.get(id) {
            Type::Void | Type::Function { .. } => None,
            Type::Integer { kind, .. } => Some(kind.size()),
            Type::Pointer { .. } => Some(POINTER_SIZE),
            Type::Array { base, length } => {
                let length = (*length)? as u32;
                Some(self.size_of(*base)? * length)
            }
            Type::Struct(c) | Type::Union(c) => {
                if c.complete {
                    Some(c.size)
                } else {
                    None
                }
            }
        }
    }

    pub fn align_of(&self, id: TypeId) -> Option<u32> {
        match self.get(id) {
            Type::Void | Type::Function { .. } => None,
            Type::Integer { kind, .. } => Some(kind.size()),
            Type::Pointer { .. } => Some(POINTER_ALIGN),
            Type::Array { base, .. } => self.align_of(*base),
            Type::Struct(c) | Type::Union(c) => {
                if c.complete {
                    Some(c.align)
                } else {
                    None
                }
            }
        }
    }

    /// Human-readable spelling for diagnostics.
    pub fn name_of(&self, id: TypeId) -> String {
        match self.get(id) {
            Type::Void => "void".to_string(),
            Type::Integer { kind, signed } => {
                if *signed {
                    kind.name().to_string()
                } else {
                    format!("unsigned {}", kind.name())
                }
            }
            Type::Pointer { base } => format!("{}*", self.name_of(*base)),
            Type::Array { base, length } => match length {
                Some(n) => format!("{}[{}]", self.name_of(*base), n),
                None => format!("{}[]", self.name_of(*base)),
            },
            Type::Function { ret, params, variadic } => {
                let mut args: Vec<String> = params.iter().map(|&p| self.name_of(p)).collect();
                if *variadic {
                    args.push("...".to_string());
                }
                format!("{}({})", self.name_of(*ret), args.join(", "))
            }
            Type::Struct(c) => format!("struct {}", c.name),
            Type::Union(c) => format!("union {}", c.name),
        }
    }

    // ---- semantic check and layout ----------------------------------

    /// Checks required by the language before layouts can exist:
    /// duplicate members, value-recursive definitions, incomplete or
    /// function-typed members, zero-length arrays. Layouts for every
    /// complete struct/union are computed here, exactly once.
    pub fn semantic_check(&mut self, diags: &mut Diagnostics) {
        let ids: Vec<TypeId> = self.composites().map(|(id, _)| id).collect();
        for &id in &ids {
            self.check_duplicate_members(id, diags);
        }
        for &id in &ids {
            let mut stack = Vec::new();
            self.check_recursion(id, id, &mut stack, diags);
        }
        for &id in &ids {
            self.check_member_types(id, diags);
        }
        if diags.has_errors() {
            return;
        }
        for &id in &ids {
            self.layout(id);
        }
    }

    fn check_duplicate_members(&self, id: TypeId, diags: &mut Diagnostics) {
        let Some(composite) = self.composite(id) else { return };
        let mut seen: HashMap<&str, ()> = HashMap::new();
        for member in &composite.members {
            if seen.insert(member.name.as_str(), ()).is_some() {
                diags.error(
                    member.location.clone(),
                    format!(
                        "duplicate member {} in {}",
                        member.name,
                        self.name_of(id)
                    ),
                );
            }
        }
    }

    /// A struct/union may contain a pointer to itself, never a value of
    /// itself, directly or through other composites or arrays.
    fn check_recursion(
        &self,
        root: TypeId,
        id: TypeId,
        stack: &mut Vec<TypeId>,
        diags: &mut Diagnostics,
    ) {
        let Some(composite) = self.composite(id) else { return };
        if stack.contains(&id) {
            if id == root {
                diags.error(
                    composite.location.clone(),
                    format!("recursive definition of {}", self.name_of(id)),
                );
            }
            return;
        }
        stack.push(id);
        for member in &composite.members {
            let mut ty = member.ty;
            while let Type::Array { base, .. } = self.get(ty) {
                ty = *base;
            }
            if self.is_composite(ty) {
                self.check_recursion(root, ty, stack, diags);
            }
        }
        stack.pop();
    }

    fn check_member_types(&self, id: TypeId, diags: &mut Diagnostics) {
        let Some(composite) = self.composite(id) else { return };
        for member in &composite.members {
            match self.get(member.ty) {
                Type::Void => diags.error(
                    member.location.clone(),
                    format!("member {} has void type", member.name),
                ),
                Type::Function { .. } => diags.error(
                    member.location.clone(),
                    format!("member {} has function type", member.name),
                ),
                Type::Array { base, length } => {
                    if *length == Some(0) {
                        diags.error(
                            member.location.clone(),
                            format!("member {} is a zero-length array", member.name),
                        );
                    }
                    if self.size_of(*base).is_none() && !self.is_composite(*base) {
                        diags.error(
                            member.location.clone(),
                            format!("array member {} has incomplete element type", member.name),
                        );
                    }
                }
                Type::Struct(c) | Type::Union(c) if !c.complete => diags.error(
                    member.location.clone(),
                    format!(
                        "member {} has incomplete type {}",
                        member.name,
                        self.name_of(member.ty)
                    ),
                ),
                _ => {}
            }
        }
    }

    fn round_up(value: u32, align: u32) -> u32 {
        (value + align - 1) / align * align
    }

    /// Compute offsets, total size and alignment for one composite.
    /// Members are placed in declaration order; each is aligned to its own
    /// alignment; struct size is padded to the struct alignment (the
    /// maximum member alignment). Unions overlay all members at offset 0.
    fn layout(&mut self, id: TypeId) {
        let is_union = matches!(self.get(id), Type::Union(_));
        let member_info: Vec<(u32, u32)> = match self.get(id) {
            Type::Struct(c) | Type::Union(c) => c
                .members
                .iter()
                .map(|m| {
                    (
                        self.size_of(m.ty).unwrap_or(0),
                        self.align_of(m.ty).unwrap_or(1),
                    )
                })
                .collect(),
            _ => return,
        };

        let mut offsets = Vec::with_capacity(member_info.len());
        let mut size: u32 = 0;
        let mut align: u32 = 1;
        for (msize, malign) in &member_info {
            align = align.max(*malign);
            if is_union {
                offsets.push(0);
                size = size.max(*msize);
            } else {
                let offset = Self::round_up(size, (*malign).max(1));
                offsets.push(offset);
                size = offset + msize;
            }
        }
        size = Self::round_up(size, align);

        match &mut self.types[id] {
            Type::Struct(c) | Type::Union(c) => {
                for (member, offset) in c.members.iter_mut().zip(offsets) {
                    member.offset = offset;
                }
                c.size = size;
                c.align = align;
            }
            _ => {}
        }
    }
}

impl Default for TypeTable {
    fn default() -> Self {
        TypeTable::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(table: &TypeTable, name: &str, ty: TypeId) -> Member {
        let _ = table;
        Member {
            name: name.to_string(),
            ty,
            offset: 0,
            location: Location::none(),
        }
    }

    #[test]
    fn test_primitive_sizes_ilp32() {
        let mut table = TypeTable::new();
        assert_eq!(table.size_of(table.signed_char()), Some(1));
        assert_eq!(table.size_of(table.integer(IntKind::Short, true)), Some(2));
        assert_eq!(table.size_of(table.signed_int()), Some(4));
        assert_eq!(table.size_of(table.integer(IntKind::Long, false)), Some(4));
        let int = table.signed_int();
        let ptr = table.pointer_to(int);
        assert_eq!(table.size_of(ptr), Some(4));
    }

    #[test]
    fn test_pointer_interning() {
        let mut table = TypeTable::new();
        let int = table.signed_int();
        assert_eq!(table.pointer_to(int), table.pointer_to(int));
    }

    #[test]
    fn test_struct_layout_alignment_and_padding() {
        let mut table = TypeTable::new();
        let c = table.signed_char();
        let i = table.signed_int();
        let name = TypeName::Struct("p".to_string());
        let members = vec![
            member(&table, "flag", c),
            member(&table, "x", i),
            member(&table, "tag", c),
        ];
        assert!(table.define_composite(&name, members, Location::none()));
        let mut diags = Diagnostics::new();
        table.semantic_check(&mut diags);
        assert!(!diags.has_errors());

        let id = table.lookup(&name).unwrap();
        let composite = table.composite(id).unwrap();
        let offsets: Vec<u32> = composite.members.iter().map(|m| m.offset).collect();
        assert_eq!(offsets, vec![0, 4, 8]);
        assert_eq!(composite.size, 12); // padded to int alignment
        assert_eq!(composite.align, 4);
    }

    #[test]
    fn test_layout_is_deterministic() {
        for _ in 0..3 {
            let mut table = TypeTable::new();
            let s = table.integer(IntKind::Short, true);
            let i = table.signed_int();
            let name = TypeName::Struct("q".to_string());
            let members = vec![member(&table, "a", s), member(&table, "b", i)];
            table.define_composite(&name, members, Location::none());
            let mut diags = Diagnostics::new();
            table.semantic_check(&mut diags);
            let id = table.lookup(&name).unwrap();
            let composite = table.composite(id).unwrap();
            assert_eq!(composite.members[1].offset, 4);
            assert_eq!((composite.size, composite.align), (8, 4));
        }
    }

    #[test]
    fn test_union_layout() {
        let mut table = TypeTable::new();
        let c = table.signed_char();
        let i = table.signed_int();
        let name = TypeName::Union("u".to_string());
        let members = vec![member(&table, "c", c), member(&table, "i", i)];
        table.define_composite(&name, members, Location::none());
        let mut diags = Diagnostics::new();
        table.semantic_check(&mut diags);
        let id = table.lookup(&name).unwrap();
        let composite = table.composite(id).unwrap();
        assert!(composite.members.iter().all(|m| m.offset == 0));
        assert_eq!((composite.size, composite.align), (4, 4));
    }

    #[test]
    fn test_self_pointer_is_allowed() {
        let mut table = TypeTable::new();
        let name = TypeName::Struct("node".to_string());
        let id = table.declare_composite(&name, Location::none());
        let self_ptr = table.pointer_to(id);
        let i = table.signed_int();
        let members = vec![member(&table, "value", i), member(&table, "next", self_ptr)];
        table.define_composite(&name, members, Location::none());
        let mut diags = Diagnostics::new();
        table.semantic_check(&mut diags);
        assert!(!diags.has_errors());
        assert_eq!(table.size_of(id), Some(8));
    }

    #[test]
    fn test_direct_recursion_is_rejected() {
        let mut table = TypeTable::new();
        let name = TypeName::Struct("s".to_string());
        let id = table.declare_composite(&name, Location::none());
        let members = vec![member(&table, "again", id)];
        table.define_composite(&name, members, Location::none());
        let mut diags = Diagnostics::new();
        table.semantic_check(&mut diags);
        assert!(diags.has_errors());
        assert!(diags.iter().any(|d| d.message.contains("recursive definition")));
    }

    #[test]
    fn test_duplicate_member_is_rejected() {
        let mut table = TypeTable::new();
        let i = table.signed_int();
        let name = TypeName::Struct("d".to_string());
        let members = vec![member(&table, "x", i), member(&table, "x", i)];
        table.define_composite(&name, members, Location::none());
        let mut diags = Diagnostics::new();
        table.semantic_check(&mut diags);
        assert!(diags.has_errors());
    }

    #[test]
    fn test_struct_and_typedef_names_do_not_collide() {
        let mut table = TypeTable::new();
        let i = table.signed_int();
        let tag = TypeName::Struct("foo".to_string());
        table.declare_composite(&tag, Location::none());
        assert!(table.define_typedef("foo", i));
        assert_ne!(table.lookup(&tag), table.lookup(&TypeName::Plain("foo".to_string())));
    }

    #[test]
    fn test_is_same_structural_and_nominal() {
        let mut table = TypeTable::new();
        let i = table.signed_int();
        let f1 = table.function(i, vec![i], false);
        let f2 = table.function(i, vec![i], false);
        assert!(table.is_same(f1, f2));

        let a = table.declare_composite(&TypeName::Struct("a".to_string()), Location::none());
        let b = table.declare_composite(&TypeName::Struct("b".to_string()), Location::none());
        assert!(!table.is_same(a, b));
    }
}
