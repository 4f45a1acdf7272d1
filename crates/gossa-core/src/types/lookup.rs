//! Field and method resolution through embedded fields.

use super::{MethodSpec, Type, TypeKind};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionKind {
    /// `x.f` selecting a struct field.
    FieldVal,
    /// `x.m` selecting a method of the value `x`.
    MethodVal,
    /// `T.m` selecting a method through its type.
    MethodExpr,
}

/// A method found by name, together with the type that declares it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodRef {
    pub name: String,
    /// Declared receiver: `T` or `*T` for concrete methods, the interface
    /// type itself for interface methods.
    pub recv: Type,
    /// Signature without the receiver.
    pub sig: Type,
}

impl MethodRef {
    pub fn is_interface(&self) -> bool {
        self.recv.is_interface()
    }

    pub fn pointer_recv(&self) -> bool {
        !self.is_interface() && self.recv.is_pointer()
    }

    /// Identity of the named type that declares a concrete method.
    pub fn named_id(&self) -> Option<u64> {
        self.recv.deref().named_type().map(|n| n.id())
    }

    fn concrete(named: &Type, spec: &MethodSpec) -> MethodRef {
        let recv = if spec.pointer_recv {
            Type::pointer(named.clone())
        } else {
            named.clone()
        };
        MethodRef {
            name: spec.name.clone(),
            recv,
            sig: spec.sig.clone(),
        }
    }
}

/// A resolved selector, as recorded by the front end for `x.f` and `x.m`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub kind: SelectionKind,
    /// Type of `x`.
    pub recv: Type,
    /// Path of field indices through embedded fields. The last element is
    /// the field index (fields) or the method index (methods).
    pub index: Vec<usize>,
    /// Whether the path goes through a pointer.
    pub indirect: bool,
    /// Type of the selected field, or the method signature without receiver.
    pub ty: Type,
    pub method: Option<MethodRef>,
}

#[derive(Debug, Clone)]
pub enum LookupResult {
    Field {
        index: Vec<usize>,
        indirect: bool,
        ty: Type,
    },
    Method {
        index: Vec<usize>,
        indirect: bool,
        method: MethodRef,
    },
}

struct Embedded {
    ty: Type,
    index: Vec<usize>,
    indirect: bool,
}

/// Resolves `name` on `ty` breadth-first through embedded fields, the way
/// field and method promotion works in Go. Ambiguous names resolve to `None`.
pub fn lookup_field_or_method(ty: &Type, name: &str) -> Option<LookupResult> {
    let (start, indirect) = match ty.kind() {
        TypeKind::Pointer(elem) => (elem.clone(), true),
        _ => (ty.clone(), false),
    };
    let mut current = vec![Embedded {
        ty: start,
        index: Vec::new(),
        indirect,
    }];
    let mut seen: HashSet<u64> = HashSet::new();

    while !current.is_empty() {
        let mut next = Vec::new();
        let mut found: Option<LookupResult> = None;
        let mut count = 0;

        for entry in current {
            let mut typ = entry.ty.clone();
            if let Some(named) = typ.named_type() {
                if !seen.insert(named.id()) {
                    continue;
                }
                if let Some((i, spec)) = named.method(name) {
                    count += 1;
                    found = Some(LookupResult::Method {
                        index: with(&entry.index, i),
                        indirect: entry.indirect,
                        method: MethodRef::concrete(&typ, &spec),
                    });
                    continue;
                }
                typ = named.underlying();
            }
            match typ.kind() {
                TypeKind::Struct(fields) => {
                    for (i, field) in fields.iter().enumerate() {
                        if field.name == name {
                            count += 1;
                            found = Some(LookupResult::Field {
                                index: with(&entry.index, i),
                                indirect: entry.indirect,
                                ty: field.ty.clone(),
                            });
                            continue;
                        }
                        if field.embedded {
                            let (ty, through_pointer) = match field.ty.kind() {
                                TypeKind::Pointer(elem) => (elem.clone(), true),
                                _ => (field.ty.clone(), false),
                            };
                            next.push(Embedded {
                                ty,
                                index: with(&entry.index, i),
                                indirect: entry.indirect || through_pointer,
                            });
                        }
                    }
                }
                TypeKind::Interface(methods) => {
                    if let Some(i) = methods.iter().position(|m| m.name == name) {
                        count += 1;
                        found = Some(LookupResult::Method {
                            index: with(&entry.index, i),
                            indirect: entry.indirect,
                            method: MethodRef {
                                name: name.to_string(),
                                recv: entry.ty.clone(),
                                sig: methods[i].sig.clone(),
                            },
                        });
                    }
                }
                _ => {}
            }
        }

        match count {
            0 => current = next,
            1 => return found,
            _ => return None,
        }
    }
    None
}

fn with(path: &[usize], last: usize) -> Vec<usize> {
    let mut path = path.to_vec();
    path.push(last);
    path
}

/// Finds `name` in the method set of `ty`: pointer-receiver methods only
/// count when the path to them goes through a pointer.
pub fn find_method(ty: &Type, name: &str) -> Option<Selection> {
    match lookup_field_or_method(ty, name)? {
        LookupResult::Method {
            index,
            indirect,
            method,
        } => {
            if method.pointer_recv() && !indirect {
                return None;
            }
            Some(Selection {
                kind: SelectionKind::MethodVal,
                recv: ty.clone(),
                index,
                indirect,
                ty: method.sig.clone(),
                method: Some(method),
            })
        }
        LookupResult::Field { .. } => None,
    }
}

/// Every method callable on a value of type `ty`, sorted by name.
pub fn method_set(ty: &Type) -> Vec<Selection> {
    if ty.is_interface() {
        return ty
            .interface_methods()
            .iter()
            .filter_map(|m| find_method(ty, &m.name))
            .collect();
    }
    let mut names: Vec<String> = Vec::new();
    collect_method_names(&ty.deref(), &mut names, &mut HashSet::new());
    names.sort();
    names.dedup();
    names
        .iter()
        .filter_map(|name| find_method(ty, name))
        .collect()
}

fn collect_method_names(ty: &Type, names: &mut Vec<String>, seen: &mut HashSet<u64>) {
    if let Some(named) = ty.named_type() {
        if !seen.insert(named.id()) {
            return;
        }
        names.extend(named.methods().into_iter().map(|m| m.name));
    }
    match ty.underlying().kind() {
        TypeKind::Struct(fields) => {
            for field in fields.iter().filter(|f| f.embedded) {
                collect_method_names(&field.ty.deref(), names, seen);
            }
        }
        TypeKind::Interface(methods) => {
            names.extend(methods.iter().map(|m| m.name.clone()));
        }
        _ => {}
    }
}

/// Whether `ty` implements the interface `iface`.
pub fn implements(ty: &Type, iface: &Type) -> bool {
    let wanted = iface.interface_methods();
    if ty.is_interface() {
        let have = ty.interface_methods();
        return wanted
            .iter()
            .all(|w| have.iter().any(|h| h.name == w.name && h.sig == w.sig));
    }
    wanted.iter().all(|w| match find_method(ty, &w.name) {
        Some(sel) => sel.ty == w.sig,
        None => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Field, InterfaceMethod};

    fn stringer() -> Type {
        Type::interface(vec![InterfaceMethod {
            name: "String".to_string(),
            sig: Type::func(vec![], vec![Type::string()], false),
        }])
    }

    #[test]
    fn promoted_methods_follow_embedding() {
        let inner = Type::named(Some("main"), "Inner");
        inner.set_underlying(Type::structure(vec![Field {
            name: "n".to_string(),
            ty: Type::int(),
            embedded: false,
        }]));
        inner.add_method(MethodSpec {
            name: "String".to_string(),
            pointer_recv: true,
            sig: Type::func(vec![], vec![Type::string()], false),
        });
        let outer = Type::named(Some("main"), "Outer");
        outer.set_underlying(Type::structure(vec![Field {
            name: "Inner".to_string(),
            ty: inner.clone(),
            embedded: true,
        }]));

        // Pointer-receiver method on an embedded value: only through *Outer.
        assert!(find_method(&outer, "String").is_none());
        let sel = find_method(&Type::pointer(outer.clone()), "String").expect("promoted");
        assert_eq!(sel.index, vec![0, 0]);
        assert!(sel.indirect);
        assert!(implements(&Type::pointer(outer.clone()), &stringer()));
        assert!(!implements(&outer, &stringer()));

        match lookup_field_or_method(&outer, "n") {
            Some(LookupResult::Field { index, .. }) => assert_eq!(index, vec![0, 0]),
            other => panic!("unexpected lookup result {other:?}"),
        }
    }
}
