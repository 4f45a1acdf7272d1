//! Creation of package members ahead of body construction.
//!
//! Every package of the program is created before any body is built, so a
//! body can refer to functions and globals of any package, its own
//! included, regardless of build order.

use gossa_core::span::Span;
use gossa_core::ssa::{Constant, Function, Member, NamedConst, Package, Program, ScopeId, ScopeInfo};
use gossa_core::syntax::{Decl, FuncDecl, ObjectKind, ScopeRef, ScopeTree, SourcePackage, SourceProgram};
use gossa_core::types::Type;
use std::collections::BTreeMap;
use std::sync::Arc;

/// A created package together with what its build needs from the source.
pub struct CreatedPackage<'s> {
    pub package: Arc<Package>,
    pub source: &'s SourcePackage,
    /// Preorder scope id of every node of the source scope tree.
    pub scope_ids: Vec<ScopeId>,
    /// Functions with a body to build, in declaration order.
    pub functions: Vec<(Arc<Function>, &'s FuncDecl)>,
}

pub fn create_package<'s>(
    program: &Program,
    source: &'s SourceProgram,
    pkg: &'s SourcePackage,
) -> CreatedPackage<'s> {
    gossa_core::debug!("creating package {}", pkg.path);
    let (scope_ids, scopes) = number_scopes(&pkg.scopes, pkg.scope);

    let mut members = BTreeMap::new();
    let mut methods = Vec::new();
    let mut inits = Vec::new();
    let mut functions = Vec::new();

    for decl in pkg.files.iter().flat_map(|f| f.decls.iter()) {
        match decl {
            Decl::Func(fd) => {
                let is_init = fd.name == "init" && fd.recv.is_none();
                let name = if is_init {
                    format!("init#{}", inits.len() + 1)
                } else {
                    fd.name.clone()
                };
                let mut func = Function::new(name, Some(pkg.path.clone()), fd.ty.clone(), fd.span).with_object(fd.obj);
                if fd.body.is_none() {
                    func = func.external();
                }
                let func = Arc::new(func);

                if is_init {
                    inits.push(func.clone());
                } else if let Some(recv) = &fd.recv {
                    let named = recv.ty.deref().named_type().map(|n| n.id());
                    if let Some(id) = named {
                        program
                            .declared_methods
                            .insert((id, fd.name.clone()), func.clone());
                    }
                    program.funcs.insert(fd.obj, func.clone());
                    methods.push(func.clone());
                } else {
                    program.funcs.insert(fd.obj, func.clone());
                    members.insert(fd.name.clone(), Member::Func(func.clone()));
                }
                if fd.body.is_some() {
                    functions.push((func, fd));
                }
            }
            Decl::Var(objs) => {
                for obj in objs {
                    let object = source.object(*obj);
                    if object.name == "_" {
                        continue;
                    }
                    let global =
                        program.new_global(&object.name, &pkg.path, object.ty.clone(), Some(*obj), object.span);
                    members.insert(object.name.clone(), Member::Global(global));
                }
            }
            Decl::Const(objs) => {
                for obj in objs {
                    let object = source.object(*obj);
                    if let ObjectKind::Const(value) = &object.kind {
                        members.insert(
                            object.name.clone(),
                            Member::Const(NamedConst {
                                name: object.name.clone(),
                                value: Constant::new(value.clone(), object.ty.clone()),
                                object: *obj,
                            }),
                        );
                    }
                }
            }
            Decl::Type(obj) => {
                let object = source.object(*obj);
                members.insert(object.name.clone(), Member::Type(object.ty.clone()));
            }
        }
    }

    let init = Arc::new(
        Function::new("init", Some(pkg.path.clone()), Type::func(vec![], vec![], false), Span::none())
            .with_synthetic("package initializer"),
    );
    let init_guard = program.new_global("init$guard", &pkg.path, Type::bool(), None, Span::none());
    members.insert("init$guard".to_string(), Member::Global(init_guard.clone()));

    let package = Arc::new(Package {
        path: pkg.path.clone(),
        name: pkg.name.clone(),
        imports: pkg.imports.clone(),
        members,
        init,
        init_guard,
        scopes,
        methods,
        inits,
    });
    CreatedPackage {
        package,
        source: pkg,
        scope_ids,
        functions,
    }
}

/// Numbers the scope tree in preorder from `root`. Nodes not reachable
/// from `root` are numbered after it, without a parent.
fn number_scopes(tree: &ScopeTree, root: ScopeRef) -> (Vec<ScopeId>, Vec<ScopeInfo>) {
    let mut ids: Vec<Option<ScopeId>> = vec![None; tree.nodes.len()];
    let mut infos = Vec::with_capacity(tree.nodes.len());

    let mut pending: Vec<(ScopeRef, Option<ScopeId>)> = Vec::new();
    if (root.0 as usize) < tree.nodes.len() {
        pending.push((root, None));
    }
    let mut orphans = (0..tree.nodes.len() as u32).map(ScopeRef);
    loop {
        let Some((scope, parent)) = pending.pop().or_else(|| {
            orphans
                .by_ref()
                .find(|s| ids[s.0 as usize].is_none())
                .map(|s| (s, None))
        }) else {
            break;
        };
        let id = infos.len() as ScopeId;
        ids[scope.0 as usize] = Some(id);
        let node = tree.node(scope);
        infos.push(ScopeInfo {
            id,
            parent,
            span: node.span,
        });
        for child in node.children.iter().rev() {
            if ids[child.0 as usize].is_none() {
                pending.push((*child, Some(id)));
            }
        }
    }
    (ids.into_iter().map(|id| id.unwrap_or_default()).collect(), infos)
}
