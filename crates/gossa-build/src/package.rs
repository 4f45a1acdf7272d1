//! Building a created package: its initializer and every declared body.

use crate::builder::Lowering;
use crate::create::CreatedPackage;
use crate::lvalue::Lvalue;
use crate::options::BuildOptions;
use gossa_core::ssa::{CallCommon, InstrKind, Package, Program, Value};
use gossa_core::syntax::SourceProgram;
use gossa_core::types::Type;
use gossa_core::Result;
use std::sync::Arc;

pub fn build_package(
    program: &Program,
    source: &SourceProgram,
    created: &CreatedPackage<'_>,
    options: &BuildOptions,
) -> Result<()> {
    let package = &created.package;
    gossa_core::debug!("building package {}", package.path);

    let mut imports = Vec::with_capacity(package.imports.len());
    for path in &package.imports {
        match program.package(path) {
            Some(import) => imports.push(import),
            None => crate::build_bail!(&package.path, format!("imported package {} was not created", path)),
        }
    }

    let mut lowering = Lowering::new(program, source, package, &created.scope_ids, options);
    lowering.build_init(&imports, created);
    for (func, decl) in &created.functions {
        if let Some(body) = &decl.body {
            lowering.build_declared(func, decl.recv.as_ref(), &decl.func, body);
        }
    }
    Ok(())
}

impl<'a> Lowering<'a> {
    /// The package initializer: runs once per program, initializing imports
    /// first, then package variables in dependency order, then the source
    /// `init` functions.
    fn build_init(&mut self, imports: &[Arc<Package>], created: &CreatedPackage<'_>) {
        let init = self.package.init.clone();
        self.push_function(init.clone());

        let guard = Value::Global(self.package.init_guard.clone());
        let start = self.fs().new_block("init.start");
        let done = self.fs().new_block("init.done");
        let initialized = self.fs().emit_load(guard.clone());
        self.fs().emit_if(initialized, done, start);
        self.fs().set_block(start);
        self.fs().emit_store(guard, Value::bool(true));

        for import in imports {
            self.emit_init_call(Value::Function(import.init.clone()));
        }

        for initializer in &created.source.init_order {
            if let [lhs] = initializer.lhs.as_slice() {
                let loc = match lhs.and_then(|obj| self.program.globals.get_cloned(&obj)) {
                    Some(global) => Lvalue::Address {
                        ty: global.elem_type(),
                        addr: Value::Global(global),
                    },
                    None => Lvalue::Blank,
                };
                self.assign(&loc, &initializer.rhs, true, None);
            } else {
                let tuple = self.expr_n(&initializer.rhs);
                for (i, lhs) in initializer.lhs.iter().enumerate() {
                    let Some(global) = lhs.and_then(|obj| self.program.globals.get_cloned(&obj)) else {
                        continue;
                    };
                    let v = self.fs().emit_extract(tuple.clone(), i);
                    self.fs().emit_store(Value::Global(global), v);
                }
            }
        }

        let package = self.package;
        for func in &package.inits {
            self.emit_init_call(Value::Function(func.clone()));
        }

        self.fs().emit_jump(done);
        self.fs().set_block(done);
        self.fs().emit_return(Vec::new());
        let state = self.pop_function();
        self.install(&init, state.finish());
    }

    fn emit_init_call(&mut self, callee: Value) {
        let sig = Type::func(vec![], vec![], false);
        let span = self.fs().pos;
        self.fs().emit(
            InstrKind::Call(CallCommon {
                callee,
                method: None,
                args: Vec::new(),
                sig,
                span,
            }),
            Some(Type::tuple(vec![])),
        );
    }
}
