//! Declaration-level dependency table.
//!
//! Vertices are declarations (formulas and imports); arguments, constants
//! and module aliases are leaves outside the graph. Edges are discovered by
//! walking formula bodies with the shared tree walker, resolving each
//! identifier on exit against the enclosing module scope. The table answers
//! `dependencies`/`dependents` queries and computes the minimal partial
//! order used for execution grouping.

use tally_dsl::ast::{Expr, ImportDecl, ImportKind, MacroArg, MacroName};
use tally_dsl::walk::{ExprVisitor, walk_expr};

use crate::error::CompileError;
use crate::program::Program;
use crate::symbols::{LocalKind, Resolution, SlotId, SymbolRegistry};
use crate::value::fold;

/// Stable identity of a declaration vertex
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeclId(pub(crate) u32);

impl DeclId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Which declaration a vertex stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclKind {
    Formula { module: usize, formula: usize },
    Import { module: usize, import: usize },
}

/// A declaration vertex in the arena
#[derive(Debug)]
pub struct Declaration {
    pub kind: DeclKind,
    pub slot: SlotId,
    pub module: usize,
    pub name: String,
    /// `module.name`, used for error records and cycle reports
    pub label: String,
}

/// The dependency graph over declarations
#[derive(Debug)]
pub struct DependencyTable {
    decls: Vec<Declaration>,
    deps: Vec<Vec<DeclId>>,
    rdeps: Vec<Vec<DeclId>>,
}

impl DependencyTable {
    pub fn build(program: &Program, registry: &SymbolRegistry) -> Self {
        let mut decls = Vec::new();
        let mut import_ids: Vec<Vec<DeclId>> = Vec::with_capacity(program.modules.len());
        let mut formula_ids: Vec<Vec<DeclId>> = Vec::with_capacity(program.modules.len());

        // Arena layout: per module, imports then formulas.
        for (module_idx, module) in program.modules.iter().enumerate() {
            let module_name = &module.name.node;
            let scope = registry
                .module_scope(module_name)
                .unwrap_or_else(|| unreachable!("registry covers every module"));

            let mut imports = Vec::with_capacity(module.imports.len());
            for (import_idx, import) in module.imports.iter().enumerate() {
                let local = &import.local_name.node;
                let slot = scope
                    .local(local)
                    .map(|entry| entry.slot)
                    .unwrap_or_else(|| unreachable!("registry covers every import"));
                let id = DeclId(decls.len() as u32);
                decls.push(Declaration {
                    kind: DeclKind::Import {
                        module: module_idx,
                        import: import_idx,
                    },
                    slot,
                    module: module_idx,
                    name: local.clone(),
                    label: format!("{module_name}.{local}"),
                });
                imports.push(id);
            }
            import_ids.push(imports);

            let mut formulas = Vec::with_capacity(module.formulas.len());
            for (formula_idx, formula) in module.formulas.iter().enumerate() {
                let name = &formula.name.node;
                let slot = scope
                    .local(name)
                    .map(|entry| entry.slot)
                    .unwrap_or_else(|| unreachable!("registry covers every formula"));
                let id = DeclId(decls.len() as u32);
                decls.push(Declaration {
                    kind: DeclKind::Formula {
                        module: module_idx,
                        formula: formula_idx,
                    },
                    slot,
                    module: module_idx,
                    name: name.clone(),
                    label: format!("{module_name}.{name}"),
                });
                formulas.push(id);
            }
            formula_ids.push(formulas);
        }

        let mut deps: Vec<Vec<DeclId>> = vec![Vec::new(); decls.len()];

        for (module_idx, module) in program.modules.iter().enumerate() {
            for (import_idx, import) in module.imports.iter().enumerate() {
                let id = import_ids[module_idx][import_idx];
                deps[id.index()] = import_edges(import, program, registry, &formula_ids);
            }

            for (formula_idx, formula) in module.formulas.iter().enumerate() {
                let mut visitor = DependencyVisitor {
                    registry,
                    module: &module.name.node,
                    import_ids: &import_ids[module_idx],
                    formula_ids: &formula_ids[module_idx],
                    edges: Vec::new(),
                    shadow: Vec::new(),
                    pending_bindings: Vec::new(),
                    where_pushed: Vec::new(),
                };
                walk_expr(&formula.body, &mut visitor);

                let id = formula_ids[module_idx][formula_idx];
                deps[id.index()] = sort_unique(visitor.edges);
            }
        }

        let mut rdeps: Vec<Vec<DeclId>> = vec![Vec::new(); decls.len()];
        for (from, targets) in deps.iter().enumerate() {
            for target in targets {
                rdeps[target.index()].push(DeclId(from as u32));
            }
        }

        Self { decls, deps, rdeps }
    }

    pub fn len(&self) -> usize {
        self.decls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decls.is_empty()
    }

    pub fn declaration(&self, id: DeclId) -> &Declaration {
        &self.decls[id.index()]
    }

    pub fn declarations(&self) -> impl Iterator<Item = (DeclId, &Declaration)> {
        self.decls
            .iter()
            .enumerate()
            .map(|(i, d)| (DeclId(i as u32), d))
    }

    /// Declarations this vertex depends on
    pub fn dependencies(&self, id: DeclId) -> &[DeclId] {
        &self.deps[id.index()]
    }

    /// Declarations depending on this vertex
    pub fn dependents(&self, id: DeclId) -> &[DeclId] {
        &self.rdeps[id.index()]
    }

    /// Longest-antichain decomposition: repeatedly peel the vertices whose
    /// remaining dependencies are exhausted. Produces the fewest layers
    /// compatible with the DAG; the layer count equals the longest
    /// dependency chain. Fails on any cycle.
    pub fn minimal_partial_order(&self) -> Result<Vec<Vec<DeclId>>, CompileError> {
        let mut remaining: Vec<usize> = self.deps.iter().map(Vec::len).collect();
        let mut layers = Vec::new();
        let mut processed = 0;

        let mut current: Vec<DeclId> = (0..self.decls.len() as u32)
            .map(DeclId)
            .filter(|id| remaining[id.index()] == 0)
            .collect();

        while !current.is_empty() {
            current.sort();
            processed += current.len();

            let mut next = Vec::new();
            for id in &current {
                for dependent in &self.rdeps[id.index()] {
                    let count = &mut remaining[dependent.index()];
                    *count -= 1;
                    if *count == 0 {
                        next.push(*dependent);
                    }
                }
            }

            layers.push(std::mem::replace(&mut current, next));
        }

        if processed != self.decls.len() {
            let formulas = self
                .decls
                .iter()
                .enumerate()
                .filter(|(i, _)| remaining[*i] > 0)
                .map(|(_, d)| d.label.clone())
                .collect();
            return Err(CompileError::Cycle { formulas });
        }

        Ok(layers)
    }
}

/// Edges out of an import vertex. Missing targets are left dangling; they
/// surface as `UnresolvedIdentifier` when the import step evaluates.
fn import_edges(
    import: &ImportDecl,
    program: &Program,
    registry: &SymbolRegistry,
    formula_ids: &[Vec<DeclId>],
) -> Vec<DeclId> {
    match import.kind {
        ImportKind::Argument | ImportKind::Constant => Vec::new(),
        ImportKind::Formula => {
            let [module_name, formula_name] = import.path.as_slice() else {
                return Vec::new();
            };
            let Some(scope) = registry.module_scope(module_name) else {
                return Vec::new();
            };
            match scope.local(formula_name).map(|entry| entry.kind) {
                Some(LocalKind::Formula(formula_idx)) => {
                    vec![formula_ids[scope.index][formula_idx]]
                }
                _ => Vec::new(),
            }
        }
        ImportKind::Module => {
            let [module_name] = import.path.as_slice() else {
                return Vec::new();
            };
            let Some(scope) = registry.module_scope(module_name) else {
                return Vec::new();
            };
            program.modules[scope.index]
                .formulas
                .iter()
                .enumerate()
                .filter(|(_, f)| f.is_exported)
                .map(|(formula_idx, _)| formula_ids[scope.index][formula_idx])
                .collect()
        }
    }
}

/// Collects declaration edges from one formula body.
///
/// `where()` bindings shadow their name for the conditions, branches and
/// default, but not for the binding's own initializer; the binding
/// activates when the initializer expression exits.
struct DependencyVisitor<'a> {
    registry: &'a SymbolRegistry,
    module: &'a str,
    import_ids: &'a [DeclId],
    formula_ids: &'a [DeclId],
    edges: Vec<DeclId>,
    shadow: Vec<String>,
    pending_bindings: Vec<(String, *const Expr)>,
    where_pushed: Vec<bool>,
}

impl ExprVisitor for DependencyVisitor<'_> {
    fn on_enter(&mut self, expr: &Expr) {
        if let Expr::Macro {
            name: MacroName::Where,
            args,
        } = expr
        {
            if let Some(MacroArg::Named { name, value }) = args.first() {
                self.pending_bindings.push((fold(name), value as *const Expr));
                self.where_pushed.push(true);
            } else {
                self.where_pushed.push(false);
            }
        }
    }

    fn on_exit(&mut self, expr: &Expr) {
        if let Expr::Identifier(name) = expr {
            let folded = fold(name);
            if !self.shadow.contains(&folded) {
                match self.registry.try_resolve(self.module, name) {
                    Some(Resolution::Formula { formula, .. }) => {
                        self.edges.push(self.formula_ids[formula]);
                    }
                    Some(Resolution::Import { import, .. }) => {
                        self.edges.push(self.import_ids[import]);
                    }
                    // Arguments, constants and module aliases are leaves.
                    _ => {}
                }
            }
        }

        let activate = self
            .pending_bindings
            .last()
            .is_some_and(|(_, ptr)| std::ptr::eq(*ptr, expr));
        if activate && let Some((name, _)) = self.pending_bindings.pop() {
            self.shadow.push(name);
        }

        if let Expr::Macro {
            name: MacroName::Where,
            ..
        } = expr
            && self.where_pushed.pop() == Some(true)
        {
            self.shadow.pop();
        }
    }
}

fn sort_unique(mut ids: Vec<DeclId>) -> Vec<DeclId> {
    ids.sort();
    ids.dedup();
    ids
}
