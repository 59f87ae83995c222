//! Execution planner.
//!
//! Turns the dependency table's minimal partial order into ordered
//! execution groups. Each declaration becomes exactly one step with a
//! dense id assigned in flattened order, so every step's dependencies have
//! smaller ids and live in earlier groups. Members of one group never
//! depend on each other and are safe to run in parallel.

use tally_dsl::ast::{Expr, ImportKind, UnaryOp};

use crate::deps::{DeclId, DeclKind, DependencyTable};
use crate::error::CompileError;
use crate::program::Program;
use crate::symbols::{Resolution, SymbolRegistry};
use crate::value::Value;

/// Whether a step's body settles inline or yields a pending computation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    Sync,
    Async,
}

/// One unit of runtime work for a single declaration
#[derive(Debug)]
pub struct ExecutionStep {
    pub id: usize,
    pub decl: DeclId,
    pub kind: StepKind,
    /// Step ids this step waits on; all smaller than `id`
    pub dependencies: Vec<usize>,
}

/// A barrier of steps with no dependencies between them
#[derive(Debug)]
pub struct ExecutionGroup {
    pub steps: Vec<ExecutionStep>,
}

/// The ordered groups one call executes
#[derive(Debug)]
pub struct ExecutionPlan {
    pub groups: Vec<ExecutionGroup>,
    step_count: usize,
}

impl ExecutionPlan {
    pub fn build(
        program: &Program,
        registry: &SymbolRegistry,
        table: &DependencyTable,
    ) -> Result<Self, CompileError> {
        let layers = table.minimal_partial_order()?;

        let mut step_of = vec![0usize; table.len()];
        let mut next_id = 0;
        for layer in &layers {
            for decl in layer {
                step_of[decl.index()] = next_id;
                next_id += 1;
            }
        }

        let groups = layers
            .iter()
            .map(|layer| ExecutionGroup {
                steps: layer
                    .iter()
                    .map(|decl| {
                        let mut dependencies: Vec<usize> = table
                            .dependencies(*decl)
                            .iter()
                            .map(|dep| step_of[dep.index()])
                            .collect();
                        dependencies.sort_unstable();
                        ExecutionStep {
                            id: step_of[decl.index()],
                            decl: *decl,
                            kind: classify(program, registry, table, *decl),
                            dependencies,
                        }
                    })
                    .collect(),
            })
            .collect();

        Ok(Self {
            groups,
            step_count: next_id,
        })
    }

    pub fn step_count(&self) -> usize {
        self.step_count
    }
}

/// Sync/async classification is a property of the declaration itself: an
/// import of a Pending constant, or a formula whose tail expression awaits
/// (or directly reads a Pending constant), is Async. A formula merely
/// depending on an Async step stays Sync; it receives the settled value
/// from the previous group.
fn classify(
    program: &Program,
    registry: &SymbolRegistry,
    table: &DependencyTable,
    decl: DeclId,
) -> StepKind {
    let declaration = table.declaration(decl);
    let module_name = &program.modules[declaration.module].name.node;

    let is_async = match declaration.kind {
        DeclKind::Import { module, import } => {
            let import = &program.modules[module].imports[import];
            import.kind == ImportKind::Constant
                && import
                    .path
                    .first()
                    .is_some_and(|name| program_constant_is_pending(program, registry, name))
        }
        DeclKind::Formula { module, formula } => {
            let body = &program.modules[module].formulas[formula].body;
            tail_is_async(body, program, registry, module_name)
        }
    };

    if is_async { StepKind::Async } else { StepKind::Sync }
}

fn tail_is_async(
    expr: &Expr,
    program: &Program,
    registry: &SymbolRegistry,
    module_name: &str,
) -> bool {
    match expr {
        Expr::Unary {
            op: UnaryOp::Await, ..
        } => true,
        Expr::Block(exprs) => exprs
            .last()
            .is_some_and(|tail| tail_is_async(tail, program, registry, module_name)),
        Expr::Identifier(name) => match registry.try_resolve(module_name, name) {
            Some(Resolution::Constant { index, .. }) => {
                matches!(program.constants[index].value, Value::Pending(_))
            }
            _ => false,
        },
        _ => false,
    }
}

/// Look the constant up in the program bucket directly: import targets are
/// not subject to module-scope shadowing.
fn program_constant_is_pending(program: &Program, registry: &SymbolRegistry, name: &str) -> bool {
    registry
        .constants
        .get(name)
        .is_some_and(|entry| matches!(program.constants[entry.index].value, Value::Pending(_)))
}
