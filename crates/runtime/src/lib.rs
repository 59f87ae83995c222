//! tally runtime
//!
//! Compiles tally programs and evaluates them: dependency analysis,
//! execution planning, emission and the group-barrier driver.

pub mod deps;
pub mod emit;
pub mod error;
pub mod exec;
pub mod ops;
pub mod plan;
pub mod program;
pub mod symbols;
pub mod value;

pub use error::{CompileError, Result};
pub use exec::{CallResult, Executable};
pub use program::{Program, value_from_literal};
pub use value::{ErrorValue, FunctionValue, ObjectValue, Pending, RuntimeErrorKind, Value};

use deps::DependencyTable;
use plan::ExecutionPlan;
use symbols::SymbolRegistry;
use tracing::info;

/// Compile a program into a callable executable.
///
/// Single-shot: any error rejects the program in full.
pub fn compile(program: &Program) -> Result<Executable> {
    let registry = SymbolRegistry::build(program)?;
    let table = DependencyTable::build(program, &registry);
    let plan = ExecutionPlan::build(program, &registry, &table)?;
    let steps = emit::emit(program, &registry, &table, &plan);

    let argument_slots = program
        .arguments()
        .iter()
        .map(|argument| {
            registry
                .arguments
                .get(&argument.name)
                .map(|entry| entry.slot)
                .unwrap_or_else(|| unreachable!("registry covers every argument"))
        })
        .collect();
    let constant_seeds = program
        .constants()
        .iter()
        .map(|constant| {
            let slot = registry
                .constants
                .get(&constant.name)
                .map(|entry| entry.slot)
                .unwrap_or_else(|| unreachable!("registry covers every constant"));
            (slot, constant.value.clone())
        })
        .collect();
    let module_slots = registry
        .module_scopes()
        .map(|scope| (scope.name.clone(), scope.exports_slot))
        .collect();

    info!(
        program = program.name(),
        steps = plan.step_count(),
        groups = plan.groups.len(),
        "program compiled"
    );

    Ok(Executable::new(
        program.name().to_string(),
        plan,
        steps,
        registry.slot_count(),
        argument_slots,
        constant_seeds,
        module_slots,
    ))
}
