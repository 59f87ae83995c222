//! Emitter.
//!
//! Compiles every declaration body into a boxed evaluation closure ahead
//! of time, so a call never re-walks the AST. Identifier resolution happens
//! here, once; an identifier that does not resolve compiles to an
//! `UnresolvedIdentifier` error constant rather than failing the build.

use tally_dsl::ast::{Expr, FormulaDecl, ImportDecl, ImportKind, MacroArg, MacroName, UnaryOp};
use tally_dsl::walk::{ExprVisitor, walk_expr};
use tracing::warn;

use crate::deps::{DeclKind, DependencyTable};
use crate::exec::CallFrame;
use crate::ops;
use crate::plan::ExecutionPlan;
use crate::program::{Program, value_from_literal};
use crate::symbols::{LocalKind, SlotId, SymbolRegistry};
use crate::value::{ErrorValue, ObjectValue, Value, fold};

/// A compiled expression body
pub(crate) type CompiledExpr = Box<dyn Fn(&CallFrame<'_>) -> Value + Send + Sync>;

/// Where an exported formula's value lands on success
pub(crate) struct ExportBinding {
    pub module_slot: SlotId,
    pub name: String,
}

/// A step's compiled body plus its post-action targets
pub(crate) struct CompiledStep {
    pub body: CompiledExpr,
    pub slot: SlotId,
    pub label: String,
    pub export: Option<ExportBinding>,
}

/// Compile every planned step, ordered by step id.
pub(crate) fn emit(
    program: &Program,
    registry: &SymbolRegistry,
    table: &DependencyTable,
    plan: &ExecutionPlan,
) -> Vec<CompiledStep> {
    let mut steps = Vec::with_capacity(plan.step_count());

    for group in &plan.groups {
        for step in &group.steps {
            let declaration = table.declaration(step.decl);
            let module = &program.modules[declaration.module];
            let module_name = &module.name.node;

            let compiled = match declaration.kind {
                DeclKind::Formula { formula, .. } => {
                    let formula = &module.formulas[formula];
                    warn_on_non_tail_await(formula, &declaration.label);

                    let mut compiler = ExprCompiler {
                        registry,
                        module: module_name,
                        locals: Vec::new(),
                    };
                    let body = compiler.compile(&formula.body);

                    let export = formula.is_exported.then(|| ExportBinding {
                        module_slot: registry
                            .module_scope(module_name)
                            .map(|scope| scope.exports_slot)
                            .unwrap_or_else(|| unreachable!("registry covers every module")),
                        name: formula.name.node.clone(),
                    });

                    CompiledStep {
                        body,
                        slot: declaration.slot,
                        label: declaration.label.clone(),
                        export,
                    }
                }
                DeclKind::Import { import, .. } => CompiledStep {
                    body: compile_import(&module.imports[import], registry),
                    slot: declaration.slot,
                    label: declaration.label.clone(),
                    export: None,
                },
            };

            steps.push(compiled);
        }
    }

    steps
}

/// An import step reads its target's slot; a dangling target becomes an
/// `UnresolvedIdentifier` constant.
fn compile_import(import: &ImportDecl, registry: &SymbolRegistry) -> CompiledExpr {
    let target_slot = match import.kind {
        ImportKind::Argument => import
            .path
            .first()
            .and_then(|name| registry.arguments.get(name))
            .map(|entry| entry.slot),
        ImportKind::Constant => import
            .path
            .first()
            .and_then(|name| registry.constants.get(name))
            .map(|entry| entry.slot),
        ImportKind::Module => import
            .path
            .first()
            .and_then(|name| registry.module_scope(name))
            .map(|scope| scope.exports_slot),
        ImportKind::Formula => match import.path.as_slice() {
            [module_name, formula_name] => registry
                .module_scope(module_name)
                .and_then(|scope| scope.local(formula_name))
                .filter(|entry| matches!(entry.kind, LocalKind::Formula(_)))
                .map(|entry| entry.slot),
            _ => None,
        },
    };

    match target_slot {
        Some(slot) => Box::new(move |frame| frame.read_slot(slot)),
        None => {
            let error = Value::Error(ErrorValue::unresolved(&import.path.join(".")));
            Box::new(move |_| error.clone())
        }
    }
}

/// Compiles one expression tree into nested closures.
struct ExprCompiler<'c> {
    registry: &'c SymbolRegistry,
    module: &'c str,
    /// Active `where()` binding names (folded), innermost last; indices
    /// line up with the frame's local stack at runtime.
    locals: Vec<String>,
}

impl ExprCompiler<'_> {
    fn compile(&mut self, expr: &Expr) -> CompiledExpr {
        match expr {
            Expr::Literal(literal) => {
                let value = value_from_literal(literal);
                Box::new(move |_| value.clone())
            }
            Expr::Identifier(name) => self.compile_identifier(name),
            Expr::Access { value, member } => {
                let value = self.compile(value);
                let member = member.clone();
                Box::new(move |frame| match value(frame) {
                    Value::Error(e) => Value::Error(e),
                    Value::Object(object) => match object.get(&member) {
                        Some(found) => found.clone(),
                        None => Value::Error(ErrorValue::access_failed(&member)),
                    },
                    other => Value::Error(ErrorValue::access_unsupported(other.type_name())),
                })
            }
            Expr::Invoke { callee, args } => {
                let callee = self.compile(callee);
                let args: Vec<CompiledExpr> = args.iter().map(|a| self.compile(a)).collect();
                Box::new(move |frame| {
                    let function = match callee(frame) {
                        Value::Error(e) => return Value::Error(e),
                        Value::Function(f) => f,
                        other => {
                            return Value::Error(ErrorValue::invoke_unsupported(other.type_name()));
                        }
                    };
                    let mut values = Vec::with_capacity(args.len());
                    for arg in &args {
                        match arg(frame) {
                            Value::Error(e) => return Value::Error(e),
                            value => values.push(value),
                        }
                    }
                    function.call(values)
                })
            }
            Expr::Binary { op, left, right } => {
                let op = *op;
                let left = self.compile(left);
                let right = self.compile(right);
                Box::new(move |frame| ops::binary(op, left(frame), right(frame)))
            }
            // await is scheduling syntax; the driver settles the pending
            Expr::Unary {
                op: UnaryOp::Await,
                operand,
            } => self.compile(operand),
            Expr::Unary { op, operand } => {
                let op = *op;
                let operand = self.compile(operand);
                Box::new(move |frame| ops::unary(op, operand(frame)))
            }
            Expr::Block(exprs) => {
                let exprs: Vec<CompiledExpr> = exprs.iter().map(|e| self.compile(e)).collect();
                Box::new(move |frame| {
                    let mut last = Value::Error(ErrorValue::internal("empty block"));
                    for expr in &exprs {
                        last = expr(frame);
                    }
                    last
                })
            }
            Expr::Macro { name, args } => self.compile_macro(*name, args),
        }
    }

    fn compile_identifier(&mut self, name: &str) -> CompiledExpr {
        let folded = fold(name);
        if let Some(index) = self.locals.iter().rposition(|local| *local == folded) {
            return Box::new(move |frame| frame.local(index));
        }

        match self.registry.try_resolve(self.module, name) {
            Some(resolution) => {
                let slot = resolution.slot();
                Box::new(move |frame| frame.read_slot(slot))
            }
            None => {
                let error = Value::Error(ErrorValue::unresolved(name));
                Box::new(move |_| error.clone())
            }
        }
    }

    fn compile_macro(&mut self, name: MacroName, args: &[MacroArg]) -> CompiledExpr {
        match name {
            MacroName::If => {
                let [
                    MacroArg::Positional(cond),
                    MacroArg::Positional(then_branch),
                    MacroArg::Positional(else_branch),
                ] = args
                else {
                    return malformed(name);
                };
                let cond = self.compile(cond);
                let then_branch = self.compile(then_branch);
                let else_branch = self.compile(else_branch);
                Box::new(move |frame| match cond(frame).coerce_bool() {
                    Err(e) => Value::Error(e),
                    Ok(true) => then_branch(frame),
                    Ok(false) => else_branch(frame),
                })
            }
            MacroName::List => {
                let items: Vec<CompiledExpr> =
                    args.iter().map(|a| self.compile(a.value())).collect();
                Box::new(move |frame| {
                    let mut values = Vec::with_capacity(items.len());
                    for item in &items {
                        match item(frame) {
                            Value::Error(e) => return Value::Error(e),
                            value => values.push(value),
                        }
                    }
                    Value::List(values)
                })
            }
            MacroName::Object => {
                let mut fields = Vec::with_capacity(args.len());
                for arg in args {
                    let MacroArg::Named { name, value } = arg else {
                        return malformed(MacroName::Object);
                    };
                    fields.push((name.clone(), self.compile(value)));
                }
                Box::new(move |frame| {
                    let mut object = ObjectValue::new();
                    for (key, field) in &fields {
                        match field(frame) {
                            Value::Error(e) => return Value::Error(e),
                            value => {
                                if !object.try_insert(key.clone(), value) {
                                    return Value::Error(ErrorValue::duplicate_key(key));
                                }
                            }
                        }
                    }
                    Value::Object(object)
                })
            }
            MacroName::Where => self.compile_where(args),
        }
    }

    /// `where(binding = init, cond1, branch1, ..., default)`: the optional
    /// leading named argument is evaluated once and visible to everything
    /// after it; conditions are tried in order and the first truthy one
    /// selects its branch, else the default.
    fn compile_where(&mut self, args: &[MacroArg]) -> CompiledExpr {
        let (binding, tail) = match args.first() {
            Some(MacroArg::Named { name, value }) => {
                let init = self.compile(value);
                self.locals.push(fold(name));
                (Some(init), &args[1..])
            }
            _ => (None, args),
        };

        let compiled: Vec<CompiledExpr> = tail.iter().map(|arg| self.compile(arg.value())).collect();

        if binding.is_some() {
            self.locals.pop();
        }

        if compiled.is_empty() || compiled.len() % 2 == 0 {
            return malformed(MacroName::Where);
        }

        let mut compiled = compiled;
        let default = compiled
            .pop()
            .unwrap_or_else(|| unreachable!("checked non-empty"));
        let mut pairs = Vec::with_capacity(compiled.len() / 2);
        let mut iter = compiled.into_iter();
        while let (Some(cond), Some(branch)) = (iter.next(), iter.next()) {
            pairs.push((cond, branch));
        }

        Box::new(move |frame| {
            let bound;
            let frame = match &binding {
                Some(init) => match init(frame) {
                    Value::Error(e) => return Value::Error(e),
                    value => {
                        bound = frame.with_local(value);
                        &bound
                    }
                },
                None => frame,
            };

            for (cond, branch) in &pairs {
                match cond(frame).coerce_bool() {
                    Err(e) => return Value::Error(e),
                    Ok(true) => return branch(frame),
                    Ok(false) => {}
                }
            }
            default(frame)
        })
    }
}

/// Macro shapes are enforced by the parser; a host-assembled AST that
/// violates them compiles to an Internal error constant.
fn malformed(name: MacroName) -> CompiledExpr {
    let error = Value::Error(ErrorValue::internal(format!(
        "malformed {}() invocation",
        name.keyword()
    )));
    Box::new(move |_| error.clone())
}

/// Count awaits that are not on the body's tail chain and warn once per
/// formula; they evaluate as identity.
fn warn_on_non_tail_await(formula: &FormulaDecl, label: &str) {
    struct AwaitCounter {
        total: usize,
    }
    impl ExprVisitor for AwaitCounter {
        fn on_exit(&mut self, expr: &Expr) {
            if matches!(
                expr,
                Expr::Unary {
                    op: UnaryOp::Await,
                    ..
                }
            ) {
                self.total += 1;
            }
        }
    }

    let mut counter = AwaitCounter { total: 0 };
    walk_expr(&formula.body, &mut counter);

    if counter.total > sanctioned_awaits(&formula.body) {
        warn!(
            formula = %label,
            "await outside tail position evaluates as identity"
        );
    }
}

/// Awaits reachable by following the tail chain: the last expression of
/// each block, then any directly nested awaits.
fn sanctioned_awaits(expr: &Expr) -> usize {
    match expr {
        Expr::Block(exprs) => exprs.last().map_or(0, sanctioned_awaits),
        Expr::Unary {
            op: UnaryOp::Await,
            operand,
        } => 1 + sanctioned_awaits(operand),
        _ => 0,
    }
}
