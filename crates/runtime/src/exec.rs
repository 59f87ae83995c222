//! Runtime driver.
//!
//! Executes a compiled plan group by group: async step bodies are launched
//! first, sync steps run inline, then all pending completions are joined
//! and applied sequentially in step order. The skip list is the only
//! mutable shared state of a call: entries start true and flip to false
//! exactly once, when a step's dependencies have all flipped and its body
//! produced a non-Error value. A failing step therefore quarantines its
//! transitive dependents and nothing else.

use std::time::Duration;

use futures::future::join_all;
use indexmap::IndexMap;
use serde::Serialize;
use tracing::{debug, instrument, trace};

use crate::emit::CompiledStep;
use crate::plan::{ExecutionPlan, StepKind};
use crate::symbols::SlotId;
use crate::value::{ErrorValue, ObjectValue, Pending, Value, fold};

/// Per-call storage, one slot per declaration
pub(crate) struct SlotStore {
    values: Vec<Option<Value>>,
}

impl SlotStore {
    fn new(count: usize) -> Self {
        Self {
            values: vec![None; count],
        }
    }

    fn write(&mut self, slot: SlotId, value: Value) {
        self.values[slot.index()] = Some(value);
    }

    /// Planned execution never reads a slot before it is seeded or its
    /// step completed; an unset read is an internal fault, not a panic.
    pub(crate) fn read(&self, slot: SlotId) -> Value {
        match &self.values[slot.index()] {
            Some(value) => value.clone(),
            None => Value::Error(ErrorValue::internal("slot read before initialization")),
        }
    }

    fn export(&mut self, slot: SlotId, name: &str, value: Value) {
        if let Some(Value::Object(object)) = &mut self.values[slot.index()] {
            object.insert(name, value);
        }
    }
}

/// Evaluation context handed to compiled expressions: read access to the
/// slots plus the active `where()` binding stack.
pub struct CallFrame<'a> {
    slots: &'a SlotStore,
    locals: Vec<Value>,
}

impl<'a> CallFrame<'a> {
    pub(crate) fn new(slots: &'a SlotStore) -> Self {
        Self {
            slots,
            locals: Vec::new(),
        }
    }

    pub(crate) fn read_slot(&self, slot: SlotId) -> Value {
        self.slots.read(slot)
    }

    pub(crate) fn local(&self, index: usize) -> Value {
        match self.locals.get(index) {
            Some(value) => value.clone(),
            None => Value::Error(ErrorValue::internal("binding read out of scope")),
        }
    }

    pub(crate) fn with_local(&self, value: Value) -> CallFrame<'a> {
        let mut locals = self.locals.clone();
        locals.push(value);
        CallFrame {
            slots: self.slots,
            locals,
        }
    }
}

/// The structured outcome of one call: per-module exported objects and
/// per-formula error records. An exported formula appears in `modules` on
/// success and in `errors` on failure; skipped steps appear in neither.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CallResult {
    pub modules: IndexMap<String, ObjectValue>,
    pub errors: IndexMap<String, ErrorValue>,
}

impl CallResult {
    /// Case-insensitive lookup of an exported value by `module.formula`.
    pub fn get(&self, path: &str) -> Option<&Value> {
        let (module, formula) = path.split_once('.')?;
        self.modules
            .iter()
            .find(|(name, _)| fold(name) == fold(module))
            .and_then(|(_, exports)| exports.get(formula))
    }

    /// Case-insensitive lookup of an error record by `module.formula`.
    pub fn error(&self, path: &str) -> Option<&ErrorValue> {
        self.errors
            .iter()
            .find(|(name, _)| fold(name) == fold(path))
            .map(|(_, error)| error)
    }

    /// True when every evaluated formula succeeded.
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }

    fn timed_out(program: &str) -> Self {
        let mut errors = IndexMap::new();
        errors.insert(program.to_string(), ErrorValue::timeout());
        Self {
            modules: IndexMap::new(),
            errors,
        }
    }
}

/// A compiled program, callable any number of times. Calls are
/// independent: every call seeds fresh slots and a fresh skip list.
pub struct Executable {
    name: String,
    plan: ExecutionPlan,
    steps: Vec<CompiledStep>,
    slot_count: usize,
    argument_slots: Vec<SlotId>,
    constant_seeds: Vec<(SlotId, Value)>,
    /// Module name and exports-object slot, in declaration order
    module_slots: Vec<(String, SlotId)>,
}

impl std::fmt::Debug for Executable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executable")
            .field("name", &self.name)
            .field("slot_count", &self.slot_count)
            .field("argument_slots", &self.argument_slots)
            .field("module_slots", &self.module_slots)
            .finish_non_exhaustive()
    }
}

impl Executable {
    pub(crate) fn new(
        name: String,
        plan: ExecutionPlan,
        steps: Vec<CompiledStep>,
        slot_count: usize,
        argument_slots: Vec<SlotId>,
        constant_seeds: Vec<(SlotId, Value)>,
        module_slots: Vec<(String, SlotId)>,
    ) -> Self {
        Self {
            name,
            plan,
            steps,
            slot_count,
            argument_slots,
            constant_seeds,
            module_slots,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The execution plan, for hosts that want to inspect the grouping.
    pub fn plan(&self) -> &ExecutionPlan {
        &self.plan
    }

    pub fn step_count(&self) -> usize {
        self.plan.step_count()
    }

    /// Evaluate every formula against the given argument bindings.
    ///
    /// Arguments bind by position in declaration order; missing bindings
    /// seed an Internal error, surplus bindings are ignored.
    #[instrument(skip_all, fields(program = %self.name))]
    pub async fn call(&self, arguments: Vec<Value>) -> CallResult {
        let mut slots = SlotStore::new(self.slot_count);
        let mut skip = vec![true; self.plan.step_count()];
        let mut errors: IndexMap<String, ErrorValue> = IndexMap::new();

        if arguments.len() > self.argument_slots.len() {
            debug!(
                given = arguments.len(),
                declared = self.argument_slots.len(),
                "surplus argument bindings ignored"
            );
        }

        let mut bindings = arguments.into_iter();
        for slot in &self.argument_slots {
            let value = bindings
                .next()
                .unwrap_or_else(|| Value::Error(ErrorValue::internal("missing argument binding")));
            slots.write(*slot, value);
        }
        for (slot, value) in &self.constant_seeds {
            slots.write(*slot, value.clone());
        }
        for (_, slot) in &self.module_slots {
            slots.write(*slot, Value::Object(ObjectValue::new()));
        }

        for (group_idx, group) in self.plan.groups.iter().enumerate() {
            trace!(group = group_idx, steps = group.steps.len(), "group start");
            let mut pending: Vec<(usize, Pending)> = Vec::new();

            // Launch async bodies first so they progress while sync steps run.
            for step in group.steps.iter().filter(|s| s.kind == StepKind::Async) {
                if self.dependency_skipped(step.id, &step.dependencies, &skip) {
                    continue;
                }
                let value = {
                    let frame = CallFrame::new(&slots);
                    (self.steps[step.id].body)(&frame)
                };
                match value {
                    Value::Pending(p) => pending.push((step.id, p)),
                    value => self.apply(step.id, value, &mut slots, &mut skip, &mut errors),
                }
            }

            for step in group.steps.iter().filter(|s| s.kind == StepKind::Sync) {
                if self.dependency_skipped(step.id, &step.dependencies, &skip) {
                    continue;
                }
                let value = {
                    let frame = CallFrame::new(&slots);
                    (self.steps[step.id].body)(&frame)
                };
                match value {
                    // A nominally-sync step can still surface a deferred
                    // value (e.g. a Pending argument); settle it at the
                    // barrier with the rest.
                    Value::Pending(p) => pending.push((step.id, p)),
                    value => self.apply(step.id, value, &mut slots, &mut skip, &mut errors),
                }
            }

            // Group barrier: join every pending, then apply post-actions
            // sequentially in step order for determinism.
            if !pending.is_empty() {
                let mut settled = join_all(
                    pending
                        .into_iter()
                        .map(|(id, p)| async move { (id, p.settle().await) }),
                )
                .await;
                settled.sort_by_key(|(id, _)| *id);
                for (id, value) in settled {
                    self.apply(id, value, &mut slots, &mut skip, &mut errors);
                }
            }
        }

        let modules = self
            .module_slots
            .iter()
            .map(|(name, slot)| {
                let exports = match slots.read(*slot) {
                    Value::Object(object) => object,
                    _ => ObjectValue::new(),
                };
                (name.clone(), exports)
            })
            .collect();

        CallResult { modules, errors }
    }

    /// Like [`call`](Self::call), aborting the whole call when the limit
    /// elapses. In-flight pending values are detached, best-effort.
    pub async fn call_with_timeout(&self, arguments: Vec<Value>, limit: Duration) -> CallResult {
        match tokio::time::timeout(limit, self.call(arguments)).await {
            Ok(result) => result,
            Err(_) => {
                debug!(program = %self.name, ?limit, "call timed out");
                CallResult::timed_out(&self.name)
            }
        }
    }

    /// Synchronous convenience for non-async hosts; spins a current-thread
    /// runtime for the duration of the call.
    pub fn call_blocking(&self, arguments: Vec<Value>) -> std::io::Result<CallResult> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()?;
        Ok(runtime.block_on(self.call(arguments)))
    }

    fn dependency_skipped(&self, id: usize, dependencies: &[usize], skip: &[bool]) -> bool {
        let skipped = dependencies.iter().any(|dep| skip[*dep]);
        if skipped {
            trace!(step = %self.steps[id].label, "skipped: dependency unavailable");
        }
        skipped
    }

    /// Step post-action: record an Error and leave the skip entry set, or
    /// write the slot, flip the entry, and export if flagged.
    fn apply(
        &self,
        id: usize,
        value: Value,
        slots: &mut SlotStore,
        skip: &mut [bool],
        errors: &mut IndexMap<String, ErrorValue>,
    ) {
        let step = &self.steps[id];
        match value {
            Value::Error(error) => {
                debug!(step = %step.label, %error, "step failed");
                if step.export.is_some() {
                    errors.insert(step.label.clone(), error.clone());
                }
                slots.write(step.slot, Value::Error(error));
            }
            value => {
                trace!(step = %step.label, "step resolved");
                slots.write(step.slot, value.clone());
                skip[id] = false;
                if let Some(export) = &step.export {
                    slots.export(export.module_slot, &export.name, value);
                }
            }
        }
    }
}
