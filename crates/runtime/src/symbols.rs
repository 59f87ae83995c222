//! Symbol registry.
//!
//! Maps every declaration to a storage slot. The program owns three
//! top-level scopes (arguments, constants, modules); each module owns a
//! local scope over its imports and formulas plus an exports-object slot.
//! All name comparison is case-insensitive.

use indexmap::IndexMap;

use crate::error::CompileError;
use crate::program::Program;
use crate::value::fold;

/// Index of a storage slot in `[0, slot_count)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId(pub(crate) u32);

impl SlotId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A unique-name lookup over one declaration bucket
#[derive(Debug)]
pub(crate) struct Scope {
    label: String,
    entries: IndexMap<String, ScopeEntry>,
}

/// One entry in a scope: the slot and the index of the declaration in its
/// program bucket.
#[derive(Debug)]
pub(crate) struct ScopeEntry {
    pub slot: SlotId,
    pub index: usize,
}

impl Scope {
    fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            entries: IndexMap::new(),
        }
    }

    fn insert(&mut self, name: &str, slot: SlotId, index: usize) -> Result<(), CompileError> {
        let folded = fold(name);
        if self.entries.contains_key(&folded) {
            return Err(CompileError::DuplicateName {
                name: name.to_string(),
                scope: self.label.clone(),
            });
        }
        self.entries.insert(folded, ScopeEntry { slot, index });
        Ok(())
    }

    pub(crate) fn get(&self, name: &str) -> Option<&ScopeEntry> {
        self.entries.get(&fold(name))
    }
}

/// What kind of declaration a module-local name binds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LocalKind {
    /// Index into the module's import list
    Import(usize),
    /// Index into the module's formula list
    Formula(usize),
}

#[derive(Debug)]
pub(crate) struct LocalEntry {
    pub slot: SlotId,
    pub kind: LocalKind,
}

/// A module's lexical scope: its imports and formulas, plus the slot
/// holding the module's exported object.
#[derive(Debug)]
pub struct ModuleScope {
    pub(crate) name: String,
    pub(crate) index: usize,
    pub(crate) exports_slot: SlotId,
    locals: IndexMap<String, LocalEntry>,
}

impl ModuleScope {
    pub(crate) fn local(&self, name: &str) -> Option<&LocalEntry> {
        self.locals.get(&fold(name))
    }
}

/// How an identifier resolved
#[derive(Debug, Clone, Copy)]
pub enum Resolution {
    Argument { slot: SlotId, index: usize },
    Constant { slot: SlotId, index: usize },
    /// A module alias; the slot holds the module's exports object
    Module { slot: SlotId, index: usize },
    Import { slot: SlotId, module: usize, import: usize },
    Formula { slot: SlotId, module: usize, formula: usize },
}

impl Resolution {
    pub fn slot(&self) -> SlotId {
        match self {
            Resolution::Argument { slot, .. }
            | Resolution::Constant { slot, .. }
            | Resolution::Module { slot, .. }
            | Resolution::Import { slot, .. }
            | Resolution::Formula { slot, .. } => *slot,
        }
    }
}

/// Name-to-slot resolution for a whole program
#[derive(Debug)]
pub struct SymbolRegistry {
    slot_count: u32,
    pub(crate) arguments: Scope,
    pub(crate) constants: Scope,
    pub(crate) modules: Scope,
    module_scopes: IndexMap<String, ModuleScope>,
}

impl SymbolRegistry {
    /// Allocate slots for every declaration, rejecting duplicate names
    /// within each scope.
    pub fn build(program: &Program) -> Result<Self, CompileError> {
        let mut registry = Self {
            slot_count: 0,
            arguments: Scope::new("arguments"),
            constants: Scope::new("constants"),
            modules: Scope::new("modules"),
            module_scopes: IndexMap::new(),
        };

        for (index, argument) in program.arguments.iter().enumerate() {
            let slot = registry.alloc();
            registry.arguments.insert(&argument.name, slot, index)?;
        }
        for (index, constant) in program.constants.iter().enumerate() {
            let slot = registry.alloc();
            registry.constants.insert(&constant.name, slot, index)?;
        }

        for (index, module) in program.modules.iter().enumerate() {
            let module_name = &module.name.node;
            let exports_slot = registry.alloc();
            registry.modules.insert(module_name, exports_slot, index)?;

            let mut locals: IndexMap<String, LocalEntry> = IndexMap::new();
            let scope_label = format!("module {module_name}");
            let insert_local =
                |locals: &mut IndexMap<String, LocalEntry>, name: &str, entry: LocalEntry| {
                    if locals.insert(fold(name), entry).is_some() {
                        return Err(CompileError::DuplicateName {
                            name: name.to_string(),
                            scope: scope_label.clone(),
                        });
                    }
                    Ok(())
                };

            for (import_idx, import) in module.imports.iter().enumerate() {
                let slot = registry.alloc();
                insert_local(
                    &mut locals,
                    &import.local_name.node,
                    LocalEntry {
                        slot,
                        kind: LocalKind::Import(import_idx),
                    },
                )?;
            }
            for (formula_idx, formula) in module.formulas.iter().enumerate() {
                let slot = registry.alloc();
                insert_local(
                    &mut locals,
                    &formula.name.node,
                    LocalEntry {
                        slot,
                        kind: LocalKind::Formula(formula_idx),
                    },
                )?;
            }

            registry.module_scopes.insert(
                fold(module_name),
                ModuleScope {
                    name: module_name.clone(),
                    index,
                    exports_slot,
                    locals,
                },
            );
        }

        Ok(registry)
    }

    fn alloc(&mut self) -> SlotId {
        let slot = SlotId(self.slot_count);
        self.slot_count += 1;
        slot
    }

    pub fn slot_count(&self) -> usize {
        self.slot_count as usize
    }

    /// Resolve a name from inside a module: the module's locals shadow the
    /// program-level scopes.
    pub fn try_resolve(&self, module: &str, name: &str) -> Option<Resolution> {
        if let Some(scope) = self.module_scope(module)
            && let Some(local) = scope.local(name)
        {
            return Some(match local.kind {
                LocalKind::Import(import) => Resolution::Import {
                    slot: local.slot,
                    module: scope.index,
                    import,
                },
                LocalKind::Formula(formula) => Resolution::Formula {
                    slot: local.slot,
                    module: scope.index,
                    formula,
                },
            });
        }

        if let Some(entry) = self.arguments.get(name) {
            return Some(Resolution::Argument {
                slot: entry.slot,
                index: entry.index,
            });
        }
        if let Some(entry) = self.constants.get(name) {
            return Some(Resolution::Constant {
                slot: entry.slot,
                index: entry.index,
            });
        }
        if let Some(entry) = self.modules.get(name) {
            return Some(Resolution::Module {
                slot: entry.slot,
                index: entry.index,
            });
        }

        None
    }

    /// Resolve a name or fail with `UnknownName`.
    pub fn resolve(&self, module: &str, name: &str) -> Result<Resolution, CompileError> {
        self.try_resolve(module, name)
            .ok_or_else(|| CompileError::UnknownName {
                name: name.to_string(),
            })
    }

    pub(crate) fn module_scope(&self, name: &str) -> Option<&ModuleScope> {
        self.module_scopes.get(&fold(name))
    }

    pub(crate) fn module_scopes(&self) -> impl Iterator<Item = &ModuleScope> {
        self.module_scopes.values()
    }
}
