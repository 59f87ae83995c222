//! Program assembly.
//!
//! A [`Program`] is the compiler's input: named argument slots, constants
//! already bound to runtime values, and parsed module ASTs. Hosts either
//! parse everything from source or mix parsed modules with host-supplied
//! constants (e.g. `Pending` values for asynchronous inputs).

use tally_dsl::ast;

use crate::error::CompileError;
use crate::value::Value;

/// An externally supplied input slot
#[derive(Debug, Clone)]
pub struct ArgumentDef {
    pub name: String,
}

/// A statically bound value
#[derive(Debug, Clone)]
pub struct ConstantDef {
    pub name: String,
    pub value: Value,
}

/// A named collection of arguments, constants and modules
#[derive(Debug, Clone)]
pub struct Program {
    pub(crate) name: String,
    pub(crate) arguments: Vec<ArgumentDef>,
    pub(crate) constants: Vec<ConstantDef>,
    pub(crate) modules: Vec<ast::ModuleDecl>,
}

impl Program {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arguments: Vec::new(),
            constants: Vec::new(),
            modules: Vec::new(),
        }
    }

    /// Parse a complete program from source text.
    pub fn from_source(name: impl Into<String>, source: &str) -> Result<Self, CompileError> {
        let mut program = Self::new(name);
        program.merge_source(source)?;
        Ok(program)
    }

    /// Parse source text and append its declarations to this program.
    pub fn merge_source(&mut self, source: &str) -> Result<&mut Self, CompileError> {
        let parsed = tally_dsl::parse_program(source)?;
        for argument in parsed.arguments {
            self.add_argument(argument.name.node);
        }
        for constant in parsed.constants {
            let value = value_from_literal(&constant.value);
            self.add_constant(constant.name.node, value);
        }
        for module in parsed.modules {
            self.add_module(module);
        }
        Ok(self)
    }

    pub fn add_argument(&mut self, name: impl Into<String>) -> &mut Self {
        self.arguments.push(ArgumentDef { name: name.into() });
        self
    }

    pub fn add_constant(&mut self, name: impl Into<String>, value: Value) -> &mut Self {
        self.constants.push(ConstantDef {
            name: name.into(),
            value,
        });
        self
    }

    pub fn add_module(&mut self, module: ast::ModuleDecl) -> &mut Self {
        self.modules.push(module);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arguments(&self) -> &[ArgumentDef] {
        &self.arguments
    }

    pub fn constants(&self) -> &[ConstantDef] {
        &self.constants
    }

    pub fn modules(&self) -> &[ast::ModuleDecl] {
        &self.modules
    }
}

/// Bind a parsed literal to its runtime value.
pub fn value_from_literal(literal: &ast::Literal) -> Value {
    match literal {
        ast::Literal::Number(n) => Value::Number(*n),
        ast::Literal::Text(s) => Value::String(s.clone()),
        ast::Literal::Bool(b) => Value::Bool(*b),
    }
}
