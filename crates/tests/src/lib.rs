//! Integration test harness for tally.
//!
//! Wraps the full pipeline (parse, resolve, plan, emit, call) behind a few
//! helpers so end-to-end scenarios stay readable.

use std::str::FromStr;

use rust_decimal::Decimal;
use tally_runtime::{CallResult, CompileError, Executable, Program, Value, compile};

/// Harness for running tally programs from source.
pub struct TestHarness {
    executable: Executable,
}

impl TestHarness {
    /// Compile a program from source.
    ///
    /// # Panics
    ///
    /// Panics if parsing or compilation fails.
    pub fn from_source(source: &str) -> Self {
        let program = Program::from_source("test", source)
            .unwrap_or_else(|e| panic!("parse failed: {e}"));
        Self::from_program(&program)
    }

    /// Compile a host-assembled program.
    ///
    /// # Panics
    ///
    /// Panics if compilation fails.
    pub fn from_program(program: &Program) -> Self {
        let executable = compile(program).unwrap_or_else(|e| panic!("compile failed: {e}"));
        Self { executable }
    }

    /// Compile from source without panicking, for rejection tests.
    pub fn try_compile(source: &str) -> Result<Executable, CompileError> {
        let program = Program::from_source("test", source)?;
        compile(&program)
    }

    /// Call with no argument bindings.
    pub async fn call(&self) -> CallResult {
        self.executable.call(Vec::new()).await
    }

    /// Call with argument bindings in declaration order.
    pub async fn call_with(&self, arguments: Vec<Value>) -> CallResult {
        self.executable.call(arguments).await
    }

    pub fn executable(&self) -> &Executable {
        &self.executable
    }
}

/// Decimal value literal for assertions.
pub fn number(text: &str) -> Value {
    Value::Number(Decimal::from_str(text).unwrap_or_else(|e| panic!("bad decimal {text}: {e}")))
}

/// Install a log subscriber honoring `RUST_LOG`, for debugging scheduling
/// in a failing test. Safe to call more than once.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
