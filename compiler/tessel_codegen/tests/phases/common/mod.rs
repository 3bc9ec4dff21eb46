//! Shared helpers for phase tests.
//!
//! Every helper compiles a single entry point named `f`.

#![allow(dead_code)]

use pretty_assertions::assert_eq;
use tessel_codegen::{CodegenError, CodegenResult, Converter, ExprContext, TypeRepr, TypedExpr};
use tessel_exec::{ExecError, ExecResult, Machine, Value};
use tessel_native::{ErrorCategory, NativeModule};

/// Compile `f(params) -> ret` into a verified module.
pub fn compile<G>(params: &[TypeRepr], ret: Option<&TypeRepr>, body: G) -> NativeModule
where
    G: FnOnce(&mut ExprContext<'_>, &[TypedExpr]) -> CodegenResult<Option<TypedExpr>>,
{
    let mut converter = Converter::default();
    converter
        .define_function("f", params, ret, body)
        .expect("code generation failed");
    let module = converter.into_module();
    assert_eq!(module.verify(), Ok(()));
    module
}

/// The static error `body` fails with.
pub fn compile_error<G>(params: &[TypeRepr], ret: Option<&TypeRepr>, body: G) -> CodegenError
where
    G: FnOnce(&mut ExprContext<'_>, &[TypedExpr]) -> CodegenResult<Option<TypedExpr>>,
{
    let mut converter = Converter::default();
    let err = converter
        .define_function("f", params, ret, body)
        .expect_err("code generation succeeded");
    assert!(converter.registry().is_empty());
    err
}

/// Run `f`. A successful call must leave no heap blocks and no dynamic
/// objects behind.
pub fn run(module: &NativeModule, args: &[Value]) -> ExecResult<Value> {
    let mut machine = Machine::new(module);
    let result = machine.call_by_name("f", args);
    if result.is_ok() {
        assert_leak_free(&machine);
    }
    result
}

/// Run `f`, which returns a `str`, and take the text.
pub fn run_str(module: &NativeModule, args: &[Value]) -> ExecResult<String> {
    let mut machine = Machine::new(module);
    let addr = machine
        .call_by_name("f", args)?
        .as_ptr()
        .expect("str results are pointers");
    let text = machine.read_str(addr)?;
    machine.release_str(addr)?;
    assert_leak_free(&machine);
    Ok(text)
}

pub fn assert_leak_free(machine: &Machine<'_>) {
    assert_eq!(machine.heap().live(), 0, "leaked heap blocks");
    assert_eq!(machine.live_objects(), 0, "leaked dynamic objects");
}

/// Category and message of a runtime error.
pub fn raised(result: ExecResult<Value>) -> (ErrorCategory, String) {
    match result {
        Err(ExecError::Raised { category, message }) => (category, message),
        other => panic!("expected a raised error, got {other:?}"),
    }
}

/// Category and message of an unsupported-operation error.
pub fn unsupported(err: CodegenError) -> (ErrorCategory, String) {
    match err {
        CodegenError::Unsupported { category, message } => (category, message),
        other => panic!("expected an unsupported operation, got {other:?}"),
    }
}
