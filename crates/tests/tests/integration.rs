//! End-to-end scenarios for the full pipeline:
//! parse -> resolve -> plan -> emit -> call -> verify.

use std::time::Duration;

use tally_tests::{TestHarness, number};

use tally_runtime::{
    CompileError, FunctionValue, Pending, Program, RuntimeErrorKind, Value, compile,
};

#[tokio::test]
async fn constant_export() {
    let harness = TestHarness::from_source("module m { export a = 1 }");
    let result = harness.call().await;

    assert!(result.is_complete());
    assert_eq!(result.get("m.a"), Some(&number("1")));
    assert_eq!(result.modules["m"].len(), 1);
}

#[tokio::test]
async fn chained_formulas() {
    let harness = TestHarness::from_source(
        r#"
        module m {
            export a = 2
            export b = a + 3
            export c = b * a
        }
        "#,
    );

    assert_eq!(harness.executable().plan().groups.len(), 3);

    let result = harness.call().await;
    assert_eq!(result.get("m.a"), Some(&number("2")));
    assert_eq!(result.get("m.b"), Some(&number("5")));
    assert_eq!(result.get("m.c"), Some(&number("10")));
}

#[tokio::test]
async fn error_isolation() {
    let harness = TestHarness::from_source(
        r#"
        module m {
            export a = 1 / 0
            export b = a + 1
            export c = 5
        }
        "#,
    );
    let result = harness.call().await;

    // a failed, b was quarantined, c is untouched
    assert_eq!(result.error("m.a").map(|e| e.kind), Some(RuntimeErrorKind::MathDomain));
    assert_eq!(result.get("m.a"), None);
    assert_eq!(result.get("m.b"), None);
    assert!(result.error("m.b").is_none());
    assert_eq!(result.get("m.c"), Some(&number("5")));
}

#[tokio::test]
async fn cross_module_import() {
    let harness = TestHarness::from_source(
        r#"
        module m1 {
            export x = 7
        }
        module m2 {
            import x from m1
            export y = x + 1
        }
        "#,
    );
    let result = harness.call().await;

    assert_eq!(result.get("m1.x"), Some(&number("7")));
    assert_eq!(result.get("m2.y"), Some(&number("8")));
}

#[tokio::test]
async fn async_barrier() {
    let mut program = Program::new("async");
    program.add_constant("k", Value::Pending(Pending::ready(number("42"))));
    program
        .merge_source(
            r#"
            module m {
                export a = k
                export b = a + 1
            }
            "#,
        )
        .unwrap();

    let harness = TestHarness::from_program(&program);
    assert_eq!(harness.executable().plan().groups.len(), 2);

    let result = harness.call().await;
    assert_eq!(result.get("m.a"), Some(&number("42")));
    assert_eq!(result.get("m.b"), Some(&number("43")));
}

#[tokio::test]
async fn cycle_rejection() {
    let err = TestHarness::try_compile(
        r#"
        module m {
            export a = b
            export b = a
        }
        "#,
    )
    .unwrap_err();

    match err {
        CompileError::Cycle { formulas } => assert_eq!(formulas, vec!["m.a", "m.b"]),
        other => panic!("expected cycle, got {other}"),
    }
}

#[tokio::test]
async fn argument_bindings() {
    let harness = TestHarness::from_source(
        r#"
        argument rate
        argument base
        module m {
            export total = base * (1 + rate)
        }
        "#,
    );

    let result = harness
        .call_with(vec![number("0.2"), number("100")])
        .await;
    assert_eq!(result.get("m.total"), Some(&number("120.0")));
}

#[tokio::test]
async fn missing_argument_quarantines_consumers() {
    let harness = TestHarness::from_source(
        r#"
        argument rate
        module m {
            export a = rate + 1
            export b = 2
        }
        "#,
    );

    let result = harness.call().await;
    assert_eq!(
        result.error("m.a").map(|e| e.kind),
        Some(RuntimeErrorKind::Internal)
    );
    assert_eq!(result.get("m.b"), Some(&number("2")));
}

#[tokio::test]
async fn skip_propagates_transitively() {
    let harness = TestHarness::from_source(
        r#"
        module m {
            export a = 1 / 0
            export b = a + 1
            export c = b + 1
            export d = 5
        }
        "#,
    );
    let result = harness.call().await;

    assert_eq!(result.errors.len(), 1);
    assert!(result.error("m.a").is_some());
    assert_eq!(result.get("m.b"), None);
    assert_eq!(result.get("m.c"), None);
    assert_eq!(result.get("m.d"), Some(&number("5")));
}

#[tokio::test]
async fn unresolved_identifier_is_a_runtime_error() {
    let harness = TestHarness::from_source("module m { export a = ghost + 1 }");
    let result = harness.call().await;

    assert_eq!(
        result.error("m.a").map(|e| e.kind),
        Some(RuntimeErrorKind::UnresolvedIdentifier)
    );
}

#[tokio::test]
async fn missing_import_target_quarantines_consumers() {
    let harness = TestHarness::from_source(
        r#"
        module m {
            import ghost from nowhere
            export a = ghost + 1
            export b = 3
        }
        "#,
    );
    let result = harness.call().await;

    // the import step fails with UnresolvedIdentifier; a skips silently
    assert_eq!(result.get("m.a"), None);
    assert!(result.error("m.a").is_none());
    assert_eq!(result.get("m.b"), Some(&number("3")));
}

#[tokio::test]
async fn module_import_exposes_exports_object() {
    let harness = TestHarness::from_source(
        r#"
        module prices {
            export net = 100
            export tax = 20
            internal = 1
        }
        module report {
            import module prices
            export gross = prices.net + prices.tax
        }
        "#,
    );
    let result = harness.call().await;

    assert_eq!(result.get("report.gross"), Some(&number("120")));
    // internal formulas stay out of the exports object
    assert_eq!(result.modules["prices"].len(), 2);
}

#[tokio::test]
async fn macros_evaluate_lazily() {
    let harness = TestHarness::from_source(
        r#"
        module m {
            export safe = if(true, 1, 1 / 0)
            export items = list(1, 2 + 3, "x")
            export bundle = object(net = 10, Tax = 2)
            export pick = where(acc = 2 * 3, acc > 10, "big", acc > 5, "medium", "small")
        }
        "#,
    );
    let result = harness.call().await;

    assert!(result.is_complete());
    assert_eq!(result.get("m.safe"), Some(&number("1")));
    assert_eq!(
        result.get("m.items"),
        Some(&Value::List(vec![
            number("1"),
            number("5"),
            Value::string("x")
        ]))
    );
    assert_eq!(
        result.get("m.bundle").and_then(|v| v.as_object()).map(|o| o.len()),
        Some(2)
    );
    assert_eq!(result.get("m.pick"), Some(&Value::string("medium")));
}

#[tokio::test]
async fn duplicate_object_keys_fail_at_runtime() {
    let harness = TestHarness::from_source(
        r#"
        module m {
            export bad = object(net = 1, NET = 2)
        }
        "#,
    );
    let result = harness.call().await;

    assert_eq!(
        result.error("m.bad").map(|e| e.kind),
        Some(RuntimeErrorKind::DuplicateKey)
    );
}

#[tokio::test]
async fn number_string_equality_uses_stringified_form() {
    let harness = TestHarness::from_source(
        r#"
        module m {
            export eq = 1 = "1"
            export ne = 1 <> "1.0"
        }
        "#,
    );
    let result = harness.call().await;

    assert_eq!(result.get("m.eq"), Some(&Value::Bool(true)));
    assert_eq!(result.get("m.ne"), Some(&Value::Bool(true)));
}

#[tokio::test]
async fn host_function_invocation() {
    let mut program = Program::new("host");
    program.add_constant(
        "double",
        Value::Function(FunctionValue::new(|args| {
            match args.first().map(|v| v.coerce_number()) {
                Some(Ok(n)) => Value::Number(n + n),
                Some(Err(e)) => Value::Error(e),
                None => Value::Error(tally_runtime::ErrorValue::internal("missing argument")),
            }
        })),
    );
    program
        .merge_source("module m { export a = double(21) }")
        .unwrap();

    let harness = TestHarness::from_program(&program);
    let result = harness.call().await;
    assert_eq!(result.get("m.a"), Some(&number("42")));
}

#[tokio::test]
async fn pending_from_host_function_settles_at_barrier() {
    let mut program = Program::new("host-async");
    program.add_constant(
        "fetch",
        Value::Function(FunctionValue::new(|_| {
            Value::Pending(Pending::new(async { number("7") }))
        })),
    );
    program
        .merge_source(
            r#"
            module m {
                export a = fetch()
                export b = a * 3
            }
            "#,
        )
        .unwrap();

    let harness = TestHarness::from_program(&program);
    let result = harness.call().await;

    assert_eq!(result.get("m.a"), Some(&number("7")));
    assert_eq!(result.get("m.b"), Some(&number("21")));
}

#[tokio::test]
async fn async_failure_quarantines_dependents() {
    let mut program = Program::new("async-fail");
    program.add_constant(
        "k",
        Value::Pending(Pending::new(async {
            Value::Error(tally_runtime::ErrorValue::math("upstream failure"))
        })),
    );
    program
        .merge_source(
            r#"
            module m {
                export a = k
                export b = a + 1
                export c = 9
            }
            "#,
        )
        .unwrap();

    let harness = TestHarness::from_program(&program);
    let result = harness.call().await;

    assert_eq!(result.error("m.a").map(|e| e.kind), Some(RuntimeErrorKind::MathDomain));
    assert_eq!(result.get("m.b"), None);
    assert_eq!(result.get("m.c"), Some(&number("9")));
}

#[tokio::test]
async fn call_timeout_returns_timeout_bundle() {
    let mut program = Program::new("stuck");
    program.add_constant(
        "never",
        Value::Pending(Pending::new(futures::future::pending())),
    );
    program
        .merge_source("module m { export a = never }")
        .unwrap();

    let executable = compile(&program).unwrap();
    let result = executable
        .call_with_timeout(Vec::new(), Duration::from_millis(20))
        .await;

    assert!(result.modules.is_empty());
    assert_eq!(
        result.errors.get("stuck").map(|e| e.kind),
        Some(RuntimeErrorKind::Timeout)
    );
}

#[tokio::test]
async fn calls_are_independent_and_deterministic() {
    let harness = TestHarness::from_source(
        r#"
        argument seed
        module m {
            export a = seed * 2
            export b = a & "!"
        }
        "#,
    );

    let first = harness.call_with(vec![number("3")]).await;
    let second = harness.call_with(vec![number("3")]).await;
    assert_eq!(first, second);
    assert_eq!(first.get("m.b"), Some(&Value::string("6!")));

    let third = harness.call_with(vec![number("4")]).await;
    assert_eq!(third.get("m.a"), Some(&number("8")));
}

#[tokio::test]
async fn empty_program_and_empty_module() {
    let empty = TestHarness::from_source("");
    let result = empty.call().await;
    assert!(result.modules.is_empty());
    assert!(result.errors.is_empty());

    let hollow = TestHarness::from_source("module quiet { }");
    let result = hollow.call().await;
    assert_eq!(result.modules["quiet"].len(), 0);
}

#[tokio::test]
async fn duplicate_names_rejected_at_compile_time() {
    let err = TestHarness::try_compile(
        r#"
        module m {
            export a = 1
            export A = 2
        }
        "#,
    )
    .unwrap_err();

    assert!(matches!(err, CompileError::DuplicateName { name, .. } if name == "A"));
}

#[tokio::test]
async fn result_serializes_for_hosts() {
    let harness = TestHarness::from_source(
        r#"
        module m {
            export n = 1.50
            export s = "x"
            export flag = true
        }
        "#,
    );
    let result = harness.call().await;

    let json = serde_json::to_string(&result).unwrap();
    assert!(json.contains("\"n\":\"1.5\""));
    assert!(json.contains("\"flag\":true"));
}
