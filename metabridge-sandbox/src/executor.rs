//! Script evaluation and result extraction.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map as JsonMap, Value as JsonValue};
use starlark::environment::{Globals, GlobalsBuilder, LibraryExtension, Module};
use starlark::eval::Evaluator;
use starlark::syntax::{AstModule, Dialect};
use tokio::runtime::Handle;
use tracing::debug;

use metabridge_proxy::ProxyManager;

use crate::bridge::server_namespaces;
use crate::convert::{json_to_starlark, starlark_to_json};
use crate::stdlib::{math_module, time_module};

/// Names a script cannot claim as its own result bindings.
///
/// These shadow the interpreter's predeclared environment; assignments to
/// them are ignored when collecting a program's implicit result.
const PREDECLARED: &[&str] = &[
    "True", "False", "None", "bool", "dict", "enumerate", "float", "getattr", "hasattr", "int",
    "len", "list", "max", "min", "print", "range", "repr", "reversed", "sorted", "str", "tuple",
    "type", "zip",
];

/// The outcome of one script evaluation.
///
/// Failures are data, not transport errors: a script that raises still
/// produces an outcome, with the message under `error`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ExecutionOutcome {
    /// The script's result, when evaluation succeeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JsonValue>,
    /// The failure message, when it did not.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionOutcome {
    fn success(result: JsonValue) -> Self {
        Self {
            result: Some(result),
            error: None,
        }
    }

    fn failure(message: String) -> Self {
        Self {
            result: None,
            error: Some(message),
        }
    }

    /// Whether this outcome carries a failure message.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Evaluates Starlark snippets against an optional capability bridge.
#[derive(Default)]
pub struct Executor {
    proxy: Option<(Arc<dyn ProxyManager>, Handle)>,
}

impl Executor {
    /// An executor with no upstream servers; scripts see only `params` and
    /// the standard library.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// An executor whose scripts can call proxied tools through per-server
    /// namespaces. The handle is used to block script threads on the async
    /// proxy, so [`execute`](Self::execute) must not run on a runtime worker.
    #[must_use]
    pub fn with_proxy(proxy: Arc<dyn ProxyManager>, handle: Handle) -> Self {
        Self {
            proxy: Some((proxy, handle)),
        }
    }

    /// Runs a snippet and reports its outcome.
    ///
    /// Single-expression snippets evaluate to the expression's value.
    /// Multi-statement programs report an explicit `result` binding when one
    /// exists, otherwise a dict of the bindings the program created, or
    /// nothing when it created none.
    #[must_use]
    pub fn execute(&self, code: &str, params: Option<&JsonMap<String, JsonValue>>) -> ExecutionOutcome {
        let program = is_program(code);
        let phase = if program { "Execution" } else { "Evaluation" };

        let module = Module::new();
        let mut injected: HashSet<String> = HashSet::new();

        if let Some(params) = params {
            let dict = json_to_starlark(module.heap(), &JsonValue::Object(params.clone()));
            module.set("params", dict);
            injected.insert("params".to_owned());
        }

        if let Some((proxy, handle)) = &self.proxy {
            for (identifier, namespace) in server_namespaces(proxy, handle) {
                let value = module.heap().alloc(namespace);
                module.set(&identifier, value);
                injected.insert(identifier);
            }
        }

        // A program parses as-is. An expression snippet is parenthesized so
        // a single-line statement cannot slip through as a module; the
        // trailing newline keeps a trailing comment from eating the close.
        let source = if program {
            code.to_owned()
        } else {
            format!("({code}\n)")
        };
        let ast = match AstModule::parse("<script>", source, &dialect()) {
            Ok(ast) => ast,
            Err(err) => return ExecutionOutcome::failure(format!("{phase} error: {err}")),
        };

        let globals = globals();
        let evaluated = {
            let mut evaluator = Evaluator::new(&module);
            evaluator.eval_module(ast, &globals)
        };

        let last_value = match evaluated {
            Ok(value) => value,
            Err(err) => return ExecutionOutcome::failure(format!("{phase} error: {err}")),
        };

        if !program {
            return ExecutionOutcome::success(starlark_to_json(last_value));
        }

        if let Some(explicit) = module.get("result") {
            return ExecutionOutcome::success(starlark_to_json(explicit));
        }

        let mut bindings = JsonMap::new();
        for name in module.names() {
            let name = name.as_str();
            if injected.contains(name) || PREDECLARED.contains(&name) {
                continue;
            }
            if let Some(value) = module.get(name) {
                bindings.insert(name.to_owned(), starlark_to_json(value));
            }
        }

        if bindings.is_empty() {
            debug!("program produced no result bindings");
            ExecutionOutcome::success(JsonValue::Null)
        } else {
            ExecutionOutcome::success(JsonValue::Object(bindings))
        }
    }
}

/// A snippet is a program when it spans lines or returns from a function;
/// otherwise it is treated as a single expression.
fn is_program(code: &str) -> bool {
    code.contains('\n') || code.contains("return")
}

fn dialect() -> Dialect {
    let mut dialect = Dialect::Extended;
    dialect.enable_load = false;
    dialect
}

fn globals() -> Globals {
    let mut builder =
        GlobalsBuilder::extended_by(&[LibraryExtension::Json, LibraryExtension::Print]);
    builder.namespace("math", math_module);
    builder.namespace("time", time_module);
    builder.build()
}
