//! Bridging Starlark calls back into proxied tool invocations.
//!
//! Each connected upstream server appears to scripts as a namespace value
//! whose attributes are its tools. Calling one blocks the script thread on
//! the async proxy via a captured runtime handle, so scripts must only run
//! on blocking-capable threads.

use std::fmt::{self, Debug, Display};
use std::sync::Arc;

use allocative::Allocative;
use anyhow::anyhow;
use serde_json::{Map as JsonMap, Value as JsonValue};
use starlark::eval::{Arguments, Evaluator};
use starlark::starlark_simple_value;
use starlark::values::dict::{AllocDict, DictRef};
use starlark::values::list::AllocList;
use starlark::values::{starlark_value, Heap, NoSerialize, ProvidesStaticType, StarlarkValue, Value};
use tokio::runtime::Handle;

use metabridge_proxy::ProxyManager;

use crate::convert::{json_to_starlark, starlark_to_json};

/// Rewrites a server name into a valid Starlark identifier.
///
/// Characters outside `[A-Za-z0-9_]` become underscores and a leading digit
/// gains an underscore prefix, so `github-gohiring` is reachable as
/// `github_gohiring`. Outbound calls still use the original name.
#[must_use]
pub fn normalize_server_name(name: &str) -> String {
    let mut normalized: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if normalized.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        normalized.insert(0, '_');
    }
    normalized
}

/// Builds one namespace per upstream server that exposes at least one tool.
///
/// Returned pairs are (normalized identifier, namespace value).
pub(crate) fn server_namespaces(
    proxy: &Arc<dyn ProxyManager>,
    handle: &Handle,
) -> Vec<(String, ServerNamespace)> {
    let mut namespaces = Vec::new();
    for (server_name, tools) in proxy.get_all_capabilities() {
        if tools.is_empty() {
            continue;
        }
        let tool_names = tools.into_iter().map(|tool| tool.name).collect();
        namespaces.push((
            normalize_server_name(&server_name),
            ServerNamespace {
                server_name,
                tool_names,
                proxy: Arc::clone(proxy),
                handle: handle.clone(),
            },
        ));
    }
    namespaces
}

/// A Starlark value representing one upstream server.
#[derive(ProvidesStaticType, NoSerialize, Allocative)]
pub(crate) struct ServerNamespace {
    server_name: String,
    tool_names: Vec<String>,
    #[allocative(skip)]
    proxy: Arc<dyn ProxyManager>,
    #[allocative(skip)]
    handle: Handle,
}

starlark_simple_value!(ServerNamespace);

impl Debug for ServerNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerNamespace")
            .field("server_name", &self.server_name)
            .field("tool_names", &self.tool_names)
            .finish_non_exhaustive()
    }
}

impl Display for ServerNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<server {}>", self.server_name)
    }
}

#[starlark_value(type = "server_namespace")]
impl<'v> StarlarkValue<'v> for ServerNamespace {
    fn get_attr(&self, attribute: &str, heap: &'v Heap) -> Option<Value<'v>> {
        if !self.tool_names.iter().any(|name| name == attribute) {
            return None;
        }
        Some(heap.alloc(CapabilityFunction {
            server_name: self.server_name.clone(),
            tool_name: attribute.to_owned(),
            proxy: Arc::clone(&self.proxy),
            handle: self.handle.clone(),
        }))
    }

    fn dir_attr(&self) -> Vec<String> {
        self.tool_names.clone()
    }
}

/// A bound tool, callable from scripts.
#[derive(ProvidesStaticType, NoSerialize, Allocative)]
pub(crate) struct CapabilityFunction {
    server_name: String,
    tool_name: String,
    #[allocative(skip)]
    proxy: Arc<dyn ProxyManager>,
    #[allocative(skip)]
    handle: Handle,
}

starlark_simple_value!(CapabilityFunction);

impl Debug for CapabilityFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilityFunction")
            .field("server_name", &self.server_name)
            .field("tool_name", &self.tool_name)
            .finish_non_exhaustive()
    }
}

impl Display for CapabilityFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<tool {}.{}>", self.server_name, self.tool_name)
    }
}

impl CapabilityFunction {
    /// Accepts either no arguments, a single dict, or keyword arguments.
    fn collect_arguments<'v>(
        &self,
        args: &Arguments<'v, '_>,
        heap: &'v Heap,
    ) -> starlark::Result<JsonMap<String, JsonValue>> {
        let named = args.names_map()?;
        let positional = args.len()? - named.len();

        match (positional, named.len()) {
            (0, 0) => Ok(JsonMap::new()),
            (1, 0) => {
                let argument = args.positional1(heap)?;
                if DictRef::from_value(argument).is_none() {
                    return Err(starlark::Error::new_other(anyhow!(
                        "{}.{}: single argument must be a dict",
                        self.server_name,
                        self.tool_name
                    )));
                }
                match starlark_to_json(argument) {
                    JsonValue::Object(members) => Ok(members),
                    _ => Err(starlark::Error::new_other(anyhow!(
                        "{}.{}: single argument must be a dict",
                        self.server_name,
                        self.tool_name
                    ))),
                }
            }
            (0, _) => {
                let mut members = JsonMap::new();
                for (name, value) in &named {
                    members.insert(name.as_str().to_owned(), starlark_to_json(*value));
                }
                Ok(members)
            }
            _ => Err(starlark::Error::new_other(anyhow!(
                "{}.{}: pass a single dict or keyword arguments, not both",
                self.server_name,
                self.tool_name
            ))),
        }
    }
}

#[starlark_value(type = "tool_function")]
impl<'v> StarlarkValue<'v> for CapabilityFunction {
    fn invoke(
        &self,
        _me: Value<'v>,
        args: &Arguments<'v, '_>,
        eval: &mut Evaluator<'v, '_, '_>,
    ) -> starlark::Result<Value<'v>> {
        let heap = eval.heap();
        let arguments = self.collect_arguments(args, heap)?;

        let outcome = self
            .handle
            .block_on(
                self.proxy
                    .call_capability(&self.server_name, &self.tool_name, arguments),
            )
            .map_err(|err| {
                starlark::Error::new_other(anyhow!(
                    "{}.{} failed: {err}",
                    self.server_name,
                    self.tool_name
                ))
            })?;

        let mut entries: Vec<(Value<'v>, Value<'v>)> = Vec::new();
        let rendered = outcome.rendered_content();
        if !rendered.is_empty() {
            let items: Vec<Value<'v>> =
                rendered.iter().map(|text| heap.alloc(text.as_str())).collect();
            entries.push((heap.alloc("content"), heap.alloc(AllocList(items))));
        }
        if let Some(structured) = &outcome.structured_content {
            entries.push((heap.alloc("structured"), json_to_starlark(heap, structured)));
        }
        Ok(heap.alloc(AllocDict(entries)))
    }
}
