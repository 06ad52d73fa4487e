//! The `list` subcommand: prints every tool the gateway would expose.

use tracing::warn;

use metabridge_config::{Config, ConfigError};
use metabridge_proxy::{ConnectionManager, ManagerOptions, ProxyManager};
use metabridge_store::ToolStore;

const BUILTIN_TOOLS: &[(&str, &str)] = &[
    (
        "eval_starlark",
        "Execute Starlark code with access to proxied MCP tools",
    ),
    ("save_tool", "Create or update a composite tool definition"),
    ("list_saved_tools", "List all saved composite tool definitions"),
    ("show_saved_tool", "Show the complete definition of a saved tool"),
    (
        "delete_saved_tool",
        "Delete a saved tool definition from storage",
    ),
];

/// Everything after the first newline of a description is detail, not summary.
fn first_line(description: &str) -> &str {
    description
        .split('\n')
        .next()
        .unwrap_or(description)
        .trim()
}

fn print_group(entries: &[(String, String)]) {
    let width = entries.iter().map(|(name, _)| name.len()).max().unwrap_or(0);
    for (name, description) in entries {
        println!("  • {name:<width$} - {}", first_line(description));
    }
}

/// Prints saved, built-in, and proxied tools to stdout.
///
/// # Errors
///
/// Fails on invalid configuration or a proxy startup error; a missing
/// configuration file is reported inline instead.
pub async fn run() -> anyhow::Result<()> {
    println!("Saved Tools:");
    match ToolStore::open_default()?.list().await {
        Err(err) => warn!(error = %err, "failed to load saved tools"),
        Ok(tools) if tools.is_empty() => println!("  (none)"),
        Ok(tools) => {
            let entries: Vec<(String, String)> = tools
                .into_iter()
                .map(|tool| (tool.name, tool.description))
                .collect();
            print_group(&entries);
        }
    }
    println!();

    println!("Built-in Tools:");
    let builtins: Vec<(String, String)> = BUILTIN_TOOLS
        .iter()
        .map(|(name, description)| ((*name).to_owned(), (*description).to_owned()))
        .collect();
    print_group(&builtins);
    println!();

    let config = match Config::load_default() {
        Ok(config) => config,
        Err(ConfigError::Io { source, .. })
            if source.kind() == std::io::ErrorKind::NotFound =>
        {
            println!("Proxied Tools:");
            println!("  (no MCP server configuration found)");
            return Ok(());
        }
        Err(err) => return Err(err.into()),
    };
    config.validate()?;

    if metabridge_config::should_hide_proxied_tools() {
        println!("Proxied Tools:");
        println!(
            "  (hidden via {} environment variable)",
            metabridge_config::HIDE_PROXIED_TOOLS_ENV
        );
        return Ok(());
    }

    let manager = ConnectionManager::with_options(config.clone(), ManagerOptions::quiet());
    manager.start().await;

    let all_tools = manager.get_all_capabilities();
    if all_tools.is_empty() {
        println!("Proxied Tools:");
        println!("  (no tools discovered from MCP servers)");
        manager.stop().await;
        return Ok(());
    }

    let mut server_names: Vec<&String> = all_tools.keys().collect();
    server_names.sort();

    for server_name in server_names {
        let Some(server_config) = config.mcp_servers.get(server_name) else {
            warn!(server = %server_name, "no configuration found for server, skipping");
            continue;
        };
        if server_config.hidden {
            continue;
        }

        let entries: Vec<(String, String)> = all_tools[server_name]
            .iter()
            .filter(|tool| server_config.should_include_tool(&tool.name))
            .map(|tool| (tool.name.clone(), tool.description.clone()))
            .collect();

        if !entries.is_empty() {
            println!("Proxied Tools from '{server_name}':");
            print_group(&entries);
            println!();
        }
    }

    manager.stop().await;
    Ok(())
}
