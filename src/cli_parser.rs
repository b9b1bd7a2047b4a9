//! CLI argument parsing and help text for gg-kvcache-cli.

use std::path::PathBuf;

/// Environment variable naming the config file when `--config` is absent.
pub const CONFIG_ENV: &str = "GG_KVCACHE_CONFIG";

/// Options shared by the plan, resolve and validate commands.
#[derive(Debug, Default, PartialEq)]
pub struct CommandArgs {
    pub config: Option<PathBuf>,
    pub json: bool,
    pub verbose: bool,
    /// Positional arguments (tensor names for `resolve`).
    pub names: Vec<String>,
}

/// Parse everything after the command name.
pub fn parse_command_args(args: &[String]) -> Result<CommandArgs, String> {
    let mut parsed = CommandArgs::default();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    parsed.config = Some(PathBuf::from(&args[i + 1]));
                    i += 2;
                } else {
                    return Err("Missing value for --config".to_string());
                }
            }
            "--json" => {
                parsed.json = true;
                i += 1;
            }
            "--verbose" | "-v" => {
                parsed.verbose = true;
                i += 1;
            }
            flag if flag.starts_with('-') => {
                return Err(format!("Unknown option: {}", flag));
            }
            name => {
                parsed.names.push(name.to_string());
                i += 1;
            }
        }
    }
    if parsed.config.is_none() {
        parsed.config = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
    }
    Ok(parsed)
}

/// Print general usage information.
pub fn print_usage() {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!(
        "gg-kvcache-cli - GG-CORE KV cache planner v{}

USAGE:
    gg-kvcache-cli [COMMAND] [OPTIONS]

COMMANDS:
    plan         Show cache shape, sharding and memory per layer
    resolve      Resolve weight sharding for tensor names
    validate     Validate an environment configuration
    version      Show version information
    help         Show this help message

OPTIONS:
    -c, --config FILE  Environment config (TOML)
    --json             Output in JSON format
    -v, --verbose      Enable debug logging
    -h, --help         Show help for command
    -V, --version      Show version information

EXAMPLES:
    gg-kvcache-cli plan --config env.toml
    gg-kvcache-cli plan --config env.toml --json
    gg-kvcache-cli resolve --config env.toml layers.0.attention.wq.weight
    gg-kvcache-cli validate --config env.toml

ENVIRONMENT:
    GG_KVCACHE_CONFIG  Config file used when --config is not given
    RUST_LOG           Log level (debug, info, warn, error)

EXIT CODES:
    0  Success
    1  Failure
    2  Configuration error
",
        version
    );
}

/// Print detailed help for a specific command.
pub fn print_command_help(command: &str) {
    match command {
        "plan" => print_plan_help(),
        "resolve" => print_resolve_help(),
        "validate" => print_validate_help(),
        _ => {
            eprintln!(
                "No detailed help available for '{}'. Use 'gg-kvcache-cli help' for general usage.",
                command
            );
        }
    }
}

fn print_plan_help() {
    eprintln!(
        "gg-kvcache-cli plan - Show the cache layout

USAGE:
    gg-kvcache-cli plan [--config FILE] [--json]

DESCRIPTION:
    Builds the environment without allocating caches and prints the cache
    variant, shape, dtype, sharded axis, per-device shape and total bytes.
    Uses built-in defaults when no config is given.
"
    );
}

fn print_resolve_help() {
    eprintln!(
        "gg-kvcache-cli resolve - Resolve weight sharding

USAGE:
    gg-kvcache-cli resolve [--config FILE] [--json] NAME...

DESCRIPTION:
    Looks up each tensor name in the sharding rules, first literally and then
    with numeric segments replaced by '*'.

EXIT CODES:
    0  Every name resolved
    1  A name has no rule
    2  Configuration error
"
    );
}

fn print_validate_help() {
    eprintln!(
        "gg-kvcache-cli validate - Validate configuration

USAGE:
    gg-kvcache-cli validate [--config FILE]

DESCRIPTION:
    Loads the config and sharding rules and checks that an environment can be
    built from them.

EXIT CODES:
    0  Configuration is valid
    2  Configuration error
"
    );
}
