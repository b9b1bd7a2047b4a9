//! gg-kvcache-cli entry point.
//!
//! Inspects how an environment config lays out KV caches and weight
//! sharding, without running a model.

mod cli_parser;

use std::process::ExitCode;

use gg_kvcache::logging::{self, LoggingConfig};
use gg_kvcache::{Environment, EnvironmentConfig, EnvironmentError};

use cli_parser::CommandArgs;

/// Exit code for configuration errors.
const EXIT_CONFIG: u8 = 2;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("help");
    let rest = args.get(2..).unwrap_or_default();

    match command {
        "plan" => with_args(rest, run_plan),
        "resolve" => with_args(rest, run_resolve),
        "validate" => with_args(rest, run_validate),
        "help" | "--help" | "-h" => {
            if let Some(sub) = args.get(2) {
                cli_parser::print_command_help(sub);
            } else {
                cli_parser::print_usage();
            }
            ExitCode::SUCCESS
        }
        "version" | "--version" | "-V" => {
            println!("gg-kvcache-cli {}", env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        }
        _ => {
            eprintln!("Unknown command: {}", command);
            cli_parser::print_usage();
            ExitCode::FAILURE
        }
    }
}

fn with_args(rest: &[String], run: fn(&CommandArgs) -> ExitCode) -> ExitCode {
    match cli_parser::parse_command_args(rest) {
        Ok(parsed) => {
            let level = if parsed.verbose { "debug" } else { "warn" };
            logging::init(LoggingConfig::new(level));
            run(&parsed)
        }
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn load_environment(args: &CommandArgs) -> Result<Environment, ExitCode> {
    let config = match &args.config {
        Some(path) => EnvironmentConfig::from_file(path).map_err(|e| config_error(&e.into()))?,
        None => EnvironmentConfig::default(),
    };
    Environment::new(config).map_err(|e| config_error(&e))
}

fn config_error(e: &EnvironmentError) -> ExitCode {
    eprintln!("Configuration error: {}", e);
    ExitCode::from(EXIT_CONFIG)
}

fn run_plan(args: &CommandArgs) -> ExitCode {
    let env = match load_environment(args) {
        Ok(env) => env,
        Err(code) => return code,
    };
    let plan = env.plan();

    if args.json {
        return match serde_json::to_string_pretty(&plan) {
            Ok(json) => {
                println!("{}", json);
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("Failed to serialize plan: {}", e);
                ExitCode::FAILURE
            }
        };
    }

    println!("Model:          {} ({} layers)", plan.model_type, plan.num_layers);
    println!("Prompt length:  {}", plan.seq_len);
    println!("Cache variant:  {}", plan.cache_kind);
    println!("Cache shape:    {:?}", plan.cache_shape);
    match plan.scale_dtype {
        Some(scale) => println!("Dtype:          {} (scales {})", plan.dtype, scale),
        None => println!("Dtype:          {}", plan.dtype),
    }
    println!(
        "Sharded axis:   {} '{}' {}",
        plan.cache_sharding_axis, plan.cache_axis_name, plan.partition
    );
    println!("Mesh:           {:?}", plan.mesh_shape);
    println!("Local shape:    {:?}", plan.local_cache_shape);
    if !plan.divides_evenly {
        println!("                (uneven split, last device is padded)");
    }
    println!("Bytes/layer:    {}", plan.bytes_per_layer);
    println!("Total bytes:    {}", plan.total_bytes);
    ExitCode::SUCCESS
}

fn run_resolve(args: &CommandArgs) -> ExitCode {
    if args.names.is_empty() {
        eprintln!("resolve needs at least one tensor name");
        cli_parser::print_command_help("resolve");
        return ExitCode::FAILURE;
    }
    let env = match load_environment(args) {
        Ok(env) => env,
        Err(code) => return code,
    };
    let resolved = match env.resolve_weight_shardings(args.names.as_slice()) {
        Ok(resolved) => resolved,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    if args.json {
        let map: serde_json::Map<String, serde_json::Value> = resolved
            .iter()
            .map(|(name, spec)| (name.clone(), serde_json::json!(spec.sharded_axis())))
            .collect();
        println!("{}", serde_json::Value::Object(map));
    } else {
        for (name, spec) in &resolved {
            println!("{}  {}", name, spec.partition());
        }
    }
    ExitCode::SUCCESS
}

fn run_validate(args: &CommandArgs) -> ExitCode {
    match load_environment(args) {
        Ok(env) => {
            println!(
                "Configuration valid: {} layers, cache {:?}, {} sharding rules",
                env.num_layers(),
                env.cache_shape().dims(),
                env.rules().len()
            );
            ExitCode::SUCCESS
        }
        Err(code) => code,
    }
}
