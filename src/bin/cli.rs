use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use signalize::bind::{self, BindExecuter, BindingKind};
use signalize::dsl::builtins::{self, BuiltinFn};
use signalize::dsl::bytecode::check_separator;
use signalize::dsl::value::Value;
use signalize::dsl::vm::Executer;
use signalize::settings::{self, RunSettings};
use signalize::{AppError, CompileError, Globals};

// ── CLI argument parsing ─────────────────────────────────────────

#[derive(Parser)]
#[command(name = "signalize-cli", about = "Compile and run Signalize programs", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// JSON settings file (time limit, separator, output echo)
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Raise log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the bytecode for a program
    Compile {
        file: PathBuf,
        /// JSON object of global variables
        #[arg(long)]
        globals: Option<PathBuf>,
        /// Instruction separator
        #[arg(long)]
        separator: Option<String>,
    },
    /// Compile and execute a program
    Run {
        file: PathBuf,
        #[arg(long)]
        globals: Option<PathBuf>,
        /// Wall-clock budget in milliseconds (0 disables it)
        #[arg(long)]
        time_limit_ms: Option<u64>,
    },
    /// Evaluate bindings against a configuration snapshot
    Bind {
        file: PathBuf,
        /// JSON array of {container, key, value, selectedOption?}
        #[arg(long)]
        config: PathBuf,
        /// JSON object of name → text for `@name` lookups
        #[arg(long)]
        symbols: Option<PathBuf>,
        /// Evaluate only this binding kind
        #[arg(long)]
        kind: Option<BindingKind>,
    },
    /// Parse and type-check a program without running it
    Check { file: PathBuf },
    /// List the built-in functions
    Functions {
        /// Show only this function
        name: Option<String>,
        /// Show only this category (convert, string, test, io, bind, ...)
        #[arg(long)]
        category: Option<String>,
    },
}

// ── Helpers ──────────────────────────────────────────────────────

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "signalize=warn",
        1 => "signalize=info",
        2 => "signalize=debug",
        _ => "signalize=trace",
    };
    let filter = if verbose > 0 {
        tracing_subscriber::EnvFilter::new(default)
    } else {
        tracing_subscriber::EnvFilter::try_from_env("SIGNALIZE_LOG")
            .unwrap_or_else(|_| default.into())
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn read_source(path: &Path) -> Result<String, AppError> {
    std::fs::read_to_string(path).map_err(|e| AppError::IoError {
        message: format!("{}: {e}", path.display()),
    })
}

fn read_json(path: &Path) -> Result<serde_json::Value, AppError> {
    Ok(serde_json::from_str(&read_source(path)?)?)
}

fn load_globals(path: Option<&Path>) -> Result<Globals, AppError> {
    let Some(path) = path else {
        return Ok(Globals::new());
    };
    let serde_json::Value::Object(object) = read_json(path)? else {
        return Err("globals file must contain a JSON object".into());
    };
    object
        .iter()
        .map(|(name, json)| match Value::from_json(json) {
            Some(value @ (Value::Int(_) | Value::Float(_) | Value::Str(_) | Value::Bool(_))) => {
                Ok((name.clone(), value))
            }
            _ => Err(AppError::ValidationError {
                message: format!("global '{name}' must be an int, float, string or bool"),
            }),
        })
        .collect()
}

fn load_symbols(path: Option<&Path>) -> Result<HashMap<String, String>, AppError> {
    match path {
        Some(path) => Ok(serde_json::from_value(read_json(path)?)?),
        None => Ok(HashMap::new()),
    }
}

/// Compile, reporting diagnostics against the source text.
fn compile(source: &str, globals: &Globals) -> Result<signalize::Bytecode, AppError> {
    signalize::compile_source(source, globals).map_err(|e| report(&e, source))
}

fn report(error: &CompileError, source: &str) -> AppError {
    eprintln!("{}", error.format_with_source(source));
    AppError::from(error.clone())
}

/// `Pos(string, string, int = 0) -> int`
fn describe_signature(builtin: &BuiltinFn) -> String {
    let Some(signature) = builtin.signature() else {
        return builtin.signature.to_string();
    };
    let params: Vec<String> = signature
        .params
        .iter()
        .map(|p| match &p.default {
            Some(Value::Str(text)) => format!("{} = '{text}'", p.ty),
            Some(default) => format!("{} = {default}", p.ty),
            None => p.ty.to_string(),
        })
        .collect();
    format!("{}({}) -> {}", builtin.name, params.join(", "), signature.ret)
}

fn print_builtin(builtin: &BuiltinFn) {
    let scope = if builtins::needs_host(builtin.name) {
        " (bindings only)"
    } else {
        ""
    };
    println!("{}{scope}", describe_signature(builtin));
    println!("    [{}] {}", builtin.category, builtin.description);
}

// ── Commands ─────────────────────────────────────────────────────

fn run_command(command: Commands, settings: RunSettings) -> Result<(), AppError> {
    match command {
        Commands::Compile {
            file,
            globals,
            separator,
        } => {
            let separator = separator.unwrap_or(settings.separator);
            check_separator(&separator)?;
            let source = read_source(&file)?;
            let program = compile(&source, &load_globals(globals.as_deref())?)?;
            println!("{}", program.encode(&separator));
        }
        Commands::Run {
            file,
            globals,
            time_limit_ms,
        } => {
            let source = read_source(&file)?;
            let program = compile(&source, &load_globals(globals.as_deref())?)?;
            let settings = RunSettings {
                time_limit_ms: time_limit_ms.unwrap_or(settings.time_limit_ms),
                ..settings
            };
            let mut vm = Executer::from_program(Arc::new(program));
            let ok = vm.execute(settings.time_limit());
            if settings.echo_output {
                print!("{}", vm.output());
            }
            if let Some(error) = vm.last_error() {
                return Err(error.clone().into());
            }
            if ok {
                if let Some(value) = vm.result().filter(|v| !matches!(v, Value::Void)) {
                    println!("{value}");
                }
            }
        }
        Commands::Bind {
            file,
            config,
            symbols,
            kind,
        } => {
            let source = read_source(&file)?;
            let program = bind::compile_bindings(&source).map_err(|e| report(&e, &source))?;
            let mut entries = bind::config::from_json(&read_source(&config)?)?;
            let symbols = load_symbols(symbols.as_deref())?;

            let mut executer = BindExecuter::new(Arc::new(program), &symbols, &mut entries)
                .with_time_limit(settings.time_limit());
            let results: serde_json::Map<String, serde_json::Value> = match kind {
                Some(kind) => {
                    let outcome = executer.execute_bytecode(kind)?;
                    [(kind.to_string(), outcome.to_json())].into_iter().collect()
                }
                None => executer
                    .execute_all()?
                    .into_iter()
                    .map(|(kind, outcome)| (kind.to_string(), outcome.to_json()))
                    .collect(),
            };
            if settings.echo_output {
                print!("{}", executer.output());
            }
            let summary = serde_json::json!({ "results": results, "config": entries });
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Commands::Check { file } => {
            let source = read_source(&file)?;
            signalize::parse(&source, &Globals::new()).map_err(|e| report(&e, &source))?;
            println!("{}: ok", file.display());
        }
        Commands::Functions { name, category } => {
            if let Some(name) = name {
                let builtin = builtins::lookup_builtin(&name).ok_or_else(|| AppError::NotFound {
                    what: format!("function '{name}'"),
                })?;
                print_builtin(builtin);
                return Ok(());
            }
            builtins::BUILTINS
                .iter()
                .filter(|b| category.as_deref().is_none_or(|c| b.category == c))
                .for_each(print_builtin);
        }
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let loaded = match &cli.settings {
        Some(path) => settings::load_settings(path),
        None => Ok(RunSettings::default()),
    };
    let settings = match loaded {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };

    if let Err(e) = run_command(cli.command, settings) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn signatures_read_like_calls() {
        let pos = builtins::lookup_builtin("Pos").unwrap();
        assert_eq!(describe_signature(pos), "Pos(string, string, int = 0) -> int");
        let write_ln = builtins::lookup_builtin("WriteLn").unwrap();
        assert_eq!(describe_signature(write_ln), "WriteLn(string = '') -> void");
        let set_value = builtins::lookup_builtin("SetValue").unwrap();
        assert_eq!(describe_signature(set_value), "SetValue(string, string, string) -> void");
        assert!(builtins::needs_host(set_value.name));
        assert!(!builtins::needs_host(pos.name));
    }

    #[test]
    fn unknown_function_is_not_found() {
        let err = run_command(
            Commands::Functions {
                name: Some("Nope".into()),
                category: None,
            },
            RunSettings::default(),
        )
        .unwrap_err();
        assert!(matches!(err, AppError::NotFound { .. }));
        assert_eq!(err.to_string(), "function 'Nope' not found");
    }
}
