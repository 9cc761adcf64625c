//! Command-line front end: compile expression statements and print what was built.
//!
//! Each non-empty line of the input file (or each `-e` expression) is
//! parsed, validated and JIT-compiled. Scalar expressions with only numeric
//! inputs can be evaluated with `--input`.

use std::path::PathBuf;
use std::process;

use clap::Parser;
use log::{debug, info};

use jit_expr::expr::{print, Driver, VarKind};
use jit_expr::{Arg, JitConfig, JitEngine, Shape};

#[derive(Parser)]
#[command(name = "jit-expr")]
#[command(about = "JIT-compile audio expression statements to native code")]
struct Args {
    /// File with one expression per line ('#' starts a comment line)
    file: Option<PathBuf>,

    /// Expression to compile, may be repeated
    #[arg(short = 'e', long = "expr")]
    exprs: Vec<String>,

    /// Calling shape: scalar, block or sample
    #[arg(short, long, default_value = "scalar")]
    shape: Shape,

    /// Print the typed AST
    #[arg(long)]
    ast: bool,

    /// Print the generated IR
    #[arg(long)]
    ir: bool,

    /// Config file (defaults to ~/.jit-expr/config.yaml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Input values for evaluating scalar expressions
    #[arg(long, num_args = 1.., allow_negative_numbers = true)]
    input: Vec<f32>,
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => match JitConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("failed to load config {}: {e}", path.display());
                process::exit(1);
            }
        },
        None => JitConfig::load_default().unwrap_or_default(),
    };
    if args.ir {
        config.keep_ir = true;
    }
    debug!("config: {config:?}");

    let mut exprs = args.exprs.clone();
    if let Some(path) = &args.file {
        match std::fs::read_to_string(path) {
            Ok(text) => exprs.extend(
                text.lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty() && !l.starts_with('#'))
                    .map(String::from),
            ),
            Err(e) => {
                eprintln!("failed to read {}: {e}", path.display());
                process::exit(1);
            }
        }
    }
    if exprs.is_empty() {
        eprintln!("no expressions given (pass a file or -e)");
        process::exit(1);
    }

    let mut engine = match JitEngine::with_config(config) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("failed to start JIT: {e}");
            process::exit(1);
        }
    };
    let mut driver = Driver::new();

    for text in &exprs {
        if let Err(e) = run(&args, &mut driver, &mut engine, text) {
            eprintln!("{text}: {e}");
            process::exit(1);
        }
    }
    info!("compiled {} expression(s)", exprs.len());
}

fn run(
    args: &Args,
    driver: &mut Driver,
    engine: &mut JitEngine,
    text: &str,
) -> Result<(), jit_expr::CompileError> {
    let list = driver.parse(text)?;
    if args.ast {
        print!("{}", print::render(&list));
    }

    let func = engine.compile(&list, args.shape)?;
    let inputs: Vec<String> = func.inputs().iter().map(|v| v.to_string()).collect();
    println!(
        "{}: {} function, {} output(s), inputs [{}]",
        func.name(),
        func.shape(),
        func.outputs(),
        inputs.join(", ")
    );
    if let Some(ir) = func.ir() {
        println!("{ir}");
    }

    let numeric = func
        .inputs()
        .iter()
        .all(|v| matches!(v.kind, VarKind::Float | VarKind::Int));
    if !args.input.is_empty() && args.shape == Shape::Scalar && numeric {
        let values: Vec<Arg> = args.input.iter().map(|v| Arg::Float(*v)).collect();
        let outputs = func.eval(&values)?;
        let outputs: Vec<String> = outputs.iter().map(|v| v.to_string()).collect();
        println!("= {}", outputs.join(", "));
    }
    Ok(())
}
