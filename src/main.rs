use clap::Parser;
use sprig::{Arg, ArgType, Ret};

#[derive(Parser)]
#[command(name = "sprig", version, about = "Compile and evaluate a pure expression")]
struct Cli {
    /// Expression in s-expression form, e.g. '(+ 1 (* x 2))'
    expr: String,

    /// name=value bindings, bound as floats
    bindings: Vec<String>,

    /// Print a representation instead of evaluating: ast | bytecode
    #[arg(long, value_name = "FORM")]
    emit: Option<String>,
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(&cli) {
        eprintln!("sprig: {e}");
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let expr = sprig::parse(&cli.expr)?;

    if cli.emit.as_deref() == Some("ast") {
        println!("{}", serde_json::to_string_pretty(&expr)?);
        return Ok(());
    }

    let mut names = Vec::with_capacity(cli.bindings.len());
    let mut values = Vec::with_capacity(cli.bindings.len());
    for binding in &cli.bindings {
        let (name, value) = binding
            .split_once('=')
            .ok_or_else(|| format!("malformed binding '{binding}', expected name=value"))?;
        let name = name.trim();
        let value: f64 = value.trim().parse()?;
        names.push(name);
        values.push(value);
    }

    let params: Vec<(&str, ArgType)> = names.iter().map(|&n| (n, ArgType::Float)).collect();
    let program = sprig::emit(&expr, &params)?;

    match cli.emit.as_deref() {
        None => {}
        Some("bytecode") => {
            for pair in program.words().chunks(2) {
                println!("{:#04x} {:#018x}", pair[0], pair[1]);
            }
            return Ok(());
        }
        Some(other) => return Err(format!("unknown --emit form '{other}'").into()),
    }

    if !sprig::backend_available() {
        return Err("native code generation is not available on this target".into());
    }

    let compiled = sprig::compile_program(program)?;
    let args: Vec<Arg<'_>> = values.iter().map(|&v| Arg::Float(v)).collect();
    match compiled.call(&args)? {
        Ret::Int(v) => println!("{v}"),
        Ret::Float(v) => println!("{v}"),
    }
    Ok(())
}
