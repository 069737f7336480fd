use std::{collections::HashMap, fs, path::PathBuf, process};

use clap::Parser;
use colored::Colorize;
use diffeq_codegen::{
    codegen::{language, Code, Dtype, LanguageId, Specifier, Specifiers, Statement},
    expression::{Expression, STOCHASTIC_SYMBOL},
    utils::word_substitute,
    Equations,
};
use tracing::Level;

#[derive(Parser)]
#[command(name = "diffeq-codegen")]
#[command(about = "Analyse model equations and generate state update code")]
#[command(version)]
struct Args {
    /// File with the model equations, one declaration per line
    file: PathBuf,

    /// Target language of the generated code (evalexpr or cpp)
    #[arg(short, long, default_value = "evalexpr")]
    language: LanguageId,

    /// Print debug logs
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(if args.verbose {
            Level::DEBUG
        } else {
            Level::WARN
        })
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(&args) {
        eprintln!("{} {}", "Error:".red().bold(), e);
        process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let text = fs::read_to_string(&args.file)?;
    let eqs = Equations::new(&text)?;

    println!("{}", "Equations".bold());
    for eq in eqs.equations_ordered() {
        println!("  {eq}");
    }

    println!("{}", "Analysis".bold());
    println!("  linear: {}", eqs.is_linear()?);
    println!("  conditionally linear: {}", eqs.is_conditionally_linear()?);

    println!("{}", "Substituted".bold());
    let substituted = eqs.substituted_expressions()?;
    for (name, expr) in &substituted {
        println!("  d{}/dt = {}", name.cyan(), expr.code());
    }

    let (statements, specifiers) = euler_update(&eqs, &substituted)?;
    let language = language(args.language);
    let code = language.translate_statement_sequence(&statements, &specifiers)?;
    let code = language.apply_template(&code, &language.template_state_update());

    println!("{}", format!("State update ({})", args.language).bold());
    print_code(&code);
    Ok(())
}

/// Forward Euler steps for every differential equation. The noise symbol is
/// replaced by a standard normal sample scaled with the inverse square root of the
/// time step.
fn euler_update(
    eqs: &Equations,
    substituted: &[(String, Expression)],
) -> Result<(Vec<Statement>, Specifiers), Box<dyn std::error::Error>> {
    let noise = HashMap::from([(
        STOCHASTIC_SYMBOL.to_string(),
        "(randn() / dt ** 0.5)".to_string(),
    )]);
    let mut statements = Vec::new();
    for (name, expr) in substituted {
        let code = match expr.split_stochastic()? {
            (_, None) => expr.code().to_string(),
            (_, Some(_)) => word_substitute(expr.code(), &noise),
        };
        statements.push(Statement::new(
            format!("_{name}"),
            "=",
            format!("{name} + dt * ({code})"),
        ));
    }
    for (name, _) in substituted {
        statements.push(Statement::new(name.as_str(), "=", format!("_{name}")));
    }

    let mut specifiers = Specifiers::new();
    for name in eqs.diff_eq_names() {
        specifiers.insert(
            name.clone(),
            Specifier::array(format!("_array_{name}"), "_neuron_idx", Dtype::Float64),
        );
    }
    for name in eqs.parameter_names() {
        specifiers.insert(name, Specifier::Value { dtype: Dtype::Float64 });
    }
    specifiers.insert("dt".to_string(), Specifier::Value { dtype: Dtype::Float64 });
    specifiers.insert("_neuron_idx".to_string(), Specifier::Index { all: true });
    Ok((statements, specifiers))
}

fn print_code(code: &Code) {
    match code {
        Code::Single(text) => println!("{text}"),
        Code::Slots(slots) => {
            for (slot, text) in slots {
                println!("[{}]", slot.yellow());
                println!("{text}");
            }
        }
    }
}
