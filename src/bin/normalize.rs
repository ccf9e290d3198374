use anyhow::{Context, Result};
use bizgraph::literal::{declared_names, extract_declaration, normalize};
use bizgraph::{parse_declaration, Delimiter, UnbalancedPolicy};
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "normalize")]
#[command(about = "Print one JS literal declaration from a data file as JSON")]
struct Args {
    /// Data file holding `const NAME = ...` declarations
    file: PathBuf,

    /// Declaration to extract; lists the declared names when omitted
    name: Option<String>,

    /// The declaration is an array literal (`[...]`) rather than an object
    #[arg(short, long)]
    array: bool,

    /// Print the normalized text without parsing it
    #[arg(long)]
    raw: bool,

    /// Fail when the literal never closes
    #[arg(long)]
    strict: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(
        env_logger::Env::default()
            .filter_or("RUST_LOG", "warn")
    ).init();

    let args = Args::parse();
    let text = std::fs::read_to_string(&args.file)
        .with_context(|| format!("Failed to read {}", args.file.display()))?;

    let Some(name) = args.name else {
        for name in declared_names(&text) {
            println!("{}", name);
        }
        return Ok(());
    };

    let delimiter = if args.array { Delimiter::Bracket } else { Delimiter::Brace };

    if args.raw {
        let extracted = extract_declaration(&text, &name, delimiter)
            .with_context(|| format!("{} not found in {}", name, args.file.display()))?;
        println!("{}", normalize(extracted.text));
        return Ok(());
    }

    let policy = if args.strict { UnbalancedPolicy::Reject } else { UnbalancedPolicy::Recover };
    let value = parse_declaration(&text, &name, delimiter, policy)?
        .with_context(|| format!("{} not found in {}", name, args.file.display()))?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}
