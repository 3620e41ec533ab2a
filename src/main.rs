use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, ValueEnum};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use rtinycc::tokenizer::{Token, tokenize};

/// Compile a tiny C subset into x86-64 assembly.
#[derive(Parser, Debug)]
#[command(name = "rtinycc", version, about)]
struct Cli {
  /// Source file to compile
  input: PathBuf,

  /// Where to write the result (defaults to `<INPUT>.s`)
  #[arg(short, long)]
  output: Option<PathBuf>,

  /// Print the result instead of writing a file
  #[arg(long)]
  stdout: bool,

  /// Pipeline stage to emit
  #[arg(long, value_enum, default_value_t = Emit::Asm)]
  emit: Emit,

  /// Increase log verbosity (-v debug, -vv trace); RUST_LOG overrides
  #[arg(short, long, action = clap::ArgAction::Count)]
  verbose: u8,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Emit {
  Asm,
  Tokens,
  Ast,
}

fn init_logging(verbose: u8) {
  let level = match verbose {
    0 => "warn",
    1 => "debug",
    _ => "trace",
  };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_target(false)
    .with_writer(std::io::stderr)
    .init();
}

fn render_tokens(tokens: &[Token]) -> String {
  tokens
    .iter()
    .map(|token| {
      let kind = format!("{:?}", token.kind);
      format!("{:>4}  {kind:<10} {}\n", token.line, token.text)
    })
    .collect()
}

fn run(cli: &Cli) -> Result<(), String> {
  let source = fs::read_to_string(&cli.input)
    .map_err(|err| format!("cannot open {}: {err}", cli.input.display()))?;
  debug!(path = %cli.input.display(), bytes = source.len(), "read source");

  let text = match cli.emit {
    Emit::Asm => rtinycc::compile(&source).map_err(|err| err.to_string())?,
    Emit::Tokens => render_tokens(&tokenize(&source)),
    Emit::Ast => {
      let program = rtinycc::parse_program(&source).map_err(|err| err.to_string())?;
      format!("{program:#?}\n")
    }
  };

  let Some(output) = output_path(cli) else {
    print!("{text}");
    return Ok(());
  };

  fs::write(&output, text).map_err(|err| format!("cannot write {}: {err}", output.display()))?;
  info!(path = %output.display(), "wrote output");
  if cli.emit == Emit::Asm {
    println!("Assembly written to {}", output.display());
    println!("Now assemble & link with: gcc -no-pie -o prog {}", output.display());
  }
  Ok(())
}

/// File to write, or `None` for stdout. Only assembly gets a default file;
/// token and tree dumps go to stdout unless `-o` is given.
fn output_path(cli: &Cli) -> Option<PathBuf> {
  if cli.stdout {
    return None;
  }
  match (&cli.output, cli.emit) {
    (Some(path), _) => Some(path.clone()),
    (None, Emit::Asm) => Some(default_output(&cli.input)),
    (None, Emit::Tokens | Emit::Ast) => None,
  }
}

fn default_output(input: &Path) -> PathBuf {
  let mut name = input.as_os_str().to_owned();
  name.push(".s");
  PathBuf::from(name)
}

fn main() {
  let cli = Cli::parse();
  init_logging(cli.verbose);

  if let Err(err) = run(&cli) {
    eprintln!("error: {err}");
    process::exit(1);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn cli(args: &[&str]) -> Cli {
    Cli::try_parse_from(std::iter::once("rtinycc").chain(args.iter().copied())).unwrap()
  }

  #[test]
  fn assembly_defaults_to_input_with_s_suffix() {
    assert_eq!(output_path(&cli(&["prog.tc"])), Some(PathBuf::from("prog.tc.s")));
    assert_eq!(output_path(&cli(&["prog.tc", "--stdout"])), None);
  }

  #[test]
  fn dumps_go_to_stdout_unless_output_given() {
    assert_eq!(output_path(&cli(&["prog.tc", "--emit", "tokens"])), None);
    assert_eq!(output_path(&cli(&["prog.tc", "--emit", "ast"])), None);
    assert_eq!(
      output_path(&cli(&["prog.tc", "--emit", "ast", "-o", "tree.txt"])),
      Some(PathBuf::from("tree.txt"))
    );
  }
}
