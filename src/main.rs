/// Batch and interactive driver.
///
/// Reads programs from files, a `-e` one-liner, or stdin. Every statement
/// error is reported as `file:line: message` and evaluation continues with
/// the next statement; batch mode differs from the REPL only in exiting
/// nonzero once anything failed. Interactive input buffers lines until
/// brackets balance.
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use clap::Parser;
use miette::{miette, Result};

use aplite::{Config, Context};

#[derive(Parser)]
#[command(
    name = "aplite",
    about = "An APL-derived calculator over an arbitrary-precision numeric tower"
)]
struct Cli {
    /// Source files to evaluate; reads stdin when empty.
    files: Vec<PathBuf>,

    /// Evaluate one program text and exit.
    #[arg(short = 'e', long = "execute")]
    execute: Option<String>,

    /// Index origin, 0 or 1.
    #[arg(long, default_value_t = 1)]
    origin: i64,

    /// Float mantissa length in bits.
    #[arg(long, default_value_t = 256)]
    prec: u32,

    /// Input base: 0 (C-style), 2, 8, 10, or 16.
    #[arg(long, default_value_t = 0)]
    ibase: u32,

    /// Output base: 0, 2, 8, 10, or 16.
    #[arg(long, default_value_t = 0)]
    obase: u32,

    /// Maximum bit length of integer results; 0 lifts the limit.
    #[arg(long, default_value_t = 1_000_000)]
    maxbits: u64,

    /// Interactive prompt.
    #[arg(long, default_value = "")]
    prompt: String,

    /// Seed for the roll operator.
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = Config::new();
    config.set_origin(cli.origin).map_err(|e| miette!("{}", e))?;
    config
        .set_float_prec(cli.prec)
        .map_err(|e| miette!("{}", e))?;
    config
        .set_base(cli.ibase, cli.obase)
        .map_err(|e| miette!("{}", e))?;
    config.set_max_bits(cli.maxbits);
    config.set_prompt(cli.prompt.clone());
    if let Some(seed) = cli.seed {
        config.set_random_seed(seed);
    }
    let mut ctx = Context::with_config(config);

    if let Some(src) = &cli.execute {
        if run_source(&mut ctx, "<execute>", src) {
            std::process::exit(1);
        }
        return Ok(());
    }
    if !cli.files.is_empty() {
        let mut failed = false;
        for path in &cli.files {
            let name = path.display().to_string();
            match std::fs::read_to_string(path) {
                Ok(src) => failed |= run_source(&mut ctx, &name, &src),
                Err(e) => {
                    eprintln!("{}: cannot read: {}", name, e);
                    failed = true;
                }
            }
        }
        if failed {
            std::process::exit(1);
        }
        return Ok(());
    }
    repl(&mut ctx)
}

/// Evaluate one source unit, prefixing each statement error with its
/// position; true means something failed.
fn run_source(ctx: &mut Context, name: &str, src: &str) -> bool {
    ctx.run_line(src, |ctx, e| {
        eprintln!("{}:{}: {}", name, ctx.current_line(), e);
    })
}

fn repl(ctx: &mut Context) -> Result<()> {
    let stdin = io::stdin();
    let mut pending = String::new();
    prompt(ctx);
    for line in stdin.lock().lines() {
        let line = line.map_err(|e| miette!("read error: {}", e))?;
        pending.push_str(&line);
        pending.push('\n');
        if !balanced(&pending) {
            continue;
        }
        let src = std::mem::take(&mut pending);
        // Errors are already reported per statement; the REPL just goes on.
        run_source(ctx, "<stdin>", &src);
        prompt(ctx);
    }
    Ok(())
}

fn prompt(ctx: &Context) {
    let p = ctx.config.prompt();
    if !p.is_empty() {
        print!("{}", p);
        let _ = io::stdout().flush();
    }
}

/// Are all brackets closed, outside of quoted text?
fn balanced(src: &str) -> bool {
    let mut depth = 0i64;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut in_comment = false;
    for c in src.chars() {
        if in_comment {
            if c == '\n' {
                in_comment = false;
            }
            continue;
        }
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            '#' => in_comment = true,
            _ => {}
        }
    }
    depth <= 0
}
