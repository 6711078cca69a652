// Main entry point for the CourseDB CLI
// Runs catalog queries against a seed-script store and exports the results

use anyhow::{bail, Context, Result};
use clap::Parser as ClapParser;
use coursedb::config::Config;
use coursedb::export;
use coursedb::logging::init_tracing;
use coursedb::{
    error_kind, Error, ExportOptions, Format, Param, Params, Pipeline, QueryName, Request,
    StoreSource,
};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// CourseDB - export students, courses and reviews as JSON or XML
#[derive(ClapParser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Seed script the store is provisioned from
    #[arg(short, long)]
    store: Option<PathBuf>,

    /// Configuration file (default: ./coursedb.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Export format when a command names none
    #[arg(short, long)]
    format: Option<String>,

    /// Pretty-print exported documents
    #[arg(short, long)]
    pretty: bool,

    /// Execute a single command and exit
    #[arg(short, long)]
    execute: Option<String>,
}

/// A parsed shell command
#[derive(Debug, PartialEq)]
enum Command {
    /// `<query> [key=value ...] [as <format>] [into <file>]`
    Export {
        query: String,
        params: Params,
        format: Option<String>,
        into: Option<PathBuf>,
    },
    /// `verify <query> <file>`
    Verify { query: String, path: PathBuf },
}

struct Shell {
    pipeline: Pipeline,
    default_format: String,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::load(args.config.as_deref())?;

    init_tracing(&config.log_level)?;

    let store = args
        .store
        .or(config.store)
        .context("no store given: pass --store or set `store` in the config file")?;
    let options = ExportOptions {
        pretty: args.pretty || config.pretty,
    };

    let mut shell = Shell {
        pipeline: Pipeline::new(StoreSource::Path(store)).with_options(options),
        default_format: args.format.unwrap_or(config.format),
    };

    // If a command was provided, execute it and exit
    if let Some(line) = args.execute {
        if let Err(e) = shell.execute(&line) {
            report(&e);
            std::process::exit(1);
        }
        return Ok(());
    }

    println!("CourseDB interactive shell");
    println!("Type '.queries' to list queries, '.help' for help, '.exit' to quit");
    println!();

    repl(|line| shell.execute(line))
}

/// Read-eval-print loop; stops on `.exit`, `.quit` or end of input
fn repl<F>(mut execute_fn: F) -> Result<()>
where
    F: FnMut(&str) -> Result<()>,
{
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("coursedb> ");
        stdout.flush()?;

        let mut input = String::new();
        if stdin.read_line(&mut input)? == 0 {
            println!();
            break;
        }

        let input = input.trim();
        if input.is_empty() {
            continue;
        }

        if input.starts_with('.') {
            match input {
                ".exit" | ".quit" => {
                    println!("Goodbye!");
                    break;
                }
                ".help" => print_help(),
                ".queries" => print_queries(),
                _ => {
                    println!("Unknown command: {}", input);
                    println!("Type '.help' for help");
                }
            }
            continue;
        }

        if let Err(e) = execute_fn(input) {
            report(&e);
        }
    }

    Ok(())
}

impl Shell {
    fn execute(&mut self, line: &str) -> Result<()> {
        match parse_command(line)? {
            Command::Export {
                query,
                params,
                format,
                into,
            } => {
                let format = resolve_format(format, into.as_deref(), &self.default_format);
                let export = self.pipeline.run(&Request::new(query, params, format))?;

                match into {
                    Some(path) => {
                        std::fs::write(&path, &export.document)
                            .with_context(|| format!("cannot write {}", path.display()))?;
                        println!(
                            "Wrote {} record(s) of {} as {} to {}",
                            export.record_count,
                            export.query,
                            export.format,
                            path.display()
                        );
                    }
                    None => println!("{}", export.document),
                }
            }
            Command::Verify { query, path } => {
                let count = verify(&query, &path)?;
                println!("{}: {} valid record(s) of {}", path.display(), count, query);
            }
        }
        Ok(())
    }
}

/// An explicit `as` wins, then the target file's extension, then the default
fn resolve_format(explicit: Option<String>, into: Option<&Path>, default: &str) -> String {
    match (explicit, into) {
        (Some(format), _) => format,
        (None, Some(path)) => Format::extension_of(path).unwrap_or_default(),
        (None, None) => default.to_string(),
    }
}

/// Decode a previous export and count its records
fn verify(query: &str, path: &Path) -> Result<usize> {
    let query: QueryName = query.parse()?;
    let format: Format = Format::extension_of(path).unwrap_or_default().parse()?;
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read {}", path.display()))?;
    let records = export::decode(format, query, &text)?;
    Ok(records.len())
}

fn parse_command(line: &str) -> Result<Command> {
    let tokens = tokenize(line)?;
    let mut tokens = tokens.into_iter();

    let Some(head) = tokens.next() else {
        bail!("empty command");
    };

    if head.eq_ignore_ascii_case("verify") {
        let (Some(query), Some(path), None) = (tokens.next(), tokens.next(), tokens.next()) else {
            bail!("usage: verify <query> <file>");
        };
        return Ok(Command::Verify {
            query: unquote(&query),
            path: PathBuf::from(unquote(&path)),
        });
    }

    let mut params = Params::new();
    let mut format = None;
    let mut into = None;

    while let Some(token) = tokens.next() {
        if token.eq_ignore_ascii_case("as") {
            format = Some(unquote(&tokens.next().context("'as' needs a format")?));
        } else if token.eq_ignore_ascii_case("into") {
            let path = tokens.next().context("'into' needs a file")?;
            into = Some(PathBuf::from(unquote(&path)));
        } else if let Some((key, value)) = token.split_once('=') {
            if key.is_empty() {
                bail!("missing parameter name in '{}'", token);
            }
            params.insert(key, parse_value(value));
        } else {
            bail!("unexpected '{}': parameters are written key=value", token);
        }
    }

    Ok(Command::Export {
        query: unquote(&head),
        params,
        format,
        into,
    })
}

/// Quoted values are always text
fn parse_value(raw: &str) -> Param {
    if let Some(inner) = quoted_inner(raw) {
        return Param::Text(inner.to_string());
    }
    raw.parse::<i64>()
        .map(Param::Integer)
        .unwrap_or_else(|_| Param::Text(raw.to_string()))
}

fn quoted_inner(token: &str) -> Option<&str> {
    token.strip_prefix('\'')?.strip_suffix('\'')
}

/// Drop one surrounding pair of single quotes; inner quotes are kept
fn unquote(token: &str) -> String {
    quoted_inner(token).unwrap_or(token).to_string()
}

/// Split on whitespace
/// A quote opens a group at the start of a token or right after `=`,
/// and closes at the end of a token; quotes elsewhere are literal
fn tokenize(line: &str) -> Result<Vec<String>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut started = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\'' if !quoted && (current.is_empty() || current.ends_with('=')) => {
                quoted = true;
                current.push(c);
                started = true;
            }
            '\'' if quoted && chars.peek().map_or(true, |next| next.is_whitespace()) => {
                quoted = false;
                current.push(c);
            }
            c if c.is_whitespace() && !quoted => {
                if started {
                    tokens.push(std::mem::take(&mut current));
                    started = false;
                }
            }
            c => {
                current.push(c);
                started = true;
            }
        }
    }

    if quoted {
        bail!("unterminated quote");
    }
    if started {
        tokens.push(current);
    }
    Ok(tokens)
}

/// Library errors are shown with their kind; anything else as-is
fn report(err: &anyhow::Error) {
    match err.downcast_ref::<Error>() {
        Some(e) => eprintln!("{}: {}", error_kind(e), e),
        None => eprintln!("Error: {:#}", err),
    }
}

fn print_queries() {
    for query in QueryName::ALL {
        let params: Vec<_> = query
            .parameters()
            .iter()
            .map(|p| format!("{}=<{:?}>", p.name, p.kind))
            .collect();
        println!("  {} {}", query, params.join(" "));
        println!("      {}", query.description());
    }
}

fn print_help() {
    println!("Commands:");
    println!("  <query> [key=value ...] [as json|xml] [into <file>]");
    println!("      Run a query and print the export, or write it to a file.");
    println!("      Without 'as', the file extension picks the format.");
    println!("  verify <query> <file>");
    println!("      Check that a previous export decodes for that query.");
    println!();
    println!("Special Commands:");
    println!("  .queries           List the available queries");
    println!("  .help              Show this help message");
    println!("  .exit, .quit       Exit the shell");
    println!();
    println!("Examples:");
    println!("  list_students");
    println!("  courses_for_student student_id=1 as xml");
    println!("  find_students_by_name name='ada love' into found.json");
    println!("  low_rated_reviews max_rating=1 into low.xml");
    println!();
}
