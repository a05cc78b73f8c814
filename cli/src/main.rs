use std::{collections::BTreeSet, fmt, fs, path::PathBuf};

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use miette::{Diagnostic, GraphicalReportHandler, IntoDiagnostic as _, Result, Severity};
use tracing_error::ErrorLayer;
use tracing_subscriber::{EnvFilter, fmt as tracing_fmt, prelude::*};
use trellis_registry::{
    ComponentAddress, MemoryArchive, Registry, Token,
    graph::{dangling_references, topo_order},
};

#[derive(Parser)]
#[command(name = "trellis")]
#[command(version)]
#[command(about = "Trellis registry tool")]
struct Cli {
    /// Increase log verbosity (-v, -vv, -vvv, -vvvv).
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Report dangling references and reference cycles.
    Check(CheckArgs),
    /// Print every element address with its component type.
    Tree(TreeArgs),
    /// Rewrite a registry as a JSON document or an archive token stream.
    Convert(ConvertArgs),
}

#[derive(Args)]
struct CheckArgs {
    /// Treat the given lints as errors (e.g. `warnings`, `check::dangling_reference`).
    #[arg(short = 'D', long = "deny", value_name = "LINT")]
    deny: Vec<String>,

    /// Registry document or archive to check.
    #[arg(value_name = "REGISTRY")]
    registry: PathBuf,
}

#[derive(Args)]
struct TreeArgs {
    #[arg(value_name = "REGISTRY")]
    registry: PathBuf,
}

#[derive(Args)]
struct ConvertArgs {
    #[arg(value_name = "REGISTRY")]
    registry: PathBuf,

    /// Output format.
    #[arg(long = "to", value_enum)]
    to: Format,

    /// Write here instead of stdout.
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    output: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Format {
    Json,
    Archive,
}

fn main() -> Result<()> {
    miette::set_panic_hook();
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    match cli.command {
        Command::Check(args) => check(args),
        Command::Tree(args) => tree(args),
        Command::Convert(args) => convert(args),
    }
}

fn init_tracing(verbose: u8) -> Result<()> {
    let filter = if std::env::var_os("RUST_LOG").is_some() {
        EnvFilter::try_from_default_env().into_diagnostic()?
    } else {
        let trellis_level = match verbose {
            0 => "error",
            1 => "warn",
            2 => "info",
            3 => "debug",
            _ => "trace",
        };
        EnvFilter::new(format!("error,trellis={trellis_level},trellis_={trellis_level}"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_fmt::layer().with_writer(std::io::stderr))
        .with(ErrorLayer::default())
        .init();

    Ok(())
}

/// Reads a registry. A top-level JSON array is an archive token stream, anything else a
/// registry document.
fn load(path: &PathBuf) -> Result<Registry> {
    let text = fs::read_to_string(path)
        .map_err(|e| miette::miette!("failed to read `{}`: {}", path.display(), e))?;
    let value: serde_json::Value = serde_json::from_str(&text).into_diagnostic()?;

    if value.is_array() {
        tracing::debug!(path = %path.display(), "loading archive token stream");
        let tokens: Vec<Token> = serde_json::from_value(value).into_diagnostic()?;
        let registry = Registry::load(&mut MemoryArchive::reader(tokens))?;
        return Ok(registry);
    }

    tracing::debug!(path = %path.display(), "loading registry document");
    Ok(Registry::from_json_str(&text)?)
}

fn check(args: CheckArgs) -> Result<()> {
    let registry = load(&args.registry)?;

    let mut findings: Vec<Finding> = dangling_references(&registry)
        .into_iter()
        .map(|dangling| Finding::DanglingReference {
            element: dangling.element,
            attribute: dangling.attribute,
            path: dangling.path.to_string(),
        })
        .collect();
    collect_cycles(&registry, &ComponentAddress::root(), &mut findings);

    let deny = DenySet::new(&args.deny);
    let has_error = print_diagnostics(&findings, &deny)?;
    if has_error {
        return Err(miette::miette!("check failed"));
    }
    println!(
        "{}: {} elements, {} warnings",
        args.registry.display(),
        registry.addresses().len(),
        findings.len()
    );
    Ok(())
}

fn collect_cycles(registry: &Registry, scope: &ComponentAddress, findings: &mut Vec<Finding>) {
    if let Err(err) = topo_order(registry) {
        findings.push(Finding::ReferenceCycle {
            scope: scope.clone(),
            cycle: err
                .cycle
                .iter()
                .map(|name| name.as_str())
                .collect::<Vec<_>>()
                .join(" -> "),
        });
    }
    for (name, element) in registry.elements() {
        if let Some(sub) = &element.sub_registry {
            collect_cycles(sub, &scope.child(name.clone()), findings);
        }
    }
}

fn tree(args: TreeArgs) -> Result<()> {
    let registry = load(&args.registry)?;
    for address in registry.addresses() {
        let Some(element) = registry.lookup(&address) else {
            continue;
        };
        let indent = "  ".repeat(address.depth().saturating_sub(1));
        let name = address.name().map(|n| n.as_str()).unwrap_or_default();
        let marker = if element.is_composite() { " (composite)" } else { "" };
        println!("{indent}{name}: {}{marker}", element.type_id);
    }
    Ok(())
}

fn convert(args: ConvertArgs) -> Result<()> {
    let registry = load(&args.registry)?;
    let text = match args.to {
        Format::Json => registry.to_json_string_pretty()?,
        Format::Archive => {
            let mut writer = MemoryArchive::writer();
            registry.store(&mut writer)?;
            serde_json::to_string_pretty(writer.tokens()).into_diagnostic()?
        }
    };

    match args.output {
        Some(path) => fs::write(&path, text)
            .map_err(|e| miette::miette!("failed to write `{}`: {}", path.display(), e)),
        None => {
            println!("{text}");
            Ok(())
        }
    }
}

#[derive(Debug, thiserror::Error, Diagnostic)]
enum Finding {
    #[error("{element}: attribute `{attribute}` references `{path}`, which does not resolve")]
    #[diagnostic(
        code(check::dangling_reference),
        severity(Warning),
        help("nullable attributes bind nothing here; required ones fail to resolve")
    )]
    DanglingReference {
        element: ComponentAddress,
        attribute: String,
        path: String,
    },

    #[error("reference cycle in scope {scope}: {cycle}")]
    #[diagnostic(code(check::reference_cycle))]
    ReferenceCycle {
        scope: ComponentAddress,
        cycle: String,
    },
}

#[derive(Default)]
struct DenySet {
    deny_warnings: bool,
    deny_codes: BTreeSet<String>,
}

impl DenySet {
    fn new(deny: &[String]) -> Self {
        let mut set = Self::default();
        for d in deny {
            if d == "warnings" {
                set.deny_warnings = true;
            } else {
                set.deny_codes.insert(d.clone());
            }
        }
        set
    }

    fn is_denied(&self, code: &str) -> bool {
        self.deny_warnings || self.deny_codes.contains(code)
    }
}

fn print_diagnostics(findings: &[Finding], deny: &DenySet) -> Result<bool> {
    let mut has_error = false;
    let handler = GraphicalReportHandler::new();

    for finding in findings {
        let diagnostic: &dyn Diagnostic = finding;
        let code = diagnostic.code().map(|c| c.to_string()).unwrap_or_default();
        let severity = diagnostic.severity().unwrap_or(Severity::Error);
        let denied = matches!(severity, Severity::Warning) && deny.is_denied(&code);
        has_error |= denied || matches!(severity, Severity::Error);

        if denied {
            let denied_by = if deny.deny_warnings {
                "-D warnings".to_string()
            } else {
                format!("-D {code}")
            };
            render_report(
                &handler,
                &DeniedDiagnostic {
                    inner: diagnostic,
                    denied_by,
                },
            )?;
        } else {
            render_report(&handler, diagnostic)?;
        }
    }

    Ok(has_error)
}

fn render_report(handler: &GraphicalReportHandler, diagnostic: &dyn Diagnostic) -> Result<()> {
    let mut out = String::new();
    handler
        .render_report(&mut out, diagnostic)
        .map_err(|_| miette::miette!("failed to render diagnostics"))?;
    eprint!("{out}");
    Ok(())
}

/// A warning promoted to an error by `-D`.
#[derive(Debug)]
struct DeniedDiagnostic<'a> {
    inner: &'a dyn Diagnostic,
    denied_by: String,
}

impl fmt::Display for DeniedDiagnostic<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self.inner, f)
    }
}

impl std::error::Error for DeniedDiagnostic<'_> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.inner.source()
    }
}

impl Diagnostic for DeniedDiagnostic<'_> {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        self.inner.code()
    }

    fn severity(&self) -> Option<Severity> {
        Some(Severity::Error)
    }

    fn help<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        let hint = format!(
            "warning treated as error because it was denied via `{}`",
            self.denied_by
        );
        match self.inner.help() {
            Some(inner) => Some(Box::new(format!("{hint}\n{inner}"))),
            None => Some(Box::new(hint)),
        }
    }
}
