use std::sync::Arc;

use anyhow::{bail, Context, Result};
use is_terminal::IsTerminal;
use owo_colors::OwoColorize;
use tracing_subscriber::EnvFilter;

use scriptdeck::argument::ArgTag;
use scriptdeck::cli::{Cli, Command};
use scriptdeck::config::Config;
use scriptdeck::controller::SessionController;
use scriptdeck::descriptor::parse_descriptor;
use scriptdeck::errorlog::FileErrorLog;
use scriptdeck::library::{DirLibrary, ScriptLibrary};
use scriptdeck::session::stream::{CustomKind, OutputRecord};
use scriptdeck::store::ArgumentStore;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("scriptdeck=warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Cli::parse();

    let mut cfg = Config::load();
    if let Some(root) = &args.script_root {
        cfg.set("SCRIPT_ROOT", root.clone());
    }
    if let Some(pwsh) = &args.pwsh {
        cfg.set("PWSH_BIN", pwsh.clone());
    }

    let library = Arc::new(DirLibrary::from_config(&cfg));

    match args.command {
        Command::List => list(library.as_ref()),
        Command::Show { category, script } => show(library.as_ref(), &category, &script),
        Command::Run {
            category,
            script,
            args,
            b64_passwords,
        } => run(cfg, library, &category, &script, &args, b64_passwords).await,
    }
}

fn list(library: &DirLibrary) -> Result<()> {
    let categories = library.categories();
    if categories.is_empty() {
        bail!(
            "no script categories under {} (set --script-root or SCRIPT_ROOT)",
            library.root().display()
        );
    }
    for category in categories {
        println!("{}", category.bold());
        for script in library.scripts(&category) {
            println!("  {script}");
        }
    }
    Ok(())
}

fn show(library: &DirLibrary, category: &str, script: &str) -> Result<()> {
    let path = library.resolve(category, script);
    let parsed = parse_descriptor(&path)?;

    let d = &parsed.descriptor;
    println!("{}", d.title.bold());
    if !d.description.is_empty() {
        println!("{}", d.description);
    }
    println!("produces output: {}", d.produces_output);
    if !d.definitions.is_empty() {
        println!();
        for def in &d.definitions {
            println!(
                "  [{}] {}  {}",
                def.tag.as_str(),
                def.key.bold(),
                def.description
            );
        }
    }
    for diagnostic in &parsed.diagnostics {
        eprintln!("{}", diagnostic.to_string().yellow());
    }
    Ok(())
}

async fn run(
    cfg: Config,
    library: Arc<DirLibrary>,
    category: &str,
    script: &str,
    bindings: &[String],
    b64_passwords: bool,
) -> Result<()> {
    let error_log = Arc::new(FileErrorLog::create(cfg.error_log_path()));
    let mut controller = SessionController::new(cfg, library, error_log);

    if !controller.categories().iter().any(|c| c == category) {
        bail!("unknown category '{category}'");
    }
    controller.select_category(category);
    controller
        .select_script(script)
        .with_context(|| format!("cannot select script '{script}'"))?;

    for binding in bindings {
        let Some((key, value)) = binding.split_once('=') else {
            bail!("argument binding '{binding}' is not KEY=VALUE");
        };
        let is_password = controller
            .store()
            .get(key)
            .is_some_and(|v| v.tag() == ArgTag::Password);
        let committed = if b64_passwords && is_password {
            controller.set_argument_base64(key, value)
        } else {
            controller.set_argument(key, value)
        };
        if !committed {
            bail!("value for '{key}' was rejected (unknown key or wrong shape)");
        }
    }

    if !controller.readiness() {
        bail!(
            "not ready to execute: {}",
            readiness_gaps(controller.store()).join("; ")
        );
    }

    let use_color = std::io::stdout().is_terminal();
    let mut handle = controller.start()?;

    // Ctrl-C requests cooperative cancellation; a second one is left to the
    // terminal once the run has exited.
    let session = controller.session();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("stopping...");
            session.cancel();
        }
    });

    while let Some(record) = handle.records.recv().await {
        render(&record, use_color);
    }
    let outcome = handle.done.await.context("supervision task failed")?;

    if outcome.cancelled {
        eprintln!("run cancelled");
    }
    controller.clear_session().await;

    if let Some(code) = outcome.exit_code {
        if code != 0 {
            std::process::exit(code);
        }
    }
    Ok(())
}

/// Human explanation for each unmet readiness rule.
fn readiness_gaps(store: &ArgumentStore) -> Vec<String> {
    let mut gaps = Vec::new();
    for value in store.values() {
        if value.tag().is_free_text() && value.is_empty() {
            gaps.push(format!("'{}' must not be empty", value.key()));
        }
    }
    let radios: Vec<_> = store.values_of(ArgTag::RadioButton).collect();
    if !radios.is_empty() && !radios.iter().any(|v| v.value() == "true") {
        let keys: Vec<&str> = radios.iter().map(|v| v.key()).collect();
        gaps.push(format!("select one of: {}", keys.join(", ")));
    }
    if gaps.is_empty() {
        gaps.push("a run is already in progress".into());
    }
    gaps
}

fn render(record: &OutputRecord, use_color: bool) {
    match record {
        OutputRecord::Raw(line) => println!("{line}"),
        OutputRecord::Custom { text, kind } => match kind {
            CustomKind::Output if use_color => println!("{}", text.green()),
            CustomKind::Error if use_color => println!("{}", text.red()),
            _ => println!("{text}"),
        },
        OutputRecord::Progress { percent, operation } => {
            if use_color {
                println!("{}", format!("[{percent:>3}%] {operation}").dimmed());
            } else {
                println!("[{percent:>3}%] {operation}");
            }
        }
        // The exception text already surfaced as a custom error record and
        // the remaining fields are diagnostic-only (error log, raw buffer).
        OutputRecord::ErrorDetail(_) => {}
    }
}
