//! objmsg binary
//!
//! Run with: `objmsg [--config <file>] [--verbose] <demo | preview <class> <message>>`

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use objmsg::{Action, Config, Engine, HandlerDef, MutationOptions, OverrideExpr, Qualifier, SlotSpec, Value};

#[derive(Parser)]
#[command(name = "objmsg")]
#[command(about = "Message dispatch for a rule-engine object system")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the Box scenario and print every step
    Demo,

    /// Show the handler chain a send would run, using the demo classes
    Preview {
        /// Receiver class
        class: String,

        /// Message name
        message: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    let config = match &cli.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load configuration: {}", path.display()))?,
        None => Config::default(),
    };
    let mut engine = Engine::with_config(config);
    define_demo_classes(&mut engine)?;

    match cli.command {
        Commands::Demo => cmd_demo(&mut engine),
        Commands::Preview { class, message } => cmd_preview(&mut engine, &class, &message),
    }
}

/// `Box` with a `size` slot and an `area` handler, plus a `LabeledBox`
/// subclass that wraps `area` with around, before and after handlers.
fn define_demo_classes(engine: &mut Engine) -> Result<()> {
    let boxed = engine.define_class("Box", &[], vec![SlotSpec::single("size").default_value(Value::Integer(1))])?;
    let labeled = engine.define_class("LabeledBox", &["Box"], vec![SlotSpec::single("label")])?;

    let size = engine.intern("size");
    let area = engine.intern("area");
    let times = engine.intern("*");
    engine.define_handler(
        boxed,
        HandlerDef::new(area, Qualifier::Primary)
            .body(vec![Action::call(times, vec![Action::SelfSlot(size), Action::SelfSlot(size)])]),
    )?;
    engine.define_handler(
        labeled,
        HandlerDef::new(area, Qualifier::Around).body(vec![Action::CallNextHandler]),
    )?;
    engine.define_handler(labeled, HandlerDef::new(area, Qualifier::Before))?;
    engine.define_handler(labeled, HandlerDef::new(area, Qualifier::After))?;
    engine.define_handler(labeled, HandlerDef::new(area, Qualifier::Primary).body(vec![Action::CallNextHandler]))?;
    Ok(())
}

fn cmd_demo(engine: &mut Engine) -> Result<()> {
    let size = engine.intern("size");

    step(engine, "make-instance box1", |engine| engine.make_instance("box1", "Box", Vec::new()))?;
    step(engine, "send [box1] area", |engine| engine.send_to("box1", "area", vec![]))?;

    info!("modifying box1 through an action so the override is evaluated");
    let modify = Action::modify(
        Action::Const(Value::InstanceName(engine.intern("box1"))),
        vec![OverrideExpr::new(size, vec![Action::int(5)])],
        MutationOptions::DIRECT,
    );
    step(engine, "modify-instance [box1] (size 5)", |engine| engine.eval(&modify))?;
    step(engine, "send [box1] area", |engine| engine.send_to("box1", "area", vec![]))?;

    let box1 = Value::InstanceName(engine.intern("box1"));
    step(engine, "duplicate-instance [box1] to box2 (size 2)", |engine| {
        engine.duplicate_instance(
            box1.clone(),
            Some("box2"),
            vec![objmsg::SlotOverride::set(size, Value::Integer(2))],
            MutationOptions::DIRECT,
        )
    })?;
    step(engine, "send [box2] area", |engine| engine.send_to("box2", "area", vec![]))?;
    step(engine, "send [box1] area", |engine| engine.send_to("box1", "area", vec![]))?;
    step(engine, "send [box1] print", |engine| engine.send_to("box1", "print", vec![]))?;
    Ok(())
}

fn step(engine: &mut Engine, label: &str, run: impl FnOnce(&mut Engine) -> Value) -> Result<()> {
    let result = run(engine);
    if engine.evaluation_error() {
        let errors: Vec<String> = engine.take_diagnostics().iter().map(ToString::to_string).collect();
        bail!("{label} failed: {}", errors.join("; "));
    }
    println!("{label} => {}", engine.render(&result));
    Ok(())
}

fn cmd_preview(engine: &mut Engine, class: &str, message: &str) -> Result<()> {
    let preview = engine
        .preview_send(class, message)
        .with_context(|| format!("Cannot preview {message} for class {class}"))?;
    print!("{preview}");
    Ok(())
}
