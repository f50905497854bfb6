use agentdeck::analytics::{format_tokens, SessionAnalytics};
use agentdeck::config;
use agentdeck::integrations::models;
use agentdeck::session::{Instance, InstanceRegistry, NewInstance, Tool};
use agentdeck::tmux::TmuxClient;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "agentdeck")]
#[command(about = "Run AI coding agents in tmux and keep track of them")]
#[command(version)]
struct Args {
    /// Path to config file
    #[arg(long, short)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create and start a new instance
    New {
        name: String,
        /// shell, claude, gemini or codex
        #[arg(long, short, default_value = "shell")]
        tool: Tool,
        /// Working directory (defaults to the current one)
        #[arg(long, short)]
        dir: Option<PathBuf>,
        /// Start with auto-approve on
        #[arg(long, conflicts_with = "no_yolo")]
        yolo: bool,
        /// Start with auto-approve off
        #[arg(long)]
        no_yolo: bool,
        /// Model to run (Gemini only)
        #[arg(long, short)]
        model: Option<String>,
    },
    /// List instances found in tmux
    List,
    /// Toggle auto-approve mode
    Yolo {
        name: String,
        /// Relaunch the agent so the new mode takes effect now
        #[arg(long)]
        restart: bool,
    },
    /// Set or clear the model and relaunch if running
    Model {
        name: String,
        /// Model id; omit to go back to the agent's default
        model: Option<String>,
    },
    /// Kill and relaunch an instance
    Restart { name: String },
    /// Kill an instance
    Kill { name: String },
    /// Show usage for an instance
    Analytics { name: String },
    /// List available Gemini models
    Models,
    /// Attach this terminal to an instance
    Attach { name: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("agentdeck=info".parse()?),
        )
        .init();

    if let Command::Models = args.command {
        for model in models::get_available_models().await {
            println!("{model}");
        }
        return Ok(());
    }

    let config = config::load(args.config.as_deref())?;
    let tmux = TmuxClient::with_binary(config.tmux.binary.clone());
    if !tmux.is_available() {
        anyhow::bail!("tmux binary '{}' is not available", config.tmux.binary);
    }

    let mut registry = InstanceRegistry::new(Arc::new(tmux), config);
    registry
        .recover()
        .context("Failed to list tmux sessions")?;

    match args.command {
        Command::New {
            name,
            tool,
            dir,
            yolo,
            no_yolo,
            model,
        } => {
            let cwd = std::env::current_dir().context("Failed to read current directory")?;
            let workdir = match dir {
                Some(d) if d.is_absolute() => d,
                Some(d) => cwd.join(d),
                None => cwd,
            };
            let yolo_mode = match (yolo, no_yolo) {
                (true, _) => Some(true),
                (_, true) => Some(false),
                _ => None,
            };

            let instance = registry.create(NewInstance {
                name,
                workdir,
                tool,
                yolo_mode,
                model,
            })?;
            instance.start()?;
            println!(
                "Started {} ({}) in tmux session {}",
                instance.name(),
                instance.tool(),
                instance.tmux_name()
            );
        }
        Command::List => {
            let names: Vec<String> = registry.list().iter().map(|i| i.name().to_string()).collect();
            for name in &names {
                if let Err(e) = registry.refresh(name) {
                    tracing::debug!("Analytics unavailable for {}: {}", name, e);
                }
            }
            if registry.is_empty() {
                println!("No instances running");
            }
            for instance in registry.list() {
                print_row(instance);
            }
        }
        Command::Yolo { name, restart } => {
            let enabled = registry.toggle_yolo(&name, restart)?;
            let state = if enabled { "on" } else { "off" };
            if restart {
                println!("Auto-approve {state} for {name} (restarted)");
            } else {
                println!("Auto-approve {state} for {name}; restart to apply");
            }
        }
        Command::Model { name, model } => {
            registry.set_model(&name, model.as_deref())?;
            match model {
                Some(m) => println!("{name} now runs {m}"),
                None => println!("{name} now runs the default model"),
            }
        }
        Command::Restart { name } => {
            lookup(&mut registry, &name)?.restart()?;
            println!("Restarted {name}");
        }
        Command::Kill { name } => {
            registry.kill(&name)?;
            println!("Killed {name}");
        }
        Command::Analytics { name } => {
            registry.refresh(&name)?;
            let instance = lookup(&mut registry, &name)?;
            print_analytics(&instance.analytics());
        }
        Command::Attach { name } => {
            let argv = lookup(&mut registry, &name)?.attach_command();
            let (program, rest) = argv
                .split_first()
                .context("Empty attach command")?;
            let status = std::process::Command::new(program)
                .args(rest)
                .status()
                .with_context(|| format!("Failed to run {program}"))?;
            if !status.success() {
                anyhow::bail!("{program} exited with {status}");
            }
        }
        Command::Models => unreachable!("handled before tmux setup"),
    }

    Ok(())
}

fn lookup<'a>(registry: &'a mut InstanceRegistry, name: &str) -> Result<&'a mut Instance> {
    registry
        .get_mut(name)
        .with_context(|| format!("No instance named '{name}'"))
}

fn print_row(instance: &Instance) {
    let yolo = if instance.tool().supports_yolo() {
        if instance.effective_yolo() {
            "yolo"
        } else {
            "-"
        }
    } else {
        ""
    };
    let analytics = instance.analytics();
    let usage = if analytics.is_empty() {
        String::new()
    } else {
        format!(
            "{} turns, {} tokens",
            analytics.total_turns,
            format_tokens(analytics.total_tokens())
        )
    };
    println!(
        "{:<20} {:<7} {:<8} {:<5} {}",
        instance.name(),
        instance.tool(),
        instance.status(),
        yolo,
        usage
    );
}

fn print_analytics(analytics: &SessionAnalytics) {
    if analytics.is_empty() {
        println!("No transcript found yet");
        return;
    }
    println!("Session:   {}", analytics.session_id);
    if let Some(model) = &analytics.model {
        println!("Model:     {model}");
    }
    if let Some(start) = analytics.start_time {
        println!("Started:   {}", start.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    if let Some(duration) = analytics.duration() {
        println!("Duration:  {}m", duration.num_minutes());
    }
    println!("Turns:     {}", analytics.total_turns);
    println!("Messages:  {}", analytics.message_count);
    println!(
        "Tokens:    {} in / {} out",
        format_tokens(analytics.input_tokens),
        format_tokens(analytics.output_tokens)
    );
    println!(
        "Context:   {}",
        format_tokens(analytics.current_context_tokens)
    );
}
