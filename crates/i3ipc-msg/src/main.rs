//! i3ipc-msg
//!
//! Sends messages to i3 over its IPC socket and prints the replies as JSON.
//! `monitor` subscribes to events and prints them until i3 goes away.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use i3ipc_client::{ClientConfig, Connection, Event, EventCategory, EventKind};
use miette::IntoDiagnostic;
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(name = "i3ipc-msg")]
#[command(about = "Send messages to i3 and watch its events")]
#[command(version)]
struct Cli {
    /// Path to the i3 IPC socket (default: $I3SOCK, then `i3 --get-socketpath`)
    #[arg(short, long)]
    socket: Option<String>,

    /// Window manager binary asked for the socket path
    #[arg(long, default_value = i3ipc_client::DEFAULT_WM_BINARY)]
    wm_binary: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run i3 commands, e.g. `workspace 2`
    Command {
        #[arg(required = true, trailing_var_arg = true)]
        text: Vec<String>,
    },

    /// List workspaces
    Workspaces {
        /// Group by output
        #[arg(long)]
        by_output: bool,
    },

    /// List outputs
    Outputs {
        /// Only outputs in use
        #[arg(long)]
        active: bool,
    },

    /// Print the layout tree
    Tree {
        /// Only print the focused container
        #[arg(long)]
        focused: bool,
    },

    /// List container marks
    Marks,

    /// Print the running i3 version
    Version,

    /// List bar ids, or print one bar's configuration
    BarConfig { id: Option<String> },

    /// Print events until i3 closes the connection or Ctrl-C
    Monitor {
        /// Event kinds to watch (default: all)
        #[arg(short, long = "event", value_parser = parse_event_kind)]
        events: Vec<EventKind>,
    },
}

fn parse_event_kind(name: &str) -> Result<EventKind, String> {
    EventKind::ALL
        .into_iter()
        .find(|kind| kind.name() == name)
        .ok_or_else(|| {
            let known: Vec<_> = EventKind::ALL.iter().map(|kind| kind.name()).collect();
            format!("unknown event `{name}`, expected one of: {}", known.join(", "))
        })
}

#[tokio::main]
async fn main() -> miette::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = ClientConfig::from_env().with_wm_binary(cli.wm_binary);
    if let Some(socket) = &cli.socket {
        // Expand tilde in socket path
        let path: PathBuf = shellexpand::tilde(socket).into_owned().into();
        config = config.with_socket_path(path);
    }

    let conn = Connection::attach_with(config).await?;
    let reader = conn.spawn();

    let result = match cli.command {
        Commands::Command { text } => cmd_command(&conn, &text.join(" ")).await,
        Commands::Workspaces { by_output } => {
            if by_output {
                print_json(&conn.workspaces_per_output().await?)
            } else {
                print_json(&conn.workspaces().await?)
            }
        }
        Commands::Outputs { active } => {
            if active {
                print_json(&conn.active_outputs().await?)
            } else {
                print_json(&conn.outputs().await?)
            }
        }
        Commands::Tree { focused } => {
            let tree = conn.tree().await?;
            if focused {
                let node = tree
                    .find_focused()
                    .ok_or_else(|| miette::miette!("no focused container"))?;
                print_json(node)
            } else {
                print_json(&tree)
            }
        }
        Commands::Marks => print_json(&conn.marks().await?),
        Commands::Version => print_json(&conn.version().await?),
        Commands::BarConfig { id: None } => print_json(&conn.bar_ids().await?),
        Commands::BarConfig { id: Some(id) } => print_json(&conn.bar_config(&id).await?),
        Commands::Monitor { events } => return cmd_monitor(conn, reader, events).await,
    };

    conn.close().await;
    reader.await.into_diagnostic()??;
    result
}

async fn cmd_command(conn: &Connection, text: &str) -> miette::Result<()> {
    let results = conn.command_results(text).await?;
    print_json(&results)?;

    if let Some(failed) = results.iter().find(|reply| !reply.success) {
        miette::bail!(
            "i3 rejected the command: {}",
            failed.error.as_deref().unwrap_or("no reason given")
        );
    }
    Ok(())
}

async fn cmd_monitor(
    conn: Connection,
    reader: tokio::task::JoinHandle<Result<(), i3ipc_client::IpcError>>,
    mut events: Vec<EventKind>,
) -> miette::Result<()> {
    if events.is_empty() {
        events = EventKind::ALL.to_vec();
    }
    let mut seen = Vec::with_capacity(events.len());
    events.retain(|kind| {
        let first = !seen.contains(kind);
        seen.push(*kind);
        first
    });

    for category in EventCategory::ALL {
        if events.contains(&category.kind()) {
            conn.events().on(category, print_event);
        }
    }

    if !conn.subscribe(&events).await? {
        miette::bail!("i3 refused the subscription");
    }

    tokio::select! {
        result = reader => {
            result.into_diagnostic()??;
        }
        _ = tokio::signal::ctrl_c() => {
            conn.close().await;
        }
    }
    Ok(())
}

fn print_event(event: &Event) {
    let json = match event {
        Event::Workspace(ws) => serde_json::to_string(ws),
        Event::Output => Ok("{}".to_string()),
        Event::Mode(mode) => serde_json::to_string(mode),
        Event::Window(window) => serde_json::to_string(window),
    };

    match json {
        Ok(json) => println!("{} {}", event.kind(), json),
        Err(e) => tracing::warn!(error = %e, "Failed to format event"),
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> miette::Result<()> {
    let json = serde_json::to_string_pretty(value).into_diagnostic()?;
    println!("{json}");
    Ok(())
}
