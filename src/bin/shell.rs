//! certkv Shell
//!
//! Line-oriented driver for a storage instance over an in-memory cluster.
//!
//! ```text
//! store certificates/a.crt hello
//! list certificates -r
//! lock issue/a
//! ```

use std::process;
use std::sync::Arc;
use std::time::Duration;

use certkv::backend::MemoryNode;
use certkv::{CertStorage, Config, Context, ReplicaRouting, Storage};
use clap::Parser;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing_subscriber::{fmt, EnvFilter};

/// certkv Shell
#[derive(Parser, Debug)]
#[command(name = "certkv-shell")]
#[command(about = "Interactive shell over an in-memory certkv cluster")]
#[command(version)]
struct Args {
    /// Number of in-memory nodes taking part in locking
    #[arg(short, long, default_value = "3")]
    nodes: usize,

    /// Lock acknowledgement quorum
    #[arg(short, long, default_value = "2")]
    quorum: usize,

    /// Keys examined per SCAN round
    #[arg(short, long, default_value = "50")]
    scan_count: usize,

    /// Replica routing policy (none | readonly)
    #[arg(short, long, default_value = "none")]
    routing: String,

    /// Per-command timeout in milliseconds
    #[arg(short, long, default_value = "5000")]
    timeout_ms: u64,
}

/// One parsed input line
#[derive(Debug, PartialEq, Eq)]
enum ShellCommand {
    Store { key: String, value: String },
    Load { key: String },
    Delete { key: String },
    Exists { key: String },
    List { prefix: String, recursive: bool },
    Stat { key: String },
    Lock { name: String },
    Unlock { name: String },
    Held,
    Help,
    Quit,
}

const USAGE: &str = "\
commands:
  store <key> <value...>   write a value
  load <key>               read a value
  delete <key>             remove a key
  exists <key>             check a key
  list [prefix] [-r]       list children (or all keys with -r)
  stat <key>               show metadata
  lock <name>              acquire a lock
  unlock <name>            release a lock
  held                     show held locks
  help | quit";

#[tokio::main]
async fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,certkv=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let routing: ReplicaRouting = match args.routing.parse() {
        Ok(r) => r,
        Err(e) => {
            tracing::error!("{}", e);
            process::exit(2);
        }
    };

    let config = Config::builder()
        .lock_quorum(args.quorum)
        .scan_count(args.scan_count)
        .replica_routing(routing)
        .build();

    let nodes: Vec<Arc<MemoryNode>> = (0..args.nodes)
        .map(|i| Arc::new(MemoryNode::new(format!("node-{}", i))))
        .collect();

    let storage = match Storage::open_in_memory(config, &nodes) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("Failed to open storage: {}", e);
            process::exit(1);
        }
    };

    tracing::info!("certkv shell v{} ({} nodes)", certkv::VERSION, args.nodes);
    println!("{}", USAGE);

    let timeout = Duration::from_millis(args.timeout_ms);
    let outcome = repl(&storage, timeout, BufReader::new(tokio::io::stdin())).await;

    if let Err(e) = storage.close().await {
        tracing::error!("Close failed: {}", e);
        process::exit(1);
    }
    if let Err(e) = outcome {
        tracing::error!("Shell stopped: {}", e);
        process::exit(1);
    }
}

/// Read and run commands until `quit` or end of input
///
/// Unreadable input (including invalid UTF-8) stops the shell with
/// [`certkv::StorageError::Io`].
async fn repl<R>(storage: &Storage, timeout: Duration, input: R) -> certkv::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();

    while let Some(line) = lines.next_line().await? {
        let command = match parse_line(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(message) => {
                println!("error: {}", message);
                continue;
            }
        };

        if command == ShellCommand::Quit {
            break;
        }

        let ctx = Context::with_timeout(timeout);
        execute(storage, &ctx, command).await;
    }

    Ok(())
}

/// Parse one input line; blank lines yield `None`
fn parse_line(line: &str) -> Result<Option<ShellCommand>, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };

    let mut required = |what: &str| {
        words
            .next()
            .map(str::to_string)
            .ok_or_else(|| format!("{} requires <{}>", verb, what))
    };

    let command = match verb {
        "store" => {
            let key = required("key")?;
            let value: Vec<&str> = line.split_whitespace().skip(2).collect();
            if value.is_empty() {
                return Err("store requires <value>".to_string());
            }
            ShellCommand::Store {
                key,
                value: value.join(" "),
            }
        }
        "load" => ShellCommand::Load { key: required("key")? },
        "delete" => ShellCommand::Delete { key: required("key")? },
        "exists" => ShellCommand::Exists { key: required("key")? },
        "stat" => ShellCommand::Stat { key: required("key")? },
        "lock" => ShellCommand::Lock { name: required("name")? },
        "unlock" => ShellCommand::Unlock { name: required("name")? },
        "list" => {
            let mut prefix = String::new();
            let mut recursive = false;
            for word in line.split_whitespace().skip(1) {
                match word {
                    "-r" | "--recursive" => recursive = true,
                    other => prefix = other.to_string(),
                }
            }
            ShellCommand::List { prefix, recursive }
        }
        "held" => ShellCommand::Held,
        "help" => ShellCommand::Help,
        "quit" | "exit" => ShellCommand::Quit,
        other => return Err(format!("unknown command '{}'", other)),
    };

    Ok(Some(command))
}

/// Run one command and print its outcome
async fn execute(storage: &Storage, ctx: &Context, command: ShellCommand) {
    let outcome: certkv::Result<String> = match command {
        ShellCommand::Store { key, value } => storage
            .store(ctx, &key, value.as_bytes())
            .await
            .map(|_| "OK".to_string()),
        ShellCommand::Load { key } => storage
            .load(ctx, &key)
            .await
            .map(|v| String::from_utf8_lossy(&v).into_owned()),
        ShellCommand::Delete { key } => storage.delete(ctx, &key).await.map(|_| "OK".to_string()),
        ShellCommand::Exists { key } => Ok(storage.exists(ctx, &key).await.to_string()),
        ShellCommand::List { prefix, recursive } => storage
            .list(ctx, &prefix, recursive)
            .await
            .map(|keys| if keys.is_empty() { "(empty)".to_string() } else { keys.join("\n") }),
        ShellCommand::Stat { key } => storage.stat(ctx, &key).await.map(|info| {
            format!(
                "key={} size={} modified={} terminal={}",
                info.key,
                info.size,
                info.modified.to_rfc3339(),
                info.is_terminal
            )
        }),
        ShellCommand::Lock { name } => storage.lock(ctx, &name).await.map(|_| "locked".to_string()),
        ShellCommand::Unlock { name } => storage.unlock(&name).await.map(|_| "unlocked".to_string()),
        ShellCommand::Held => {
            let held = storage.held_locks();
            Ok(if held.is_empty() { "(none)".to_string() } else { held.join("\n") })
        }
        ShellCommand::Help => Ok(USAGE.to_string()),
        ShellCommand::Quit => Ok(String::new()),
    };

    match outcome {
        Ok(text) => println!("{}", text),
        Err(e) if e.is_not_found() => println!("(not found)"),
        Err(e) => println!("error: {}", e),
    }
}
