//! Interactive shell for the replicated key-value store.
//!
//! A thin line-oriented REPL over [`qkv_client::Client`]: every command
//! either bypasses quorum entirely (`rpc`, `mcast`), drives the
//! traversal engine (`qc`, `reconf`), or inspects/updates local client
//! state (`nodes`, `cfg`). None of this is part of the replicated
//! protocol itself — see `qkv-client` and `qkv-store` for that.

use std::process;
use std::sync::Arc;

use rustyline::error::ReadlineError;
use rustyline::Editor;

use qkv_client::{Client, GrpcTransport};

const HELP: &str = r#"
This interface allows you to run RPCs and quorum calls against the storage
replicas interactively.

help                            Show this text
exit, quit                      Exit the program
nodes                           Print the list of bootstrap nodes
rpc    <node index> <op> ...    Execute an RPC on a single node
qc     <op> ...                 Execute a quorum call
mcast  <key> <value>            Multicast write (fire-and-forget)
cfg    <descriptor>             Replace the default configuration
reconf <descriptor>             Reconfigure to a new set of nodes

Operations:

read  <key>         Read a value
write <key> <value> Write a value
list                List known keys

Examples:

> rpc 0 write foo bar
> qc read foo
> cfg 1:3
> reconf 0,2
"#;

/// Shell for the replicated key-value store.
#[derive(clap::Parser)]
#[clap(name = "qkv-shell")]
struct Args {
    /// Bootstrap replica addresses, e.g. 127.0.0.1:7070 127.0.0.1:7071.
    #[clap(required = true)]
    nodes: Vec<String>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args: Args = clap::Parser::parse();
    let client = Client::new(args.nodes, Arc::new(GrpcTransport::new()));

    println!("{HELP}");
    let mut rl: Editor<()> = Editor::new().expect("failed to initialize line editor");
    loop {
        match rl.readline("> ") {
            Ok(line) => {
                rl.add_history_entry(line.as_str());
                let Some(args) = split(&line) else { continue };
                if args.is_empty() {
                    continue;
                }
                if dispatch(&client, &args).await {
                    return;
                }
            }
            Err(ReadlineError::Eof) | Err(ReadlineError::Interrupted) => return,
            Err(err) => {
                eprintln!("failed to read line: {err}");
                process::exit(1);
            }
        }
    }
}

fn split(line: &str) -> Option<Vec<String>> {
    match shlex::split(line) {
        Some(args) => Some(args),
        None => {
            eprintln!("failed to split command");
            None
        }
    }
}

/// Runs one command. Returns `true` when the shell should exit.
async fn dispatch(client: &Client, args: &[String]) -> bool {
    match args[0].as_str() {
        "exit" | "quit" => return true,
        "help" => println!("{HELP}"),
        "nodes" => {
            for (i, addr) in client.nodes().iter().enumerate() {
                println!("{i}: {addr}");
            }
        }
        "rpc" => rpc(client, &args[1..]).await,
        "qc" => qc(client, &args[1..]).await,
        "mcast" => mcast(client, &args[1..]).await,
        "cfg" => cfg(client, &args[1..]).await,
        "reconf" => reconf(client, &args[1..]).await,
        other => println!("Unknown command '{other}'. Type 'help' to see available commands."),
    }
    false
}

async fn rpc(client: &Client, args: &[String]) {
    if args.len() < 2 {
        println!("'rpc' requires a node index and an operation.");
        return;
    }
    let index: usize = match args[0].parse() {
        Ok(i) => i,
        Err(_) => {
            println!("Invalid index '{}'. Must be numeric.", args[0]);
            return;
        }
    };
    match args[1].as_str() {
        "read" => {
            let Some(key) = args.get(2) else {
                println!("Read requires a key.");
                return;
            };
            match client.unicast_read(index, key).await {
                Ok(resp) if resp.ok => println!("{key} = {}", resp.value),
                Ok(_) => println!("{key} was not found"),
                Err(err) => println!("Read RPC finished with error: {err}"),
            }
        }
        "write" => {
            let (Some(key), Some(value)) = (args.get(2), args.get(3)) else {
                println!("Write requires a key and a value.");
                return;
            };
            match client.unicast_write(index, key, value).await {
                Ok(resp) if resp.new => println!("Write OK"),
                Ok(_) => println!("Failed to update {key}: timestamp too old."),
                Err(err) => println!("Write RPC finished with error: {err}"),
            }
        }
        "list" => match client.unicast_list(index).await {
            Ok(resp) => print_keys(&resp.keys),
            Err(err) => println!("ListKeys RPC finished with error: {err}"),
        },
        other => println!("Unknown rpc operation '{other}'."),
    }
}

async fn qc(client: &Client, args: &[String]) {
    if args.is_empty() {
        println!("'qc' requires an operation.");
        return;
    }
    match args[0].as_str() {
        "read" => {
            let Some(key) = args.get(1) else {
                println!("Read requires a key.");
                return;
            };
            match client.read(key).await {
                Ok(resp) if resp.ok => println!("{key} = {}", resp.value),
                Ok(_) => println!("{key} was not found"),
                Err(err) => println!("Read quorum call finished with error: {err}"),
            }
        }
        "write" => {
            let (Some(key), Some(value)) = (args.get(1), args.get(2)) else {
                println!("Write requires a key and a value.");
                return;
            };
            match client.write(key, value).await {
                Ok(resp) if resp.new => println!("Write OK"),
                Ok(_) => println!("Failed to update {key}: timestamp too old."),
                Err(err) => println!("Write quorum call finished with error: {err}"),
            }
        }
        "list" => match client.list().await {
            Ok(resp) => print_keys(&resp.keys),
            Err(err) => println!("ListKeys quorum call finished with error: {err}"),
        },
        other => println!("Unknown qc operation '{other}'."),
    }
}

async fn mcast(client: &Client, args: &[String]) {
    let (Some(key), Some(value)) = (args.first(), args.get(1)) else {
        println!("'mcast' requires a key and a value.");
        return;
    };
    client.multicast_write(key, value).await;
    println!("Multicast OK (replica output not synchronized)");
}

async fn cfg(client: &Client, args: &[String]) {
    let Some(descriptor) = args.first() else {
        println!("'cfg' requires a configuration.");
        return;
    };
    if let Err(err) = client.set_default_config(descriptor).await {
        println!("{err}");
    }
}

async fn reconf(client: &Client, args: &[String]) {
    let Some(descriptor) = args.first() else {
        println!("'reconf' requires a configuration.");
        return;
    };
    match client.reconf(descriptor).await {
        Ok(()) => println!("Reconfiguration finished"),
        Err(err) => println!("Reconfiguration failed: {err}"),
    }
}

fn print_keys(keys: &[String]) {
    if keys.is_empty() {
        println!("No keys found.");
    } else {
        println!("Keys found: {}", keys.join(", "));
    }
}
