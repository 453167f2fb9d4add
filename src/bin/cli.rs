//! burrowkv CLI Client
//!
//! Command-line interface for a running burrowkv server.

use std::fs::File;
use std::io::BufWriter;
use std::process::ExitCode;

use burrowkv::network::Client;
use burrowkv::Result;
use clap::{Parser, Subcommand};

/// burrowkv CLI
#[derive(Parser, Debug)]
#[command(name = "burrowkv-cli")]
#[command(about = "CLI for the burrowkv key-value store")]
struct Args {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:8080")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get a value by key
    Get {
        /// The key to get
        key: String,
    },

    /// Set a key-value pair
    Set {
        /// The key to set
        key: String,

        /// The value to set
        value: String,
    },

    /// Delete a key
    Del {
        /// The key to delete
        key: String,
    },

    /// List pairs whose key starts with a prefix
    List {
        /// Key prefix (empty lists everything)
        #[arg(default_value = "")]
        prefix: String,
    },

    /// Download a consistent copy of the database file
    Backup {
        /// Output file
        output: String,
    },

    /// Show store counters
    Stats,

    /// Ping the server
    Ping,
}

fn main() -> ExitCode {
    let args = Args::parse();

    match run(args) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("(error) {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<ExitCode> {
    let mut client = Client::connect(&args.server)?;

    match args.command {
        Commands::Get { key } => match client.get(key.as_bytes())? {
            Some(value) => println!("{}", String::from_utf8_lossy(&value)),
            None => {
                println!("(nil)");
                return Ok(ExitCode::from(1));
            }
        },
        Commands::Set { key, value } => {
            client.put(key.as_bytes(), value.as_bytes())?;
            println!("OK");
        }
        Commands::Del { key } => {
            let removed = client.delete(key.as_bytes())?;
            println!("(integer) {}", u8::from(removed));
        }
        Commands::List { prefix } => {
            for (key, value) in client.list(prefix.as_bytes())? {
                println!(
                    "{} = {}",
                    String::from_utf8_lossy(&key),
                    String::from_utf8_lossy(&value)
                );
            }
        }
        Commands::Backup { output } => {
            let mut sink = BufWriter::new(File::create(&output)?);
            let written = client.backup_to(&mut sink)?;
            println!("Wrote {} bytes to {}", written, output);
        }
        Commands::Stats => {
            let stats = client.stats()?;
            println!("txid:          {}", stats.txid);
            println!("page_size:     {}", stats.page_size);
            println!("page_count:    {}", stats.page_count);
            println!("free_pages:    {}", stats.free_pages);
            println!("pending_pages: {}", stats.pending_pages);
            println!("open_readers:  {}", stats.open_readers);
        }
        Commands::Ping => {
            client.ping()?;
            println!("PONG");
        }
    }

    Ok(ExitCode::SUCCESS)
}
