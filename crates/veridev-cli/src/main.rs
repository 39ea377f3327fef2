//! veridev CLI - dm-verity device lifecycle operations.

use clap::{Parser, Subcommand};

mod commands;

use commands::{check, remove, setup};

#[derive(Parser)]
#[command(name = "veridev")]
#[command(about = "Set up, check, and remove dm-verity devices")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Set up a verity device and leave it active
    Setup {
        /// Backing block device carrying data plus appended hash tree
        lower_dev: String,
        /// Hex-encoded root digest of the hash tree
        #[arg(long)]
        root_hash: String,
        /// Hex-encoded salt of the hashing scheme
        #[arg(long)]
        salt: String,
        /// Size of the verified data region in bytes (multiple of 4096)
        #[arg(long)]
        data_size: u64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Set up a verity device, then remove it again
    Check {
        /// Backing block device carrying data plus appended hash tree
        lower_dev: String,
        /// Hex-encoded root digest of the hash tree
        #[arg(long)]
        root_hash: String,
        /// Hex-encoded salt of the hashing scheme
        #[arg(long)]
        salt: String,
        /// Size of the verified data region in bytes (multiple of 4096)
        #[arg(long)]
        data_size: u64,
        /// Defer the removal until the node has no openers
        #[arg(long)]
        deferred: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove a device left behind by setup, by correlation uuid
    Remove {
        /// Correlation uuid printed by setup
        #[arg(long)]
        uuid: String,
        /// Defer the removal until the node has no openers
        #[arg(long)]
        deferred: bool,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Setup {
            lower_dev,
            root_hash,
            salt,
            data_size,
            json,
        } => setup::run(lower_dev, root_hash, salt, data_size, json),
        Commands::Check {
            lower_dev,
            root_hash,
            salt,
            data_size,
            deferred,
            json,
        } => check::run(lower_dev, root_hash, salt, data_size, deferred, json),
        Commands::Remove { uuid, deferred } => remove::run(uuid, deferred),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
