use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;

use coordstore::CoordinationStore;
use coordstore::cli::{Cli, Command};
use coordstore::config::Config;
use coordstore::path;

fn setup_logging() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Warn)
        .init();
    Ok(())
}

fn print_tree(store: &CoordinationStore, node: &str, depth: usize) -> Result<()> {
    let label = if depth == 0 { node } else { path::name(node) };
    println!("{}{}", "  ".repeat(depth), label.cyan());
    for child in store.children(node)? {
        print_tree(store, &path::join(node, &child), depth + 1)?;
    }
    Ok(())
}

fn main() -> Result<()> {
    setup_logging().context("Failed to setup logging")?;

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    let store_path = cli.store.unwrap_or(config.store_path.clone());

    info!("coordstore opening {}", store_path.display());
    let store = CoordinationStore::open_sqlite(&store_path, config.busy_timeout())
        .context(format!("Failed to open store at {}", store_path.display()))?;

    match cli.command {
        Command::Ls { path } => {
            for child in store.children(&path)? {
                println!("{}", child);
            }
        }
        Command::Get { path } => match store.read_bytes(&path)? {
            Some(data) => println!("{}", String::from_utf8_lossy(&data)),
            None => {
                eprintln!("{} No such node: {}", "✗".red(), path);
                std::process::exit(1);
            }
        },
        Command::Stat { path } => match store.stat(&path)? {
            Some(stat) => {
                println!("Node: {}", path.cyan());
                println!("  version: {}", stat.version);
                println!("  cversion: {}", stat.cversion);
                println!("  ctime_ms: {}", stat.ctime_ms);
                println!("  mtime_ms: {}", stat.mtime_ms);
                println!("  children: {}", stat.num_children);
            }
            None => {
                eprintln!("{} No such node: {}", "✗".red(), path);
                std::process::exit(1);
            }
        },
        Command::Set { path, value } => {
            store.write_bytes(&path, value.into_bytes())?;
            println!("{} Wrote {}", "✓".green(), path.cyan());
        }
        Command::Rm { path, recursive } => {
            if store.delete(&path, recursive)? {
                println!("{} Deleted {}", "✓".green(), path);
            } else {
                println!("Nothing to delete at {}", path);
            }
        }
        Command::Tree { path } => {
            print_tree(&store, &path, 0)?;
        }
    }

    Ok(())
}
