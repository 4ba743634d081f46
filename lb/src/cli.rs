//! CLI argument parsing for lborch

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::domain::UpstreamInfo;

#[derive(Parser, Debug)]
#[command(name = "lb")]
#[command(author, version, about = "Load-balancer configuration orchestrator", long_about = None)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,

    /// SQLite store file (overrides config)
    #[arg(short, long)]
    pub store: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Parse `host:port`, `host:port@group`, or a stored upstream node name
pub fn parse_upstream(s: &str) -> Result<UpstreamInfo, String> {
    let (address, group) = match s.rsplit_once('@') {
        Some((address, group)) => (address, Some(group)),
        None => (s, None),
    };
    let mut upstream = UpstreamInfo::parse(address).map_err(|e| e.to_string())?;
    upstream.original_path = None;
    if let Some(group) = group {
        upstream.group = group.to_string();
    }
    upstream.validate().map_err(|e| e.to_string())?;
    Ok(upstream)
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Submit a request to change a service's upstreams
    Submit {
        /// Service id
        #[arg(long, required = true)]
        service: String,

        /// Request id (generated when omitted)
        #[arg(long)]
        request_id: Option<String>,

        /// Replace the whole upstream set (host:port[@group])
        #[arg(long, value_parser = parse_upstream, conflicts_with_all = ["add", "remove"])]
        replace: Vec<UpstreamInfo>,

        /// Upstreams to add (host:port[@group])
        #[arg(long, value_parser = parse_upstream)]
        add: Vec<UpstreamInfo>,

        /// Upstreams to remove (host:port[@group])
        #[arg(long, value_parser = parse_upstream)]
        remove: Vec<UpstreamInfo>,

        /// Service base path
        #[arg(long)]
        base_path: Option<String>,

        /// Load balancer groups serving the service
        #[arg(long = "lb-group")]
        lb_groups: Vec<String>,

        /// Leave the stored service definition alone
        #[arg(long)]
        upstream_only: bool,
    },

    /// Show a request's state and message
    Status {
        /// Request id
        #[arg(required = true)]
        request_id: String,
    },

    /// Delete a request; a queued entry for it is then skipped
    Cancel {
        /// Request id
        #[arg(required = true)]
        request_id: String,
    },

    /// Inspect the request queue
    Queue {
        #[command(subcommand)]
        command: QueueCommand,
    },

    /// List service ids
    Services,

    /// Show one service and its upstreams
    Service {
        /// Service id
        #[arg(required = true)]
        service_id: String,
    },

    /// Remove a service and all of its upstreams
    RemoveService {
        /// Service id
        #[arg(required = true)]
        service_id: String,
    },

    /// Print the global state snapshot as JSON
    Snapshot,

    /// Print the current state version
    Version,

    /// Advance the state version without changing state
    BumpVersion,

    /// Drain the queue
    Worker {
        /// Run a single pass and exit
        #[arg(long)]
        once: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum QueueCommand {
    /// List queued entries in processing order
    List,
    /// Number of queued entries
    Size,
    /// Age of the oldest entry
    Age,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_upstream() {
        let upstream = parse_upstream("10.0.0.1:80@web").unwrap();
        assert_eq!(upstream.host, "10.0.0.1");
        assert_eq!(upstream.group, "web");
        assert_eq!(upstream.original_path, None);

        assert_eq!(parse_upstream("h:81").unwrap().group, "default");
        assert!(parse_upstream("h").is_err());
        assert!(parse_upstream("h:80@a|b").is_err());
    }

    #[test]
    fn test_cli_parses_submit() {
        let cli = Cli::try_parse_from([
            "lb", "submit", "--service", "svc-a", "--add", "h1:80@web", "--add", "h2:80", "--remove", "h3:80",
        ])
        .unwrap();
        match cli.command {
            Command::Submit { service, add, remove, .. } => {
                assert_eq!(service, "svc-a");
                assert_eq!(add.len(), 2);
                assert_eq!(remove.len(), 1);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_replace_conflicts_with_add() {
        let result = Cli::try_parse_from(["lb", "submit", "--service", "s", "--replace", "h:1", "--add", "h:2"]);
        assert!(result.is_err());
    }
}
