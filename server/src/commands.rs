use std::net::IpAddr;

use clap::{ArgAction, Parser};
use scanbox_common::config::Config;

#[derive(Parser, Debug)]
#[command(name = "scanbox")]
#[command(version)]
#[command(about = "Asset discovery service. Accepts scan jobs over HTTP and reports to a collector.")]
pub struct CommandLine {
    /// Port to listen on (overrides SCANBOX_PORT)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Address to bind (overrides SCANBOX_BIND)
    #[arg(short, long)]
    pub bind: Option<IpAddr>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Do not print the startup banner
    #[arg(long)]
    pub no_banner: bool,
}

impl CommandLine {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Flags given on the command line take precedence over the environment.
    pub fn apply(&self, cfg: &mut Config) {
        if let Some(port) = self.port {
            cfg.server.port = port;
        }
        if let Some(bind) = self.bind {
            cfg.server.bind = bind;
        }
    }
}
