use clap::{ArgAction, Parser};
use reqwest::Url;

#[derive(Debug, Parser)]
#[command(version, about = "Red Hat Dependency Analytics MCP server (stdio)")]
pub struct Args {
    /// Turn debugging information on
    #[arg(short, long, global = true, action(ArgAction::Count))]
    pub verbose: u8,
    /// Less verbose output
    #[arg(short, long, global = true, action(ArgAction::Count))]
    pub quiet: u8,
    /// Base url of the dependency analysis backend
    #[arg(long, value_name = "URL")]
    pub backend_url: Url,
    /// Base url of the vulnerability intel server
    #[arg(long, value_name = "URL")]
    pub intel_server_url: Url,
}

impl Args {
    pub fn log_level(&self) -> &'static str {
        match (self.verbose, self.quiet) {
            (0, 0) => "info",
            (0, 1) => "warn",
            (0, _) => "error",
            _ => "debug",
        }
    }

    pub fn config(&self) -> Config {
        Config {
            backend_url: self.backend_url.clone(),
            intel_server_url: self.intel_server_url.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub backend_url: Url,
    pub intel_server_url: Url,
}
