use std::path::PathBuf;

use anyhow::bail;
use clap::Parser;

use crate::ipc::Runtime;

pub const DEFAULT_PUBLIC_URL: &str = "http://localhost:3000";
pub const DEFAULT_LOG_FILTER: &str = "edgraded=info";

/// EdGrade data sidecar. Speaks line-delimited JSON on stdin/stdout.
#[derive(Parser, Debug)]
#[command(name = "edgraded", version, about)]
pub struct Cli {
    /// Workspace directory to open at start-up
    #[arg(long, env = "EDGRADE_WORKSPACE")]
    pub workspace: Option<PathBuf>,

    /// Origin used when building report share links
    #[arg(long, env = "EDGRADE_PUBLIC_URL", default_value = DEFAULT_PUBLIC_URL)]
    pub public_url: String,

    /// Days a report share link stays valid
    #[arg(long, env = "EDGRADE_TOKEN_TTL_DAYS", default_value_t = 7)]
    pub token_ttl_days: i64,

    /// tracing filter directive, e.g. `edgraded=debug`
    #[arg(long = "log", env = "EDGRADE_LOG", default_value = DEFAULT_LOG_FILTER)]
    pub log: String,
}

impl Cli {
    pub fn runtime(&self) -> anyhow::Result<Runtime> {
        if self.token_ttl_days < 1 {
            bail!("--token-ttl-days must be at least 1 (got {})", self.token_ttl_days);
        }
        let public_url = self.public_url.trim().trim_end_matches('/').to_string();
        if public_url.is_empty() {
            bail!("--public-url must not be empty");
        }
        Ok(Runtime {
            public_url,
            token_ttl_days: self.token_ttl_days,
        })
    }
}
