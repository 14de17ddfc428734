//! Process-level CLI overrides. Substantive configuration stays in the
//! environment; these flags only adjust logging verbosity.

use clap::Parser;

#[derive(Debug, Parser)]
#[command(author, version, about = "Block indexer for an Ethereum-compatible chain")]
pub struct Cli {
    /// Shorthand for `--log-level debug`.
    #[arg(long, short)]
    pub debug: bool,

    /// Overrides `RUST_LOG`/`LOG_LEVEL` when neither is set in the
    /// environment.
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Cli {
    pub fn parse() -> Self {
        Parser::parse()
    }

    /// The effective log level: `--debug` wins over `--log-level`.
    pub fn effective_log_level(&self) -> &str {
        if self.debug {
            "debug"
        } else {
            &self.log_level
        }
    }
}
