use clap::ValueHint;

use std::path::PathBuf;

#[derive(clap::Parser, Debug, Clone)]
#[command(version, about)]
pub struct Args {
    /// Path to the config file.
    ///
    /// By default, stale-notifier looks for a file named `stale-notifier.toml` in the following
    /// directories (in order):
    ///
    /// - `./` (the current directory)
    /// - `/etc`
    #[arg(
        short,
        env = "STALE_NOTIFIER_CONFIG",
        value_hint(ValueHint::FilePath)
    )]
    pub config_path: Option<PathBuf>,

    /// Admin web server address to bind to.
    #[arg(long, env = "STALE_NOTIFIER_BIND_ADDR")]
    pub bind_addr: Option<String>,

    /// Path to the content database file.
    #[arg(long, env = "STALE_NOTIFIER_DB", value_hint(ValueHint::FilePath))]
    pub db_path: Option<PathBuf>,

    /// Site admin address, used as the sender and the default recipient of notifications.
    #[arg(long, env = "STALE_NOTIFIER_ADMIN_EMAIL")]
    pub admin_email: Option<String>,
}

impl Args {
    pub fn parse() -> Self {
        clap::Parser::parse()
    }
}
