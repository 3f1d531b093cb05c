mod types;

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use tracing::{debug, info};
use take_mut::take;

pub use self::types::*;

const MAX_CHECK_INTERVAL_SECS: u64 = 366 * 24 * 60 * 60;

fn default_check_interval() -> Duration {
    Config::default().check_interval
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Config {
    pub bind_addr: String,
    pub db_path: PathBuf,

    #[serde(default = "default_check_interval")]
    pub check_interval: Duration,

    #[serde(default)]
    pub site: SiteConfig,

    #[serde(default)]
    pub mail: MailConfig,
}

impl Config {
    pub fn update(&mut self, args: crate::cli::Args) {
        fn set_if_some<T>(dst: &mut T, v: Option<T>) {
            if let Some(v) = v {
                *dst = v;
            }
        }

        set_if_some(&mut self.bind_addr, args.bind_addr);
        set_if_some(&mut self.db_path, args.db_path);
        set_if_some(&mut self.site.admin_email, args.admin_email);
    }

    pub fn resolve_relative_paths(&mut self, config_dir: impl AsRef<Path>) {
        let config_dir = config_dir.as_ref();

        // do the dance for safety (so that I don't forget to update this after adding new fields).
        take(self, |mut this| {
            this.mail.resolve_relative_paths(config_dir);

            Self {
                bind_addr: this.bind_addr,
                db_path: config_dir.join(&this.db_path),
                check_interval: this.check_interval,
                site: this.site,
                mail: this.mail,
            }
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.check_interval.is_zero() {
            bail!("`check-interval` must be positive");
        }

        if self.check_interval > Duration::from_secs(MAX_CHECK_INTERVAL_SECS) {
            bail!("`check-interval` must not exceed 366 days");
        }

        if crate::settings::sanitize_email(&self.site.admin_email).is_none() {
            bail!(
                "`site.admin-email` (`{}`) is not a valid email address",
                self.site.admin_email
            );
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind_addr: "127.0.0.1:20655".into(),
            db_path: "./stale-notifier.sqlite3".into(),
            check_interval: Duration::from_secs(24 * 60 * 60),
            site: Default::default(),
            mail: Default::default(),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields, default)]
pub struct SiteConfig {
    pub name: String,
    pub admin_email: String,

    /// Prefix of the admin pages when served behind a reverse proxy, e.g. `/admin`.
    pub base_path: String,

    pub timezone: Option<SiteTimeZone>,
    pub thousands_separator: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            name: "Stale Content Notifier".into(),
            admin_email: "admin@localhost.localdomain".into(),
            base_path: String::new(),
            timezone: None,
            thousands_separator: ",".into(),
        }
    }
}

impl SiteConfig {
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_path.trim_end_matches('/'))
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "kind", rename_all = "kebab-case", deny_unknown_fields)]
pub enum MailConfig {
    Sendmail(SendmailConfig),
    Log,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self::Sendmail(Default::default())
    }
}

impl MailConfig {
    pub fn resolve_relative_paths(&mut self, config_dir: impl AsRef<Path>) {
        let config_dir = config_dir.as_ref();

        match self {
            Self::Sendmail(cfg) => cfg.resolve_relative_paths(config_dir),
            Self::Log => {}
        }
    }
}

fn default_sendmail_path() -> PathBuf {
    "/usr/sbin/sendmail".into()
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct SendmailConfig {
    #[serde(default = "default_sendmail_path")]
    pub path: PathBuf,
}

impl Default for SendmailConfig {
    fn default() -> Self {
        Self {
            path: default_sendmail_path(),
        }
    }
}

impl SendmailConfig {
    pub fn resolve_relative_paths(&mut self, config_dir: impl AsRef<Path>) {
        let config_dir = config_dir.as_ref();

        // a bare program name is looked up in PATH.
        if self.path.components().count() > 1 {
            take(self, |this| Self {
                path: config_dir.join(this.path),
            })
        }
    }
}

pub fn load(search_paths: &[PathBuf]) -> Result<Config> {
    for path in search_paths {
        debug!("Trying to load {}", path.display());
        let mut contents = String::new();

        {
            let mut f = match File::open(path) {
                Ok(f) => f,

                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    debug!(file = %path.display(), "File not found, skipping");
                    continue;
                }

                Err(e) => {
                    return Err(e)
                        .context(anyhow!("could not load a config file `{}`", path.display()));
                }
            };

            f.read_to_string(&mut contents).with_context(|| {
                anyhow!(
                    "could not read the contents of a config file `{}`",
                    path.display()
                )
            })?;
        }

        let mut cfg = parse(&contents)
            .with_context(|| anyhow!("could not load the config file `{}`", path.display()))?;

        if let Some(parent) = path.parent() {
            cfg.resolve_relative_paths(parent);
        }

        info!("Loaded a config file `{}`", path.display());

        return Ok(cfg);
    }

    info!("Using the default config");

    Ok(Default::default())
}

fn parse(contents: &str) -> Result<Config> {
    Ok(toml::from_str(contents)?)
}
