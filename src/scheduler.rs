use std::fmt::Write as _;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use time::OffsetDateTime;
use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::SiteConfig;
use crate::content::ContentItem;
use crate::mail::{Email, MailTransport};
use crate::settings::{SettingsStore, StaleConfig};
use crate::stale::{StalenessEvaluator, Threshold};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Armed { next_tick: OffsetDateTime },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Disabled,
    NothingStale,
    Sent { count: usize },
    Failed,
}

/// Runs the periodic stale content check and emails the results.
pub struct NotificationScheduler {
    state: SchedulerState,
    period: time::Duration,
    settings: SettingsStore,
    evaluator: StalenessEvaluator,
    mailer: Arc<dyn MailTransport>,
    site: SiteConfig,
}

impl NotificationScheduler {
    pub fn new(
        period: std::time::Duration,
        settings: SettingsStore,
        evaluator: StalenessEvaluator,
        mailer: Arc<dyn MailTransport>,
        site: SiteConfig,
    ) -> Self {
        let period = time::Duration::try_from(period)
            .unwrap_or(time::Duration::MAX)
            .max(time::Duration::SECOND);

        Self {
            state: SchedulerState::Idle,
            period,
            settings,
            evaluator,
            mailer,
            site,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Registers the recurring check. Does nothing if already armed; returns whether it armed.
    ///
    /// A previously persisted schedule is resumed; otherwise the schedule is anchored at `now`.
    pub async fn arm(&mut self, now: OffsetDateTime) -> Result<bool> {
        if let SchedulerState::Armed { .. } = self.state {
            return Ok(false);
        }

        let persisted = match self.settings.next_check_at().await {
            Ok(persisted) => persisted,

            Err(e) => {
                warn!("Discarding the persisted schedule: {e:#}");
                None
            }
        };

        let next_tick = match persisted {
            Some(next_tick) => {
                debug!(%next_tick, "Resuming the persisted schedule");
                next_tick
            }

            None => {
                self.settings.set_next_check_at(now).await?;
                now
            }
        };

        self.state = SchedulerState::Armed { next_tick };
        info!(%next_tick, "Scheduled the stale content check");

        Ok(true)
    }

    pub async fn run(mut self, cancel: CancellationToken) -> Result<()> {
        async move {
            self.arm(OffsetDateTime::now_utc())
                .await
                .context("could not schedule the stale content check")?;

            loop {
                let SchedulerState::Armed { next_tick } = self.state() else {
                    // nothing left to schedule; the server keeps running until shutdown.
                    cancel.cancelled().await;
                    break;
                };

                let now = OffsetDateTime::now_utc();
                let sleep: std::time::Duration = (next_tick - now)
                    .max(time::Duration::ZERO)
                    .try_into()
                    .unwrap_or_default();
                debug!("Scheduling the next check in {}s", sleep.as_secs());

                select! {
                    _ = cancel.cancelled() => {
                        debug!("Received a cancellation signal; exiting");
                        break;
                    }

                    _ = tokio::time::sleep(sleep) => {}
                }

                let now = OffsetDateTime::now_utc();
                self.tick(now).await;

                if let Err(e) = self.advance(now).await {
                    error!("Could not schedule the next check: {e:#}");
                }
            }

            Ok(())
        }
        .instrument(info_span!("scheduler"))
        .await
    }

    /// Moves the schedule forward by whole periods until it is past `now`.
    async fn advance(&mut self, now: OffsetDateTime) -> Result<()> {
        let SchedulerState::Armed { next_tick } = self.state else {
            return Ok(());
        };

        let Some(next_tick) = self.next_tick_after(next_tick, now) else {
            self.state = SchedulerState::Idle;
            bail!("the check after {next_tick} is out of range; stopped scheduling");
        };

        self.state = SchedulerState::Armed { next_tick };
        self.settings.set_next_check_at(next_tick).await
    }

    fn next_tick_after(&self, last_tick: OffsetDateTime, now: OffsetDateTime) -> Option<OffsetDateTime> {
        let next_tick = last_tick.checked_add(self.period)?;

        if next_tick > now {
            return Some(next_tick);
        }

        let behind = (now - next_tick).whole_seconds();
        let periods = i32::try_from(behind / self.period.whole_seconds().max(1) + 1).ok()?;

        next_tick.checked_add(self.period.checked_mul(periods)?)
    }

    /// Runs a single check. Failures are logged; nothing is retried.
    pub async fn tick(&self, now: OffsetDateTime) -> TickOutcome {
        let config = match self.settings.load().await {
            Ok(config) => config,

            Err(e) => {
                error!("Could not load the notifier settings: {e:#}");
                return TickOutcome::Failed;
            }
        };

        if !config.email_enabled {
            debug!("Email notifications are disabled");
            return TickOutcome::Disabled;
        }

        let stale = match self
            .evaluator
            .evaluate_at(Threshold::days(config.days_until_stale), now)
            .await
        {
            Ok(stale) => stale,

            Err(e) => {
                error!("Could not evaluate stale content: {e:#}");
                return TickOutcome::Failed;
            }
        };

        if stale.is_empty() {
            info!("No stale content found");
            return TickOutcome::NothingStale;
        }

        let email = compose_email(&stale, &config, &self.site);
        let count = stale.len();

        match self.mailer.send(&email).await {
            Ok(()) => {
                info!(to = %email.to, "Sent a notification about {count} stale items");
                TickOutcome::Sent { count }
            }

            Err(e) => {
                error!(to = %email.to, "{e:#}");
                TickOutcome::Failed
            }
        }
    }
}

pub fn compose_email(stale: &[ContentItem], config: &StaleConfig, site: &SiteConfig) -> Email {
    let subject = format!("You have {} stale posts/pages on your website", stale.len());

    let mut body = String::from("Hello,\n\nYou have the following stale content on your website:\n\n");

    for item in stale {
        let _ = writeln!(body, "{}: {}", item.title, item.permalink);
    }

    body.push_str("\nPlease review and update them as necessary.\n");
    body.push_str("Thank you!");

    Email {
        to: config.recipient(&site.admin_email).to_owned(),
        subject,
        body,
        headers: vec![(
            "From".into(),
            format!("{} <{}>", site.name, site.admin_email),
        )],
    }
}
