use std::sync::Arc;

use anyhow::Result;
use handlebars::Handlebars;

use crate::config::Config;
use crate::mail::{self, MailTransport};
use crate::notice::AdminNoticeRenderer;
use crate::scheduler::NotificationScheduler;
use crate::settings::SettingsStore;
use crate::stale::StalenessEvaluator;
use crate::storage::Storage;
use crate::template;

#[derive(Clone)]
pub struct State {
    pub cfg: Arc<Config>,
    pub settings: SettingsStore,
    pub evaluator: StalenessEvaluator,
    pub mailer: Arc<dyn MailTransport>,
    pub template: Arc<Handlebars<'static>>,
}

impl State {
    pub async fn new(cfg: Config) -> Result<Self> {
        let storage = Arc::new(Storage::new(&cfg.db_path).await?);
        let mailer = mail::make_transport(&cfg.mail);

        Self::with_storage(cfg, storage, mailer)
    }

    pub fn with_storage(
        cfg: Config,
        storage: Arc<Storage>,
        mailer: Arc<dyn MailTransport>,
    ) -> Result<Self> {
        Ok(State {
            cfg: Arc::new(cfg),
            settings: SettingsStore::new(storage.clone()),
            evaluator: StalenessEvaluator::new(storage),
            mailer,
            template: Arc::new(template::new()?),
        })
    }

    pub fn notice_renderer(&self) -> AdminNoticeRenderer<'_> {
        AdminNoticeRenderer::new(&self.evaluator, &self.template, &self.cfg.site)
    }

    pub fn scheduler(&self) -> NotificationScheduler {
        NotificationScheduler::new(
            self.cfg.check_interval.into(),
            self.settings.clone(),
            self.evaluator.clone(),
            self.mailer.clone(),
            self.cfg.site.clone(),
        )
    }
}
