use anyhow::{anyhow, Context};
use axum::extract::{Form, State};
use axum::response::{Html, Result};
use serde::Serialize;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::OffsetDateTime;
use tracing::warn;

use crate::config::SiteConfig;
use crate::notice::REPORT_PATH;
use crate::server::convert_errors;
use crate::settings::{SettingsForm, StaleConfig};
use crate::stale::Threshold;
use crate::state::State as AppState;
use crate::template::Template;

pub const SETTINGS_PATH: &str = "/settings";

static DATE_FORMAT: &[BorrowedFormatItem<'_>] = format_description!("[year]-[month]-[day]");
static DATETIME_FORMAT: &[BorrowedFormatItem<'_>] = format_description!(
    "[year]-[month]-[day] [hour]:[minute]:[second] [offset_hour sign:mandatory]:[offset_minute]"
);

fn format_datetime(
    site: &SiteConfig,
    datetime: OffsetDateTime,
    format: &[BorrowedFormatItem<'_>],
) -> anyhow::Result<String> {
    let datetime = match site.timezone {
        Some(tz) => tz.localize(datetime),
        None => datetime,
    };

    datetime
        .format(format)
        .with_context(|| anyhow!("could not format the date {datetime}"))
}

#[derive(Serialize, Debug, Clone)]
struct Nav {
    dashboard: String,
    report: String,
    settings: String,
}

/// The parts shared by every admin page: navigation and the stale content banner.
#[derive(Serialize, Debug, Clone)]
struct Page<T> {
    title: &'static str,
    site_name: String,
    active_tab: &'static str,
    notice: String,
    nav: Nav,

    #[serde(flatten)]
    body: T,
}

impl<T: Serialize> Page<T> {
    async fn new(
        state: &AppState,
        config: Option<&StaleConfig>,
        title: &'static str,
        active_tab: &'static str,
        body: T,
    ) -> Self {
        let site = &state.cfg.site;

        let notice = match config {
            Some(config) => state.notice_renderer().render(config).await,
            None => String::new(),
        };

        Self {
            title,
            site_name: site.name.clone(),
            active_tab,
            notice,
            nav: Nav {
                dashboard: site.url("/"),
                report: site.url(REPORT_PATH),
                settings: site.url(SETTINGS_PATH),
            },
            body,
        }
    }

    fn render(&self, state: &AppState, template: Template) -> anyhow::Result<Html<String>> {
        state
            .template
            .render(template.as_str(), self)
            .map(Html)
            .with_context(|| anyhow!("could not render the HTML template `{template}`"))
    }
}

/// Loads the settings for a page render. A broken configuration must not break the admin pages,
/// so failures are logged and yield `None`.
async fn load_config(state: &AppState) -> Option<StaleConfig> {
    state
        .settings
        .load()
        .await
        .inspect_err(|e| warn!("Could not load the notifier settings: {e:#}"))
        .ok()
}

pub async fn index(State(state): State<AppState>) -> Result<Html<String>> {
    #[derive(Serialize, Debug, Clone)]
    struct Settings {
        days_until_stale: u32,
        email_enabled: bool,
        recipient: String,
    }

    #[derive(Serialize, Debug, Clone)]
    struct Context {
        settings: Option<Settings>,
        next_check: String,
    }

    convert_errors(async move {
        let config = load_config(&state).await;
        let site = &state.cfg.site;

        let next_check = match state.settings.next_check_at().await {
            Ok(Some(next_check)) => format_datetime(site, next_check, DATETIME_FORMAT)?,
            Ok(None) => "not scheduled".into(),

            Err(e) => {
                warn!("Could not load the next check time: {e:#}");
                "unknown".into()
            }
        };

        let ctx = Context {
            settings: config.as_ref().map(|config| Settings {
                days_until_stale: config.days_until_stale.get(),
                email_enabled: config.email_enabled,
                recipient: config.recipient(&site.admin_email).to_owned(),
            }),
            next_check,
        };

        Page::new(&state, config.as_ref(), "Dashboard", "dashboard", ctx)
            .await
            .render(&state, Template::Index)
    })
    .await
}

pub async fn report(State(state): State<AppState>) -> Result<Html<String>> {
    #[derive(Serialize, Debug, Clone)]
    struct Row {
        title: String,
        edit_url: String,
        published: String,
    }

    #[derive(Serialize, Debug, Clone)]
    struct Context {
        items: Vec<Row>,
        error: Option<String>,
    }

    convert_errors(async move {
        let config = load_config(&state).await;

        let stale = match &config {
            Some(config) => state
                .evaluator
                .evaluate(Threshold::days(config.days_until_stale))
                .await
                .map_err(|e| e.to_string()),

            None => Err("the notifier settings are invalid".into()),
        };

        let ctx = match stale {
            Ok(stale) => {
                let mut items = Vec::with_capacity(stale.len());

                for item in stale {
                    items.push(Row {
                        published: format_datetime(&state.cfg.site, item.published_at, DATE_FORMAT)?,
                        title: item.title,
                        edit_url: item.edit_url,
                    });
                }

                Context { items, error: None }
            }

            Err(e) => {
                warn!("Could not build the stale content report: {e}");

                Context {
                    items: vec![],
                    error: Some(e),
                }
            }
        };

        Page::new(&state, config.as_ref(), "Stale Content", "report", ctx)
            .await
            .render(&state, Template::Report)
    })
    .await
}

#[derive(Serialize, Debug, Clone)]
struct SettingsContext {
    saved: bool,
    days_until_stale: u32,
    email_enabled: bool,
    notification_email: String,
}

async fn render_settings(state: AppState, saved: bool) -> Result<Html<String>> {
    convert_errors(async move {
        let config = load_config(&state).await;
        let shown = config.clone().unwrap_or_default();

        let ctx = SettingsContext {
            saved,
            days_until_stale: shown.days_until_stale.get(),
            email_enabled: shown.email_enabled,
            notification_email: shown.recipient(&state.cfg.site.admin_email).to_owned(),
        };

        Page::new(&state, config.as_ref(), "Settings", "settings", ctx)
            .await
            .render(&state, Template::Settings)
    })
    .await
}

pub async fn settings(State(state): State<AppState>) -> Result<Html<String>> {
    render_settings(state, false).await
}

pub async fn save_settings(
    State(state): State<AppState>,
    Form(form): Form<SettingsForm>,
) -> Result<Html<String>> {
    let config = form.into_config();
    convert_errors(state.settings.save(&config)).await?;

    render_settings(state, true).await
}
