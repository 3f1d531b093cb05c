use anyhow::{Context, Result};
use handlebars::Handlebars;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::SiteConfig;
use crate::settings::StaleConfig;
use crate::stale::{StalenessEvaluator, Threshold};
use crate::template::Template;

pub const REPORT_PATH: &str = "/stale";

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub count: usize,
    pub message: String,
    pub link: String,
}

impl Notice {
    pub fn new(count: usize, site: &SiteConfig) -> Option<Self> {
        if count == 0 {
            return None;
        }

        let formatted = format_count(count, &site.thousands_separator);
        let message = if count == 1 {
            format!("You have {formatted} post or page that hasn't been updated in a while.")
        } else {
            format!("You have {formatted} posts or pages that haven't been updated in a while.")
        };

        Some(Self {
            count,
            message,
            link: site.url(REPORT_PATH),
        })
    }
}

/// Groups digits by thousands: `format_count(1234567, ",") == "1,234,567"`.
pub fn format_count(count: usize, separator: &str) -> String {
    let digits = count.to_string();
    let mut result = String::with_capacity(digits.len() + digits.len() / 3 * separator.len());

    for (idx, digit) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            result.push_str(separator);
        }

        result.push(digit);
    }

    result
}

/// Renders the stale content banner shown at the top of every admin page.
pub struct AdminNoticeRenderer<'a> {
    evaluator: &'a StalenessEvaluator,
    template: &'a Handlebars<'static>,
    site: &'a SiteConfig,
}

impl<'a> AdminNoticeRenderer<'a> {
    pub fn new(
        evaluator: &'a StalenessEvaluator,
        template: &'a Handlebars<'static>,
        site: &'a SiteConfig,
    ) -> Self {
        Self {
            evaluator,
            template,
            site,
        }
    }

    /// Returns the banner HTML, or an empty string when there is nothing to report.
    ///
    /// Never fails: errors are logged and produce no banner.
    pub async fn render(&self, config: &StaleConfig) -> String {
        let threshold = Threshold::days(config.days_until_stale);

        let stale = match self.evaluator.evaluate(threshold).await {
            Ok(stale) => stale,

            Err(e) => {
                warn!("Could not evaluate stale content for the admin notice: {e:#}");
                return String::new();
            }
        };

        let Some(notice) = Notice::new(stale.len(), self.site) else {
            debug!("No stale content; skipping the admin notice");
            return String::new();
        };

        match self.render_notice(&notice) {
            Ok(html) => html,

            Err(e) => {
                warn!("{e:#}");
                String::new()
            }
        }
    }

    fn render_notice(&self, notice: &Notice) -> Result<String> {
        self.template
            .render(Template::Notice.as_str(), notice)
            .context("could not render the admin notice")
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;

    use crate::stale::tests::seeded_storage;
    use crate::stale::DaysUntilStale;
    use crate::storage::Storage;
    use crate::template;

    use super::*;

    fn site() -> SiteConfig {
        SiteConfig {
            base_path: "/admin".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_format_count() {
        assert_eq!(format_count(0, ","), "0");
        assert_eq!(format_count(999, ","), "999");
        assert_eq!(format_count(1000, ","), "1,000");
        assert_eq!(format_count(1234567, "."), "1.234.567");
        assert_eq!(format_count(123456, "\u{a0}"), "123\u{a0}456");
    }

    #[test]
    fn test_notice_pluralization() {
        let site = site();

        assert_eq!(Notice::new(0, &site), None);
        assert_eq!(
            Notice::new(1, &site).unwrap().message,
            "You have 1 post or page that hasn't been updated in a while."
        );
        assert_eq!(
            Notice::new(1500, &site).unwrap(),
            Notice {
                count: 1500,
                message: "You have 1,500 posts or pages that haven't been updated in a while."
                    .into(),
                link: "/admin/stale".into(),
            }
        );
    }

    #[tokio::test]
    async fn test_no_banner_without_stale_content() {
        let evaluator = StalenessEvaluator::new(Arc::new(Storage::in_memory().await.unwrap()));
        let template = template::new().unwrap();
        let site = site();
        let renderer = AdminNoticeRenderer::new(&evaluator, &template, &site);

        assert_eq!(renderer.render(&StaleConfig::default()).await, "");
    }

    #[tokio::test]
    async fn test_banner_with_stale_content() {
        let evaluator = StalenessEvaluator::new(seeded_storage().await);
        let template = template::new().unwrap();
        let site = site();
        let renderer = AdminNoticeRenderer::new(&evaluator, &template, &site);
        let config = StaleConfig {
            days_until_stale: DaysUntilStale::new(1).unwrap(),
            ..Default::default()
        };

        let html = renderer.render(&config).await;

        assert!(html.contains("notice notice-warning is-dismissible"), "{html}");
        assert!(html.contains("You have 15 posts or pages"), "{html}");
        assert!(html.contains(r#"<a href="/admin/stale">View stale content</a>"#), "{html}");
    }

    #[tokio::test]
    async fn test_threshold_beyond_all_content_renders_nothing() {
        let evaluator = StalenessEvaluator::new(seeded_storage().await);
        let template = template::new().unwrap();
        let site = site();
        let renderer = AdminNoticeRenderer::new(&evaluator, &template, &site);
        let config = StaleConfig {
            days_until_stale: DaysUntilStale::new(3650).unwrap(),
            ..Default::default()
        };

        assert_eq!(renderer.render(&config).await, "");
    }
}
