use std::fmt::{self, Display};

use anyhow::{anyhow, Context, Result};
use handlebars::Handlebars;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Template {
    Index,
    Report,
    Settings,
    Notice,
}

impl Template {
    const ALL: [Template; 4] = [Self::Index, Self::Report, Self::Settings, Self::Notice];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Index => "index",
            Self::Report => "report",
            Self::Settings => "settings",
            Self::Notice => "notice",
        }
    }

    fn source(&self) -> &'static str {
        match self {
            Self::Index => include_str!("template/index.hbs"),
            Self::Report => include_str!("template/report.hbs"),
            Self::Settings => include_str!("template/settings.hbs"),
            Self::Notice => include_str!("template/notice.hbs"),
        }
    }
}

impl Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_str().fmt(f)
    }
}

pub fn new() -> Result<Handlebars<'static>> {
    let mut tt = Handlebars::new();
    tt.set_strict_mode(false);

    for (name, source) in [
        ("header", include_str!("template/header.hbs")),
        ("footer", include_str!("template/footer.hbs")),
    ] {
        tt.register_partial(name, source)
            .with_context(|| anyhow!("could not register the partial `{name}`"))?;
    }

    for template in Template::ALL {
        tt.register_template_string(template.as_str(), template.source())
            .with_context(|| anyhow!("could not register the template `{template}`"))?;
    }

    Ok(tt)
}
