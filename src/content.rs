use std::fmt::{self, Display};
use std::str::FromStr;

use anyhow::{anyhow, Error};
use time::OffsetDateTime;

/// Content types that are checked for staleness.
pub const EVALUATED_KINDS: &[ContentKind] = &[ContentKind::Post, ContentKind::Page];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentKind {
    Post,
    Page,
    Attachment,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Post => "post",
            Self::Page => "page",
            Self::Attachment => "attachment",
        }
    }
}

impl FromStr for ContentKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "post" => Self::Post,
            "page" => Self::Page,
            "attachment" => Self::Attachment,
            _ => return Err(anyhow!("unknown content kind `{s}`")),
        })
    }
}

impl Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_str().fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentStatus {
    Publish,
    Draft,
    Pending,
    Private,
    Future,
    Trash,
}

impl ContentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Publish => "publish",
            Self::Draft => "draft",
            Self::Pending => "pending",
            Self::Private => "private",
            Self::Future => "future",
            Self::Trash => "trash",
        }
    }
}

impl FromStr for ContentStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "publish" => Self::Publish,
            "draft" => Self::Draft,
            "pending" => Self::Pending,
            "private" => Self::Private,
            "future" => Self::Future,
            "trash" => Self::Trash,
            _ => return Err(anyhow!("unknown content status `{s}`")),
        })
    }
}

impl Display for ContentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_str().fmt(f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(dead_code)]
pub struct ContentItem {
    pub id: i64,
    pub kind: ContentKind,
    pub status: ContentStatus,
    pub title: String,
    pub published_at: OffsetDateTime,
    pub edit_url: String,
    pub permalink: String,
}
