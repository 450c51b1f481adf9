use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Column the server orders `/todos` by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderBy {
    CreatedAt,
    #[default]
    Deadline,
}

impl OrderBy {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderBy::CreatedAt => "created_at",
            OrderBy::Deadline => "deadline",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

/// Completion filter understood by `/todos`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusFilter {
    #[default]
    All,
    Done,
    NotDone,
}

impl StatusFilter {
    pub fn as_str(self) -> &'static str {
        match self {
            StatusFilter::All => "all",
            StatusFilter::Done => "done",
            StatusFilter::NotDone => "not_done",
        }
    }

    pub fn matches(self, done: bool) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Done => done,
            StatusFilter::NotDone => !done,
        }
    }
}

macro_rules! impl_str_enum {
    ($ty:ty, [$($variant:expr),+ $(,)?]) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let variants = [$($variant),+];
                variants
                    .into_iter()
                    .find(|v| v.as_str() == s)
                    .ok_or_else(|| {
                        let allowed: Vec<&str> = variants.iter().map(|v| v.as_str()).collect();
                        format!("unknown value '{s}' (expected one of: {})", allowed.join(", "))
                    })
            }
        }
    };
}

impl_str_enum!(OrderBy, [OrderBy::CreatedAt, OrderBy::Deadline]);
impl_str_enum!(SortOrder, [SortOrder::Asc, SortOrder::Desc]);
impl_str_enum!(
    StatusFilter,
    [StatusFilter::All, StatusFilter::Done, StatusFilter::NotDone]
);

/// Parameters of `GET /todos`. Unset fields fall back to server defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
    pub search: Option<String>,
    pub status: Option<StatusFilter>,
    pub order_by: Option<OrderBy>,
    pub order: Option<SortOrder>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}
