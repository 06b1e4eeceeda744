use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::AppError;

pub const COLLECTION_UNKNOWN: &str = "STORE/UNKNOWN_COLLECTION";

/// The closed set of collections the store knows about.
///
/// Declaration order is the enumerated order used by snapshots and by
/// multi-collection locking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionName {
    Users,
    Inmates,
    Inspections,
    Belongings,
    Wards,
    Cases,
    Minutes,
    Wanted,
    Movements,
    Visits,
    Reports,
    Logs,
    Favorites,
}

impl CollectionName {
    pub const ALL: [CollectionName; 13] = [
        CollectionName::Users,
        CollectionName::Inmates,
        CollectionName::Inspections,
        CollectionName::Belongings,
        CollectionName::Wards,
        CollectionName::Cases,
        CollectionName::Minutes,
        CollectionName::Wanted,
        CollectionName::Movements,
        CollectionName::Visits,
        CollectionName::Reports,
        CollectionName::Logs,
        CollectionName::Favorites,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CollectionName::Users => "users",
            CollectionName::Inmates => "inmates",
            CollectionName::Inspections => "inspections",
            CollectionName::Belongings => "belongings",
            CollectionName::Wards => "wards",
            CollectionName::Cases => "cases",
            CollectionName::Minutes => "minutes",
            CollectionName::Wanted => "wanted",
            CollectionName::Movements => "movements",
            CollectionName::Visits => "visits",
            CollectionName::Reports => "reports",
            CollectionName::Logs => "logs",
            CollectionName::Favorites => "favorites",
        }
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for CollectionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CollectionName {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let wanted = value.trim();
        CollectionName::ALL
            .into_iter()
            .find(|name| name.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| {
                AppError::new(COLLECTION_UNKNOWN, "Unknown collection")
                    .with_context("collection", value.to_string())
            })
    }
}
