//! Supplier identities and the supplier-of-record recorded in the catalog

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One of the two supplier portals this application monitors.
///
/// Declaration order is the fixed tie-break priority: when two suppliers quote
/// the same price, the earlier variant wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Supplier {
    Lca,
    Kmls,
}

impl Supplier {
    /// All suppliers in priority order
    pub const ALL: [Self; 2] = [Self::Lca, Self::Kmls];

    /// Short code used in logs, file names and reports
    pub const fn code(self) -> &'static str {
        match self {
            Self::Lca => "LCA",
            Self::Kmls => "KMLS",
        }
    }

    /// Lower-case slug used for on-disk artifacts (vault bundles, screenshots)
    pub const fn slug(self) -> &'static str {
        match self {
            Self::Lca => "lca",
            Self::Kmls => "kmls",
        }
    }

    /// Tie-break rank, lower wins
    pub const fn priority(self) -> u8 {
        match self {
            Self::Lca => 0,
            Self::Kmls => 1,
        }
    }

    /// Recognise a supplier from a product or baseline URL
    pub fn from_url(url: &str) -> Option<Self> {
        let lowered = url.to_ascii_lowercase();
        if lowered.contains("lca-distribution") {
            Some(Self::Lca)
        } else if lowered.contains("kmls") {
            Some(Self::Kmls)
        } else {
            None
        }
    }
}

impl fmt::Display for Supplier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Supplier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lca" => Ok(Self::Lca),
            "kmls" => Ok(Self::Kmls),
            other => Err(format!("Unknown supplier: {other}")),
        }
    }
}

/// Supplier recorded against a catalog entry before a scrape.
///
/// The catalog may point at a supplier outside the two monitored portals, or at
/// nothing at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "supplier")]
pub enum SupplierOfRecord {
    Known(Supplier),
    Other,
    Unknown,
}

impl SupplierOfRecord {
    /// Infer the supplier of record from the baseline purchase link
    pub fn from_url(url: &str) -> Self {
        if url.trim().is_empty() {
            return Self::Unknown;
        }
        Supplier::from_url(url).map_or(Self::Other, Self::Known)
    }

    pub const fn supplier(self) -> Option<Supplier> {
        match self {
            Self::Known(s) => Some(s),
            Self::Other | Self::Unknown => None,
        }
    }
}

impl fmt::Display for SupplierOfRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Known(s) => write!(f, "{s}"),
            Self::Other => f.write_str("Other"),
            Self::Unknown => f.write_str("Unknown"),
        }
    }
}

impl From<Supplier> for SupplierOfRecord {
    fn from(value: Supplier) -> Self {
        Self::Known(value)
    }
}
