//! Data Transfer Objects for the control surface
//!
//! Contains DTOs for data exchange between the application layer and the
//! commands consumed by a UI or HTTP shell.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::orchestrator::ScrapeOutcome;
use crate::domain::{Comparison, ComparisonStats, Supplier};

// ============================================================================
// Session DTOs
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartLoginDto {
    pub supplier: Supplier,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitSecondFactorDto {
    pub supplier: Supplier,
    pub code: String,
}

/// Whether each supplier has a stored session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatusDto {
    pub lca: bool,
    pub kmls: bool,
    pub both: bool,
}

impl SessionStatusDto {
    pub const fn new(lca: bool, kmls: bool) -> Self {
        Self {
            lca,
            kmls,
            both: lca && kmls,
        }
    }

    pub const fn get(&self, supplier: Supplier) -> bool {
        match supplier {
            Supplier::Lca => self.lca,
            Supplier::Kmls => self.kmls,
        }
    }
}

// ============================================================================
// Scraping DTOs
// ============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeAllResponseDto {
    pub total: usize,
    pub with_changes: usize,
    pub comparisons: Vec<Comparison>,
    pub aborted: bool,
    pub aborted_by: Option<Supplier>,
    /// Human-readable reason when the run was aborted
    pub message: Option<String>,
}

impl From<ScrapeOutcome> for ScrapeAllResponseDto {
    fn from(outcome: ScrapeOutcome) -> Self {
        let message = match (outcome.aborted, outcome.aborted_by) {
            (true, Some(supplier)) => Some(format!(
                "The {supplier} session is no longer valid. Log in to {supplier} again, then restart the scrape."
            )),
            (true, None) => Some("Scrape cancelled".to_string()),
            (false, _) => None,
        };
        Self {
            total: outcome.comparisons.len(),
            with_changes: outcome.with_changes(),
            aborted: outcome.aborted,
            aborted_by: outcome.aborted_by,
            comparisons: outcome.comparisons,
            message,
        }
    }
}

// ============================================================================
// Write-back & report DTOs
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyUpdatesResponseDto {
    pub cells_written: usize,
    pub products_changed: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportResponseDto {
    /// Missing when no comparison had changes
    pub report_path: Option<PathBuf>,
    pub summary_path: Option<PathBuf>,
    pub statistics: ComparisonStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abort_message_names_the_supplier() {
        let outcome = ScrapeOutcome {
            comparisons: Vec::new(),
            aborted: true,
            aborted_by: Some(Supplier::Kmls),
        };
        let dto = ScrapeAllResponseDto::from(outcome);
        assert!(dto.message.unwrap().contains("KMLS"));

        let json = serde_json::to_value(SessionStatusDto::new(true, false)).unwrap();
        assert_eq!(json, serde_json::json!({"lca": true, "kmls": false, "both": false}));
    }
}
