use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Printer,
    Filament,
    Resin,
    Accessory,
    Pen,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Printer,
        Category::Filament,
        Category::Resin,
        Category::Accessory,
        Category::Pen,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Printer => "printer",
            Category::Filament => "filament",
            Category::Resin => "resin",
            Category::Accessory => "accessory",
            Category::Pen => "pen",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown category '{}'", s))
    }
}

/// Product type within a category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SubType {
    // printers
    Fdm,
    ResinPrinter,
    // filament
    Pla,
    Petg,
    Abs,
    Tpu,
    Asa,
    Nylon,
    // resin
    StandardResin,
    WaterWashable,
    AbsLike,
    // accessories
    Nozzle,
    BuildPlate,
    Enclosure,
    Dryer,
    Tools,
    // pens
    Pen,
}

impl SubType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubType::Fdm => "fdm",
            SubType::ResinPrinter => "resin-printer",
            SubType::Pla => "pla",
            SubType::Petg => "petg",
            SubType::Abs => "abs",
            SubType::Tpu => "tpu",
            SubType::Asa => "asa",
            SubType::Nylon => "nylon",
            SubType::StandardResin => "standard-resin",
            SubType::WaterWashable => "water-washable",
            SubType::AbsLike => "abs-like",
            SubType::Nozzle => "nozzle",
            SubType::BuildPlate => "build-plate",
            SubType::Enclosure => "enclosure",
            SubType::Dryer => "dryer",
            SubType::Tools => "tools",
            SubType::Pen => "pen",
        }
    }
}

impl fmt::Display for SubType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Condition {
    New,
    Used,
}

impl Condition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Condition::New => "new",
            Condition::Used => "used",
        }
    }
}

/// One marketplace listing as stored in the catalog. Unique on (`asin`, `locale`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub asin: String,
    pub locale: String,
    pub name: String,
    pub price: f64,
    pub brand: Option<String>,
    pub category: Category,
    pub sub_type: SubType,
    pub condition: Condition,
    pub rating: Option<f32>,
    pub review_count: Option<u32>,
    pub available: bool,
    pub source_url: String,
    pub first_seen: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    Partial,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Success => "success",
            RunStatus::Partial => "partial",
            RunStatus::Failed => "failed",
        }
    }

    /// `failed` when every query errored, `partial` when some did.
    /// A run with no queries at all has nothing to fail and counts as `success`.
    pub fn from_query_outcomes(total: usize, failed: usize) -> Self {
        if total > 0 && failed >= total {
            RunStatus::Failed
        } else if failed > 0 {
            RunStatus::Partial
        } else {
            RunStatus::Success
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(RunStatus::Success),
            "partial" => Ok(RunStatus::Partial),
            "failed" => Ok(RunStatus::Failed),
            other => Err(format!("unknown run status '{}'", other)),
        }
    }
}

/// Per-run counters owned by the one active ingestion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunCounters {
    pub items_found: usize,
    pub items_saved: usize,
    pub errors: usize,
    pub blocked: usize,
    pub queries_total: usize,
    pub queries_failed: usize,
}

/// Audit record written once per ingestion invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestionRun {
    pub id: Option<i64>,
    pub status: RunStatus,
    pub counters: RunCounters,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_from_outcomes() {
        assert_eq!(RunStatus::from_query_outcomes(3, 3), RunStatus::Failed);
        assert_eq!(RunStatus::from_query_outcomes(3, 1), RunStatus::Partial);
        assert_eq!(RunStatus::from_query_outcomes(3, 0), RunStatus::Success);
        assert_eq!(RunStatus::from_query_outcomes(0, 0), RunStatus::Success);
    }

    #[test]
    fn category_parse_is_case_insensitive() {
        assert_eq!("Filament".parse::<Category>(), Ok(Category::Filament));
        assert!("toaster".parse::<Category>().is_err());
    }

    #[test]
    fn status_round_trips_through_str() {
        for s in [RunStatus::Success, RunStatus::Partial, RunStatus::Failed] {
            assert_eq!(s.as_str().parse::<RunStatus>(), Ok(s));
        }
    }
}
