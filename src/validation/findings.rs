use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Severity of a finding. Declaration order is display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Warning,
    Info,
}

impl Severity {
    pub const ALL: [Severity; 3] = [Severity::Critical, Severity::Warning, Severity::Info];

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::Warning => "warning",
            Severity::Info => "info",
        }
    }

    /// Map whatever the backend reports onto the three buckets. Unknown
    /// labels are informational.
    pub fn parse_lenient(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "critical" | "error" | "high" | "severe" => Severity::Critical,
            "warning" | "warn" | "medium" | "moderate" => Severity::Warning,
            _ => Severity::Info,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One reported issue. `content` is markdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub content: String,
    pub severity: Severity,
    pub category: String,
}

impl Finding {
    pub fn new(
        category: impl Into<String>,
        severity: Severity,
        content: impl Into<String>,
    ) -> Self {
        Self {
            content: content.into(),
            severity,
            category: category.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum SeverityFilter {
    #[default]
    All,
    Only(Severity),
}

impl SeverityFilter {
    pub fn admits(self, severity: Severity) -> bool {
        match self {
            SeverityFilter::All => true,
            SeverityFilter::Only(wanted) => wanted == severity,
        }
    }
}

impl FromStr for SeverityFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(SeverityFilter::All),
            "critical" => Ok(SeverityFilter::Only(Severity::Critical)),
            "warning" => Ok(SeverityFilter::Only(Severity::Warning)),
            "info" => Ok(SeverityFilter::Only(Severity::Info)),
            other => Err(format!(
                "unknown severity filter '{other}' (expected all, critical, warning or info)"
            )),
        }
    }
}

/// Counts per severity over the unfiltered findings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SummaryCounts {
    pub critical: usize,
    pub warning: usize,
    pub info: usize,
}

impl SummaryCounts {
    pub fn count(&self, severity: Severity) -> usize {
        match severity {
            Severity::Critical => self.critical,
            Severity::Warning => self.warning,
            Severity::Info => self.info,
        }
    }

    pub fn total(&self) -> usize {
        self.critical + self.warning + self.info
    }

    fn add(&mut self, severity: Severity) {
        match severity {
            Severity::Critical => self.critical += 1,
            Severity::Warning => self.warning += 1,
            Severity::Info => self.info += 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeverityBucket {
    pub severity: Severity,
    pub findings: Vec<Finding>,
}

/// All findings of one category, split into the three severity buckets in
/// display order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryGroup {
    pub category: String,
    pub expanded: bool,
    pub buckets: Vec<SeverityBucket>,
}

impl CategoryGroup {
    pub fn visible_count(&self) -> usize {
        self.buckets.iter().map(|bucket| bucket.findings.len()).sum()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FindingsViewModel {
    pub summary: SummaryCounts,
    pub categories: Vec<CategoryGroup>,
}

/// Category names in first-seen order.
pub fn categories(findings: &[Finding]) -> Vec<String> {
    let mut seen = HashSet::new();
    findings
        .iter()
        .filter(|finding| seen.insert(finding.category.as_str()))
        .map(|finding| finding.category.clone())
        .collect()
}

/// Group, filter and summarise findings for display.
///
/// Categories keep first-seen order. Buckets outside `filter` are emptied,
/// and a category whose buckets all end up empty is dropped. The summary
/// always counts every finding. Unknown names in `expanded` are ignored.
pub fn build_view(
    findings: &[Finding],
    filter: SeverityFilter,
    expanded: &HashSet<String>,
) -> FindingsViewModel {
    let mut summary = SummaryCounts::default();
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut groups: Vec<CategoryGroup> = Vec::new();

    for finding in findings {
        summary.add(finding.severity);

        let slot = *index.entry(finding.category.as_str()).or_insert_with(|| {
            groups.push(CategoryGroup {
                category: finding.category.clone(),
                expanded: expanded.contains(&finding.category),
                buckets: Severity::ALL
                    .iter()
                    .map(|&severity| SeverityBucket {
                        severity,
                        findings: Vec::new(),
                    })
                    .collect(),
            });
            groups.len() - 1
        });

        if filter.admits(finding.severity) {
            let bucket = Severity::ALL
                .iter()
                .position(|&s| s == finding.severity)
                .unwrap_or(Severity::ALL.len() - 1);
            groups[slot].buckets[bucket].findings.push(finding.clone());
        }
    }

    groups.retain(|group| group.visible_count() > 0);
    FindingsViewModel {
        summary,
        categories: groups,
    }
}
