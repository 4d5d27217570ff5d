//! Imputation audit trail.
//!
//! Every cascade step reports how many values it resolved. The counts are
//! logged as they happen and collected here so callers can report them.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub stage: String,
    pub table: String,
    pub column: String,
    /// Cascade step or action, for example `host`, `global` or `dropped`.
    pub step: String,
    pub count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImputationAudit {
    records: Vec<AuditRecord>,
}

impl ImputationAudit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, stage: &str, table: &str, column: &str, step: &str, count: usize) {
        self.records.push(AuditRecord {
            stage: stage.to_string(),
            table: table.to_string(),
            column: column.to_string(),
            step: step.to_string(),
            count,
        });
    }

    pub fn records(&self) -> &[AuditRecord] {
        &self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Count recorded for one column and step, summed across stages.
    pub fn count_for(&self, column: &str, step: &str) -> usize {
        self.records
            .iter()
            .filter(|record| record.column == column && record.step == step)
            .map(|record| record.count)
            .sum()
    }

    /// Records with a non-zero count.
    pub fn non_zero(&self) -> impl Iterator<Item = &AuditRecord> {
        self.records.iter().filter(|record| record.count > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_sum_across_stages() {
        let mut audit = ImputationAudit::new();
        audit.record("impute", "listings", "beds", "group", 3);
        audit.record("impute", "listings", "beds", "global", 0);
        audit.record("build", "listings", "beds", "group", 2);
        assert_eq!(audit.count_for("beds", "group"), 5);
        assert_eq!(audit.non_zero().count(), 2);
    }

    #[test]
    fn audit_serializes() {
        let mut audit = ImputationAudit::new();
        audit.record("impute", "calendar", "available", "default", 1);
        let json = serde_json::to_string(&audit).expect("serialize audit");
        let round: ImputationAudit = serde_json::from_str(&json).expect("deserialize audit");
        assert_eq!(round, audit);
    }
}
