//! Parsing of dump and restore tool output.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::ValidationError;

static DONE_DUMPING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"done dumping ([^.\s]+)\.(\S+) \((\d+) documents?\)").expect("valid regex")
});

static RESTORE_SUMMARY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+) document\(s\) restored successfully\. (\d+) document\(s\) failed")
        .expect("valid regex")
});

/// Collections observed in a dump, with their document counts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DumpInventory {
    collections: BTreeMap<String, u64>,
}

impl DumpInventory {
    /// Collect every `done dumping <db>.<collection> (<n> documents)` line.
    pub fn parse(output: &str) -> Self {
        let collections = DONE_DUMPING
            .captures_iter(output)
            .filter_map(|caps| {
                let count = caps[3].parse().ok()?;
                Some((caps[2].to_string(), count))
            })
            .collect();
        Self { collections }
    }

    pub fn contains(&self, collection: &str) -> bool {
        self.collections.contains_key(collection)
    }

    pub fn documents(&self, collection: &str) -> Option<u64> {
        self.collections.get(collection).copied()
    }

    /// Collection names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.collections.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.collections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, u64)> for DumpInventory {
    fn from_iter<I: IntoIterator<Item = (S, u64)>>(iter: I) -> Self {
        Self {
            collections: iter.into_iter().map(|(name, n)| (name.into(), n)).collect(),
        }
    }
}

/// Document totals reported at the end of a restore.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestoreSummary {
    pub restored: u64,
    pub failed: u64,
}

impl RestoreSummary {
    pub fn parse(output: &str) -> Option<Self> {
        let caps = RESTORE_SUMMARY.captures_iter(output).last()?;
        Some(Self {
            restored: caps[1].parse().ok()?,
            failed: caps[2].parse().ok()?,
        })
    }

    /// At least one document restored and none failed.
    pub fn check(self) -> Result<Self, ValidationError> {
        if self.restored == 0 || self.failed > 0 {
            return Err(ValidationError::RestoreSummary {
                restored: self.restored,
                failed: self.failed,
            });
        }
        Ok(self)
    }
}

/// Parse and check the restore summary, treating a missing one as a failure.
pub fn check_restore_output(output: &str) -> Result<RestoreSummary, ValidationError> {
    RestoreSummary::parse(output)
        .ok_or(ValidationError::MissingSummary)?
        .check()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const DUMP_OUTPUT: &str = "\
2024-05-01T10:00:00.000+0000\twriting app.users to archive 'app-1714557600.gz'
2024-05-01T10:00:00.001+0000\twriting app.orders to archive 'app-1714557600.gz'
2024-05-01T10:00:00.010+0000\tdone dumping app.users (3 documents)
2024-05-01T10:00:00.020+0000\tdone dumping app.orders (1 document)
2024-05-01T10:00:00.021+0000\tdone dumping app.system.views (0 documents)
";

    #[test]
    fn test_parse_dump_inventory() {
        let inventory = DumpInventory::parse(DUMP_OUTPUT);
        assert_eq!(inventory.len(), 3);
        assert_eq!(inventory.documents("users"), Some(3));
        assert_eq!(inventory.documents("orders"), Some(1));
        assert!(inventory.contains("system.views"));
        assert_eq!(
            inventory.names().collect::<Vec<_>>(),
            vec!["orders", "system.views", "users"]
        );
    }

    #[test]
    fn test_parse_empty_output() {
        assert!(DumpInventory::parse("").is_empty());
        assert!(DumpInventory::parse("writing app.users to archive").is_empty());
    }

    #[test]
    fn test_restore_summary() {
        let output = "2024-05-01T10:00:01.000+0000\t4 document(s) restored successfully. 0 document(s) failed to restore.";
        assert_eq!(
            check_restore_output(output).unwrap(),
            RestoreSummary {
                restored: 4,
                failed: 0
            }
        );
    }

    #[test]
    fn test_restore_summary_failures() {
        let partial = "3 document(s) restored successfully. 1 document(s) failed to restore.";
        assert!(matches!(
            check_restore_output(partial),
            Err(ValidationError::RestoreSummary { restored: 3, failed: 1 })
        ));

        let nothing = "0 document(s) restored successfully. 0 document(s) failed to restore.";
        assert!(matches!(
            check_restore_output(nothing),
            Err(ValidationError::RestoreSummary { restored: 0, .. })
        ));

        assert!(matches!(
            check_restore_output("finished restoring"),
            Err(ValidationError::MissingSummary)
        ));
    }
}
