//! Intermediate dataset dumps
//!
//! Tab-separated snapshots of the classified sets, written for operators
//! after classification. Dumps are diagnostics: a failed write is logged and
//! the run carries on.

use crate::classifier::{Case, ClassifiedSets};
use crate::dataset::{Datasets, ProtectionRecord};
use std::fmt::Write as _;
use std::path::Path;

pub const INDEF_SEMI: &str = "indefSemiprotectedItems.tsv";
pub const PROTECTED_HIGHLY_USED: &str = "protectedHighlyUsed.tsv";
pub const PROTECTED_NOT_HIGHLY_USED: &str = "protectedNotHighlyUsed.tsv";
pub const TO_ADD: &str = "protectionToAdd.tsv";
pub const TO_LIFT: &str = "protectionToLift.tsv";
pub const IN_COOLDOWN: &str = "protectionInCooldown.tsv";
pub const ALREADY_SET: &str = "protectedAlreadySet.tsv";

/// Write every dump into `dir`. Returns how many files were written.
pub fn write_all(dir: &Path, data: &Datasets, sets: &ClassifiedSets) -> usize {
    if let Err(err) = std::fs::create_dir_all(dir) {
        tracing::warn!(dir = %dir.display(), error = %err, "cannot create dataset dump directory");
        return 0;
    }

    let files = [
        (INDEF_SEMI, protections_tsv(&data.protections)),
        (PROTECTED_HIGHLY_USED, protections_tsv(&sets.protected_trusted)),
        (PROTECTED_NOT_HIGHLY_USED, protections_tsv(&sets.protected_untrusted)),
        (TO_ADD, cases_tsv(&sets.to_add)),
        (TO_LIFT, cases_tsv(&sets.to_lift)),
        (IN_COOLDOWN, cases_tsv(&sets.in_cooldown)),
        (ALREADY_SET, cases_tsv(&sets.already_set_other)),
    ];

    let mut written = 0;
    for (name, body) in files {
        let path = dir.join(name);
        match std::fs::write(&path, body) {
            Ok(()) => written += 1,
            Err(err) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to write dataset dump"
                );
            }
        }
    }
    tracing::debug!(written, dir = %dir.display(), "wrote dataset dumps");
    written
}

fn protections_tsv(rows: &[ProtectionRecord]) -> String {
    let mut out = String::from("item_id\tapplied_at\tactor\n");
    for row in rows {
        let _ = writeln!(out, "{}\t{}\t{}", row.item_id, row.applied_at, row.actor);
    }
    out
}

fn cases_tsv(cases: &[Case]) -> String {
    let mut out = String::from("item_id\tusage_count\tactor\n");
    for case in cases {
        let usage = case.usage_count.map(|n| n.to_string()).unwrap_or_default();
        let actor = case.actor.as_deref().unwrap_or_default();
        let _ = writeln!(out, "{}\t{usage}\t{actor}", case.item_id);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{Thresholds, classify};
    use crate::dataset::UsageRecord;
    use std::collections::BTreeSet;

    #[test]
    fn test_write_all_creates_every_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let data = Datasets {
            protections: vec![ProtectionRecord {
                item_id: "Q1".to_string(),
                applied_at: 20200101000000,
                actor: "trusted1".to_string(),
            }],
            usage: vec![UsageRecord {
                item_id: "Q2".to_string(),
                usage_count: 900,
            }],
            ..Default::default()
        };
        let trusted = BTreeSet::from(["trusted1".to_string()]);
        let sets = classify(&data, Thresholds::new(500, 300).expect("valid"), &trusted);

        let out = dir.path().join("dataframe");
        assert_eq!(write_all(&out, &data, &sets), 7);

        let lift = std::fs::read_to_string(out.join(TO_LIFT)).expect("read");
        assert_eq!(lift, "item_id\tusage_count\tactor\nQ1\t\ttrusted1\n");
        let add = std::fs::read_to_string(out.join(TO_ADD)).expect("read");
        assert_eq!(add, "item_id\tusage_count\tactor\nQ2\t900\t\n");
    }
}
