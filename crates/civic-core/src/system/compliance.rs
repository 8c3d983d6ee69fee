//! Document status counts and compliance percentage.

use crate::document::{Document, DocumentFile, DocumentStatus, status_of};
use crate::entry::Entry;
use crate::error::CoreError;
use crate::storage::Reader;
use crate::EntryId;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Document counts by status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceSummary {
    pub entries: usize,
    pub documents: usize,
    pub missing: usize,
    pub waiting: usize,
    pub approved: usize,
    pub expiring: usize,
    pub expired: usize,
    pub refused: usize,
}

impl ComplianceSummary {
    fn count(&mut self, status: DocumentStatus) {
        self.documents += 1;
        match status {
            DocumentStatus::Missing => self.missing += 1,
            DocumentStatus::Waiting => self.waiting += 1,
            DocumentStatus::Approved => self.approved += 1,
            DocumentStatus::Expiring => self.expiring += 1,
            DocumentStatus::Expired => self.expired += 1,
            DocumentStatus::Refused => self.refused += 1,
        }
    }

    /// Documents with a valid approved file.
    #[must_use]
    pub fn compliant(&self) -> usize {
        self.approved + self.expiring
    }

    /// Integer percentage of compliant documents, 100 when there are none.
    #[must_use]
    pub fn compliance_percent(&self) -> u8 {
        if self.documents == 0 {
            return 100;
        }
        ((self.compliant() * 100) / self.documents) as u8
    }
}

/// Summary over every entry, or a single one.
///
/// With `published_only`, unpublished entries and their documents are
/// skipped, as are unpublished documents.
pub fn compliance_summary(
    reader: &impl Reader,
    entry: Option<EntryId>,
    today: NaiveDate,
    warn_days: i64,
    published_only: bool,
) -> Result<ComplianceSummary, CoreError> {
    let visible: BTreeSet<EntryId> = reader
        .filter::<Entry>(|e| entry.is_none_or(|id| e.id == id) && (!published_only || e.is_published))?
        .into_iter()
        .map(|e| e.id)
        .collect();

    let mut files: BTreeMap<_, Vec<DocumentFile>> = BTreeMap::new();
    for file in reader.list::<DocumentFile>()? {
        files.entry(file.document).or_default().push(file);
    }

    let mut summary = ComplianceSummary {
        entries: visible.len(),
        ..ComplianceSummary::default()
    };
    for document in reader.filter::<Document>(|d| visible.contains(&d.entry) && (!published_only || d.is_published))? {
        let document_files = files.get(&document.id).map(Vec::as_slice).unwrap_or_default();
        summary.count(status_of(&document, document_files, today, warn_days));
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]

    use super::*;
    use crate::document::{DocumentInput, DocumentMutation, FileInput, add_file, approve_file};
    use crate::entry::{EntryInput, EntryKind, EntryMutation, EntryTypeInput, EntryTypeMutation};
    use crate::mutation::{self, Actor, MutationContext};
    use crate::{TenantDb, TenantId};

    #[test]
    fn percent_handles_empty_and_rounds_down() {
        assert_eq!(ComplianceSummary::default().compliance_percent(), 100);
        let summary = ComplianceSummary {
            documents: 3,
            approved: 1,
            expiring: 1,
            missing: 1,
            ..ComplianceSummary::default()
        };
        assert_eq!(summary.compliance_percent(), 66);
    }

    #[test]
    fn summary_counts_statuses() {
        let dir = tempfile::tempdir().unwrap();
        let db = TenantDb::open(TenantId::new("acme").unwrap(), dir.path().join("a.redb")).unwrap();
        let ctx = MutationContext::new(Actor::System);
        let providers = mutation::create::<EntryTypeMutation>(
            &db,
            EntryTypeInput {
                name: Some("Providers".into()),
                kind: Some(EntryKind::Provider),
                ..EntryTypeInput::default()
            },
            &ctx,
        )
        .unwrap()
        .model;
        let entry = mutation::create::<EntryMutation>(
            &db,
            EntryInput {
                entry_type: Some(providers.id),
                name: Some("Acme".into()),
                document_number: Some("52998224725".into()),
                ..EntryInput::default()
            },
            &ctx,
        )
        .unwrap()
        .model;

        let mut documents = Vec::new();
        for name in ["Alvará", "Contrato"] {
            let input = DocumentInput {
                entry: Some(entry.id),
                name: Some(name.into()),
                ..DocumentInput::default()
            };
            documents.push(mutation::create::<DocumentMutation>(&db, input, &ctx).unwrap().model);
        }
        db.write(|tx| {
            let file = add_file(
                tx,
                documents[0].id,
                FileInput {
                    file_url: "https://files.acme.gov/alvara.pdf".into(),
                    ..FileInput::default()
                },
                &ctx,
            )?;
            approve_file(tx, file.model.id, &ctx)
        })
        .unwrap();

        let today = ctx.today();
        let summary = db.read(|tx| compliance_summary(tx, None, today, 15, false)).unwrap();
        assert_eq!(summary.entries, 1);
        assert_eq!(summary.documents, 2);
        assert_eq!(summary.approved, 1);
        assert_eq!(summary.missing, 1);
        assert_eq!(summary.compliance_percent(), 50);

        let other = db.read(|tx| compliance_summary(tx, Some(EntryId(99)), today, 15, false)).unwrap();
        assert_eq!(other, ComplianceSummary::default());

        let public = db.read(|tx| compliance_summary(tx, None, today, 15, true)).unwrap();
        assert_eq!(public, ComplianceSummary::default());

        mutation::update::<EntryMutation>(
            &db,
            entry.id.0,
            EntryInput {
                is_published: Some(true),
                ..EntryInput::default()
            },
            &ctx,
        )
        .unwrap();
        mutation::update::<DocumentMutation>(
            &db,
            documents[0].id.0,
            DocumentInput {
                is_published: Some(true),
                ..DocumentInput::default()
            },
            &ctx,
        )
        .unwrap();
        let public = db.read(|tx| compliance_summary(tx, Some(entry.id), today, 15, true)).unwrap();
        assert_eq!(public.entries, 1);
        assert_eq!(public.documents, 1);
        assert_eq!(public.approved, 1);
    }
}
