//! Monthly investment statements published on the transparency site.

use crate::error::{CoreError, ErrorCode, FieldError, ValidationErrors};
use crate::mutation::{ModelMutation, MutationContext};
use crate::primitives::{MAX_INVESTMENT_ITEMS, MAX_NAME_LENGTH};
use crate::storage::{Reader, WriteTx, record};
use crate::InvestmentId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvestmentItem {
    pub name: String,
    /// Amount in cents.
    pub value_cents: i64,
}

/// Investments of one month. `(year, month)` is unique per tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Investment {
    pub id: InvestmentId,
    pub year: i32,
    pub month: u32,
    pub is_published: bool,
    pub items: Vec<InvestmentItem>,
}

record!(Investment, id, "investment", "investments");

impl Investment {
    /// Sum of all items, saturating instead of overflowing.
    #[must_use]
    pub fn total_cents(&self) -> i64 {
        self.items.iter().fold(0i64, |total, item| total.saturating_add(item.value_cents))
    }
}

/// Investments ordered by period, newest first.
pub fn list_investments(
    reader: &impl Reader,
    year: Option<i32>,
    published_only: bool,
) -> Result<Vec<Investment>, CoreError> {
    let mut investments = reader.filter::<Investment>(|i| {
        year.is_none_or(|y| i.year == y) && (!published_only || i.is_published)
    })?;
    investments.sort_by(|a, b| (b.year, b.month).cmp(&(a.year, a.month)));
    Ok(investments)
}

#[derive(Debug, Clone, Default)]
pub struct InvestmentInput {
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub is_published: Option<bool>,
    /// Replaces every item when given.
    pub items: Option<Vec<InvestmentItem>>,
}

#[derive(Debug)]
pub struct CleanedInvestmentInput {
    year: Option<i32>,
    month: Option<u32>,
    is_published: Option<bool>,
    items: Option<Vec<InvestmentItem>>,
}

pub struct InvestmentMutation;

impl ModelMutation for InvestmentMutation {
    type Model = Investment;
    type Input = InvestmentInput;
    type Cleaned = CleanedInvestmentInput;

    fn clean_input(
        tx: &WriteTx,
        instance: Option<&Investment>,
        input: InvestmentInput,
        _ctx: &MutationContext,
    ) -> Result<CleanedInvestmentInput, CoreError> {
        let mut errors = ValidationErrors::new();
        if instance.is_none() {
            if input.year.is_none() {
                errors.push(FieldError::required("year"));
            }
            if input.month.is_none() {
                errors.push(FieldError::required("month"));
            }
        }
        if input.year.is_some_and(|y| !(1900..=9999).contains(&y)) {
            errors.push(FieldError::new("year", ErrorCode::Invalid, "Year must be between 1900 and 9999."));
        }
        if input.month.is_some_and(|m| !(1..=12).contains(&m)) {
            errors.push(FieldError::new("month", ErrorCode::Invalid, "Month must be between 1 and 12."));
        }

        let year = input.year.or(instance.map(|i| i.year));
        let month = input.month.or(instance.map(|i| i.month));
        if let (Some(year), Some(month)) = (year, month) {
            let own_id = instance.map(|i| i.id);
            let clash = tx.find::<Investment>(|i| i.year == year && i.month == month && Some(i.id) != own_id)?;
            if clash.is_some() {
                errors.push(FieldError::new(
                    "month",
                    ErrorCode::Unique,
                    format!("An investment for {month:02}/{year} already exists."),
                ));
            }
        }

        let items = match input.items {
            None => None,
            Some(items) => {
                if items.len() > MAX_INVESTMENT_ITEMS {
                    errors.push(FieldError::new(
                        "items",
                        ErrorCode::Invalid,
                        format!("At most {MAX_INVESTMENT_ITEMS} items are allowed."),
                    ));
                }
                let mut cleaned = Vec::with_capacity(items.len());
                for item in items {
                    let name = item.name.trim().to_string();
                    if name.is_empty() {
                        errors.push(FieldError::new("items", ErrorCode::Required, "Item name cannot be blank."));
                    } else if name.chars().count() > MAX_NAME_LENGTH {
                        errors.push(FieldError::new("items", ErrorCode::Invalid, "Item name is too long."));
                    } else if item.value_cents < 0 {
                        errors.push(FieldError::new("items", ErrorCode::Invalid, "Item value cannot be negative."));
                    } else {
                        cleaned.push(InvestmentItem {
                            name,
                            value_cents: item.value_cents,
                        });
                    }
                }
                Some(cleaned)
            }
        };

        errors.finish(CleanedInvestmentInput {
            year: input.year,
            month: input.month,
            is_published: input.is_published,
            items,
        })
    }

    fn save(
        tx: &mut WriteTx,
        instance: Option<Investment>,
        cleaned: CleanedInvestmentInput,
        _ctx: &MutationContext,
    ) -> Result<Investment, CoreError> {
        match instance {
            Some(mut investment) => {
                if let Some(year) = cleaned.year {
                    investment.year = year;
                }
                if let Some(month) = cleaned.month {
                    investment.month = month;
                }
                if let Some(published) = cleaned.is_published {
                    investment.is_published = published;
                }
                if let Some(items) = cleaned.items {
                    investment.items = items;
                }
                tx.put(&investment)?;
                Ok(investment)
            }
            None => Ok(tx.insert(Investment {
                id: InvestmentId(0),
                year: cleaned.year.unwrap_or_default(),
                month: cleaned.month.unwrap_or(1),
                is_published: cleaned.is_published.unwrap_or(false),
                items: cleaned.items.unwrap_or_default(),
            })?),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]

    use super::*;
    use crate::mutation::{self, Actor};
    use crate::{TenantDb, TenantId};

    fn item(name: &str, value_cents: i64) -> InvestmentItem {
        InvestmentItem {
            name: name.into(),
            value_cents,
        }
    }

    fn month(year: i32, month: u32, items: Vec<InvestmentItem>) -> InvestmentInput {
        InvestmentInput {
            year: Some(year),
            month: Some(month),
            items: Some(items),
            ..InvestmentInput::default()
        }
    }

    #[test]
    fn total_saturates() {
        let investment = Investment {
            id: InvestmentId(1),
            year: 2026,
            month: 1,
            is_published: true,
            items: vec![item("a", i64::MAX), item("b", 10)],
        };
        assert_eq!(investment.total_cents(), i64::MAX);
    }

    #[test]
    fn period_is_unique_and_month_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let db = TenantDb::open(TenantId::new("acme").unwrap(), dir.path().join("a.redb")).unwrap();
        let ctx = MutationContext::new(Actor::System);

        let january = mutation::create::<InvestmentMutation>(&db, month(2026, 1, vec![item("Fuel", 125_000)]), &ctx)
            .unwrap()
            .model;
        assert_eq!(january.total_cents(), 125_000);

        let duplicate = mutation::create::<InvestmentMutation>(&db, month(2026, 1, vec![]), &ctx).unwrap_err();
        assert_eq!(duplicate.field_errors()[0].code, ErrorCode::Unique);

        let invalid = mutation::create::<InvestmentMutation>(&db, month(2026, 13, vec![item(" ", 1)]), &ctx)
            .unwrap_err();
        assert_eq!(invalid.field_errors().len(), 2);

        mutation::create::<InvestmentMutation>(&db, month(2025, 12, vec![]), &ctx).unwrap();
        let update = InvestmentInput {
            is_published: Some(true),
            ..InvestmentInput::default()
        };
        mutation::update::<InvestmentMutation>(&db, january.id.0, update, &ctx).unwrap();

        let all = db.read(|tx| list_investments(tx, None, false)).unwrap();
        assert_eq!((all[0].year, all[0].month), (2026, 1));
        let published = db.read(|tx| list_investments(tx, None, true)).unwrap();
        assert_eq!(published.len(), 1);
    }
}
