//! # Attribute Assignment
//!
//! Validates attribute inputs sent alongside an entry or a document and
//! turns them into stored [`AttributeValue`]s.
//!
//! Value storage by input type:
//!
//! | Input type            | Value slug               | Shared between owners |
//! |-----------------------|--------------------------|-----------------------|
//! | dropdown, multiselect | `slugify(name)`          | yes                   |
//! | boolean               | `<attr>_true` / `_false` | yes                   |
//! | text, date, file, num | `<owner>_<attr>`         | no                    |
//! | reference             | `<owner>_<entry>`        | no                    |
//!
//! Per-owner values are removed together with their owner.

use crate::attribute::{Attribute, AttributeTarget, AttributeValue, InputType};
use crate::error::{CoreError, ErrorCode, FieldError, StoreError};
use crate::primitives::{MAX_ATTRIBUTE_VALUE_LENGTH, MAX_NAME_LENGTH, MAX_TEXT_LENGTH};
use crate::slug::slugify;
use crate::storage::{Reader, WriteTx};
use crate::validation::{validate_decimal, validate_url};
use crate::{AttributeId, AttributeValueId, DocumentId, Entry, EntryId};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// The values an owner holds for one attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignedAttribute {
    pub attribute: AttributeId,
    pub values: Vec<AttributeValueId>,
}

/// Model that carries attribute assignments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeOwner {
    Entry(EntryId),
    Document(DocumentId),
}

impl AttributeOwner {
    #[must_use]
    pub fn target(&self) -> AttributeTarget {
        match self {
            Self::Entry(_) => AttributeTarget::Entry,
            Self::Document(_) => AttributeTarget::Document,
        }
    }

    /// Prefix of the slugs of values private to this owner.
    fn value_prefix(&self) -> String {
        format!("{self}_")
    }
}

impl fmt::Display for AttributeOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Entry(id) => write!(f, "entry-{id}"),
            Self::Document(id) => write!(f, "document-{id}"),
        }
    }
}

/// One attribute as sent by a client. Only the fields matching the
/// attribute's input type are read.
#[derive(Debug, Clone, Default)]
pub struct AttributeAssignmentInput {
    pub id: AttributeId,
    /// Choice names for dropdown and multiselect; one decimal for numeric.
    pub values: Vec<String>,
    pub boolean: Option<bool>,
    pub date: Option<NaiveDate>,
    pub plain_text: Option<String>,
    pub file_url: Option<String>,
    pub content_type: Option<String>,
    pub references: Vec<EntryId>,
}

/// Validated payload of one attribute input.
#[derive(Debug, Clone, PartialEq)]
pub enum CleanedValue {
    Choices(Vec<String>),
    Boolean(Option<bool>),
    Date(Option<NaiveDate>),
    PlainText(Option<String>),
    File(Option<(String, Option<String>)>),
    Numeric(Option<String>),
    References(Vec<EntryId>),
}

impl CleanedValue {
    /// An empty payload clears the assignment.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Choices(values) => values.is_empty(),
            Self::References(refs) => refs.is_empty(),
            Self::Boolean(v) => v.is_none(),
            Self::Date(v) => v.is_none(),
            Self::PlainText(v) | Self::Numeric(v) => v.is_none(),
            Self::File(v) => v.is_none(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CleanedAttribute {
    pub attribute: Attribute,
    pub value: CleanedValue,
}

/// Errors collected while cleaning, grouped by code and message so that one
/// error lists every attribute it applies to.
#[derive(Default)]
struct GroupedErrors {
    groups: BTreeMap<(ErrorCode, String), Vec<AttributeId>>,
}

impl GroupedErrors {
    fn add(&mut self, code: ErrorCode, message: &str, attribute: AttributeId) {
        let ids = self.groups.entry((code, message.to_string())).or_default();
        if !ids.contains(&attribute) {
            ids.push(attribute);
        }
    }

    fn into_field_errors(self) -> Vec<FieldError> {
        self.groups
            .into_iter()
            .map(|((code, message), ids)| FieldError::new("attributes", code, message).with_attributes(ids))
            .collect()
    }
}

pub struct AttributeAssignment;

impl AttributeAssignment {
    /// Validate `inputs` against the attributes `allowed` for the owner's type.
    ///
    /// When `creating`, every required attribute in `allowed` must be present.
    pub fn clean_input(
        reader: &impl Reader,
        allowed: &[AttributeId],
        target: AttributeTarget,
        inputs: Vec<AttributeAssignmentInput>,
        creating: bool,
    ) -> Result<Vec<CleanedAttribute>, CoreError> {
        let mut errors = GroupedErrors::default();
        let mut seen = BTreeSet::new();
        let mut cleaned = Vec::with_capacity(inputs.len());

        for input in inputs {
            let id = input.id;
            if !seen.insert(id) {
                errors.add(ErrorCode::DuplicatedInputItem, "Duplicated attribute in input.", id);
                continue;
            }
            let Some(attribute) = reader.get::<Attribute>(id.0)? else {
                errors.add(ErrorCode::NotFound, "Attribute not found.", id);
                continue;
            };
            if attribute.target != target || !allowed.contains(&id) {
                errors.add(ErrorCode::Invalid, "Attribute is not assigned to this type.", id);
                continue;
            }
            if let Some(value) = clean_value(reader, &attribute, input, &mut errors)? {
                if attribute.value_required && value.is_empty() {
                    errors.add(ErrorCode::Required, "Attribute value is required.", id);
                    continue;
                }
                cleaned.push(CleanedAttribute { attribute, value });
            }
        }

        if creating {
            for id in allowed.iter().filter(|id| !seen.contains(*id)) {
                if reader.get::<Attribute>(id.0)?.is_some_and(|a| a.value_required) {
                    errors.add(ErrorCode::Required, "Attribute value is required.", *id);
                }
            }
        }

        let errors = errors.into_field_errors();
        if errors.is_empty() {
            Ok(cleaned)
        } else {
            Err(CoreError::Validation(errors))
        }
    }

    /// Store the values of `cleaned` and update `assignments` in place.
    pub fn save(
        tx: &mut WriteTx,
        owner: AttributeOwner,
        assignments: &mut Vec<AssignedAttribute>,
        cleaned: Vec<CleanedAttribute>,
    ) -> Result<(), CoreError> {
        for CleanedAttribute { attribute, value } in cleaned {
            let ids = if value.is_empty() {
                Vec::new()
            } else {
                save_values(tx, owner, &attribute, value)?
            };
            drop_stale_owner_values(tx, owner, attribute.id, &ids)?;

            match assignments.iter_mut().find(|a| a.attribute == attribute.id) {
                Some(existing) if ids.is_empty() => existing.values.clear(),
                Some(existing) => existing.values = ids,
                None if ids.is_empty() => {}
                None => assignments.push(AssignedAttribute {
                    attribute: attribute.id,
                    values: ids,
                }),
            }
            assignments.retain(|a| !a.values.is_empty());
        }
        Ok(())
    }
}

fn clean_value(
    reader: &impl Reader,
    attribute: &Attribute,
    input: AttributeAssignmentInput,
    errors: &mut GroupedErrors,
) -> Result<Option<CleanedValue>, StoreError> {
    let id = attribute.id;
    let value = match attribute.input_type {
        InputType::Dropdown | InputType::Multiselect => {
            let mut names: Vec<String> = Vec::new();
            let mut valid = true;
            for raw in &input.values {
                let name = raw.trim();
                if name.is_empty() {
                    errors.add(ErrorCode::Required, "Attribute values cannot be blank.", id);
                    valid = false;
                } else if name.chars().count() > MAX_ATTRIBUTE_VALUE_LENGTH {
                    errors.add(ErrorCode::Invalid, "Attribute values cannot be longer than 250 characters.", id);
                    valid = false;
                } else if names.iter().any(|n| slugify(n) == slugify(name)) {
                    errors.add(ErrorCode::DuplicatedInputItem, "Duplicated attribute values are provided.", id);
                    valid = false;
                } else {
                    names.push(name.to_string());
                }
            }
            if attribute.input_type == InputType::Dropdown && input.values.len() > 1 {
                errors.add(ErrorCode::Invalid, "Attribute must take only one value.", id);
                valid = false;
            }
            valid.then_some(CleanedValue::Choices(names))
        }
        InputType::Boolean => Some(CleanedValue::Boolean(input.boolean)),
        InputType::Date => Some(CleanedValue::Date(input.date)),
        InputType::PlainText => {
            let text = input.plain_text.map(|t| t.trim().to_string()).filter(|t| !t.is_empty());
            if text.as_ref().is_some_and(|t| t.chars().count() > MAX_TEXT_LENGTH) {
                errors.add(ErrorCode::Invalid, "Attribute text is too long.", id);
                None
            } else {
                Some(CleanedValue::PlainText(text))
            }
        }
        InputType::Numeric => match input.values.as_slice() {
            [] => Some(CleanedValue::Numeric(None)),
            [raw] => match validate_decimal(raw) {
                Some(number) => Some(CleanedValue::Numeric(Some(number))),
                None => {
                    errors.add(ErrorCode::Invalid, "Value of numeric attribute must be numeric.", id);
                    None
                }
            },
            _ => {
                errors.add(ErrorCode::Invalid, "Attribute must take only one value.", id);
                None
            }
        },
        InputType::File => match input.file_url.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
            None => Some(CleanedValue::File(None)),
            Some(raw) => match validate_url(raw) {
                Some(url) => Some(CleanedValue::File(Some((url, input.content_type)))),
                None => {
                    errors.add(ErrorCode::Invalid, "File URL is invalid.", id);
                    None
                }
            },
        },
        InputType::Reference => {
            let mut refs = Vec::new();
            let mut valid = true;
            for entry in input.references {
                if refs.contains(&entry) {
                    errors.add(ErrorCode::DuplicatedInputItem, "Duplicated references are provided.", id);
                    valid = false;
                } else if !reader.exists::<Entry>(entry.0)? {
                    errors.add(ErrorCode::NotFound, "Referenced entry does not exist.", id);
                    valid = false;
                } else {
                    refs.push(entry);
                }
            }
            valid.then_some(CleanedValue::References(refs))
        }
    };
    Ok(value)
}

fn truncate_name(raw: &str) -> String {
    raw.chars().take(MAX_NAME_LENGTH).collect()
}

/// Value of `attribute` with `slug`, created from `build` when missing.
fn get_or_create(
    tx: &mut WriteTx,
    attribute: &Attribute,
    slug: &str,
    build: impl FnOnce(AttributeValue) -> AttributeValue,
) -> Result<AttributeValue, StoreError> {
    if let Some(existing) = tx.find::<AttributeValue>(|v| v.attribute == attribute.id && v.slug == slug)? {
        return Ok(existing);
    }
    let sort_order = tx
        .filter::<AttributeValue>(|v| v.attribute == attribute.id)?
        .iter()
        .map(|v| v.sort_order.saturating_add(1))
        .max()
        .unwrap_or(0);
    let mut value = build(AttributeValue::new(attribute.id, String::new(), slug));
    value.sort_order = sort_order;
    tx.insert(value)
}

/// Value of `attribute` with `slug`, overwritten by `apply` whether new or not.
fn upsert(
    tx: &mut WriteTx,
    attribute: &Attribute,
    slug: &str,
    apply: impl Fn(&mut AttributeValue),
) -> Result<AttributeValue, StoreError> {
    match tx.find::<AttributeValue>(|v| v.attribute == attribute.id && v.slug == slug)? {
        Some(mut existing) => {
            apply(&mut existing);
            tx.put(&existing)?;
            Ok(existing)
        }
        None => get_or_create(tx, attribute, slug, |mut value| {
            apply(&mut value);
            value
        }),
    }
}

fn save_values(
    tx: &mut WriteTx,
    owner: AttributeOwner,
    attribute: &Attribute,
    value: CleanedValue,
) -> Result<Vec<AttributeValueId>, CoreError> {
    let owner_slug = format!("{owner}_{}", attribute.id);
    let ids = match value {
        CleanedValue::Choices(names) => {
            let mut ids = Vec::with_capacity(names.len());
            for name in names {
                let slug = {
                    let s = slugify(&name);
                    if s.is_empty() { "value".to_string() } else { s }
                };
                let value = get_or_create(tx, attribute, &slug, |mut v| {
                    v.name = truncate_name(&name);
                    v
                })?;
                ids.push(value.id);
            }
            ids
        }
        CleanedValue::Boolean(Some(flag)) => {
            let slug = format!("{}_{flag}", attribute.id);
            let label = if flag { "Yes" } else { "No" };
            let value = get_or_create(tx, attribute, &slug, |mut v| {
                v.name = truncate_name(&format!("{}: {label}", attribute.name));
                v.boolean = Some(flag);
                v
            })?;
            vec![value.id]
        }
        CleanedValue::Date(Some(date)) => {
            let value = upsert(tx, attribute, &owner_slug, |v| {
                v.name = date.to_string();
                v.date = Some(date);
            })?;
            vec![value.id]
        }
        CleanedValue::PlainText(Some(text)) => {
            let value = upsert(tx, attribute, &owner_slug, |v| {
                v.name = truncate_name(&text);
                v.plain_text = Some(text.clone());
            })?;
            vec![value.id]
        }
        CleanedValue::Numeric(Some(number)) => {
            let value = upsert(tx, attribute, &owner_slug, |v| {
                v.name = number.clone();
            })?;
            vec![value.id]
        }
        CleanedValue::File(Some((url, content_type))) => {
            let file_name = url.rsplit('/').next().unwrap_or(&url).to_string();
            let value = upsert(tx, attribute, &owner_slug, |v| {
                v.name = truncate_name(&file_name);
                v.file_url = Some(url.clone());
                v.content_type = content_type.clone();
            })?;
            vec![value.id]
        }
        CleanedValue::References(refs) => {
            let mut ids = Vec::with_capacity(refs.len());
            for entry in refs {
                let referenced = tx.require::<Entry>(entry.0)?;
                let slug = format!("{owner}_{entry}");
                let value = upsert(tx, attribute, &slug, |v| {
                    v.name = referenced.name.clone();
                    v.reference = Some(entry);
                })?;
                ids.push(value.id);
            }
            ids
        }
        CleanedValue::Boolean(None)
        | CleanedValue::Date(None)
        | CleanedValue::PlainText(None)
        | CleanedValue::Numeric(None)
        | CleanedValue::File(None) => Vec::new(),
    };
    Ok(ids)
}

/// Remove values private to `owner` for `attribute` that are no longer used.
fn drop_stale_owner_values(
    tx: &mut WriteTx,
    owner: AttributeOwner,
    attribute: AttributeId,
    keep: &[AttributeValueId],
) -> Result<(), StoreError> {
    let prefix = owner.value_prefix();
    tx.remove_where::<AttributeValue>(|v| {
        v.attribute == attribute && v.slug.starts_with(&prefix) && !keep.contains(&v.id)
    })?;
    Ok(())
}

/// Remove every value private to `owner`. Returns how many were removed.
pub fn delete_owner_values(tx: &mut WriteTx, owner: AttributeOwner) -> Result<usize, StoreError> {
    let prefix = owner.value_prefix();
    Ok(tx.remove_where::<AttributeValue>(|v| v.slug.starts_with(&prefix))?.len())
}

/// Assignments resolved to attributes and their values, in assignment order.
pub fn resolve_assignments(
    reader: &impl Reader,
    assignments: &[AssignedAttribute],
) -> Result<Vec<(Attribute, Vec<AttributeValue>)>, StoreError> {
    let mut resolved = Vec::with_capacity(assignments.len());
    for assignment in assignments {
        let Some(attribute) = reader.get::<Attribute>(assignment.attribute.0)? else {
            continue;
        };
        let mut values = Vec::with_capacity(assignment.values.len());
        for id in &assignment.values {
            if let Some(value) = reader.get::<AttributeValue>(id.0)? {
                values.push(value);
            }
        }
        resolved.push((attribute, values));
    }
    Ok(resolved)
}
