//! # Attributes
//!
//! Tenant-configured fields attached to entries or documents. An attribute
//! declares its input type; the values it takes are stored as
//! [`AttributeValue`] records and referenced from the owner's assignment
//! (see [`crate::assignment`]).

use crate::assignment::AssignedAttribute;
use crate::error::{CoreError, ErrorCode, FieldError};
use crate::mutation::{MutationContext, ModelMutation, clean_name, clean_slug, finish};
use crate::storage::{Reader, WriteTx, record};
use crate::{AttributeId, AttributeValueId, Document, Entry, EntryId, EntryType};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// What kind of model an attribute can be attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AttributeTarget {
    Entry,
    Document,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum InputType {
    Dropdown,
    Multiselect,
    PlainText,
    Boolean,
    Date,
    File,
    Reference,
    Numeric,
}

impl InputType {
    /// Types whose values are a shared, predefined list of choices.
    #[must_use]
    pub fn has_choices(&self) -> bool {
        matches!(self, Self::Dropdown | Self::Multiselect)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub id: AttributeId,
    pub name: String,
    pub slug: String,
    pub target: AttributeTarget,
    pub input_type: InputType,
    pub value_required: bool,
    /// Shown on the public transparency site.
    pub visible_in_website: bool,
    pub filterable: bool,
}

record!(Attribute, id, "attribute", "attributes");

/// A value an attribute can take.
///
/// Choice values are shared between owners; text, date, numeric and file
/// values are private to one owner (their slug starts with the owner key).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeValue {
    pub id: AttributeValueId,
    pub attribute: AttributeId,
    pub name: String,
    pub slug: String,
    pub boolean: Option<bool>,
    pub date: Option<NaiveDate>,
    pub plain_text: Option<String>,
    pub file_url: Option<String>,
    pub content_type: Option<String>,
    pub reference: Option<EntryId>,
    pub sort_order: u32,
}

record!(AttributeValue, id, "attribute value", "attribute_values");

impl AttributeValue {
    /// A bare value for `attribute`; the payload fields are filled by callers.
    #[must_use]
    pub fn new(attribute: AttributeId, name: impl Into<String>, slug: impl Into<String>) -> Self {
        Self {
            id: AttributeValueId(0),
            attribute,
            name: name.into(),
            slug: slug.into(),
            boolean: None,
            date: None,
            plain_text: None,
            file_url: None,
            content_type: None,
            reference: None,
            sort_order: 0,
        }
    }
}

/// Values of an attribute ordered by sort order, then id.
pub fn values_of(reader: &impl Reader, attribute: AttributeId) -> Result<Vec<AttributeValue>, CoreError> {
    let mut values = reader.filter::<AttributeValue>(|v| v.attribute == attribute)?;
    values.sort_by_key(|v| (v.sort_order, v.id));
    Ok(values)
}

/// Strip an attribute (or some of its values) out of an assignment list.
/// Returns whether anything changed.
pub(crate) fn prune_assignments(
    assignments: &mut Vec<AssignedAttribute>,
    attribute: Option<AttributeId>,
    value: Option<AttributeValueId>,
) -> bool {
    let before: usize = assignments.iter().map(|a| a.values.len() + 1).sum();
    if let Some(attribute) = attribute {
        assignments.retain(|a| a.attribute != attribute);
    }
    if let Some(value) = value {
        for assignment in assignments.iter_mut() {
            assignment.values.retain(|v| *v != value);
        }
        assignments.retain(|a| !a.values.is_empty());
    }
    let after: usize = assignments.iter().map(|a| a.values.len() + 1).sum();
    before != after
}

/// Remove references to an attribute or value from every entry and document.
pub(crate) fn detach_everywhere(
    tx: &mut WriteTx,
    attribute: Option<AttributeId>,
    value: Option<AttributeValueId>,
) -> Result<(), CoreError> {
    for mut entry in tx.list::<Entry>()? {
        if prune_assignments(&mut entry.attributes, attribute, value) {
            tx.put(&entry)?;
        }
    }
    for mut document in tx.list::<Document>()? {
        if prune_assignments(&mut document.attributes, attribute, value) {
            tx.put(&document)?;
        }
    }
    Ok(())
}

// =============================================================================
// ATTRIBUTE MUTATIONS
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct AttributeInput {
    pub name: Option<String>,
    pub slug: Option<String>,
    /// Set on creation only.
    pub target: Option<AttributeTarget>,
    /// Set on creation only. Defaults to dropdown.
    pub input_type: Option<InputType>,
    pub value_required: Option<bool>,
    pub visible_in_website: Option<bool>,
    pub filterable: Option<bool>,
    /// Initial choices, for dropdown and multiselect attributes.
    pub values: Vec<String>,
}

#[derive(Debug)]
pub struct CleanedAttributeInput {
    name: Option<String>,
    slug: Option<String>,
    target: Option<AttributeTarget>,
    input_type: Option<InputType>,
    value_required: Option<bool>,
    visible_in_website: Option<bool>,
    filterable: Option<bool>,
    values: Vec<String>,
}

pub struct AttributeMutation;

impl ModelMutation for AttributeMutation {
    type Model = Attribute;
    type Input = AttributeInput;
    type Cleaned = CleanedAttributeInput;

    fn clean_input(
        tx: &WriteTx,
        instance: Option<&Attribute>,
        input: AttributeInput,
        _ctx: &MutationContext,
    ) -> Result<CleanedAttributeInput, CoreError> {
        let creating = instance.is_none();
        let mut errors = Vec::new();
        let existing = tx.list::<Attribute>()?;
        let own_id = instance.map(|a| a.id);

        let name = clean_name(&mut errors, "name", input.name, creating);
        let slug = clean_slug(
            &mut errors,
            input.slug,
            if creating { name.as_deref() } else { None },
            "attribute",
            |candidate| existing.iter().any(|a| a.slug == candidate && Some(a.id) != own_id),
        );

        if let Some(current) = instance {
            if input.target.is_some_and(|t| t != current.target) {
                errors.push(FieldError::new("target", ErrorCode::Invalid, "Attribute target cannot be changed."));
            }
            if input.input_type.is_some_and(|t| t != current.input_type) {
                errors.push(FieldError::new("input_type", ErrorCode::Invalid, "Attribute input type cannot be changed."));
            }
        } else if input.target.is_none() {
            errors.push(FieldError::required("target"));
        }

        let input_type = instance
            .map(|a| a.input_type)
            .or(input.input_type)
            .unwrap_or(InputType::Dropdown);

        let mut values: Vec<String> = Vec::new();
        for raw in input.values {
            let value = raw.trim().to_string();
            if value.is_empty() {
                errors.push(FieldError::new("values", ErrorCode::Required, "Attribute values cannot be blank."));
            } else if values.iter().any(|v| crate::slug::slugify(v) == crate::slug::slugify(&value)) {
                errors.push(FieldError::new("values", ErrorCode::DuplicatedInputItem, format!("Duplicated value '{value}'.")));
            } else {
                values.push(value);
            }
        }
        if !values.is_empty() && (!creating || !input_type.has_choices()) {
            errors.push(FieldError::new(
                "values",
                ErrorCode::Invalid,
                "Initial values can only be given when creating a dropdown or multiselect attribute.",
            ));
        }

        finish(errors, || CleanedAttributeInput {
            name,
            slug,
            target: input.target,
            input_type: Some(input_type),
            value_required: input.value_required,
            visible_in_website: input.visible_in_website,
            filterable: input.filterable,
            values,
        })
    }

    fn save(
        tx: &mut WriteTx,
        instance: Option<Attribute>,
        cleaned: CleanedAttributeInput,
        _ctx: &MutationContext,
    ) -> Result<Attribute, CoreError> {
        match instance {
            Some(mut attribute) => {
                if let Some(name) = cleaned.name {
                    attribute.name = name;
                }
                if let Some(slug) = cleaned.slug {
                    attribute.slug = slug;
                }
                if let Some(required) = cleaned.value_required {
                    attribute.value_required = required;
                }
                if let Some(visible) = cleaned.visible_in_website {
                    attribute.visible_in_website = visible;
                }
                if let Some(filterable) = cleaned.filterable {
                    attribute.filterable = filterable;
                }
                tx.put(&attribute)?;
                Ok(attribute)
            }
            None => {
                let attribute = tx.insert(Attribute {
                    id: AttributeId(0),
                    name: cleaned.name.unwrap_or_default(),
                    slug: cleaned.slug.unwrap_or_default(),
                    target: cleaned.target.unwrap_or(AttributeTarget::Entry),
                    input_type: cleaned.input_type.unwrap_or(InputType::Dropdown),
                    value_required: cleaned.value_required.unwrap_or(false),
                    visible_in_website: cleaned.visible_in_website.unwrap_or(true),
                    filterable: cleaned.filterable.unwrap_or(true),
                })?;
                for (position, name) in cleaned.values.into_iter().enumerate() {
                    let slug = crate::slug::unique_slug(&name, "value", |_| false);
                    let mut value = AttributeValue::new(attribute.id, name, slug);
                    value.sort_order = position as u32;
                    tx.insert(value)?;
                }
                Ok(attribute)
            }
        }
    }

    fn before_delete(tx: &mut WriteTx, model: &Attribute, _ctx: &MutationContext) -> Result<(), CoreError> {
        tx.remove_where::<AttributeValue>(|v| v.attribute == model.id)?;
        for mut entry_type in tx.list::<EntryType>()? {
            let before = entry_type.entry_attributes.len() + entry_type.document_attributes.len();
            entry_type.entry_attributes.retain(|a| *a != model.id);
            entry_type.document_attributes.retain(|a| *a != model.id);
            if before != entry_type.entry_attributes.len() + entry_type.document_attributes.len() {
                tx.put(&entry_type)?;
            }
        }
        detach_everywhere(tx, Some(model.id), None)
    }
}

// =============================================================================
// ATTRIBUTE VALUE MUTATIONS
// =============================================================================

/// Input for managing the choices of dropdown and multiselect attributes.
#[derive(Debug, Clone, Default)]
pub struct AttributeValueInput {
    /// Set on creation only.
    pub attribute: Option<AttributeId>,
    pub name: Option<String>,
    pub slug: Option<String>,
    pub sort_order: Option<u32>,
}

#[derive(Debug)]
pub struct CleanedAttributeValueInput {
    attribute: AttributeId,
    name: Option<String>,
    slug: Option<String>,
    sort_order: Option<u32>,
}

pub struct AttributeValueMutation;

impl ModelMutation for AttributeValueMutation {
    type Model = AttributeValue;
    type Input = AttributeValueInput;
    type Cleaned = CleanedAttributeValueInput;

    fn clean_input(
        tx: &WriteTx,
        instance: Option<&AttributeValue>,
        input: AttributeValueInput,
        _ctx: &MutationContext,
    ) -> Result<CleanedAttributeValueInput, CoreError> {
        let creating = instance.is_none();
        let mut errors = Vec::new();

        let attribute_id = match (instance, input.attribute) {
            (Some(value), Some(requested)) if requested != value.attribute => {
                errors.push(FieldError::new("attribute", ErrorCode::Invalid, "A value cannot move to another attribute."));
                value.attribute
            }
            (Some(value), _) => value.attribute,
            (None, Some(requested)) => requested,
            (None, None) => {
                errors.push(FieldError::required("attribute"));
                return Err(CoreError::Validation(errors));
            }
        };

        match tx.get::<Attribute>(attribute_id.0)? {
            None => errors.push(FieldError::new("attribute", ErrorCode::NotFound, "Attribute not found.")),
            Some(attribute) if !attribute.input_type.has_choices() => errors.push(FieldError::new(
                "attribute",
                ErrorCode::Invalid,
                "Only dropdown and multiselect attributes have managed values.",
            )),
            Some(_) => {}
        }

        let siblings = tx.filter::<AttributeValue>(|v| v.attribute == attribute_id)?;
        let own_id = instance.map(|v| v.id);
        let name = clean_name(&mut errors, "name", input.name, creating);
        let slug = clean_slug(
            &mut errors,
            input.slug,
            if creating { name.as_deref() } else { None },
            "value",
            |candidate| siblings.iter().any(|v| v.slug == candidate && Some(v.id) != own_id),
        );

        finish(errors, || CleanedAttributeValueInput {
            attribute: attribute_id,
            name,
            slug,
            sort_order: input.sort_order,
        })
    }

    fn save(
        tx: &mut WriteTx,
        instance: Option<AttributeValue>,
        cleaned: CleanedAttributeValueInput,
        _ctx: &MutationContext,
    ) -> Result<AttributeValue, CoreError> {
        match instance {
            Some(mut value) => {
                if let Some(name) = cleaned.name {
                    value.name = name;
                }
                if let Some(slug) = cleaned.slug {
                    value.slug = slug;
                }
                if let Some(order) = cleaned.sort_order {
                    value.sort_order = order;
                }
                tx.put(&value)?;
                Ok(value)
            }
            None => {
                let next_order = tx
                    .filter::<AttributeValue>(|v| v.attribute == cleaned.attribute)?
                    .iter()
                    .map(|v| v.sort_order.saturating_add(1))
                    .max()
                    .unwrap_or(0);
                let mut value = AttributeValue::new(
                    cleaned.attribute,
                    cleaned.name.unwrap_or_default(),
                    cleaned.slug.unwrap_or_default(),
                );
                value.sort_order = cleaned.sort_order.unwrap_or(next_order);
                Ok(tx.insert(value)?)
            }
        }
    }

    fn before_delete(tx: &mut WriteTx, model: &AttributeValue, _ctx: &MutationContext) -> Result<(), CoreError> {
        detach_everywhere(tx, None, Some(model.id))
    }
}
