//! Relay global ids: `base64("<Type>:<pk>")`.

use async_graphql::ID;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use civic_core::{ErrorCode, FieldError};

pub const ATTRIBUTE: &str = "Attribute";
pub const ATTRIBUTE_VALUE: &str = "AttributeValue";
pub const CATEGORY: &str = "Category";
pub const CHANNEL: &str = "Channel";
pub const DEFAULT_DOCUMENT: &str = "DefaultDocument";
pub const DOCUMENT: &str = "Document";
pub const DOCUMENT_FILE: &str = "DocumentFile";
pub const ENTRY: &str = "Entry";
pub const ENTRY_TYPE: &str = "EntryType";
pub const EVENT: &str = "Event";
pub const INVESTMENT: &str = "Investment";

#[must_use]
pub fn to_global_id(kind: &str, pk: u64) -> ID {
    ID(STANDARD.encode(format!("{kind}:{pk}")))
}

/// Split a global id into its type and primary key.
#[must_use]
pub fn parse_global_id(id: &str) -> Option<(String, u64)> {
    let bytes = STANDARD.decode(id.trim()).ok()?;
    let text = String::from_utf8(bytes).ok()?;
    let (kind, pk) = text.split_once(':')?;
    Some((kind.to_string(), pk.parse().ok()?))
}

/// Primary key of a global id that must name a `kind` object.
pub fn from_global_id(field: &str, id: &ID, kind: &str) -> Result<u64, FieldError> {
    match parse_global_id(id) {
        Some((found, pk)) if found == kind => Ok(pk),
        Some((found, _)) => Err(FieldError::new(
            field,
            ErrorCode::Invalid,
            format!("Must receive a {kind} id, got a {found} id."),
        )),
        None => Err(FieldError::new(
            field,
            ErrorCode::Invalid,
            format!("Couldn't resolve id: {}.", id.as_str()),
        )),
    }
}

/// Decode a list of ids; every invalid id is reported.
pub fn from_global_ids(field: &str, ids: &[ID], kind: &str, errors: &mut Vec<FieldError>) -> Vec<u64> {
    ids.iter()
        .filter_map(|id| from_global_id(field, id, kind).map_err(|e| errors.push(e)).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]

    use super::*;

    #[test]
    fn global_ids_are_relay_compatible() {
        let id = to_global_id(ENTRY, 12);
        assert_eq!(id.as_str(), "RW50cnk6MTI=");
        assert_eq!(from_global_id("id", &id, ENTRY).unwrap(), 12);
    }

    #[test]
    fn wrong_kind_and_garbage_are_invalid() {
        let err = from_global_id("entry", &to_global_id(DOCUMENT, 3), ENTRY).unwrap_err();
        assert_eq!(err.field.as_deref(), Some("entry"));
        assert_eq!(err.code, ErrorCode::Invalid);
        assert!(from_global_id("id", &ID::from("not base64!"), ENTRY).is_err());
        assert!(parse_global_id(&STANDARD.encode("Entry:abc")).is_none());
    }

    #[test]
    fn list_decoding_reports_each_bad_id() {
        let mut errors = Vec::new();
        let ids = [to_global_id(CHANNEL, 1), ID::from("x"), to_global_id(CHANNEL, 2), ID::from("y")];
        assert_eq!(from_global_ids("channels", &ids, CHANNEL, &mut errors), vec![1, 2]);
        assert_eq!(errors.len(), 2);
    }
}
