use serde_json::{Map, Value};

use crate::logic::ServiceError;
use crate::model::{EntityDef, EntityIn, FieldDef, FieldKind, Id, LinkDef, NewRecord, RelationshipsUpdate};

/// A save request split into record content and links to attach
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedInput {
    pub record: NewRecord,
    pub links: Vec<(&'static LinkDef, Id)>,
}

pub struct EntityValidator;

impl EntityValidator {
    /// Check a save request against the catalog
    pub fn validate_new(def: &EntityDef, input: EntityIn) -> Result<ValidatedInput, ServiceError> {
        let mut fields = Map::new();
        let mut links = Vec::new();

        for (key, value) in input.values {
            if let Some(field) = def.field(&key) {
                if let Some(value) = Self::check_field(def, field, value)? {
                    fields.insert(key, value);
                }
            } else if let Some(link) = def.link(&key) {
                if let Some(target_id) = Self::check_link(link, &value)? {
                    links.push((link, target_id));
                }
            } else {
                return Err(ServiceError::validation(format!("Unknown field: {}", key)));
            }
        }
        Self::check_required(def, &fields)?;

        // Attach links in catalog order regardless of body order
        links.sort_by_key(|(link, _)| def.links.iter().position(|l| l.field == link.field));

        Ok(ValidatedInput {
            record: NewRecord {
                kind: def.kind,
                fields,
                additional_properties: input.additional_properties,
            },
            links,
        })
    }

    /// Check an update request; links must go through the relationships update
    pub fn validate_update(
        def: &EntityDef,
        input: EntityIn,
    ) -> Result<(Map<String, Value>, Map<String, Value>), ServiceError> {
        if let Some(link) = input.values.keys().find_map(|key| def.link(key)) {
            return Err(ServiceError::validation(format!(
                "{} is a relationship; update it through /relationships",
                link.field
            )));
        }
        let validated = Self::validate_new(def, input)?;
        Ok((validated.record.fields, validated.record.additional_properties))
    }

    /// Resolve a relationships update to the links it touches
    pub fn validate_relationships(
        def: &EntityDef,
        update: &RelationshipsUpdate,
    ) -> Result<Vec<(&'static LinkDef, Option<Id>)>, ServiceError> {
        let mut changes = Vec::with_capacity(update.len());
        for (key, target) in update {
            let link = def
                .link(key)
                .ok_or_else(|| ServiceError::validation(format!("Unknown relationship: {}", key)))?;
            changes.push((link, *target));
        }
        Ok(changes)
    }

    fn check_field(def: &EntityDef, field: &FieldDef, value: Value) -> Result<Option<Value>, ServiceError> {
        if value.is_null() {
            return Ok(None);
        }
        if field.kind.accepts(&value) {
            return Ok(Some(value));
        }

        let message = match field.kind {
            FieldKind::Choice(_) if field.name == def.kind.name() || field.name == "type" => {
                format!("Invalid {} type", def.kind)
            }
            FieldKind::Choice(_) => format!("Invalid {} {}", def.kind, field.name),
            kind => format!("Invalid value for {}: expected {}", field.name, kind.describe()),
        };
        Err(ServiceError::Validation(message))
    }

    fn check_link(link: &LinkDef, value: &Value) -> Result<Option<Id>, ServiceError> {
        if value.is_null() {
            return Ok(None);
        }
        value.as_i64().map(Some).ok_or_else(|| {
            ServiceError::validation(format!(
                "Invalid value for {}: expected {} id",
                link.field, link.target
            ))
        })
    }

    fn check_required(def: &EntityDef, fields: &Map<String, Value>) -> Result<(), ServiceError> {
        match def
            .fields
            .iter()
            .find(|f| f.required && !fields.contains_key(f.name))
        {
            Some(missing) => Err(ServiceError::validation(format!(
                "Missing required field: {}",
                missing.name
            ))),
            None => Ok(()),
        }
    }
}
