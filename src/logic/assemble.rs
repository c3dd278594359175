use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::model::{Cardinality, EntityDef, EntityOut, Record, RelationValue};

/// Shape a record and its expanded relations into the output schema
///
/// Fields, link ids and relations the record lacks are filled with `null`
/// (or `[]` for many relations) so every response of a type has the same keys.
pub fn assemble(
    def: &EntityDef,
    record: Record,
    mut relations: BTreeMap<String, RelationValue>,
) -> EntityOut {
    let Record {
        id,
        mut fields,
        links,
        additional_properties,
        ..
    } = record;

    let mut out_fields = Map::new();
    for field in def.fields {
        let value = fields.remove(field.name).unwrap_or(Value::Null);
        out_fields.insert(field.name.to_string(), value);
    }
    for link in def.links {
        let value = links
            .get(link.field)
            .map(|target| Value::from(*target))
            .unwrap_or(Value::Null);
        out_fields.insert(link.field.to_string(), value);
    }

    for relation in def.relations() {
        relations
            .entry(relation.field.to_string())
            .or_insert_with(|| empty_relation(relation.cardinality));
    }

    EntityOut {
        id,
        fields: out_fields,
        additional_properties,
        relations,
    }
}

pub fn empty_relation(cardinality: Cardinality) -> RelationValue {
    match cardinality {
        Cardinality::Many => RelationValue::Many(Vec::new()),
        Cardinality::Single => RelationValue::Single(None),
    }
}
