//! Static description of every entity type: scalar fields, outgoing links,
//! and the relations derived from them.
//!
//! Table names, column names, edge names and relation fields used by the
//! stores and by expansion all come from here, never from request input.

use crate::model::{EntityKind, FieldKind};

pub const ACTIVITY_KINDS: &[&str] = &["individual", "two_people", "group"];
pub const SEXES: &[&str] = &["female", "male", "not given"];
pub const CHANNEL_TYPES: &[&str] = &["audio", "video", "eeg", "ecg", "emotiv", "empatica", "kinect"];
pub const LIFE_ACTIVITIES: &[&str] = &["sleep", "eat", "drink", "walk", "talk", "sit", "stand", "other"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDef {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
}

/// Outgoing foreign id held by a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkDef {
    /// Input/output field carrying the id, also the relational column
    pub field: &'static str,
    /// Output field receiving the expanded target
    pub relation: &'static str,
    /// Graph edge type
    pub name: &'static str,
    pub target: EntityKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityDef {
    pub kind: EntityKind,
    pub fields: &'static [FieldDef],
    pub links: &'static [LinkDef],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    /// Follows one of this type's own links
    Single,
    /// Records of the target type whose link points at this record
    Many,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelationDef {
    pub field: &'static str,
    pub target: EntityKind,
    pub cardinality: Cardinality,
    /// For `Single` the link is owned by this type, for `Many` by the target
    pub link: &'static LinkDef,
}

const fn required(name: &'static str, kind: FieldKind) -> FieldDef {
    FieldDef { name, kind, required: true }
}

const fn optional(name: &'static str, kind: FieldKind) -> FieldDef {
    FieldDef { name, kind, required: false }
}

const fn link(
    field: &'static str,
    relation: &'static str,
    name: &'static str,
    target: EntityKind,
) -> LinkDef {
    LinkDef { field, relation, name, target }
}

// Indexed by `EntityKind as usize`
static DEFINITIONS: [EntityDef; 16] = [
    EntityDef {
        kind: EntityKind::Participant,
        fields: &[
            optional("name", FieldKind::Text),
            optional("date_of_birth", FieldKind::Date),
            optional("sex", FieldKind::Choice(SEXES)),
            optional("disorder", FieldKind::Text),
        ],
        links: &[],
    },
    EntityDef {
        kind: EntityKind::Appearance,
        fields: &[
            optional("glasses", FieldKind::Boolean),
            optional("beard", FieldKind::Text),
            optional("moustache", FieldKind::Text),
        ],
        links: &[],
    },
    EntityDef {
        kind: EntityKind::ParticipantState,
        fields: &[optional("age", FieldKind::Integer)],
        links: &[
            link("participant_id", "participant", "hasParticipant", EntityKind::Participant),
            link("appearance_id", "appearance", "hasAppearance", EntityKind::Appearance),
        ],
    },
    EntityDef {
        kind: EntityKind::Experiment,
        fields: &[required("experiment_name", FieldKind::Text)],
        links: &[],
    },
    EntityDef {
        kind: EntityKind::Arrangement,
        fields: &[
            required("arrangement_type", FieldKind::Text),
            optional("arrangement_distance", FieldKind::Text),
        ],
        links: &[],
    },
    EntityDef {
        kind: EntityKind::Activity,
        fields: &[
            required("activity", FieldKind::Choice(ACTIVITY_KINDS)),
            optional("layout", FieldKind::Text),
        ],
        links: &[
            link("experiment_id", "experiment", "hasExperiment", EntityKind::Experiment),
            link("arrangement_id", "arrangement", "hasArrangement", EntityKind::Arrangement),
        ],
    },
    EntityDef {
        kind: EntityKind::Participation,
        fields: &[],
        links: &[
            link("activity_id", "activity", "hasActivity", EntityKind::Activity),
            link(
                "participant_state_id",
                "participant_state",
                "hasParticipantState",
                EntityKind::ParticipantState,
            ),
        ],
    },
    EntityDef {
        kind: EntityKind::Channel,
        fields: &[required("type", FieldKind::Choice(CHANNEL_TYPES))],
        links: &[],
    },
    EntityDef {
        kind: EntityKind::RegisteredData,
        fields: &[required("source", FieldKind::Text)],
        links: &[],
    },
    EntityDef {
        kind: EntityKind::RegisteredChannel,
        fields: &[],
        links: &[
            link("channel_id", "channel", "hasChannel", EntityKind::Channel),
            link(
                "registered_data_id",
                "registered_data",
                "hasRegisteredData",
                EntityKind::RegisteredData,
            ),
        ],
    },
    EntityDef {
        kind: EntityKind::Recording,
        fields: &[],
        links: &[
            link("participation_id", "participation", "hasParticipation", EntityKind::Participation),
            link(
                "registered_channel_id",
                "registered_channel",
                "hasRegisteredChannel",
                EntityKind::RegisteredChannel,
            ),
        ],
    },
    EntityDef {
        kind: EntityKind::Modality,
        fields: &[required("modality", FieldKind::Text)],
        links: &[],
    },
    EntityDef {
        kind: EntityKind::LifeActivity,
        fields: &[required("life_activity", FieldKind::Choice(LIFE_ACTIVITIES))],
        links: &[],
    },
    EntityDef {
        kind: EntityKind::ObservableInformation,
        fields: &[],
        links: &[
            link("modality_id", "modality", "hasModality", EntityKind::Modality),
            link("life_activity_id", "life_activity", "hasLifeActivity", EntityKind::LifeActivity),
            link("recording_id", "recording", "hasRecording", EntityKind::Recording),
        ],
    },
    EntityDef {
        kind: EntityKind::MeasureName,
        fields: &[
            required("name", FieldKind::Text),
            optional("type", FieldKind::Text),
        ],
        links: &[],
    },
    EntityDef {
        kind: EntityKind::Measure,
        fields: &[
            required("datatype", FieldKind::Text),
            optional("range", FieldKind::Text),
            optional("unit", FieldKind::Text),
        ],
        links: &[link("measure_name_id", "measure_name", "hasMeasureName", EntityKind::MeasureName)],
    },
];

pub fn definition(kind: EntityKind) -> &'static EntityDef {
    &DEFINITIONS[kind as usize]
}

impl EntityDef {
    pub fn field(&self, name: &str) -> Option<&'static FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn link(&self, field: &str) -> Option<&'static LinkDef> {
        self.links.iter().find(|l| l.field == field)
    }

    /// The link on this type that points at `target`, if any
    pub fn link_to(&self, target: EntityKind) -> Option<&'static LinkDef> {
        self.links.iter().find(|l| l.target == target)
    }

    /// Relations in expansion order: own links first, then incoming links
    /// in catalog order.
    pub fn relations(&self) -> Vec<RelationDef> {
        let single = self.links.iter().map(|link| RelationDef {
            field: link.relation,
            target: link.target,
            cardinality: Cardinality::Single,
            link,
        });

        let kind = self.kind;
        let many = DEFINITIONS.iter().flat_map(move |other| {
            other
                .links
                .iter()
                .filter(move |link| link.target == kind)
                .map(move |link| RelationDef {
                    field: other.kind.collection(),
                    target: other.kind,
                    cardinality: Cardinality::Many,
                    link,
                })
        });

        single.chain(many).collect()
    }
}
