use serde::{Deserialize, Serialize};

/// Every entity type of the research data model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Participant,
    Appearance,
    ParticipantState,
    Experiment,
    Arrangement,
    Activity,
    Participation,
    Channel,
    RegisteredData,
    RegisteredChannel,
    Recording,
    Modality,
    LifeActivity,
    ObservableInformation,
    MeasureName,
    Measure,
}

impl EntityKind {
    pub const ALL: [EntityKind; 16] = [
        EntityKind::Participant,
        EntityKind::Appearance,
        EntityKind::ParticipantState,
        EntityKind::Experiment,
        EntityKind::Arrangement,
        EntityKind::Activity,
        EntityKind::Participation,
        EntityKind::Channel,
        EntityKind::RegisteredData,
        EntityKind::RegisteredChannel,
        EntityKind::Recording,
        EntityKind::Modality,
        EntityKind::LifeActivity,
        EntityKind::ObservableInformation,
        EntityKind::MeasureName,
        EntityKind::Measure,
    ];

    /// Snake-case name, also used as the relational table name
    pub fn name(&self) -> &'static str {
        match self {
            EntityKind::Participant => "participant",
            EntityKind::Appearance => "appearance",
            EntityKind::ParticipantState => "participant_state",
            EntityKind::Experiment => "experiment",
            EntityKind::Arrangement => "arrangement",
            EntityKind::Activity => "activity",
            EntityKind::Participation => "participation",
            EntityKind::Channel => "channel",
            EntityKind::RegisteredData => "registered_data",
            EntityKind::RegisteredChannel => "registered_channel",
            EntityKind::Recording => "recording",
            EntityKind::Modality => "modality",
            EntityKind::LifeActivity => "life_activity",
            EntityKind::ObservableInformation => "observable_information",
            EntityKind::MeasureName => "measure_name",
            EntityKind::Measure => "measure",
        }
    }

    /// Plural name used for HTTP paths and for "many" relation fields
    pub fn collection(&self) -> &'static str {
        match self {
            EntityKind::Participant => "participants",
            EntityKind::Appearance => "appearances",
            EntityKind::ParticipantState => "participant_states",
            EntityKind::Experiment => "experiments",
            EntityKind::Arrangement => "arrangements",
            EntityKind::Activity => "activities",
            EntityKind::Participation => "participations",
            EntityKind::Channel => "channels",
            EntityKind::RegisteredData => "registered_data",
            EntityKind::RegisteredChannel => "registered_channels",
            EntityKind::Recording => "recordings",
            EntityKind::Modality => "modalities",
            EntityKind::LifeActivity => "life_activities",
            EntityKind::ObservableInformation => "observable_informations",
            EntityKind::MeasureName => "measure_names",
            EntityKind::Measure => "measures",
        }
    }

    /// Node label in the graph store
    pub fn label(&self) -> &'static str {
        match self {
            EntityKind::Participant => "Participant",
            EntityKind::Appearance => "Appearance",
            EntityKind::ParticipantState => "Participant State",
            EntityKind::Experiment => "Experiment",
            EntityKind::Arrangement => "Arrangement",
            EntityKind::Activity => "Activity",
            EntityKind::Participation => "Participation",
            EntityKind::Channel => "Channel",
            EntityKind::RegisteredData => "Registered Data",
            EntityKind::RegisteredChannel => "Registered Channel",
            EntityKind::Recording => "Recording",
            EntityKind::Modality => "Modality",
            EntityKind::LifeActivity => "Life Activity",
            EntityKind::ObservableInformation => "Observable Information",
            EntityKind::MeasureName => "Measure Name",
            EntityKind::Measure => "Measure",
        }
    }

    pub fn from_collection(collection: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.collection() == collection)
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.label() == label)
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.name() == s)
            .ok_or_else(|| format!("Unknown entity type: {}", s))
    }
}
