//! Generic entity service and the depth-limited expansion protocol.
//!
//! `get(id, depth, source)` loads one record and, while `depth > 0`, asks
//! the service of each related type for its records with
//! `(this id, depth - 1, this type)`. A relation is not expanded when its
//! target type is the caller or any type further up the call chain, which
//! keeps cyclic relation graphs from recursing forever.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::logic::assemble::assemble;
use crate::logic::{EntityValidator, ServiceError};
use crate::model::{
    definition, Cardinality, EntityDef, EntityIn, EntityKind, EntityOut, Id, LinkDef, Record,
    RelationValue, RelationshipsUpdate,
};
use crate::store::traits::RecordStore;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Dispatch table from entity type to its service, sharing one store
#[derive(Debug)]
pub struct Services<S: RecordStore> {
    store: Arc<S>,
}

impl<S: RecordStore> Clone for Services<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: RecordStore> Services<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn service(&self, kind: EntityKind) -> EntityService<'_, S> {
        EntityService {
            services: self,
            def: definition(kind),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

/// Operations for one entity type
pub struct EntityService<'a, S: RecordStore> {
    services: &'a Services<S>,
    def: &'static EntityDef,
}

impl<'a, S: RecordStore> EntityService<'a, S> {
    pub fn kind(&self) -> EntityKind {
        self.def.kind
    }

    fn store(&self) -> &'a S {
        self.services.store()
    }

    /// Get one entity, expanding relations up to `depth` hops and never
    /// toward `source`
    pub async fn get(
        &self,
        id: Id,
        depth: u32,
        source: Option<EntityKind>,
    ) -> Result<EntityOut, ServiceError> {
        let record = self.fetch_own(id).await?;
        let chain: Vec<EntityKind> = source.into_iter().collect();
        self.expand(record, depth, &chain).await
    }

    /// Records of this type whose link to `source` points at `foreign_id`
    pub async fn get_multiple_with_foreign_id(
        &self,
        foreign_id: Id,
        depth: u32,
        source: EntityKind,
    ) -> Result<Vec<EntityOut>, ServiceError> {
        match self.def.link_to(source) {
            Some(link) => self.linked(link, foreign_id, depth, &[source]).await,
            None => Ok(Vec::new()),
        }
    }

    /// The record `id` of this type, or `None` for a dangling link
    pub async fn get_single_with_foreign_id(
        &self,
        id: Id,
        depth: u32,
        source: EntityKind,
    ) -> Result<Option<EntityOut>, ServiceError> {
        self.single(id, depth, &[source]).await
    }

    /// All entities of this type, unexpanded
    pub async fn get_all(&self) -> Result<Vec<EntityOut>, ServiceError> {
        let records = self.store().list(self.kind()).await?;
        Ok(records
            .into_iter()
            .map(|record| assemble(self.def, record, BTreeMap::new()))
            .collect())
    }

    pub async fn save(&self, input: EntityIn) -> Result<EntityOut, ServiceError> {
        let validated = EntityValidator::validate_new(self.def, input)?;
        for (link, target_id) in &validated.links {
            self.ensure_target(link, *target_id).await?;
        }

        let mut record = self.store().insert(validated.record).await?;
        // No rollback: a failed link leaves the inserted record in place
        for (link, target_id) in validated.links {
            self.store()
                .link(self.kind(), record.id, link, target_id)
                .await?;
            record.links.insert(link.field.to_string(), target_id);
        }

        log::info!("Created {} {}", self.kind(), record.id);
        Ok(assemble(self.def, record, BTreeMap::new()))
    }

    /// Replace scalar fields and additional properties
    pub async fn update(&self, id: Id, input: EntityIn) -> Result<EntityOut, ServiceError> {
        let (fields, additional_properties) = EntityValidator::validate_update(self.def, input)?;
        let mut record = self.fetch_own(id).await?;

        let updated = self
            .store()
            .update_fields(self.kind(), id, fields.clone(), additional_properties.clone())
            .await?;
        if !updated {
            return Err(ServiceError::not_found(self.kind(), id));
        }

        record.fields = fields;
        record.additional_properties = additional_properties;
        log::info!("Updated {} {}", self.kind(), id);
        Ok(assemble(self.def, record, BTreeMap::new()))
    }

    /// Set (`Some`) or clear (`None`) links of one entity
    pub async fn update_relationships(
        &self,
        id: Id,
        update: RelationshipsUpdate,
    ) -> Result<EntityOut, ServiceError> {
        let changes = EntityValidator::validate_relationships(self.def, &update)?;
        let mut record = self.fetch_own(id).await?;
        for (link, target) in &changes {
            if let Some(target_id) = target {
                self.ensure_target(link, *target_id).await?;
            }
        }

        for (link, target) in changes {
            match target {
                Some(target_id) => {
                    self.store().link(self.kind(), id, link, target_id).await?;
                    record.links.insert(link.field.to_string(), target_id);
                }
                None => {
                    self.store().unlink(self.kind(), id, link).await?;
                    record.links.remove(link.field);
                }
            }
        }

        Ok(assemble(self.def, record, BTreeMap::new()))
    }

    /// Delete one entity and return its last state
    pub async fn delete(&self, id: Id) -> Result<EntityOut, ServiceError> {
        let record = self.fetch_own(id).await?;
        if !self.store().delete(self.kind(), id).await? {
            return Err(ServiceError::not_found(self.kind(), id));
        }

        log::info!("Deleted {} {}", self.kind(), id);
        Ok(assemble(self.def, record, BTreeMap::new()))
    }

    async fn fetch_own(&self, id: Id) -> Result<Record, ServiceError> {
        match self.store().fetch(self.kind(), id).await? {
            Some(record) if record.kind == self.kind() => Ok(record),
            Some(record) => {
                log::debug!("id {} belongs to {}, not {}", id, record.kind, self.kind());
                Err(ServiceError::not_found(self.kind(), id))
            }
            None => Err(ServiceError::not_found(self.kind(), id)),
        }
    }

    async fn ensure_target(&self, link: &LinkDef, target_id: Id) -> Result<(), ServiceError> {
        let exists = self
            .store()
            .fetch(link.target, target_id)
            .await?
            .is_some_and(|record| record.kind == link.target);
        if exists {
            Ok(())
        } else {
            Err(ServiceError::validation(format!(
                "Invalid {}: {} {} not found",
                link.field, link.target, target_id
            )))
        }
    }

    async fn linked(
        &self,
        link: &'static LinkDef,
        foreign_id: Id,
        depth: u32,
        chain: &[EntityKind],
    ) -> Result<Vec<EntityOut>, ServiceError> {
        let records = self.store().list_by_link(self.kind(), link, foreign_id).await?;
        let mut out = Vec::with_capacity(records.len());
        for record in records {
            out.push(self.expand(record, depth, chain).await?);
        }
        Ok(out)
    }

    async fn single(
        &self,
        id: Id,
        depth: u32,
        chain: &[EntityKind],
    ) -> Result<Option<EntityOut>, ServiceError> {
        match self.store().fetch(self.kind(), id).await? {
            Some(record) if record.kind == self.kind() => {
                self.expand(record, depth, chain).await.map(Some)
            }
            _ => Ok(None),
        }
    }

    /// `chain` holds the types that led here, the immediate caller last
    fn expand<'s>(
        &'s self,
        record: Record,
        depth: u32,
        chain: &'s [EntityKind],
    ) -> BoxFuture<'s, Result<EntityOut, ServiceError>> {
        Box::pin(async move {
            let mut relations = BTreeMap::new();
            if depth == 0 {
                return Ok(assemble(self.def, record, relations));
            }

            let mut next_chain = chain.to_vec();
            next_chain.push(self.kind());

            for relation in self.def.relations() {
                if chain.contains(&relation.target) {
                    log::debug!(
                        "{} {}: not expanding {} back toward {}",
                        self.kind(),
                        record.id,
                        relation.field,
                        relation.target
                    );
                    continue;
                }

                let target = self.services.service(relation.target);
                let value = match relation.cardinality {
                    Cardinality::Many => RelationValue::Many(
                        target
                            .linked(relation.link, record.id, depth - 1, &next_chain)
                            .await?,
                    ),
                    Cardinality::Single => match record.links.get(relation.link.field) {
                        Some(linked_id) => RelationValue::Single(
                            target
                                .single(*linked_id, depth - 1, &next_chain)
                                .await?
                                .map(Box::new),
                        ),
                        None => RelationValue::Single(None),
                    },
                };
                relations.insert(relation.field.to_string(), value);
            }

            Ok(assemble(self.def, record, relations))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::{MemoryStore, StoreCall};
    use serde_json::json;

    fn services() -> (Arc<MemoryStore>, Services<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (store.clone(), Services::new(store))
    }

    async fn save(services: &Services<MemoryStore>, kind: EntityKind, input: EntityIn) -> Id {
        services.service(kind).save(input).await.unwrap().id
    }

    fn many<'o>(out: &'o EntityOut, field: &str) -> &'o [EntityOut] {
        out.relation(field).and_then(RelationValue::as_many).unwrap()
    }

    #[tokio::test]
    async fn test_depth_zero_is_a_leaf() {
        let (store, services) = services();
        let name = save(&services, EntityKind::MeasureName, EntityIn::new().with("name", "arousal")).await;
        for datatype in ["int", "float"] {
            save(
                &services,
                EntityKind::Measure,
                EntityIn::new().with("datatype", datatype).with("measure_name_id", name),
            )
            .await;
        }
        store.clear_calls();

        let out = services.service(EntityKind::MeasureName).get(name, 0, None).await.unwrap();
        assert!(many(&out, "measures").is_empty());
        assert_eq!(store.calls(), vec![StoreCall::Fetch { kind: EntityKind::MeasureName, id: name }]);
    }

    #[tokio::test]
    async fn test_measure_name_expands_measures_one_level() {
        let (store, services) = services();
        let name = save(&services, EntityKind::MeasureName, EntityIn::new().with("name", "arousal")).await;
        let measure = save(
            &services,
            EntityKind::Measure,
            EntityIn::new().with("datatype", "float").with("measure_name_id", name),
        )
        .await;
        store.clear_calls();

        let out = services.service(EntityKind::MeasureName).get(name, 1, None).await.unwrap();
        let measures = many(&out, "measures");
        assert_eq!(measures.len(), 1);
        assert_eq!(measures[0].id, measure);
        assert_eq!(measures[0].fields.get("measure_name_id"), Some(&json!(name)));
        assert!(measures[0].relation("measure_name").unwrap().is_empty());

        assert_eq!(
            store.calls(),
            vec![
                StoreCall::Fetch { kind: EntityKind::MeasureName, id: name },
                StoreCall::ListByLink {
                    kind: EntityKind::Measure,
                    link: "measure_name_id",
                    target_id: name
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_source_is_never_expanded() {
        let (store, services) = services();
        let name = save(&services, EntityKind::MeasureName, EntityIn::new().with("name", "valence")).await;
        let measure = save(
            &services,
            EntityKind::Measure,
            EntityIn::new().with("datatype", "float").with("measure_name_id", name),
        )
        .await;
        store.clear_calls();

        let out = services
            .service(EntityKind::Measure)
            .get(measure, 3, Some(EntityKind::MeasureName))
            .await
            .unwrap();
        assert!(out.relation("measure_name").unwrap().is_empty());
        assert_eq!(store.calls().len(), 1);

        let from_name = services
            .service(EntityKind::Measure)
            .get_multiple_with_foreign_id(name, 2, EntityKind::MeasureName)
            .await
            .unwrap();
        assert_eq!(from_name.len(), 1);
        assert!(from_name[0].relation("measure_name").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_chain_expands_outward_without_bouncing() {
        let (_store, services) = services();
        let experiment = save(
            &services,
            EntityKind::Experiment,
            EntityIn::new().with("experiment_name", "pilot"),
        )
        .await;
        let activity = save(
            &services,
            EntityKind::Activity,
            EntityIn::new().with("activity", "group").with("experiment_id", experiment),
        )
        .await;
        let participant = save(&services, EntityKind::Participant, EntityIn::new().with("name", "P1")).await;
        let state = save(
            &services,
            EntityKind::ParticipantState,
            EntityIn::new().with("age", 24).with("participant_id", participant),
        )
        .await;
        let participation = save(
            &services,
            EntityKind::Participation,
            EntityIn::new()
                .with("activity_id", activity)
                .with("participant_state_id", state),
        )
        .await;

        let out = services
            .service(EntityKind::Experiment)
            .get(experiment, 3, None)
            .await
            .unwrap();
        let activities = many(&out, "activities");
        assert_eq!(activities.len(), 1);
        // back-edge to the experiment is not followed
        assert!(activities[0].relation("experiment").unwrap().is_empty());

        let participations = many(&activities[0], "participations");
        assert_eq!(participations[0].id, participation);
        let state_out = participations[0]
            .relation("participant_state")
            .and_then(RelationValue::as_single)
            .unwrap();
        assert_eq!(state_out.id, state);
        // depth exhausted
        assert!(state_out.relation("participant").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_types_on_the_chain_are_not_revisited() {
        let (_store, services) = services();
        let participant = save(&services, EntityKind::Participant, EntityIn::new().with("name", "P1")).await;
        let state = save(
            &services,
            EntityKind::ParticipantState,
            EntityIn::new().with("participant_id", participant),
        )
        .await;
        let activity = save(&services, EntityKind::Activity, EntityIn::new().with("activity", "individual")).await;
        save(
            &services,
            EntityKind::Participation,
            EntityIn::new()
                .with("activity_id", activity)
                .with("participant_state_id", state),
        )
        .await;

        // participant -> participant_state -> participation -> activity -> participations ...
        let out = services
            .service(EntityKind::Participant)
            .get(participant, 50, None)
            .await
            .unwrap();
        let states = many(&out, "participant_states");
        let participations = many(&states[0], "participations");
        let activity_out = participations[0]
            .relation("activity")
            .and_then(RelationValue::as_single)
            .unwrap();
        assert_eq!(activity_out.id, activity);
        // participation is already on the chain
        assert!(many(activity_out, "participations").is_empty());
    }

    #[tokio::test]
    async fn test_save_then_get_round_trips_fields() {
        let (_store, services) = services();
        let input = EntityIn::new()
            .with("name", "Anna")
            .with("date_of_birth", "1994-02-11")
            .with("sex", "female")
            .with_property("handedness", "left");
        let saved = services.service(EntityKind::Participant).save(input).await.unwrap();

        let out = services
            .service(EntityKind::Participant)
            .get(saved.id, 0, None)
            .await
            .unwrap();
        assert_eq!(out.fields.get("name"), Some(&json!("Anna")));
        assert_eq!(out.fields.get("date_of_birth"), Some(&json!("1994-02-11")));
        assert_eq!(out.fields.get("sex"), Some(&json!("female")));
        assert_eq!(out.fields.get("disorder"), Some(&serde_json::Value::Null));
        assert_eq!(out.additional_properties.get("handedness"), Some(&json!("left")));
        assert_eq!(out, saved);
    }

    #[tokio::test]
    async fn test_invalid_activity_issues_no_store_calls() {
        let (store, services) = services();
        let result = services
            .service(EntityKind::Activity)
            .save(EntityIn::new().with("activity", "bogus"))
            .await;
        match result {
            Err(ServiceError::Validation(message)) => assert_eq!(message, "Invalid activity type"),
            other => panic!("unexpected {:?}", other),
        }
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn test_participation_creates_both_relationships() {
        let (store, services) = services();
        let activity = save(&services, EntityKind::Activity, EntityIn::new().with("activity", "group")).await;
        let state = save(&services, EntityKind::ParticipantState, EntityIn::new().with("age", 30)).await;
        assert_eq!((activity, state), (1, 2));
        store.clear_calls();

        let out = services
            .service(EntityKind::Participation)
            .save(
                EntityIn::new()
                    .with("activity_id", 1)
                    .with("participant_state_id", 2),
            )
            .await
            .unwrap();

        let links: Vec<_> = store
            .calls()
            .into_iter()
            .filter(|call| matches!(call, StoreCall::Link { .. }))
            .collect();
        assert_eq!(
            links,
            vec![
                StoreCall::Link {
                    kind: EntityKind::Participation,
                    id: out.id,
                    name: "hasActivity",
                    target_id: 1
                },
                StoreCall::Link {
                    kind: EntityKind::Participation,
                    id: out.id,
                    name: "hasParticipantState",
                    target_id: 2
                },
            ]
        );
        assert_eq!(out.fields.get("activity_id"), Some(&json!(1)));
        assert_eq!(out.fields.get("participant_state_id"), Some(&json!(2)));
    }

    #[tokio::test]
    async fn test_save_with_missing_link_target_writes_nothing() {
        let (store, services) = services();
        let result = services
            .service(EntityKind::Measure)
            .save(EntityIn::new().with("datatype", "int").with("measure_name_id", 42))
            .await;
        match result {
            Err(ServiceError::Validation(message)) => {
                assert_eq!(message, "Invalid measure_name_id: measure_name 42 not found")
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(store.calls().iter().all(|call| !call.is_write()));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_delete() {
        let (store, services) = services();
        let service = services.service(EntityKind::Modality);

        assert!(matches!(
            service.delete(5).await,
            Err(ServiceError::NotFound { kind: EntityKind::Modality, id: 5 })
        ));
        assert!(store.calls().iter().all(|call| !call.is_write()));

        let id = service.save(EntityIn::new().with("modality", "gaze")).await.unwrap().id;
        let deleted = service.delete(id).await.unwrap();
        assert_eq!(deleted.fields.get("modality"), Some(&json!("gaze")));
        assert!(matches!(
            service.get(id, 0, None).await,
            Err(ServiceError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_ids_of_other_types_are_not_found() {
        let (store, services) = services();
        let channel = save(&services, EntityKind::Channel, EntityIn::new().with("type", "eeg")).await;

        let modality = services.service(EntityKind::Modality);
        assert!(matches!(
            modality.get(channel, 0, None).await,
            Err(ServiceError::NotFound { kind: EntityKind::Modality, .. })
        ));
        assert!(matches!(
            modality.delete(channel).await,
            Err(ServiceError::NotFound { .. })
        ));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_update_and_relationships() {
        let (_store, services) = services();
        let first = save(&services, EntityKind::MeasureName, EntityIn::new().with("name", "a")).await;
        let second = save(&services, EntityKind::MeasureName, EntityIn::new().with("name", "b")).await;
        let measure = save(
            &services,
            EntityKind::Measure,
            EntityIn::new().with("datatype", "int").with("measure_name_id", first),
        )
        .await;
        let service = services.service(EntityKind::Measure);

        let updated = service
            .update(measure, EntityIn::new().with("datatype", "float").with("unit", "ms"))
            .await
            .unwrap();
        assert_eq!(updated.fields.get("unit"), Some(&json!("ms")));
        assert_eq!(updated.fields.get("measure_name_id"), Some(&json!(first)));

        let mut update = RelationshipsUpdate::new();
        update.insert("measure_name_id".to_string(), Some(second));
        service.update_relationships(measure, update).await.unwrap();

        let names = services.service(EntityKind::MeasureName);
        assert!(many(&names.get(first, 1, None).await.unwrap(), "measures").is_empty());
        assert_eq!(many(&names.get(second, 1, None).await.unwrap(), "measures").len(), 1);

        let mut clear = RelationshipsUpdate::new();
        clear.insert("measure_name_id".to_string(), None);
        let cleared = service.update_relationships(measure, clear).await.unwrap();
        assert_eq!(cleared.fields.get("measure_name_id"), Some(&serde_json::Value::Null));
    }

    #[tokio::test]
    async fn test_get_all_is_unexpanded() {
        let (_store, services) = services();
        let name = save(&services, EntityKind::MeasureName, EntityIn::new().with("name", "a")).await;
        save(
            &services,
            EntityKind::Measure,
            EntityIn::new().with("datatype", "int").with("measure_name_id", name),
        )
        .await;
        save(&services, EntityKind::MeasureName, EntityIn::new().with("name", "b")).await;

        let all = services.service(EntityKind::MeasureName).get_all().await.unwrap();
        assert_eq!(all.len(), 2);
        assert!(all.iter().all(|out| many(out, "measures").is_empty()));
    }

    #[tokio::test]
    async fn test_deleted_link_target_reads_as_null() {
        let (_store, services) = services();
        let name = save(&services, EntityKind::MeasureName, EntityIn::new().with("name", "a")).await;
        let measure = save(
            &services,
            EntityKind::Measure,
            EntityIn::new().with("datatype", "int").with("measure_name_id", name),
        )
        .await;
        services.service(EntityKind::MeasureName).delete(name).await.unwrap();

        let out = services.service(EntityKind::Measure).get(measure, 2, None).await.unwrap();
        assert!(out.relation("measure_name").unwrap().is_empty());
        assert_eq!(out.fields.get("measure_name_id"), Some(&serde_json::Value::Null));
        assert_eq!(
            services
                .service(EntityKind::MeasureName)
                .get_single_with_foreign_id(name, 0, EntityKind::Measure)
                .await
                .unwrap(),
            None
        );
    }
}
