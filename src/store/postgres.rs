use anyhow::{Context, Result};
use serde_json::{Map, Value};
use sqlx::{
    postgres::{PgPoolOptions, PgRow},
    types::Json,
    PgPool, Row,
};
use std::collections::BTreeMap;

use crate::model::{definition, EntityDef, EntityKind, Id, LinkDef, NewRecord, Record};
use crate::store::traits::RecordStore;

/// Relational backend: one table per entity type
///
/// Links are nullable `BIGINT` columns named after the link field, scalar
/// fields and additional properties are `JSONB` columns. Identifiers come
/// from the catalog; every value is a bound parameter.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a new PostgreSQL store with the given database URL
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .context("Failed to create PostgreSQL connection pool")?;

        Ok(Self { pool })
    }

    /// Create missing tables and link indexes
    pub async fn migrate(&self) -> Result<()> {
        for kind in EntityKind::ALL {
            for statement in create_table_sql(definition(kind)) {
                sqlx::query(&statement)
                    .execute(&self.pool)
                    .await
                    .with_context(|| format!("Failed to create table {}", kind))?;
            }
        }
        log::info!("Relational schema ready ({} tables)", EntityKind::ALL.len());
        Ok(())
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn owned_link(def: &EntityDef, link: &LinkDef) -> Result<()> {
    if def.link(link.field).is_none() {
        anyhow::bail!("{} has no link {}", def.kind, link.field);
    }
    Ok(())
}

pub(crate) fn create_table_sql(def: &EntityDef) -> Vec<String> {
    let table = def.kind.name();
    let mut columns = vec!["id BIGSERIAL PRIMARY KEY".to_string()];
    for link in def.links {
        columns.push(format!(
            "{} BIGINT NULL REFERENCES {}(id) ON DELETE SET NULL",
            link.field,
            link.target.name()
        ));
    }
    columns.push("fields JSONB NOT NULL DEFAULT '{}'::jsonb".to_string());
    columns.push("additional_properties JSONB NOT NULL DEFAULT '{}'::jsonb".to_string());

    let mut statements = vec![format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        table,
        columns.join(", ")
    )];
    for link in def.links {
        statements.push(format!(
            "CREATE INDEX IF NOT EXISTS {table}_{column}_idx ON {table} ({column})",
            table = table,
            column = link.field
        ));
    }
    statements
}

fn select_columns(def: &EntityDef) -> String {
    let mut columns = vec!["id"];
    columns.extend(def.links.iter().map(|l| l.field));
    columns.push("fields");
    columns.push("additional_properties");
    columns.join(", ")
}

pub(crate) fn select_by_id_sql(def: &EntityDef) -> String {
    format!("SELECT {} FROM {} WHERE id = $1", select_columns(def), def.kind.name())
}

pub(crate) fn select_all_sql(def: &EntityDef) -> String {
    format!("SELECT {} FROM {} ORDER BY id", select_columns(def), def.kind.name())
}

pub(crate) fn select_by_link_sql(def: &EntityDef, link: &LinkDef) -> String {
    format!(
        "SELECT {} FROM {} WHERE {} = $1 ORDER BY id",
        select_columns(def),
        def.kind.name(),
        link.field
    )
}

pub(crate) fn insert_sql(def: &EntityDef) -> String {
    format!(
        "INSERT INTO {} (fields, additional_properties) VALUES ($1, $2) RETURNING {}",
        def.kind.name(),
        select_columns(def)
    )
}

pub(crate) fn update_fields_sql(def: &EntityDef) -> String {
    format!(
        "UPDATE {} SET fields = $1, additional_properties = $2 WHERE id = $3",
        def.kind.name()
    )
}

pub(crate) fn set_link_sql(def: &EntityDef, link: &LinkDef) -> String {
    format!("UPDATE {} SET {} = $1 WHERE id = $2", def.kind.name(), link.field)
}

pub(crate) fn delete_sql(def: &EntityDef) -> String {
    format!("DELETE FROM {} WHERE id = $1", def.kind.name())
}

fn record_from_row(def: &EntityDef, row: &PgRow) -> Result<Record> {
    let mut links = BTreeMap::new();
    for link in def.links {
        if let Some(target) = row.try_get::<Option<i64>, _>(link.field)? {
            links.insert(link.field.to_string(), target);
        }
    }
    let Json(fields): Json<Map<String, Value>> = row.try_get("fields")?;
    let Json(additional_properties): Json<Map<String, Value>> =
        row.try_get("additional_properties")?;

    Ok(Record {
        id: row.try_get("id")?,
        kind: def.kind,
        fields,
        links,
        additional_properties,
    })
}

#[async_trait::async_trait]
impl RecordStore for PostgresStore {
    async fn fetch(&self, kind: EntityKind, id: Id) -> Result<Option<Record>> {
        let def = definition(kind);
        let row = sqlx::query(&select_by_id_sql(def))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("Failed to fetch {}", kind))?;

        let Some(row) = row else {
            return Ok(None);
        };
        record_from_row(def, &row).map(Some)
    }

    async fn list(&self, kind: EntityKind) -> Result<Vec<Record>> {
        let def = definition(kind);
        let rows = sqlx::query(&select_all_sql(def))
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("Failed to list {}", kind.collection()))?;

        rows.iter().map(|row| record_from_row(def, row)).collect()
    }

    async fn list_by_link(
        &self,
        kind: EntityKind,
        link: &'static LinkDef,
        target_id: Id,
    ) -> Result<Vec<Record>> {
        let def = definition(kind);
        owned_link(def, link)?;
        let rows = sqlx::query(&select_by_link_sql(def, link))
            .bind(target_id)
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("Failed to list {} by {}", kind.collection(), link.field))?;

        rows.iter().map(|row| record_from_row(def, row)).collect()
    }

    async fn insert(&self, record: NewRecord) -> Result<Record> {
        let def = definition(record.kind);
        let row = sqlx::query(&insert_sql(def))
            .bind(Json(&record.fields))
            .bind(Json(&record.additional_properties))
            .fetch_one(&self.pool)
            .await
            .with_context(|| format!("Failed to insert {}", record.kind))?;

        record_from_row(def, &row)
    }

    async fn update_fields(
        &self,
        kind: EntityKind,
        id: Id,
        fields: Map<String, Value>,
        additional_properties: Map<String, Value>,
    ) -> Result<bool> {
        let result = sqlx::query(&update_fields_sql(definition(kind)))
            .bind(Json(&fields))
            .bind(Json(&additional_properties))
            .bind(id)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to update {}", kind))?;

        Ok(result.rows_affected() > 0)
    }

    async fn link(&self, kind: EntityKind, id: Id, link: &'static LinkDef, target_id: Id) -> Result<()> {
        let def = definition(kind);
        owned_link(def, link)?;
        let result = sqlx::query(&set_link_sql(def, link))
            .bind(Some(target_id))
            .bind(id)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to create {}", link.name))?;

        if result.rows_affected() == 0 {
            anyhow::bail!("Cannot create {}: {} {} not found", link.name, kind, id);
        }
        Ok(())
    }

    async fn unlink(&self, kind: EntityKind, id: Id, link: &'static LinkDef) -> Result<()> {
        let def = definition(kind);
        owned_link(def, link)?;
        sqlx::query(&set_link_sql(def, link))
            .bind(None::<i64>)
            .bind(id)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to remove {}", link.name))?;

        Ok(())
    }

    async fn delete(&self, kind: EntityKind, id: Id) -> Result<bool> {
        let result = sqlx::query(&delete_sql(definition(kind)))
            .bind(id)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to delete {}", kind))?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_table_includes_link_columns() {
        let statements = create_table_sql(definition(EntityKind::Participation));
        assert_eq!(statements.len(), 3);
        assert_eq!(
            statements[0],
            "CREATE TABLE IF NOT EXISTS participation (id BIGSERIAL PRIMARY KEY, \
             activity_id BIGINT NULL REFERENCES activity(id) ON DELETE SET NULL, \
             participant_state_id BIGINT NULL REFERENCES participant_state(id) ON DELETE SET NULL, \
             fields JSONB NOT NULL DEFAULT '{}'::jsonb, \
             additional_properties JSONB NOT NULL DEFAULT '{}'::jsonb)"
        );
        assert_eq!(
            statements[1],
            "CREATE INDEX IF NOT EXISTS participation_activity_id_idx ON participation (activity_id)"
        );
    }

    #[test]
    fn test_tables_created_after_their_link_targets() {
        for (position, kind) in EntityKind::ALL.iter().enumerate() {
            for link in definition(*kind).links {
                let target_position = EntityKind::ALL
                    .iter()
                    .position(|k| *k == link.target)
                    .unwrap();
                assert!(
                    target_position < position,
                    "{} must be created before {}",
                    link.target,
                    kind
                );
            }
        }
    }

    #[test]
    fn test_queries_bind_values() {
        let measure = definition(EntityKind::Measure);
        let link = measure.link("measure_name_id").unwrap();

        assert_eq!(
            select_by_id_sql(measure),
            "SELECT id, measure_name_id, fields, additional_properties FROM measure WHERE id = $1"
        );
        assert_eq!(
            select_by_link_sql(measure, link),
            "SELECT id, measure_name_id, fields, additional_properties FROM measure \
             WHERE measure_name_id = $1 ORDER BY id"
        );
        assert_eq!(
            insert_sql(definition(EntityKind::Experiment)),
            "INSERT INTO experiment (fields, additional_properties) VALUES ($1, $2) \
             RETURNING id, fields, additional_properties"
        );
        assert_eq!(
            set_link_sql(measure, link),
            "UPDATE measure SET measure_name_id = $1 WHERE id = $2"
        );
        assert_eq!(delete_sql(measure), "DELETE FROM measure WHERE id = $1");
        assert_eq!(
            update_fields_sql(measure),
            "UPDATE measure SET fields = $1, additional_properties = $2 WHERE id = $3"
        );
        assert!(select_all_sql(measure).ends_with("ORDER BY id"));
    }

    #[test]
    fn test_foreign_links_are_rejected() {
        let activity = definition(EntityKind::Activity);
        let measure_link = definition(EntityKind::Measure).link("measure_name_id").unwrap();
        assert!(owned_link(activity, measure_link).is_err());
        assert!(owned_link(activity, activity.link("experiment_id").unwrap()).is_ok());
    }
}
