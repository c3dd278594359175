use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::config::GraphConfig;
use crate::model::{definition, EntityKind, Id, LinkDef, NewRecord, Record};
use crate::store::traits::RecordStore;

const RETURN_NODE: &str = "OPTIONAL MATCH (n)-[r]->(m) \
     RETURN id(n) AS id, labels(n) AS labels, properties(n) AS props, \
     collect([type(r), id(m)]) AS links";

/// Graph backend speaking the Neo4j HTTP transaction API
///
/// Every operation is one request to `/db/{database}/tx/commit`. Entity
/// types are node labels, links are edges named after the link
/// (`hasActivity`).
#[derive(Debug, Clone)]
pub struct GraphStore {
    client: reqwest::Client,
    endpoint: String,
    credentials: Option<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct Statement {
    statement: String,
    parameters: Value,
}

#[derive(Debug, Deserialize)]
struct TxResponse {
    #[serde(default)]
    results: Vec<TxResult>,
    #[serde(default)]
    errors: Vec<TxError>,
}

#[derive(Debug, Deserialize)]
struct TxResult {
    #[serde(default)]
    data: Vec<TxRow>,
}

#[derive(Debug, Deserialize)]
struct TxRow {
    row: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct TxError {
    code: String,
    message: String,
}

impl GraphStore {
    pub fn new(config: &GraphConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build graph database HTTP client")?;

        let credentials = match (&config.user, &config.password) {
            (Some(user), Some(password)) => Some((user.clone(), password.clone())),
            _ => None,
        };

        Ok(Self {
            client,
            endpoint: commit_endpoint(&config.url, &config.database),
            credentials,
        })
    }

    async fn run(&self, statements: Vec<Statement>) -> Result<Vec<TxResult>> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .json(&json!({ "statements": statements }));
        if let Some((user, password)) = &self.credentials {
            request = request.basic_auth(user, Some(password));
        }

        let response = request
            .send()
            .await
            .context("Graph database request failed")?;
        let status = response.status();
        if !status.is_success() {
            log::warn!("Graph database returned {}", status);
            anyhow::bail!("Graph database returned {}", status);
        }

        let body: TxResponse = response
            .json()
            .await
            .context("Invalid graph database response")?;
        if let Some(error) = body.errors.first() {
            log::warn!("Graph database error {}: {}", error.code, error.message);
            anyhow::bail!("Graph database error {}: {}", error.code, error.message);
        }
        Ok(body.results)
    }

    async fn run_one(&self, statement: Statement) -> Result<Vec<Vec<Value>>> {
        let results = self.run(vec![statement]).await?;
        Ok(results
            .into_iter()
            .next()
            .map(|result| result.data.into_iter().map(|d| d.row).collect())
            .unwrap_or_default())
    }

    async fn records(&self, statement: Statement) -> Result<Vec<Record>> {
        let rows = self.run_one(statement).await?;
        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            if let Some(record) = record_from_row(&row)? {
                records.push(record);
            }
        }
        Ok(records)
    }
}

pub(crate) fn commit_endpoint(url: &str, database: &str) -> String {
    format!("{}/db/{}/tx/commit", url.trim_end_matches('/'), database)
}

fn node_properties(fields: &Map<String, Value>, additional_properties: &Map<String, Value>) -> Value {
    let mut props = fields.clone();
    // Nested maps are not valid node properties
    props.insert(
        "additional_properties".to_string(),
        Value::String(Value::Object(additional_properties.clone()).to_string()),
    );
    Value::Object(props)
}

pub(crate) fn fetch_statement(id: Id) -> Statement {
    Statement {
        statement: format!("MATCH (n) WHERE id(n) = $id {}", RETURN_NODE),
        parameters: json!({ "id": id }),
    }
}

pub(crate) fn list_statement(kind: EntityKind) -> Statement {
    Statement {
        statement: format!("MATCH (n:`{}`) {} ORDER BY id", kind.label(), RETURN_NODE),
        parameters: json!({}),
    }
}

pub(crate) fn list_by_link_statement(kind: EntityKind, link: &LinkDef, target_id: Id) -> Statement {
    Statement {
        statement: format!(
            "MATCH (n:`{}`)-[:`{}`]->(t) WHERE id(t) = $target_id WITH DISTINCT n {} ORDER BY id",
            kind.label(),
            link.name,
            RETURN_NODE
        ),
        parameters: json!({ "target_id": target_id }),
    }
}

pub(crate) fn create_statement(record: &NewRecord) -> Statement {
    Statement {
        statement: format!(
            "CREATE (n:`{}`) SET n = $props \
             RETURN id(n) AS id, labels(n) AS labels, properties(n) AS props, [] AS links",
            record.kind.label()
        ),
        parameters: json!({
            "props": node_properties(&record.fields, &record.additional_properties)
        }),
    }
}

pub(crate) fn update_statement(
    kind: EntityKind,
    id: Id,
    fields: &Map<String, Value>,
    additional_properties: &Map<String, Value>,
) -> Statement {
    Statement {
        statement: format!(
            "MATCH (n:`{}`) WHERE id(n) = $id SET n = $props RETURN id(n) AS id",
            kind.label()
        ),
        parameters: json!({
            "id": id,
            "props": node_properties(fields, additional_properties)
        }),
    }
}

/// Point the `link` edge of node `id` at `target_id`
///
/// Old edges are removed only when both nodes match, so a missing target
/// leaves the current link in place.
pub(crate) fn replace_relationship_statement(
    kind: EntityKind,
    id: Id,
    link: &LinkDef,
    target_id: Id,
) -> Statement {
    Statement {
        statement: format!(
            "MATCH (n:`{label}`), (t:`{target}`) WHERE id(n) = $id AND id(t) = $target_id \
             OPTIONAL MATCH (n)-[old:`{edge}`]->() \
             WITH n, t, collect(old) AS old \
             FOREACH (o IN old | DELETE o) \
             CREATE (n)-[r:`{edge}`]->(t) RETURN id(r) AS id",
            label = kind.label(),
            target = link.target.label(),
            edge = link.name
        ),
        parameters: json!({ "id": id, "target_id": target_id }),
    }
}

pub(crate) fn delete_relationship_statement(kind: EntityKind, id: Id, link: &LinkDef) -> Statement {
    Statement {
        statement: format!(
            "MATCH (n:`{}`)-[r:`{}`]->() WHERE id(n) = $id DELETE r",
            kind.label(),
            link.name
        ),
        parameters: json!({ "id": id }),
    }
}

pub(crate) fn delete_statement(kind: EntityKind, id: Id) -> Statement {
    Statement {
        statement: format!(
            "MATCH (n:`{}`) WHERE id(n) = $id DETACH DELETE n RETURN count(*) AS deleted",
            kind.label()
        ),
        parameters: json!({ "id": id }),
    }
}

/// Decode an `[id, labels, props, links]` row; nodes without a known label
/// are skipped
pub(crate) fn record_from_row(row: &[Value]) -> Result<Option<Record>> {
    let [id, labels, props, links] = row else {
        anyhow::bail!("Unexpected graph row with {} columns", row.len());
    };

    let id = id
        .as_i64()
        .ok_or_else(|| anyhow::anyhow!("Graph node id is not an integer: {}", id))?;
    let Some(kind) = labels
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .find_map(EntityKind::from_label)
    else {
        return Ok(None);
    };

    let mut fields = props.as_object().cloned().unwrap_or_default();
    let additional_properties = match fields.remove("additional_properties") {
        Some(Value::String(raw)) => serde_json::from_str::<Map<String, Value>>(&raw)
            .context("Invalid additional_properties on graph node")?,
        _ => Map::new(),
    };

    let def = definition(kind);
    let mut record_links = BTreeMap::new();
    for pair in links.as_array().into_iter().flatten() {
        let Some([name, target]) = pair.as_array().map(Vec::as_slice) else {
            continue;
        };
        let (Some(name), Some(target)) = (name.as_str(), target.as_i64()) else {
            continue;
        };
        if let Some(link) = def.links.iter().find(|l| l.name == name) {
            record_links.insert(link.field.to_string(), target);
        }
    }

    Ok(Some(Record {
        id,
        kind,
        fields,
        links: record_links,
        additional_properties,
    }))
}

#[async_trait::async_trait]
impl RecordStore for GraphStore {
    async fn fetch(&self, _kind: EntityKind, id: Id) -> Result<Option<Record>> {
        Ok(self.records(fetch_statement(id)).await?.into_iter().next())
    }

    async fn list(&self, kind: EntityKind) -> Result<Vec<Record>> {
        self.records(list_statement(kind)).await
    }

    async fn list_by_link(
        &self,
        kind: EntityKind,
        link: &'static LinkDef,
        target_id: Id,
    ) -> Result<Vec<Record>> {
        self.records(list_by_link_statement(kind, link, target_id)).await
    }

    async fn insert(&self, record: NewRecord) -> Result<Record> {
        self.records(create_statement(&record))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("Could not create node {}", record.kind.label()))
    }

    async fn update_fields(
        &self,
        kind: EntityKind,
        id: Id,
        fields: Map<String, Value>,
        additional_properties: Map<String, Value>,
    ) -> Result<bool> {
        let rows = self
            .run_one(update_statement(kind, id, &fields, &additional_properties))
            .await?;
        Ok(!rows.is_empty())
    }

    async fn link(&self, kind: EntityKind, id: Id, link: &'static LinkDef, target_id: Id) -> Result<()> {
        let rows = self
            .run_one(replace_relationship_statement(kind, id, link, target_id))
            .await?;
        if rows.is_empty() {
            anyhow::bail!("Cannot create {}: node {} or {} not found", link.name, id, target_id);
        }
        Ok(())
    }

    async fn unlink(&self, kind: EntityKind, id: Id, link: &'static LinkDef) -> Result<()> {
        self.run_one(delete_relationship_statement(kind, id, link)).await?;
        Ok(())
    }

    async fn delete(&self, kind: EntityKind, id: Id) -> Result<bool> {
        let rows = self.run_one(delete_statement(kind, id)).await?;
        let deleted = rows
            .first()
            .and_then(|row| row.first())
            .and_then(Value::as_i64)
            .unwrap_or(0);
        Ok(deleted > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_endpoint() {
        assert_eq!(
            commit_endpoint("http://localhost:7474/", "neo4j"),
            "http://localhost:7474/db/neo4j/tx/commit"
        );
    }

    #[test]
    fn test_create_statement_serializes_additional_properties() {
        let mut fields = Map::new();
        fields.insert("activity".to_string(), json!("group"));
        let mut additional_properties = Map::new();
        additional_properties.insert("room".to_string(), json!("B-12"));
        let record = NewRecord {
            kind: EntityKind::Activity,
            fields,
            additional_properties,
        };

        let statement = create_statement(&record);
        assert!(statement.statement.starts_with("CREATE (n:`Activity`) SET n = $props"));
        assert_eq!(
            statement.parameters,
            json!({"props": {"activity": "group", "additional_properties": "{\"room\":\"B-12\"}"}})
        );
    }

    #[test]
    fn test_relationship_statements_use_link_names() {
        let link = definition(EntityKind::Participation).link("activity_id").unwrap();
        let create = replace_relationship_statement(EntityKind::Participation, 5, link, 1);
        assert_eq!(
            create.statement,
            "MATCH (n:`Participation`), (t:`Activity`) WHERE id(n) = $id AND id(t) = $target_id \
             OPTIONAL MATCH (n)-[old:`hasActivity`]->() \
             WITH n, t, collect(old) AS old \
             FOREACH (o IN old | DELETE o) \
             CREATE (n)-[r:`hasActivity`]->(t) RETURN id(r) AS id"
        );
        // the old edge is only deleted after both endpoints have matched
        let matched = create.statement.find("MATCH (n:").unwrap();
        let deleted = create.statement.find("DELETE o").unwrap();
        assert!(matched < deleted);
        assert_eq!(create.parameters, json!({"id": 5, "target_id": 1}));

        let list = list_by_link_statement(EntityKind::Participation, link, 1);
        assert!(list
            .statement
            .starts_with("MATCH (n:`Participation`)-[:`hasActivity`]->(t) WHERE id(t) = $target_id"));
        assert!(delete_statement(EntityKind::Participation, 5)
            .statement
            .contains("DETACH DELETE n"));
    }

    #[test]
    fn test_record_from_row() {
        let row = vec![
            json!(12),
            json!(["Participant State"]),
            json!({"age": 31, "additional_properties": "{\"mood\":\"calm\"}"}),
            json!([["hasParticipant", 3], [null, null], ["unknownEdge", 8], ["hasAppearance"]]),
        ];
        let record = record_from_row(&row).unwrap().unwrap();
        assert_eq!(record.id, 12);
        assert_eq!(record.kind, EntityKind::ParticipantState);
        assert_eq!(record.fields.get("age"), Some(&json!(31)));
        assert!(!record.fields.contains_key("additional_properties"));
        assert_eq!(record.additional_properties.get("mood"), Some(&json!("calm")));
        assert_eq!(record.links.len(), 1);
        assert_eq!(record.links.get("participant_id"), Some(&3));
    }

    #[test]
    fn test_record_from_row_skips_unknown_labels() {
        let row = vec![json!(4), json!(["Something Else"]), json!({}), json!([])];
        assert!(record_from_row(&row).unwrap().is_none());
        assert!(record_from_row(&[json!(1)]).is_err());
    }
}
