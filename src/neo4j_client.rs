//! Implementación de `GraphStore` sobre Neo4j.
//!
//! Esquema:
//!   (:Consultation {filename, content, embedding})
//!   (:Consultation)-[:MENTIONS_SYMPTOM]->(:Symptom {name})
//!   (:Consultation)-[:MENTIONS_CONDITION]->(:Condition {name})
//! más un índice vectorial nativo sobre `:Consultation(embedding)`.

use std::sync::Arc;

use async_trait::async_trait;
use neo4rs::{query, Graph, Query};
use tracing::{debug, info};

use crate::config::{is_plain_identifier, AppConfig};
use crate::error::{Error, Result};
use crate::graph_store::GraphStore;
use crate::models::{
    Consultation, Embedding, EntityKind, GraphStats, MedicalEntities, RetrievedConsultation,
    VectorIndexSpec,
};

/// Segundos que se espera a que un índice recién creado esté ONLINE.
const INDEX_AWAIT_TIMEOUT_SECS: i64 = 300;

/// Conecta con la URI completa de `NEO4J_URI`: el esquema (`bolt`, `neo4j`,
/// `bolt+s`, `neo4j+s`, ...) decide si la conexión va cifrada.
pub async fn connect_from_config(cfg: &AppConfig) -> Result<Graph> {
    info!("Conectando a Neo4j en {}...", cfg.neo4j_uri);
    let graph = Graph::new(&cfg.neo4j_uri, &cfg.neo4j_user, &cfg.neo4j_password).await?;
    info!("Conexión a Neo4j OK");
    Ok(graph)
}

/// Grafo de consultas respaldado por Neo4j.
#[derive(Clone)]
pub struct Neo4jStore {
    graph: Arc<Graph>,
}

impl Neo4jStore {
    pub fn new(graph: Graph) -> Self {
        Self {
            graph: Arc::new(graph),
        }
    }

    /// Conecta y comprueba que el servidor responde; un fallo aquí es fatal.
    pub async fn connect(cfg: &AppConfig) -> Result<Self> {
        let graph = connect_from_config(cfg).await?;
        let mut cursor = graph.execute(query("RETURN 1 AS ok")).await?;
        cursor.next().await?;
        Ok(Self::new(graph))
    }

    async fn count(&self, cypher: &str) -> Result<usize> {
        self.count_query(cypher, query(cypher)).await
    }

    async fn count_query(&self, cypher: &str, q: Query) -> Result<usize> {
        let mut cursor = self.graph.execute(q).await?;
        let row = cursor
            .next()
            .await?
            .ok_or_else(|| Error::Store(format!("Sin resultados para: {cypher}")))?;
        let n: i64 = row.get("n").ok_or_else(|| missing_field("n"))?;
        Ok(n.max(0) as usize)
    }
}

fn checked_identifier(name: &str) -> Result<&str> {
    if is_plain_identifier(name) {
        Ok(name)
    } else {
        Err(Error::Config(format!("Nombre de índice no válido: '{name}'")))
    }
}

fn missing_field(key: &str) -> Error {
    Error::Store(format!("Falta campo '{key}' en resultado de Neo4j"))
}

#[async_trait]
impl GraphStore for Neo4jStore {
    async fn delete_all(&self) -> Result<()> {
        self.graph.run(query("MATCH (n) DETACH DELETE n")).await?;
        info!("Grafo vaciado (todos los nodos y relaciones eliminados).");
        Ok(())
    }

    async fn ensure_constraints(&self) -> Result<()> {
        let statements = [
            "CREATE CONSTRAINT consultation_filename IF NOT EXISTS
             FOR (c:Consultation)
             REQUIRE c.filename IS UNIQUE",
            "CREATE CONSTRAINT symptom_name IF NOT EXISTS
             FOR (s:Symptom)
             REQUIRE s.name IS UNIQUE",
            "CREATE CONSTRAINT condition_name IF NOT EXISTS
             FOR (m:Condition)
             REQUIRE m.name IS UNIQUE",
        ];

        for stmt in statements {
            self.graph.run(query(stmt)).await?;
        }

        info!("Esquema de Neo4j asegurado (constraints de unicidad creados).");
        Ok(())
    }

    async fn recreate_vector_index(&self, spec: &VectorIndexSpec) -> Result<()> {
        let index_name = checked_identifier(&spec.name)?;

        self.graph
            .run(query(&format!("DROP INDEX {index_name} IF EXISTS")))
            .await?;

        let cypher = format!(
            "\
CREATE VECTOR INDEX {index_name} IF NOT EXISTS
FOR (c:Consultation)
ON (c.embedding)
OPTIONS {{
  indexConfig: {{
    `vector.dimensions`: {dimensions},
    `vector.similarity_function`: 'cosine'
  }}
}}",
            index_name = index_name,
            dimensions = spec.dimensions
        );

        self.graph.run(query(&cypher)).await?;
        info!(
            "Índice vectorial '{index_name}' creado ({} dims, coseno).",
            spec.dimensions
        );
        Ok(())
    }

    async fn await_vector_index(&self, name: &str) -> Result<()> {
        self.graph
            .run(
                query("CALL db.awaitIndex($name, $timeout)")
                    .param("name", name.to_string())
                    .param("timeout", INDEX_AWAIT_TIMEOUT_SECS),
            )
            .await?;
        debug!("Índice vectorial '{name}' ONLINE.");
        Ok(())
    }

    async fn merge_consultation(&self, consultation: &Consultation) -> Result<()> {
        self.graph
            .run(
                query(
                    "MERGE (c:Consultation {filename: $filename})
                     SET c.content = $content, c.embedding = $embedding",
                )
                .param("filename", consultation.filename.clone())
                .param("content", consultation.content.clone())
                .param("embedding", consultation.embedding.clone()),
            )
            .await?;
        Ok(())
    }

    async fn merge_mentions(&self, filename: &str, entities: &MedicalEntities) -> Result<()> {
        if entities.is_empty() {
            return Ok(());
        }

        let tx = self.graph.start_txn().await?;
        for kind in EntityKind::ALL {
            let names: Vec<String> = entities.of_kind(kind).iter().cloned().collect();
            if names.is_empty() {
                continue;
            }
            let cypher = format!(
                "MATCH (c:Consultation {{filename: $filename}})
                 UNWIND $names AS name
                 MERGE (e:{label} {{name: name}})
                 MERGE (c)-[:{rel}]->(e)",
                label = kind.label(),
                rel = kind.relationship()
            );
            tx.run(
                query(&cypher)
                    .param("filename", filename.to_string())
                    .param("names", names),
            )
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn nearest_consultations(
        &self,
        index_name: &str,
        k: usize,
        embedding: &Embedding,
    ) -> Result<Vec<RetrievedConsultation>> {
        let mut cursor = self
            .graph
            .execute(
                query(
                    "CALL db.index.vector.queryNodes($index_name, $k, $embedding)
                     YIELD node AS c, score
                     OPTIONAL MATCH (c)-[:MENTIONS_SYMPTOM]->(s:Symptom)
                     WITH c, score, collect(DISTINCT s.name) AS symptoms
                     OPTIONAL MATCH (c)-[:MENTIONS_CONDITION]->(m:Condition)
                     WITH c, score, symptoms, collect(DISTINCT m.name) AS conditions
                     RETURN c.filename AS filename, c.content AS content, score,
                            symptoms, conditions
                     ORDER BY score DESC",
                )
                .param("index_name", index_name.to_string())
                .param("k", k as i64)
                .param("embedding", embedding.clone()),
            )
            .await?;

        let mut output = Vec::new();
        while let Some(row) = cursor.next().await? {
            let mut symptoms: Vec<String> =
                row.get("symptoms").ok_or_else(|| missing_field("symptoms"))?;
            let mut conditions: Vec<String> =
                row.get("conditions").ok_or_else(|| missing_field("conditions"))?;
            symptoms.sort();
            symptoms.dedup();
            conditions.sort();
            conditions.dedup();

            let filename: String = row.get("filename").ok_or_else(|| missing_field("filename"))?;
            let content: String = row.get("content").ok_or_else(|| missing_field("content"))?;
            let score: f64 = row.get("score").ok_or_else(|| missing_field("score"))?;

            output.push(RetrievedConsultation {
                filename,
                content,
                score,
                symptoms,
                conditions,
            });
        }
        Ok(output)
    }

    async fn stats(&self) -> Result<GraphStats> {
        Ok(GraphStats {
            consultations: self.count("MATCH (c:Consultation) RETURN count(c) AS n").await?,
            symptoms: self.count("MATCH (s:Symptom) RETURN count(s) AS n").await?,
            conditions: self.count("MATCH (m:Condition) RETURN count(m) AS n").await?,
            symptom_mentions: self
                .count("MATCH (:Consultation)-[r:MENTIONS_SYMPTOM]->(:Symptom) RETURN count(r) AS n")
                .await?,
            condition_mentions: self
                .count(
                    "MATCH (:Consultation)-[r:MENTIONS_CONDITION]->(:Condition) RETURN count(r) AS n",
                )
                .await?,
        })
    }

    async fn count_consultations_mentioning(&self, term: &str) -> Result<usize> {
        let cypher = "MATCH (c:Consultation)-[:MENTIONS_SYMPTOM|MENTIONS_CONDITION]->(e)
                      WHERE toLower(e.name) CONTAINS $term
                      RETURN count(DISTINCT c) AS n";
        self.count_query(cypher, query(cypher).param("term", term.to_string()))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_are_store_errors() {
        let err = missing_field("score");
        assert!(matches!(err, Error::Store(_)));
        assert!(err.to_string().contains("'score'"));
    }

    #[test]
    fn index_names_are_checked_before_interpolation() {
        assert!(checked_identifier("consultation_vector").is_ok());
        assert!(matches!(
            checked_identifier("x} DETACH DELETE n //"),
            Err(Error::Config(_))
        ));
    }
}
