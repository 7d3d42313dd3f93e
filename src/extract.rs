//! Extracción de síntomas y enfermedades con un LLM bajo un contrato JSON estricto.
//!
//! La extracción nunca interrumpe la ingesta: cualquier respuesta inservible
//! (o un error del proveedor tras los reintentos) produce un conjunto vacío y
//! el documento se indexa igualmente para la búsqueda vectorial.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::llm::Generator;
use crate::models::MedicalEntities;

/// Forma esperada de la respuesta del modelo.
#[derive(Debug, Clone, Default, Deserialize)]
struct RawExtraction {
    #[serde(default, alias = "symptomes")]
    symptoms: Vec<String>,
    #[serde(default, alias = "maladies", alias = "diseases")]
    conditions: Vec<String>,
}

pub struct EntityExtractor {
    generator: Arc<dyn Generator>,
    language: String,
}

impl EntityExtractor {
    pub fn new(generator: Arc<dyn Generator>, language: impl Into<String>) -> Self {
        Self {
            generator,
            language: language.into(),
        }
    }

    pub fn build_prompt(&self, text: &str) -> String {
        format!(
            r#"Analyze this medical consultation transcript.
Extract ONLY medical symptoms and medical conditions (diseases, diagnoses).
Translate every term into {language} and write each one in lower case.
Output format, STRICT JSON, nothing else: {{"symptoms": ["fever", "cough"], "conditions": ["flu"]}}
If you find nothing, return empty lists.

Text:
{text}"#,
            language = self.language,
            text = text
        )
    }

    /// Extrae las entidades de un documento. Nunca falla.
    pub async fn extract(&self, text: &str) -> MedicalEntities {
        let response = match self.generator.generate(&self.build_prompt(text)).await {
            Ok(response) => response,
            Err(err) => {
                warn!("Fallo del LLM durante la extracción de entidades: {err}. Se continúa sin entidades.");
                return MedicalEntities::default();
            }
        };

        match parse_extraction(&response) {
            Some(entities) => {
                debug!(
                    "Extraídos {} síntomas y {} enfermedades",
                    entities.symptoms.len(),
                    entities.conditions.len()
                );
                entities
            }
            None => {
                warn!("No se pudo parsear el JSON de extracción. Respuesta LLM: '{response}'");
                MedicalEntities::default()
            }
        }
    }
}

/// Parser de salida estructurada "best-effort":
///   1. parseo estricto de la respuesta sin vallas de código;
///   2. si falla, parseo del tramo entre el primer `{` y el último `}`;
///   3. si también falla, `None`.
pub fn parse_extraction(response: &str) -> Option<MedicalEntities> {
    let cleaned = strip_code_fences(response);

    let raw = serde_json::from_str::<RawExtraction>(cleaned).ok().or_else(|| {
        let start = cleaned.find('{')?;
        let end = cleaned.rfind('}')?;
        if end <= start {
            return None;
        }
        serde_json::from_str::<RawExtraction>(&cleaned[start..=end]).ok()
    })?;

    Some(MedicalEntities {
        symptoms: normalize_labels(&raw.symptoms),
        conditions: normalize_labels(&raw.conditions),
    })
}

fn strip_code_fences(response: &str) -> &str {
    let trimmed = response.trim();
    let trimmed = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    trimmed.strip_suffix("```").unwrap_or(trimmed).trim()
}

/// Normaliza una etiqueta: minúsculas, espacios colapsados. `None` si queda vacía.
pub fn normalize_label(label: &str) -> Option<String> {
    let normalized = label
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    let normalized = normalized.trim_matches(|c: char| c == '.' || c == ',' || c == ';');
    if normalized.is_empty() {
        None
    } else {
        Some(normalized.to_string())
    }
}

fn normalize_labels(labels: &[String]) -> BTreeSet<String> {
    labels.iter().filter_map(|l| normalize_label(l)).collect()
}
