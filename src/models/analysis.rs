//! 分析阶段的数据结构
//!
//! LLM 返回的三段分析没有固定结构，统一保存为 `serde_json::Value`；
//! 失败时对应字段为 `{"error": "..."}`。

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::models::measure::{DetectedElement, DocumentStructure, Measure, Metadata};

/// 分析文件名后缀
pub const ANALYSIS_SUFFIX: &str = "_analysis_agnostic.json";
/// 批量汇总文件名
pub const BATCH_SUMMARY_FILE: &str = "batch_analysis_summary_agnostic.json";
/// 分析方法标识
pub const ANALYSIS_APPROACH: &str = "agnostico_sin_presupuestos";

/// 风险等级（魔鬼代言人分析中的 nivel_riesgo_democratico）
pub const RISK_LEVELS: [&str; 4] = ["bajo", "medio", "alto", "critico"];

/// 单条公报的完整分析结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeasureAnalysis {
    pub numero_medida: String,
    pub fecha_boletin: String,
    pub fecha_analisis: String,
    pub analisis_literal: LiteralAnalysis,
    pub analisis_critico: Value,
    pub analisis_abogado_diablo: Value,
    pub analisis_semantico: Value,
    pub metadatos_analisis: AnalysisMetadata,
}

impl MeasureAnalysis {
    /// 原始文件名对应的分析文件名：`<stem>_analysis_agnostic.json`
    pub fn file_name_for(raw_name: &str) -> String {
        format!("{}{}", file_stem(raw_name), ANALYSIS_SUFFIX)
    }
}

/// 去掉扩展名
pub fn file_stem(name: &str) -> &str {
    match name.rfind('.') {
        Some(idx) if idx > 0 => &name[..idx],
        _ => name,
    }
}

/// 直接来自抓取数据的客观信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiteralAnalysis {
    pub numero_medida: String,
    pub fecha_boletin: String,
    pub url_fuente: String,
    pub titulo_raw: String,
    pub tiene_pdfs: bool,
    pub cantidad_pdfs: usize,
    pub timestamp_scraping: String,
    pub estructura_detectada: DocumentStructure,
    pub metadatos_scraping: Metadata,
    #[serde(default)]
    pub elementos_detectados_scraper: Vec<DetectedElement>,
    pub elementos_detectados_ia: Value,
    pub estadisticas_texto: TextStats,
}

impl LiteralAnalysis {
    pub fn from_measure(measure: &Measure, elements: Value) -> Self {
        Self {
            numero_medida: measure.numero_medida.clone(),
            fecha_boletin: measure.fecha_boletin.clone(),
            url_fuente: measure.url.clone(),
            titulo_raw: measure.titulo_raw.clone(),
            tiene_pdfs: measure.tiene_pdf,
            cantidad_pdfs: measure.pdf_urls.len(),
            timestamp_scraping: measure.timestamp_scraping.clone(),
            estructura_detectada: measure.estructura_detectada.clone(),
            metadatos_scraping: measure.metadatos_extraidos.clone(),
            elementos_detectados_scraper: measure.elementos_detectados.clone(),
            elementos_detectados_ia: elements,
            estadisticas_texto: TextStats::from_measure(measure),
        }
    }
}

/// 文本统计
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TextStats {
    pub longitud_total_caracteres: usize,
    pub longitud_total_palabras: usize,
    pub secciones_detectadas: usize,
    pub tiene_considerandos: bool,
    pub longitud_considerandos: usize,
    pub longitud_dispositivo: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ratio_justificacion_accion: Option<f64>,
}

impl TextStats {
    pub fn from_measure(measure: &Measure) -> Self {
        let text = &measure.texto_completo_limpio;
        let structure = &measure.estructura_detectada;
        let considerandos = structure
            .get("considerandos")
            .map(|s| s.longitud_caracteres)
            .unwrap_or(0);
        let dispositivo = structure
            .operative()
            .map(|s| s.longitud_caracteres)
            .unwrap_or(0);

        Self {
            longitud_total_caracteres: text.chars().count(),
            longitud_total_palabras: text.split_whitespace().count(),
            secciones_detectadas: structure.len(),
            tiene_considerandos: structure.get("considerandos").is_some(),
            longitud_considerandos: considerandos,
            longitud_dispositivo: dispositivo,
            ratio_justificacion_accion: (dispositivo > 0)
                .then(|| considerandos as f64 / dispositivo as f64),
        }
    }
}

/// 理由与执行部分的长度比
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JustificationRatio {
    pub ratio_numerico: f64,
    pub interpretacion: String,
}

impl JustificationRatio {
    pub fn from_structure(structure: &DocumentStructure) -> Self {
        let considerandos = structure
            .get("considerandos")
            .map(|s| s.longitud_caracteres)
            .unwrap_or(0);
        let dispositivo = structure
            .operative()
            .map(|s| s.longitud_caracteres)
            .unwrap_or(0);

        if dispositivo == 0 {
            return Self {
                ratio_numerico: 0.0,
                interpretacion: "sin_dispositivo_claro".to_string(),
            };
        }

        let ratio = considerandos as f64 / dispositivo as f64;
        let interpretacion = if ratio > 2.0 {
            "justificacion_extensa"
        } else {
            "justificacion_proporcionada"
        };
        Self {
            ratio_numerico: ratio,
            interpretacion: interpretacion.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisMetadata {
    pub enfoque: String,
    pub version_analyzer: String,
    pub confianza_general: String,
}

impl Default for AnalysisMetadata {
    fn default() -> Self {
        Self {
            enfoque: ANALYSIS_APPROACH.to_string(),
            version_analyzer: concat!(env!("CARGO_PKG_VERSION"), "_agnostic").to_string(),
            confianza_general: "pendiente_validacion".to_string(),
        }
    }
}

/// 某段分析失败时的占位
pub fn error_section(message: impl std::fmt::Display) -> Value {
    json!({ "error": message.to_string() })
}

/// 批量分析汇总
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSummary {
    pub fecha_analisis_batch: String,
    pub enfoque: String,
    pub total_medidas_analizadas: usize,
    pub total_errores: usize,
    pub estadisticas_generales: BatchStats,
    pub errores_detalle: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BatchStats {
    pub medidas_con_considerandos: usize,
    pub medidas_con_pdfs: usize,
    pub organismos_detectados: Vec<String>,
    pub temas_emergentes: BTreeMap<String, usize>,
    pub niveles_riesgo: BTreeMap<String, usize>,
}

impl BatchStats {
    pub fn from_results(results: &[MeasureAnalysis]) -> Self {
        let mut organisms = BTreeSet::new();
        let mut stats = BatchStats {
            niveles_riesgo: RISK_LEVELS.iter().map(|l| (l.to_string(), 0)).collect(),
            ..BatchStats::default()
        };

        for result in results {
            let literal = &result.analisis_literal;
            if literal.estadisticas_texto.tiene_considerandos {
                stats.medidas_con_considerandos += 1;
            }
            if literal.tiene_pdfs {
                stats.medidas_con_pdfs += 1;
            }

            if let Some(entities) = literal
                .elementos_detectados_ia
                .get("entidades_mencionadas")
                .and_then(Value::as_array)
            {
                organisms.extend(entities.iter().filter_map(Value::as_str).map(str::to_string));
            }

            let topic = result
                .analisis_semantico
                .get("categoria_emergente")
                .and_then(Value::as_str)
                .unwrap_or("sin_clasificar");
            *stats.temas_emergentes.entry(topic.to_string()).or_insert(0) += 1;

            let risk = result
                .analisis_abogado_diablo
                .get("nivel_riesgo_democratico")
                .and_then(Value::as_str)
                .unwrap_or("bajo");
            if let Some(count) = stats.niveles_riesgo.get_mut(risk) {
                *count += 1;
            }
        }

        stats.organismos_detectados = organisms.into_iter().collect();
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::measure::Section;

    fn section(len: usize) -> Section {
        Section {
            contenido: "x".repeat(len),
            longitud_caracteres: len,
            ..Section::default()
        }
    }

    fn measure_with(considerandos: usize, dispositivo: Option<usize>) -> Measure {
        let mut measure: Measure = serde_json::from_str(
            r#"{"numero_medida": "1", "fecha_boletin": "2024-01-02",
                "texto_completo_limpio": "VISTO el expediente CONSIDERANDO que"}"#,
        )
        .unwrap();
        let secciones = &mut measure.estructura_detectada.secciones;
        secciones.insert("considerandos".to_string(), section(considerandos));
        if let Some(len) = dispositivo {
            secciones.insert("dispositivo".to_string(), section(len));
        }
        measure
    }

    #[test]
    fn ratio_interpretation_thresholds() {
        let extensa = measure_with(300, Some(100));
        let ratio = JustificationRatio::from_structure(&extensa.estructura_detectada);
        assert_eq!(ratio.interpretacion, "justificacion_extensa");
        assert!((ratio.ratio_numerico - 3.0).abs() < f64::EPSILON);

        let proporcionada = measure_with(200, Some(100));
        let ratio = JustificationRatio::from_structure(&proporcionada.estructura_detectada);
        assert_eq!(ratio.interpretacion, "justificacion_proporcionada");

        let sin = measure_with(200, None);
        let ratio = JustificationRatio::from_structure(&sin.estructura_detectada);
        assert_eq!(ratio.interpretacion, "sin_dispositivo_claro");
        assert_eq!(ratio.ratio_numerico, 0.0);
    }

    #[test]
    fn text_stats_count_words_and_sections() {
        let measure = measure_with(50, Some(25));
        let stats = TextStats::from_measure(&measure);

        assert_eq!(stats.longitud_total_palabras, 5);
        assert_eq!(stats.secciones_detectadas, 2);
        assert!(stats.tiene_considerandos);
        assert_eq!(stats.ratio_justificacion_accion, Some(2.0));
    }

    #[test]
    fn literal_analysis_carries_scraper_elements() {
        let mut measure = measure_with(10, None);
        measure
            .elementos_detectados
            .push(DetectedElement::possible_signer("Luis CAPUTO"));

        let literal = LiteralAnalysis::from_measure(&measure, json!({}));
        let value = serde_json::to_value(&literal).unwrap();

        assert_eq!(
            value["elementos_detectados_scraper"][0]["contenido"],
            "Luis CAPUTO"
        );
        assert_eq!(
            value["elementos_detectados_scraper"][0]["tipo_detectado"],
            "posible_firmante"
        );
    }

    #[test]
    fn analysis_file_name_uses_stem() {
        assert_eq!(
            MeasureAnalysis::file_name_for("medida_300721_20231211.json"),
            "medida_300721_20231211_analysis_agnostic.json"
        );
        assert_eq!(file_stem("noext"), "noext");
    }

    #[test]
    fn batch_stats_aggregate_llm_fields() {
        let measure = measure_with(10, Some(10));
        let make = |risk: &str, topic: Option<&str>| MeasureAnalysis {
            numero_medida: "1".to_string(),
            fecha_boletin: "2024-01-02".to_string(),
            fecha_analisis: String::new(),
            analisis_literal: LiteralAnalysis::from_measure(
                &measure,
                json!({"entidades_mencionadas": ["ANSES", "BCRA"]}),
            ),
            analisis_critico: error_section("sin clave"),
            analisis_abogado_diablo: json!({ "nivel_riesgo_democratico": risk }),
            analisis_semantico: match topic {
                Some(t) => json!({ "categoria_emergente": t }),
                None => error_section("timeout"),
            },
            metadatos_analisis: AnalysisMetadata::default(),
        };

        let results = vec![
            make("alto", Some("economia")),
            make("alto", Some("economia")),
            make("desconocido", None),
        ];
        let stats = BatchStats::from_results(&results);

        assert_eq!(stats.medidas_con_considerandos, 3);
        assert_eq!(stats.organismos_detectados, vec!["ANSES", "BCRA"]);
        assert_eq!(stats.temas_emergentes["economia"], 2);
        assert_eq!(stats.temas_emergentes["sin_clasificar"], 1);
        assert_eq!(stats.niveles_riesgo["alto"], 2);
        assert_eq!(stats.niveles_riesgo.values().sum::<usize>(), 2);
    }
}
