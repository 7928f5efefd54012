//! 分析流程 - 流程层
//!
//! 核心职责：定义"一条公报"的完整分析流程
//!
//! 流程顺序：
//! 1. 字面分析（抓取数据 + 文本统计 + LLM 要素识别）
//! 2. 批判分析（理由 vs 执行部分）
//! 3. 魔鬼代言人分析
//! 4. 语义分析
//!
//! 任何一步 LLM 失败只会让对应字段变成 `{"error": ...}`，不会中断整条公报。

use std::sync::Arc;

use serde_json::Value;
use tracing::{info, warn};

use crate::models::analysis::{
    error_section, AnalysisMetadata, JustificationRatio, LiteralAnalysis, MeasureAnalysis,
};
use crate::models::Measure;
use crate::services::llm_service::{ask_json, ChatModel};

/// 文本短于该长度时不做要素识别
const MIN_TEXT_FOR_ELEMENTS: usize = 50;

const SYSTEM_MESSAGE: &str = "Eres un analista de normativa oficial argentina. \
    No uses categorías predefinidas y no inventes datos. \
    Responde únicamente con un objeto JSON válido, sin texto adicional.";

/// 公报分析流程
///
/// - 不持有存储会话
/// - 只依赖 `ChatModel` 能力
pub struct AnalysisFlow {
    model: Arc<dyn ChatModel>,
}

impl AnalysisFlow {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }

    pub async fn run(&self, measure: &Measure) -> MeasureAnalysis {
        info!(
            "🔍 分析公报 {} ({})，模型: {}",
            measure.numero_medida,
            measure.fecha_boletin,
            self.model.model_name()
        );

        let elements = self.detect_elements(measure).await;
        MeasureAnalysis {
            numero_medida: measure.numero_medida.clone(),
            fecha_boletin: measure.fecha_boletin.clone(),
            fecha_analisis: chrono::Local::now().to_rfc3339(),
            analisis_literal: LiteralAnalysis::from_measure(measure, elements),
            analisis_critico: self.critical(measure).await,
            analisis_abogado_diablo: self.devil_advocate(measure).await,
            analisis_semantico: self.semantic(measure).await,
            metadatos_analisis: AnalysisMetadata::default(),
        }
    }

    async fn detect_elements(&self, measure: &Measure) -> Value {
        let text = &measure.texto_completo_limpio;
        if text.chars().count() < MIN_TEXT_FOR_ELEMENTS {
            return error_section("Texto insuficiente para análisis IA");
        }

        let prompt = format!(
            r#"Analiza este texto oficial argentino SIN usar categorías predefinidas.
Detecta SOLO lo que esté EXPLÍCITAMENTE presente:

{}

Extrae en JSON:
{{
  "entidades_mencionadas": ["organismos, personas, instituciones mencionadas"],
  "referencias_normativas": ["decretos, leyes, resoluciones citadas"],
  "elementos_temporales": ["fechas, plazos, períodos mencionados"],
  "elementos_financieros": ["montos, presupuestos, costos mencionados"],
  "acciones_principales": ["qué acciones ordena este documento"],
  "autoridades_involucradas": ["quién firma, autoriza, designa"],
  "ambitos_afectados": ["qué áreas/sectores menciona"],
  "palabras_clave_destacadas": ["términos técnicos o significativos repetidos"]
}}

NO inventes. Solo extrae lo que esté literalmente presente."#,
            head_chars(text, 2000)
        );
        self.ask(&prompt, "Error detección IA").await
    }

    async fn critical(&self, measure: &Measure) -> Value {
        let structure = &measure.estructura_detectada;
        let considerandos = structure.get("considerandos");
        let critical_review = considerandos.is_some_and(|s| s.requiere_analisis_critico);
        let justification = considerandos.map(|s| s.contenido.as_str()).unwrap_or("");
        let operative = structure
            .operative()
            .map(|s| s.contenido.as_str())
            .unwrap_or("");

        let heading = if critical_review {
            "CONSIDERANDOS (JUSTIFICACIÓN OFICIAL - ANALIZAR CRÍTICAMENTE):"
        } else {
            "JUSTIFICACIÓN:"
        };
        let prompt = format!(
            r#"Análisis crítico de medida oficial argentina.

{}
{}

DISPOSITIVO/ARTÍCULOS (ACCIÓN REAL):
{}

Detecta gaps y problemas sin asumir categorías predefinidas:

1. ¿La justificación es PROPORCIONAL a las facultades otorgadas?
2. ¿El dispositivo va MÁS ALLÁ de lo justificado?
3. ¿Hay AMBIGÜEDADES que permiten interpretaciones amplias?
4. ¿Qué CAMBIOS en distribución de facultades detectas?
5. ¿Hay REDISTRIBUCIÓN de responsabilidades entre organismos?
6. ¿Qué OMISIONES significativas detectas?
7. ¿Hay EUFEMISMOS o lenguaje que oculta la verdadera función?

Responde SOLO en JSON:
{{
  "proporcionalidad_justificacion_accion": "alta/media/baja/sin_justificacion",
  "excesos_detectados": "descripción específica si el dispositivo excede justificación",
  "ambiguedades_detectadas": ["ambigüedades que permiten interpretación expansiva"],
  "concentracion_poder": "descripción de poder concentrado y en qué organismo/persona",
  "omisiones_significativas": ["qué información importante se omite"],
  "eufemismos_detectados": ["lenguaje que oculta verdadera función"],
  "nivel_transparencia": "alto/medio/bajo",
  "señales_alerta": ["aspectos que requieren escrutinio adicional"]
}}"#,
            heading, justification, operative
        );

        let mut result = self.ask(&prompt, "Error análisis crítico").await;
        if result.get("error").is_none() {
            if let Some(object) = result.as_object_mut() {
                object.insert(
                    "considerandos_analizados_criticamente".to_string(),
                    Value::Bool(critical_review),
                );
                object.insert(
                    "ratio_justificacion_accion".to_string(),
                    serde_json::to_value(JustificationRatio::from_structure(structure))
                        .unwrap_or(Value::Null),
                );
            }
        }
        result
    }

    async fn devil_advocate(&self, measure: &Measure) -> Value {
        let prompt = format!(
            r#"Actúa como abogado del diablo. Cuestiona con máxima suspicacia esta medida oficial:

TÍTULO: {}

CONTENIDO: {}

Pregúntate, SIN categorías predefinidas:

1. ¿Qué usos NO DECLARADOS permite esta medida?
2. ¿A quién puede perjudicar que NO está mencionado?
3. ¿Qué interpretaciones ABUSIVAS permite?
4. ¿Qué precedentes PELIGROSOS establece?
5. ¿Qué información se oculta deliberadamente?
6. ¿Qué grupos de poder se benefician sin aparecer mencionados?

Responde SOLO en JSON:
{{
  "usos_no_declarados": ["usos ocultos específicos que permite"],
  "perjudicados_omitidos": ["sectores afectados sin ser mencionados"],
  "interpretaciones_abusivas": ["cómo se puede abusar de la redacción"],
  "precedentes_peligrosos": ["qué precedentes problemáticos establece"],
  "informacion_oculta": ["qué información importante se omite"],
  "beneficiarios_ocultos": ["quién se beneficia sin aparecer mencionado"],
  "nivel_riesgo_democratico": "bajo/medio/alto/critico",
  "red_flags_principales": ["señales de alerta más importantes"]
}}"#,
            measure.titulo_raw,
            head_chars(&measure.texto_completo_limpio, 2000)
        );
        self.ask(&prompt, "Error abogado diablo").await
    }

    async fn semantic(&self, measure: &Measure) -> Value {
        let prompt = format!(
            r#"Análisis semántico agnóstico de medida oficial.
NO uses categorías predefinidas. Detecta patrones emergentes:

{}

Responde SOLO en JSON:
{{
  "tema_central_real": "descripción del tema real más allá del título oficial",
  "subtemas_detectados": ["temas secundarios identificados"],
  "patrones_linguisticos": ["patrones de lenguaje oficial/burocrático detectados"],
  "correlaciones_internas": ["conexiones entre diferentes partes del texto"],
  "funciones_multiples": ["diferentes funciones que podría cumplir esta medida"],
  "intenciones_implicitas": ["intenciones no declaradas que se pueden inferir"],
  "complejidad_semantica": "baja/media/alta",
  "categoria_emergente": "categoría que emerge del análisis semántico"
}}"#,
            head_chars(&measure.texto_completo_limpio, 1500)
        );
        self.ask(&prompt, "Error análisis semántico").await
    }

    async fn ask(&self, prompt: &str, error_prefix: &str) -> Value {
        match ask_json(self.model.as_ref(), prompt, Some(SYSTEM_MESSAGE)).await {
            Ok(value) if value.is_object() => value,
            Ok(other) => error_section(format!("{}: respuesta no es un objeto JSON ({})", error_prefix, other)),
            Err(e) => {
                warn!("⚠️ {}: {}", error_prefix, e);
                error_section(format!("{}: {}", error_prefix, e))
            }
        }
    }
}

/// 取前 `max` 个字符
fn head_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AppError, AppResult};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// 按提示词关键字返回固定回复
    struct ScriptedModel {
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        async fn complete(&self, user_message: &str, _system: Option<&str>) -> AppResult<String> {
            self.prompts.lock().unwrap().push(user_message.to_string());
            if user_message.contains("abogado del diablo") {
                Ok("```json\n{\"nivel_riesgo_democratico\": \"alto\"}\n```".to_string())
            } else if user_message.contains("semántico") {
                Err(AppError::llm_api_failed("stub", "timeout"))
            } else if user_message.contains("crítico") {
                Ok("{\"nivel_transparencia\": \"bajo\"}".to_string())
            } else {
                Ok("{\"entidades_mencionadas\": [\"ANSES\"]}".to_string())
            }
        }

        fn model_name(&self) -> &str {
            "stub"
        }
    }

    fn measure() -> Measure {
        serde_json::from_str(
            r#"{
                "numero_medida": 300721,
                "fecha_boletin": "2023-12-11",
                "url": "https://example.gob.ar/detalleAviso/primera/300721/20231211",
                "titulo_raw": "MINISTERIO DE ECONOMÍA",
                "texto_completo_limpio": "VISTO el expediente y CONSIDERANDO que resulta necesario actualizar los valores vigentes. RESUELVE: ARTÍCULO 1.",
                "estructura_detectada": {
                    "considerandos": {"contenido": "que resulta necesario", "longitud_caracteres": 300, "requiere_analisis_critico": true},
                    "dispositivo": {"contenido": "ARTÍCULO 1.", "longitud_caracteres": 100}
                },
                "tiene_pdf": true,
                "pdf_urls": [{"url": "https://example.gob.ar/a.pdf"}]
            }"#,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn llm_failures_become_error_sections() {
        let model = Arc::new(ScriptedModel {
            prompts: Mutex::new(Vec::new()),
        });
        let flow = AnalysisFlow::new(model.clone());

        let analysis = flow.run(&measure()).await;

        assert_eq!(analysis.numero_medida, "300721");
        assert_eq!(analysis.analisis_literal.cantidad_pdfs, 1);
        assert_eq!(
            analysis.analisis_literal.elementos_detectados_ia["entidades_mencionadas"][0],
            "ANSES"
        );
        assert_eq!(analysis.analisis_abogado_diablo["nivel_riesgo_democratico"], "alto");
        assert!(analysis.analisis_semantico["error"]
            .as_str()
            .unwrap()
            .starts_with("Error análisis semántico"));

        let critico = &analysis.analisis_critico;
        assert_eq!(critico["nivel_transparencia"], "bajo");
        assert_eq!(critico["considerandos_analizados_criticamente"], true);
        assert_eq!(
            critico["ratio_justificacion_accion"]["interpretacion"],
            "justificacion_extensa"
        );

        assert_eq!(model.prompts.lock().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn short_text_skips_element_detection() {
        let model = Arc::new(ScriptedModel {
            prompts: Mutex::new(Vec::new()),
        });
        let flow = AnalysisFlow::new(model.clone());
        let mut short = measure();
        short.texto_completo_limpio = "breve".to_string();

        let analysis = flow.run(&short).await;

        assert!(analysis.analisis_literal.elementos_detectados_ia["error"].is_string());
        assert_eq!(model.prompts.lock().unwrap().len(), 3);
    }

    #[test]
    fn head_chars_respects_char_boundaries() {
        assert_eq!(head_chars("ÁÉÍÓÚ", 2), "ÁÉ");
        assert_eq!(head_chars("abc", 10), "abc");
    }
}
