use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// 一条公报记录（medida），抓取后写入即不再修改
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Measure {
    #[serde(deserialize_with = "deserialize_id")]
    pub numero_medida: String,
    pub fecha_boletin: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub titulo_raw: String,
    #[serde(default)]
    pub contenido_html_completo: HtmlContent,
    #[serde(default)]
    pub texto_completo_limpio: String,
    #[serde(default)]
    pub estructura_detectada: DocumentStructure,
    #[serde(default)]
    pub metadatos_extraidos: Metadata,
    /// 可能的签署人和权限语境，供后续分析参考
    #[serde(default)]
    pub elementos_detectados: Vec<DetectedElement>,
    #[serde(default)]
    pub pdf_urls: Vec<PdfLink>,
    #[serde(default)]
    pub tiene_pdf: bool,
    #[serde(default)]
    pub timestamp_scraping: String,
}

impl Measure {
    /// 标签提取器读取的 HTML 片段
    pub fn html_title(&self) -> &str {
        self.contenido_html_completo.title_fragment()
    }

    /// 本地/远程保存时使用的文件名
    pub fn file_name(&self) -> String {
        format!(
            "medida_{}_{}.json",
            self.numero_medida,
            self.fecha_boletin.replace('-', "")
        )
    }

    pub fn from_slice(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

/// 页面 HTML：旧数据直接保存整页字符串，新数据按区域拆分
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum HtmlContent {
    Sections {
        titulo: String,
        #[serde(default)]
        cuerpo: String,
    },
    Raw(String),
}

impl Default for HtmlContent {
    fn default() -> Self {
        HtmlContent::Raw(String::new())
    }
}

impl HtmlContent {
    pub fn title_fragment(&self) -> &str {
        match self {
            HtmlContent::Sections { titulo, .. } => titulo,
            HtmlContent::Raw(html) => html,
        }
    }
}

/// 正文中识别出的区块（VISTO、CONSIDERANDO、RESUELVE……）
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DocumentStructure {
    #[serde(flatten)]
    pub secciones: BTreeMap<String, Section>,
    #[serde(default)]
    pub secciones_adicionales: Vec<ExtraSection>,
}

impl DocumentStructure {
    pub fn get(&self, name: &str) -> Option<&Section> {
        self.secciones.get(name)
    }

    /// 执行部分：优先 dispositivo，其次 articulos
    pub fn operative(&self) -> Option<&Section> {
        self.get("dispositivo").or_else(|| self.get("articulos"))
    }

    pub fn len(&self) -> usize {
        self.secciones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.secciones.is_empty()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Section {
    pub contenido: String,
    #[serde(default)]
    pub posicion_inicio: usize,
    #[serde(default)]
    pub posicion_fin: usize,
    #[serde(default)]
    pub longitud_caracteres: usize,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub requiere_analisis_critico: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtraSection {
    pub nombre: String,
    pub contenido_primera_linea: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub navegacion: Vec<NavLink>,
    #[serde(default)]
    pub meta_tags: Vec<BTreeMap<String, String>>,
    #[serde(default)]
    pub fechas_detectadas: Vec<String>,
    #[serde(default)]
    pub numeros_referencia: Vec<String>,
    /// class 名看起来像类型 / 分区的元素
    #[serde(default)]
    pub clases_relevantes: Vec<RelevantClass>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RelevantClass {
    pub clase: String,
    pub texto: String,
    pub tag: String,
}

/// 页面中识别出的元素
///
/// `tipo_detectado` 目前有两种：
/// - `posible_firmante`：形如 "Luis CAPUTO" 的人名
/// - `contexto_autoridad`：包含签署 / 任命类关键词的段落
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DetectedElement {
    pub tipo_detectado: String,
    pub contenido: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub palabra_clave: Option<String>,
    pub patron_usado: String,
}

impl DetectedElement {
    pub const POSSIBLE_SIGNER: &'static str = "posible_firmante";
    pub const AUTHORITY_CONTEXT: &'static str = "contexto_autoridad";

    pub fn possible_signer(name: impl Into<String>) -> Self {
        Self {
            tipo_detectado: Self::POSSIBLE_SIGNER.to_string(),
            contenido: name.into(),
            palabra_clave: None,
            patron_usado: "nombre_apellido_mayusculas".to_string(),
        }
    }

    pub fn authority_context(text: impl Into<String>, keyword: &str) -> Self {
        Self {
            tipo_detectado: Self::AUTHORITY_CONTEXT.to_string(),
            contenido: text.into(),
            palabra_clave: Some(keyword.to_string()),
            patron_usado: "contexto_semantico".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NavLink {
    pub texto: String,
    pub href: String,
    pub posicion: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PdfLink {
    pub url: String,
    #[serde(default)]
    pub texto_enlace: String,
    #[serde(default)]
    pub contexto: String,
}

// 编号既可能是字符串也可能是整数
fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Visitor;
    use std::fmt;

    struct IdVisitor;

    impl<'de> Visitor<'de> for IdVisitor {
        type Value = String;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a string or integer measure number")
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(value.to_string())
        }

        fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(value.to_string())
        }

        fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(value.to_string())
        }
    }

    deserializer.deserialize_any(IdVisitor)
}
