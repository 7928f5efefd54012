//! 公报抓取服务 - 业务能力层
//!
//! 只负责"抓取并解析一条公报"能力，不关心按日期遍历编号的流程
//!
//! ## 技术栈
//! - `reqwest` 发起请求，429 / 5xx 和网络错误按指数退避重试
//! - `scraper` 解析页面，提取标题、正文、区块、PDF 链接和元数据
//! - 可能的签署人和 class 提示交给 `page_elements`

use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;
use std::time::Duration;

use chrono::{Local, NaiveDate};
use regex::Regex;
use reqwest::StatusCode;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::AppResult;
use crate::models::measure::{
    DocumentStructure, ExtraSection, HtmlContent, Measure, Metadata, NavLink, PdfLink, Section,
};
use crate::services::page_elements::{detect_elements, relevant_classes};

const RETRY_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

static DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d{1,2}[/-]\d{1,2}[/-]\d{2,4}|\d{4}[/-]\d{1,2}[/-]\d{1,2}").expect("date regex")
});

static REFERENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"N[°º]?\s*\d+[/-]?\d*").expect("reference regex"));

// 下一个"全大写标题:"所在位置
static SECTION_BOUNDARY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\n[A-Z]{4,}:").expect("boundary regex"));

static ARTICLE_BOUNDARY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\nART[ÍI]CULO|\nCOMUN[ÍI]QUESE").expect("article regex"));

static EXTRA_SECTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\n([A-ZÁÉÍÓÚÑÜ]{4,}(?:\s+[A-ZÁÉÍÓÚÑÜ]+)*):?\s*([^\n]+)").expect("extra section regex")
});

/// 区块的结束方式
#[derive(Clone, Copy)]
enum SectionEnd {
    /// 到下一个大写标题为止
    NextHeading,
    /// 到下一条 ARTÍCULO / COMUNÍQUESE 为止
    NextArticle,
    /// 到全文结束
    EndOfText,
}

static SECTION_PATTERNS: LazyLock<Vec<(&'static str, Regex, SectionEnd)>> = LazyLock::new(|| {
    [
        ("visto", r"(?i)VISTO:?\s*", SectionEnd::NextHeading),
        ("considerandos", r"(?i)CONSIDERANDO:?\s*", SectionEnd::NextHeading),
        ("dispositivo", r"(?i)(?:RESUELVE|DECRETA|DISPONE):?\s*", SectionEnd::EndOfText),
        ("por_tanto", r"(?i)POR\s+TANTO:?\s*", SectionEnd::NextHeading),
        ("articulos", r"(?i)ART[ÍI]CULO\s+", SectionEnd::NextArticle),
        ("fundamentos", r"(?i)FUNDAMENTOS:?\s*", SectionEnd::NextHeading),
    ]
    .into_iter()
    .map(|(name, pattern, end)| (name, Regex::new(pattern).expect("section regex"), end))
    .collect()
});

/// 公报抓取服务
///
/// 职责：
/// - 按编号和日期请求公报详情页
/// - 404 视为不存在（返回 None）
/// - 把页面解析成 `Measure`
pub struct ScrapeService {
    client: reqwest::Client,
    base_url: String,
    max_retries: u32,
    backoff: Duration,
}

impl ScrapeService {
    pub fn new(config: &Config) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("bora-analisis/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: config.bora_base_url.trim_end_matches('/').to_string(),
            max_retries: 3,
            backoff: Duration::from_secs(1),
        })
    }

    /// 详情页地址：`{base}/detalleAviso/primera/{n}/{yyyymmdd}`
    pub fn measure_url(&self, number: u64, date: NaiveDate) -> String {
        format!(
            "{}/detalleAviso/primera/{}/{}",
            self.base_url,
            number,
            date.format("%Y%m%d")
        )
    }

    /// 抓取一条公报；页面不存在时返回 `Ok(None)`
    pub async fn fetch_measure(&self, number: u64, date: NaiveDate) -> AppResult<Option<Measure>> {
        let url = self.measure_url(number, date);
        let Some(html) = self.fetch_page(&url).await? else {
            debug!("公报 {} 不存在", url);
            return Ok(None);
        };
        Ok(Some(parse_measure(&html, number, date, &url, &self.base_url)))
    }

    async fn fetch_page(&self, url: &str) -> AppResult<Option<String>> {
        let mut attempt = 0;
        loop {
            let result = self.client.get(url).send().await;
            let retry_reason = match result {
                Ok(response) => {
                    let status = response.status();
                    if status == StatusCode::NOT_FOUND {
                        return Ok(None);
                    }
                    if !RETRY_STATUSES.contains(&status.as_u16()) || attempt >= self.max_retries {
                        let response = response.error_for_status()?;
                        return Ok(Some(response.text().await?));
                    }
                    format!("HTTP {}", status)
                }
                Err(e) if attempt < self.max_retries && (e.is_connect() || e.is_timeout()) => {
                    e.to_string()
                }
                Err(e) => return Err(e.into()),
            };

            attempt += 1;
            let wait = self.backoff.saturating_mul(1 << (attempt - 1));
            warn!(
                "⚠️ 请求 {} 失败 ({})，{:?} 后第 {}/{} 次重试",
                url, retry_reason, wait, attempt, self.max_retries
            );
            tokio::time::sleep(wait).await;
        }
    }
}

/// 页面中用到的 CSS 选择器
struct PageSelectors {
    h1: Selector,
    h2_titulo: Selector,
    h2: Selector,
    page_content: Selector,
    contenido: Selector,
    breadcrumb_links: Selector,
    links: Selector,
    meta: Selector,
}

impl PageSelectors {
    fn new() -> Self {
        let parse = |css: &str| Selector::parse(css).expect("valid selector");
        Self {
            h1: parse("h1"),
            h2_titulo: parse("h2.titulo"),
            h2: parse("h2"),
            page_content: parse("div#page-content"),
            contenido: parse("div.contenido"),
            breadcrumb_links: parse(r#"nav[aria-label="breadcrumb"] a"#),
            links: parse("a[href]"),
            meta: parse("meta"),
        }
    }
}

/// 把详情页 HTML 解析成 `Measure`
pub fn parse_measure(html: &str, number: u64, date: NaiveDate, url: &str, base_url: &str) -> Measure {
    let selectors = PageSelectors::new();
    let document = Html::parse_document(html);

    let title = document
        .select(&selectors.h1)
        .next()
        .or_else(|| document.select(&selectors.h2_titulo).next())
        .or_else(|| document.select(&selectors.h2).next());
    let titulo_raw = title.map(|el| compact_text(&el)).unwrap_or_default();

    let content = document
        .select(&selectors.page_content)
        .next()
        .or_else(|| document.select(&selectors.contenido).next());
    let texto_completo_limpio = content.map(|el| line_text(&el)).unwrap_or_default();
    let estructura_detectada = content
        .map(|el| detect_structure(&el.text().collect::<String>()))
        .unwrap_or_default();

    let contenido_html_completo = HtmlContent::Sections {
        titulo: document
            .select(&selectors.h2)
            .next()
            .map(|el| el.html())
            .unwrap_or_default(),
        cuerpo: content.map(|el| el.html()).unwrap_or_default(),
    };

    let pdf_urls: Vec<PdfLink> = document
        .select(&selectors.links)
        .filter_map(|link| {
            let href = link.value().attr("href")?;
            if !href.to_lowercase().contains(".pdf") {
                return None;
            }
            let url = if href.starts_with("http") {
                href.to_string()
            } else {
                format!("{}{}", base_url, href)
            };
            let contexto = link
                .parent()
                .and_then(ElementRef::wrap)
                .map(|parent| compact_text(&parent))
                .unwrap_or_default();
            Some(PdfLink {
                url,
                texto_enlace: compact_text(&link),
                contexto,
            })
        })
        .collect();

    let page_text = document.root_element().text().collect::<String>();
    let metadatos_extraidos = Metadata {
        navegacion: document
            .select(&selectors.breadcrumb_links)
            .enumerate()
            .map(|(posicion, link)| NavLink {
                texto: compact_text(&link),
                href: link.value().attr("href").unwrap_or_default().to_string(),
                posicion,
            })
            .collect(),
        meta_tags: document
            .select(&selectors.meta)
            .filter_map(|meta| {
                let attrs: BTreeMap<String, String> = ["name", "content", "property", "http-equiv"]
                    .iter()
                    .filter_map(|attr| {
                        meta.value()
                            .attr(attr)
                            .map(|value| (attr.to_string(), value.to_string()))
                    })
                    .collect();
                (!attrs.is_empty()).then_some(attrs)
            })
            .collect(),
        fechas_detectadas: unique_matches(&DATE_RE, &page_text),
        numeros_referencia: unique_matches(&REFERENCE_RE, &page_text),
        clases_relevantes: relevant_classes(&document),
    };
    let elementos_detectados = detect_elements(&document, &page_text);

    Measure {
        numero_medida: number.to_string(),
        fecha_boletin: date.format("%Y-%m-%d").to_string(),
        url: url.to_string(),
        titulo_raw,
        contenido_html_completo,
        texto_completo_limpio,
        estructura_detectada,
        metadatos_extraidos,
        elementos_detectados,
        tiene_pdf: !pdf_urls.is_empty(),
        pdf_urls,
        timestamp_scraping: Local::now().format("%Y-%m-%dT%H:%M:%S%.6f").to_string(),
    }
}

/// 识别 VISTO / CONSIDERANDO / RESUELVE 等区块
pub fn detect_structure(text: &str) -> DocumentStructure {
    let mut structure = DocumentStructure::default();

    for (name, start_re, end) in SECTION_PATTERNS.iter() {
        let Some(start) = start_re.find(text) else {
            continue;
        };
        let content_start = start.end();
        let content_end = match end {
            SectionEnd::NextHeading => SECTION_BOUNDARY_RE
                .find_at(text, content_start)
                .map(|m| m.start())
                .unwrap_or(text.len()),
            SectionEnd::NextArticle => ARTICLE_BOUNDARY_RE
                .find_at(text, content_start)
                .map(|m| m.start())
                .unwrap_or(text.len()),
            SectionEnd::EndOfText => text.len(),
        };

        let contenido = text[content_start..content_end].trim().to_string();
        structure.secciones.insert(
            name.to_string(),
            Section {
                longitud_caracteres: contenido.chars().count(),
                contenido,
                posicion_inicio: char_offset(text, start.start()),
                posicion_fin: char_offset(text, content_end),
                requiere_analisis_critico: *name == "considerandos",
            },
        );
    }

    structure.secciones_adicionales = EXTRA_SECTION_RE
        .captures_iter(text)
        .map(|caps| ExtraSection {
            nombre: caps[1].to_string(),
            contenido_primera_linea: caps[2].to_string(),
        })
        .collect();

    structure
}

fn char_offset(text: &str, byte_idx: usize) -> usize {
    text[..byte_idx].chars().count()
}

/// 元素文本，合并空白
fn compact_text(element: &ElementRef<'_>) -> String {
    element.text().collect::<Vec<_>>().join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}

/// 元素文本，每个文本节点一行
fn line_text(element: &ElementRef<'_>) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn unique_matches(re: &Regex, text: &str) -> Vec<String> {
    re.find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::measure::DetectedElement;

    const PAGE: &str = r#"<html><head>
        <meta name="description" content="Boletín Oficial">
        <meta charset="utf-8">
        </head><body>
        <nav aria-label="breadcrumb"><a href="/">Inicio</a><a href="/seccion/primera">Primera sección</a></nav>
        <h1>MINISTERIO DE ECONOMÍA</h1>
        <h2>RESOLUCIÓN N° 45/2024</h2>
        <div id="page-content">
        <p>VISTO el Expediente N° 1234/2024, y</p>
        <p>CONSIDERANDO:</p>
        <p>Que resulta necesario actualizar los valores del 01/02/2024.</p>
        <p>Por ello,</p>
        <p>EL MINISTRO DE ECONOMÍA RESUELVE:</p>
        <p>ARTÍCULO 1°.- Apruébase el anexo.</p>
        <p>ARTÍCULO 2°.- Comuníquese.</p>
        <p class="firma">Luis CAPUTO</p>
        </div>
        <p>Ver <a href="/pdf/anexo.PDF">Anexo</a></p>
        <a href="https://otra.gob.ar/doc.pdf">Externo</a>
        </body></html>"#;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()
    }

    #[test]
    fn parses_title_content_and_links() {
        let measure = parse_measure(
            PAGE,
            45,
            date(),
            "https://example.gob.ar/detalleAviso/primera/45/20240102",
            "https://example.gob.ar",
        );

        assert_eq!(measure.numero_medida, "45");
        assert_eq!(measure.fecha_boletin, "2024-01-02");
        assert_eq!(measure.titulo_raw, "MINISTERIO DE ECONOMÍA");
        assert_eq!(measure.html_title(), "<h2>RESOLUCIÓN N° 45/2024</h2>");
        assert!(measure.texto_completo_limpio.starts_with("VISTO el Expediente"));
        assert!(measure.texto_completo_limpio.contains("\nCONSIDERANDO:\n"));

        assert!(measure.tiene_pdf);
        let urls: Vec<&str> = measure.pdf_urls.iter().map(|p| p.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://example.gob.ar/pdf/anexo.PDF",
                "https://otra.gob.ar/doc.pdf"
            ]
        );
        assert_eq!(measure.pdf_urls[0].texto_enlace, "Anexo");
        assert_eq!(measure.pdf_urls[0].contexto, "Ver Anexo");
    }

    #[test]
    fn collects_metadata() {
        let measure = parse_measure(PAGE, 45, date(), "u", "https://example.gob.ar");
        let meta = &measure.metadatos_extraidos;

        assert_eq!(meta.navegacion.len(), 2);
        assert_eq!(meta.navegacion[1].texto, "Primera sección");
        assert_eq!(meta.navegacion[1].posicion, 1);
        assert_eq!(meta.meta_tags.len(), 1);
        assert_eq!(meta.meta_tags[0]["name"], "description");
        assert!(meta.fechas_detectadas.contains(&"01/02/2024".to_string()));
        assert!(meta.numeros_referencia.contains(&"N° 1234/2024".to_string()));
        assert!(meta.clases_relevantes.is_empty());
    }

    #[test]
    fn detects_possible_signers() {
        let measure = parse_measure(PAGE, 45, date(), "u", "https://example.gob.ar");

        let signer = measure
            .elementos_detectados
            .iter()
            .find(|e| e.tipo_detectado == DetectedElement::POSSIBLE_SIGNER)
            .unwrap();
        assert_eq!(signer.contenido, "Luis CAPUTO");
    }

    #[test]
    fn detects_sections() {
        let text = "VISTO el expediente\nCONSIDERANDO:\nQue es necesario.\nQue corresponde.\nRESUELVE:\nARTÍCULO 1°.- Apruébase.\nARTÍCULO 2°.- Comuníquese.";
        let structure = detect_structure(text);

        let visto = structure.get("visto").unwrap();
        assert_eq!(visto.contenido, "el expediente");
        assert_eq!(visto.posicion_inicio, 0);

        let considerandos = structure.get("considerandos").unwrap();
        assert_eq!(considerandos.contenido, "Que es necesario.\nQue corresponde.");
        assert!(considerandos.requiere_analisis_critico);
        assert_eq!(
            considerandos.longitud_caracteres,
            considerandos.contenido.chars().count()
        );

        let dispositivo = structure.get("dispositivo").unwrap();
        assert!(dispositivo.contenido.starts_with("ARTÍCULO 1°"));
        assert!(dispositivo.contenido.ends_with("Comuníquese."));

        let articulos = structure.get("articulos").unwrap();
        assert_eq!(articulos.contenido, "1°.- Apruébase.");

        assert!(structure.get("fundamentos").is_none());
        assert!(structure
            .secciones_adicionales
            .iter()
            .any(|s| s.nombre == "RESUELVE"));
    }

    #[test]
    fn page_without_content_has_empty_structure() {
        let measure = parse_measure("<html><body><p>nada</p></body></html>", 1, date(), "u", "b");
        assert!(measure.estructura_detectada.is_empty());
        assert!(!measure.tiene_pdf);
        assert_eq!(measure.html_title(), "");
    }

    #[test]
    fn builds_detail_url() {
        let config = Config {
            bora_base_url: "https://www.boletinoficial.gob.ar/".to_string(),
            ..Config::default()
        };
        let service = ScrapeService::new(&config).unwrap();
        assert_eq!(
            service.measure_url(300721, NaiveDate::from_ymd_opt(2023, 12, 11).unwrap()),
            "https://www.boletinoficial.gob.ar/detalleAviso/primera/300721/20231211"
        );
    }

    #[tokio::test]
    #[ignore]
    async fn fetches_live_measure() {
        let service = ScrapeService::new(&Config::default()).unwrap();
        let result = service
            .fetch_measure(300721, NaiveDate::from_ymd_opt(2023, 12, 11).unwrap())
            .await;
        assert!(result.is_ok());
    }
}
