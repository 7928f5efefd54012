use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::models::measure::Measure;

/// 每个标签保留的示例上限
pub const MAX_EXAMPLES_PER_LABEL: usize = 5;

/// 结果表中示例标题保留的字符数（直接截断，不加省略号）
pub const EXAMPLE_CHARS: usize = 80;

/// 标签的示例条目
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LabelExample {
    pub h2_completo: String,
    pub fecha: String,
    pub tiene_pdf: bool,
}

/// 结果表的一行（导出为 CSV）
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TypeRow {
    #[serde(rename = "Tipo")]
    pub tipo: String,
    #[serde(rename = "Cantidad")]
    pub cantidad: u64,
    #[serde(rename = "Porcentaje")]
    pub porcentaje: String,
    #[serde(rename = "Con_PDF")]
    pub con_pdf: u64,
    #[serde(rename = "Pct_PDF")]
    pub pct_pdf: String,
    #[serde(rename = "Ejemplo_H2")]
    pub ejemplo_h2: String,
}

impl TypeRow {
    pub fn new(tipo: &str, cantidad: u64, con_pdf: u64, total: u64, ejemplo: &str) -> Self {
        Self {
            tipo: tipo.to_string(),
            cantidad,
            porcentaje: format!("{:.2}%", percentage(cantidad, total)),
            con_pdf,
            pct_pdf: format!("{:.1}%", percentage(con_pdf, cantidad)),
            ejemplo_h2: ejemplo.chars().take(EXAMPLE_CHARS).collect(),
        }
    }
}

/// 本地已抓取数据的概况
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct ScrapeStats {
    /// 本地 `medida_*.json` 文件数（含无法解析的）
    pub total_medidas: usize,
    pub fechas_cubiertas: BTreeSet<String>,
    /// 面包屑导航中出现过的文字
    pub organismos_detectados: BTreeSet<String>,
    pub tipos_documento_detectados: BTreeSet<String>,
}

impl ScrapeStats {
    pub fn record(&mut self, measure: &Measure) {
        self.fechas_cubiertas.insert(measure.fecha_boletin.clone());
        for link in &measure.metadatos_extraidos.navegacion {
            if !link.texto.is_empty() {
                self.organismos_detectados.insert(link.texto.clone());
            }
        }
    }
}

fn percentage(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_formats_percentages() {
        let row = TypeRow::new("DECRETO", 25, 5, 200, "DECRETO 12/2024");
        assert_eq!(row.porcentaje, "12.50%");
        assert_eq!(row.pct_pdf, "20.0%");
        assert_eq!(row.ejemplo_h2, "DECRETO 12/2024");
    }

    #[test]
    fn long_examples_are_cut_without_suffix() {
        let heading = format!("RESOLUCIÓN N° 45/2024 {}", "Ñ".repeat(100));
        let row = TypeRow::new("RESOLUCIÓN", 1, 0, 1, &heading);
        assert_eq!(row.ejemplo_h2.chars().count(), EXAMPLE_CHARS);
        assert!(heading.starts_with(&row.ejemplo_h2));
        assert!(!row.ejemplo_h2.ends_with("..."));
    }

    #[test]
    fn zero_totals_do_not_divide_by_zero() {
        let row = TypeRow::new("SIN_H2", 0, 0, 0, "");
        assert_eq!(row.porcentaje, "0.00%");
        assert_eq!(row.pct_pdf, "0.0%");
    }
}
