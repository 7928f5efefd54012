//! 结果输出服务 - 业务能力层
//!
//! 只负责"写结果表 + 示例列表并上传"能力，不关心批处理流程

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::config::Config;
use crate::error::{AppError, AppResult, FileError};
use crate::infrastructure::RemoteStore;
use crate::models::{Checkpoint, TypeRow};

/// 结果输出服务
///
/// 职责：
/// - 把汇总行写成 CSV（表头 Tipo, Cantidad, Porcentaje, Con_PDF, Pct_PDF, Ejemplo_H2）
/// - 把每个标签的示例写成 JSON
/// - 通过已登录的会话上传这两个文件
pub struct ResultEmitter {
    table_file: PathBuf,
    examples_file: PathBuf,
    results_dir: String,
}

impl ResultEmitter {
    pub fn new(config: &Config) -> Self {
        Self {
            table_file: config.table_file.clone(),
            examples_file: config.examples_file.clone(),
            results_dir: config.results_dir.clone(),
        }
    }

    pub fn with_paths(
        table_file: impl Into<PathBuf>,
        examples_file: impl Into<PathBuf>,
        results_dir: impl Into<String>,
    ) -> Self {
        Self {
            table_file: table_file.into(),
            examples_file: examples_file.into(),
            results_dir: results_dir.into(),
        }
    }

    /// 写入本地文件，返回写出的行
    pub fn write_local(&self, checkpoint: &Checkpoint) -> AppResult<Vec<TypeRow>> {
        let rows = checkpoint.result_rows();
        write_table(&self.table_file, &rows)?;

        let json = serde_json::to_vec_pretty(checkpoint.examples())?;
        fs::write(&self.examples_file, json)
            .map_err(|e| AppError::file_write_failed(&self.examples_file, e))?;

        info!(
            "✓ 结果已写入 {} ({} 行) 和 {}",
            self.table_file.display(),
            rows.len(),
            self.examples_file.display()
        );
        Ok(rows)
    }

    /// 上传两个结果文件；会话需位于登录根目录
    pub fn upload(&self, store: &mut dyn RemoteStore) -> AppResult<()> {
        if !self.results_dir.is_empty() {
            store.change_dir(&self.results_dir)?;
        }
        for path in [&self.table_file, &self.examples_file] {
            let name = remote_name(path);
            store.store_from(path, &name)?;
            debug!("已上传 {}", name);
        }
        info!("📤 结果已上传到 /{}", self.results_dir);
        Ok(())
    }
}

fn write_table(path: &Path, rows: &[TypeRow]) -> AppResult<()> {
    let csv_error = |source: csv::Error| FileError::CsvFailed {
        path: path.to_path_buf(),
        source,
    };

    let file = File::create(path).map_err(|e| AppError::file_write_failed(path, e))?;
    let mut writer = csv::Writer::from_writer(file);
    if rows.is_empty() {
        // 空表也保留表头
        writer
            .write_record(["Tipo", "Cantidad", "Porcentaje", "Con_PDF", "Pct_PDF", "Ejemplo_H2"])
            .map_err(csv_error)?;
    }
    for row in rows {
        writer.serialize(row).map_err(csv_error)?;
    }
    writer
        .flush()
        .map_err(|e| AppError::file_write_failed(path, e))?;
    Ok(())
}

fn remote_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::{MemoryConnector, StoreConnector};
    use crate::models::LabelExample;

    fn sample_checkpoint() -> Checkpoint {
        let mut checkpoint = Checkpoint::default();
        for (i, label) in ["DECRETO", "DECRETO", "AVISO"].iter().enumerate() {
            checkpoint.record(
                &format!("medida_{}_20240102.json", i),
                label,
                LabelExample {
                    h2_completo: format!("{} {}/2024", label, i),
                    fecha: "2024-01-02".to_string(),
                    tiene_pdf: i == 0,
                },
            );
        }
        checkpoint
    }

    #[test]
    fn writes_csv_with_headers_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let emitter = ResultEmitter::with_paths(
            dir.path().join("tipos.csv"),
            dir.path().join("ejemplos.json"),
            "",
        );

        let rows = emitter.write_local(&sample_checkpoint()).unwrap();
        assert_eq!(rows.len(), 2);

        let csv = fs::read_to_string(dir.path().join("tipos.csv")).unwrap();
        let mut lines = csv.lines();
        assert_eq!(
            lines.next(),
            Some("Tipo,Cantidad,Porcentaje,Con_PDF,Pct_PDF,Ejemplo_H2")
        );
        assert_eq!(lines.next(), Some("DECRETO,2,66.67%,1,50.0%,DECRETO 0/2024"));
        assert_eq!(lines.next(), Some("AVISO,1,33.33%,0,0.0%,AVISO 2/2024"));

        let examples: serde_json::Value =
            serde_json::from_slice(&fs::read(dir.path().join("ejemplos.json")).unwrap()).unwrap();
        assert_eq!(examples["DECRETO"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn empty_table_keeps_header() {
        let dir = tempfile::tempdir().unwrap();
        let emitter = ResultEmitter::with_paths(
            dir.path().join("tipos.csv"),
            dir.path().join("ejemplos.json"),
            "",
        );

        emitter.write_local(&Checkpoint::default()).unwrap();

        let csv = fs::read_to_string(dir.path().join("tipos.csv")).unwrap();
        assert_eq!(csv.trim(), "Tipo,Cantidad,Porcentaje,Con_PDF,Pct_PDF,Ejemplo_H2");
    }

    #[test]
    fn uploads_into_results_dir() {
        let dir = tempfile::tempdir().unwrap();
        let connector = MemoryConnector::new();
        connector.mkdir("resultados");
        let emitter = ResultEmitter::with_paths(
            dir.path().join("tipos_desde_h2.csv"),
            dir.path().join("ejemplos_h2_completos.json"),
            "resultados",
        );
        emitter.write_local(&sample_checkpoint()).unwrap();

        let mut session = connector.connect().unwrap();
        emitter.upload(session.as_mut()).unwrap();

        assert!(connector.get("resultados/tipos_desde_h2.csv").is_some());
        assert!(connector.get("resultados/ejemplos_h2_completos.json").is_some());
    }
}
