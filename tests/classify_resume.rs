//! 批量分类的续跑行为
//!
//! 使用内存存储，检查点和结果文件写在临时目录里。

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bora_analisis::error::{StoreError, StoreResult};
use bora_analisis::infrastructure::RemoteStore;
use bora_analisis::models::LabelExample;
use bora_analisis::{
    AppError, BatchClassifier, Checkpoint, Config, MemoryConnector, StoreConnector,
};

/// 前 `allowed` 次连接正常，之后服务器不再可达
struct DropsAfter {
    inner: MemoryConnector,
    allowed: AtomicUsize,
}

impl DropsAfter {
    fn new(inner: &MemoryConnector, allowed: usize) -> Self {
        Self {
            inner: inner.clone(),
            allowed: AtomicUsize::new(allowed),
        }
    }
}

impl StoreConnector for DropsAfter {
    fn connect(&self) -> StoreResult<Box<dyn RemoteStore>> {
        let granted = self
            .allowed
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if !granted {
            return Err(StoreError::ConnectFailed {
                host: "memory".to_string(),
                detail: "connection refused".to_string(),
            });
        }
        self.inner.connect()
    }

    fn describe(&self) -> String {
        "memory:// (drops)".to_string()
    }
}

fn seven_files(connector: &MemoryConnector) {
    for n in 1..=7 {
        connector.put(
            &format!("data/raw/m_{}.json", n),
            measure(n, &format!("DECRETO {}/2024", n)),
        );
    }
}

fn measure(n: usize, heading: &str) -> String {
    format!(
        r#"{{"numero_medida": {}, "fecha_boletin": "2024-03-0{}",
            "contenido_html_completo": {{"titulo": "<h2>{}</h2>", "cuerpo": ""}},
            "tiene_pdf": {}}}"#,
        n,
        n % 9 + 1,
        heading,
        n % 3 == 0
    )
}

fn config_in(dir: &Path) -> Config {
    Config {
        batch_size: 3,
        reconnect_every: 4,
        checkpoint_path: dir.join("checkpoint_tipos.json"),
        table_file: dir.join("tipos_desde_h2.csv"),
        examples_file: dir.join("ejemplos_h2_completos.json"),
        output_log_file: dir.join("output.txt"),
        retry_max_attempts: 2,
        retry_initial_backoff_ms: 0,
        retry_max_backoff_ms: 0,
        ..Config::default()
    }
}

#[test]
fn threshold_abort_keeps_checkpoint_and_resume_does_not_recount() {
    let dir = tempfile::tempdir().unwrap();
    let connector = MemoryConnector::new();
    connector.put("data/raw/m_01.json", measure(1, "DECRETO 1/2024"));
    connector.put("data/raw/m_02.json", measure(2, "DECRETO 2/2024"));
    connector.put("data/raw/m_03.json", "{roto");
    connector.put("data/raw/m_04.json", measure(4, "AVISO OFICIAL"));

    let config = Config {
        max_errors: Some(0),
        ..config_in(dir.path())
    };
    let err = BatchClassifier::new(config.clone(), Arc::new(connector.clone()))
        .run(false)
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<AppError>(),
        Some(AppError::ErrorThreshold { errors: 1, limit: 0 })
    ));

    let saved = Checkpoint::load(&config.checkpoint_path).unwrap();
    assert_eq!(saved.processed_count(), 2);
    assert!(saved.is_processed("m_01.json"));
    assert!(!saved.is_processed("m_03.json"));
    assert!(connector.get("tipos_desde_h2.csv").is_none());

    // 修好坏文件后续跑
    connector.put("data/raw/m_03.json", measure(3, "RESOLUCIÓN 3/2024"));
    let report = BatchClassifier::new(config_in(dir.path()), Arc::new(connector.clone()))
        .run(false)
        .unwrap();

    assert_eq!(report.listed, 4);
    assert_eq!(report.already_processed, 2);
    assert_eq!(report.processed, 2);
    assert_eq!(report.total_recorded, 4);
    let sum: u64 = report.rows.iter().map(|r| r.cantidad).sum();
    assert_eq!(sum, report.total_recorded);
    assert_eq!(report.rows[0].tipo, "DECRETO");
    assert_eq!(report.rows[0].cantidad, 2);
    assert!(!config.checkpoint_path.exists());
    assert!(connector.get("tipos_desde_h2.csv").is_some());
}

#[test]
fn fresh_run_ignores_existing_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    let connector = MemoryConnector::new();
    for n in 1..=3 {
        connector.put(&format!("data/raw/m_{}.json", n), measure(n, "DECRETO 9/2024"));
    }
    let config = config_in(dir.path());
    let mut stale = Checkpoint::default();
    stale.record(
        "m_1.json",
        "DECRETO",
        LabelExample {
            h2_completo: "DECRETO 9/2024".to_string(),
            fecha: "2024-03-02".to_string(),
            tiene_pdf: false,
        },
    );
    stale.save(&config.checkpoint_path).unwrap();

    let report = BatchClassifier::new(config, Arc::new(connector))
        .run(true)
        .unwrap();

    assert_eq!(report.already_processed, 0);
    assert_eq!(report.processed, 3);
    assert_eq!(report.total_recorded, 3);
}

#[test]
fn examples_are_capped_per_label() {
    let dir = tempfile::tempdir().unwrap();
    let connector = MemoryConnector::new();
    for n in 1..=8 {
        connector.put(
            &format!("data/raw/m_{}.json", n),
            measure(n, &format!("DISPOSICIÓN {}/2024", n)),
        );
    }
    let config = config_in(dir.path());

    let report = BatchClassifier::new(config.clone(), Arc::new(connector.clone()))
        .run(false)
        .unwrap();

    assert_eq!(report.rows.len(), 1);
    assert_eq!(report.rows[0].cantidad, 8);
    assert_eq!(report.rows[0].porcentaje, "100.00%");

    let examples: BTreeMap<String, Vec<LabelExample>> =
        serde_json::from_slice(&connector.get("ejemplos_h2_completos.json").unwrap()).unwrap();
    assert_eq!(examples["DISPOSICIÓN"].len(), 5);
    assert_eq!(examples["DISPOSICIÓN"][0].h2_completo, "DISPOSICIÓN 1/2024");
}

#[test]
fn reconnect_per_batch_opens_one_session_per_batch() {
    let dir = tempfile::tempdir().unwrap();
    let connector = MemoryConnector::new();
    seven_files(&connector);
    let config = Config {
        reconnect_every: 0,
        reconnect_per_batch: true,
        ..config_in(dir.path())
    };

    let report = BatchClassifier::new(config, Arc::new(connector.clone()))
        .run(false)
        .unwrap();

    // 3 批各一个会话，再加上传结果的一个
    assert_eq!(report.processed, 7);
    assert_eq!(connector.connects(), 3 + 1);

    // 不按批重连时整个批处理只用一个会话
    let single = MemoryConnector::new();
    seven_files(&single);
    let config = Config {
        reconnect_every: 0,
        ..config_in(dir.path())
    };
    BatchClassifier::new(config, Arc::new(single.clone()))
        .run(false)
        .unwrap();
    assert_eq!(single.connects(), 1 + 1);
}

#[test]
fn store_lost_between_batches_resumes_after_last_saved_batch() {
    let dir = tempfile::tempdir().unwrap();
    let connector = MemoryConnector::new();
    seven_files(&connector);
    let config = Config {
        reconnect_every: 0,
        reconnect_per_batch: true,
        ..config_in(dir.path())
    };

    let err = BatchClassifier::new(config.clone(), Arc::new(DropsAfter::new(&connector, 1)))
        .run(false)
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<StoreError>(),
        Some(StoreError::RetriesExhausted { attempts: 2, .. })
    ));

    let saved = Checkpoint::load(&config.checkpoint_path).unwrap();
    assert_eq!(saved.processed_count(), 3);
    assert!(saved.is_processed("m_1.json"));
    assert!(!saved.is_processed("m_4.json"));
    assert!(connector.get("tipos_desde_h2.csv").is_none());

    let report = BatchClassifier::new(config.clone(), Arc::new(connector.clone()))
        .run(false)
        .unwrap();

    assert_eq!(report.already_processed, 3);
    assert_eq!(report.processed, 4);
    assert_eq!(report.total_recorded, 7);
    assert_eq!(report.rows[0].cantidad, 7);
    assert!(!config.checkpoint_path.exists());
}

#[test]
fn store_lost_mid_batch_keeps_finished_files() {
    let dir = tempfile::tempdir().unwrap();
    let connector = MemoryConnector::new();
    seven_files(&connector);
    let config = Config {
        reconnect_every: 2,
        ..config_in(dir.path())
    };

    // 第 3 个文件前需要重连，此时服务器已不可达
    let err = BatchClassifier::new(config.clone(), Arc::new(DropsAfter::new(&connector, 1)))
        .run(false)
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<AppError>(),
        Some(AppError::Store(StoreError::RetriesExhausted { .. }))
    ));

    let saved = Checkpoint::load(&config.checkpoint_path).unwrap();
    assert_eq!(saved.processed_count(), 2);
    assert!(!saved.is_processed("m_3.json"));

    let report = BatchClassifier::new(config, Arc::new(connector.clone()))
        .run(false)
        .unwrap();

    assert_eq!(report.already_processed, 2);
    assert_eq!(report.processed, 5);
    assert_eq!(report.errors, 0);
    assert_eq!(report.total_recorded, 7);
}
