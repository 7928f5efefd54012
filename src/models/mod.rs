pub mod analysis;
pub mod checkpoint;
pub mod measure;
pub mod summary;

pub use analysis::{BatchStats, BatchSummary, JustificationRatio, MeasureAnalysis, TextStats};
pub use checkpoint::Checkpoint;
pub use measure::{DocumentStructure, HtmlContent, Measure, PdfLink, Section};
pub use summary::{LabelExample, ScrapeStats, TypeRow, MAX_EXAMPLES_PER_LABEL};
