pub mod label_extractor;
pub mod llm_service;
pub mod page_elements;
pub mod result_emitter;
pub mod scrape_service;

pub use label_extractor::{extract_label, heading_text, SIN_H2};
pub use llm_service::{ask_json, parse_json_reply, ChatModel, LlmService};
pub use page_elements::{detect_elements, relevant_classes};
pub use result_emitter::ResultEmitter;
pub use scrape_service::ScrapeService;
