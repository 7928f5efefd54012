//! 页面元素识别 - 业务能力层
//!
//! 在公报页面中找出"可能有用"的元素，不预设分类：
//! - 形如 "Luis CAPUTO" 的人名（可能的签署人）
//! - 含有签署 / 任命类关键词的段落
//! - class 名像类型或分区的元素

use std::sync::LazyLock;

use phf::{phf_ordered_set, phf_set};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use crate::models::measure::{DetectedElement, RelevantClass};

// 名字首字母大写，姓氏全大写
static SIGNER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b[A-ZÁÉÍÓÚÑÜ][a-záéíóúñü]+(?:\s+[A-ZÁÉÍÓÚÑÜ][a-záéíóúñü]+)*\s+[A-ZÁÉÍÓÚÑÜ]{2,}(?:\s+[A-ZÁÉÍÓÚÑÜ]{2,})*\b",
    )
    .expect("signer regex")
});

static WITH_CLASS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("[class]").expect("class selector"));

/// 按顺序检查的权限关键词（小写，按子串匹配）
static AUTHORITY_KEYWORDS: phf::OrderedSet<&'static str> = phf_ordered_set! {
    "firmado",
    "firma",
    "suscribe",
    "autoriza",
    "designa",
    "nombra",
};

static CLASS_HINTS: phf::Set<&'static str> = phf_set! {
    "tipo",
    "category",
    "section",
    "document",
    "official",
};

/// 元素文本里保留的字符数
const CLASS_TEXT_CHARS: usize = 100;

/// 可能的签署人（按出现顺序）加上每个关键词命中的段落
pub fn detect_elements(document: &Html, page_text: &str) -> Vec<DetectedElement> {
    let mut elements: Vec<DetectedElement> = SIGNER_RE
        .find_iter(page_text)
        .map(|m| DetectedElement::possible_signer(m.as_str()))
        .collect();

    for keyword in AUTHORITY_KEYWORDS.iter() {
        for node in document.root_element().descendants() {
            let Some(text) = node.value().as_text() else {
                continue;
            };
            if !text.to_lowercase().contains(keyword) {
                continue;
            }
            let context = node
                .parent()
                .and_then(ElementRef::wrap)
                .map(|parent| joined_text(&parent))
                .unwrap_or_else(|| text.trim().to_string());
            elements.push(DetectedElement::authority_context(context, keyword));
        }
    }

    elements
}

/// class 名中含有类型 / 分区提示词的元素，每个命中的 class 一条
pub fn relevant_classes(document: &Html) -> Vec<RelevantClass> {
    let mut found = Vec::new();
    for element in document.select(&WITH_CLASS) {
        for class in element.value().classes() {
            let lower = class.to_lowercase();
            if !CLASS_HINTS.iter().any(|hint| lower.contains(hint)) {
                continue;
            }
            found.push(RelevantClass {
                clase: class.to_string(),
                texto: joined_text(&element).chars().take(CLASS_TEXT_CHARS).collect(),
                tag: element.value().name().to_string(),
            });
        }
    }
    found
}

/// 各文本节点去掉首尾空白后直接拼接
fn joined_text(element: &ElementRef<'_>) -> String {
    element.text().map(str::trim).collect()
}
