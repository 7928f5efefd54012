//! 标签提取 - 业务能力层
//!
//! 从公报标题的 HTML 片段中提取类型标签，例如
//! `<h2>RESOLUCIÓN N° 45/2024</h2>` → `RESOLUCIÓN`。
//! 纯函数，不做任何 I/O。HTML 交给 `scraper` 解析，
//! 未闭合的标签和命名实体都按浏览器的方式处理。

use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};

/// 没有标题或提取结果为空时返回的标签
pub const SIN_H2: &str = "SIN_H2";

static HEADING: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("h2").expect("heading selector"));

// 类型名后面紧跟编号："RESOLUCIÓN N° 45/2024"、"DECRETO 12/2024"
static LABEL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-zÁÉÍÓÚÜáéíóúüñÑ\s]+?)(?:\s+N[°º]?\.?\s*\d|\s+\d)").expect("label regex")
});

static TRAILING_NUMBER_SIGN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+N[°º]?\.?\s*$").expect("number sign regex"));

/// 第一个 `<h2>` 的纯文本（实体已解码，空白已合并）
pub fn heading_text(html: &str) -> Option<String> {
    let fragment = Html::parse_fragment(html);
    let heading = fragment.select(&HEADING).next()?;
    let text: String = heading.text().collect();
    Some(text.split_whitespace().collect::<Vec<_>>().join(" "))
}

/// 提取类型标签；没有标题或结果为空时返回 [`SIN_H2`]
pub fn extract_label(html: &str) -> String {
    heading_text(html)
        .map(|text| label_from_heading(&text))
        .filter(|label| !label.is_empty())
        .unwrap_or_else(|| SIN_H2.to_string())
}

/// 从标题文本中去掉编号和日期部分
pub fn label_from_heading(text: &str) -> String {
    if let Some(caps) = LABEL_RE.captures(text) {
        return caps[1].trim().to_string();
    }

    // 兜底：取第一个数字之前的部分
    let head = match text.find(|c: char| c.is_ascii_digit()) {
        Some(idx) => &text[..idx],
        None => text,
    };
    TRAILING_NUMBER_SIGN_RE.replace(head, "").trim().to_string()
}
