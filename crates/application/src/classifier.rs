//! 内容敏感度分类器
//!
//! 纯函数：递归收集参数表中的字符串叶子，依次匹配邮箱、电话号码、
//! 钱包地址模式。命中即打标签并提升 PII 级别，级别只升不降。

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value as JsonValue;

use domain::{Content, PiiClass};

static EMAIL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)[A-Z0-9._%+-]+@[A-Z0-9.-]+\.[A-Z]{2,}").expect("valid regex"));

static PHONE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\+?\d[\d\s\-()]{8,}").expect("valid regex"));

static WALLET_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(0:)?[a-f0-9]{64}").expect("valid regex"));

/// 分类结果
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub tags: BTreeSet<String>,
    pub level: PiiClass,
}

/// 扫描消息内容，从 base_level 出发只向上提升敏感级别
pub fn classify(content: &Content, base_level: PiiClass) -> Classification {
    let mut strings = Vec::new();
    for value in content.args.values() {
        collect_strings(value, &mut strings);
    }

    let mut tags = BTreeSet::new();
    let mut level = base_level;

    for raw in strings {
        let value = raw.trim();
        if value.is_empty() {
            continue;
        }
        if EMAIL_PATTERN.is_match(value) {
            tags.insert("email".to_string());
            level = level.escalate(PiiClass::Personal);
        }
        if PHONE_PATTERN.is_match(value) {
            tags.insert("phone".to_string());
            level = level.escalate(PiiClass::Personal);
        }
        if WALLET_PATTERN.is_match(value) {
            tags.insert("wallet".to_string());
            level = level.escalate(PiiClass::Sensitive);
        }
    }

    Classification { tags, level }
}

fn collect_strings<'a>(value: &'a JsonValue, bucket: &mut Vec<&'a str>) {
    match value {
        JsonValue::String(entry) => bucket.push(entry),
        JsonValue::Array(entries) => {
            for entry in entries {
                collect_strings(entry, bucket);
            }
        }
        JsonValue::Object(map) => {
            for nested in map.values() {
                collect_strings(nested, bucket);
            }
        }
        _ => {}
    }
}
