//! ERP から受信する SOAP エンベロープの解析。
//!
//! `pPara` パラメータは XML 文字列、または base64 で包まれた XML として届き、
//! 値の内側にさらに base64 の XML が入れ子になっていることがある。

pub mod xml_tree;

use std::collections::BTreeMap;
use std::sync::LazyLock;

use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use base64::Engine as _;
use regex::Regex;
use serde_json::Value;

/// pPara を探索するパス（先に一致したものを使う）。
const PARAMETER_PATHS: [&str; 2] = [
    "Envelope.Body.invokeSrv.pPara",
    "Envelope.Body.InvokeSrv.pPara",
];

/// この長さを超える文字列値は base64 の入れ子として展開を試みる。
const NESTED_VALUE_MIN_LEN: usize = 20;

const MAX_NESTING_DEPTH: usize = 8;

static DOC_TYPE_PATTERNS: LazyLock<Vec<Regex>> =
    LazyLock::new(|| compile(&[r"TA001\s*=\s*'([^']*)'", r"COPTC\.TC001\s*=\s*'([^']*)'"]));

static DOC_NUM_PATTERNS: LazyLock<Vec<Regex>> =
    LazyLock::new(|| compile(&[r"TA002\s*=\s*'([^']*)'", r"COPTC\.TC002\s*=\s*'([^']*)'"]));

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns.iter().filter_map(|p| Regex::new(p).ok()).collect()
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnvelopeError {
    #[error("malformed xml: {0}")]
    Malformed(String),

    #[error("pPara parameter is empty")]
    MissingParameter,

    #[error("document number not found in where clause")]
    MissingDocNum,
}

/// ExtractedDocument はエンベロープから取り出した伝票情報。
/// doc_num 以外の項目はベストエフォートで、空文字列の場合がある。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedDocument {
    pub company_id: String,
    pub form_id: String,
    pub operation_code: String,
    pub user_id: String,
    pub doc_type: String,
    pub doc_num: String,
    /// 発見したすべてのキーと値（同じキーは後勝ち）。
    pub fields: BTreeMap<String, String>,
}

impl ExtractedDocument {
    /// ステージングレコードとインスタンスに保存するペイロード。
    pub fn payload(&self) -> Value {
        Value::Object(
            self.fields
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect(),
        )
    }
}

/// 受信した SOAP エンベロープから伝票情報を抽出する。
pub fn extract(raw: &[u8]) -> Result<ExtractedDocument, EnvelopeError> {
    let text = String::from_utf8_lossy(raw);
    let envelope = xml_tree::parse(&text)?;

    let parameter = PARAMETER_PATHS
        .iter()
        .find_map(|path| {
            xml_tree::value_at(&envelope, path).filter(|v| !is_blank(v))
        })
        .ok_or(EnvelopeError::MissingParameter)?;

    let mut fields = BTreeMap::new();
    match parameter {
        Value::Object(map) => match map.get(xml_tree::TEXT_KEY) {
            Some(Value::String(content)) => scan_content(content, &mut fields),
            _ => walk(parameter, &mut fields, 0),
        },
        Value::String(content) => scan_content(content, &mut fields),
        other => walk(other, &mut fields, 0),
    }

    let field = |key: &str| fields.get(key).cloned().unwrap_or_default();
    let (doc_type, doc_num) = parse_where_clause(&field("WhereClause"));
    if doc_num.is_empty() {
        return Err(EnvelopeError::MissingDocNum);
    }

    Ok(ExtractedDocument {
        company_id: field("CompanyId"),
        form_id: field("FormId"),
        operation_code: field("ComPRID"),
        user_id: field("UserId"),
        doc_type,
        doc_num,
        fields,
    })
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::String(s) => s.trim().is_empty(),
        Value::Null => true,
        _ => false,
    }
}

fn scan_content(content: &str, fields: &mut BTreeMap<String, String>) {
    match xml_tree::parse(content) {
        Ok(tree) => walk(&tree, fields, 0),
        Err(_) => {
            if let Some(tree) = unwrap_encoded(content) {
                walk(&tree, fields, 1);
            }
        }
    }
}

fn walk(value: &Value, fields: &mut BTreeMap<String, String>, depth: usize) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                visit(key, child, fields, depth);
            }
        }
        Value::Array(items) => {
            for item in items {
                walk(item, fields, depth);
            }
        }
        _ => {}
    }
}

fn visit(key: &str, value: &Value, fields: &mut BTreeMap<String, String>, depth: usize) {
    match value {
        Value::String(s) => {
            if key != xml_tree::TEXT_KEY {
                fields.insert(key.to_string(), s.clone());
            }
            if s.len() > NESTED_VALUE_MIN_LEN && depth < MAX_NESTING_DEPTH {
                if let Some(nested) = unwrap_encoded(s) {
                    walk(&nested, fields, depth + 1);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                visit(key, item, fields, depth);
            }
        }
        other => walk(other, fields, depth),
    }
}

/// base64 で包まれた XML を取り出す。
fn unwrap_encoded(content: &str) -> Option<Value> {
    let cleaned = content.replace("]]>", "");
    let cleaned = cleaned.trim();
    let token = if cleaned.contains(' ') {
        longest_token(cleaned)
    } else {
        cleaned
    };

    let bytes = STANDARD
        .decode(token)
        .or_else(|_| URL_SAFE.decode(token))
        .ok()?;
    let decoded = String::from_utf8_lossy(&bytes);
    let start = decoded.find('<')?;
    let end = decoded.rfind('>')?;
    if end <= start {
        return None;
    }
    xml_tree::parse(&decoded[start..=end]).ok()
}

fn longest_token(s: &str) -> &str {
    s.split_whitespace()
        .fold("", |longest, t| if t.len() > longest.len() { t } else { longest })
}

/// WhereClause の SQL 条件から (doc_type, doc_num) を取り出す。
pub fn parse_where_clause(clause: &str) -> (String, String) {
    (first_capture(&DOC_TYPE_PATTERNS, clause), first_capture(&DOC_NUM_PATTERNS, clause))
}

fn first_capture(patterns: &[Regex], haystack: &str) -> String {
    patterns
        .iter()
        .find_map(|re| re.captures(haystack))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}
