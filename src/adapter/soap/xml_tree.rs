use quick_xml::events::Event;
use quick_xml::Reader;
use serde_json::{Map, Value};

use super::EnvelopeError;

/// 混在テキストを格納するキー。
pub const TEXT_KEY: &str = "#text";

struct Frame {
    name: String,
    children: Map<String, Value>,
    text: String,
}

impl Frame {
    fn new(name: String) -> Self {
        Self {
            name,
            children: Map::new(),
            text: String::new(),
        }
    }

    fn into_value(self) -> (String, Value) {
        if self.children.is_empty() {
            return (self.name, Value::String(self.text));
        }
        let mut children = self.children;
        if !self.text.is_empty() {
            children.insert(TEXT_KEY.to_string(), Value::String(self.text));
        }
        (self.name, Value::Object(children))
    }
}

fn insert_child(children: &mut Map<String, Value>, name: String, value: Value) {
    match children.get_mut(&name) {
        Some(Value::Array(items)) => items.push(value),
        Some(existing) => {
            let first = existing.take();
            *existing = Value::Array(vec![first, value]);
        }
        None => {
            children.insert(name, value);
        }
    }
}

fn local_name(raw: &[u8]) -> Result<String, EnvelopeError> {
    std::str::from_utf8(raw)
        .map(str::to_string)
        .map_err(|e| EnvelopeError::Malformed(e.to_string()))
}

/// XML 文書を JSON 風のツリーに変換する。
///
/// 名前空間プレフィックスは除去し、属性は無視する。子要素を持たない要素は文字列、
/// 同名の兄弟要素は配列になる。最初のルート要素が閉じた時点で解析を終える。
pub fn parse(input: &str) -> Result<Value, EnvelopeError> {
    let mut reader = Reader::from_str(input);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Frame> = Vec::new();
    loop {
        let event = reader
            .read_event()
            .map_err(|e| EnvelopeError::Malformed(e.to_string()))?;
        let completed = match event {
            Event::Start(e) => {
                stack.push(Frame::new(local_name(e.local_name().as_ref())?));
                None
            }
            Event::Empty(e) => Some((
                local_name(e.local_name().as_ref())?,
                Value::String(String::new()),
            )),
            Event::End(_) => {
                let frame = stack
                    .pop()
                    .ok_or_else(|| EnvelopeError::Malformed("unexpected closing tag".to_string()))?;
                Some(frame.into_value())
            }
            Event::Text(t) => {
                let text = t
                    .unescape()
                    .map_err(|e| EnvelopeError::Malformed(e.to_string()))?;
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&text);
                }
                None
            }
            Event::CData(c) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                }
                None
            }
            Event::Eof => break,
            _ => None,
        };

        if let Some((name, value)) = completed {
            match stack.last_mut() {
                Some(parent) => insert_child(&mut parent.children, name, value),
                None => {
                    let mut root = Map::new();
                    root.insert(name, value);
                    return Ok(Value::Object(root));
                }
            }
        }
    }

    if stack.is_empty() {
        Err(EnvelopeError::Malformed("no root element".to_string()))
    } else {
        Err(EnvelopeError::Malformed("unclosed element".to_string()))
    }
}

/// ドット区切りのパスで値を辿る。
pub fn value_at<'a>(tree: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(tree, |node, key| node.get(key))
}
