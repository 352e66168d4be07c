//! YAML frontmatter parsing and rendering
//!
//! A record file carries its fields as YAML frontmatter delimited by `---`:
//!
//! ```markdown
//! ---
//! author: Harper Lee
//! genre: Fiction
//! in_stock: true
//! price: 12.99
//! published_year: 1960
//! title: To Kill a Mockingbird
//! ---
//! ```

use super::document::{Fields, Value};
use crate::error::{Error, Result};

/// Parse YAML frontmatter from markdown content
pub fn parse(content: &str) -> Result<(Fields, String)> {
    let content = content.trim_start();

    if !content.starts_with("---") {
        return Ok((Fields::new(), content.to_string()));
    }

    let rest = &content[3..];
    let end_pos = rest.find("\n---").ok_or_else(|| Error::YamlParseError {
        message: "unclosed frontmatter: missing closing ---".to_string(),
    })?;

    let yaml_content = rest[..end_pos].trim();
    let body = rest[end_pos + 4..].trim_start_matches('\n').to_string();

    if yaml_content.is_empty() {
        return Ok((Fields::new(), body));
    }

    let yaml_value: serde_yaml::Value = serde_yaml::from_str(yaml_content)?;
    let fields = yaml_to_fields(yaml_value)?;

    Ok((fields, body))
}

fn yaml_to_fields(value: serde_yaml::Value) -> Result<Fields> {
    match value {
        serde_yaml::Value::Mapping(map) => {
            let mut fields = Fields::new();
            for (k, v) in map {
                let key = k
                    .as_str()
                    .ok_or_else(|| Error::YamlParseError {
                        message: "non-string key in frontmatter".to_string(),
                    })?
                    .to_string();
                fields.insert(key, yaml_value_to_value(v));
            }
            Ok(fields)
        }
        serde_yaml::Value::Null => Ok(Fields::new()),
        _ => Err(Error::YamlParseError {
            message: "frontmatter must be a YAML mapping".to_string(),
        }),
    }
}

fn yaml_value_to_value(v: serde_yaml::Value) -> Value {
    match v {
        serde_yaml::Value::Null => Value::Null,
        serde_yaml::Value::Bool(b) => Value::Bool(b),
        serde_yaml::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else if let Some(f) = n.as_f64() {
                Value::Float(f)
            } else {
                Value::Null
            }
        }
        serde_yaml::Value::String(s) => Value::String(s),
        serde_yaml::Value::Sequence(seq) => {
            Value::Array(seq.into_iter().map(yaml_value_to_value).collect())
        }
        serde_yaml::Value::Mapping(map) => Value::Object(
            map.into_iter()
                .filter_map(|(k, v)| k.as_str().map(|key| (key.to_string(), yaml_value_to_value(v))))
                .collect(),
        ),
        serde_yaml::Value::Tagged(tagged) => yaml_value_to_value(tagged.value),
    }
}

fn value_to_yaml(v: &Value) -> serde_yaml::Value {
    match v {
        Value::Null => serde_yaml::Value::Null,
        Value::Bool(b) => serde_yaml::Value::Bool(*b),
        Value::Int(i) => serde_yaml::Value::Number((*i).into()),
        Value::Float(f) => serde_yaml::Value::Number(serde_yaml::Number::from(*f)),
        Value::String(s) => serde_yaml::Value::String(s.clone()),
        Value::Array(arr) => serde_yaml::Value::Sequence(arr.iter().map(value_to_yaml).collect()),
        Value::Object(obj) => serde_yaml::Value::Mapping(
            obj.iter()
                .map(|(k, v)| (serde_yaml::Value::String(k.clone()), value_to_yaml(v)))
                .collect(),
        ),
    }
}

/// Render fields and body back to markdown with frontmatter
pub fn render(fields: &Fields, body: &str) -> Result<String> {
    if fields.is_empty() {
        return Ok(body.to_string());
    }

    let yaml_map: serde_yaml::Mapping = fields
        .iter()
        .map(|(k, v)| (serde_yaml::Value::String(k.clone()), value_to_yaml(v)))
        .collect();

    let yaml_str = serde_yaml::to_string(&serde_yaml::Value::Mapping(yaml_map)).map_err(|e| {
        Error::YamlSerializeError {
            message: e.to_string(),
        }
    })?;

    if body.is_empty() {
        Ok(format!("---\n{}---\n", yaml_str))
    } else {
        Ok(format!("---\n{}---\n\n{}", yaml_str, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_book_frontmatter() {
        let content = r#"---
title: The Hobbit
author: J.R.R. Tolkien
published_year: 1937
price: 14.99
in_stock: true
---
"#;

        let (fields, body) = parse(content).unwrap();

        assert_eq!(fields.get("title"), Some(&Value::String("The Hobbit".into())));
        assert_eq!(fields.get("published_year"), Some(&Value::Int(1937)));
        assert_eq!(fields.get("price"), Some(&Value::Float(14.99)));
        assert_eq!(fields.get("in_stock"), Some(&Value::Bool(true)));
        assert!(body.trim().is_empty());
    }

    #[test]
    fn test_no_frontmatter() {
        let (fields, body) = parse("Loose notes without fields.").unwrap();
        assert!(fields.is_empty());
        assert!(body.contains("Loose notes"));
    }

    #[test]
    fn test_unclosed_frontmatter() {
        assert!(parse("---\ntitle: x\n").is_err());
    }

    #[test]
    fn test_render_roundtrip() {
        let mut fields = Fields::new();
        fields.insert("title".into(), Value::String("Moby Dick".into()));
        fields.insert("price".into(), Value::Float(12.5));
        fields.insert("published_year".into(), Value::Int(1851));

        let rendered = render(&fields, "").unwrap();
        assert!(rendered.starts_with("---\n"));
        let (parsed_fields, _) = parse(&rendered).unwrap();
        assert_eq!(parsed_fields, fields);
    }
}
