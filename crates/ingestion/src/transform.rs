//! Content transform pipeline.
//!
//! Each file carries an ordered list of [`TransformSpec`]s. They are applied
//! left to right, the output of one feeding the next, and the file's content
//! is replaced by the final output.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::{FileChange, IngestError, TransformSpec};

/// Plain scalars a YAML 1.1 reader resolves to something other than a string:
/// booleans, nulls, integers (octal, hex, binary, sexagesimal), floats, and
/// timestamps.
static YAML11_NON_STRING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"^(?:",
        r"y|Y|yes|Yes|YES|n|N|no|No|NO|true|True|TRUE|false|False|FALSE|on|On|ON|off|Off|OFF",
        r"|~|null|Null|NULL|=",
        r"|[-+]?0b[01_]+|[-+]?0[0-7_]+|[-+]?(?:0|[1-9][0-9_]*)|[-+]?0x[0-9a-fA-F_]+",
        r"|[-+]?[1-9][0-9_]*(?::[0-5]?[0-9])+",
        r"|[-+]?[0-9][0-9_]*\.[0-9_]*(?:[eE][-+]?[0-9]+)?|[-+]?\.[0-9_]+(?:[eE][-+]?[0-9]+)?",
        r"|[-+]?[0-9][0-9_]*(?::[0-5]?[0-9])+\.[0-9_]*",
        r"|[-+]?\.(?:inf|Inf|INF)|\.(?:nan|NaN|NAN)",
        r"|[0-9]{4}-[0-9]{1,2}-[0-9]{1,2}",
        r"(?:(?:[Tt]|[ \t]+)[0-9]{1,2}:[0-9]{2}:[0-9]{2}(?:\.[0-9]*)?",
        r"(?:[ \t]*(?:Z|[-+][0-9]{1,2}(?::[0-9]{2})?))?)?",
        r")$"
    ))
    .expect("YAML 1.1 scalar pattern is valid")
});

/// Strings that must be quoted for YAML 1.1 readers are swapped for numeric
/// placeholders, which the emitter always quotes, and restored afterwards.
struct QuotedStrings {
    prefix: String,
    strings: Vec<String>,
}

impl QuotedStrings {
    /// Picks a placeholder prefix that occurs in none of `seen`.
    fn new(seen: &BTreeSet<&str>) -> Self {
        let mut base: u64 = 7_340_291_056_118;
        while seen.iter().any(|s| s.contains(&base.to_string())) {
            base += 1;
        }
        Self {
            prefix: base.to_string(),
            strings: Vec::new(),
        }
    }

    fn scalar(&mut self, value: &str) -> serde_yaml::Value {
        if !YAML11_NON_STRING.is_match(value) {
            return serde_yaml::Value::String(value.to_string());
        }
        let placeholder = format!("{}{:06}", self.prefix, self.strings.len());
        self.strings.push(value.to_string());
        serde_yaml::Value::String(placeholder)
    }

    fn restore(&self, mut yaml: String) -> String {
        for (index, original) in self.strings.iter().enumerate() {
            let placeholder = format!("'{}{index:06}'", self.prefix);
            yaml = yaml.replace(&placeholder, &format!("'{}'", original.replace('\'', "''")));
        }
        yaml
    }
}

fn collect_strings<'a>(value: &'a serde_json::Value, out: &mut BTreeSet<&'a str>) {
    match value {
        serde_json::Value::String(s) => {
            out.insert(s);
        }
        serde_json::Value::Array(items) => items.iter().for_each(|item| collect_strings(item, out)),
        serde_json::Value::Object(map) => {
            for (key, item) in map {
                out.insert(key);
                collect_strings(item, out);
            }
        }
        _ => {}
    }
}

/// Converts a JSON number without losing precision.
fn yaml_number(number: &serde_json::Number) -> Result<serde_yaml::Value, String> {
    if let Some(i) = number.as_i64() {
        return Ok(serde_yaml::Value::Number(i.into()));
    }
    if let Some(u) = number.as_u64() {
        return Ok(serde_yaml::Value::Number(u.into()));
    }
    let literal = number.to_string();
    if !literal.contains(['.', 'e', 'E']) {
        return Err(format!("integer {literal} does not fit in 64 bits"));
    }
    match number.as_f64() {
        Some(f) if f.is_finite() => Ok(serde_yaml::Value::Number(f.into())),
        _ => Err(format!("number {literal} is out of range")),
    }
}

fn yaml_value(
    value: &serde_json::Value,
    quoted: &mut QuotedStrings,
) -> Result<serde_yaml::Value, String> {
    Ok(match value {
        serde_json::Value::Null => serde_yaml::Value::Null,
        serde_json::Value::Bool(b) => serde_yaml::Value::Bool(*b),
        serde_json::Value::Number(n) => yaml_number(n)?,
        serde_json::Value::String(s) => quoted.scalar(s),
        serde_json::Value::Array(items) => serde_yaml::Value::Sequence(
            items
                .iter()
                .map(|item| yaml_value(item, quoted))
                .collect::<Result<_, _>>()?,
        ),
        serde_json::Value::Object(map) => {
            let mut mapping = serde_yaml::Mapping::with_capacity(map.len());
            for (key, item) in map {
                let key = quoted.scalar(key);
                mapping.insert(key, yaml_value(item, quoted)?);
            }
            serde_yaml::Value::Mapping(mapping)
        }
    })
}

/// Parses `content` as JSON and re-emits it as YAML.
///
/// Keys come out sorted. Long scalars are never folded across lines. Strings a
/// YAML 1.1 reader would take for a boolean, number, null, or date are
/// single-quoted. Integers outside the 64-bit range are rejected rather than
/// rounded.
pub fn json_to_yaml(content: &str) -> Result<String, String> {
    let value: serde_json::Value = serde_json::from_str(content).map_err(|e| e.to_string())?;

    let mut seen = BTreeSet::new();
    collect_strings(&value, &mut seen);
    let mut quoted = QuotedStrings::new(&seen);

    let yaml = yaml_value(&value, &mut quoted)?;
    let emitted = serde_yaml::to_string(&yaml).map_err(|e| e.to_string())?;
    Ok(quoted.restore(emitted))
}

/// Parses `content` as a single YAML document and re-emits it as compact JSON.
///
/// Parsing is data-only; tags never instantiate anything. Merge keys
/// (`<<: *anchor`) are resolved.
pub fn yaml_to_json(content: &str) -> Result<String, String> {
    let mut value: serde_yaml::Value = serde_yaml::from_str(content).map_err(|e| e.to_string())?;
    value.apply_merge().map_err(|e| e.to_string())?;
    let json = serde_json::to_value(&value).map_err(|e| e.to_string())?;
    serde_json::to_string(&json).map_err(|e| e.to_string())
}

/// Runs `file`'s transforms and returns the output without modifying `file`.
///
/// # Errors
///
/// - [`IngestError::UnsupportedTransform`] for a name outside the known set.
/// - [`IngestError::MalformedInput`] when a step cannot parse its input.
pub fn apply_transforms(file: &FileChange) -> Result<String, IngestError> {
    let mut content = file.content.clone();
    for spec in &file.transforms {
        let step = match spec {
            TransformSpec::JsonToYaml => json_to_yaml,
            TransformSpec::YamlToJson => yaml_to_json,
            TransformSpec::Unrecognized(name) => {
                return Err(IngestError::UnsupportedTransform {
                    path: file.path.clone(),
                    name: name.clone(),
                })
            }
        };
        content = step(&content).map_err(|reason| IngestError::MalformedInput {
            path: file.path.clone(),
            transform: spec.name().to_string(),
            reason,
        })?;
    }
    Ok(content)
}

/// Transforms every file in place.
///
/// Every file is attempted even after an earlier one fails, so the log shows
/// all problems in a payload; files that failed keep their original content.
///
/// # Errors
///
/// Returns the first failure in request order.
pub fn transform_files(files: &mut [FileChange]) -> Result<(), IngestError> {
    let mut first_error = None;
    for file in files.iter_mut() {
        if file.transforms.is_empty() {
            continue;
        }
        match apply_transforms(file) {
            Ok(content) => {
                tracing::debug!(path = %file.path, steps = file.transforms.len(), "Transformed file");
                file.content = content;
            }
            Err(error) => {
                tracing::warn!(path = %file.path, %error, "Transform failed");
                first_error.get_or_insert(error);
            }
        }
    }
    first_error.map_or(Ok(()), Err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FilePath;
    use serde_json::{json, Value};

    fn file(content: &str, transforms: Vec<TransformSpec>) -> FileChange {
        FileChange {
            path: FilePath::new("config/data.yml").unwrap(),
            content: content.to_string(),
            transforms,
        }
    }

    #[test]
    fn json_to_yaml_emits_mapping() {
        let yaml = json_to_yaml(r#"{"name": "alice", "groups": ["a", "b"]}"#).unwrap();
        assert_eq!(yaml, "groups:\n- a\n- b\nname: alice\n");
    }

    #[test]
    fn json_to_yaml_does_not_wrap_long_scalars() {
        let long = "word ".repeat(2_000).trim_end().to_string();
        let yaml = json_to_yaml(&json!({ "text": long }).to_string()).unwrap();
        assert!(
            yaml.lines().any(|line| line.contains(&long)),
            "long scalar was folded"
        );
    }

    #[test]
    fn yaml_to_json_is_compact() {
        let out = yaml_to_json("a: 1\nb:\n  - x\n").unwrap();
        assert_eq!(out, r#"{"a":1,"b":["x"]}"#);
    }

    #[test]
    fn round_trip_preserves_document() {
        let long = "x".repeat(10_000);
        let original = json!({
            "nested": {"list": [1, 2, {"deep": true}], "empty": {}},
            "long": long,
            "unicode": "héllo ✓",
        });
        let yaml = json_to_yaml(&original.to_string()).unwrap();
        let back: Value = serde_json::from_str(&yaml_to_json(&yaml).unwrap()).unwrap();
        assert_eq!(back, original);
    }

    #[test]
    fn integers_beyond_64_bits_are_rejected_not_rounded() {
        let err = json_to_yaml(r#"{"id": 123456789012345678901234567890}"#).unwrap_err();
        assert!(err.contains("123456789012345678901234567890"), "{err}");
        assert!(json_to_yaml(r#"{"n": 18446744073709551616}"#).is_err());
        assert!(json_to_yaml(r#"{"n": -9223372036854775809}"#).is_err());
    }

    #[test]
    fn oversized_integer_fails_the_pipeline_as_malformed_input() {
        let f = file(r#"{"n": 18446744073709551616}"#, vec![TransformSpec::JsonToYaml]);
        assert!(matches!(
            apply_transforms(&f),
            Err(IngestError::MalformedInput { .. })
        ));
    }

    #[test]
    fn integers_at_the_64_bit_bounds_round_trip_exactly() {
        let original = r#"{"max":18446744073709551615,"min":-9223372036854775808}"#;
        let yaml = json_to_yaml(original).unwrap();
        assert_eq!(yaml, "max: 18446744073709551615\nmin: -9223372036854775808\n");
        assert_eq!(yaml_to_json(&yaml).unwrap(), original);
    }

    #[test]
    fn floats_still_convert() {
        let yaml = json_to_yaml(r#"{"ratio": 0.25, "big": 1e3}"#).unwrap();
        assert_eq!(yaml_to_json(&yaml).unwrap(), r#"{"big":1000.0,"ratio":0.25}"#);
    }

    #[test]
    fn strings_yaml_1_1_would_retype_are_quoted() {
        let yaml = json_to_yaml(
            r#"{"a": "yes", "b": "off", "d": "2024-01-01", "o": "0755", "s": "1:30", "plain": "alice"}"#,
        )
        .unwrap();
        assert_eq!(
            yaml,
            "a: 'yes'\nb: 'off'\nd: '2024-01-01'\no: '0755'\nplain: alice\ns: '1:30'\n"
        );
        let back: Value = serde_json::from_str(&yaml_to_json(&yaml).unwrap()).unwrap();
        assert_eq!(back["a"], "yes");
        assert_eq!(back["d"], "2024-01-01");
    }

    #[test]
    fn ambiguous_keys_and_quotes_inside_values_are_quoted() {
        let yaml = json_to_yaml(r#"{"on": ["no", "it's"]}"#).unwrap();
        let back: Value = serde_json::from_str(&yaml_to_json(&yaml).unwrap()).unwrap();
        assert_eq!(back, json!({"on": ["no", "it's"]}));
        assert!(yaml.starts_with("'on':"), "{yaml}");
        assert!(yaml.contains("- 'no'"), "{yaml}");
    }

    #[test]
    fn yaml_merge_keys_are_resolved() {
        let out = yaml_to_json("base: &b {x: 1}\nd:\n  <<: *b\n  y: 2\n").unwrap();
        assert_eq!(out, r#"{"base":{"x":1},"d":{"x":1,"y":2}}"#);
    }

    #[test]
    fn explicit_keys_override_merged_ones() {
        let out = yaml_to_json("base: &b {x: 1, y: 1}\nd:\n  <<: *b\n  y: 2\n").unwrap();
        assert_eq!(out, r#"{"base":{"x":1,"y":1},"d":{"x":1,"y":2}}"#);
    }

    #[test]
    fn transforms_thread_left_to_right() {
        let f = file(
            r#"{"k": "v"}"#,
            vec![TransformSpec::JsonToYaml, TransformSpec::YamlToJson],
        );
        assert_eq!(apply_transforms(&f).unwrap(), r#"{"k":"v"}"#);
    }

    #[test]
    fn invalid_json_is_malformed_input() {
        let f = file("{not json", vec![TransformSpec::JsonToYaml]);
        let err = apply_transforms(&f).unwrap_err();
        assert!(
            matches!(err, IngestError::MalformedInput { ref transform, .. } if transform == "json2yaml"),
            "{err:?}"
        );
    }

    #[test]
    fn invalid_yaml_is_malformed_input() {
        let f = file("a: [unclosed", vec![TransformSpec::YamlToJson]);
        assert!(matches!(
            apply_transforms(&f),
            Err(IngestError::MalformedInput { .. })
        ));
    }

    #[test]
    fn multi_document_yaml_is_rejected() {
        let f = file("a: 1\n---\nb: 2\n", vec![TransformSpec::YamlToJson]);
        assert!(matches!(
            apply_transforms(&f),
            Err(IngestError::MalformedInput { .. })
        ));
    }

    #[test]
    fn unknown_transform_is_fatal() {
        let f = file(
            "{}",
            vec![TransformSpec::Unrecognized("toml2ini".to_string())],
        );
        assert!(matches!(
            apply_transforms(&f),
            Err(IngestError::UnsupportedTransform { ref name, .. }) if name == "toml2ini"
        ));
    }

    #[test]
    fn transform_files_replaces_content_and_reports_first_failure() {
        let mut files = vec![
            file(r#"{"a": 1}"#, vec![TransformSpec::JsonToYaml]),
            file("{broken", vec![TransformSpec::JsonToYaml]),
            file(r#"{"b": 2}"#, vec![TransformSpec::JsonToYaml]),
        ];
        let err = transform_files(&mut files).unwrap_err();
        assert!(matches!(err, IngestError::MalformedInput { .. }));
        assert_eq!(files[0].content, "a: 1\n");
        assert_eq!(files[1].content, "{broken");
        assert_eq!(files[2].content, "b: 2\n");
    }

    #[test]
    fn files_without_transforms_are_untouched() {
        let mut files = vec![file("raw text", Vec::new())];
        transform_files(&mut files).unwrap();
        assert_eq!(files[0].content, "raw text");
    }
}
