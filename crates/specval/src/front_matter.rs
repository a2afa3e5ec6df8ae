use std::collections::BTreeMap;

use crate::error::SpecvalError;

/// Borrowed slices of a document split into front matter YAML and body.
pub struct FrontMatterSplit<'a> {
    pub yaml: &'a str,
    pub body: &'a str,
}

/// Splits raw markdown into YAML front matter and body, if the document opens with `---`.
pub fn split_front_matter(content: &str) -> Option<FrontMatterSplit<'_>> {
    let stripped = content.trim_start_matches('\u{feff}');
    let rest = stripped.strip_prefix("---")?;
    let rest = rest
        .strip_prefix("\r\n")
        .or_else(|| rest.strip_prefix('\n'))?;

    let idx = rest.find("\n---")?;
    let yaml = rest[..idx].trim_end();
    let after = &rest[idx + 4..]; // skip `\n---`
    let body = after
        .strip_prefix('\n')
        .or_else(|| after.strip_prefix("\r\n"))
        .unwrap_or(after);
    Some(FrontMatterSplit { yaml, body })
}

/// Number of source lines occupied by the front matter block, delimiters included.
pub fn front_matter_line_count(content: &str) -> usize {
    match split_front_matter(content) {
        Some(split) => {
            let consumed = content.len() - split.body.len();
            content[..consumed].lines().count()
        }
        None => 0,
    }
}

/// Flattens scalar front matter entries into string metadata.
///
/// Sequences and mappings are skipped; only top-level scalars are metadata.
pub fn front_matter_metadata(yaml: &str) -> Result<BTreeMap<String, String>, SpecvalError> {
    let mut out = BTreeMap::new();
    if yaml.trim().is_empty() {
        return Ok(out);
    }

    let value: serde_yaml::Value = serde_yaml::from_str(yaml)
        .map_err(|err| SpecvalError::Serialization(format!("front matter: {err}")))?;
    let serde_yaml::Value::Mapping(mapping) = value else {
        return Err(SpecvalError::Serialization(
            "front matter must be a mapping".into(),
        ));
    };

    for (key, value) in mapping {
        let Some(key) = scalar_to_string(&key) else {
            continue;
        };
        if let Some(value) = scalar_to_string(&value) {
            out.insert(key, value);
        }
    }
    Ok(out)
}

fn scalar_to_string(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_handles_bom_and_crlf() {
        let doc = "\u{feff}---\r\nid: REQ-001\r\n---\r\n# Title\r\n";
        let split = split_front_matter(doc).expect("front matter");
        assert_eq!(split.yaml.trim(), "id: REQ-001");
        assert!(split.body.contains("# Title"));
    }

    #[test]
    fn missing_front_matter_is_none() {
        assert!(split_front_matter("# Title\n").is_none());
        assert_eq!(front_matter_line_count("# Title\n"), 0);
    }

    #[test]
    fn counts_front_matter_lines() {
        let doc = "---\nid: REQ-001\nstatus: draft\n---\n# Title\n";
        assert_eq!(front_matter_line_count(doc), 4);
    }

    #[test]
    fn metadata_keeps_scalars_only() {
        let meta = front_matter_metadata("id: REQ-001\npriority: 2\ntags: [a, b]\n").unwrap();
        assert_eq!(meta.get("id").map(String::as_str), Some("REQ-001"));
        assert_eq!(meta.get("priority").map(String::as_str), Some("2"));
        assert!(!meta.contains_key("tags"));
    }
}
