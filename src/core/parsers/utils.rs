use std::{fs, path::Path};

use hashlink::LinkedHashMap;
use saphyr::{LoadableYamlNode, ScalarOwned, YamlOwned};

use crate::core::parsers::ParserError;

/// Helper macro to create WrongType ParserError
macro_rules! wrong_type_err {
  ($value:expr, $expected:expr) => {
    ParserError::WrongType(format!("{:?}", $value), $expected.to_string())
  };
}
pub(crate) use wrong_type_err;

pub fn value_from_str(s: &str) -> YamlOwned {
  YamlOwned::Value(ScalarOwned::String(s.to_string()))
}

pub fn yaml_lookup<'a>(node: &'a YamlOwned, key: &str) -> Option<&'a YamlOwned> {
  if let YamlOwned::Mapping(map) = node {
    return map.get(&value_from_str(key));
  }
  None
}

/// Render a scalar node as text. Numbers and booleans are accepted so that
/// `memory: 8` or `values: [1, 2]` need no quoting.
pub fn scalar_to_string(yaml: &YamlOwned) -> Result<String, ParserError> {
  match yaml {
    YamlOwned::Value(ScalarOwned::String(s)) => Ok(s.to_string()),
    YamlOwned::Value(ScalarOwned::Integer(i)) => Ok(i.to_string()),
    YamlOwned::Value(ScalarOwned::FloatingPoint(f)) => Ok((**f).to_string()),
    YamlOwned::Value(ScalarOwned::Boolean(b)) => Ok(b.to_string()),
    _ => Err(wrong_type_err!(yaml, "scalar")),
  }
}

pub fn lookup_str(yaml: &YamlOwned, key: &str) -> Result<String, ParserError> {
  match yaml_lookup(yaml, key) {
    Some(y) => scalar_to_string(y),
    None => Err(ParserError::MissingKey(key.to_string())),
  }
}

/// Like [`lookup_str`], but a missing key is not an error
pub fn lookup_optional_str(yaml: &YamlOwned, key: &str) -> Result<Option<String>, ParserError> {
  match yaml_lookup(yaml, key) {
    Some(YamlOwned::Value(ScalarOwned::Null)) | None => Ok(None),
    Some(y) => scalar_to_string(y).map(Some),
  }
}

pub fn lookup_optional_u32(yaml: &YamlOwned, key: &str) -> Result<Option<u32>, ParserError> {
  match yaml_lookup(yaml, key) {
    Some(YamlOwned::Value(ScalarOwned::Null)) | None => Ok(None),
    Some(y @ YamlOwned::Value(ScalarOwned::Integer(i))) => u32::try_from(*i)
      .map(Some)
      .map_err(|_| wrong_type_err!(y, "non-negative integer")),
    Some(y) => Err(wrong_type_err!(y, "non-negative integer")),
  }
}

pub fn lookup_bool(yaml: &YamlOwned, key: &str) -> Result<bool, ParserError> {
  match yaml_lookup(yaml, key) {
    None => Ok(false),
    Some(YamlOwned::Value(ScalarOwned::Boolean(b))) => Ok(*b),
    Some(y) => Err(wrong_type_err!(y, "boolean")),
  }
}

/// A string, or a sequence of scalars, as a list of strings
pub fn string_or_sequence(yaml: &YamlOwned) -> Result<Vec<String>, ParserError> {
  match yaml {
    YamlOwned::Sequence(seq) => seq.iter().map(scalar_to_string).collect(),
    _ => Ok(vec![scalar_to_string(yaml)?]),
  }
}

/// A mapping of scalars as an ordered string map. Missing keys give an empty map.
pub fn lookup_string_map(
  yaml: &YamlOwned,
  key: &str,
) -> Result<LinkedHashMap<String, String>, ParserError> {
  let mut result = LinkedHashMap::new();
  match yaml_lookup(yaml, key) {
    None | Some(YamlOwned::Value(ScalarOwned::Null)) => {}
    Some(YamlOwned::Mapping(map)) => {
      for (k, v) in map.iter() {
        result.insert(scalar_to_string(k)?, scalar_to_string(v)?);
      }
    }
    Some(y) => return Err(wrong_type_err!(y, "mapping")),
  }
  Ok(result)
}

/// Load YAML from a file. Returns the first document in the file.
pub fn load_yaml_from_file(path: &Path) -> Result<YamlOwned, ParserError> {
  let text = fs::read_to_string(path)?;
  load_yaml_from_str(&text)
}

pub fn load_yaml_from_str(text: &str) -> Result<YamlOwned, ParserError> {
  let yaml = YamlOwned::load_from_str(text)
    .map_err(ParserError::YamlParseFailed)?
    .into_iter() // Take the first document
    .next()
    .ok_or(ParserError::YamlEmpty)?;
  Ok(yaml)
}
