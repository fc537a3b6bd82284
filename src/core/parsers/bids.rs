use std::path::Path;
use std::str::FromStr;

use log::debug;
use saphyr::YamlOwned;

use crate::core::bids::BidsError;
use crate::core::bids::entities::{BidsMap, Datatype, EntityChain};
use crate::core::parsers::ParserError;
use crate::core::parsers::utils::{
  load_yaml_from_file, lookup_bool, lookup_str, lookup_string_map, scalar_to_string,
  wrong_type_err, yaml_lookup,
};

fn parse_entity_chain(yaml: &YamlOwned) -> Result<EntityChain, ParserError> {
  let datatype = lookup_str(yaml, "datatype")?;
  let datatype =
    Datatype::from_str(&datatype).map_err(|_| BidsError::UnknownDatatype(datatype.clone()))?;
  let suffix = lookup_str(yaml, "suffix")?;
  let entities = lookup_string_map(yaml, "entities")?;
  let nonstandard = lookup_bool(yaml, "nonstandard")?;
  Ok(EntityChain::new(datatype, &suffix, entities, nonstandard)?)
}

/// Build a series map from a YAML document of the form
///
/// ```yaml
/// series:
///   rsfMRI:
///     datatype: func
///     suffix: bold
///     entities: {task: rest}
/// json_mod:
///   InstitutionName: LCNI
/// ```
pub fn parse_bids_map(yaml: &YamlOwned) -> Result<BidsMap, ParserError> {
  let mut map = BidsMap::default();
  match yaml_lookup(yaml, "series") {
    Some(YamlOwned::Mapping(series)) => {
      for (description, chain) in series.iter() {
        let description = scalar_to_string(description)?;
        debug!("Mapping series '{}'", description);
        map.add(description, parse_entity_chain(chain)?);
      }
    }
    Some(series) => return Err(wrong_type_err!(series, "mapping")),
    None => return Err(ParserError::MissingKey("series".to_string())),
  }
  map.json_mod = lookup_string_map(yaml, "json_mod")?;
  Ok(map)
}

pub fn parse_bids_map_from_file(path: &Path) -> Result<BidsMap, ParserError> {
  debug!("Loading BIDS map from file: {:?}", path);
  let yaml = load_yaml_from_file(path)?;
  parse_bids_map(&yaml)
}
