//! CBOR element values to JSON claims.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use ciborium::Value as Cbor;
use serde_json::{Map, Number, Value as Json};

use super::model::IssuerSigned;
use crate::domain::verify::Claims;

/// Byte strings become base64url (no padding). Tags are dropped and their
/// content converted; `full-date` and `tdate` therefore come out as text.
pub fn cbor_to_json(value: &Cbor) -> Json {
  match value {
    Cbor::Null => Json::Null,
    Cbor::Bool(b) => Json::Bool(*b),
    Cbor::Text(s) => Json::String(s.clone()),
    Cbor::Bytes(b) => Json::String(URL_SAFE_NO_PAD.encode(b)),
    Cbor::Integer(i) => {
      let i = i128::from(*i);
      if let Ok(v) = i64::try_from(i) {
        Json::from(v)
      } else if let Ok(v) = u64::try_from(i) {
        Json::from(v)
      } else {
        Json::String(i.to_string())
      }
    }
    Cbor::Float(f) => Number::from_f64(*f).map_or(Json::Null, Json::Number),
    Cbor::Array(items) => Json::Array(items.iter().map(cbor_to_json).collect()),
    Cbor::Map(entries) => Json::Object(
      entries
        .iter()
        .map(|(k, v)| (map_key(k), cbor_to_json(v)))
        .collect(),
    ),
    Cbor::Tag(_, inner) => cbor_to_json(inner),
    _ => Json::Null,
  }
}

fn map_key(key: &Cbor) -> String {
  match key {
    Cbor::Text(s) => s.clone(),
    Cbor::Integer(i) => i128::from(*i).to_string(),
    other => cbor_to_json(other).to_string(),
  }
}

/// `{ namespace: { elementIdentifier: value } }` from the issuer-signed items.
pub fn extract(issuer_signed: &IssuerSigned) -> Claims {
  issuer_signed
    .name_spaces
    .iter()
    .map(|(ns, items)| {
      let elements: Map<String, Json> = items
        .iter()
        .map(|i| (i.item.element_identifier.clone(), cbor_to_json(&i.item.element_value)))
        .collect();
      (ns.clone(), Json::Object(elements))
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn converts_common_element_values() {
    let portrait = Cbor::Bytes(vec![0xff, 0xd8]);
    let birth_date = Cbor::Tag(1004, Box::new(Cbor::Text("1990-01-01".into())));
    let privileges = Cbor::Array(vec![Cbor::Map(vec![(
      Cbor::Text("vehicle_category_code".into()),
      Cbor::Text("B".into()),
    )])]);

    assert_eq!(cbor_to_json(&portrait), json!("_9g"));
    assert_eq!(cbor_to_json(&birth_date), json!("1990-01-01"));
    assert_eq!(cbor_to_json(&privileges), json!([{ "vehicle_category_code": "B" }]));
    assert_eq!(cbor_to_json(&Cbor::Integer((-5).into())), json!(-5));
    assert_eq!(cbor_to_json(&Cbor::Float(f64::NAN)), Json::Null);
  }
}
