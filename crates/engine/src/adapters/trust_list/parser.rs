//! LoTE ("List of Trusted Entities") document parsing.
//!
//! Only the parts needed for trust decisions are read: scheme information
//! for freshness, and per entity the service type plus X.509 certificate
//! values of every service.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde_json::Value;

use crate::domain::error::{EngineError, EngineResult};
use crate::domain::types::{
  ServiceTypeIdentifier, TrustListInfo, TrustedEntity, TrustedService,
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedTrustList {
  pub info: TrustListInfo,
  pub entities: Vec<TrustedEntity>,
}

fn parse_error(msg: impl Into<String>) -> EngineError {
  EngineError::TrustListParse(msg.into())
}

/// Turns a fetched document into its JSON payload. A compact JWT yields its
/// decoded payload; a plain JSON document is returned as-is.
pub fn decode_document(raw: &str) -> EngineResult<Value> {
  let raw = raw.trim();
  if raw.starts_with('{') {
    return serde_json::from_str(raw).map_err(|e| parse_error(format!("invalid JSON: {e}")));
  }

  let parts: Vec<&str> = raw.split('.').collect();
  if parts.len() != 3 {
    return Err(parse_error("document is neither JSON nor a compact JWT"));
  }
  let payload = URL_SAFE_NO_PAD
    .decode(parts[1].trim_end_matches('='))
    .map_err(|e| parse_error(format!("JWT payload is not base64url: {e}")))?;
  serde_json::from_slice(&payload).map_err(|e| parse_error(format!("JWT payload is not JSON: {e}")))
}

fn str_field<'a>(obj: &'a Value, key: &str) -> Option<&'a str> {
  obj.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

// `TEName` is a list of localized `{ "value": .. }` entries; first wins.
fn localized_first(v: Option<&Value>) -> Option<String> {
  match v? {
    Value::String(s) if !s.is_empty() => Some(s.clone()),
    Value::Array(items) => items.iter().find_map(|i| match i {
      Value::String(s) if !s.is_empty() => Some(s.clone()),
      other => str_field(other, "value").or_else(|| str_field(other, "uriValue")).map(str::to_string),
    }),
    _ => None,
  }
}

fn entity_id(entity: &Value, index: usize) -> String {
  let info = entity.get("TrustedEntityInformation");
  info
    .and_then(|i| localized_first(i.get("TEName")))
    .or_else(|| info.and_then(|i| localized_first(i.get("TEInformationURI"))))
    .unwrap_or_else(|| format!("entity-{index}"))
}

fn services(entity: &Value) -> EngineResult<Vec<TrustedService>> {
  let list = match entity.get("TrustedEntityServices") {
    None | Some(Value::Null) => return Ok(Vec::new()),
    Some(Value::Array(list)) => list,
    Some(_) => return Err(parse_error("TrustedEntityServices is not an array")),
  };

  let mut out = Vec::new();
  for service in list {
    let Some(info) = service.get("ServiceInformation") else {
      continue;
    };
    let Some(service_type) = str_field(info, "ServiceTypeIdentifier") else {
      continue;
    };
    let certs = info
      .get("ServiceDigitalIdentity")
      .and_then(|d| d.get("X509Certificates"));
    let certs = match certs {
      None | Some(Value::Null) => continue,
      Some(Value::Array(certs)) => certs,
      Some(_) => return Err(parse_error("X509Certificates is not an array")),
    };
    for cert in certs {
      if let Some(val) = str_field(cert, "val") {
        out.push(TrustedService {
          service_type_identifier: ServiceTypeIdentifier::new(service_type),
          cert_value: val.to_string(),
        });
      }
    }
  }
  Ok(out)
}

/// Parses a LoTE payload, wrapped in `{"LoTE": ..}` or not. Entities that
/// carry no certificate are dropped.
pub fn parse(payload: &Value) -> EngineResult<ParsedTrustList> {
  let root = payload.get("LoTE").unwrap_or(payload);
  if !root.is_object() {
    return Err(parse_error("LoTE root is not an object"));
  }

  let info = root
    .get("ListAndSchemeInformation")
    .map(|s| TrustListInfo {
      next_update: str_field(s, "NextUpdate").map(str::to_string),
      list_issue_date_time: str_field(s, "ListIssueDateTime").map(str::to_string),
      scheme_territory: str_field(s, "SchemeTerritory").map(str::to_string),
    })
    .unwrap_or_default();

  let entities = match root.get("TrustedEntitiesList") {
    Some(Value::Array(list)) => list,
    Some(_) => return Err(parse_error("TrustedEntitiesList is not an array")),
    None => return Err(parse_error("TrustedEntitiesList missing")),
  };

  let mut parsed = Vec::with_capacity(entities.len());
  for (index, entity) in entities.iter().enumerate() {
    if !entity.is_object() {
      return Err(parse_error(format!("trusted entity {index} is not an object")));
    }
    let services = services(entity)?;
    let entity_id = entity_id(entity, index);
    if services.is_empty() {
      tracing::debug!(%entity_id, "trusted entity has no certificates; skipped");
      continue;
    }
    parsed.push(TrustedEntity { entity_id, services });
  }

  Ok(ParsedTrustList { info, entities: parsed })
}

/// Keeps only services whose type is accepted; entities left without any
/// service are dropped.
pub fn filter_by_service_types(
  parsed: ParsedTrustList,
  accepted: &[ServiceTypeIdentifier],
) -> ParsedTrustList {
  let entities = parsed
    .entities
    .into_iter()
    .filter_map(|mut entity| {
      entity.services.retain(|s| accepted.contains(&s.service_type_identifier));
      (!entity.services.is_empty()).then_some(entity)
    })
    .collect();
  ParsedTrustList { info: parsed.info, entities }
}
