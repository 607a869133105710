//! ISO/IEC 18013-5 device response structures, decoded from CBOR.
//!
//! Decoding walks [`ciborium::Value`] trees instead of deriving serde impls
//! because value digests and device authentication are computed over
//! `#6.24` items. The embedded byte string is kept verbatim; the tag and
//! byte-string header around it are re-encoded in preferred form.

use std::collections::BTreeMap;
use std::io::Cursor;

use chrono::{DateTime, Utc};
use ciborium::Value;
use coset::{AsCborValue, CoseMac0, CoseSign1, Label};

use crate::crypto::cose::DigestAlgorithm;
use crate::crypto::cose_key::CoseKey;
use crate::domain::error::{EngineError, EngineResult};

/// COSE header label carrying the X.509 chain (RFC 9360).
pub const X5CHAIN_LABEL: i64 = 33;

const TAG_ENCODED_CBOR: u64 = 24;

pub fn from_slice(bytes: &[u8]) -> EngineResult<Value> {
  Ok(ciborium::from_reader(Cursor::new(bytes))?)
}

pub fn to_vec(value: &Value) -> EngineResult<Vec<u8>> {
  let mut buf = Vec::new();
  ciborium::into_writer(value, &mut buf)?;
  Ok(buf)
}

/// `#6.24(bstr .cbor value)` as a value.
pub fn tag24(value: &Value) -> EngineResult<Value> {
  Ok(Value::Tag(TAG_ENCODED_CBOR, Box::new(Value::Bytes(to_vec(value)?))))
}

/// Unwraps `#6.24(bstr)` and decodes the embedded item.
pub fn untag24(value: &Value) -> EngineResult<Value> {
  match value {
    Value::Tag(TAG_ENCODED_CBOR, inner) => match inner.as_ref() {
      Value::Bytes(bytes) => from_slice(bytes),
      _ => Err(EngineError::Decode("tag 24 does not wrap a byte string".into())),
    },
    _ => Err(EngineError::Decode("expected tag 24 encoded CBOR".into())),
  }
}

// COSE messages may arrive with their optional CBOR tag (17 or 18).
fn cose_value(value: &Value) -> Value {
  match value {
    Value::Tag(17 | 18, inner) => inner.as_ref().clone(),
    other => other.clone(),
  }
}

fn missing(what: &str) -> EngineError {
  EngineError::Decode(format!("missing or malformed {what}"))
}

fn entries<'a>(value: &'a Value, what: &str) -> EngineResult<&'a [(Value, Value)]> {
  value.as_map().map(Vec::as_slice).ok_or_else(|| missing(what))
}

fn field<'a>(map: &'a [(Value, Value)], key: &str) -> Option<&'a Value> {
  map.iter().find(|(k, _)| k.as_text() == Some(key)).map(|(_, v)| v)
}

fn text_field(map: &[(Value, Value)], key: &str) -> EngineResult<String> {
  field(map, key)
    .and_then(Value::as_text)
    .map(str::to_string)
    .ok_or_else(|| missing(key))
}

fn uint(value: &Value) -> Option<u64> {
  value.as_integer().and_then(|i| u64::try_from(i).ok())
}

// tdate is `#6.0(tstr)`; an untagged RFC 3339 string is tolerated.
fn tdate(value: Option<&Value>, what: &str) -> EngineResult<DateTime<Utc>> {
  let text = match value {
    Some(Value::Tag(0, inner)) => inner.as_text(),
    Some(v) => v.as_text(),
    None => None,
  }
  .ok_or_else(|| missing(what))?;
  DateTime::parse_from_rfc3339(text)
    .map(|d| d.with_timezone(&Utc))
    .map_err(|e| EngineError::Decode(format!("{what}: {e}")))
}

#[derive(Debug, Clone)]
pub struct DeviceResponse {
  pub version: String,
  pub documents: Vec<Document>,
  pub status: u64,
}

impl DeviceResponse {
  pub fn from_slice(bytes: &[u8]) -> EngineResult<Self> {
    Self::from_value(&from_slice(bytes)?)
  }

  pub fn from_value(value: &Value) -> EngineResult<Self> {
    let map = entries(value, "DeviceResponse")?;
    let documents = match field(map, "documents") {
      None => Vec::new(),
      Some(Value::Array(docs)) => docs.iter().map(Document::from_value).collect::<EngineResult<_>>()?,
      Some(_) => return Err(missing("documents")),
    };
    Ok(Self {
      version: text_field(map, "version")?,
      documents,
      status: field(map, "status").and_then(uint).unwrap_or(0),
    })
  }
}

#[derive(Debug, Clone)]
pub struct Document {
  pub doc_type: String,
  pub issuer_signed: IssuerSigned,
  pub device_signed: Option<DeviceSigned>,
}

impl Document {
  fn from_value(value: &Value) -> EngineResult<Self> {
    let map = entries(value, "Document")?;
    Ok(Self {
      doc_type: text_field(map, "docType")?,
      issuer_signed: IssuerSigned::from_value(field(map, "issuerSigned").ok_or_else(|| missing("issuerSigned"))?)?,
      device_signed: field(map, "deviceSigned").map(DeviceSigned::from_value).transpose()?,
    })
  }
}

#[derive(Debug, Clone)]
pub struct IssuerSigned {
  /// Namespace to items, in received order.
  pub name_spaces: BTreeMap<String, Vec<IssuerSignedItemBytes>>,
  pub issuer_auth: CoseSign1,
}

impl IssuerSigned {
  fn from_value(value: &Value) -> EngineResult<Self> {
    let map = entries(value, "IssuerSigned")?;
    let mut name_spaces = BTreeMap::new();
    if let Some(ns) = field(map, "nameSpaces") {
      for (name, items) in entries(ns, "IssuerNameSpaces")? {
        let name = name.as_text().ok_or_else(|| missing("namespace name"))?;
        let items = items
          .as_array()
          .ok_or_else(|| missing("IssuerSignedItems"))?
          .iter()
          .map(IssuerSignedItemBytes::from_value)
          .collect::<EngineResult<Vec<_>>>()?;
        name_spaces.insert(name.to_string(), items);
      }
    }
    let auth = field(map, "issuerAuth").ok_or_else(|| missing("issuerAuth"))?;
    Ok(Self { name_spaces, issuer_auth: CoseSign1::from_cbor_value(cose_value(auth))? })
  }

  /// DER certificates of the `x5chain` header, leaf first. Looked up in the
  /// unprotected header, then the protected one.
  pub fn x5chain(&self) -> Vec<Vec<u8>> {
    let auth = &self.issuer_auth;
    let lookup = |rest: &[(Label, Value)]| {
      rest
        .iter()
        .find(|(l, _)| *l == Label::Int(X5CHAIN_LABEL))
        .map(|(_, v)| v.clone())
    };
    match lookup(auth.unprotected.rest.as_slice()).or_else(|| lookup(auth.protected.header.rest.as_slice())) {
      Some(Value::Bytes(der)) => vec![der],
      Some(Value::Array(items)) => items
        .into_iter()
        .filter_map(|v| match v {
          Value::Bytes(der) => Some(der),
          _ => None,
        })
        .collect(),
      _ => Vec::new(),
    }
  }

  /// The mobile security object signed by `issuer_auth`.
  pub fn mobile_security_object(&self) -> EngineResult<MobileSecurityObject> {
    let payload = self
      .issuer_auth
      .payload
      .as_deref()
      .ok_or_else(|| missing("issuerAuth payload"))?;
    let outer = from_slice(payload)?;
    let mso = if matches!(outer, Value::Tag(TAG_ENCODED_CBOR, _)) { untag24(&outer)? } else { outer };
    MobileSecurityObject::from_value(&mso)
  }
}

/// `#6.24(bstr .cbor IssuerSignedItem)`, kept with its encoded form.
#[derive(Debug, Clone)]
pub struct IssuerSignedItemBytes {
  /// Encoding of the whole tagged item, the input to value digests.
  pub encoded: Vec<u8>,
  pub item: IssuerSignedItem,
}

impl IssuerSignedItemBytes {
  fn from_value(value: &Value) -> EngineResult<Self> {
    let item = IssuerSignedItem::from_value(&untag24(value)?)?;
    Ok(Self { encoded: to_vec(value)?, item })
  }
}

#[derive(Debug, Clone)]
pub struct IssuerSignedItem {
  pub digest_id: u64,
  pub random: Vec<u8>,
  pub element_identifier: String,
  pub element_value: Value,
}

impl IssuerSignedItem {
  fn from_value(value: &Value) -> EngineResult<Self> {
    let map = entries(value, "IssuerSignedItem")?;
    Ok(Self {
      digest_id: field(map, "digestID").and_then(uint).ok_or_else(|| missing("digestID"))?,
      random: field(map, "random")
        .and_then(Value::as_bytes)
        .cloned()
        .ok_or_else(|| missing("random"))?,
      element_identifier: text_field(map, "elementIdentifier")?,
      element_value: field(map, "elementValue").cloned().ok_or_else(|| missing("elementValue"))?,
    })
  }
}

#[derive(Debug, Clone)]
pub struct DeviceSigned {
  /// The received `DeviceNameSpacesBytes`, still tagged.
  pub name_spaces_bytes: Value,
  pub device_auth: DeviceAuth,
}

#[derive(Debug, Clone)]
pub enum DeviceAuth {
  Signature(CoseSign1),
  Mac(CoseMac0),
}

impl DeviceSigned {
  fn from_value(value: &Value) -> EngineResult<Self> {
    let map = entries(value, "DeviceSigned")?;
    let name_spaces_bytes = field(map, "nameSpaces").cloned().ok_or_else(|| missing("device nameSpaces"))?;
    // Must decode, even when empty.
    untag24(&name_spaces_bytes)?;

    let auth = entries(field(map, "deviceAuth").ok_or_else(|| missing("deviceAuth"))?, "DeviceAuth")?;
    let device_auth = match (field(auth, "deviceSignature"), field(auth, "deviceMac")) {
      (Some(sig), None) => DeviceAuth::Signature(CoseSign1::from_cbor_value(cose_value(sig))?),
      (None, Some(mac)) => DeviceAuth::Mac(CoseMac0::from_cbor_value(cose_value(mac))?),
      _ => return Err(missing("deviceAuth: exactly one of deviceSignature or deviceMac")),
    };
    Ok(Self { name_spaces_bytes, device_auth })
  }
}

#[derive(Debug, Clone)]
pub struct ValidityInfo {
  pub signed: DateTime<Utc>,
  pub valid_from: DateTime<Utc>,
  pub valid_until: DateTime<Utc>,
}

impl ValidityInfo {
  pub fn contains(&self, now: DateTime<Utc>) -> bool {
    self.valid_from <= now && now <= self.valid_until
  }
}

#[derive(Debug, Clone)]
pub struct MobileSecurityObject {
  pub version: String,
  pub digest_algorithm: DigestAlgorithm,
  /// Namespace to digest id to digest.
  pub value_digests: BTreeMap<String, BTreeMap<u64, Vec<u8>>>,
  pub device_key: CoseKey,
  pub doc_type: String,
  pub validity_info: ValidityInfo,
}

impl MobileSecurityObject {
  pub fn from_value(value: &Value) -> EngineResult<Self> {
    let map = entries(value, "MobileSecurityObject")?;

    let mut value_digests = BTreeMap::new();
    for (ns, digests) in entries(field(map, "valueDigests").ok_or_else(|| missing("valueDigests"))?, "valueDigests")? {
      let ns = ns.as_text().ok_or_else(|| missing("valueDigests namespace"))?;
      let mut by_id = BTreeMap::new();
      for (id, digest) in entries(digests, "DigestIDs")? {
        let id = uint(id).ok_or_else(|| missing("DigestID"))?;
        let digest = digest.as_bytes().ok_or_else(|| missing("Digest"))?;
        by_id.insert(id, digest.clone());
      }
      value_digests.insert(ns.to_string(), by_id);
    }

    let key_info = entries(field(map, "deviceKeyInfo").ok_or_else(|| missing("deviceKeyInfo"))?, "DeviceKeyInfo")?;
    let device_key = CoseKey::from_cbor_value(field(key_info, "deviceKey").ok_or_else(|| missing("deviceKey"))?)?;

    let validity = entries(field(map, "validityInfo").ok_or_else(|| missing("validityInfo"))?, "ValidityInfo")?;
    Ok(Self {
      version: text_field(map, "version")?,
      digest_algorithm: DigestAlgorithm::from_name(&text_field(map, "digestAlgorithm")?)?,
      value_digests,
      device_key,
      doc_type: text_field(map, "docType")?,
      validity_info: ValidityInfo {
        signed: tdate(field(validity, "signed"), "signed")?,
        valid_from: tdate(field(validity, "validFrom"), "validFrom")?,
        valid_until: tdate(field(validity, "validUntil"), "validUntil")?,
      },
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn text(s: &str) -> Vec<u8> {
    let mut out = vec![0x60 + s.len() as u8];
    out.extend_from_slice(s.as_bytes());
    out
  }

  #[test]
  fn item_digest_input_keeps_embedded_bytes() {
    // digestID written as a non-minimal uint.
    let mut inner = vec![0xa4];
    inner.extend(text("digestID"));
    inner.extend([0x18, 0x07]);
    inner.extend(text("random"));
    inner.extend([0x42, 0x01, 0x02]);
    inner.extend(text("elementIdentifier"));
    inner.extend(text("family_name"));
    inner.extend(text("elementValue"));
    inner.extend(text("Doe"));

    let tagged = Value::Tag(TAG_ENCODED_CBOR, Box::new(Value::Bytes(inner.clone())));
    let item = IssuerSignedItemBytes::from_value(&tagged).unwrap();

    assert_eq!(item.item.digest_id, 7);
    assert_eq!(item.item.element_identifier, "family_name");
    assert_eq!(&item.encoded[..2], &[0xd8, 0x18]);
    assert!(item.encoded.ends_with(&inner));
    assert_ne!(to_vec(&untag24(&tagged).unwrap()).unwrap(), inner);
  }
}
