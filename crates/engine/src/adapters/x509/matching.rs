use crate::crypto::certificate::{parse_certificate, Certificate};
use crate::domain::types::{MatchMode, PinnedCertMode, TrustedEntity, TrustedService};
use crate::domain::verify::MatchedTrustedEntity;

fn parse_service_cert(entity: &TrustedEntity, service: &TrustedService) -> Option<Certificate> {
  match parse_certificate(&service.cert_value) {
    Ok(cert) => Some(cert),
    Err(e) => {
      tracing::warn!(entity = %entity.entity_id, error = %e, "skipping unparseable trusted certificate");
      None
    }
  }
}

/// Matches a built path against the trusted entities.
///
/// Entities are tried in store order and, within an entity, issuance
/// services in listed order. The first hit wins. A CA certificate matches
/// the path terminus; a non-CA certificate is pinned to the leaf or to the
/// terminus depending on `pinned_mode`.
pub fn path_matches_trusted_entities(
  path: &[Certificate],
  entities: &[TrustedEntity],
  pinned_mode: PinnedCertMode,
) -> Option<MatchedTrustedEntity> {
  let leaf = path.first()?;
  let terminus = path.last()?;

  for entity in entities {
    for service in entity.issuance_services() {
      let Some(cert) = parse_service_cert(entity, service) else {
        continue;
      };
      let match_mode = if cert.is_ca() {
        (cert == *terminus).then_some(MatchMode::Ca)
      } else {
        match pinned_mode {
          PinnedCertMode::Leaf => (cert == *leaf).then_some(MatchMode::LeafPinned),
          PinnedCertMode::PathEnd => (cert == *terminus).then_some(MatchMode::PathEndPinned),
        }
      };
      let Some(match_mode) = match_mode else {
        continue;
      };

      let revocation_cert = entity
        .revocation_service()
        .and_then(|s| parse_service_cert(entity, s));
      tracing::debug!(entity = %entity.entity_id, ?match_mode, "issuer matched trusted entity");
      return Some(MatchedTrustedEntity {
        entity: entity.clone(),
        issuance_thumbprint: cert.thumbprint().to_string(),
        issuance_is_ca: cert.is_ca(),
        issuance_cert: cert,
        match_mode,
        revocation_thumbprint: revocation_cert.as_ref().map(|c| c.thumbprint().to_string()),
        revocation_cert,
      });
    }
  }
  None
}
