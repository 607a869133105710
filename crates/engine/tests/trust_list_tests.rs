mod common;

use std::io::Write;

use vc_trust_engine as vte;
use vte::adapters::trust_list::{decode_document, filter_by_service_types, parse};
use vte::TrustListSignatureVerifier;

fn public_pem(key: &openssl::pkey::PKey<openssl::pkey::Private>) -> String {
    String::from_utf8(key.public_key_to_pem().unwrap()).unwrap()
}

#[test]
fn parses_signed_lote_into_entities() {
    let pki = common::Pki::new("Parse");
    let revocation = common::make_cert("Parse Revocation", Default::default(), Some(&pki.root));
    let payload = common::pki_lote(&pki, Some(&revocation));
    let jwt = common::sign_jwt(&payload, &common::p256_key());

    let parsed = parse(&decode_document(&jwt).unwrap()).unwrap();
    assert_eq!(parsed.info.next_update.as_deref(), Some("2099-01-01T00:00:00Z"));
    assert_eq!(parsed.info.scheme_territory.as_deref(), Some("EU"));
    assert_eq!(parsed.entities.len(), 1);

    let entity = &parsed.entities[0];
    assert_eq!(entity.entity_id, "Test PID Provider");
    assert_eq!(entity.services.len(), 2);
    assert_eq!(entity.issuance_services().count(), 1);
    assert_eq!(entity.revocation_service().unwrap().cert_value, revocation.b64());
}

#[test]
fn plain_json_and_unwrapped_lote_are_accepted() {
    let pki = common::Pki::new("Plain");
    let wrapped = common::pki_lote(&pki, None);
    let unwrapped = wrapped["LoTE"].clone();

    let a = parse(&decode_document(&wrapped.to_string()).unwrap()).unwrap();
    let b = parse(&unwrapped).unwrap();
    assert_eq!(a, b);
}

#[test]
fn entities_without_certificates_are_dropped() {
    let pki = common::Pki::new("Empty");
    let payload = common::lote_json(
        &[
            common::EntitySpec { name: "No services", services: vec![] },
            common::EntitySpec { name: "Issuer", services: vec![(common::PID_ISSUANCE, pki.root.b64())] },
        ],
        &common::far_future(),
    );
    let parsed = parse(&payload).unwrap();
    assert_eq!(parsed.entities.len(), 1);
    assert_eq!(parsed.entities[0].entity_id, "Issuer");
}

#[test]
fn unnamed_entities_get_positional_ids() {
    let payload = serde_json::json!({
        "TrustedEntitiesList": [{
            "TrustedEntityServices": [{
                "ServiceInformation": {
                    "ServiceTypeIdentifier": common::PID_ISSUANCE,
                    "ServiceDigitalIdentity": { "X509Certificates": [{ "val": "MIIB" }] }
                }
            }]
        }]
    });
    assert_eq!(parse(&payload).unwrap().entities[0].entity_id, "entity-0");
}

#[test]
fn malformed_documents_are_parse_errors() {
    for raw in ["not a document", "a.b", "a.!!!.c", "{ broken json"] {
        let err = decode_document(raw).unwrap_err();
        assert_eq!(err.kind(), vte::ErrorKind::TrustListParse, "input {raw:?}");
    }
    let err = parse(&serde_json::json!({ "LoTE": { "TrustedEntitiesList": "nope" } })).unwrap_err();
    assert_eq!(err.kind(), vte::ErrorKind::TrustListParse);
    let err = parse(&serde_json::json!({ "LoTE": {} })).unwrap_err();
    assert_eq!(err.kind(), vte::ErrorKind::TrustListParse);
}

#[test]
fn service_type_filter_keeps_accepted_only() {
    let pki = common::Pki::new("Filter");
    let revocation = common::make_cert("Filter Revocation", Default::default(), Some(&pki.root));
    let parsed = parse(&common::pki_lote(&pki, Some(&revocation))).unwrap();

    let only_issuance = filter_by_service_types(parsed.clone(), &[common::PID_ISSUANCE.into()]);
    assert_eq!(only_issuance.entities[0].services.len(), 1);

    let nothing = filter_by_service_types(parsed, &["http://example.com/other".into()]);
    assert!(nothing.entities.is_empty());
}

#[test]
fn jws_verifier_accepts_matching_key() {
    let signing_key = common::p256_key();
    let payload = common::pki_lote(&common::Pki::new("Jws"), None);
    let jwt = common::sign_jwt(&payload, &signing_key);
    let list = vte::TrustListRef::new("https://lote.example/pid.jwt").with_verifier_key(public_pem(&signing_key));

    vte::JwsSignatureVerifier.verify(&list, &jwt).expect("signature accepted");
}

#[test]
fn jws_verifier_rejects_wrong_key_and_tampering() {
    let signing_key = common::p256_key();
    let payload = common::pki_lote(&common::Pki::new("JwsBad"), None);
    let jwt = common::sign_jwt(&payload, &signing_key);

    let wrong = vte::TrustListRef::new("https://lote.example/pid.jwt").with_verifier_key(public_pem(&common::p256_key()));
    let err = vte::JwsSignatureVerifier.verify(&wrong, &jwt).unwrap_err();
    assert_eq!(err.kind(), vte::ErrorKind::TrustListSignature);

    let right = vte::TrustListRef::new("https://lote.example/pid.jwt").with_verifier_key(public_pem(&signing_key));
    let mut parts: Vec<String> = jwt.split('.').map(str::to_string).collect();
    parts[1] = common::sign_jwt(&serde_json::json!({ "LoTE": {} }), &signing_key)
        .split('.')
        .nth(1)
        .unwrap()
        .to_string();
    let err = vte::JwsSignatureVerifier.verify(&right, &parts.join(".")).unwrap_err();
    assert_eq!(err.kind(), vte::ErrorKind::TrustListSignature);

    let unkeyed = vte::TrustListRef::new("https://lote.example/pid.jwt");
    assert!(vte::JwsSignatureVerifier.verify(&unkeyed, &jwt).is_err());
    assert!(vte::JwsSignatureVerifier.verify(&right, &payload.to_string()).is_err());
}

#[test]
fn jws_verifier_key_from_file_and_env() {
    let signing_key = common::p256_key();
    let jwt = common::sign_jwt(&common::pki_lote(&common::Pki::new("Sources"), None), &signing_key);

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(public_pem(&signing_key).as_bytes()).unwrap();
    let local = vte::TrustListRef::new("https://lote.example/a").with_verifier_key(format!("local:{}", file.path().display()));
    vte::JwsSignatureVerifier.verify(&local, &jwt).expect("local key");

    std::env::set_var("VTE_TEST_LOTE_VERIFIER_KEY", public_pem(&signing_key));
    let env = vte::TrustListRef::new("https://lote.example/b").with_verifier_key("env:VTE_TEST_LOTE_VERIFIER_KEY");
    vte::JwsSignatureVerifier.verify(&env, &jwt).expect("env key");

    let missing = vte::TrustListRef::new("https://lote.example/c").with_verifier_key("env:VTE_TEST_UNSET_KEY_VAR");
    assert!(vte::JwsSignatureVerifier.verify(&missing, &jwt).is_err());
}

#[test]
fn jws_verifier_accepts_certificate_as_key() {
    let signer = common::make_cert("LoTE Signer", Default::default(), None);
    let jwt = common::sign_jwt(&common::pki_lote(&common::Pki::new("CertKey"), None), &signer.key);
    let list = vte::TrustListRef::new("https://lote.example/pid.jwt").with_verifier_key(signer.pem());
    vte::JwsSignatureVerifier.verify(&list, &jwt).expect("certificate key");
}

#[test]
fn default_gates() {
    let list = vte::TrustListRef::new("https://lote.example/pid.jwt");
    let err = vte::RejectUnverified.verify(&list, "{}").unwrap_err();
    assert_eq!(err.kind(), vte::ErrorKind::TrustListSignature);
    vte::AcceptUnverified.verify(&list, "{}").unwrap();
}
