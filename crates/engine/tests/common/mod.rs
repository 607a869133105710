#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use chrono::{DateTime, SecondsFormat, Utc};
use ciborium::Value;
use coset::{AsCborValue, HeaderBuilder};
use openssl::ec::{EcGroup, EcKey};
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private, Public};
use openssl::x509::X509;
use rcgen::{BasicConstraints, CertificateParams, DistinguishedName, DnType, IsCa, KeyUsagePurpose};

use vc_trust_engine as vte;
use vte::adapters::mdoc::model::{tag24, to_vec};
use vte::adapters::mdoc::transcript;
use vte::adapters::mdoc::verifier::device_authentication_bytes;
use vte::crypto::cose::{build_mac0, build_sign1, derive_ephemeral_mac_key, digest, DigestAlgorithm, EMAC_KEY_INFO};
use vte::crypto::cose_key::CoseKey;
use vte::domain::error::EngineResult;

pub const PID_ISSUANCE: &str = "http://uri.etsi.org/19602/SvcType/PID/Issuance";
pub const PID_REVOCATION: &str = "http://uri.etsi.org/19602/SvcType/PID/Revocation";
pub const MDL_DOCTYPE: &str = "org.iso.18013.5.1.mDL";
pub const MDL_NAMESPACE: &str = "org.iso.18013.5.1";

/// Install a test subscriber once; honors `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ---------------------------------------------------------------------------
// Keys and certificates
// ---------------------------------------------------------------------------

pub fn p256_key() -> PKey<Private> {
    let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).expect("group");
    PKey::from_ec_key(EcKey::generate(&group).expect("ec key")).expect("pkey")
}

pub fn public_of(key: &PKey<Private>) -> PKey<Public> {
    let pem = key.public_key_to_pem().expect("public pem");
    PKey::public_key_from_pem(&pem).expect("public key")
}

/// A generated certificate, serialized once so its thumbprint is stable.
pub struct TestCert {
    pub cert: rcgen::Certificate,
    pub der: Vec<u8>,
    pub key: PKey<Private>,
}

impl TestCert {
    pub fn pem(&self) -> String {
        let x509 = X509::from_der(&self.der).expect("der");
        String::from_utf8(x509.to_pem().expect("pem")).expect("utf8")
    }

    pub fn b64(&self) -> String {
        STANDARD.encode(&self.der)
    }

    pub fn parsed(&self) -> vte::Certificate {
        vte::Certificate::from_der(&self.der).expect("parse")
    }
}

#[derive(Clone, Copy, Default)]
pub struct CertOptions {
    pub ca: bool,
    pub expired: bool,
}

pub fn make_cert(name: &str, opts: CertOptions, signer: Option<&TestCert>) -> TestCert {
    let mut params = CertificateParams::new(vec![]);
    params.alg = &rcgen::PKCS_ECDSA_P256_SHA256;
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, name);
    params.distinguished_name = dn;
    if opts.ca {
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign];
    } else {
        params.key_usages = vec![KeyUsagePurpose::DigitalSignature];
    }
    if opts.expired {
        params.not_before = rcgen::date_time_ymd(2019, 1, 1);
        params.not_after = rcgen::date_time_ymd(2021, 1, 1);
    }
    let cert = rcgen::Certificate::from_params(params).expect("cert");
    let der = match signer {
        Some(s) => cert.serialize_der_with_signer(&s.cert).expect("signed der"),
        None => cert.serialize_der().expect("der"),
    };
    let key = PKey::private_key_from_pem(cert.serialize_private_key_pem().as_bytes()).expect("key");
    TestCert { cert, der, key }
}

/// Root CA -> intermediate CA -> document signer.
pub struct Pki {
    pub root: TestCert,
    pub intermediate: TestCert,
    pub leaf: TestCert,
}

impl Pki {
    pub fn new(prefix: &str) -> Self {
        let root = make_cert(&format!("{prefix} Root CA"), CertOptions { ca: true, ..Default::default() }, None);
        let intermediate = make_cert(
            &format!("{prefix} Intermediate CA"),
            CertOptions { ca: true, ..Default::default() },
            Some(&root),
        );
        let leaf = make_cert(&format!("{prefix} Document Signer"), CertOptions::default(), Some(&intermediate));
        Self { root, intermediate, leaf }
    }

    /// What a device response carries: leaf first, root omitted.
    pub fn x5chain(&self) -> Vec<Vec<u8>> {
        vec![self.leaf.der.clone(), self.intermediate.der.clone()]
    }
}

// ---------------------------------------------------------------------------
// LoTE documents
// ---------------------------------------------------------------------------

pub struct EntitySpec<'a> {
    pub name: &'a str,
    pub services: Vec<(&'a str, String)>,
}

pub fn lote_json(entities: &[EntitySpec<'_>], next_update: &str) -> serde_json::Value {
    let list: Vec<serde_json::Value> = entities
        .iter()
        .map(|e| {
            let services: Vec<serde_json::Value> = e
                .services
                .iter()
                .map(|(svc_type, cert)| {
                    serde_json::json!({
                        "ServiceInformation": {
                            "ServiceTypeIdentifier": svc_type,
                            "ServiceDigitalIdentity": { "X509Certificates": [{ "val": cert }] }
                        }
                    })
                })
                .collect();
            serde_json::json!({
                "TrustedEntityInformation": { "TEName": [{ "lang": "en", "value": e.name }] },
                "TrustedEntityServices": services
            })
        })
        .collect();
    serde_json::json!({
        "LoTE": {
            "ListAndSchemeInformation": {
                "NextUpdate": next_update,
                "ListIssueDateTime": "2025-01-01T00:00:00Z",
                "SchemeTerritory": "EU"
            },
            "TrustedEntitiesList": list
        }
    })
}

/// Compact ES256 JWS over `payload`.
pub fn sign_jwt(payload: &serde_json::Value, key: &PKey<Private>) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"ES256","typ":"JWT"}"#);
    let body = URL_SAFE_NO_PAD.encode(payload.to_string());
    let input = format!("{header}.{body}");
    let sig = vte::crypto::cose::sign1_sign(key, input.as_bytes()).expect("sign");
    format!("{input}.{}", URL_SAFE_NO_PAD.encode(sig))
}

pub fn far_future() -> String {
    "2099-01-01T00:00:00Z".to_string()
}

/// One-entity LoTE trusting `pki.root` for issuance, with a revocation cert.
pub fn pki_lote(pki: &Pki, revocation: Option<&TestCert>) -> serde_json::Value {
    let mut services = vec![(PID_ISSUANCE, pki.root.b64())];
    if let Some(r) = revocation {
        services.push((PID_REVOCATION, r.b64()));
    }
    lote_json(&[EntitySpec { name: "Test PID Provider", services }], &far_future())
}

// ---------------------------------------------------------------------------
// Fetchers
// ---------------------------------------------------------------------------

/// In-memory fetcher that counts calls and can be switched to failing.
#[derive(Default)]
pub struct StaticFetcher {
    docs: Mutex<HashMap<String, String>>,
    calls: AtomicUsize,
    failing: AtomicBool,
    delay: Option<Duration>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self { delay: Some(delay), ..Self::default() }
    }

    pub fn insert(&self, url: &str, doc: impl Into<String>) {
        self.docs.lock().unwrap().insert(url.to_string(), doc.into());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl vte::DocumentFetcher for StaticFetcher {
    async fn fetch(&self, url: &str, _timeout: Duration) -> EngineResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(vte::EngineError::TrustListFetch { url: url.into(), reason: "unreachable".into() });
        }
        self.docs
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| vte::EngineError::TrustListFetch { url: url.into(), reason: "404".into() })
    }
}

pub fn builder_with(fetcher: Arc<StaticFetcher>, ttl: Duration) -> vte::TrustStoreBuilder {
    let mut config = vte::TrustStoreConfig::secure_default();
    config.cache_ttl = ttl;
    vte::TrustStoreBuilder::new(fetcher, Arc::new(vte::AcceptUnverified), config)
}

pub fn source(urls: &[&str]) -> vte::TrustListSource {
    vte::TrustListSource {
        lotes: urls.iter().map(|u| vte::TrustListRef::new(*u)).collect(),
        accepted_service_types: None,
    }
}

// ---------------------------------------------------------------------------
// Device responses
// ---------------------------------------------------------------------------

pub enum DeviceAuthMode {
    Signature,
    /// Reader's ephemeral public key for the ECDH MAC key.
    Mac(PKey<Public>),
}

pub struct ResponseSpec {
    pub doc_type: String,
    pub device_auth: DeviceAuthMode,
    /// Replace `family_name` after digests were computed.
    pub tamper_element: bool,
    /// Flip a byte of the device signature / tag.
    pub corrupt_device_auth: bool,
    pub mso_valid_until: DateTime<Utc>,
}

impl Default for ResponseSpec {
    fn default() -> Self {
        Self {
            doc_type: MDL_DOCTYPE.to_string(),
            device_auth: DeviceAuthMode::Signature,
            tamper_element: false,
            corrupt_device_auth: false,
            mso_valid_until: Utc::now() + chrono::Duration::days(365),
        }
    }
}

fn tdate(t: DateTime<Utc>) -> Value {
    Value::Tag(0, Box::new(Value::Text(t.to_rfc3339_opts(SecondsFormat::Secs, true))))
}

fn text(s: &str) -> Value {
    Value::Text(s.to_string())
}

fn issuer_item(digest_id: u64, id: &str, value: Value) -> Value {
    Value::Map(vec![
        (text("digestID"), Value::Integer(digest_id.into())),
        (text("random"), Value::Bytes(vec![digest_id as u8; 16])),
        (text("elementIdentifier"), text(id)),
        (text("elementValue"), value),
    ])
}

pub fn mdl_elements() -> Vec<(&'static str, Value)> {
    vec![
        ("family_name", text("Doe")),
        ("given_name", text("Jane")),
        ("birth_date", Value::Tag(1004, Box::new(text("1990-01-01")))),
        ("age_over_18", Value::Bool(true)),
    ]
}

/// Issues and presents an mdoc; returns the base64url device response.
pub fn device_response(
    issuer_key: &PKey<Private>,
    x5chain: &[Vec<u8>],
    device_key: &PKey<Private>,
    binding: &vte::SessionBinding,
    spec: &ResponseSpec,
) -> String {
    // Issuer-signed items and their digests
    let mut tagged_items = Vec::new();
    let mut digests = Vec::new();
    for (i, (id, value)) in mdl_elements().into_iter().enumerate() {
        let tagged = tag24(&issuer_item(i as u64, id, value)).unwrap();
        let d = digest(DigestAlgorithm::Sha256, &to_vec(&tagged).unwrap()).unwrap();
        digests.push((Value::Integer((i as u64).into()), Value::Bytes(d)));
        tagged_items.push(tagged);
    }
    if spec.tamper_element {
        tagged_items[0] = tag24(&issuer_item(0, "family_name", text("Mallory"))).unwrap();
    }

    let now = Utc::now();
    let device_public = public_of(device_key);
    let mso = Value::Map(vec![
        (text("version"), text("1.0")),
        (text("digestAlgorithm"), text("SHA-256")),
        (text("valueDigests"), Value::Map(vec![(text(MDL_NAMESPACE), Value::Map(digests))])),
        (
            text("deviceKeyInfo"),
            Value::Map(vec![(text("deviceKey"), CoseKey::from_public_key(&device_public).unwrap().to_cbor_value())]),
        ),
        (text("docType"), text(&spec.doc_type)),
        (
            text("validityInfo"),
            Value::Map(vec![
                (text("signed"), tdate(now - chrono::Duration::days(1))),
                (text("validFrom"), tdate(now - chrono::Duration::days(1))),
                (text("validUntil"), tdate(spec.mso_valid_until)),
            ]),
        ),
    ]);

    let x5chain_value = match x5chain {
        [single] => Value::Bytes(single.clone()),
        many => Value::Array(many.iter().map(|d| Value::Bytes(d.clone())).collect()),
    };
    let unprotected = HeaderBuilder::new().value(33, x5chain_value).build();
    let issuer_auth = build_sign1(issuer_key, unprotected, to_vec(&tag24(&mso).unwrap()).unwrap(), false).unwrap();

    // Device authentication over the session transcript
    let transcript = transcript::build(binding).unwrap();
    let device_ns = tag24(&Value::Map(vec![])).unwrap();
    let auth_bytes = device_authentication_bytes(&transcript, &spec.doc_type, &device_ns).unwrap();
    let device_auth = match &spec.device_auth {
        DeviceAuthMode::Signature => {
            let mut sig = build_sign1(device_key, coset::Header::default(), auth_bytes, true).unwrap();
            if spec.corrupt_device_auth {
                sig.signature[0] ^= 0xff;
            }
            (text("deviceSignature"), sig.to_cbor_value().unwrap())
        }
        DeviceAuthMode::Mac(reader_public) => {
            let key = derive_ephemeral_mac_key(device_key, reader_public, transcript.bytes(), EMAC_KEY_INFO).unwrap();
            let mut mac = build_mac0(&key, &auth_bytes).unwrap();
            if spec.corrupt_device_auth {
                mac.tag[0] ^= 0xff;
            }
            (text("deviceMac"), mac.to_cbor_value().unwrap())
        }
    };

    let document = Value::Map(vec![
        (text("docType"), text(&spec.doc_type)),
        (
            text("issuerSigned"),
            Value::Map(vec![
                (text("nameSpaces"), Value::Map(vec![(text(MDL_NAMESPACE), Value::Array(tagged_items))])),
                (text("issuerAuth"), issuer_auth.to_cbor_value().unwrap()),
            ]),
        ),
        (
            text("deviceSigned"),
            Value::Map(vec![(text("nameSpaces"), device_ns), (text("deviceAuth"), Value::Map(vec![device_auth]))]),
        ),
    ]);
    let response = Value::Map(vec![
        (text("version"), text("1.0")),
        (text("documents"), Value::Array(vec![document])),
        (text("status"), Value::Integer(0.into())),
    ]);
    URL_SAFE_NO_PAD.encode(to_vec(&response).unwrap())
}

pub fn binding() -> vte::SessionBinding {
    vte::SessionBinding::direct_post("nonce-123", "x509_san_dns:verifier.example", "https://verifier.example/response")
}
