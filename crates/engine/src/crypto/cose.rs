//! COSE primitives used by mdoc verification: digests, ECDSA over
//! `COSE_Sign1`, HMAC-SHA256 over `COSE_Mac0` and the ECDH/HKDF
//! derivation of the ephemeral MAC key (ISO/IEC 18013-5 §9.1.3.5).

use coset::iana::{self, EnumI64};
use coset::{
    CoseMac0, CoseMac0Builder, CoseSign1, CoseSign1Builder, Header, HeaderBuilder,
    RegisteredLabelWithPrivate,
};
use hkdf::Hkdf;
use openssl::bn::BigNum;
use openssl::derive::Deriver;
use openssl::ecdsa::EcdsaSig;
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{HasPrivate, HasPublic, PKey, PKeyRef};
use openssl::sign::Signer;
use sha2::Sha256;
use zeroize::{Zeroize, Zeroizing};

use crate::domain::error::{EngineError, EngineResult};
use crate::domain::types::SigAlg;

/// HKDF `info` for the device MAC key.
pub const EMAC_KEY_INFO: &[u8] = b"EMacKey";

const MAC_KEY_LEN: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestAlgorithm {
    Sha256,
    Sha384,
    Sha512,
}

impl DigestAlgorithm {
    /// Parses the `digestAlgorithm` names used in a mobile security object.
    pub fn from_name(name: &str) -> EngineResult<Self> {
        match name {
            "SHA-256" => Ok(DigestAlgorithm::Sha256),
            "SHA-384" => Ok(DigestAlgorithm::Sha384),
            "SHA-512" => Ok(DigestAlgorithm::Sha512),
            other => Err(EngineError::Decode(format!("unsupported digest algorithm {other}"))),
        }
    }

    fn message_digest(self) -> MessageDigest {
        match self {
            DigestAlgorithm::Sha256 => MessageDigest::sha256(),
            DigestAlgorithm::Sha384 => MessageDigest::sha384(),
            DigestAlgorithm::Sha512 => MessageDigest::sha512(),
        }
    }
}

pub fn digest(alg: DigestAlgorithm, data: &[u8]) -> EngineResult<Vec<u8>> {
    Ok(openssl::hash::hash(alg.message_digest(), data)?.to_vec())
}

pub fn random_bytes(len: usize) -> EngineResult<Vec<u8>> {
    let mut buf = vec![0u8; len];
    openssl::rand::rand_bytes(&mut buf)?;
    Ok(buf)
}

/// Symmetric key for `COSE_Mac0`. Wiped on drop.
pub struct MacKey(Zeroizing<[u8; MAC_KEY_LEN]>);

impl MacKey {
    pub fn from_bytes(bytes: [u8; MAC_KEY_LEN]) -> Self {
        Self(Zeroizing::new(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0[..]
    }
}

impl std::fmt::Debug for MacKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MacKey(..)")
    }
}

/// ECDH between `private` and `peer`, then HKDF-SHA256 with
/// `salt = SHA-256(session_transcript_bytes)` and the given `info`.
pub fn derive_ephemeral_mac_key<S, P>(
    private: &PKeyRef<S>,
    peer: &PKeyRef<P>,
    session_transcript_bytes: &[u8],
    info: &[u8],
) -> EngineResult<MacKey>
where
    S: HasPrivate,
    P: HasPublic,
{
    let mut deriver = Deriver::new(private)?;
    deriver.set_peer(peer)?;
    let shared = Zeroizing::new(deriver.derive_to_vec()?);

    let salt = digest(DigestAlgorithm::Sha256, session_transcript_bytes)?;
    let hk = Hkdf::<Sha256>::new(Some(salt.as_slice()), &shared[..]);
    let mut okm = [0u8; MAC_KEY_LEN];
    hk.expand(info, &mut okm)
        .map_err(|e| EngineError::VerificationFailed(format!("hkdf expand: {e}")))?;
    let key = MacKey::from_bytes(okm);
    okm.zeroize();
    Ok(key)
}

/// HMAC-SHA256 over a MAC_structure.
pub fn mac0_sign(key: &MacKey, to_be_maced: &[u8]) -> EngineResult<Vec<u8>> {
    let pkey = PKey::hmac(key.as_bytes())?;
    let mut signer = Signer::new(MessageDigest::sha256(), &pkey)?;
    signer.update(to_be_maced)?;
    Ok(signer.sign_to_vec()?)
}

/// Constant-time tag comparison. An absent or empty tag is an error,
/// not a mismatch.
pub fn mac0_verify(key: &MacKey, tag: Option<&[u8]>, to_be_maced: &[u8]) -> EngineResult<bool> {
    let tag = match tag {
        Some(t) if !t.is_empty() => t,
        _ => return Err(EngineError::MissingTag),
    };
    let expected = Zeroizing::new(mac0_sign(key, to_be_maced)?);
    if expected.len() != tag.len() {
        return Ok(false);
    }
    Ok(openssl::memcmp::eq(&expected, tag))
}

// Digest and coordinate size follow the key's curve.
fn curve_params(nid: Option<Nid>) -> EngineResult<(SigAlg, MessageDigest, usize)> {
    match nid {
        Some(Nid::X9_62_PRIME256V1) => Ok((SigAlg::Es256, MessageDigest::sha256(), 32)),
        Some(Nid::SECP384R1) => Ok((SigAlg::Es384, MessageDigest::sha384(), 48)),
        Some(Nid::SECP521R1) => Ok((SigAlg::Es512, MessageDigest::sha512(), 66)),
        _ => Err(EngineError::VerificationFailed("unsupported EC curve".into())),
    }
}

/// Algorithm implied by an EC key's curve.
pub fn sig_alg_for_key<T: HasPublic>(key: &PKeyRef<T>) -> EngineResult<SigAlg> {
    let ec = key.ec_key()?;
    Ok(curve_params(ec.group().curve_name())?.0)
}

/// ECDSA over a Sig_structure; returns raw `r || s`.
pub fn sign1_sign<T: HasPrivate>(key: &PKeyRef<T>, to_be_signed: &[u8]) -> EngineResult<Vec<u8>> {
    let ec = key.ec_key()?;
    let (_, md, size) = curve_params(ec.group().curve_name())?;
    let hash = openssl::hash::hash(md, to_be_signed)?;
    let sig = EcdsaSig::sign(&hash, &ec)?;
    let mut out = sig.r().to_vec_padded(size as i32)?;
    out.extend(sig.s().to_vec_padded(size as i32)?);
    Ok(out)
}

/// Verifies a raw `r || s` signature. An absent or empty signature is an
/// error; a wrong-length one is simply invalid.
pub fn sign1_verify<T: HasPublic>(
    key: &PKeyRef<T>,
    signature: Option<&[u8]>,
    to_be_signed: &[u8],
) -> EngineResult<bool> {
    let signature = match signature {
        Some(s) if !s.is_empty() => s,
        _ => return Err(EngineError::MissingSignature),
    };
    let ec = key.ec_key()?;
    let (_, md, size) = curve_params(ec.group().curve_name())?;
    if signature.len() != 2 * size {
        return Ok(false);
    }
    let r = BigNum::from_slice(&signature[..size])?;
    let s = BigNum::from_slice(&signature[size..])?;
    let sig = EcdsaSig::from_private_components(r, s)?;
    let hash = openssl::hash::hash(md, to_be_signed)?;
    Ok(sig.verify(&hash, &ec).unwrap_or(false))
}

fn protected_alg(header: &Header) -> Option<iana::Algorithm> {
    match &header.alg {
        Some(RegisteredLabelWithPrivate::Assigned(alg)) => Some(*alg),
        _ => None,
    }
}

/// Verifies a `COSE_Sign1`. `detached_payload` overrides the embedded one.
/// The protected `alg` must agree with the key's curve.
pub fn sign1_verify_message<T: HasPublic>(
    sign1: &CoseSign1,
    detached_payload: Option<&[u8]>,
    key: &PKeyRef<T>,
) -> EngineResult<bool> {
    let payload = match detached_payload {
        Some(p) => p,
        None => sign1
            .payload
            .as_deref()
            .ok_or_else(|| EngineError::Decode("COSE_Sign1 has no payload".into()))?,
    };
    let key_alg = sig_alg_for_key(key)?;
    match protected_alg(&sign1.protected.header).and_then(SigAlg::from_cose) {
        Some(alg) if alg == key_alg => {}
        Some(alg) => {
            tracing::debug!(?alg, ?key_alg, "COSE_Sign1 alg does not match key curve");
            return Ok(false);
        }
        None => return Err(EngineError::VerificationFailed("unsupported COSE_Sign1 alg".into())),
    }
    let tbs = coset::sig_structure_data(
        coset::SignatureContext::CoseSign1,
        sign1.protected.clone(),
        None,
        &[],
        payload,
    );
    sign1_verify(key, Some(sign1.signature.as_slice()), &tbs)
}

/// Verifies a `COSE_Mac0` against an external payload with HMAC 256/256.
pub fn mac0_verify_message(mac0: &CoseMac0, payload: &[u8], key: &MacKey) -> EngineResult<bool> {
    match protected_alg(&mac0.protected.header) {
        Some(iana::Algorithm::HMAC_256_256) => {}
        other => {
            return Err(EngineError::VerificationFailed(format!(
                "unsupported COSE_Mac0 alg {:?}",
                other.map(|a| a.to_i64())
            )))
        }
    }
    let data = coset::mac_structure_data(
        coset::MacContext::CoseMac0,
        mac0.protected.clone(),
        &[],
        payload,
    );
    mac0_verify(key, Some(mac0.tag.as_slice()), &data)
}

/// Produces a `COSE_Sign1`. With `detached`, the payload is signed but
/// not carried.
pub fn build_sign1<T: HasPrivate>(
    key: &PKeyRef<T>,
    unprotected: Header,
    payload: Vec<u8>,
    detached: bool,
) -> EngineResult<CoseSign1> {
    let alg = sig_alg_for_key(key)?;
    let protected = HeaderBuilder::new().algorithm(alg.to_cose()).build();
    let builder = CoseSign1Builder::new().protected(protected).unprotected(unprotected);
    let sign1 = if detached {
        builder.try_create_detached_signature(&payload, &[], |tbs| sign1_sign(key, tbs))?
    } else {
        builder.payload(payload).try_create_signature(&[], |tbs| sign1_sign(key, tbs))?
    };
    Ok(sign1.build())
}

/// Produces a detached `COSE_Mac0` with HMAC 256/256.
pub fn build_mac0(key: &MacKey, payload: &[u8]) -> EngineResult<CoseMac0> {
    let protected = HeaderBuilder::new().algorithm(iana::Algorithm::HMAC_256_256).build();
    let mut mac0 = CoseMac0Builder::new().protected(protected).build();
    let data = coset::mac_structure_data(
        coset::MacContext::CoseMac0,
        mac0.protected.clone(),
        &[],
        payload,
    );
    mac0.tag = mac0_sign(key, &data)?;
    Ok(mac0)
}
