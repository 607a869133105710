//! RFC 9052 `COSE_Key`, restricted to the EC2 keys ISO/IEC 18013-5 devices use.

use ciborium::Value;
use openssl::bn::{BigNum, BigNumContext};
use openssl::ec::{EcGroup, EcKey, EcPoint};
use openssl::nid::Nid;
use openssl::pkey::{HasPublic, PKey, PKeyRef, Public};

use crate::domain::error::{EngineError, EngineResult};

const KTY: i128 = 1;
const CRV: i128 = -1;
const X: i128 = -2;
const Y: i128 = -3;
const KTY_EC2: i128 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ec2Curve {
    P256,
    P384,
    P521,
}

impl Ec2Curve {
    fn from_id(id: i128) -> EngineResult<Self> {
        match id {
            1 => Ok(Ec2Curve::P256),
            2 => Ok(Ec2Curve::P384),
            3 => Ok(Ec2Curve::P521),
            other => Err(EngineError::Decode(format!("unsupported COSE_Key curve {other}"))),
        }
    }

    fn id(self) -> i64 {
        match self {
            Ec2Curve::P256 => 1,
            Ec2Curve::P384 => 2,
            Ec2Curve::P521 => 3,
        }
    }

    fn nid(self) -> Nid {
        match self {
            Ec2Curve::P256 => Nid::X9_62_PRIME256V1,
            Ec2Curve::P384 => Nid::SECP384R1,
            Ec2Curve::P521 => Nid::SECP521R1,
        }
    }

    fn from_nid(nid: Nid) -> EngineResult<Self> {
        match nid {
            Nid::X9_62_PRIME256V1 => Ok(Ec2Curve::P256),
            Nid::SECP384R1 => Ok(Ec2Curve::P384),
            Nid::SECP521R1 => Ok(Ec2Curve::P521),
            _ => Err(EngineError::Config("unsupported EC curve".into())),
        }
    }

    pub fn coordinate_len(self) -> usize {
        match self {
            Ec2Curve::P256 => 32,
            Ec2Curve::P384 => 48,
            Ec2Curve::P521 => 66,
        }
    }
}

/// The y-coordinate, or only its sign bit for point-compressed keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ec2y {
    Value(Vec<u8>),
    SignBit(bool),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoseKey {
    pub crv: Ec2Curve,
    pub x: Vec<u8>,
    pub y: Ec2y,
}

impl CoseKey {
    pub fn from_cbor_value(value: &Value) -> EngineResult<Self> {
        let Value::Map(entries) = value else {
            return Err(EngineError::Decode("COSE_Key is not a map".into()));
        };
        let field = |label: i128| {
            entries
                .iter()
                .find(|(k, _)| matches!(k, Value::Integer(i) if i128::from(*i) == label))
                .map(|(_, v)| v)
        };

        match field(KTY) {
            Some(Value::Integer(i)) if i128::from(*i) == KTY_EC2 => {}
            _ => return Err(EngineError::Decode("only EC2 COSE_Keys are supported".into())),
        }
        let crv = match field(CRV) {
            Some(Value::Integer(i)) => Ec2Curve::from_id(i128::from(*i))?,
            _ => return Err(EngineError::Decode("COSE_Key missing crv".into())),
        };
        let x = match field(X) {
            Some(Value::Bytes(b)) => b.clone(),
            _ => return Err(EngineError::Decode("COSE_Key missing x coordinate".into())),
        };
        let y = match field(Y) {
            Some(Value::Bytes(b)) => Ec2y::Value(b.clone()),
            Some(Value::Bool(b)) => Ec2y::SignBit(*b),
            _ => return Err(EngineError::Decode("COSE_Key missing y coordinate".into())),
        };
        Ok(Self { crv, x, y })
    }

    pub fn to_cbor_value(&self) -> Value {
        let y = match &self.y {
            Ec2y::Value(v) => Value::Bytes(v.clone()),
            Ec2y::SignBit(b) => Value::Bool(*b),
        };
        Value::Map(vec![
            (Value::Integer(1.into()), Value::Integer(2.into())),
            (Value::Integer((-1).into()), Value::Integer(self.crv.id().into())),
            (Value::Integer((-2).into()), Value::Bytes(self.x.clone())),
            (Value::Integer((-3).into()), y),
        ])
    }

    pub fn to_public_key(&self) -> EngineResult<PKey<Public>> {
        let group = EcGroup::from_curve_name(self.crv.nid())?;
        let mut ctx = BigNumContext::new()?;

        // SEC1 encoding: uncompressed 04||x||y or compressed 02/03||x
        let mut sec1 = Vec::with_capacity(1 + 2 * self.x.len());
        match &self.y {
            Ec2y::Value(y) => {
                sec1.push(0x04);
                sec1.extend_from_slice(&self.x);
                sec1.extend_from_slice(y);
            }
            Ec2y::SignBit(odd) => {
                sec1.push(if *odd { 0x03 } else { 0x02 });
                sec1.extend_from_slice(&self.x);
            }
        }
        let point = EcPoint::from_bytes(&group, &sec1, &mut ctx)
            .map_err(|e| EngineError::Decode(format!("invalid COSE_Key point: {e}")))?;
        let ec = EcKey::from_public_key(&group, &point)?;
        ec.check_key()
            .map_err(|e| EngineError::Decode(format!("COSE_Key not on curve: {e}")))?;
        Ok(PKey::from_ec_key(ec)?)
    }

    pub fn from_public_key<T: HasPublic>(key: &PKeyRef<T>) -> EngineResult<Self> {
        let ec = key.ec_key()?;
        let group = ec.group();
        let nid = group
            .curve_name()
            .ok_or_else(|| EngineError::Config("EC key has no named curve".into()))?;
        let crv = Ec2Curve::from_nid(nid)?;

        let mut ctx = BigNumContext::new()?;
        let mut x = BigNum::new()?;
        let mut y = BigNum::new()?;
        ec.public_key().affine_coordinates(group, &mut x, &mut y, &mut ctx)?;
        let len = crv.coordinate_len() as i32;
        Ok(Self {
            crv,
            x: x.to_vec_padded(len)?,
            y: Ec2y::Value(y.to_vec_padded(len)?),
        })
    }
}
