use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};

use crate::{
    adaptor::{AdaptorProof, AdaptorSignature},
    contract::DiscreteOutcome,
    oracles::{OracleInfo, SchnorrSignature},
};

/// Outcomes travel as their 32-byte hash. Labels never leave the local party.
impl Serialize for DiscreteOutcome {
    fn serialize<S: Serializer>(&self, ser: S) -> Result<S::Ok, S::Error> {
        serdect::array::serialize_hex_lower_or_bin(self.hash(), ser)
    }
}

impl<'de> Deserialize<'de> for DiscreteOutcome {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<DiscreteOutcome, D::Error> {
        let mut hash = [0u8; 32];
        serdect::array::deserialize_hex_or_bin(&mut hash, deserializer)?;
        Ok(DiscreteOutcome::from_hash(hash))
    }
}

/// Implements hex-or-binary serde for a fixed-width type with `serialize()`
/// and `from_slice()` methods.
macro_rules! fixed_width_serde {
    ($type:ty, $size:expr, $expecting:literal) => {
        impl Serialize for $type {
            fn serialize<S: Serializer>(&self, ser: S) -> Result<S::Ok, S::Error> {
                serdect::array::serialize_hex_lower_or_bin(&self.serialize(), ser)
            }
        }

        impl<'de> Deserialize<'de> for $type {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<$type, D::Error> {
                let mut bytes = [0u8; $size];
                serdect::array::deserialize_hex_or_bin(&mut bytes, deserializer)?;
                <$type>::from_slice(&bytes).map_err(|_| {
                    D::Error::invalid_value(serde::de::Unexpected::Bytes(&bytes), &$expecting)
                })
            }
        }
    };
}

fixed_width_serde!(OracleInfo, OracleInfo::SIZE, "a 64-byte oracle pubkey and nonce");
fixed_width_serde!(SchnorrSignature, SchnorrSignature::SIZE, "a 64-byte schnorr signature");
fixed_width_serde!(AdaptorSignature, AdaptorSignature::SIZE, "a 65-byte adaptor signature");
fixed_width_serde!(AdaptorProof, AdaptorProof::SIZE, "a 97-byte DLEQ proof");

pub(crate) mod byte_array {
    use serde::{Deserializer, Serializer};

    pub(crate) fn serialize<S: Serializer, const N: usize>(
        value: &[u8; N],
        ser: S,
    ) -> Result<S::Ok, S::Error> {
        serdect::array::serialize_hex_lower_or_bin(value, ser)
    }

    pub(crate) fn deserialize<'de, D: Deserializer<'de>, const N: usize>(
        deserializer: D,
    ) -> Result<[u8; N], D::Error> {
        let mut bytes = [0u8; N];
        serdect::array::deserialize_hex_or_bin(&mut bytes, deserializer)?;
        Ok(bytes)
    }
}

/// Curve points in 33-byte compressed form. Use this instead of `Point`'s own
/// serde impl, which does not round-trip through binary formats.
pub(crate) mod point {
    use secp::Point;
    use serde::{de::Error as _, Deserializer, Serializer};

    pub(crate) fn serialize<S: Serializer>(point: &Point, ser: S) -> Result<S::Ok, S::Error> {
        serdect::array::serialize_hex_lower_or_bin(&point.serialize(), ser)
    }

    pub(crate) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Point, D::Error> {
        let mut bytes = [0u8; 33];
        serdect::array::deserialize_hex_or_bin(&mut bytes, deserializer)?;
        Point::from_slice(&bytes).map_err(|_| {
            D::Error::invalid_value(
                serde::de::Unexpected::Bytes(&bytes),
                &"a 33-byte compressed curve point",
            )
        })
    }
}

/// A map of outcomes to curve points, with each point encoded by [`point`].
pub(crate) mod outcome_points {
    use secp::Point;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use crate::contract::DiscreteOutcome;

    use std::collections::BTreeMap;

    #[derive(Serialize, Deserialize)]
    struct CompressedPoint(#[serde(with = "super::point")] Point);

    pub(crate) fn serialize<S: Serializer>(
        points: &BTreeMap<DiscreteOutcome, Point>,
        ser: S,
    ) -> Result<S::Ok, S::Error> {
        ser.collect_map(
            points
                .iter()
                .map(|(outcome, &point)| (outcome, CompressedPoint(point))),
        )
    }

    pub(crate) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<DiscreteOutcome, Point>, D::Error> {
        let points = BTreeMap::<DiscreteOutcome, CompressedPoint>::deserialize(deserializer)?;
        Ok(points
            .into_iter()
            .map(|(outcome, CompressedPoint(point))| (outcome, point))
            .collect())
    }
}

/// ECDSA signatures in DER encoding.
pub(crate) mod der_signature {
    use secp256k1::ecdsa;
    use serde::{de::Error as _, Deserializer, Serializer};

    pub(crate) fn serialize<S: Serializer>(
        signature: &ecdsa::Signature,
        ser: S,
    ) -> Result<S::Ok, S::Error> {
        serdect::slice::serialize_hex_lower_or_bin(&signature.serialize_der().to_vec(), ser)
    }

    pub(crate) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<ecdsa::Signature, D::Error> {
        let der = serdect::slice::deserialize_hex_or_bin_vec(deserializer)?;
        ecdsa::Signature::from_der(&der).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        adaptor::adaptor_sign,
        messages::{CetAdaptorSignature, CetSignatures},
    };

    use hex::ToHex;
    use secp::Scalar;
    use std::collections::BTreeMap;

    const ORACLE_INFO_HEX: &str = "e4d36e995ff4bba4da2b60ad907d61d36e120d6f7314a3c2a20c6e27a5cd850f\
                                   f67f8f41718c86f05eb95fab308f5ed788a2a963124299154648f97124caa579";

    #[test]
    fn oracle_info_serialization() {
        let oracle: OracleInfo = ORACLE_INFO_HEX.parse().unwrap();

        let json = serde_json::to_string(&oracle).unwrap();
        assert_eq!(json, format!("\"{}\"", ORACLE_INFO_HEX));
        assert_eq!(serde_json::from_str::<OracleInfo>(&json).unwrap(), oracle);

        let cbor = serde_cbor::to_vec(&oracle).unwrap();
        assert_eq!(serde_cbor::from_slice::<OracleInfo>(&cbor).unwrap(), oracle);

        // Wrong widths are rejected rather than padded.
        let truncated = format!("\"{}\"", &ORACLE_INFO_HEX[..126]);
        assert!(serde_json::from_str::<OracleInfo>(&truncated).is_err());
    }

    #[test]
    fn outcome_serializes_as_hash() {
        let outcome = DiscreteOutcome::new("Republicans");
        let json = serde_json::to_string(&outcome).unwrap();
        assert_eq!(
            json,
            "\"fb84860b10a497deddc3efb45d20786ed72d27cfcf54a09a0e1c04dcef4882a1\""
        );

        let decoded: DiscreteOutcome = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, outcome);
        assert_eq!(decoded.label(), None);
    }

    #[test]
    fn cet_signatures_serialization() {
        let seckey = Scalar::try_from(3).unwrap();
        let outcome = DiscreteOutcome::new("Democrats");
        let encryption_point = Scalar::try_from(5).unwrap().base_point_mul();
        let (signature, proof) = adaptor_sign(seckey, encryption_point, &[9; 32]).unwrap();
        let refund_sig = secp256k1::SECP256K1.sign_ecdsa(
            &secp256k1::Message::from_digest([10; 32]),
            &seckey.into(),
        );

        let sigs = CetSignatures {
            outcome_sigs: BTreeMap::from([(outcome.clone(), CetAdaptorSignature { signature, proof })]),
            refund_sig,
        };

        let json: serde_json::Value = serde_json::to_value(&sigs).unwrap();
        let outcome_hex: String = outcome.hash().encode_hex();
        let entry = &json["outcome_sigs"][&outcome_hex];
        assert_eq!(
            entry["signature"].as_str().unwrap(),
            hex::encode(signature.serialize())
        );
        assert_eq!(entry["proof"].as_str().unwrap().len(), AdaptorProof::SIZE * 2);
        assert_eq!(
            json["refund_sig"].as_str().unwrap(),
            hex::encode(refund_sig.serialize_der())
        );

        let decoded: CetSignatures = serde_json::from_value(json).unwrap();
        assert_eq!(decoded, sigs);

        let cbor = serde_cbor::to_vec(&sigs).unwrap();
        assert_eq!(serde_cbor::from_slice::<CetSignatures>(&cbor).unwrap(), sigs);
    }

    #[test]
    fn invalid_adaptor_signature_is_rejected() {
        // A parity byte other than 0x00 or 0x01.
        let bad = format!("\"02{}\"", "11".repeat(64));
        assert!(serde_json::from_str::<AdaptorSignature>(&bad).is_err());
    }
}
