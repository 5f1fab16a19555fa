//! ECDSA adaptor signatures.
//!
//! An adaptor signature is an ECDSA signature encrypted under some point `Y`.
//! It can be checked against the signer's key and `Y` without knowing
//! the discrete log `y` of `Y`. Anyone who learns `y` can decrypt it into
//! a valid ECDSA signature, and anyone who sees both the adaptor signature
//! and its decrypted form can recover `y`.
//!
//! Each adaptor signature ships with a DLEQ proof showing the encrypted
//! nonce `R = kY` shares its discrete log with the public nonce `R_a = kG`.
//!
//! The signing and verification math is done by `secp256k1-zkp`. This module
//! splits its 162-byte encoding into the signature and proof carried on
//! the wire.

use secp::{MaybeScalar, Point, Scalar};
use secp256k1::{ecdsa, Message, SECP256K1};
use secp256k1_zkp::EcdsaAdaptorSignature;

use crate::errors::Error;

/// Length of the `secp256k1-zkp` encoding: `R || R_a || ŝ || e || s`,
/// with both points compressed.
const ENCRYPTED_SIGNATURE_SIZE: usize = 162;

/// Encode a point as a `0x00`/`0x01` parity byte followed by its X coordinate.
fn encode_parity_point(point: &Point) -> [u8; 33] {
    let mut out = point.serialize();
    out[0] -= 0x02;
    out
}

fn decode_parity_point(bytes: &[u8]) -> Result<Point, Error> {
    let mut compressed = [0u8; 33];
    compressed.copy_from_slice(bytes);
    compressed[0] = match compressed[0] {
        0x00 => 0x02,
        0x01 => 0x03,
        _ => return Err(Error::MalformedCryptoInput("invalid parity byte")),
    };
    Ok(Point::from_slice(&compressed)?)
}

fn maybe_scalar_from_slice(bytes: &[u8]) -> Result<MaybeScalar, Error> {
    if bytes.iter().all(|&b| b == 0) {
        return Ok(MaybeScalar::Zero);
    }
    Ok(MaybeScalar::Valid(Scalar::from_slice(bytes)?))
}

/// An ECDSA signature encrypted under an encryption point `Y`.
///
/// Serialized as 65 bytes: `parity(R) || x(R) || ŝ`, where `R = kY`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdaptorSignature {
    nonce: Point,
    s_hat: Scalar,
}

impl AdaptorSignature {
    pub const SIZE: usize = 65;

    pub fn from_slice(bytes: &[u8]) -> Result<AdaptorSignature, Error> {
        if bytes.len() != Self::SIZE {
            return Err(Error::MalformedCryptoInput("adaptor signature must be 65 bytes"));
        }
        Ok(AdaptorSignature {
            nonce: decode_parity_point(&bytes[..33])?,
            s_hat: Scalar::from_slice(&bytes[33..])?,
        })
    }

    pub fn serialize(&self) -> [u8; 65] {
        let mut out = [0u8; 65];
        out[..33].copy_from_slice(&encode_parity_point(&self.nonce));
        out[33..].copy_from_slice(&self.s_hat.serialize());
        out
    }
}

/// A proof that an [`AdaptorSignature`]'s encrypted nonce was honestly
/// derived. Serialized as 97 bytes: `parity(R_a) || x(R_a) || e || s`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdaptorProof {
    public_nonce: Point,
    e: MaybeScalar,
    s: MaybeScalar,
}

impl AdaptorProof {
    pub const SIZE: usize = 97;

    pub fn from_slice(bytes: &[u8]) -> Result<AdaptorProof, Error> {
        if bytes.len() != Self::SIZE {
            return Err(Error::MalformedCryptoInput("adaptor proof must be 97 bytes"));
        }
        Ok(AdaptorProof {
            public_nonce: decode_parity_point(&bytes[..33])?,
            e: maybe_scalar_from_slice(&bytes[33..65])?,
            s: maybe_scalar_from_slice(&bytes[65..])?,
        })
    }

    pub fn serialize(&self) -> [u8; 97] {
        let mut out = [0u8; 97];
        out[..33].copy_from_slice(&encode_parity_point(&self.public_nonce));
        out[33..65].copy_from_slice(&self.e.serialize());
        out[65..].copy_from_slice(&self.s.serialize());
        out
    }
}

/// Combine a signature and its proof into the `secp256k1-zkp` encoding.
fn join(signature: &AdaptorSignature, proof: &AdaptorProof) -> Result<EcdsaAdaptorSignature, Error> {
    let mut bytes = [0u8; ENCRYPTED_SIGNATURE_SIZE];
    bytes[..33].copy_from_slice(&signature.nonce.serialize());
    bytes[33..66].copy_from_slice(&proof.public_nonce.serialize());
    bytes[66..98].copy_from_slice(&signature.s_hat.serialize());
    bytes[98..130].copy_from_slice(&proof.e.serialize());
    bytes[130..].copy_from_slice(&proof.s.serialize());
    EcdsaAdaptorSignature::from_slice(&bytes)
        .map_err(|_| Error::MalformedCryptoInput("invalid adaptor signature encoding"))
}

fn split(encrypted: &EcdsaAdaptorSignature) -> Result<(AdaptorSignature, AdaptorProof), Error> {
    let bytes: &[u8] = encrypted.as_ref();
    if bytes.len() != ENCRYPTED_SIGNATURE_SIZE {
        return Err(Error::MalformedCryptoInput("invalid adaptor signature encoding"));
    }
    let signature = AdaptorSignature {
        nonce: Point::from_slice(&bytes[..33])?,
        s_hat: Scalar::from_slice(&bytes[66..98])?,
    };
    let proof = AdaptorProof {
        public_nonce: Point::from_slice(&bytes[33..66])?,
        e: maybe_scalar_from_slice(&bytes[98..130])?,
        s: maybe_scalar_from_slice(&bytes[130..])?,
    };
    Ok((signature, proof))
}

/// Decryption and recovery only read `R` and `ŝ`, so the proof slots
/// are filled with placeholders.
fn join_unproven(signature: &AdaptorSignature) -> Result<EcdsaAdaptorSignature, Error> {
    let placeholder = AdaptorProof {
        public_nonce: signature.nonce,
        e: MaybeScalar::Zero,
        s: MaybeScalar::Zero,
    };
    join(signature, &placeholder)
}

/// Sign the 32-byte message hash `msg` with `seckey`, encrypting the
/// signature under `encryption_point`. Deterministic given its inputs.
pub fn adaptor_sign(
    seckey: Scalar,
    encryption_point: Point,
    msg: &[u8; 32],
) -> Result<(AdaptorSignature, AdaptorProof), Error> {
    let encrypted = EcdsaAdaptorSignature::encrypt_no_aux_rand(
        SECP256K1,
        &Message::from_digest(*msg),
        &secp256k1::SecretKey::from(seckey),
        &secp256k1::PublicKey::from(encryption_point),
    );
    split(&encrypted)
}

/// Check that `signature` is an encryption, under `encryption_point`, of
/// a valid ECDSA signature by `pubkey` on `msg`.
pub fn adaptor_verify(
    signature: &AdaptorSignature,
    pubkey: Point,
    msg: &[u8; 32],
    encryption_point: Point,
    proof: &AdaptorProof,
) -> bool {
    let Ok(encrypted) = join(signature, proof) else {
        return false;
    };
    encrypted
        .verify(
            SECP256K1,
            &Message::from_digest(*msg),
            &secp256k1::PublicKey::from(pubkey),
            &secp256k1::PublicKey::from(encryption_point),
        )
        .is_ok()
}

/// Decrypt an adaptor signature with the discrete log of its encryption
/// point. The output is normalized to low-S form.
pub fn adapt(signature: &AdaptorSignature, secret: Scalar) -> Result<ecdsa::Signature, Error> {
    let mut decrypted = join_unproven(signature)?
        .decrypt(&secp256k1::SecretKey::from(secret))
        .map_err(|_| Error::MalformedCryptoInput("cannot decrypt adaptor signature"))?;
    decrypted.normalize_s();
    Ok(decrypted)
}

/// Recover the discrete log of `encryption_point` from an adaptor signature
/// and the ECDSA signature it was decrypted into.
pub fn extract_secret(
    decrypted: &ecdsa::Signature,
    signature: &AdaptorSignature,
    encryption_point: Point,
) -> Result<Scalar, Error> {
    let recovered = join_unproven(signature)?
        .recover(
            SECP256K1,
            decrypted,
            &secp256k1::PublicKey::from(encryption_point),
        )
        .map_err(|_| Error::InvalidAttestation("signature nonce does not match"))?;

    let secret = Scalar::from(recovered);
    if secret.base_point_mul() != encryption_point {
        return Err(Error::InvalidAttestation(
            "recovered secret does not match encryption point",
        ));
    }
    Ok(secret)
}

#[cfg(test)]
mod tests {
    use super::*;
    use secp256k1::{Message, SECP256K1};

    fn verify_ecdsa(signature: &ecdsa::Signature, pubkey: Point, msg: &[u8; 32]) -> bool {
        let pubkey = secp256k1::PublicKey::from_slice(&pubkey.serialize()).unwrap();
        SECP256K1
            .verify_ecdsa(&Message::from_digest(*msg), signature, &pubkey)
            .is_ok()
    }

    #[test]
    fn sign_verify_adapt_extract() {
        let mut rng = rand::thread_rng();
        let seckey = Scalar::random(&mut rng);
        let pubkey = seckey.base_point_mul();
        let secret = Scalar::random(&mut rng);
        let encryption_point = secret.base_point_mul();
        let msg = [0x42u8; 32];

        let (signature, proof) = adaptor_sign(seckey, encryption_point, &msg).unwrap();
        assert!(adaptor_verify(&signature, pubkey, &msg, encryption_point, &proof));

        // Signing is deterministic.
        assert_eq!(
            adaptor_sign(seckey, encryption_point, &msg).unwrap(),
            (signature, proof)
        );

        let decrypted = adapt(&signature, secret).unwrap();
        assert!(verify_ecdsa(&decrypted, pubkey, &msg));

        let recovered = extract_secret(&decrypted, &signature, encryption_point).unwrap();
        assert_eq!(recovered, secret);
    }

    #[test]
    fn wire_encoding_matches_zkp_encoding() {
        let mut rng = rand::thread_rng();
        let seckey = Scalar::random(&mut rng);
        let encryption_point = Scalar::random(&mut rng).base_point_mul();
        let msg = [0x13u8; 32];

        let encrypted = EcdsaAdaptorSignature::encrypt_no_aux_rand(
            SECP256K1,
            &Message::from_digest(msg),
            &secp256k1::SecretKey::from(seckey),
            &secp256k1::PublicKey::from(encryption_point),
        );
        let (signature, proof) = adaptor_sign(seckey, encryption_point, &msg).unwrap();
        assert_eq!(join(&signature, &proof).unwrap(), encrypted);

        let bytes: &[u8] = encrypted.as_ref();
        assert_eq!(signature.serialize()[1..], bytes[1..33]);
        assert_eq!(signature.serialize()[33..], bytes[66..98]);
        assert_eq!(proof.serialize()[33..], bytes[98..]);
    }

    #[test]
    fn verification_rejects_tampering() {
        let mut rng = rand::thread_rng();
        let seckey = Scalar::random(&mut rng);
        let pubkey = seckey.base_point_mul();
        let encryption_point = Scalar::random(&mut rng).base_point_mul();
        let msg = [7u8; 32];

        let (signature, proof) = adaptor_sign(seckey, encryption_point, &msg).unwrap();

        let other_point = Scalar::random(&mut rng).base_point_mul();
        assert!(!adaptor_verify(&signature, other_point, &msg, encryption_point, &proof));
        assert!(!adaptor_verify(&signature, pubkey, &[8u8; 32], encryption_point, &proof));
        assert!(!adaptor_verify(&signature, pubkey, &msg, other_point, &proof));

        // Flip bits in the proof's challenge and response.
        for index in [40, 90] {
            let mut bytes = proof.serialize();
            bytes[index] ^= 0x01;
            if let Ok(tampered) = AdaptorProof::from_slice(&bytes) {
                assert!(!adaptor_verify(&signature, pubkey, &msg, encryption_point, &tampered));
            }
        }

        let mut bytes = signature.serialize();
        bytes[64] ^= 0x01;
        let tampered = AdaptorSignature::from_slice(&bytes).unwrap();
        assert!(!adaptor_verify(&tampered, pubkey, &msg, encryption_point, &proof));
    }

    #[test]
    fn encoding_sizes() {
        assert_eq!(
            AdaptorSignature::from_slice(&[0u8; 64]),
            Err(Error::MalformedCryptoInput("adaptor signature must be 65 bytes"))
        );
        assert_eq!(
            AdaptorProof::from_slice(&[0u8; 98]),
            Err(Error::MalformedCryptoInput("adaptor proof must be 97 bytes"))
        );

        let mut bad_parity = [0u8; 65];
        bad_parity[0] = 0x02;
        assert_eq!(
            AdaptorSignature::from_slice(&bad_parity),
            Err(Error::MalformedCryptoInput("invalid parity byte"))
        );
    }

    #[test]
    fn adapt_and_extract_vectors() {
        let secret = Scalar::from_slice(
            &hex::decode("475697A71A74FF3F2A8F150534E9B67D4B0B6561FAB86FCAA51F8C9D6C9DB8C6")
                .unwrap(),
        )
        .unwrap();
        let signature = AdaptorSignature::from_slice(
            &hex::decode(
                "01099C91AA1FE7F25C41085C1D3C9E73FE04A9D24DAC3F9C2172D6198628E57F47\
                 BB90E2AD6630900B69F55674C8AD74A419E6CE113C10A21A79345A6E47BC74C1",
            )
            .unwrap(),
        )
        .unwrap();

        let decrypted = adapt(&signature, secret).unwrap();
        assert_eq!(
            hex::encode_upper(decrypted.serialize_der()),
            "30440220099C91AA1FE7F25C41085C1D3C9E73FE04A9D24DAC3F9C2172D6198628E57F47\
             02204D13456E98D8989043FD4674302CE90C432E2F8BB0269F02C72AAFEC60B72DE1"
        );

        let encryption_point: Point =
            "038D48057FC4CE150482114D43201B333BF3706F3CD527E8767CEB4B443AB5D349"
                .to_lowercase()
                .parse()
                .unwrap();
        assert_eq!(secret.base_point_mul(), encryption_point);
        assert_eq!(
            extract_secret(&decrypted, &signature, encryption_point).unwrap(),
            secret
        );

        let unrelated = Scalar::random(&mut rand::thread_rng()).base_point_mul();
        assert!(extract_secret(&decrypted, &signature, unrelated).is_err());
    }
}
