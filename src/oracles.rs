use secp::{MaybeScalar, Point, Scalar};

use crate::{contract::DiscreteOutcome, errors::Error};

/// Parse a 32-byte x-only encoding into the curve point with even Y.
pub(crate) fn lift_x(x: &[u8; 32]) -> Result<Point, Error> {
    let mut compressed = [0u8; 33];
    compressed[0] = 0x02;
    compressed[1..].copy_from_slice(x);
    Ok(Point::from_slice(&compressed)?)
}

/// The BIP340 challenge `H(R.x || P.x || m)`.
fn challenge(nonce_x: &[u8; 32], pubkey: &Point, message: &[u8]) -> MaybeScalar {
    musig2::compute_challenge_hash_tweak(nonce_x, pubkey, message)
}

/// The public nonce an oracle commits to ahead of attesting to an event.
/// Always held with even Y, matching its 32-byte x-only encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SchnorrNonce(Point);

impl SchnorrNonce {
    /// Parse a nonce from its x-only encoding.
    pub fn from_xonly(x: &[u8; 32]) -> Result<SchnorrNonce, Error> {
        lift_x(x).map(SchnorrNonce)
    }

    pub fn point(&self) -> Point {
        self.0
    }

    pub fn serialize(&self) -> [u8; 32] {
        self.0.serialize_xonly()
    }
}

impl From<Point> for SchnorrNonce {
    fn from(point: Point) -> Self {
        SchnorrNonce(point.to_even_y())
    }
}

/// Derive the public nonce for a secret nonce scalar.
pub fn create_nonce(secret: Scalar) -> SchnorrNonce {
    SchnorrNonce::from(secret.base_point_mul())
}

/// How the signing nonce of a BIP340 signature is chosen.
#[derive(Clone, Copy, Debug)]
pub enum NonceFunction {
    /// The BIP340 default nonce derivation. An all-zero `aux_rand` makes
    /// signing fully deterministic.
    Bip340 { aux_rand: [u8; 32] },

    /// Use a nonce committed to in advance. An oracle signs with the secret
    /// behind its published [`SchnorrNonce`] so that the signature's
    /// `R` matches the announcement.
    Precomputed(Scalar),
}

impl NonceFunction {
    /// BIP340 nonce derivation with fresh auxiliary randomness.
    pub fn random<R: rand::RngCore + rand::CryptoRng>(rng: &mut R) -> NonceFunction {
        let mut aux_rand = [0u8; 32];
        rng.fill_bytes(&mut aux_rand);
        NonceFunction::Bip340 { aux_rand }
    }
}

impl Default for NonceFunction {
    fn default() -> Self {
        NonceFunction::Bip340 { aux_rand: [0; 32] }
    }
}

/// A 64-byte BIP340 Schnorr signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchnorrSignature {
    rx: [u8; 32],
    s: MaybeScalar,
}

impl SchnorrSignature {
    pub const SIZE: usize = 64;

    pub fn from_slice(bytes: &[u8]) -> Result<SchnorrSignature, Error> {
        if bytes.len() != Self::SIZE {
            return Err(Error::MalformedCryptoInput("schnorr signature must be 64 bytes"));
        }
        let mut rx = [0u8; 32];
        rx.copy_from_slice(&bytes[..32]);
        let s = MaybeScalar::from_slice(&bytes[32..])?;
        Ok(SchnorrSignature { rx, s })
    }

    pub fn serialize(&self) -> [u8; 64] {
        let mut out = [0u8; 64];
        out[..32].copy_from_slice(&self.rx);
        out[32..].copy_from_slice(&self.s.serialize());
        out
    }

    /// The x-coordinate of the signature's nonce point.
    pub fn rx(&self) -> &[u8; 32] {
        &self.rx
    }

    pub fn s(&self) -> MaybeScalar {
        self.s
    }
}

impl From<musig2::CompactSignature> for SchnorrSignature {
    fn from(signature: musig2::CompactSignature) -> Self {
        SchnorrSignature {
            rx: signature.rx,
            s: signature.s,
        }
    }
}

impl From<SchnorrSignature> for musig2::CompactSignature {
    fn from(signature: SchnorrSignature) -> Self {
        musig2::CompactSignature {
            rx: signature.rx,
            s: signature.s,
        }
    }
}

/// Create a BIP340 signature on `message`.
pub fn schnorr_sign(
    seckey: Scalar,
    message: &[u8],
    nonce_fn: NonceFunction,
) -> Result<SchnorrSignature, Error> {
    let k = match nonce_fn {
        NonceFunction::Bip340 { aux_rand } => {
            let signature: musig2::CompactSignature =
                musig2::sign_solo(seckey, message, aux_rand);
            return Ok(signature.into());
        }
        NonceFunction::Precomputed(k) => k,
    };

    let pubkey = seckey.base_point_mul();
    let d = seckey.negate_if(pubkey.parity());

    let nonce_point = k.base_point_mul();
    let k = k.negate_if(nonce_point.parity());
    let rx = nonce_point.serialize_xonly();

    let e = challenge(&rx, &pubkey, message);
    let s = k + e * d;
    Ok(SchnorrSignature { rx, s })
}

/// Verify a BIP340 signature. Only the X coordinate of `pubkey` is used.
pub fn schnorr_verify(pubkey: &Point, signature: &SchnorrSignature, message: &[u8]) -> bool {
    musig2::verify_single(*pubkey, musig2::CompactSignature::from(*signature), message).is_ok()
}

/// The secret an oracle reveals when it attests to an outcome. It is the
/// discrete log of that outcome's signature point, and unlocks the adaptor
/// signatures encrypted under that point.
///
/// Deliberately neither `Clone` nor `Copy`: executing a contract consumes it.
#[derive(PartialEq, Eq)]
pub struct Attestation(Scalar);

impl Attestation {
    pub fn from_secret(secret: Scalar) -> Attestation {
        Attestation(secret)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Attestation, Error> {
        Ok(Attestation(Scalar::from_slice(bytes)?))
    }

    /// The signature point this attestation unlocks.
    pub fn point(&self) -> Point {
        self.0.base_point_mul()
    }

    pub fn serialize(&self) -> [u8; 32] {
        self.0.serialize()
    }

    pub(crate) fn into_secret(self) -> Scalar {
        self.0
    }
}

impl std::fmt::Debug for Attestation {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_tuple("Attestation").field(&self.point()).finish()
    }
}

/// An oracle's public key paired with the nonce it committed to for a
/// single event. Both are x-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OracleInfo {
    pubkey: Point,
    nonce: SchnorrNonce,
}

impl OracleInfo {
    pub const SIZE: usize = 64;

    pub fn new(pubkey: Point, nonce: impl Into<SchnorrNonce>) -> OracleInfo {
        OracleInfo {
            pubkey: pubkey.to_even_y(),
            nonce: nonce.into(),
        }
    }

    /// Parse `pubkey.x || nonce.x`.
    pub fn from_slice(bytes: &[u8]) -> Result<OracleInfo, Error> {
        if bytes.len() != Self::SIZE {
            return Err(Error::MalformedCryptoInput("oracle info must be 64 bytes"));
        }
        let mut pubkey_x = [0u8; 32];
        let mut nonce_x = [0u8; 32];
        pubkey_x.copy_from_slice(&bytes[..32]);
        nonce_x.copy_from_slice(&bytes[32..]);

        Ok(OracleInfo {
            pubkey: lift_x(&pubkey_x)?,
            nonce: SchnorrNonce::from_xonly(&nonce_x)?,
        })
    }

    pub fn serialize(&self) -> [u8; 64] {
        let mut out = [0u8; 64];
        out[..32].copy_from_slice(&self.pubkey.serialize_xonly());
        out[32..].copy_from_slice(&self.nonce.serialize());
        out
    }

    pub fn pubkey(&self) -> Point {
        self.pubkey
    }

    pub fn nonce(&self) -> SchnorrNonce {
        self.nonce
    }

    /// Computes the point `S = R + H(R || P || m)·P` which the oracle's
    /// signature scalar on the given outcome will be the discrete log of.
    /// Returns `None` in the negligible case that `S` is infinity.
    pub fn signature_point(&self, outcome: &DiscreteOutcome) -> Option<Point> {
        let e = challenge(&self.nonce.serialize(), &self.pubkey, outcome.hash());

        // S = R + eP
        (self.nonce.point() + e * self.pubkey).not_inf().ok()
    }

    /// Sign an outcome as the oracle, using the committed nonce. Fails if
    /// the keys given do not match this announcement.
    pub fn attest(
        &self,
        oracle_seckey: Scalar,
        nonce_secret: Scalar,
        outcome: &DiscreteOutcome,
    ) -> Result<SchnorrSignature, Error> {
        if oracle_seckey.base_point_mul().to_even_y() != self.pubkey
            || nonce_secret.base_point_mul().to_even_y() != self.nonce.point()
        {
            return Err(Error::InvalidAttestation("keys do not match oracle info"));
        }
        schnorr_sign(
            oracle_seckey,
            outcome.hash(),
            NonceFunction::Precomputed(nonce_secret),
        )
    }

    /// Check an oracle signature over the given outcome.
    pub fn verify_attestation(&self, outcome: &DiscreteOutcome, signature: &SchnorrSignature) -> bool {
        signature.rx == self.nonce.serialize()
            && schnorr_verify(&self.pubkey, signature, outcome.hash())
    }

    /// Recover the attestation secret from an oracle's signature on `outcome`.
    pub fn extract_attestation(
        &self,
        outcome: &DiscreteOutcome,
        signature: &SchnorrSignature,
    ) -> Result<Attestation, Error> {
        if signature.rx != self.nonce.serialize() {
            return Err(Error::InvalidAttestation("signature does not use the oracle nonce"));
        }
        let secret = signature
            .s
            .not_zero()
            .map_err(|_| Error::InvalidAttestation("zero signature scalar"))?;
        let sigpoint = self
            .signature_point(outcome)
            .ok_or(Error::InvalidAttestation("outcome has no signature point"))?;

        if secret.base_point_mul() != sigpoint {
            return Err(Error::InvalidAttestation("signature does not match outcome"));
        }
        Ok(Attestation(secret))
    }
}

impl std::fmt::Display for OracleInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(&hex::encode(self.serialize()))
    }
}

impl std::str::FromStr for OracleInfo {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 64];
        hex::decode_to_slice(s, &mut bytes)
            .map_err(|_| Error::MalformedCryptoInput("oracle info must be 64 hex-encoded bytes"))?;
        OracleInfo::from_slice(&bytes)
    }
}
