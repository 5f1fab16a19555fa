use bitcoin::Amount;

/// Every failure the protocol engine can report. Variants carry a short
/// static reason describing which check failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// A point, scalar, signature or proof had the wrong size or encoding.
    #[error("malformed cryptographic input: {0}")]
    MalformedCryptoInput(&'static str),

    /// Contract terms are internally inconsistent.
    #[error("invalid contract: {0}")]
    InvalidContract(&'static str),

    /// A party's funding inputs cannot cover its collateral plus fees.
    #[error("insufficient collateral: required {required}, available {available}")]
    InsufficientCollateral { required: Amount, available: Amount },

    /// A received offer or acceptance failed validation.
    #[error("rejected offer: {0}")]
    RejectedOffer(&'static str),

    /// A counterparty adaptor or refund signature did not verify.
    #[error("invalid remote signature: {0}")]
    InvalidRemoteSignature(&'static str),

    /// Funding inputs are missing witness data, or carry an invalid witness.
    #[error("incomplete funding: {0}")]
    IncompleteFunding(&'static str),

    /// An attestation matches none of the contract's outcomes.
    #[error("attestation does not match any contract outcome")]
    UnknownOutcome,

    /// A transaction or key is not one of this contract's.
    #[error("not our contract: {0}")]
    NotOurContract(&'static str),

    /// A signature could not yield a valid oracle attestation.
    #[error("invalid attestation: {0}")]
    InvalidAttestation(&'static str),
}

impl From<secp::errors::InvalidPointBytes> for Error {
    fn from(_: secp::errors::InvalidPointBytes) -> Self {
        Error::MalformedCryptoInput("invalid point encoding")
    }
}

impl From<secp::errors::InvalidScalarBytes> for Error {
    fn from(_: secp::errors::InvalidScalarBytes) -> Self {
        Error::MalformedCryptoInput("invalid scalar encoding")
    }
}

impl From<secp::errors::ZeroScalarError> for Error {
    fn from(_: secp::errors::ZeroScalarError) -> Self {
        Error::MalformedCryptoInput("scalar is zero")
    }
}

impl From<secp::errors::InfinityPointError> for Error {
    fn from(_: secp::errors::InfinityPointError) -> Self {
        Error::MalformedCryptoInput("point at infinity")
    }
}

impl From<secp256k1::Error> for Error {
    fn from(_: secp256k1::Error) -> Self {
        Error::MalformedCryptoInput("invalid secp256k1 encoding")
    }
}

impl From<bitcoin::sighash::Error> for Error {
    fn from(_: bitcoin::sighash::Error) -> Self {
        Error::InvalidContract("failed to compute sighash")
    }
}
