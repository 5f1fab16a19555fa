//! Two-party Discreet Log Contracts on Bitcoin.
//!
//! Two parties lock collateral in a 2-of-2 funding output and pre-sign one
//! contract execution transaction (CET) per possible outcome of an oracle
//! event. Each CET signature is an ECDSA adaptor signature encrypted under
//! the point which the oracle's attestation to that outcome will unlock.
//! Once the oracle attests, the winning CET can be completed and published.
//! A refund transaction returns each party's collateral if the oracle never
//! attests.
//!
//! The negotiation itself is driven by [`DlcSession`].

mod errors;
mod serialization;
pub(crate) mod spend_info;

pub mod adaptor;
pub mod consts;
pub mod contract;
pub mod hashing;
pub mod messages;
pub mod oracles;
pub mod session;

pub use bitcoin;
pub use musig2;
pub use secp;
pub use secp256k1;

pub use contract::{
    fill_outcomes, validate_contract_info,
    funding::{sign_p2wpkh_inputs, FundingInput, FundingSignature, FundingTemplate},
    payoffs::{DiscretePayoff, DiscretePayoffs},
    ContractInfo, ContractParameters, ContractTransactions, DiscreteOutcome, EventId,
    PartyParams, Timeouts,
};
pub use errors::Error;
pub use messages::{Accept, CetAdaptorSignature, CetSignatures, Offer, Sign};
pub use oracles::{
    create_nonce, schnorr_sign, schnorr_verify, Attestation, NonceFunction, OracleInfo,
    SchnorrNonce, SchnorrSignature,
};
pub use session::{Acceptor, DlcSession, Initiator, Role};
