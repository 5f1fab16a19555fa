//! The records two parties exchange to negotiate a contract.

use bitcoin::{Amount, FeeRate, ScriptBuf};
use secp::Point;
use secp256k1::ecdsa;
use serde::{Deserialize, Serialize};

use crate::{
    adaptor::{AdaptorProof, AdaptorSignature},
    contract::{
        fill_outcomes,
        funding::{FundingInput, FundingSignature},
        ContractInfo, ContractParameters, DiscreteOutcome, EventId, PartyParams, Timeouts,
    },
    errors::Error,
    oracles::OracleInfo,
};

use std::collections::BTreeMap;

/// An adaptor signature on one CET, with the proof that it is encrypted
/// under that outcome's signature point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CetAdaptorSignature {
    pub signature: AdaptorSignature,
    pub proof: AdaptorProof,
}

/// One party's signatures on every execution transaction of a contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CetSignatures {
    /// Keyed by outcome hash.
    pub outcome_sigs: BTreeMap<DiscreteOutcome, CetAdaptorSignature>,

    #[serde(with = "crate::serialization::der_signature")]
    pub refund_sig: ecdsa::Signature,
}

/// Sent by the offerer to propose a contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offer {
    pub oracle_info: OracleInfo,
    pub contract_info: Vec<ContractInfo>,
    pub timeouts: Timeouts,
    pub fee_rate: FeeRate,

    /// The collateral posted by the offerer.
    pub total_collateral: Amount,

    #[serde(with = "crate::serialization::point")]
    pub funding_pubkey: Point,
    pub payout_script: ScriptBuf,
    pub funding_inputs: Vec<FundingInput>,
    pub change_script: ScriptBuf,
    pub event_id: EventId,
}

impl Offer {
    /// Restore the labels of outcomes which arrived as bare hashes. Every
    /// outcome must match exactly one of `labels`, and every label must be
    /// used.
    pub fn set_contract_preimages<S: AsRef<str>>(&mut self, labels: &[S]) -> Result<(), Error> {
        fill_outcomes(&mut self.contract_info, labels)
    }

    /// The event ID implied by the offer's oracle and outcomes, which must
    /// match the one it carries.
    pub fn computed_event_id(&self) -> EventId {
        EventId::new(
            &self.oracle_info,
            self.contract_info.iter().map(|info| &info.outcome),
        )
    }

    pub(crate) fn party_params(&self) -> PartyParams {
        PartyParams {
            funding_pubkey: self.funding_pubkey,
            payout_script: self.payout_script.clone(),
            funding_inputs: self.funding_inputs.clone(),
            change_script: self.change_script.clone(),
            total_collateral: self.total_collateral,
        }
    }

    /// Combine this offer with the acceptor's side of the contract.
    pub(crate) fn contract_parameters(&self, acceptor: PartyParams) -> ContractParameters {
        ContractParameters {
            oracle_info: self.oracle_info,
            contract_info: self.contract_info.clone(),
            timeouts: self.timeouts,
            fee_rate: self.fee_rate,
            offerer: self.party_params(),
            acceptor,
        }
    }
}

/// Sent by the acceptor in reply to an [`Offer`], carrying its half of the
/// funding transaction and its signatures on every CET.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Accept {
    /// The collateral posted by the acceptor.
    pub total_collateral: Amount,

    #[serde(with = "crate::serialization::point")]
    pub funding_pubkey: Point,
    pub payout_script: ScriptBuf,
    pub funding_inputs: Vec<FundingInput>,
    pub change_script: ScriptBuf,
    pub cet_sigs: CetSignatures,
    pub event_id: EventId,
}

impl Accept {
    pub(crate) fn party_params(&self) -> PartyParams {
        PartyParams {
            funding_pubkey: self.funding_pubkey,
            payout_script: self.payout_script.clone(),
            funding_inputs: self.funding_inputs.clone(),
            change_script: self.change_script.clone(),
            total_collateral: self.total_collateral,
        }
    }
}

/// Sent by the offerer once the acceptor's signatures check out. Carries
/// the offerer's CET signatures and its funding input witnesses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sign {
    pub cet_sigs: CetSignatures,
    pub funding_sigs: Vec<FundingSignature>,
    pub event_id: EventId,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashing::sha256;

    fn offer() -> Offer {
        let oracle_info: OracleInfo =
            "e4d36e995ff4bba4da2b60ad907d61d36e120d6f7314a3c2a20c6e27a5cd850f\
             f67f8f41718c86f05eb95fab308f5ed788a2a963124299154648f97124caa579"
                .parse()
                .unwrap();
        let contract_info: Vec<ContractInfo> = ["Republicans_win", "Democrats_win", "other"]
            .into_iter()
            .zip([200_000_000, 0, 100_000_000])
            .map(|(label, sats)| ContractInfo {
                outcome: DiscreteOutcome::from_hash(sha256(label.as_bytes())),
                payout: Amount::from_sat(sats),
            })
            .collect();

        let event_id = EventId::new(&oracle_info, contract_info.iter().map(|info| &info.outcome));
        Offer {
            oracle_info,
            contract_info,
            timeouts: Timeouts {
                contract_maturity: 100,
                contract_timeout: 200,
            },
            fee_rate: FeeRate::from_sat_per_vb_unchecked(1),
            total_collateral: Amount::from_sat(100_000_000),
            funding_pubkey: secp::Scalar::try_from(7).unwrap().base_point_mul(),
            payout_script: ScriptBuf::new(),
            funding_inputs: Vec::new(),
            change_script: ScriptBuf::new(),
            event_id,
        }
    }

    #[test]
    fn set_contract_preimages() {
        let mut offer = offer();
        let original = offer.clone();

        assert!(offer
            .set_contract_preimages(&["Republicans_win", "Democrats_win"])
            .is_err());
        assert!(offer
            .set_contract_preimages(&["Republicans_win", "Democrats_win", "Smith"])
            .is_err());
        assert_eq!(offer, original);

        offer
            .set_contract_preimages(&["other", "Democrats_win", "Republicans_win"])
            .unwrap();
        assert_eq!(offer.contract_info[0].outcome.label(), Some("Republicans_win"));
        assert_eq!(offer.contract_info[2].outcome.label(), Some("other"));

        // Labels don't change the event.
        assert_eq!(offer.computed_event_id(), offer.event_id);
    }

    #[test]
    fn offer_round_trips_through_json() {
        let offer = offer();
        let json = serde_json::to_string(&offer).unwrap();
        let decoded: Offer = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, offer);
        assert!(decoded.contract_info.iter().all(|info| info.outcome.label().is_none()));
    }

    #[test]
    fn offer_round_trips_through_cbor() {
        let offer = offer();
        let cbor = serde_cbor::to_vec(&offer).unwrap();
        let decoded: Offer = serde_cbor::from_slice(&cbor).unwrap();
        assert_eq!(decoded, offer);
        assert_eq!(decoded.funding_pubkey, offer.funding_pubkey);
    }
}
