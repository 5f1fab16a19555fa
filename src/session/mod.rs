//! The two-party negotiation, modeled as a typestate machine.
//!
//! A [`DlcSession`] is parameterized by its [`Role`] and its current state.
//! Each transition borrows the session and returns a new one, so a failed
//! transition leaves the caller's session exactly as it was, and a call
//! which makes no sense for a given role or state does not compile.
//!
//! ```text
//! Initiator: New -offer-> Proposed -fund_offer-> Offered -sign1-> Accepted -sign2-> Signed
//! Acceptor:  New -accept-> Offered -fund_accept-> Accepted -finalize1-> Signed -finalize-> Funded
//! Either:    Signed/Funded -execute-> Executed
//! ```

mod states;

pub use states::{Accepted, Executed, Funded, New, Offered, Proposed, Signed, SignedContract};

use bitcoin::{Amount, FeeRate, ScriptBuf, Transaction};
use secp::{Point, Scalar};
use serde::{Serialize, Serializer};
use tracing::{debug, warn};

use std::marker::PhantomData;

use crate::{
    contract::{
        funding::{self, FundingSignature, FundingTemplate},
        outcome,
        payoffs::DiscretePayoffs,
        validate_contract_info, ContractTransactions, DiscreteOutcome, EventId, PartyParams,
        Timeouts,
    },
    errors::Error,
    messages::{Accept, CetSignatures, Offer, Sign},
    oracles::{Attestation, OracleInfo},
};

mod sealed {
    pub trait Sealed {}
}

/// Which side of the negotiation a session plays.
pub trait Role: sealed::Sealed {
    const IS_OFFERER: bool;
    const NAME: &'static str;
}

/// The party who proposes the contract and sends the [`Offer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Initiator;

/// The party who replies to an [`Offer`] with an [`Accept`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Acceptor;

impl sealed::Sealed for Initiator {}
impl sealed::Sealed for Acceptor {}

impl Role for Initiator {
    const IS_OFFERER: bool = true;
    const NAME: &'static str = "initiator";
}

impl Role for Acceptor {
    const IS_OFFERER: bool = false;
    const NAME: &'static str = "acceptor";
}

pub trait SessionState: sealed::Sealed + Serialize {}

/// States in which every contract transaction is known.
pub trait HasTransactions: SessionState {
    fn transactions(&self) -> &ContractTransactions;
}

/// States in which both parties' signatures have been exchanged and verified.
pub trait ContractSigned: HasTransactions {
    fn signed_contract(&self) -> &SignedContract;
}

/// States from which the contract can still be executed or refunded.
pub trait Executable: ContractSigned {}

/// A single contract negotiation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DlcSession<R: Role, S: SessionState> {
    state: S,
    role: PhantomData<R>,
}

#[derive(Serialize)]
struct SessionExport<'a, S> {
    role: &'static str,
    state: &'a S,
}

impl<R: Role, S: SessionState> Serialize for DlcSession<R, S> {
    fn serialize<Ser: Serializer>(&self, ser: Ser) -> Result<Ser::Ok, Ser::Error> {
        SessionExport {
            role: R::NAME,
            state: &self.state,
        }
        .serialize(ser)
    }
}

impl<R: Role, S: SessionState> DlcSession<R, S> {
    fn from_state(state: S) -> DlcSession<R, S> {
        DlcSession {
            state,
            role: PhantomData,
        }
    }

    pub fn state(&self) -> &S {
        &self.state
    }
}

fn rejected(reason: &'static str) -> Error {
    warn!(reason, "rejected counterparty message");
    Error::RejectedOffer(reason)
}

fn verify_remote_signatures(
    transactions: &ContractTransactions,
    signer_pubkey: Point,
    signatures: &CetSignatures,
) -> Result<(), Error> {
    outcome::verify_cet_signatures(transactions, signer_pubkey, signatures).map_err(|err| {
        warn!(%err, "rejected counterparty CET signatures");
        err
    })
}

/// The acceptor's required stake: the worst loss it can suffer.
fn acceptor_collateral(offer: &Offer) -> Result<Amount, Error> {
    let payoffs = DiscretePayoffs::counterparty_view(&offer.contract_info, offer.total_collateral)?;
    Ok(payoffs.calculate_minimum_collateral())
}

/// Checks an offer is internally consistent, returning the acceptor's view
/// of its payoffs.
fn validate_offer(offer: &Offer) -> Result<DiscretePayoffs, Error> {
    if offer.event_id != offer.computed_event_id() {
        return Err(rejected("event id does not match offered contract"));
    }
    offer
        .timeouts
        .validate()
        .map_err(|_| rejected("invalid timeouts"))?;
    if offer.fee_rate == FeeRate::ZERO {
        return Err(rejected("zero fee rate"));
    }

    let payoffs = DiscretePayoffs::counterparty_view(&offer.contract_info, offer.total_collateral)
        .map_err(|_| rejected("invalid contract info"))?;
    let pot = offer
        .total_collateral
        .checked_add(payoffs.calculate_minimum_collateral())
        .ok_or_else(|| rejected("total collateral overflows"))?;
    validate_contract_info(&offer.contract_info, pot)
        .map_err(|_| rejected("invalid contract info"))?;

    Ok(payoffs)
}

impl<R: Role> DlcSession<R, New> {
    pub fn new() -> DlcSession<R, New> {
        DlcSession::from_state(New::default())
    }

    /// Start a session which uses `funding_tx` in place of the funding
    /// transaction it would otherwise build. It must spend the same inputs
    /// and pay every output the contract calls for.
    pub fn with_funding_override(funding_tx: Transaction) -> DlcSession<R, New> {
        DlcSession::from_state(New {
            funding_override: Some(funding_tx),
        })
    }
}

impl<R: Role> Default for DlcSession<R, New> {
    fn default() -> Self {
        DlcSession::new()
    }
}

impl DlcSession<Initiator, New> {
    /// Propose a contract paying out according to `payoffs`, which are
    /// gains and losses relative to the initiator's collateral. Returns the
    /// collateral the initiator must post: the least which covers every loss.
    pub fn offer(
        &self,
        oracle_info: OracleInfo,
        payoffs: &DiscretePayoffs,
        timeouts: Timeouts,
        fee_rate: FeeRate,
    ) -> Result<(DlcSession<Initiator, Proposed>, Amount), Error> {
        timeouts.validate()?;
        if fee_rate == FeeRate::ZERO {
            return Err(Error::InvalidContract("fee rate must be non-zero"));
        }
        if payoffs.iter().any(|payoff| payoff.outcome.label().is_none()) {
            return Err(Error::InvalidContract("outcome has no label"));
        }

        let collateral = payoffs.calculate_minimum_collateral();
        let contract_info = payoffs.to_contract_info(collateral)?;
        let pot = contract_info
            .iter()
            .map(|info| info.payout)
            .fold(collateral, Amount::max);
        if pot == Amount::ZERO {
            return Err(Error::InvalidContract("contract has nothing at stake"));
        }
        validate_contract_info(&contract_info, pot)?;

        debug!(
            role = Initiator::NAME,
            outcomes = contract_info.len(),
            %collateral,
            %pot,
            "proposed contract"
        );

        let proposed = Proposed {
            funding_override: self.state.funding_override.clone(),
            oracle_info,
            contract_info,
            timeouts,
            fee_rate,
            collateral,
        };
        Ok((DlcSession::from_state(proposed), collateral))
    }
}

impl DlcSession<Initiator, Proposed> {
    /// Attach the initiator's funding to the proposed contract, producing
    /// the [`Offer`] to send to the acceptor.
    pub fn fund_offer(
        &self,
        funding_pubkey: Point,
        payout_script: ScriptBuf,
        funding: FundingTemplate,
    ) -> Result<(DlcSession<Initiator, Offered>, Offer), Error> {
        let state = &self.state;
        funding::check_offerer_template(
            state.fee_rate,
            state.collateral,
            &payout_script,
            &funding,
        )?;

        let event_id = EventId::new(
            &state.oracle_info,
            state.contract_info.iter().map(|info| &info.outcome),
        );

        let offer = Offer {
            oracle_info: state.oracle_info,
            contract_info: state.contract_info.clone(),
            timeouts: state.timeouts,
            fee_rate: state.fee_rate,
            total_collateral: state.collateral,
            funding_pubkey,
            payout_script,
            funding_inputs: funding.inputs,
            change_script: funding.change_script,
            event_id,
        };

        debug!(
            role = Initiator::NAME,
            %event_id,
            inputs = offer.funding_inputs.len(),
            "funded offer"
        );

        let offered = Offered {
            funding_override: state.funding_override.clone(),
            offer: offer.clone(),
        };
        Ok((DlcSession::from_state(offered), offer))
    }
}

impl DlcSession<Acceptor, New> {
    /// Validate a received offer. Returns the acceptor's payoffs, whose
    /// minimum collateral is the stake the acceptor must post.
    ///
    /// If `collateral` is given, the offer is rejected unless it asks the
    /// acceptor for exactly that much.
    pub fn accept(
        &self,
        offer: &Offer,
        collateral: Option<Amount>,
    ) -> Result<(DlcSession<Acceptor, Offered>, DiscretePayoffs), Error> {
        let payoffs = validate_offer(offer)?;

        let required = payoffs.calculate_minimum_collateral();
        if collateral.is_some_and(|collateral| collateral != required) {
            return Err(rejected("collateral does not match offer"));
        }

        debug!(
            role = Acceptor::NAME,
            event_id = %offer.event_id,
            collateral = %required,
            "accepted offer"
        );

        let offered = Offered {
            funding_override: self.state.funding_override.clone(),
            offer: offer.clone(),
        };
        Ok((DlcSession::from_state(offered), payoffs))
    }
}

impl DlcSession<Acceptor, Offered> {
    /// Attach the acceptor's funding, build every contract transaction, and
    /// sign each CET and the refund transaction with `seckey`.
    pub fn fund_accept(
        &self,
        seckey: Scalar,
        payout_script: ScriptBuf,
        funding: FundingTemplate,
    ) -> Result<(DlcSession<Acceptor, Accepted>, Accept), Error> {
        let offer = &self.state.offer;
        let acceptor = PartyParams::new(
            seckey.base_point_mul(),
            payout_script,
            funding,
            acceptor_collateral(offer)?,
        );
        let params = offer.contract_parameters(acceptor);

        let transactions =
            ContractTransactions::build(&params, self.state.funding_override.as_ref())?;
        let cet_sigs = outcome::sign_cets(&transactions, seckey)?;

        let PartyParams {
            funding_pubkey,
            payout_script,
            funding_inputs,
            change_script,
            total_collateral,
        } = params.acceptor;

        let accept = Accept {
            total_collateral,
            funding_pubkey,
            payout_script,
            funding_inputs,
            change_script,
            cet_sigs,
            event_id: offer.event_id,
        };

        debug!(
            role = Acceptor::NAME,
            funding_txid = %transactions.funding_tx().txid(),
            cets = transactions.cets().len(),
            "signed CETs for acceptance"
        );

        let accepted = Accepted {
            funding_override: self.state.funding_override.clone(),
            offer: offer.clone(),
            accept: accept.clone(),
            transactions,
        };
        Ok((DlcSession::from_state(accepted), accept))
    }
}

impl DlcSession<Initiator, Offered> {
    /// Verify the acceptor's reply. Every CET signature and the refund
    /// signature must verify, or the whole message is rejected.
    pub fn sign1(&self, accept: &Accept) -> Result<DlcSession<Initiator, Accepted>, Error> {
        let offer = &self.state.offer;
        if accept.event_id != offer.event_id {
            return Err(rejected("event id does not match offer"));
        }
        if accept.total_collateral != acceptor_collateral(offer)? {
            return Err(rejected("acceptor collateral does not match offer"));
        }

        let params = offer.contract_parameters(accept.party_params());
        let transactions =
            ContractTransactions::build(&params, self.state.funding_override.as_ref())?;
        verify_remote_signatures(&transactions, accept.funding_pubkey, &accept.cet_sigs)?;

        debug!(
            role = Initiator::NAME,
            funding_txid = %transactions.funding_tx().txid(),
            "verified acceptor signatures"
        );

        let accepted = Accepted {
            funding_override: self.state.funding_override.clone(),
            offer: offer.clone(),
            accept: accept.clone(),
            transactions,
        };
        Ok(DlcSession::from_state(accepted))
    }
}

impl DlcSession<Initiator, Accepted> {
    /// Sign every CET and the refund transaction, and bundle the
    /// initiator's own funding input witnesses into a [`Sign`] message.
    pub fn sign2(
        &self,
        seckey: Scalar,
        funding_sigs: &[FundingSignature],
    ) -> Result<(DlcSession<Initiator, Signed>, Sign), Error> {
        let Accepted {
            offer,
            accept,
            transactions,
            ..
        } = &self.state;

        if seckey.base_point_mul() != offer.funding_pubkey {
            return Err(Error::NotOurContract("key does not match offered funding pubkey"));
        }
        funding::verify_funding_signatures(
            transactions.funding_tx(),
            &offer.funding_inputs,
            funding_sigs,
        )?;

        let cet_sigs = outcome::sign_cets(transactions, seckey)?;
        let funding_sigs: Vec<FundingSignature> = offer
            .funding_inputs
            .iter()
            .filter_map(|input| {
                funding_sigs
                    .iter()
                    .find(|sig| sig.outpoint == input.outpoint)
                    .cloned()
            })
            .collect();

        let sign = Sign {
            cet_sigs,
            funding_sigs,
            event_id: offer.event_id,
        };

        debug!(role = Initiator::NAME, "signed contract");

        let signed = Signed {
            contract: SignedContract {
                offer: offer.clone(),
                accept: accept.clone(),
                sign: sign.clone(),
                transactions: transactions.clone(),
            },
        };
        Ok((DlcSession::from_state(signed), sign))
    }
}

impl DlcSession<Acceptor, Accepted> {
    /// Verify the initiator's signatures: every CET signature, the refund
    /// signature, and the initiator's funding input witnesses.
    pub fn finalize1(&self, sign: &Sign) -> Result<DlcSession<Acceptor, Signed>, Error> {
        let Accepted {
            offer,
            accept,
            transactions,
            ..
        } = &self.state;

        if sign.event_id != offer.event_id {
            return Err(rejected("event id does not match offer"));
        }
        verify_remote_signatures(transactions, offer.funding_pubkey, &sign.cet_sigs)?;
        funding::verify_funding_signatures(
            transactions.funding_tx(),
            &offer.funding_inputs,
            &sign.funding_sigs,
        )?;

        debug!(role = Acceptor::NAME, "verified initiator signatures");

        let signed = Signed {
            contract: SignedContract {
                offer: offer.clone(),
                accept: accept.clone(),
                sign: sign.clone(),
                transactions: transactions.clone(),
            },
        };
        Ok(DlcSession::from_state(signed))
    }
}

impl DlcSession<Acceptor, Signed> {
    /// Merge the acceptor's funding input witnesses with the initiator's,
    /// producing the fully signed funding transaction.
    pub fn finalize(
        &self,
        funding_sigs: &[FundingSignature],
    ) -> Result<(DlcSession<Acceptor, Funded>, Transaction), Error> {
        let contract = &self.state.contract;
        let unsigned_tx = contract.transactions.funding_tx();

        funding::verify_funding_signatures(
            unsigned_tx,
            &contract.accept.funding_inputs,
            funding_sigs,
        )?;
        let funding_tx = funding::apply_funding_signatures(
            unsigned_tx,
            contract.sign.funding_sigs.iter().chain(funding_sigs),
        )?;

        debug!(
            role = Acceptor::NAME,
            funding_txid = %funding_tx.txid(),
            "finalized funding transaction"
        );

        let funded = Funded {
            contract: contract.clone(),
            funding_tx: funding_tx.clone(),
        };
        Ok((DlcSession::from_state(funded), funding_tx))
    }
}

impl<R: Role> DlcSession<R, Signed> {
    /// Restore a signed session from the three messages of a negotiation,
    /// re-verifying every signature they carry.
    pub fn from_messages(
        offer: &Offer,
        accept: &Accept,
        sign: &Sign,
        funding_override: Option<&Transaction>,
    ) -> Result<DlcSession<R, Signed>, Error> {
        validate_offer(offer)?;
        if accept.event_id != offer.event_id || sign.event_id != offer.event_id {
            return Err(rejected("event id does not match offer"));
        }
        if accept.total_collateral != acceptor_collateral(offer)? {
            return Err(rejected("acceptor collateral does not match offer"));
        }

        let params = offer.contract_parameters(accept.party_params());
        let transactions = ContractTransactions::build(&params, funding_override)?;
        verify_remote_signatures(&transactions, accept.funding_pubkey, &accept.cet_sigs)?;
        verify_remote_signatures(&transactions, offer.funding_pubkey, &sign.cet_sigs)?;
        funding::verify_funding_signatures(
            transactions.funding_tx(),
            &offer.funding_inputs,
            &sign.funding_sigs,
        )?;

        debug!(role = R::NAME, "restored signed contract");

        Ok(DlcSession::from_state(Signed {
            contract: SignedContract {
                offer: offer.clone(),
                accept: accept.clone(),
                sign: sign.clone(),
                transactions,
            },
        }))
    }

    /// Record that a fully witnessed funding transaction for this contract
    /// exists, e.g. one the counterparty finalized and broadcast.
    pub fn mark_funded(&self, funding_tx: &Transaction) -> Result<DlcSession<R, Funded>, Error> {
        let contract = &self.state.contract;
        if funding_tx.txid() != contract.transactions.funding_tx().txid() {
            return Err(Error::NotOurContract("not this contract's funding transaction"));
        }
        if funding_tx.input.iter().any(|txin| txin.witness.is_empty()) {
            return Err(Error::IncompleteFunding("funding input is missing a witness"));
        }

        Ok(DlcSession::from_state(Funded {
            contract: contract.clone(),
            funding_tx: funding_tx.clone(),
        }))
    }
}

impl<R: Role, S: HasTransactions> DlcSession<R, S> {
    pub fn contract_transactions(&self) -> &ContractTransactions {
        self.state.transactions()
    }

    /// The funding transaction, without witnesses.
    pub fn unsigned_funding_transaction(&self) -> Transaction {
        self.state.transactions().funding_tx().clone()
    }

    /// The unsigned CET which pays out according to `outcome`.
    pub fn build_cet(&self, outcome: &DiscreteOutcome) -> Result<Transaction, Error> {
        self.state
            .transactions()
            .cet(outcome)
            .cloned()
            .ok_or(Error::UnknownOutcome)
    }

    /// The unsigned refund transaction.
    pub fn refund_transaction(&self) -> Transaction {
        self.state.transactions().refund_tx().clone()
    }
}

impl<R: Role, S: ContractSigned> DlcSession<R, S> {
    pub fn signed_contract(&self) -> &SignedContract {
        self.state.signed_contract()
    }

    /// Recover the oracle's attestation from a CET published by either
    /// party.
    pub fn extract_attestation(
        &self,
        cet: &Transaction,
    ) -> Result<(DiscreteOutcome, Attestation), Error> {
        let contract = self.state.signed_contract();
        let (outcome, secret) = outcome::extract_attestation_secret(
            &contract.transactions,
            cet,
            &contract.sign.cet_sigs,
            &contract.accept.cet_sigs,
        )?;

        debug!(role = R::NAME, %outcome, "extracted attestation");
        Ok((outcome, Attestation::from_secret(secret)))
    }
}

impl<R: Role, S: Executable> DlcSession<R, S> {
    fn check_own_key(&self, seckey: Scalar) -> Result<&CetSignatures, Error> {
        let (own_pubkey, their_sigs) = self.state.signed_contract().party_view(R::IS_OFFERER);
        if seckey.base_point_mul() != own_pubkey {
            return Err(Error::NotOurContract("key does not match our funding pubkey"));
        }
        Ok(their_sigs)
    }

    /// Complete the CET for whichever outcome `attestation` unlocks, by
    /// decrypting the counterparty's adaptor signature on it.
    pub fn execute(
        &self,
        seckey: Scalar,
        attestation: Attestation,
    ) -> Result<(DlcSession<R, Executed>, Transaction), Error> {
        let their_sigs = self.check_own_key(seckey)?;
        let contract = self.state.signed_contract();
        let transactions = &contract.transactions;

        let outcome = transactions
            .outcome_for_point(attestation.point())
            .ok_or(Error::UnknownOutcome)?
            .clone();
        let their_sig = their_sigs
            .outcome_sigs
            .get(&outcome)
            .ok_or(Error::UnknownOutcome)?;

        let cet = outcome::complete_cet(
            transactions,
            &outcome,
            seckey,
            R::IS_OFFERER,
            their_sig,
            attestation.into_secret(),
        )?;

        debug!(role = R::NAME, %outcome, cet_txid = %cet.txid(), "executed contract");

        let executed = Executed {
            contract: contract.clone(),
            outcome,
            cet: cet.clone(),
        };
        Ok((DlcSession::from_state(executed), cet))
    }

    /// The fully signed refund transaction, valid once the contract times out.
    pub fn signed_refund_transaction(&self, seckey: Scalar) -> Result<Transaction, Error> {
        let their_sigs = self.check_own_key(seckey)?;
        outcome::complete_refund(
            &self.state.signed_contract().transactions,
            seckey,
            R::IS_OFFERER,
            their_sigs.refund_sig,
        )
    }
}
