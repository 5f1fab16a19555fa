use bitcoin::{
    absolute::LockTime, hashes::Hash as _, Amount, OutPoint, Sequence, Transaction, TxIn, TxOut,
};
use secp::{Point, Scalar};
use secp256k1::{ecdsa, Message, SECP256K1};

use std::collections::BTreeMap;

use crate::{
    adaptor,
    contract::{sort_outputs, ContractParameters, ContractTransactions, DiscreteOutcome},
    errors::Error,
    messages::{CetAdaptorSignature, CetSignatures},
};

/// Pay each party its share, dropping any output at or below its dust value.
fn payout_outputs(
    params: &ContractParameters,
    offerer_value: Amount,
    acceptor_value: Amount,
) -> Vec<TxOut> {
    let mut outputs: Vec<TxOut> = [
        (offerer_value, &params.offerer.payout_script),
        (acceptor_value, &params.acceptor.payout_script),
    ]
    .into_iter()
    .filter(|(value, script)| *value > script.dust_value())
    .map(|(value, script)| TxOut {
        value,
        script_pubkey: script.clone(),
    })
    .collect();

    sort_outputs(&mut outputs);
    outputs
}

/// A transaction spending the funding output, locked until the given height.
fn execution_tx(
    funding_outpoint: OutPoint,
    height: u32,
    output: Vec<TxOut>,
) -> Result<Transaction, Error> {
    if output.is_empty() {
        return Err(Error::InvalidContract("execution transaction pays nothing"));
    }
    let lock_time = LockTime::from_height(height)
        .map_err(|_| Error::InvalidContract("locktime is not a block height"))?;

    Ok(Transaction {
        version: bitcoin::transaction::Version::TWO,
        lock_time,
        input: vec![TxIn {
            previous_output: funding_outpoint,
            sequence: Sequence::ENABLE_LOCKTIME_NO_RBF,
            ..TxIn::default()
        }],
        output,
    })
}

/// Construct the contract execution transaction which pays the offerer
/// `payout`, and the acceptor the rest of the pot.
pub(crate) fn build_cet(
    params: &ContractParameters,
    funding_outpoint: OutPoint,
    payout: Amount,
) -> Result<Transaction, Error> {
    let acceptor_value = params
        .total_collateral()?
        .checked_sub(payout)
        .ok_or(Error::InvalidContract("payout exceeds total collateral"))?;

    execution_tx(
        funding_outpoint,
        params.timeouts.contract_maturity,
        payout_outputs(params, payout, acceptor_value),
    )
}

/// Construct the refund transaction, which returns each party's collateral
/// once the contract times out.
pub(crate) fn build_refund_tx(
    params: &ContractParameters,
    funding_outpoint: OutPoint,
) -> Result<Transaction, Error> {
    execution_tx(
        funding_outpoint,
        params.timeouts.contract_timeout,
        payout_outputs(
            params,
            params.offerer.total_collateral,
            params.acceptor.total_collateral,
        ),
    )
}

fn sighash_message(txs: &ContractTransactions, tx: &Transaction) -> Result<[u8; 32], Error> {
    Ok(txs.funding_spend_info().sighash_tx(tx)?.to_byte_array())
}

fn signature_point(txs: &ContractTransactions, outcome: &DiscreteOutcome) -> Result<Point, Error> {
    txs.signature_points()
        .get(outcome)
        .copied()
        .ok_or(Error::UnknownOutcome)
}

/// Sign a CET or the refund transaction with a plain ECDSA signature.
pub(crate) fn sign_execution_tx(
    txs: &ContractTransactions,
    tx: &Transaction,
    seckey: Scalar,
) -> Result<ecdsa::Signature, Error> {
    let msg = sighash_message(txs, tx)?;
    Ok(SECP256K1.sign_ecdsa(&Message::from_digest(msg), &seckey.into()))
}

/// Construct adaptor signatures on every CET, each encrypted under the
/// signature point of its outcome, plus a plain signature on the refund
/// transaction.
pub(crate) fn sign_cets(txs: &ContractTransactions, seckey: Scalar) -> Result<CetSignatures, Error> {
    let outcome_sigs: BTreeMap<DiscreteOutcome, CetAdaptorSignature> = txs
        .cets()
        .iter()
        .map(|(outcome, cet)| {
            let msg = sighash_message(txs, cet)?;
            let sigpoint = signature_point(txs, outcome)?;
            let (signature, proof) = adaptor::adaptor_sign(seckey, sigpoint, &msg)?;
            Ok((outcome.clone(), CetAdaptorSignature { signature, proof }))
        })
        .collect::<Result<_, Error>>()?;

    let refund_sig = sign_execution_tx(txs, txs.refund_tx(), seckey)?;

    Ok(CetSignatures {
        outcome_sigs,
        refund_sig,
    })
}

/// Verify a counterparty's full set of CET adaptor signatures and their
/// refund signature. Every CET must be covered, with nothing left over.
pub(crate) fn verify_cet_signatures(
    txs: &ContractTransactions,
    signer_pubkey: Point,
    signatures: &CetSignatures,
) -> Result<(), Error> {
    if signatures.outcome_sigs.len() != txs.cets().len() {
        return Err(Error::InvalidRemoteSignature("unexpected number of CET signatures"));
    }

    for (outcome, cet) in txs.cets() {
        let cet_sig = signatures
            .outcome_sigs
            .get(outcome)
            .ok_or(Error::InvalidRemoteSignature("missing CET signature"))?;

        let msg = sighash_message(txs, cet)?;
        let sigpoint = signature_point(txs, outcome)?;
        if !adaptor::adaptor_verify(
            &cet_sig.signature,
            signer_pubkey,
            &msg,
            sigpoint,
            &cet_sig.proof,
        ) {
            return Err(Error::InvalidRemoteSignature("CET adaptor signature does not verify"));
        }
    }

    let refund_msg = sighash_message(txs, txs.refund_tx())?;
    SECP256K1
        .verify_ecdsa(
            &Message::from_digest(refund_msg),
            &signatures.refund_sig,
            &signer_pubkey.into(),
        )
        .map_err(|_| Error::InvalidRemoteSignature("refund signature does not verify"))
}

/// Attach a witness built from both parties' signatures to an execution
/// transaction.
fn witness_execution_tx(
    txs: &ContractTransactions,
    tx: &Transaction,
    we_are_offerer: bool,
    our_sig: ecdsa::Signature,
    their_sig: ecdsa::Signature,
) -> Transaction {
    let ours = bitcoin::ecdsa::Signature::sighash_all(our_sig);
    let theirs = bitcoin::ecdsa::Signature::sighash_all(their_sig);
    let (offerer_sig, acceptor_sig) = if we_are_offerer {
        (ours, theirs)
    } else {
        (theirs, ours)
    };

    let mut signed = tx.clone();
    for txin in signed.input.iter_mut() {
        txin.witness = txs
            .funding_spend_info()
            .witness(&offerer_sig, &acceptor_sig);
    }
    signed
}

/// Produce a fully signed CET for `outcome`, decrypting the counterparty's
/// adaptor signature with the oracle's attestation secret.
pub(crate) fn complete_cet(
    txs: &ContractTransactions,
    outcome: &DiscreteOutcome,
    seckey: Scalar,
    we_are_offerer: bool,
    their_sig: &CetAdaptorSignature,
    attestation_secret: Scalar,
) -> Result<Transaction, Error> {
    let cet = txs.cet(outcome).ok_or(Error::UnknownOutcome)?;
    let our_sig = sign_execution_tx(txs, cet, seckey)?;
    let their_sig = adaptor::adapt(&their_sig.signature, attestation_secret)?;
    Ok(witness_execution_tx(
        txs,
        cet,
        we_are_offerer,
        our_sig,
        their_sig,
    ))
}

/// Produce a fully signed refund transaction.
pub(crate) fn complete_refund(
    txs: &ContractTransactions,
    seckey: Scalar,
    we_are_offerer: bool,
    their_sig: ecdsa::Signature,
) -> Result<Transaction, Error> {
    let refund_tx = txs.refund_tx();
    let our_sig = sign_execution_tx(txs, refund_tx, seckey)?;
    Ok(witness_execution_tx(
        txs,
        refund_tx,
        we_are_offerer,
        our_sig,
        their_sig,
    ))
}

/// Recover the oracle's attestation secret from a published CET. Whichever
/// party broadcast it decrypted the other's adaptor signature, so either
/// witness signature may reveal the secret.
pub(crate) fn extract_attestation_secret(
    txs: &ContractTransactions,
    cet: &Transaction,
    offerer_sigs: &CetSignatures,
    acceptor_sigs: &CetSignatures,
) -> Result<(DiscreteOutcome, Scalar), Error> {
    let outcome = txs
        .outcome_for_cet(cet)
        .ok_or(Error::NotOurContract("transaction is not one of this contract's CETs"))?;
    let sigpoint = signature_point(txs, outcome)?;

    let witness = &cet
        .input
        .first()
        .ok_or(Error::InvalidAttestation("CET has no inputs"))?
        .witness;
    let (offerer_sig, acceptor_sig) = txs
        .funding_spend_info()
        .witness_signatures(witness)
        .ok_or(Error::InvalidAttestation("CET witness is incomplete"))?;

    for (sig_bytes, adaptor_sigs) in [(offerer_sig, offerer_sigs), (acceptor_sig, acceptor_sigs)] {
        let Ok(signature) = bitcoin::ecdsa::Signature::from_slice(sig_bytes) else {
            continue;
        };
        let Some(adaptor_sig) = adaptor_sigs.outcome_sigs.get(outcome) else {
            continue;
        };
        if let Ok(secret) = adaptor::extract_secret(&signature.sig, &adaptor_sig.signature, sigpoint)
        {
            return Ok((outcome.clone(), secret));
        }
    }

    Err(Error::InvalidAttestation("no CET signature reveals the attestation"))
}
