use bitcoin::{
    absolute::LockTime,
    hashes::Hash as _,
    sighash::{EcdsaSighashType, SighashCache},
    Amount, FeeRate, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Witness,
};
use secp::Scalar;
use secp256k1::{Message, SECP256K1};
use serde::{Deserialize, Serialize};

use crate::{
    consts::MAX_STANDARD_SCRIPT_PUBKEY_SIZE,
    contract::{fees, sort_outputs, ContractParameters, PartyParams},
    errors::Error,
    spend_info::FundingSpendInfo,
};

use std::collections::BTreeSet;

/// A P2WPKH UTXO which a party spends into the funding transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingInput {
    pub outpoint: OutPoint,

    /// The output being spent. Its value and script are needed to sign it.
    pub prevout: TxOut,
}

/// What a wallet hands over to fund one side of a contract: a set of
/// inputs worth at least the required amount, and a script for change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingTemplate {
    pub inputs: Vec<FundingInput>,
    pub change_script: ScriptBuf,
}

impl FundingTemplate {
    pub fn total_value(&self) -> Result<Amount, Error> {
        total_input_value(&self.inputs)
    }
}

/// A completed witness for one funding input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingSignature {
    pub outpoint: OutPoint,
    pub witness: Witness,
}

pub(crate) fn total_input_value(inputs: &[FundingInput]) -> Result<Amount, Error> {
    inputs
        .iter()
        .try_fold(Amount::ZERO, |sum, input| sum.checked_add(input.prevout.value))
        .ok_or(Error::InvalidContract("funding input value overflows"))
}

fn p2wpkh_script(pubkey: &bitcoin::PublicKey) -> Option<ScriptBuf> {
    pubkey
        .wpubkey_hash()
        .map(|hash| ScriptBuf::new_v0_p2wpkh(&hash))
}

/// The unsigned funding transaction alongside the spend info of its
/// 2-of-2 output.
pub(crate) struct FundingBuildOutput {
    pub(crate) tx: Transaction,
    pub(crate) spend_info: FundingSpendInfo,
}

/// How much a party's inputs must cover: its collateral, its share of
/// the execution fee reserve, and its share of the funding fee.
pub(crate) fn required_contribution(
    params: &ContractParameters,
    party: &PartyParams,
    reserve_share: Amount,
) -> Result<Amount, Error> {
    let funding_fee = fees::funding_fee(
        params.fee_rate,
        party.funding_inputs.len(),
        party.change_script.len(),
    )?;

    party
        .total_collateral
        .checked_add(reserve_share)
        .and_then(|amount| amount.checked_add(funding_fee))
        .ok_or(Error::InvalidContract("required contribution overflows"))
}

/// Checks a funding template can cover the offerer's side of a contract
/// before the acceptor's scripts are known. The acceptor is assumed to pay
/// out to the largest standard script.
pub(crate) fn check_offerer_template(
    fee_rate: FeeRate,
    collateral: Amount,
    payout_script: &ScriptBuf,
    template: &FundingTemplate,
) -> Result<(), Error> {
    let execution_fee = fees::execution_fee(
        fee_rate,
        payout_script.len(),
        MAX_STANDARD_SCRIPT_PUBKEY_SIZE,
    )?;
    let (reserve_share, _) = fees::split_fee(execution_fee);
    let funding_fee = fees::funding_fee(
        fee_rate,
        template.inputs.len(),
        template.change_script.len(),
    )?;

    let required = collateral
        .checked_add(reserve_share)
        .and_then(|amount| amount.checked_add(funding_fee))
        .ok_or(Error::InvalidContract("required contribution overflows"))?;

    fees::change_after_required(
        template.total_value()?,
        required,
        template.change_script.dust_value(),
    )?;
    Ok(())
}

fn change_output(
    params: &ContractParameters,
    party: &PartyParams,
    reserve_share: Amount,
) -> Result<Option<TxOut>, Error> {
    let available = total_input_value(&party.funding_inputs)?;
    let required = required_contribution(params, party, reserve_share)?;
    let change =
        fees::change_after_required(available, required, party.change_script.dust_value())?;

    Ok(change.map(|value| TxOut {
        value,
        script_pubkey: party.change_script.clone(),
    }))
}

/// Construct the unsigned funding transaction. Inputs are sorted by
/// outpoint and outputs by value and script, so both parties build
/// the same transaction.
pub(crate) fn build_funding_tx(params: &ContractParameters) -> Result<FundingBuildOutput, Error> {
    let execution_fee = fees::execution_fee(
        params.fee_rate,
        params.offerer.payout_script.len(),
        params.acceptor.payout_script.len(),
    )?;
    let (offerer_share, acceptor_share) = fees::split_fee(execution_fee);

    let funding_value = params
        .total_collateral()?
        .checked_add(execution_fee)
        .ok_or(Error::InvalidContract("funding value overflows"))?;

    let spend_info = FundingSpendInfo::new(
        params.offerer.funding_pubkey,
        params.acceptor.funding_pubkey,
        funding_value,
    )?;

    let mut outputs = vec![spend_info.funding_output()];
    outputs.extend(change_output(params, &params.offerer, offerer_share)?);
    outputs.extend(change_output(params, &params.acceptor, acceptor_share)?);
    sort_outputs(&mut outputs);

    let mut outpoints: Vec<OutPoint> = params
        .offerer
        .funding_inputs
        .iter()
        .chain(&params.acceptor.funding_inputs)
        .map(|input| input.outpoint)
        .collect();
    outpoints.sort();

    let tx = Transaction {
        version: bitcoin::transaction::Version::TWO,
        lock_time: LockTime::ZERO,
        input: outpoints
            .into_iter()
            .map(|previous_output| TxIn {
                previous_output,
                sequence: Sequence::MAX,
                ..TxIn::default()
            })
            .collect(),
        output: outputs,
    };

    Ok(FundingBuildOutput { tx, spend_info })
}

/// Checks a caller-supplied funding transaction against the `expected`
/// template. The override must carry the same version and locktime, spend
/// exactly the same inputs with the same sequence numbers, and pay every
/// output `expected` pays.
///
/// Input order, output order, and any additional outputs are left to the
/// caller. Since the inputs are fixed and every expected output must be
/// present, additional outputs can only spend value which `expected` leaves
/// to the funding fee.
pub(crate) fn check_funding_override(
    expected: &Transaction,
    override_tx: &Transaction,
) -> Result<(), Error> {
    if override_tx.version != expected.version {
        return Err(Error::InvalidContract("funding override has a different version"));
    }
    if override_tx.lock_time != expected.lock_time {
        return Err(Error::InvalidContract("funding override has a different locktime"));
    }

    let expected_inputs: BTreeSet<OutPoint> =
        expected.input.iter().map(|txin| txin.previous_output).collect();
    let override_inputs: BTreeSet<OutPoint> = override_tx
        .input
        .iter()
        .map(|txin| txin.previous_output)
        .collect();

    if override_tx.input.len() != expected.input.len() || override_inputs != expected_inputs {
        return Err(Error::InvalidContract("funding override spends different inputs"));
    }

    let expected_sequences: BTreeSet<(OutPoint, Sequence)> = expected
        .input
        .iter()
        .map(|txin| (txin.previous_output, txin.sequence))
        .collect();
    if override_tx
        .input
        .iter()
        .any(|txin| !expected_sequences.contains(&(txin.previous_output, txin.sequence)))
    {
        return Err(Error::InvalidContract("funding override has a different input sequence"));
    }

    let mut unmatched: Vec<&TxOut> = override_tx.output.iter().collect();
    for output in &expected.output {
        let index = unmatched
            .iter()
            .position(|&candidate| candidate == output)
            .ok_or(Error::InvalidContract("funding override is missing an output"))?;
        unmatched.swap_remove(index);
    }
    Ok(())
}

/// Sign the given P2WPKH funding inputs of `funding_tx`. Every input must be
/// controlled by one of `seckeys`.
///
/// This stands in for an external wallet: the protocol engine itself only
/// verifies funding witnesses.
pub fn sign_p2wpkh_inputs(
    funding_tx: &Transaction,
    inputs: &[FundingInput],
    seckeys: &[Scalar],
) -> Result<Vec<FundingSignature>, Error> {
    let mut sighash_cache = SighashCache::new(funding_tx);

    inputs
        .iter()
        .map(|input| {
            let index = input_index(funding_tx, input)?;
            let (seckey, pubkey) = seckeys
                .iter()
                .find_map(|&seckey| {
                    let pubkey = bitcoin::PublicKey::new(seckey.base_point_mul());
                    let script = p2wpkh_script(&pubkey)?;
                    (script == input.prevout.script_pubkey).then_some((seckey, pubkey))
                })
                .ok_or(Error::IncompleteFunding("no key for funding input"))?;

            let sighash = sighash_cache.p2wpkh_signature_hash(
                index,
                &input.prevout.script_pubkey,
                input.prevout.value,
                EcdsaSighashType::All,
            )?;
            let signature = SECP256K1.sign_ecdsa(
                &Message::from_digest(sighash.to_byte_array()),
                &seckey.into(),
            );

            Ok(FundingSignature {
                outpoint: input.outpoint,
                witness: Witness::p2wpkh(
                    &bitcoin::ecdsa::Signature::sighash_all(signature),
                    &pubkey.inner,
                ),
            })
        })
        .collect()
}

fn input_index(funding_tx: &Transaction, input: &FundingInput) -> Result<usize, Error> {
    funding_tx
        .input
        .iter()
        .position(|txin| txin.previous_output == input.outpoint)
        .ok_or(Error::IncompleteFunding("input is not spent by the funding transaction"))
}

fn verify_p2wpkh_witness(
    funding_tx: &Transaction,
    input: &FundingInput,
    witness: &Witness,
) -> Result<(), Error> {
    let index = input_index(funding_tx, input)?;

    let (Some(sig_bytes), Some(pubkey_bytes), 2) = (witness.nth(0), witness.nth(1), witness.len())
    else {
        return Err(Error::IncompleteFunding("funding witness must have two elements"));
    };

    let signature = bitcoin::ecdsa::Signature::from_slice(sig_bytes)
        .map_err(|_| Error::IncompleteFunding("malformed funding signature"))?;
    if signature.hash_ty != EcdsaSighashType::All {
        return Err(Error::IncompleteFunding("funding signature must use SIGHASH_ALL"));
    }

    let pubkey = bitcoin::PublicKey::from_slice(pubkey_bytes)
        .map_err(|_| Error::IncompleteFunding("malformed funding pubkey"))?;
    if p2wpkh_script(&pubkey).as_ref() != Some(&input.prevout.script_pubkey) {
        return Err(Error::IncompleteFunding("witness key does not match funding input"));
    }

    let sighash = SighashCache::new(funding_tx).p2wpkh_signature_hash(
        index,
        &input.prevout.script_pubkey,
        input.prevout.value,
        EcdsaSighashType::All,
    )?;
    SECP256K1
        .verify_ecdsa(
            &Message::from_digest(sighash.to_byte_array()),
            &signature.sig,
            &pubkey.inner,
        )
        .map_err(|_| Error::IncompleteFunding("invalid funding signature"))
}

/// Checks that `signatures` carries a valid witness for each of `inputs`.
pub(crate) fn verify_funding_signatures(
    funding_tx: &Transaction,
    inputs: &[FundingInput],
    signatures: &[FundingSignature],
) -> Result<(), Error> {
    for input in inputs {
        let signature = signatures
            .iter()
            .find(|sig| sig.outpoint == input.outpoint)
            .ok_or(Error::IncompleteFunding("missing witness for funding input"))?;
        verify_p2wpkh_witness(funding_tx, input, &signature.witness)?;
    }
    Ok(())
}

/// Attach witnesses to the funding transaction. Every input must receive one.
pub(crate) fn apply_funding_signatures<'s>(
    funding_tx: &Transaction,
    signatures: impl IntoIterator<Item = &'s FundingSignature>,
) -> Result<Transaction, Error> {
    let mut signed_tx = funding_tx.clone();
    for signature in signatures {
        let txin = signed_tx
            .input
            .iter_mut()
            .find(|txin| txin.previous_output == signature.outpoint)
            .ok_or(Error::IncompleteFunding("witness for unknown funding input"))?;
        txin.witness = signature.witness.clone();
    }

    if signed_tx.input.iter().any(|txin| txin.witness.is_empty()) {
        return Err(Error::IncompleteFunding("funding input is missing a witness"));
    }
    Ok(signed_tx)
}
