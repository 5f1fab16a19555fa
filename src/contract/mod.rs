pub(crate) mod fees;
pub mod funding;
pub(crate) mod outcome;
pub mod payoffs;

#[cfg(test)]
pub(crate) mod testing;

use bitcoin::{Amount, FeeRate, OutPoint, ScriptBuf, Transaction, TxOut};
use secp::Point;
use serde::{Deserialize, Serialize};

use crate::{
    consts::LOCKTIME_THRESHOLD,
    errors::Error,
    hashing::{sha256, tagged_hash, TAG_EVENT_ID},
    oracles::OracleInfo,
    spend_info::FundingSpendInfo,
};

use funding::{FundingInput, FundingTemplate};

use std::collections::{BTreeMap, BTreeSet};

/// One possible result of an oracle event, identified by the SHA256 hash
/// of its UTF-8 label. The label itself is optional: a counterparty's offer
/// only carries hashes, and labels can be restored with [`fill_outcomes`].
///
/// Equality, ordering and hashing consider only the outcome hash.
#[derive(Debug, Clone)]
pub struct DiscreteOutcome {
    hash: [u8; 32],
    label: Option<String>,
}

impl DiscreteOutcome {
    pub fn new(label: impl Into<String>) -> DiscreteOutcome {
        let label = label.into();
        DiscreteOutcome {
            hash: sha256(label.as_bytes()),
            label: Some(label),
        }
    }

    /// An outcome known only by its hash.
    pub fn from_hash(hash: [u8; 32]) -> DiscreteOutcome {
        DiscreteOutcome { hash, label: None }
    }

    pub fn hash(&self) -> &[u8; 32] {
        &self.hash
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }
}

impl PartialEq for DiscreteOutcome {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
    }
}

impl Eq for DiscreteOutcome {}

impl PartialOrd for DiscreteOutcome {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DiscreteOutcome {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.hash.cmp(&other.hash)
    }
}

impl std::hash::Hash for DiscreteOutcome {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.hash.hash(state)
    }
}

impl std::fmt::Display for DiscreteOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match &self.label {
            Some(label) => f.write_str(label),
            None => write!(f, "SHA256:{}", hex::encode(self.hash)),
        }
    }
}

impl std::str::FromStr for DiscreteOutcome {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.strip_prefix("SHA256:") {
            Some(hash_hex) => {
                let mut hash = [0u8; 32];
                hex::decode_to_slice(hash_hex, &mut hash)
                    .map_err(|_| Error::InvalidContract("invalid outcome hash"))?;
                Ok(DiscreteOutcome::from_hash(hash))
            }
            None => Ok(DiscreteOutcome::new(s)),
        }
    }
}

/// The amount paid to the initiator if the oracle attests to `outcome`.
/// The acceptor receives the rest of the pot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractInfo {
    pub outcome: DiscreteOutcome,
    pub payout: Amount,
}

/// Checks that contract info is non-empty, has no repeated outcomes, and
/// never pays the initiator more than `pot`.
pub fn validate_contract_info(contract_info: &[ContractInfo], pot: Amount) -> Result<(), Error> {
    if contract_info.is_empty() {
        return Err(Error::InvalidContract("contract has no outcomes"));
    }

    let distinct: BTreeSet<&DiscreteOutcome> =
        contract_info.iter().map(|info| &info.outcome).collect();
    if distinct.len() != contract_info.len() {
        return Err(Error::InvalidContract("duplicate outcome"));
    }

    if contract_info.iter().any(|info| info.payout > pot) {
        return Err(Error::InvalidContract("payout exceeds total collateral"));
    }
    Ok(())
}

/// Restore outcome labels on contract info which only carries hashes.
///
/// Each entry must match exactly one of `labels`, and every label must be
/// used. On failure, `contract_info` is left untouched.
pub fn fill_outcomes<S: AsRef<str>>(
    contract_info: &mut [ContractInfo],
    labels: &[S],
) -> Result<(), Error> {
    let mut by_hash: BTreeMap<[u8; 32], &str> = labels
        .iter()
        .map(|label| (sha256(label.as_ref().as_bytes()), label.as_ref()))
        .collect();

    let mut resolved = Vec::with_capacity(contract_info.len());
    for info in contract_info.iter() {
        let label = by_hash
            .remove(info.outcome.hash())
            .ok_or(Error::InvalidContract("outcome does not match any label"))?;
        resolved.push(DiscreteOutcome::new(label));
    }

    if !by_hash.is_empty() {
        return Err(Error::InvalidContract("label not used by any outcome"));
    }

    for (info, outcome) in contract_info.iter_mut().zip(resolved) {
        info.outcome = outcome;
    }
    Ok(())
}

/// Absolute block heights bounding the contract's life. CETs become valid
/// at maturity; the refund transaction becomes valid at the timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeouts {
    pub contract_maturity: u32,
    pub contract_timeout: u32,
}

impl Timeouts {
    pub fn validate(&self) -> Result<(), Error> {
        if self.contract_timeout >= LOCKTIME_THRESHOLD {
            return Err(Error::InvalidContract("timeouts must be block heights"));
        }
        if self.contract_maturity >= self.contract_timeout {
            return Err(Error::InvalidContract("maturity must precede timeout"));
        }
        Ok(())
    }
}

/// Identifies the oracle event a contract is built on. Both parties
/// compute it independently and compare it on every message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(#[serde(with = "crate::serialization::byte_array")] [u8; 32]);

impl EventId {
    pub fn new<'o>(
        oracle_info: &OracleInfo,
        outcomes: impl IntoIterator<Item = &'o DiscreteOutcome>,
    ) -> EventId {
        let oracle_bytes = oracle_info.serialize();
        let outcomes: BTreeSet<&DiscreteOutcome> = outcomes.into_iter().collect();
        let chunks = std::iter::once(oracle_bytes.as_slice())
            .chain(outcomes.into_iter().map(|outcome| outcome.hash().as_slice()));
        EventId(tagged_hash(TAG_EVENT_ID, chunks))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// Everything one party brings to the contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartyParams {
    /// The key used in the 2-of-2 funding multisig, and to sign CETs.
    #[serde(with = "crate::serialization::point")]
    pub funding_pubkey: Point,

    /// Where this party's CET and refund payouts go.
    pub payout_script: ScriptBuf,

    /// UTXOs this party spends into the funding transaction.
    pub funding_inputs: Vec<FundingInput>,

    /// Where this party's leftover input value goes.
    pub change_script: ScriptBuf,

    /// The collateral posted by this party, excluding fees.
    pub total_collateral: Amount,
}

impl PartyParams {
    pub fn new(
        funding_pubkey: Point,
        payout_script: ScriptBuf,
        funding: FundingTemplate,
        total_collateral: Amount,
    ) -> PartyParams {
        PartyParams {
            funding_pubkey,
            payout_script,
            funding_inputs: funding.inputs,
            change_script: funding.change_script,
            total_collateral,
        }
    }
}

/// The full set of terms both parties must agree on. If both parties use
/// the same [`ContractParameters`], they construct byte-identical funding,
/// CET and refund transactions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractParameters {
    pub oracle_info: OracleInfo,
    pub contract_info: Vec<ContractInfo>,
    pub timeouts: Timeouts,

    /// The fee rate for the funding, CET and refund transactions.
    pub fee_rate: FeeRate,

    pub offerer: PartyParams,
    pub acceptor: PartyParams,
}

impl ContractParameters {
    /// The sum of both parties' collateral.
    pub fn total_collateral(&self) -> Result<Amount, Error> {
        self.offerer
            .total_collateral
            .checked_add(self.acceptor.total_collateral)
            .ok_or(Error::InvalidContract("total collateral overflows"))
    }

    pub fn validate(&self) -> Result<(), Error> {
        self.timeouts.validate()?;
        validate_contract_info(&self.contract_info, self.total_collateral()?)?;

        if self.fee_rate == FeeRate::ZERO {
            return Err(Error::InvalidContract("fee rate must be non-zero"));
        }
        if self.offerer.funding_pubkey == self.acceptor.funding_pubkey {
            return Err(Error::InvalidContract("parties must use distinct funding keys"));
        }

        let outpoints: BTreeSet<OutPoint> = self
            .offerer
            .funding_inputs
            .iter()
            .chain(&self.acceptor.funding_inputs)
            .map(|input| input.outpoint)
            .collect();
        if outpoints.len() != self.offerer.funding_inputs.len() + self.acceptor.funding_inputs.len()
        {
            return Err(Error::InvalidContract("duplicate funding input"));
        }
        Ok(())
    }

    pub fn event_id(&self) -> EventId {
        EventId::new(
            &self.oracle_info,
            self.contract_info.iter().map(|info| &info.outcome),
        )
    }
}

/// Sort outputs by value, then by script bytes.
pub(crate) fn sort_outputs(outputs: &mut [TxOut]) {
    outputs.sort_by(|a, b| {
        a.value
            .cmp(&b.value)
            .then_with(|| a.script_pubkey.as_bytes().cmp(b.script_pubkey.as_bytes()))
    });
}

/// The complete set of transactions for a contract: the funding transaction,
/// one CET per outcome, and the refund transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractTransactions {
    funding_tx: Transaction,
    funding_outpoint: OutPoint,
    funding_spend_info: FundingSpendInfo,
    cets: BTreeMap<DiscreteOutcome, Transaction>,
    #[serde(with = "crate::serialization::outcome_points")]
    signature_points: BTreeMap<DiscreteOutcome, Point>,
    refund_tx: Transaction,
}

impl ContractTransactions {
    /// Construct every contract transaction from the agreed parameters.
    ///
    /// If `funding_override` is given, it replaces the computed funding
    /// transaction verbatim, provided it spends the same inputs and pays
    /// the funding and change outputs the parameters call for.
    pub fn build(
        params: &ContractParameters,
        funding_override: Option<&Transaction>,
    ) -> Result<ContractTransactions, Error> {
        params.validate()?;

        let funding_build = funding::build_funding_tx(params)?;
        let funding_spend_info = funding_build.spend_info;
        let funding_output = funding_spend_info.funding_output();

        let funding_tx = match funding_override {
            Some(override_tx) => {
                funding::check_funding_override(&funding_build.tx, override_tx)?;
                override_tx.clone()
            }
            None => funding_build.tx,
        };

        let vout = funding_tx
            .output
            .iter()
            .position(|output| output == &funding_output)
            .ok_or(Error::InvalidContract("funding output missing"))?;
        let funding_outpoint = OutPoint {
            txid: funding_tx.txid(),
            vout: vout as u32,
        };

        let signature_points: BTreeMap<DiscreteOutcome, Point> = params
            .contract_info
            .iter()
            .map(|info| {
                let point = params
                    .oracle_info
                    .signature_point(&info.outcome)
                    .ok_or(Error::InvalidContract("outcome has no signature point"))?;
                Ok((info.outcome.clone(), point))
            })
            .collect::<Result<_, Error>>()?;

        let cets: BTreeMap<DiscreteOutcome, Transaction> = params
            .contract_info
            .iter()
            .map(|info| {
                let cet = outcome::build_cet(params, funding_outpoint, info.payout)?;
                Ok((info.outcome.clone(), cet))
            })
            .collect::<Result<_, Error>>()?;

        let refund_tx = outcome::build_refund_tx(params, funding_outpoint)?;

        Ok(ContractTransactions {
            funding_tx,
            funding_outpoint,
            funding_spend_info,
            cets,
            signature_points,
            refund_tx,
        })
    }

    /// The unsigned funding transaction.
    pub fn funding_tx(&self) -> &Transaction {
        &self.funding_tx
    }

    pub fn funding_outpoint(&self) -> OutPoint {
        self.funding_outpoint
    }

    /// The 2-of-2 output locking both parties' collateral.
    pub fn funding_output(&self) -> TxOut {
        self.funding_spend_info.funding_output()
    }

    pub fn cets(&self) -> &BTreeMap<DiscreteOutcome, Transaction> {
        &self.cets
    }

    pub fn cet(&self, outcome: &DiscreteOutcome) -> Option<&Transaction> {
        self.cets.get(outcome)
    }

    pub fn refund_tx(&self) -> &Transaction {
        &self.refund_tx
    }

    /// The point each outcome's CET adaptor signatures are encrypted under.
    pub fn signature_points(&self) -> &BTreeMap<DiscreteOutcome, Point> {
        &self.signature_points
    }

    /// Find the outcome whose signature point is unlocked by the given point.
    pub fn outcome_for_point(&self, point: Point) -> Option<&DiscreteOutcome> {
        self.signature_points
            .iter()
            .find(|(_, &sigpoint)| sigpoint == point)
            .map(|(outcome, _)| outcome)
    }

    /// Find the outcome whose CET has the same txid as `tx`. Witness data
    /// is ignored.
    pub fn outcome_for_cet(&self, tx: &Transaction) -> Option<&DiscreteOutcome> {
        let txid = tx.txid();
        self.cets
            .iter()
            .find(|(_, cet)| cet.txid() == txid)
            .map(|(outcome, _)| outcome)
    }

    pub(crate) fn funding_spend_info(&self) -> &FundingSpendInfo {
        &self.funding_spend_info
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_identity_ignores_label() {
        let labeled = DiscreteOutcome::new("Republicans");
        let unlabeled = DiscreteOutcome::from_hash(*labeled.hash());
        assert_eq!(labeled, unlabeled);
        assert_eq!(labeled.to_string(), "Republicans");
        assert_eq!(
            unlabeled.to_string(),
            "SHA256:fb84860b10a497deddc3efb45d20786ed72d27cfcf54a09a0e1c04dcef4882a1"
        );

        let parsed: DiscreteOutcome = unlabeled.to_string().parse().unwrap();
        assert_eq!(parsed, labeled);
        assert_eq!(parsed.label(), None);
    }

    fn hashed_info(labels: &[&str]) -> Vec<ContractInfo> {
        labels
            .iter()
            .enumerate()
            .map(|(i, label)| ContractInfo {
                outcome: DiscreteOutcome::from_hash(sha256(label.as_bytes())),
                payout: Amount::from_sat(i as u64 * 1000),
            })
            .collect()
    }

    #[test]
    fn fill_outcomes_restores_labels() {
        let mut infos = hashed_info(&["Republicans", "Democrats", "other"]);
        fill_outcomes(&mut infos, &["other", "Democrats", "Republicans"]).unwrap();
        let labels: Vec<&str> = infos.iter().map(|i| i.outcome.label().unwrap()).collect();
        assert_eq!(labels, ["Republicans", "Democrats", "other"]);
    }

    #[test]
    fn fill_outcomes_rejects_mismatched_labels() {
        let mut infos = hashed_info(&["Republicans", "Democrats"]);

        // Unknown entry.
        assert_eq!(
            fill_outcomes(&mut infos, &["Republicans", "Smith"]),
            Err(Error::InvalidContract("outcome does not match any label"))
        );
        // Unused label.
        assert_eq!(
            fill_outcomes(&mut infos, &["Republicans", "Democrats", "Smith"]),
            Err(Error::InvalidContract("label not used by any outcome"))
        );
        assert!(infos.iter().all(|info| info.outcome.label().is_none()));

        // Duplicated entries cannot both match one label.
        let mut dupes = hashed_info(&["Republicans", "Republicans"]);
        assert!(fill_outcomes(&mut dupes, &["Republicans"]).is_err());
    }

    #[test]
    fn contract_info_validation() {
        let pot = Amount::from_sat(5000);
        assert!(validate_contract_info(&hashed_info(&["a", "b"]), pot).is_ok());
        assert_eq!(
            validate_contract_info(&[], pot),
            Err(Error::InvalidContract("contract has no outcomes"))
        );
        assert_eq!(
            validate_contract_info(&hashed_info(&["a", "a"]), pot),
            Err(Error::InvalidContract("duplicate outcome"))
        );
        assert_eq!(
            validate_contract_info(&hashed_info(&["a", "b", "c"]), Amount::from_sat(1500)),
            Err(Error::InvalidContract("payout exceeds total collateral"))
        );
    }

    #[test]
    fn timeouts_validation() {
        let ok = Timeouts {
            contract_maturity: 100,
            contract_timeout: 200,
        };
        assert!(ok.validate().is_ok());

        let backwards = Timeouts {
            contract_maturity: 200,
            contract_timeout: 200,
        };
        assert!(backwards.validate().is_err());

        let timestamp = Timeouts {
            contract_maturity: 100,
            contract_timeout: 1_700_000_000,
        };
        assert!(timestamp.validate().is_err());
    }

    #[test]
    fn event_id_is_order_independent() {
        let oracle: OracleInfo = "e4d36e995ff4bba4da2b60ad907d61d36e120d6f7314a3c2a20c6e27a5cd850f\
                                  f67f8f41718c86f05eb95fab308f5ed788a2a963124299154648f97124caa579"
            .parse()
            .unwrap();
        let a = DiscreteOutcome::new("a");
        let b = DiscreteOutcome::new("b");
        let c = DiscreteOutcome::new("c");

        assert_eq!(EventId::new(&oracle, [&a, &b]), EventId::new(&oracle, [&b, &a]));
        assert_ne!(EventId::new(&oracle, [&a, &b]), EventId::new(&oracle, [&a, &c]));
    }

    #[test]
    fn contract_round_trips_through_cbor() {
        let fixture = testing::Fixture::new();

        let cbor = serde_cbor::to_vec(&fixture.params).unwrap();
        let params: ContractParameters = serde_cbor::from_slice(&cbor).unwrap();
        assert_eq!(params, fixture.params);

        let txs = ContractTransactions::build(&fixture.params, None).unwrap();
        let cbor = serde_cbor::to_vec(&txs).unwrap();
        let decoded: ContractTransactions = serde_cbor::from_slice(&cbor).unwrap();
        assert_eq!(decoded, txs);
        assert_eq!(decoded.signature_points(), txs.signature_points());
    }
}
