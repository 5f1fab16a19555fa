use bitcoin::{
    opcodes::all::{OP_CHECKMULTISIG, OP_PUSHNUM_2},
    script::Builder,
    sighash::{EcdsaSighashType, SighashCache},
    transaction::InputWeightPrediction,
    Amount, ScriptBuf, SegwitV0Sighash, Transaction, TxOut, Witness,
};
use secp::Point;
use serde::{Deserialize, Serialize};

use crate::{
    consts::{MAX_ECDSA_WITNESS_SIGNATURE_SIZE, MULTISIG_2OF2_WITNESS_SCRIPT_SIZE},
    errors::Error,
};

/// Spending information for the 2-of-2 P2WSH funding output which both
/// parties lock their collateral into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct FundingSpendInfo {
    #[serde(with = "crate::serialization::point")]
    offerer_pubkey: Point,
    #[serde(with = "crate::serialization::point")]
    acceptor_pubkey: Point,
    witness_script: ScriptBuf,
    funding_value: Amount,
}

impl FundingSpendInfo {
    pub(crate) fn new(
        offerer_pubkey: Point,
        acceptor_pubkey: Point,
        funding_value: Amount,
    ) -> Result<FundingSpendInfo, Error> {
        if offerer_pubkey == acceptor_pubkey {
            return Err(Error::InvalidContract("parties must use distinct funding keys"));
        }

        let mut pubkeys = [offerer_pubkey, acceptor_pubkey];
        pubkeys.sort();

        let witness_script = Builder::new()
            .push_opcode(OP_PUSHNUM_2)
            .push_key(&bitcoin::PublicKey::new(secp256k1::PublicKey::from(pubkeys[0])))
            .push_key(&bitcoin::PublicKey::new(secp256k1::PublicKey::from(pubkeys[1])))
            .push_opcode(OP_PUSHNUM_2)
            .push_opcode(OP_CHECKMULTISIG)
            .into_script();

        Ok(FundingSpendInfo {
            offerer_pubkey,
            acceptor_pubkey,
            witness_script,
            funding_value,
        })
    }

    /// Returns the transaction output which the funding transaction should pay to.
    pub(crate) fn funding_output(&self) -> TxOut {
        TxOut {
            script_pubkey: self.script_pubkey(),
            value: self.funding_value,
        }
    }

    /// Returns the P2WSH locking script of the funding output.
    pub(crate) fn script_pubkey(&self) -> ScriptBuf {
        ScriptBuf::new_v0_p2wsh(&self.witness_script.wscript_hash())
    }

    /// Compute the signature hash for a CET or the refund transaction,
    /// which spend the funding output at input index zero.
    pub(crate) fn sighash_tx(&self, spending_tx: &Transaction) -> Result<SegwitV0Sighash, Error> {
        let sighash = SighashCache::new(spending_tx).p2wsh_signature_hash(
            0,
            &self.witness_script,
            self.funding_value,
            EcdsaSighashType::All,
        )?;
        Ok(sighash)
    }

    /// Returns true if the offerer's key sorts first in the witness script.
    fn offerer_first(&self) -> bool {
        self.offerer_pubkey < self.acceptor_pubkey
    }

    /// Assemble the witness spending the funding output, given a signature
    /// from each party.
    pub(crate) fn witness(
        &self,
        offerer_sig: &bitcoin::ecdsa::Signature,
        acceptor_sig: &bitcoin::ecdsa::Signature,
    ) -> Witness {
        let (first, second) = if self.offerer_first() {
            (offerer_sig, acceptor_sig)
        } else {
            (acceptor_sig, offerer_sig)
        };

        Witness::from_slice(&[
            Vec::new(),
            first.to_vec(),
            second.to_vec(),
            self.witness_script.to_bytes(),
        ])
    }

    /// Split a funding-spend witness into `(offerer_sig, acceptor_sig)` bytes.
    pub(crate) fn witness_signatures<'w>(
        &self,
        witness: &'w Witness,
    ) -> Option<(&'w [u8], &'w [u8])> {
        if witness.len() != 4 || witness.nth(3)? != self.witness_script.as_bytes() {
            return None;
        }
        let first = witness.nth(1)?;
        let second = witness.nth(2)?;
        if self.offerer_first() {
            Some((first, second))
        } else {
            Some((second, first))
        }
    }

    /// The weight prediction for an input spending the funding output.
    pub(crate) fn input_weight_for_execution_tx() -> InputWeightPrediction {
        InputWeightPrediction::new(
            0,
            [
                0,
                MAX_ECDSA_WITNESS_SIGNATURE_SIZE,
                MAX_ECDSA_WITNESS_SIGNATURE_SIZE,
                MULTISIG_2OF2_WITNESS_SCRIPT_SIZE,
            ],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::P2WSH_SCRIPT_PUBKEY_SIZE;
    use secp::Scalar;

    #[test]
    fn witness_script_is_key_order_independent() {
        let a = Scalar::try_from(3).unwrap().base_point_mul();
        let b = Scalar::try_from(4).unwrap().base_point_mul();

        let ab = FundingSpendInfo::new(a, b, Amount::from_sat(10_000)).unwrap();
        let ba = FundingSpendInfo::new(b, a, Amount::from_sat(10_000)).unwrap();

        assert_eq!(ab.script_pubkey(), ba.script_pubkey());
        assert_eq!(ab.script_pubkey().len(), P2WSH_SCRIPT_PUBKEY_SIZE);
        assert_eq!(ab.witness_script.len(), MULTISIG_2OF2_WITNESS_SCRIPT_SIZE);
        assert!(FundingSpendInfo::new(a, a, Amount::from_sat(10_000)).is_err());
    }
}
