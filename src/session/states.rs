use bitcoin::{Amount, FeeRate, Transaction};
use secp::Point;
use serde::Serialize;

use crate::{
    contract::{ContractInfo, ContractTransactions, DiscreteOutcome, Timeouts},
    messages::{Accept, CetSignatures, Offer, Sign},
    oracles::OracleInfo,
};

use super::{sealed, ContractSigned, Executable, HasTransactions, SessionState};

/// A fresh session, before any contract terms exist.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct New {
    pub(crate) funding_override: Option<Transaction>,
}

/// The initiator has settled on contract terms, and is waiting for its
/// wallet to fund them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Proposed {
    pub(crate) funding_override: Option<Transaction>,
    pub(crate) oracle_info: OracleInfo,
    pub(crate) contract_info: Vec<ContractInfo>,
    pub(crate) timeouts: Timeouts,
    pub(crate) fee_rate: FeeRate,
    pub(crate) collateral: Amount,
}

impl Proposed {
    pub fn contract_info(&self) -> &[ContractInfo] {
        &self.contract_info
    }

    /// The collateral the initiator must post.
    pub fn collateral(&self) -> Amount {
        self.collateral
    }
}

/// An offer has been sent (initiator) or validated (acceptor).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Offered {
    pub(crate) funding_override: Option<Transaction>,
    pub(crate) offer: Offer,
}

impl Offered {
    pub fn offer(&self) -> &Offer {
        &self.offer
    }
}

/// Both halves of the funding transaction are known, and the acceptor has
/// signed every CET.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Accepted {
    pub(crate) funding_override: Option<Transaction>,
    pub(crate) offer: Offer,
    pub(crate) accept: Accept,
    pub(crate) transactions: ContractTransactions,
}

impl Accepted {
    pub fn offer(&self) -> &Offer {
        &self.offer
    }

    pub fn accept(&self) -> &Accept {
        &self.accept
    }
}

/// Everything both parties exchanged, with every signature verified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignedContract {
    pub(crate) offer: Offer,
    pub(crate) accept: Accept,
    pub(crate) sign: Sign,
    pub(crate) transactions: ContractTransactions,
}

impl SignedContract {
    pub fn offer(&self) -> &Offer {
        &self.offer
    }

    pub fn accept(&self) -> &Accept {
        &self.accept
    }

    pub fn sign(&self) -> &Sign {
        &self.sign
    }

    pub fn transactions(&self) -> &ContractTransactions {
        &self.transactions
    }

    /// Our own funding pubkey, and the counterparty's signatures.
    pub(crate) fn party_view(&self, we_are_offerer: bool) -> (Point, &CetSignatures) {
        if we_are_offerer {
            (self.offer.funding_pubkey, &self.accept.cet_sigs)
        } else {
            (self.accept.funding_pubkey, &self.sign.cet_sigs)
        }
    }
}

/// Every CET and the refund transaction are fully signed by the
/// counterparty. The funding transaction may not be complete yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Signed {
    pub(crate) contract: SignedContract,
}

/// The funding transaction carries witnesses for every input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Funded {
    pub(crate) contract: SignedContract,
    pub(crate) funding_tx: Transaction,
}

impl Funded {
    /// The fully signed funding transaction.
    pub fn funding_tx(&self) -> &Transaction {
        &self.funding_tx
    }
}

/// A CET has been completed for the attested outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Executed {
    pub(crate) contract: SignedContract,
    pub(crate) outcome: DiscreteOutcome,
    pub(crate) cet: Transaction,
}

impl Executed {
    pub fn outcome(&self) -> &DiscreteOutcome {
        &self.outcome
    }

    /// The fully witnessed CET.
    pub fn cet(&self) -> &Transaction {
        &self.cet
    }
}

impl sealed::Sealed for New {}
impl sealed::Sealed for Proposed {}
impl sealed::Sealed for Offered {}
impl sealed::Sealed for Accepted {}
impl sealed::Sealed for Signed {}
impl sealed::Sealed for Funded {}
impl sealed::Sealed for Executed {}

impl SessionState for New {}
impl SessionState for Proposed {}
impl SessionState for Offered {}
impl SessionState for Accepted {}
impl SessionState for Signed {}
impl SessionState for Funded {}
impl SessionState for Executed {}

impl HasTransactions for Accepted {
    fn transactions(&self) -> &ContractTransactions {
        &self.transactions
    }
}

impl HasTransactions for Signed {
    fn transactions(&self) -> &ContractTransactions {
        &self.contract.transactions
    }
}

impl HasTransactions for Funded {
    fn transactions(&self) -> &ContractTransactions {
        &self.contract.transactions
    }
}

impl HasTransactions for Executed {
    fn transactions(&self) -> &ContractTransactions {
        &self.contract.transactions
    }
}

impl ContractSigned for Signed {
    fn signed_contract(&self) -> &SignedContract {
        &self.contract
    }
}

impl ContractSigned for Funded {
    fn signed_contract(&self) -> &SignedContract {
        &self.contract
    }
}

impl ContractSigned for Executed {
    fn signed_contract(&self) -> &SignedContract {
        &self.contract
    }
}

impl Executable for Signed {}
impl Executable for Funded {}
