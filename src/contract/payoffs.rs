//! A party's view of a contract as a gain or loss for each outcome,
//! relative to the collateral it posts.

use bitcoin::{Amount, SignedAmount};
use serde::{Deserialize, Serialize};

use crate::{
    contract::{ContractInfo, DiscreteOutcome},
    errors::Error,
};

/// What a party wins (positive) or loses (negative) if the oracle attests
/// to `outcome`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscretePayoff {
    pub outcome: DiscreteOutcome,
    #[serde(with = "bitcoin::amount::serde::as_sat")]
    pub reward: SignedAmount,
}

impl DiscretePayoff {
    pub fn new(outcome: impl Into<String>, reward: SignedAmount) -> DiscretePayoff {
        DiscretePayoff {
            outcome: DiscreteOutcome::new(outcome),
            reward,
        }
    }
}

/// An ordered set of payoffs, one per outcome.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscretePayoffs(Vec<DiscretePayoff>);

fn to_signed(amount: Amount) -> Result<SignedAmount, Error> {
    amount
        .to_signed()
        .map_err(|_| Error::InvalidContract("amount out of range"))
}

impl DiscretePayoffs {
    pub fn new() -> DiscretePayoffs {
        DiscretePayoffs(Vec::new())
    }

    pub fn push(&mut self, outcome: DiscreteOutcome, reward: SignedAmount) {
        self.0.push(DiscretePayoff { outcome, reward });
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DiscretePayoff> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The least collateral which covers the worst loss across all outcomes.
    pub fn calculate_minimum_collateral(&self) -> Amount {
        let worst = self
            .0
            .iter()
            .map(|payoff| payoff.reward)
            .min()
            .unwrap_or(SignedAmount::ZERO);

        if worst.is_negative() {
            Amount::from_sat(worst.to_sat().unsigned_abs())
        } else {
            Amount::ZERO
        }
    }

    /// The largest gain across all outcomes, or zero if every outcome is a loss.
    fn maximum_gain(&self) -> Amount {
        let best = self
            .0
            .iter()
            .map(|payoff| payoff.reward)
            .max()
            .unwrap_or(SignedAmount::ZERO);

        if best.is_positive() {
            Amount::from_sat(best.to_sat().unsigned_abs())
        } else {
            Amount::ZERO
        }
    }

    /// Convert into contract info for a party posting `collateral`. The pot
    /// is `collateral` plus the largest gain, and each payout is
    /// `collateral + reward` clamped to `[0, pot]`.
    pub fn to_contract_info(&self, collateral: Amount) -> Result<Vec<ContractInfo>, Error> {
        if collateral < self.calculate_minimum_collateral() {
            return Err(Error::InvalidContract("collateral does not cover every loss"));
        }

        let pot = collateral
            .checked_add(self.maximum_gain())
            .ok_or(Error::InvalidContract("total collateral overflows"))?;
        let signed_collateral = to_signed(collateral)?;
        let signed_pot = to_signed(pot)?;

        self.0
            .iter()
            .map(|payoff| {
                let payout = signed_collateral
                    .checked_add(payoff.reward)
                    .ok_or(Error::InvalidContract("payout overflows"))?
                    .clamp(SignedAmount::ZERO, signed_pot);

                Ok(ContractInfo {
                    outcome: payoff.outcome.clone(),
                    payout: Amount::from_sat(payout.to_sat().unsigned_abs()),
                })
            })
            .collect()
    }

    /// The inverse of [`to_contract_info`][Self::to_contract_info]: rewards
    /// are each payout less `collateral`.
    pub fn from_contract_info(
        contract_info: &[ContractInfo],
        collateral: Amount,
    ) -> Result<DiscretePayoffs, Error> {
        let collateral = to_signed(collateral)?;
        contract_info
            .iter()
            .map(|info| {
                let reward = to_signed(info.payout)?
                    .checked_sub(collateral)
                    .ok_or(Error::InvalidContract("reward overflows"))?;
                Ok(DiscretePayoff {
                    outcome: info.outcome.clone(),
                    reward,
                })
            })
            .collect()
    }

    /// The acceptor's payoffs for contract info proposed by an offerer who
    /// posts `offerer_collateral`: whatever the offerer gains, the acceptor
    /// loses. The minimum collateral of the result is the acceptor's stake.
    pub fn counterparty_view(
        contract_info: &[ContractInfo],
        offerer_collateral: Amount,
    ) -> Result<DiscretePayoffs, Error> {
        let offerer_collateral = to_signed(offerer_collateral)?;
        contract_info
            .iter()
            .map(|info| {
                let reward = offerer_collateral
                    .checked_sub(to_signed(info.payout)?)
                    .ok_or(Error::InvalidContract("reward overflows"))?;
                Ok(DiscretePayoff {
                    outcome: info.outcome.clone(),
                    reward,
                })
            })
            .collect()
    }
}

impl From<Vec<DiscretePayoff>> for DiscretePayoffs {
    fn from(payoffs: Vec<DiscretePayoff>) -> Self {
        DiscretePayoffs(payoffs)
    }
}

impl FromIterator<DiscretePayoff> for DiscretePayoffs {
    fn from_iter<I: IntoIterator<Item = DiscretePayoff>>(iter: I) -> Self {
        DiscretePayoffs(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a DiscretePayoffs {
    type Item = &'a DiscretePayoff;
    type IntoIter = std::slice::Iter<'a, DiscretePayoff>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl std::ops::Index<usize> for DiscretePayoffs {
    type Output = DiscretePayoff;

    fn index(&self, index: usize) -> &DiscretePayoff {
        &self.0[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn btc(n: f64) -> SignedAmount {
        SignedAmount::from_btc(n).unwrap()
    }

    #[test]
    fn contract_info_conversion() {
        let payoffs = DiscretePayoffs::from(vec![
            DiscretePayoff::new("a", btc(5.0)),
            DiscretePayoff::new("b", btc(-5.0)),
            DiscretePayoff::new("c", btc(-2.0)),
        ]);

        let collateral = payoffs.calculate_minimum_collateral();
        assert_eq!(collateral, Amount::from_btc(5.0).unwrap());

        let infos = payoffs.to_contract_info(collateral).unwrap();
        let payouts: Vec<Amount> = infos.iter().map(|info| info.payout).collect();
        assert_eq!(
            payouts,
            [
                Amount::from_btc(10.0).unwrap(),
                Amount::ZERO,
                Amount::from_btc(3.0).unwrap(),
            ]
        );

        let restored = DiscretePayoffs::from_contract_info(&infos, collateral).unwrap();
        assert_eq!(restored, payoffs);
    }

    #[test]
    fn collateral_below_minimum_is_rejected() {
        let payoffs = DiscretePayoffs::from(vec![
            DiscretePayoff::new("a", btc(1.0)),
            DiscretePayoff::new("b", btc(-1.0)),
        ]);
        assert_eq!(
            payoffs.to_contract_info(Amount::from_btc(0.5).unwrap()),
            Err(Error::InvalidContract("collateral does not cover every loss"))
        );

        // Posting more than the minimum is fine, and still round trips.
        let collateral = Amount::from_btc(3.0).unwrap();
        let infos = payoffs.to_contract_info(collateral).unwrap();
        assert_eq!(infos[0].payout, Amount::from_btc(4.0).unwrap());
        assert_eq!(
            DiscretePayoffs::from_contract_info(&infos, collateral).unwrap(),
            payoffs
        );
    }

    #[test]
    fn minimum_collateral_of_winning_payoffs_is_zero() {
        let payoffs = DiscretePayoffs::from(vec![
            DiscretePayoff::new("a", btc(1.0)),
            DiscretePayoff::new("b", SignedAmount::ZERO),
        ]);
        assert_eq!(payoffs.calculate_minimum_collateral(), Amount::ZERO);
        assert_eq!(DiscretePayoffs::new().calculate_minimum_collateral(), Amount::ZERO);
    }

    #[test]
    fn counterparty_payoffs_conserve_the_pot() {
        let offerer_payoffs = DiscretePayoffs::from(vec![
            DiscretePayoff::new("Republicans", btc(0.4)),
            DiscretePayoff::new("Democrats", btc(-0.6)),
            DiscretePayoff::new("Smith", SignedAmount::ZERO),
        ]);

        let offerer_collateral = offerer_payoffs.calculate_minimum_collateral();
        assert_eq!(offerer_collateral, Amount::from_btc(0.6).unwrap());
        let infos = offerer_payoffs.to_contract_info(offerer_collateral).unwrap();

        let acceptor_payoffs = DiscretePayoffs::counterparty_view(&infos, offerer_collateral).unwrap();
        let acceptor_collateral = acceptor_payoffs.calculate_minimum_collateral();
        assert_eq!(acceptor_collateral, Amount::from_btc(0.4).unwrap());

        let pot = offerer_collateral + acceptor_collateral;
        for ((info, offerer), acceptor) in infos.iter().zip(&offerer_payoffs).zip(&acceptor_payoffs) {
            assert_eq!(offerer.reward + acceptor.reward, SignedAmount::ZERO);

            let acceptor_payout = to_signed(acceptor_collateral).unwrap() + acceptor.reward;
            assert_eq!(to_signed(info.payout).unwrap() + acceptor_payout, to_signed(pot).unwrap());
        }
    }
}
