use bitcoin::{transaction::InputWeightPrediction, Amount, FeeRate};

use crate::{consts::P2WSH_SCRIPT_PUBKEY_SIZE, errors::Error, spend_info::FundingSpendInfo};

/// Compute the fee for a transaction given a fixed [`FeeRate`], input weights,
/// and output script lengths.
pub(crate) fn fee_calc_safe<I, O>(
    fee_rate: FeeRate,
    input_weights: I,
    output_spk_lens: O,
) -> Result<Amount, Error>
where
    I: IntoIterator<Item = InputWeightPrediction>,
    O: IntoIterator<Item = usize>,
{
    let tx_weight = bitcoin::transaction::predict_weight(input_weights, output_spk_lens);
    let fee = fee_rate
        .fee_wu(tx_weight)
        .ok_or(Error::InvalidContract("fee overflows"))?;
    Ok(fee)
}

/// The fee reserved in the funding output to pay for whichever CET or
/// refund transaction eventually spends it. Both have one 2-of-2 input
/// and up to one payout output per party.
pub(crate) fn execution_fee(
    fee_rate: FeeRate,
    offerer_payout_spk_len: usize,
    acceptor_payout_spk_len: usize,
) -> Result<Amount, Error> {
    fee_calc_safe(
        fee_rate,
        [FundingSpendInfo::input_weight_for_execution_tx()],
        [offerer_payout_spk_len, acceptor_payout_spk_len],
    )
}

/// Split a shared fee into `(offerer_share, acceptor_share)`. The offerer
/// covers the odd satoshi.
pub(crate) fn split_fee(fee: Amount) -> (Amount, Amount) {
    let acceptor_share = fee / 2;
    (fee - acceptor_share, acceptor_share)
}

/// The fee one party pays toward the funding transaction: its own P2WPKH
/// inputs, its change output, and the funding output.
pub(crate) fn funding_fee(
    fee_rate: FeeRate,
    input_count: usize,
    change_spk_len: usize,
) -> Result<Amount, Error> {
    fee_calc_safe(
        fee_rate,
        std::iter::repeat(InputWeightPrediction::P2WPKH_MAX).take(input_count),
        [change_spk_len, P2WSH_SCRIPT_PUBKEY_SIZE],
    )
}

/// Subtract `required` from `available`, returning the change left over,
/// or `None` if the change would not exceed `dust_threshold`. Errors if
/// `available` cannot cover `required`.
pub(crate) fn change_after_required(
    available: Amount,
    required: Amount,
    dust_threshold: Amount,
) -> Result<Option<Amount>, Error> {
    let change = available
        .checked_sub(required)
        .ok_or(Error::InsufficientCollateral {
            required,
            available,
        })?;
    if change <= dust_threshold {
        return Ok(None);
    }
    Ok(Some(change))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::P2WPKH_SCRIPT_PUBKEY_SIZE;

    #[test]
    fn fee_splitting() {
        assert_eq!(
            split_fee(Amount::from_sat(1001)),
            (Amount::from_sat(501), Amount::from_sat(500))
        );
        assert_eq!(
            split_fee(Amount::from_sat(1000)),
            (Amount::from_sat(500), Amount::from_sat(500))
        );
    }

    #[test]
    fn fees_scale_with_rate() {
        let low = FeeRate::from_sat_per_vb_unchecked(1);
        let high = FeeRate::from_sat_per_vb_unchecked(10);

        let spk_len = P2WPKH_SCRIPT_PUBKEY_SIZE;
        let low_fee = execution_fee(low, spk_len, spk_len).unwrap();
        let high_fee = execution_fee(high, spk_len, spk_len).unwrap();
        assert!(high_fee > low_fee * 9);
        assert!(high_fee < low_fee * 11);

        let one_input = funding_fee(low, 1, P2WPKH_SCRIPT_PUBKEY_SIZE).unwrap();
        let two_inputs = funding_fee(low, 2, P2WPKH_SCRIPT_PUBKEY_SIZE).unwrap();
        assert!(two_inputs > one_input);
    }

    #[test]
    fn change_computation() {
        let dust = Amount::from_sat(294);
        assert_eq!(
            change_after_required(Amount::from_sat(10_000), Amount::from_sat(4_000), dust),
            Ok(Some(Amount::from_sat(6_000)))
        );
        assert_eq!(
            change_after_required(Amount::from_sat(4_200), Amount::from_sat(4_000), dust),
            Ok(None)
        );
        assert_eq!(
            change_after_required(Amount::from_sat(3_000), Amount::from_sat(4_000), dust),
            Err(Error::InsufficientCollateral {
                required: Amount::from_sat(4_000),
                available: Amount::from_sat(3_000),
            })
        );
    }
}
