use bitcoin::{hashes::Hash as _, Amount, FeeRate, OutPoint, ScriptBuf, TxOut, Txid};
use secp::Scalar;

use crate::{
    contract::{
        funding::FundingInput, ContractInfo, ContractParameters, DiscreteOutcome, PartyParams,
        Timeouts,
    },
    oracles::{create_nonce, OracleInfo},
};

pub(crate) fn scalar(n: u128) -> Scalar {
    Scalar::try_from(n).unwrap()
}

pub(crate) fn p2wpkh_script_for(seckey: Scalar) -> ScriptBuf {
    let pubkey = bitcoin::PublicKey::new(seckey.base_point_mul());
    ScriptBuf::new_v0_p2wpkh(&pubkey.wpubkey_hash().unwrap())
}

pub(crate) fn funding_input(seckey: Scalar, seed: u8, value: Amount) -> FundingInput {
    FundingInput {
        outpoint: OutPoint {
            txid: Txid::from_byte_array([seed; 32]),
            vout: seed as u32,
        },
        prevout: TxOut {
            value,
            script_pubkey: p2wpkh_script_for(seckey),
        },
    }
}

/// A three-outcome election contract between two parties, with all the
/// secret keys needed to drive it.
pub(crate) struct Fixture {
    pub(crate) params: ContractParameters,
    pub(crate) offerer_key: Scalar,
    pub(crate) acceptor_key: Scalar,
    pub(crate) offerer_wallet_key: Scalar,
    pub(crate) acceptor_wallet_key: Scalar,
    pub(crate) oracle_seckey: Scalar,
    pub(crate) oracle_nonce_secret: Scalar,
}

impl Fixture {
    pub(crate) fn new() -> Fixture {
        let offerer_key = scalar(11);
        let acceptor_key = scalar(12);
        let offerer_wallet_key = scalar(21);
        let acceptor_wallet_key = scalar(22);
        let oracle_seckey = scalar(101);
        let oracle_nonce_secret = scalar(102);

        let oracle_info = OracleInfo::new(
            oracle_seckey.base_point_mul(),
            create_nonce(oracle_nonce_secret),
        );

        let contract_info = vec![
            ContractInfo {
                outcome: DiscreteOutcome::new("Republicans"),
                payout: Amount::from_sat(100_000_000),
            },
            ContractInfo {
                outcome: DiscreteOutcome::new("Democrats"),
                payout: Amount::ZERO,
            },
            ContractInfo {
                outcome: DiscreteOutcome::new("Smith"),
                payout: Amount::from_sat(60_000_000),
            },
        ];

        let offerer = PartyParams {
            funding_pubkey: offerer_key.base_point_mul(),
            payout_script: p2wpkh_script_for(scalar(31)),
            funding_inputs: vec![
                funding_input(offerer_wallet_key, 1, Amount::from_sat(50_000_000)),
                funding_input(offerer_wallet_key, 2, Amount::from_sat(50_000_000)),
            ],
            change_script: p2wpkh_script_for(offerer_wallet_key),
            total_collateral: Amount::from_sat(60_000_000),
        };
        let acceptor = PartyParams {
            funding_pubkey: acceptor_key.base_point_mul(),
            payout_script: p2wpkh_script_for(scalar(32)),
            funding_inputs: vec![funding_input(
                acceptor_wallet_key,
                3,
                Amount::from_sat(100_000_000),
            )],
            change_script: p2wpkh_script_for(acceptor_wallet_key),
            total_collateral: Amount::from_sat(40_000_000),
        };

        Fixture {
            params: ContractParameters {
                oracle_info,
                contract_info,
                timeouts: Timeouts {
                    contract_maturity: 100,
                    contract_timeout: 200,
                },
                fee_rate: FeeRate::from_sat_per_vb_unchecked(10),
                offerer,
                acceptor,
            },
            offerer_key,
            acceptor_key,
            offerer_wallet_key,
            acceptor_wallet_key,
            oracle_seckey,
            oracle_nonce_secret,
        }
    }
}
