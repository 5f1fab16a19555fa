/// The serialized length of a P2WSH script pubkey.
pub const P2WSH_SCRIPT_PUBKEY_SIZE: usize = 34;

/// The serialized length of a P2WPKH script pubkey.
pub const P2WPKH_SCRIPT_PUBKEY_SIZE: usize = 22;

/// The largest script pubkey among the standard output types. Used when
/// a counterparty's payout script is not yet known.
pub const MAX_STANDARD_SCRIPT_PUBKEY_SIZE: usize = 34;

/// The length of the `2 <pk> <pk> 2 OP_CHECKMULTISIG` witness script.
pub const MULTISIG_2OF2_WITNESS_SCRIPT_SIZE: usize = 71;

/// A DER signature of maximum size, plus the trailing sighash type byte.
pub const MAX_ECDSA_WITNESS_SIGNATURE_SIZE: usize = 73;

/// This was computed using [`bitcoin`] v0.31.1.
/// Test coverage ensures this stays is up-to-date.
pub const P2WPKH_DUST_VALUE: bitcoin::Amount = bitcoin::Amount::from_sat(294);

/// This was computed using [`bitcoin`] v0.31.1.
pub const P2WSH_DUST_VALUE: bitcoin::Amount = bitcoin::Amount::from_sat(330);

/// Block heights must stay below this value to be interpreted as heights
/// rather than unix timestamps in a transaction locktime.
pub const LOCKTIME_THRESHOLD: u32 = 500_000_000;

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::{hashes::Hash as _, ScriptBuf, WPubkeyHash, WScriptHash};

    #[test]
    fn test_p2wpkh_dust() {
        let script = ScriptBuf::new_v0_p2wpkh(&WPubkeyHash::from_byte_array([1; 20]));
        assert_eq!(script.len(), P2WPKH_SCRIPT_PUBKEY_SIZE);
        assert_eq!(script.dust_value(), P2WPKH_DUST_VALUE);
    }

    #[test]
    fn test_p2wsh_dust() {
        let script = ScriptBuf::new_v0_p2wsh(&WScriptHash::from_byte_array([1; 32]));
        assert_eq!(script.len(), P2WSH_SCRIPT_PUBKEY_SIZE);
        assert_eq!(script.dust_value(), P2WSH_DUST_VALUE);
    }
}
