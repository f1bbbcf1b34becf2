//! Network parameters, passed explicitly instead of set through process-wide
//! globals (the source used mutable statics such as `SetAddressVersion`).

/// Address version bytes and other network-dependent constants threaded
/// through every address/script operation.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct NetworkParams {
    pub name: &'static str,
    pub bitcoin_network: bitcoin::Network,
    pub pay_to_pubkey_hash_version: u8,
    pub pay_to_script_hash_version: u8,
}

impl NetworkParams {
    pub const fn mainnet() -> Self {
        NetworkParams {
            name: "mainnet",
            bitcoin_network: bitcoin::Network::Bitcoin,
            pay_to_pubkey_hash_version: 0x00,
            pay_to_script_hash_version: 0x05,
        }
    }

    pub const fn testnet() -> Self {
        NetworkParams {
            name: "testnet",
            bitcoin_network: bitcoin::Network::Testnet,
            pay_to_pubkey_hash_version: 0x6f,
            pay_to_script_hash_version: 0xc4,
        }
    }

    pub const fn regtest() -> Self {
        NetworkParams {
            name: "regtest",
            bitcoin_network: bitcoin::Network::Regtest,
            pay_to_pubkey_hash_version: 0x6f,
            pay_to_script_hash_version: 0xc4,
        }
    }

    pub fn by_name(name: &str) -> Option<Self> {
        match name {
            "mainnet" => Some(Self::mainnet()),
            "testnet" => Some(Self::testnet()),
            "regtest" => Some(Self::regtest()),
            _ => None,
        }
    }
}

impl Default for NetworkParams {
    fn default() -> Self {
        Self::mainnet()
    }
}
