use crate::domain::ChainId;

pub fn resolve_chain_id(network: &str) -> ChainId {
    match network {
        "livenet" | "mainnet" => ChainId::BtcMainnet,
        "testnet" => ChainId::BtcSignet,
        _ => ChainId::Unknown,
    }
}
