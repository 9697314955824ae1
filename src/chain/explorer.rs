//! Block explorer links.

use crate::chain::types::Network;

const ETHEREUM_TEMPLATE: &str = "https://etherscan.io/tx/";

fn template_for(network: &str) -> &'static str {
    match network.trim().to_ascii_lowercase().as_str() {
        "ethereum" | "mainnet" => ETHEREUM_TEMPLATE,
        "polygon" => "https://polygonscan.com/tx/",
        "bsc" => "https://bscscan.com/tx/",
        "sepolia" => "https://sepolia.etherscan.io/tx/",
        "solana" => "https://explorer.solana.com/tx/",
        "bitcoin" => "https://www.blockchain.com/btc/tx/",
        _ => ETHEREUM_TEMPLATE,
    }
}

/// Build an explorer URL for `reference` on a network given by name.
///
/// Unrecognized names fall back to the Ethereum explorer.
pub fn explorer_url(reference: &str, network: &str) -> String {
    format!("{}{}", template_for(network), reference)
}

impl Network {
    /// Explorer link for a reference on this network. Card payments have none;
    /// hosted charges link to the charge page.
    pub fn explorer_url(&self, reference: &str) -> Option<String> {
        match self {
            Network::Card => None,
            Network::Coinbase => Some(format!("https://commerce.coinbase.com/charges/{}", reference)),
            other => Some(explorer_url(reference, other.as_str())),
        }
    }
}
