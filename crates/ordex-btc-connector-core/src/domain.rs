use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::ports::ConnectorError;

const PSBT_MAGIC: &[u8] = b"psbt\xff";

/// Canonical chain identifier for the Bitcoin networks the connectors understand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChainId {
    BtcMainnet,
    BtcSignet,
    Unknown,
}

impl ChainId {
    pub fn is_known(self) -> bool {
        !matches!(self, ChainId::Unknown)
    }

    /// Label wallets use when asked to switch to this network.
    pub fn network_label(self) -> Option<&'static str> {
        match self {
            ChainId::BtcMainnet => Some("livenet"),
            ChainId::BtcSignet => Some("testnet"),
            ChainId::Unknown => None,
        }
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChainId::BtcMainnet => "btc-mainnet",
            ChainId::BtcSignet => "btc-signet",
            ChainId::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BtcAddress(String);

impl BtcAddress {
    pub fn new(raw: impl Into<String>) -> Result<Self, ConnectorError> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(ConnectorError::Validation("empty wallet address".to_owned()));
        }
        if raw.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(ConnectorError::Validation(format!(
                "wallet address contains whitespace: {raw:?}"
            )));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for BtcAddress {
    type Err = ConnectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for BtcAddress {
    type Error = ConnectorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<BtcAddress> for String {
    fn from(value: BtcAddress) -> Self {
        value.0
    }
}

impl fmt::Display for BtcAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Raw PSBT bytes handed to a wallet for signing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PsbtPayload(Vec<u8>);

impl PsbtPayload {
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, ConnectorError> {
        if !bytes.starts_with(PSBT_MAGIC) {
            return Err(ConnectorError::Validation(
                "payload is not a PSBT (missing magic prefix)".to_owned(),
            ));
        }
        Ok(Self(bytes))
    }

    pub fn from_hex(raw: &str) -> Result<Self, ConnectorError> {
        let bytes = hex::decode(raw.trim().trim_start_matches("0x"))
            .map_err(|e| ConnectorError::Validation(format!("invalid psbt hex: {e}")))?;
        Self::from_bytes(bytes)
    }

    pub fn from_base64(raw: &str) -> Result<Self, ConnectorError> {
        let bytes = BASE64
            .decode(raw.trim())
            .map_err(|e| ConnectorError::Validation(format!("invalid psbt base64: {e}")))?;
        Self::from_bytes(bytes)
    }

    /// Accepts either encoding wallets commonly hand back.
    pub fn parse(raw: &str) -> Result<Self, ConnectorError> {
        let trimmed = raw.trim();
        if !trimmed.is_empty() && trimmed.chars().all(|c| c.is_ascii_hexdigit()) {
            return Self::from_hex(trimmed);
        }
        Self::from_base64(trimmed)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    pub fn to_base64(&self) -> String {
        BASE64.encode(&self.0)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedPsbt {
    pub psbt: PsbtPayload,
    pub txid: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WalletKind {
    Unisat,
    Xverse,
    Hiro,
}

impl fmt::Display for WalletKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WalletKind::Unisat => "Unisat",
            WalletKind::Xverse => "Xverse",
            WalletKind::Hiro => "Hiro",
        };
        f.write_str(name)
    }
}

/// How far a silent reconnection on page load may go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EagerPolicy {
    /// The wallet makes no distinction between silent and prompting account requests.
    RequestAccounts,
    /// Only an already persisted session may be restored; never prompt.
    ExistingSessionOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivationStatus {
    Idle,
    Activating,
    Activated,
    Errored,
}

/// Data published to the shared application store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreState {
    pub activating: bool,
    pub chain_id: Option<ChainId>,
    pub accounts: Vec<BtcAddress>,
}

impl StoreState {
    pub fn is_idle(&self) -> bool {
        !self.activating && self.chain_id.is_none() && self.accounts.is_empty()
    }

    pub fn has_connection(&self) -> bool {
        !self.accounts.is_empty() && self.chain_id.is_some()
    }
}

/// Partial store update. Fields left as `None` are not touched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateUpdate {
    pub chain_id: Option<ChainId>,
    pub accounts: Option<Vec<BtcAddress>>,
}

impl StateUpdate {
    pub fn chain(chain_id: ChainId) -> Self {
        Self {
            chain_id: Some(chain_id),
            accounts: None,
        }
    }

    pub fn accounts(accounts: Vec<BtcAddress>) -> Self {
        Self {
            chain_id: None,
            accounts: Some(accounts),
        }
    }

    pub fn full(chain_id: ChainId, accounts: Vec<BtcAddress>) -> Self {
        Self {
            chain_id: Some(chain_id),
            accounts: Some(accounts),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.chain_id.is_none() && self.accounts.is_none()
    }
}

/// The activation state machine's view of one connector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectorState {
    pub status: ActivationStatus,
    pub chain_id: Option<ChainId>,
    pub accounts: Vec<BtcAddress>,
}
