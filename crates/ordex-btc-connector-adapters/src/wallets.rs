use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde_json::Value;
use tracing::{debug, warn};

use ordex_btc_connector_core::{BtcAddress, ConnectorError, EagerPolicy, ProviderEvent, WalletKind};

/// How a wallet hands out its accounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountsCall {
    /// Plain method returning an array of address strings.
    Request(&'static str),
    /// Method taking an unsecured address-request token, answering `{addresses: [{address}]}`.
    AddressToken(&'static str),
    /// Accounts come from the signed-in user's session data.
    Session,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkSource {
    Rpc(&'static str),
    /// The wallet exposes no network query; the configured label is reported.
    Configured,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignCall {
    /// Hex PSBT in, hex PSBT out.
    Hex(&'static str),
    /// Unsecured token carrying a base64 PSBT, answering `{psbtBase64, txId}`.
    Token(&'static str),
    /// Request object `{hex, network, allowedSighash}` sent on behalf of a signed-in session.
    Session(&'static str),
}

/// Static description of an injected wallet: where it lives and which calls it speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalletVariant {
    pub kind: WalletKind,
    pub global: &'static str,
    pub accounts: AccountsCall,
    pub network: NetworkSource,
    pub sign: SignCall,
    pub switch_network: Option<&'static str>,
    pub emits_events: bool,
    pub eager: EagerPolicy,
}

pub const UNISAT: WalletVariant = WalletVariant {
    kind: WalletKind::Unisat,
    global: "unisat",
    accounts: AccountsCall::Request("requestAccounts"),
    network: NetworkSource::Rpc("getNetwork"),
    sign: SignCall::Hex("signPsbt"),
    switch_network: Some("switchNetwork"),
    emits_events: true,
    eager: EagerPolicy::RequestAccounts,
};

pub const XVERSE: WalletVariant = WalletVariant {
    kind: WalletKind::Xverse,
    global: "BitcoinProvider",
    accounts: AccountsCall::AddressToken("connect"),
    network: NetworkSource::Configured,
    sign: SignCall::Token("signTransaction"),
    switch_network: None,
    emits_events: false,
    eager: EagerPolicy::RequestAccounts,
};

pub const HIRO: WalletVariant = WalletVariant {
    kind: WalletKind::Hiro,
    global: "HiroWalletProvider",
    accounts: AccountsCall::Session,
    network: NetworkSource::Configured,
    sign: SignCall::Session("signPsbt"),
    switch_network: None,
    emits_events: false,
    eager: EagerPolicy::ExistingSessionOnly,
};

/// Sighash types Hiro may apply: ALL, NONE, SINGLE and their ANYONECANPAY forms.
pub const HIRO_ALLOWED_SIGHASH: [u8; 6] = [0x01, 0x02, 0x03, 0x81, 0x82, 0x83];

pub const EVENT_NAMES: [&str; 4] = ["connect", "disconnect", "networkChanged", "accountsChanged"];

impl WalletVariant {
    pub fn for_kind(kind: WalletKind) -> Self {
        match kind {
            WalletKind::Unisat => UNISAT,
            WalletKind::Xverse => XVERSE,
            WalletKind::Hiro => HIRO,
        }
    }
}

/// Translates a raw wallet event payload into a [`ProviderEvent`].
///
/// Invalid account entries are dropped. A non-empty account list with no valid entry is
/// ignored rather than read as a disconnect.
pub fn event_from_payload(name: &str, payload: &Value) -> Option<ProviderEvent> {
    match name {
        "connect" => Some(ProviderEvent::Connect),
        "disconnect" => {
            let reason = payload
                .get("message")
                .and_then(Value::as_str)
                .or_else(|| payload.as_str())
                .map(|m| ConnectorError::Disconnected(m.to_owned()));
            Some(ProviderEvent::Disconnect(reason))
        }
        "networkChanged" => payload
            .as_str()
            .map(|network| ProviderEvent::NetworkChanged(network.to_owned())),
        "accountsChanged" => {
            let entries = payload.as_array().map(Vec::as_slice).unwrap_or_default();
            let accounts: Vec<BtcAddress> = entries
                .iter()
                .filter_map(|entry| match entry.as_str().map(BtcAddress::new) {
                    Some(Ok(address)) => Some(address),
                    _ => {
                        debug!(%entry, "dropping invalid account from accountsChanged");
                        None
                    }
                })
                .collect();
            if accounts.is_empty() && !entries.is_empty() {
                warn!(count = entries.len(), "ignoring accountsChanged without a valid account");
                return None;
            }
            Some(ProviderEvent::AccountsChanged(accounts))
        }
        _ => None,
    }
}

const UNSECURED_HEADER: &[u8] = br#"{"typ":"JWT","alg":"none"}"#;

/// Encodes `payload` as an `alg: none` JWT: `header.payload.` with an empty signature.
pub fn unsecured_token(payload: &Value) -> Result<String, ConnectorError> {
    let body = serde_json::to_vec(payload)
        .map_err(|e| ConnectorError::Validation(format!("token payload encode failed: {e}")))?;
    Ok(format!(
        "{}.{}.",
        URL_SAFE_NO_PAD.encode(UNSECURED_HEADER),
        URL_SAFE_NO_PAD.encode(body)
    ))
}

pub fn decode_unsecured_token(token: &str) -> Result<Value, ConnectorError> {
    let mut parts = token.split('.');
    let (Some(_header), Some(body)) = (parts.next(), parts.next()) else {
        return Err(ConnectorError::Validation("malformed unsecured token".to_owned()));
    };
    let raw = URL_SAFE_NO_PAD
        .decode(body)
        .map_err(|e| ConnectorError::Validation(format!("token payload is not base64url: {e}")))?;
    serde_json::from_slice(&raw)
        .map_err(|e| ConnectorError::Validation(format!("token payload is not json: {e}")))
}
