use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use ordex_btc_connector_core::{BtcAddress, ConnectorError};

use crate::config::ConnectorConfig;
use crate::transport::WalletTransport;

pub const AUTH_CANCELLED: &str = "authentication popup closed";
pub const MISSING_ORDINAL_ADDRESS: &str =
    "Unable to fetch Ordinal address from Hiro wallet. Disconnect and try again.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserData {
    #[serde(default)]
    pub app_private_key: Option<String>,
    #[serde(default)]
    pub profile: Profile,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    #[serde(default)]
    pub btc_address: Option<AddressSet>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressSet {
    #[serde(default)]
    pub p2tr: Option<NetworkAddresses>,
    #[serde(default)]
    pub p2wpkh: Option<NetworkAddresses>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkAddresses {
    #[serde(default)]
    pub mainnet: Option<String>,
    #[serde(default)]
    pub testnet: Option<String>,
}

impl UserData {
    /// Mainnet taproot address; ordinals live there.
    pub fn ordinal_address(&self) -> Result<BtcAddress, ConnectorError> {
        self.profile
            .btc_address
            .as_ref()
            .and_then(|set| set.p2tr.as_ref())
            .and_then(|p2tr| p2tr.mainnet.as_deref())
            .filter(|raw| !raw.is_empty())
            .ok_or_else(|| ConnectorError::Session(MISSING_ORDINAL_ADDRESS.to_owned()))
            .and_then(BtcAddress::new)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthOptions {
    pub manifest_path: String,
    pub app_details: AppDetails,
    pub scopes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppDetails {
    pub name: String,
    pub icon: String,
}

impl AuthOptions {
    pub fn from_config(config: &ConnectorConfig) -> Self {
        Self {
            manifest_path: config.manifest_path.clone(),
            app_details: AppDetails {
                name: config.app_name.clone(),
                icon: config.app_icon.clone(),
            },
            scopes: config.auth_scopes.clone(),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthResponse {
    #[serde(default)]
    user_data: Option<UserData>,
    #[serde(default)]
    cancelled: bool,
}

/// Sign-in state for session-based wallets.
#[derive(Debug, Default)]
pub struct UserSession {
    state: Mutex<SessionState>,
}

#[derive(Debug, Default)]
struct SessionState {
    user_data: Option<UserData>,
    pending_token: Option<String>,
}

impl UserSession {
    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    pub fn is_user_signed_in(&self) -> bool {
        self.state().user_data.is_some()
    }

    pub fn is_sign_in_pending(&self) -> bool {
        self.state().pending_token.is_some()
    }

    pub fn load_user_data(&self) -> Result<UserData, ConnectorError> {
        self.state()
            .user_data
            .clone()
            .ok_or_else(|| ConnectorError::Session("no signed-in user".to_owned()))
    }

    pub fn store_user_data(&self, user_data: UserData) {
        let mut g = self.state();
        g.user_data = Some(user_data);
        g.pending_token = None;
    }

    /// Records an auth response token delivered by redirect, to be completed later.
    pub fn set_pending_sign_in(&self, token: impl Into<String>) {
        self.state().pending_token = Some(token.into());
    }

    pub fn sign_user_out(&self) {
        let mut g = self.state();
        g.user_data = None;
        g.pending_token = None;
    }

    pub async fn handle_pending_sign_in(
        &self,
        transport: &WalletTransport,
    ) -> Result<UserData, ConnectorError> {
        let token = self
            .state()
            .pending_token
            .take()
            .ok_or_else(|| ConnectorError::Session("no pending sign-in".to_owned()))?;
        let response = transport.call("handlePendingSignIn", json!([token])).await?;
        let user_data = parse_auth_response(response)?;
        self.store_user_data(user_data.clone());
        debug!(wallet = %transport.wallet(), "pending sign-in completed");
        Ok(user_data)
    }

    /// Opens the wallet's sign-in popup. Closing it fails with a session error.
    pub async fn authenticate(
        &self,
        transport: &WalletTransport,
        options: &AuthOptions,
    ) -> Result<UserData, ConnectorError> {
        let options = serde_json::to_value(options)
            .map_err(|e| ConnectorError::Validation(format!("auth options encode failed: {e}")))?;
        let response = transport.call("authenticate", json!([options])).await?;
        let user_data = parse_auth_response(response)?;
        self.store_user_data(user_data.clone());
        debug!(wallet = %transport.wallet(), "user signed in");
        Ok(user_data)
    }
}

fn parse_auth_response(response: Value) -> Result<UserData, ConnectorError> {
    let response: AuthResponse = serde_json::from_value(response)
        .map_err(|e| ConnectorError::Transport(format!("invalid auth response: {e}")))?;
    match response {
        AuthResponse {
            user_data: Some(user_data),
            cancelled: false,
        } => Ok(user_data),
        _ => Err(ConnectorError::Session(AUTH_CANCELLED.to_owned())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_data(mainnet: Option<&str>) -> UserData {
        serde_json::from_value(json!({
            "appPrivateKey": "key",
            "profile": { "btcAddress": { "p2tr": { "mainnet": mainnet, "testnet": "tb1ptest" } } }
        }))
        .expect("user data")
    }

    #[test]
    fn ordinal_address_comes_from_mainnet_taproot() {
        let data = user_data(Some("bc1pordinals"));
        assert_eq!(data.ordinal_address().expect("address").as_str(), "bc1pordinals");
    }

    #[test]
    fn missing_ordinal_address_is_a_session_error() {
        for data in [user_data(None), user_data(Some(""))] {
            assert_eq!(
                data.ordinal_address(),
                Err(ConnectorError::Session(MISSING_ORDINAL_ADDRESS.to_owned()))
            );
        }
        let bare: UserData = serde_json::from_value(json!({})).expect("empty user data");
        assert!(bare.ordinal_address().is_err());
    }

    #[test]
    fn session_lifecycle() {
        let session = UserSession::default();
        assert!(!session.is_user_signed_in());
        assert!(session.load_user_data().is_err());

        session.set_pending_sign_in("token");
        assert!(session.is_sign_in_pending());

        session.store_user_data(user_data(Some("bc1pordinals")));
        assert!(session.is_user_signed_in());
        assert!(!session.is_sign_in_pending());

        session.sign_user_out();
        assert!(!session.is_user_signed_in());
    }

    #[test]
    fn auth_options_serialize_in_wallet_shape() {
        let options = AuthOptions::from_config(&ConnectorConfig::default());
        assert_eq!(
            serde_json::to_value(&options).expect("encode"),
            json!({
                "manifestPath": "/manifest.json",
                "appDetails": { "name": "Ordex.ai", "icon": "/icons/icon-384x384.png" },
                "scopes": ["store_write", "publish_data"]
            })
        );
    }

    #[test]
    fn cancelled_response_is_a_session_error() {
        assert_eq!(
            parse_auth_response(json!({ "cancelled": true })),
            Err(ConnectorError::Session(AUTH_CANCELLED.to_owned()))
        );
    }
}
