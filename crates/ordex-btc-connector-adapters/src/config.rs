#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RuntimeProfile {
    #[default]
    Development,
    Production,
}

impl RuntimeProfile {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Some(Self::Development),
            "production" | "prod" => Some(Self::Production),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConnectorConfig {
    pub runtime_profile: RuntimeProfile,
    pub wallet_proxy_url: Option<String>,
    /// Transport-level timeout for the proxy runtime. The connector itself never times out.
    pub proxy_timeout_ms: Option<u64>,
    pub app_name: String,
    pub app_icon: String,
    pub manifest_path: String,
    pub auth_scopes: Vec<String>,
    /// Network label reported by wallets that do not expose one (Xverse, Hiro).
    pub network_label: String,
    pub xverse_network_type: String,
    pub address_purposes: Vec<String>,
    pub address_message: String,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            runtime_profile: RuntimeProfile::Development,
            wallet_proxy_url: None,
            proxy_timeout_ms: None,
            app_name: "Ordex.ai".to_owned(),
            app_icon: "/icons/icon-384x384.png".to_owned(),
            manifest_path: "/manifest.json".to_owned(),
            auth_scopes: vec!["store_write".to_owned(), "publish_data".to_owned()],
            network_label: "mainnet".to_owned(),
            xverse_network_type: "Mainnet".to_owned(),
            address_purposes: vec!["ordinals".to_owned()],
            address_message: "Address for receiving Ordinals".to_owned(),
        }
    }
}

impl ConnectorConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(profile) =
            non_empty("ORDEX_RUNTIME_PROFILE").and_then(|v| RuntimeProfile::parse(&v))
        {
            config.runtime_profile = profile;
        }
        config.wallet_proxy_url = non_empty("ORDEX_WALLET_PROXY_URL");
        config.proxy_timeout_ms =
            non_empty("ORDEX_PROXY_TIMEOUT_MS").and_then(|v| v.trim().parse().ok());
        if let Some(name) = non_empty("ORDEX_APP_NAME") {
            config.app_name = name;
        }
        if let Some(icon) = non_empty("ORDEX_APP_ICON") {
            config.app_icon = icon;
        }
        if let Some(path) = non_empty("ORDEX_MANIFEST_PATH") {
            config.manifest_path = path;
        }
        if let Some(label) = non_empty("ORDEX_NETWORK_LABEL") {
            config.network_label = label;
        }
        config
    }

    pub fn strict_runtime_required(&self) -> bool {
        self.runtime_profile == RuntimeProfile::Production
    }
}
