//! ordex-btc-connector: connect to an injected Bitcoin wallet and print the connector state

mod bridge;

use clap::{Parser, Subcommand, ValueEnum};
use eyre::WrapErr;
use serde_json::json;

use ordex_btc_connector_adapters::ConnectorConfig;
use ordex_btc_connector_core::{ChainId, WalletKind};

use bridge::ConnectorBridge;

#[derive(Parser, Debug)]
#[command(name = "ordex-btc-connector")]
#[command(about = "Drive a Unisat, Xverse or Hiro wallet connector")]
struct Args {
    /// Wallet to connect to
    #[arg(short, long, value_enum, default_value_t = WalletArg::Unisat)]
    wallet: WalletArg,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check whether the wallet is available
    Detect,
    /// Reconnect silently, the way a page load would
    Eager,
    /// Request accounts and report the resulting state
    Connect {
        /// Network to ask the wallet to switch to
        #[arg(long, value_enum)]
        chain: Option<ChainArg>,
    },
    /// Connect, then sign a PSBT given as hex or base64
    Sign {
        #[arg(long)]
        psbt: String,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum WalletArg {
    Unisat,
    Xverse,
    Hiro,
}

impl From<WalletArg> for WalletKind {
    fn from(arg: WalletArg) -> Self {
        match arg {
            WalletArg::Unisat => WalletKind::Unisat,
            WalletArg::Xverse => WalletKind::Xverse,
            WalletArg::Hiro => WalletKind::Hiro,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ChainArg {
    Mainnet,
    Signet,
}

impl From<ChainArg> for ChainId {
    fn from(arg: ChainArg) -> Self {
        match arg {
            ChainArg::Mainnet => ChainId::BtcMainnet,
            ChainArg::Signet => ChainId::BtcSignet,
        }
    }
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let wallet = WalletKind::from(args.wallet);
    let config = ConnectorConfig::from_env();
    tracing::info!(%wallet, profile = ?config.runtime_profile, "starting connector");

    let bridge = ConnectorBridge::new(wallet, config);
    bridge.watch_store();

    let output = match args.command {
        Command::Detect => {
            let installed = bridge.detect().await.wrap_err("wallet detection failed")?;
            json!({ "wallet": wallet, "installed": installed })
        }
        Command::Eager => serde_json::to_value(bridge.connect_eagerly().await)?,
        Command::Connect { chain } => {
            let state = bridge
                .activate(chain.map(ChainId::from))
                .await
                .wrap_err_with(|| format!("could not connect to {wallet}"))?;
            serde_json::to_value(state)?
        }
        Command::Sign { psbt } => bridge
            .sign(&psbt)
            .await
            .wrap_err_with(|| format!("{wallet} did not sign the psbt"))?,
    };

    let reported = bridge.reported_errors();
    if !reported.is_empty() {
        tracing::warn!(count = reported.len(), errors = ?reported, "connector reported errors");
    }
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
