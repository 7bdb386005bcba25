// src/main.rs
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use dotenv::dotenv;
use ethers::signers::LocalWallet;
use ethers::types::Address;
use jsonrpsee::server::{ServerBuilder, ServerHandle};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use multisig_userop::chain::{ChainClient, RpcChain};
use multisig_userop::keys::{KeyProvider, LocalKeys};
use multisig_userop::rpc::{MultisigRpcImpl, MultisigRpcServer};
use multisig_userop::service::MultisigService;
use multisig_userop::{AddressResolver, OperationBuilder};

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    #[clap(short, long, default_value = "127.0.0.1:8546")]
    rpc_server_addr: String,

    #[clap(short, long)]
    eth_rpc_url: String,

    /// Entry point contract that verifies and executes operations
    #[clap(long)]
    entry_point: String,

    /// Account factory contract
    #[clap(long)]
    factory: String,

    #[clap(long)]
    account_implementation: String,

    /// Hex creation code of the proxy the factory deploys
    #[clap(long)]
    proxy_creation_code: String,

    /// Ordered signer keys, comma separated. Overrides the mnemonic.
    #[clap(long, value_delimiter = ',')]
    private_keys: Vec<String>,

    /// Falls back to the MNEMONIC environment variable
    #[clap(long)]
    mnemonic: Option<String>,

    /// Ordered derivation indices under m/44'/60'/0'/0
    #[clap(long, value_delimiter = ',', default_value = "1,2")]
    signer_indices: Vec<u32>,

    /// Funded key that sends handleOps transactions. Read-only without it.
    #[clap(long)]
    bundler_private_key: Option<String>,

    /// Queried from the node when omitted
    #[clap(short, long)]
    chain_id: Option<u64>,

    #[clap(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let args = Args::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(if args.verbose { Level::DEBUG } else { Level::INFO })
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let keys = load_keys(&args)?;

    let resolver = AddressResolver::new(
        parse_address("factory", &args.factory)?,
        parse_address("account implementation", &args.account_implementation)?,
        hex::decode(args.proxy_creation_code.trim_start_matches("0x"))
            .context("proxy creation code is not hex")?
            .into(),
    );
    let entry_point = parse_address("entry point", &args.entry_point)?;

    let mut rpc_chain = RpcChain::new(&args.eth_rpc_url)?;
    if let Some(key) = &args.bundler_private_key {
        let wallet = key
            .trim()
            .parse::<LocalWallet>()
            .map_err(|e| anyhow::anyhow!("invalid bundler private key: {}", e))?;
        rpc_chain = rpc_chain.with_bundler(wallet);
    }
    let chain: Arc<dyn ChainClient> = Arc::new(rpc_chain);
    let builder = match args.chain_id {
        Some(chain_id) => OperationBuilder::new(chain, entry_point, chain_id, resolver),
        None => OperationBuilder::connect(chain, entry_point, resolver).await?,
    };

    let service = MultisigService::new(builder, keys)?;

    let server_addr: SocketAddr = args.rpc_server_addr.parse()?;
    let multisig_rpc = MultisigRpcImpl::new(Arc::new(service));

    info!("Starting multisig operation RPC server on {}", server_addr);

    let server_handle = start_server(server_addr, multisig_rpc).await?;

    // Keep the server running until Ctrl+C is pressed
    tokio::signal::ctrl_c().await?;
    server_handle.stop()?;
    info!("Server stopped");

    Ok(())
}

fn load_keys(args: &Args) -> anyhow::Result<Arc<dyn KeyProvider>> {
    if !args.private_keys.is_empty() {
        return Ok(Arc::new(LocalKeys::from_private_keys(args.private_keys.as_slice())?));
    }

    let mnemonic = match &args.mnemonic {
        Some(mnemonic) => mnemonic.clone(),
        None => std::env::var("MNEMONIC").context("no --private-keys, --mnemonic or MNEMONIC")?,
    };
    Ok(Arc::new(LocalKeys::from_mnemonic(&mnemonic, &args.signer_indices)?))
}

fn parse_address(name: &str, value: &str) -> anyhow::Result<Address> {
    value
        .parse::<Address>()
        .map_err(|e| anyhow::anyhow!("invalid {} address {}: {:?}", name, value, e))
}

async fn start_server(
    server_addr: SocketAddr,
    multisig_rpc: MultisigRpcImpl,
) -> anyhow::Result<ServerHandle> {
    let server = ServerBuilder::default()
        .build(server_addr)
        .await?;

    let server_handle = server.start(multisig_rpc.into_rpc());

    Ok(server_handle)
}
