//! Two inspected tabs, one relay, one evaluation bridge.
//!
//! Each tab serves the `math` channel on the session bus. Two panels on the
//! inspector bus call "their" tab through the relay, and a devtools-style
//! caller reaches a third context through the evaluation bridge.
//!
//! Run with: cargo run --example relay_math
//! Set RUST_LOG=ctxrpc=debug to watch the traffic.

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use ctxrpc::{
    //
    create_push_transport,
    session_channel,
    start_server,
    BridgeHost,
    Bus,
    ContextId,
    EvalBridgeTransport,
    FnService,
    Relay,
    RpcClient,
    RpcConfig,
};

fn math(tab: &'static str) -> FnService {
    // ---
    FnService::new("math")
        .method("add", |(a, b): (i64, i64)| async move { Ok(a + b) })
        .method("whoami", move |_: ()| async move { Ok(tab) })
}

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let sessions = Bus::new();
    let inspectors = Bus::new();
    let relay = Relay::start(&sessions, &inspectors, &RpcConfig::new("background"));

    // ---
    // Inspected tabs
    let mut servers = Vec::new();
    for tab in ["tab-1", "tab-2"] {
        let transport = create_push_transport(&sessions, &RpcConfig::new(tab)).await?;
        servers.push(start_server(transport, math(tab)).await?);
    }

    // ---
    // One panel per tab
    for tab in ["tab-1", "tab-2"] {
        let config = RpcConfig::new(format!("panel-{tab}"));
        let transport = create_push_transport(&inspectors, &config).await?;
        let channel = session_channel("math", &config.session_separator, &ContextId::from(tab));

        let client = RpcClient::new(transport, channel).await?;
        let who: String = client.request("whoami", &()).await?;
        let sum: i64 = client.request("add", &(2, 3)).await?;
        println!("{} says 2 + 3 = {sum}", who);

        client.dispose().await?;
    }

    // ---
    // Evaluation bridge
    let config = RpcConfig::new("devtools");
    let host = BridgeHost::new(&config);
    host.register(math("page"))?;

    let client = RpcClient::new(EvalBridgeTransport::create(host, &config), "math").await?;
    let sum: i64 = client.request("add", &(40, 2)).await?;
    println!("page (via bridge) says 40 + 2 = {sum}");

    match client.request::<_, i64>("mul", &(6, 7)).await {
        Ok(_) => println!("unexpected: mul exists"),
        Err(err) => println!("page rejected mul: {err}"),
    }

    for server in servers {
        server.stop().await?;
    }
    relay.stop();
    Ok(())
}
