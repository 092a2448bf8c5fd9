//! 两个节点的本地回环演示：客户端脚本向服务端发起聊天调用，服务端脚本回执并广播。

use scriptlink::config::Side;
use scriptlink::core::init_logging;
use scriptlink::network::{LoopbackNetwork, LoopbackTransport};
use scriptlink::{BridgeConfig, BridgeHost, BridgeResult};

const SERVER_SCRIPT: &str = r#"
var history = [];
function onChat(sender, text) {
    history.push(text);
    console.log('peer ' + sender + ' says: ' + text);
    triggerRemote('chatAck', sender, history.length);
}
"#;

const CLIENT_SCRIPT: &str = r#"
function onChatAck(sender, count) {
    console.log('server ' + sender + ' has ' + count + ' message(s)');
}
"#;

fn build_host(
    config: &BridgeConfig,
    network: &LoopbackNetwork,
    side: Side,
) -> BridgeResult<BridgeHost<LoopbackTransport>> {
    let mut config = config.clone();
    config.scripting.side = side;
    let mut host = BridgeHost::new(config, network.connect())?;
    host.start()?;
    Ok(host)
}

fn run() -> BridgeResult<()> {
    let config = BridgeConfig::load_or_default();
    init_logging(&config.logging)?;

    let network = LoopbackNetwork::new();
    let mut server = build_host(&config, &network, Side::Server)?;
    let mut client = build_host(&config, &network, Side::Client)?;

    server.execute("server.js", SERVER_SCRIPT)?;
    server.forward_to_script("chat", "onChat");
    client.execute("client.js", CLIENT_SCRIPT)?;
    client.forward_to_script("chatAck", "onChatAck");

    let server_id = server.local_peer().0;
    for line in ["hello", "anyone here?", "bye"] {
        client.execute(
            "send.js",
            &format!("triggerRemote('chat', {}, {:?});", server_id, line),
        )?;
        client.tick();
        server.tick();
        client.tick();
    }

    tracing::info!(
        server = ?server.dispatcher().stats(),
        client = ?client.dispatcher().stats(),
        "demo finished"
    );
    client.shutdown();
    server.shutdown();
    Ok(())
}

fn main() {
    if let Err(e) = run() {
        eprintln!("scriptlink failed: {}", e);
        std::process::exit(1);
    }
}
