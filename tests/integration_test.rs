use scriptlink::bindings::{Arity, TypeSignature, Value};
use scriptlink::config::Side;
use scriptlink::network::{
    CallTarget, LinkConditions, LoopbackNetwork, LoopbackTransport, PeerId, Priority, Reliability,
    Reorder, RpcDispatcher,
};
use scriptlink::{BridgeConfig, BridgeHost};
use std::cell::RefCell;
use std::fs;
use std::path::Path;
use std::rc::Rc;

fn write_chat_resource(root: &Path) -> anyhow::Result<()> {
    let dir = root.join("chat");
    fs::create_dir_all(dir.join("server"))?;
    fs::create_dir_all(dir.join("client"))?;
    fs::write(
        dir.join("resource.toml"),
        r#"
name = "chat"

[[script]]
file = "shared.js"
kind = "shared"

[[script]]
file = "server/main.js"
kind = "server"

[[script]]
file = "client/main.js"
kind = "client"
"#,
    )?;
    fs::write(dir.join("shared.js"), "var SERVER = 1;")?;
    fs::write(
        dir.join("server/main.js"),
        "var joined = []; function onJoin(sender, name) { joined.push([sender, name]); relayRemote('joined', sender, name); }",
    )?;
    fs::write(
        dir.join("client/main.js"),
        "var seen = []; function onJoined(sender, name) { seen.push(name); }",
    )?;
    Ok(())
}

fn host_for(
    root: &Path,
    network: &LoopbackNetwork,
    side: Side,
) -> anyhow::Result<BridgeHost<LoopbackTransport>> {
    let toml = format!(
        "[scripting]\nresource_root = {:?}\nresources = [\"chat\"]\nside = \"{}\"\n",
        root.display().to_string(),
        side
    );
    let config = BridgeConfig::from_toml_str(&toml)?;
    let mut host = BridgeHost::new(config, network.connect())?;
    host.start()?;
    Ok(host)
}

#[test]
fn test_resources_drive_remote_calls() -> anyhow::Result<()> {
    let root = tempfile::tempdir()?;
    write_chat_resource(root.path())?;

    let network = LoopbackNetwork::new();
    let mut server = host_for(root.path(), &network, Side::Server)?;
    let mut alice = host_for(root.path(), &network, Side::Client)?;
    let mut bob = host_for(root.path(), &network, Side::Client)?;
    assert_eq!(server.local_peer(), PeerId(1));
    assert_eq!(server.resources().len(), 1);

    server.forward_to_script("join", "onJoin");
    alice.forward_to_script("joined", "onJoined");
    bob.forward_to_script("joined", "onJoined");

    alice.execute("join.js", "triggerRemote('join', SERVER, 'alice');")?;
    alice.tick();
    server.tick();
    alice.tick();
    bob.tick();

    assert_eq!(
        server.evaluate("joined")?,
        Value::Array(vec![Value::Array(vec![
            Value::Int(i64::from(alice.local_peer().0)),
            Value::from("alice"),
        ])])
    );
    assert_eq!(alice.evaluate("seen.length")?, Value::Int(0));
    assert_eq!(bob.evaluate("seen")?, Value::Array(vec![Value::from("alice")]));

    // client scripts never run on the server side
    assert_eq!(server.evaluate("typeof onJoined")?, Value::from("undefined"));

    server.shutdown();
    alice.shutdown();
    bob.shutdown();
    Ok(())
}

struct Inventory {
    items: Vec<String>,
}

#[test]
fn test_native_classes_through_host() -> anyhow::Result<()> {
    let network = LoopbackNetwork::new();
    let mut host = BridgeHost::new(BridgeConfig::default(), network.connect())?;
    {
        let mut registry = host.registry().borrow_mut();
        registry.register_class("Inventory", None, |_| Some(Inventory { items: Vec::new() }))?;
        registry.register_method(
            "Inventory",
            "add",
            Arity::Fixed(1),
            TypeSignature::parse("s")?,
            |inv: &mut Inventory, m| {
                inv.items.push(m.pop::<String>());
                Value::Int(inv.items.len() as i64)
            },
        )?;
        registry.register_method(
            "Inventory",
            "list",
            Arity::Fixed(0),
            TypeSignature::any(),
            |inv: &mut Inventory, _| {
                Value::Array(inv.items.iter().map(|s| Value::from(s.as_str())).collect())
            },
        )?;
    }
    host.start()?;

    host.execute(
        "inv.js",
        "var bag = Inventory.create(); bag.add('sword'); bag.add('shield');",
    )?;
    assert_eq!(
        host.evaluate("bag.list()")?,
        Value::Array(vec![Value::from("sword"), Value::from("shield")])
    );
    assert_eq!(host.registry().borrow().live_instances(), 1);

    host.evaluate("bag.destroy()")?;
    assert_eq!(host.registry().borrow().live_instances(), 0);
    host.shutdown();
    Ok(())
}

#[test]
fn test_dropped_script_objects_release_natives() -> anyhow::Result<()> {
    let network = LoopbackNetwork::new();
    let mut host = BridgeHost::new(BridgeConfig::default(), network.connect())?;
    host.registry()
        .borrow_mut()
        .register_class("Inventory", None, |_| Some(Inventory { items: Vec::new() }))?;
    host.start()?;

    host.execute("scratch.js", "(function () { Inventory.create(); })();")?;
    host.tick();
    assert_eq!(host.registry().borrow().live_instances(), 0);
    assert_eq!(host.registry().borrow().released(), 1);

    // a reference cycle keeps the wrapper alive until the collector runs
    host.execute(
        "cycle.js",
        "(function () { var bag = Inventory.create(); var box = { bag: bag }; bag.owner = box; })();",
    )?;
    host.collect_garbage();
    assert_eq!(host.registry().borrow().live_instances(), 0);
    assert_eq!(host.registry().borrow().released(), 2);

    host.execute("kept.js", "var kept = Inventory.create();")?;
    host.tick();
    assert_eq!(host.registry().borrow().live_instances(), 1);
    host.shutdown();
    assert_eq!(host.registry().borrow().live_instances(), 0);
    Ok(())
}

#[test]
fn test_remote_calls_reach_native_functions() -> anyhow::Result<()> {
    let network = LoopbackNetwork::new();
    let config = BridgeConfig::default();
    let mut server = RpcDispatcher::new(network.connect(), config.network.clone());
    let mut client = RpcDispatcher::new(network.connect(), config.network.clone());

    let scores = Rc::new(RefCell::new(Vec::new()));
    let registry = Rc::new(RefCell::new(scriptlink::FunctionRegistry::new()));
    let sink = Rc::clone(&scores);
    registry.borrow_mut().register_function(
        "recordScore",
        Arity::Fixed(3),
        TypeSignature::parse("i s i")?,
        move |m| {
            let sender = m.pop::<i64>();
            let name = m.pop::<String>();
            let score = m.pop::<i64>();
            sink.borrow_mut().push((sender, name, score));
            Value::Bool(true)
        },
    );
    server.forward_to_registry("score", Rc::clone(&registry), "recordScore");

    client.call(
        "score",
        &[Value::from("alice"), Value::Int(1200)],
        Priority::High,
        Reliability::Reliable,
        CallTarget::Peer(server.local_peer()),
    )?;
    // wrong argument types are rejected before the native runs
    client.call(
        "score",
        &[Value::Int(1), Value::Int(2)],
        Priority::High,
        Reliability::Reliable,
        CallTarget::Peer(server.local_peer()),
    )?;
    let report = server.poll();

    assert_eq!(report.received, 2);
    assert_eq!(
        *scores.borrow(),
        vec![(i64::from(client.local_peer().0), "alice".to_string(), 1200)]
    );
    Ok(())
}

#[test]
fn test_ordered_calls_survive_shuffled_link() -> anyhow::Result<()> {
    let network = LoopbackNetwork::new();
    let config = BridgeConfig::default();
    let sender_transport = network.connect();
    let receiver_transport = network.connect_with(LinkConditions {
        reorder: Reorder::Shuffle,
        seed: 7,
        ..Default::default()
    });
    let mut sender = RpcDispatcher::new(sender_transport, config.network.clone());
    let mut receiver = RpcDispatcher::new(receiver_transport, config.network.clone());

    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    receiver.register_handler("step", move |_, m| sink.borrow_mut().push(m.pop::<i64>()));

    let target = CallTarget::Peer(receiver.local_peer());
    for step in 0..20 {
        sender.call(
            "step",
            &[Value::Int(step)],
            Priority::Medium,
            Reliability::ReliableOrdered,
            target,
        )?;
    }
    receiver.poll();

    assert_eq!(*seen.borrow(), (0..20).collect::<Vec<i64>>());
    Ok(())
}
