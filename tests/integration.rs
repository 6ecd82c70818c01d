mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::join_all;

use ctxrpc::{
    //
    create_push_transport,
    start_server,
    Body,
    Bus,
    Channel,
    Envelope,
    Failure,
    FnService,
    Reply,
    RequestId,
    Result,
    RpcClient,
    RpcConfig,
    RpcError,
    Transport,
    Value,
};

use common::{init_logging, wait_for_pending, Calculator, MathClient, MathService};

async fn math_pair(
    bus: &Arc<Bus>,
    calculator: Calculator,
) -> Result<(MathClient, ctxrpc::ServerHandle)> {
    // ---
    let server_side = create_push_transport(bus, &RpcConfig::new("page")).await?;
    let client_side = create_push_transport(bus, &RpcConfig::new("panel")).await?;

    let server = start_server(server_side, MathService(calculator)).await?;
    let client = MathClient::connect(client_side).await?;
    Ok((client, server))
}

#[tokio::test]
async fn add_resolves_to_five() -> Result<()> {
    // ---
    init_logging();

    let bus = Bus::new();
    let calculator = Calculator::new("page");
    let (math, server) = math_pair(&bus, calculator.clone()).await?;

    assert_eq!(math.add(2, 3).await?, 5);
    assert_eq!(calculator.calls(), 1);

    server.stop().await?;
    math.dispose().await?;
    Ok(())
}

#[tokio::test]
async fn fail_rejects_with_boom() -> Result<()> {
    // ---
    init_logging();

    let bus = Bus::new();
    let calculator = Calculator::new("page");
    let (math, server) = math_pair(&bus, calculator.clone()).await?;

    let err = math.fail().await.unwrap_err();
    assert_eq!(err.as_remote().map(|f| f.message.as_str()), Some("boom"));

    // Give a retry a chance to show up; there must not be one.
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(calculator.calls(), 1);

    server.stop().await?;
    Ok(())
}

#[tokio::test]
async fn unknown_method_is_a_remote_error() -> Result<()> {
    // ---
    init_logging();

    let bus = Bus::new();
    let (math, _server) = math_pair(&bus, Calculator::new("page")).await?;

    let err = math.rpc().call("mul", vec![Value::Int(2)]).await.unwrap_err();
    assert_eq!(err.to_string(), "no such method: mul");
    Ok(())
}

#[tokio::test]
async fn round_trip_invokes_handler_once_with_same_args() -> Result<()> {
    // ---
    init_logging();

    // Arrange
    let bus = Bus::new();
    let seen: Arc<Mutex<Vec<(String, Vec<i64>, Option<bool>)>>> = Arc::default();

    let recorder = seen.clone();
    let service = FnService::new("shapes").method(
        "describe",
        move |(name, sides, filled): (String, Vec<i64>, Option<bool>)| {
            let recorder = recorder.clone();
            async move {
                recorder
                    .lock()
                    .unwrap()
                    .push((name.clone(), sides.clone(), filled));
                Ok(serde_json::json!({
                    "name": name.to_uppercase(),
                    "perimeter": sides.iter().sum::<i64>(),
                    "filled": filled,
                }))
            }
        },
    );

    let server_side = create_push_transport(&bus, &RpcConfig::new("page")).await?;
    let client_side = create_push_transport(&bus, &RpcConfig::new("panel")).await?;
    let _server = start_server(server_side, service).await?;
    let client = RpcClient::new(client_side, "shapes").await?;

    // Act
    let out: serde_json::Value = client
        .request("describe", &("tri", vec![3, 4, 5], None::<bool>))
        .await?;

    // Assert
    assert_eq!(
        out,
        serde_json::json!({"name": "TRI", "perimeter": 12, "filled": null})
    );
    assert_eq!(
        *seen.lock().unwrap(),
        vec![("tri".to_owned(), vec![3, 4, 5], None)]
    );
    Ok(())
}

#[tokio::test]
async fn fifty_calls_settle_under_reverse_delivery() -> Result<()> {
    // ---
    init_logging();

    const N: usize = 50;

    let bus = Bus::new();
    let client_side = create_push_transport(&bus, &RpcConfig::new("panel")).await?;
    let client = RpcClient::new(client_side, "math").await?;

    // Hand-rolled server: collect every request, then answer newest first.
    let (port, mut inbox) = bus.connect("page");
    let server = tokio::spawn(async move {
        // ---
        let mut requests = Vec::with_capacity(N);
        while requests.len() < N {
            let message = inbox.recv().await.expect("bus closed");
            let env: Envelope = serde_json::from_slice(&message.payload).unwrap();
            requests.push(env);
        }

        for env in requests.into_iter().rev() {
            let Body::Request { args, .. } = env.body else {
                panic!("expected request");
            };
            let x: i64 = args[0].clone().decode().unwrap();
            let reply = Reply::success(Value::Int(x * 10));
            let response = Envelope::response(env.channel, env.request_id, reply);
            port.post(serde_json::to_vec(&response).unwrap());
        }
    });

    let calls = (0..N as i64).map(|i| {
        let client = client.clone();
        async move { client.call("scale", vec![Value::Int(i)]).await }
    });
    let results = join_all(calls).await;

    for (i, result) in results.into_iter().enumerate() {
        assert_eq!(result?, Value::Int(i as i64 * 10));
    }
    server.await.unwrap();
    assert_eq!(client.pending_count(), 0);
    Ok(())
}

#[tokio::test]
async fn dispose_rejects_every_pending_call() -> Result<()> {
    // ---
    init_logging();

    const K: usize = 8;

    // Nobody answers on this bus.
    let bus = Bus::new();
    let transport = create_push_transport(&bus, &RpcConfig::new("panel")).await?;
    let client = RpcClient::new(transport.clone(), "math").await?;

    let calls: Vec<_> = (0..K)
        .map(|_| {
            let client = client.clone();
            tokio::spawn(async move { client.call("add", vec![]).await })
        })
        .collect();
    wait_for_pending(&client, K).await;

    client.dispose().await?;

    for call in calls {
        let outcome = tokio::time::timeout(Duration::from_secs(1), call)
            .await
            .expect("call left unsettled")
            .unwrap();
        assert!(matches!(outcome, Err(RpcError::TransportClosed)));
    }
    assert_eq!(client.pending_count(), 0);
    assert!(transport.is_closed());
    Ok(())
}

#[tokio::test]
async fn second_server_on_same_pair_is_rejected() -> Result<()> {
    // ---
    init_logging();

    let bus = Bus::new();
    let transport = create_push_transport(&bus, &RpcConfig::new("page")).await?;

    let first = start_server(transport.clone(), MathService(Calculator::new("a"))).await?;
    let second = start_server(transport.clone(), MathService(Calculator::new("b"))).await;
    assert!(matches!(second, Err(RpcError::DuplicateServer(ref c)) if c == "math"));

    // A different channel on the same transport is fine.
    let _echo = start_server(transport.clone(), FnService::new("echo")).await?;

    first.stop().await?;
    Ok(())
}

#[tokio::test]
async fn unmatched_response_changes_nothing() -> Result<()> {
    // ---
    init_logging();

    let bus = Bus::new();
    let client_side = create_push_transport(&bus, &RpcConfig::new("panel")).await?;
    let client = RpcClient::new(client_side, "math").await?;
    let (stranger, mut stranger_inbox) = bus.connect("page");

    let call = tokio::spawn({
        let client = client.clone();
        async move { client.call("add", vec![Value::Int(1), Value::Int(1)]).await }
    });
    let message = stranger_inbox.recv().await.unwrap();
    let request: Envelope = serde_json::from_slice(&message.payload).unwrap();

    let stray = Envelope::response(
        Channel::from("math"),
        RequestId::from("never-issued"),
        Reply::success(Value::Int(99)),
    );
    stranger.post(serde_json::to_vec(&stray).unwrap());
    stranger.post(r#"{"type":"STATE_UPDATE","payload":{}}"#);

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(client.pending_count(), 1);
    assert!(!call.is_finished());

    let answer = Envelope::response(
        request.channel,
        request.request_id,
        Reply::success(Value::Int(2)),
    );
    stranger.post(serde_json::to_vec(&answer).unwrap());
    assert_eq!(call.await.unwrap()?, Value::Int(2));
    Ok(())
}

#[tokio::test]
async fn panicking_handler_becomes_remote_error() -> Result<()> {
    // ---
    init_logging();

    let bus = Bus::new();
    let service = FnService::new("math").method("explode", |_: ()| async move {
        if true {
            panic!("kaboom");
        }
        Ok::<i64, Failure>(0)
    });

    let server_side = create_push_transport(&bus, &RpcConfig::new("page")).await?;
    let client_side = create_push_transport(&bus, &RpcConfig::new("panel")).await?;
    let _server = start_server(server_side, service).await?;
    let client = RpcClient::new(client_side, "math").await?;

    let err = client.call("explode", vec![]).await.unwrap_err();
    let failure = err.as_remote().expect("remote failure");
    assert!(failure.message.contains("kaboom"));
    Ok(())
}

#[tokio::test]
async fn stopped_server_no_longer_answers() -> Result<()> {
    // ---
    init_logging();

    let bus = Bus::new();
    let calculator = Calculator::new("page");
    let (math, server) = math_pair(&bus, calculator.clone()).await?;
    assert_eq!(math.add(1, 1).await?, 2);

    server.stop().await?;
    server.stop().await?;
    assert_eq!(bus.port_count(), 1);

    let err = math
        .rpc()
        .call_with_timeout("add", vec![Value::Int(1), Value::Int(1)], Duration::from_millis(50))
        .await
        .unwrap_err();
    assert!(matches!(err, RpcError::Timeout));
    assert_eq!(calculator.calls(), 1);
    Ok(())
}

#[tokio::test]
async fn concurrent_calls_each_invoke_handler_once() -> Result<()> {
    // ---
    init_logging();

    let bus = Bus::new();
    let invocations = Arc::new(AtomicUsize::new(0));
    let counter = invocations.clone();
    let service = FnService::new("math").method("add", move |(a, b): (i64, i64)| {
        counter.fetch_add(1, Ordering::SeqCst);
        async move { Ok(a + b) }
    });

    let server_side = create_push_transport(&bus, &RpcConfig::new("page")).await?;
    let client_side = create_push_transport(&bus, &RpcConfig::new("panel")).await?;
    let _server = start_server(server_side, service).await?;
    let client = RpcClient::new(client_side, "math").await?;

    let calls = (0..20i64).map(|i| {
        let client = client.clone();
        async move { client.request::<_, i64>("add", &(i, i)).await }
    });
    let sums: Vec<i64> = join_all(calls).await.into_iter().collect::<Result<_>>()?;

    assert_eq!(sums, (0..20).map(|i| i * 2).collect::<Vec<_>>());
    assert_eq!(invocations.load(Ordering::SeqCst), 20);
    Ok(())
}

#[tokio::test]
async fn malformed_request_gets_a_failed_reply() -> Result<()> {
    // ---
    init_logging();

    let bus = Bus::new();
    let calculator = Calculator::new("page");
    let server_side = create_push_transport(&bus, &RpcConfig::new("page")).await?;
    let server = start_server(server_side, MathService(calculator.clone())).await?;

    // Arguments as bare JSON numbers instead of tagged values.
    let (caller, mut caller_inbox) = bus.connect("hand-written");
    caller.post(
        r#"{"channel":"math","requestId":"r-1","kind":"request","method":"add","args":[2,3]}"#,
    );

    let message = tokio::time::timeout(Duration::from_secs(1), caller_inbox.recv())
        .await
        .expect("no reply to malformed request")
        .expect("bus closed");
    let reply = Envelope::from_wire(&message.payload).unwrap();

    assert_eq!(reply.request_id, RequestId::from("r-1"));
    let Body::Response(reply) = reply.body else {
        panic!("expected a response");
    };
    let failure = reply.into_outcome().unwrap_err();
    assert!(failure.message.starts_with("malformed request"), "{}", failure.message);
    assert_eq!(calculator.calls(), 0);

    server.stop().await?;
    Ok(())
}
