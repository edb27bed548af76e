//! Integration tests driving the server through frames.

use livedata_codec::Document;
use livedata_core::{
    apply_change, ChangeEvent, ChangeKind, CacheKey, CoreError, DataSource, MemoryDataSource,
    Methods, PublicationOptions, Query, RegistryBuilder,
};
use livedata_protocol::{codes, ServerMessage, UpdateOptions};
use livedata_server::{
    tcp, ConnectionId, ConnectionState, LiveDataServer, Poller, ServerConfig, ServerError,
    Subscription,
};
use livedata_testkit::prelude::*;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

fn data(collection: &str, id: &str, set: Option<Value>, unset: Option<Vec<&str>>) -> ServerMessage {
    ServerMessage::data(
        collection,
        id,
        set.map(doc),
        unset.map(|fields| fields.into_iter().map(str::to_owned).collect()),
    )
}

async fn subscribe(server: &LiveDataServer, id: ConnectionId, sub: &str, name: &str, params: Value) {
    let frame = json!({"msg": "sub", "id": sub, "name": name, "params": params}).to_string();
    server.handle_frame(id, &frame).await.unwrap();
    // Queued behind the subscribe, so its output is complete afterwards.
    server.poll(id).await.unwrap();
}

#[tokio::test]
async fn counters_scenario() {
    let (server, _store) = counters_server(ServerConfig::default());
    let (id, sink) = connect_recording(&server);

    subscribe(&server, id, "s1", "counters", Value::Null).await;
    assert_eq!(
        sink.take(),
        vec![
            data("items", "a", Some(json!({"n": 1})), None),
            ServerMessage::ready("s1"),
        ]
    );

    server
        .handle_frame(
            id,
            r#"{"collection":"items","type":"update","id":"m1","selector":"a","mutator":{"$set":{"n":2}}}"#,
        )
        .await
        .unwrap();
    server.poll(id).await.unwrap();
    assert_eq!(
        sink.take(),
        vec![
            ServerMessage::mutation_ok(Some("m1".into()), json!(1)),
            data("items", "a", Some(json!({"n": 2})), None),
        ]
    );

    server
        .handle_frame(id, r#"{"collection":"items","type":"remove","id":"m2","selector":"a"}"#)
        .await
        .unwrap();
    server.poll(id).await.unwrap();
    assert_eq!(
        sink.take(),
        vec![
            ServerMessage::mutation_ok(Some("m2".into()), json!(1)),
            data("items", "a", None, Some(vec!["n"])),
        ]
    );
}

#[tokio::test]
async fn repoll_without_mutation_is_silent() {
    let (server, _store) = counters_server(ServerConfig::default());
    let (id, sink) = connect_recording(&server);
    subscribe(&server, id, "s1", "counters", Value::Null).await;
    sink.take();

    for _ in 0..3 {
        let report = server.poll(id).await.unwrap();
        assert_eq!(report.events, 0);
        assert_eq!(report.ready, 0);
        assert_eq!(report.documents, 1);
    }
    assert!(sink.is_empty());
}

#[tokio::test]
async fn readiness_is_sent_once_per_subscription() {
    let (server, _store) = counters_server(ServerConfig::default());
    let (id, sink) = connect_recording(&server);

    subscribe(&server, id, "s1", "counters", Value::Null).await;
    subscribe(&server, id, "s2", "items-above", json!({"min": 0})).await;
    server.poll(id).await.unwrap();

    let messages = sink.take();
    assert_eq!(ready_ids(&messages), vec!["s1", "s2"]);
    // Both subscriptions cover the same document, so it is only added once.
    assert_eq!(data_messages(&messages).len(), 1);
}

#[tokio::test]
async fn unknown_publication_is_refused() {
    let (server, _store) = counters_server(ServerConfig::default());
    let (id, sink) = connect_recording(&server);
    subscribe(&server, id, "s1", "nope", Value::Null).await;

    match sink.take().as_slice() {
        [ServerMessage::Nosub { id, error: Some(error) }] => {
            assert_eq!(id, "s1");
            assert_eq!(error.error, codes::NOT_FOUND);
            assert_eq!(error.reason, "Unknown name");
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn unsubscribe_removes_everything_it_alone_covered() {
    let (server, store) = counters_server(ServerConfig::default());
    store
        .seed("items", vec![doc(json!({"_id": "b", "n": 5, "tag": "x"}))])
        .unwrap();
    let (id, sink) = connect_recording(&server);

    subscribe(&server, id, "all", "counters", Value::Null).await;
    subscribe(&server, id, "big", "items-above", json!({"min": 3})).await;
    sink.take();

    // `b` is still covered by `big`.
    server.handle_frame(id, r#"{"msg":"unsub","id":"all"}"#).await.unwrap();
    server.poll(id).await.unwrap();
    assert_eq!(
        sink.take(),
        vec![
            ServerMessage::nosub("all"),
            data("items", "a", None, Some(vec!["n"])),
        ]
    );

    server.handle_frame(id, r#"{"msg":"unsub","id":"big"}"#).await.unwrap();
    server.poll(id).await.unwrap();
    assert_eq!(
        sink.take(),
        vec![
            ServerMessage::nosub("big"),
            data("items", "b", None, Some(vec!["n", "tag"])),
        ]
    );

    // Unsubscribing an unknown id is still acknowledged.
    server.handle_frame(id, r#"{"msg":"unsub","id":"ghost"}"#).await.unwrap();
    server.poll(id).await.unwrap();
    assert_eq!(sink.take(), vec![ServerMessage::nosub("ghost")]);
}

#[tokio::test]
async fn failed_poll_keeps_previous_snapshot() {
    let store = counters_store();
    let flaky = Arc::new(FlakyDataSource::new(store.clone()));
    let server = LiveDataServer::new(
        ServerConfig::default(),
        Arc::new(counters_registry()),
        flaky.clone(),
    );
    let (id, sink) = connect_recording(&server);
    subscribe(&server, id, "s1", "counters", Value::Null).await;
    sink.take();

    flaky.set_failing(true);
    store
        .update("items", &Document::new(), &doc(json!({"$set": {"n": 5}})), UpdateOptions::default())
        .await
        .unwrap();
    let err = server.poll(id).await.unwrap_err();
    assert!(matches!(err, ServerError::Core(CoreError::DataSource { .. })));
    assert!(sink.is_empty());

    flaky.set_failing(false);
    let report = server.poll(id).await.unwrap();
    assert_eq!(report.events, 1);
    assert_eq!(sink.take(), vec![data("items", "a", Some(json!({"n": 5})), None)]);
}

#[tokio::test]
async fn failed_first_poll_withholds_readiness() {
    let flaky = Arc::new(FlakyDataSource::new(counters_store()));
    flaky.set_failing(true);
    let server = LiveDataServer::new(
        ServerConfig::default(),
        Arc::new(counters_registry()),
        flaky.clone(),
    );
    let (id, sink) = connect_recording(&server);

    server
        .handle_frame(id, r#"{"msg":"sub","id":"s1","name":"counters"}"#)
        .await
        .unwrap();
    assert!(server.poll(id).await.is_err());
    assert!(sink.is_empty());

    flaky.set_failing(false);
    server.poll(id).await.unwrap();
    assert_eq!(ready_ids(&sink.take()), vec!["s1"]);
}

#[tokio::test]
async fn mutation_repolls_other_connections() {
    let (server, _store) = counters_server(ServerConfig::default());
    let (writer, writer_sink) = connect_recording(&server);
    let (reader, reader_sink) = connect_recording(&server);
    subscribe(&server, writer, "w", "counters", Value::Null).await;
    subscribe(&server, reader, "r", "counters", Value::Null).await;
    writer_sink.take();
    reader_sink.take();

    server
        .handle_frame(
            writer,
            r#"{"collection":"items","type":"method","id":"m1","method":"increment","args":[4]}"#,
        )
        .await
        .unwrap();

    let expected = data("items", "a", Some(json!({"n": 5})), None);
    tokio::time::timeout(Duration::from_secs(5), async {
        while reader_sink.is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("reader was not re-polled");
    assert_eq!(reader_sink.take(), vec![expected]);

    // The writer only gets its acknowledgement until it polls.
    assert_eq!(
        writer_sink.take(),
        vec![ServerMessage::mutation_ok(Some("m1".into()), json!(1))]
    );
}

#[tokio::test(start_paused = true)]
async fn rejected_mutation_does_not_repoll() {
    let flaky = Arc::new(FlakyDataSource::new(counters_store()));
    let server = LiveDataServer::new(
        ServerConfig::default(),
        Arc::new(counters_registry()),
        flaky.clone(),
    );
    let (writer, writer_sink) = connect_recording(&server);
    let (reader, _reader_sink) = connect_recording(&server);
    subscribe(&server, reader, "r", "counters", Value::Null).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    let finds = flaky.find_count();

    server
        .handle_frame(writer, r#"{"collection":"items","type":"method","id":"m1","method":"nope"}"#)
        .await
        .unwrap();
    server
        .handle_frame(writer, r#"{"collection":"ghosts","type":"insert","id":"m2","args":{}}"#)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(flaky.find_count(), finds);

    let errors: Vec<u16> = writer_sink
        .take()
        .into_iter()
        .filter_map(|m| match m {
            ServerMessage::MutationResult { error: Some(e), .. } => Some(e.error),
            _ => None,
        })
        .collect();
    assert_eq!(errors, vec![codes::NOT_FOUND, codes::NOT_FOUND]);
}

#[tokio::test]
async fn closed_sink_discards_output() {
    let (server, _store) = counters_server(ServerConfig::default());
    let (id, sink) = connect_recording(&server);
    sink.close();

    server
        .handle_frame(id, r#"{"msg":"sub","id":"s1","name":"counters"}"#)
        .await
        .unwrap();
    let report = server.poll(id).await.unwrap();
    assert_eq!(report.subscriptions, 1);
    assert!(sink.is_empty());

    server.disconnect(id).unwrap();
    assert!(matches!(server.poll(id).await, Err(ServerError::UnknownConnection(_))));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn polls_never_observe_half_applied_updates() {
    let store = Arc::new(MemoryDataSource::new());
    store
        .seed(
            "items",
            ["a", "b", "c", "d", "e"].map(|id| doc(json!({"_id": id, "n": 0}))),
        )
        .unwrap();
    let mut builder = RegistryBuilder::new();
    builder.register_collection("items", Methods::new()).unwrap();
    builder.publish("items", PublicationOptions::new()).unwrap();
    let poller = Poller::new(Arc::new(builder.build()), store.clone());

    let writer = {
        let store = store.clone();
        tokio::spawn(async move {
            for _ in 0..200 {
                store
                    .update(
                        "items",
                        &Document::new(),
                        &doc(json!({"$inc": {"n": 1}})),
                        UpdateOptions::default().with_multi(true),
                    )
                    .await
                    .unwrap();
                tokio::task::yield_now().await;
            }
        })
    };

    let mut state = ConnectionState::new(ConnectionId::new());
    state.subscribe(Subscription::new("s1", "items", Value::Null));
    for _ in 0..200 {
        let (snapshot, _) = poller.build_snapshot(&state).await.unwrap();
        let values: Vec<&Value> = snapshot.iter().map(|(_, d)| &d["n"]).collect();
        assert_eq!(values.len(), 5);
        assert!(values.windows(2).all(|w| w[0] == w[1]), "mixed snapshot: {values:?}");
        tokio::task::yield_now().await;
    }
    writer.await.unwrap();

    let all = store.find(&Query::new("items")).await.unwrap();
    assert!(all.iter().all(|d| d["n"] == json!(200)));
}

#[tokio::test]
async fn client_cache_converges_over_tcp() {
    let (server, _store) = counters_server(ServerConfig::default());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(tcp::serve(listener, Arc::clone(&server)));

    let reader = TcpStream::connect(addr).await.unwrap();
    let (read_half, mut reader_out) = reader.into_split();
    let mut reader_in = BufReader::new(read_half).lines();
    reader_out
        .write_all(b"{\"msg\":\"sub\",\"id\":\"s1\",\"name\":\"counters\"}\n")
        .await
        .unwrap();

    let writer = TcpStream::connect(addr).await.unwrap();
    let (write_read_half, mut writer_out) = writer.into_split();
    let mut writer_in = BufReader::new(write_read_half).lines();

    // Apply every data message to a client-side cache until ready arrives.
    let mut cache: BTreeMap<CacheKey, Document> = BTreeMap::new();
    let mut apply = |message: ServerMessage| -> Option<String> {
        match message {
            ServerMessage::Data { collection, id, set, unset } => {
                let key = CacheKey::new(collection, id);
                let event = ChangeEvent {
                    key: key.clone(),
                    kind: ChangeKind::Changed,
                    set,
                    unset,
                };
                let document = cache.entry(key.clone()).or_default();
                apply_change(document, &event);
                // Cached documents carry no `_id`, so empty means removed.
                if document.is_empty() {
                    cache.remove(&key);
                }
                None
            }
            ServerMessage::SubscriptionReady { id } => Some(id),
            _ => None,
        }
    };

    loop {
        let line = reader_in.next_line().await.unwrap().unwrap();
        if apply(ServerMessage::decode(&line).unwrap()).is_some() {
            break;
        }
    }

    writer_out
        .write_all(b"{\"collection\":\"items\",\"type\":\"insert\",\"id\":\"m1\",\"args\":{\"_id\":\"z\",\"n\":9}}\n")
        .await
        .unwrap();
    let ack = ServerMessage::decode(&writer_in.next_line().await.unwrap().unwrap()).unwrap();
    assert_eq!(ack, ServerMessage::mutation_ok(Some("m1".into()), json!({"_id": "z", "n": 9})));

    let line = tokio::time::timeout(Duration::from_secs(5), reader_in.next_line())
        .await
        .expect("no update pushed")
        .unwrap()
        .unwrap();
    apply(ServerMessage::decode(&line).unwrap());

    assert_eq!(cache.len(), 2);
    assert_eq!(cache[&CacheKey::new("items", "z")]["n"], json!(9));
    assert_eq!(cache[&CacheKey::new("items", "a")]["n"], json!(1));
}
