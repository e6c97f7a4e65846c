//! Engine-level scenarios exercised through the public use cases.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chatter_server::{
    config::EngineConfig,
    domain::{
        ConnectionId, ConversationId, DisplayName, LogError, Message, MessageId, MessageLog,
        PresenceState, Sequence, UserId,
    },
    engine::Engine,
    infrastructure::dto::websocket::{DeliveryStateDto, PresenceStateDto, ServerMessage},
    usecase::ChatError,
};
use chatter_shared::time::SystemClock;
use tokio::sync::mpsc;

const GRACE: Duration = Duration::from_millis(150);

fn test_engine() -> Engine {
    Engine::new(EngineConfig {
        presence_grace: GRACE,
        persist_timeout: Duration::from_millis(500),
        send_timeout: Duration::from_millis(200),
        ..EngineConfig::default()
    })
}

async fn register(engine: &Engine, name: &str) -> UserId {
    let (user, _token) = engine
        .users
        .register(DisplayName::new(name.to_string()).unwrap(), None)
        .await;
    user.id
}

async fn connect(engine: &Engine, user_id: &UserId) -> (ConnectionId, mpsc::Receiver<String>) {
    let connection_id = ConnectionId::generate();
    let (tx, rx) = mpsc::channel(256);
    engine
        .connect_participant_usecase
        .execute(user_id.clone(), connection_id, tx)
        .await;
    (connection_id, rx)
}

async fn next_frame(rx: &mut mpsc::Receiver<String>) -> ServerMessage {
    let text = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for a frame")
        .expect("queue closed");
    serde_json::from_str(&text).unwrap()
}

/// Skip frames until one satisfies `wanted`.
async fn next_matching(
    rx: &mut mpsc::Receiver<String>,
    wanted: impl Fn(&ServerMessage) -> bool,
) -> ServerMessage {
    loop {
        let frame = next_frame(rx).await;
        if wanted(&frame) {
            return frame;
        }
    }
}

fn is_message(frame: &ServerMessage) -> bool {
    matches!(frame, ServerMessage::MessageDelivered { .. })
}

async fn send(
    engine: &Engine,
    connection_id: &ConnectionId,
    conversation_id: &ConversationId,
    text: &str,
) -> Result<Message, ChatError> {
    engine
        .send_message_usecase
        .execute(connection_id, conversation_id, text.to_string())
        .await
}

#[tokio::test]
async fn test_offline_recipient_is_caught_up_by_resync() {
    // テスト項目: U2 がオフライン中に U1 が "hi" を送ると pending になり、再同期で届いて delivered になる
    // given (前提条件):
    let engine = test_engine();
    let u1 = register(&engine, "U1").await;
    let u2 = register(&engine, "U2").await;
    let conversation = engine
        .directory
        .create(vec![u1.clone(), u2.clone()], false, None)
        .await
        .unwrap();
    let (u1_conn, _u1_rx) = connect(&engine, &u1).await;
    let hi = send(&engine, &u1_conn, &conversation.id, "hi").await.unwrap();
    assert_eq!(hi.sequence, Sequence::new(1));

    // when (操作):
    let (u2_conn, _u2_rx) = connect(&engine, &u2).await;
    let batch = engine
        .resync
        .resync(&u2_conn, &conversation.id, Sequence::ZERO)
        .await
        .unwrap();

    // then (期待する結果):
    assert_eq!(batch.messages.len(), 1);
    assert_eq!(batch.messages[0].sequence, Sequence::new(1));
    assert_eq!(batch.messages[0].content().map(|c| c.as_str()), Some("hi"));
    assert!(batch.complete);
}

#[tokio::test]
async fn test_connected_recipient_receives_in_order() {
    // テスト項目: 両者接続中に "a" → "b" を送ると U2 は seq 1 → seq 2 の順に受け取る
    // given (前提条件):
    let engine = test_engine();
    let u1 = register(&engine, "U1").await;
    let u2 = register(&engine, "U2").await;
    let conversation = engine
        .directory
        .create(vec![u1.clone(), u2.clone()], false, None)
        .await
        .unwrap();
    let (u1_conn, _u1_rx) = connect(&engine, &u1).await;
    let (_u2_conn, mut u2_rx) = connect(&engine, &u2).await;

    // when (操作):
    send(&engine, &u1_conn, &conversation.id, "a").await.unwrap();
    send(&engine, &u1_conn, &conversation.id, "b").await.unwrap();

    // then (期待する結果):
    let mut received = Vec::new();
    for _ in 0..2 {
        if let ServerMessage::MessageDelivered { message } =
            next_matching(&mut u2_rx, is_message).await
        {
            received.push((message.sequence, message.content.unwrap_or_default()));
        }
    }
    assert_eq!(received, vec![(1, "a".to_string()), (2, "b".to_string())]);
}

#[tokio::test]
async fn test_concurrent_senders_are_observed_in_sequence_order() {
    // テスト項目: 複数の送信者が並行に送っても、受信者は厳密に増加する順で受け取る
    // given (前提条件):
    let engine = Arc::new(test_engine());
    let watcher = register(&engine, "Watcher").await;
    let mut senders = Vec::new();
    for i in 0..4 {
        senders.push(register(&engine, &format!("Sender{i}")).await);
    }
    let mut participants = senders.clone();
    participants.push(watcher.clone());
    let conversation = engine
        .directory
        .create(participants, true, Some("busy".to_string()))
        .await
        .unwrap();
    let (_watcher_conn, mut watcher_rx) = connect(&engine, &watcher).await;

    // when (操作):
    let mut handles = Vec::new();
    for sender in senders {
        let engine = engine.clone();
        let conversation_id = conversation.id;
        handles.push(tokio::spawn(async move {
            let (connection_id, _rx) = connect(&engine, &sender).await;
            for n in 0..10 {
                send(&engine, &connection_id, &conversation_id, &format!("{n}"))
                    .await
                    .unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    // then (期待する結果):
    let mut sequences = Vec::new();
    while sequences.len() < 40 {
        if let ServerMessage::MessageDelivered { message } =
            next_matching(&mut watcher_rx, is_message).await
        {
            sequences.push(message.sequence);
        }
    }
    assert_eq!(sequences, (1..=40).collect::<Vec<u64>>());
}

#[tokio::test]
async fn test_non_group_needs_exactly_two_participants() {
    // テスト項目: 1 人または 3 人の 1 対 1 会話は作成できず、2 人なら作成できる
    // given (前提条件):
    let engine = test_engine();
    let a = register(&engine, "A").await;
    let b = register(&engine, "B").await;
    let c = register(&engine, "C").await;

    // when (操作):
    let one = engine.directory.create(vec![a.clone()], false, None).await;
    let three = engine
        .directory
        .create(vec![a.clone(), b.clone(), c.clone()], false, None)
        .await;
    let duplicate = engine
        .directory
        .create(vec![a.clone(), a.clone()], false, None)
        .await;
    let two = engine
        .directory
        .create(vec![a.clone(), b.clone()], false, None)
        .await;

    // then (期待する結果):
    assert!(matches!(one, Err(ChatError::InvalidParticipants(_))));
    assert!(matches!(three, Err(ChatError::InvalidParticipants(_))));
    assert!(matches!(duplicate, Err(ChatError::InvalidParticipants(_))));
    assert!(two.is_ok());
}

#[tokio::test]
async fn test_presence_survives_partial_disconnect_and_goes_offline_once() {
    // テスト項目: 接続 {A, B} のうち A の切断では online のまま、両方切断すると猶予期間後に一度だけ offline
    // given (前提条件):
    let engine = test_engine();
    let alice = register(&engine, "Alice").await;
    let bob = register(&engine, "Bob").await;
    engine
        .directory
        .create(vec![alice.clone(), bob.clone()], false, None)
        .await
        .unwrap();
    let (_bob_conn, mut bob_rx) = connect(&engine, &bob).await;
    let (conn_a, _rx_a) = connect(&engine, &alice).await;
    let (conn_b, _rx_b) = connect(&engine, &alice).await;
    let online = next_frame(&mut bob_rx).await;
    assert_eq!(
        online,
        ServerMessage::PresenceChanged {
            user_id: alice.to_string(),
            state: PresenceStateDto::Online,
        }
    );

    // when (操作):
    engine.disconnect_participant_usecase.execute(&conn_a).await;
    tokio::time::sleep(GRACE * 2).await;
    let still_online = engine.presence.presence_of(&alice).await;
    engine.disconnect_participant_usecase.execute(&conn_b).await;

    // then (期待する結果):
    assert_eq!(still_online, PresenceState::Online);
    assert!(bob_rx.try_recv().is_err());
    let offline = next_frame(&mut bob_rx).await;
    assert_eq!(
        offline,
        ServerMessage::PresenceChanged {
            user_id: alice.to_string(),
            state: PresenceStateDto::Offline,
        }
    );
    tokio::time::sleep(GRACE * 2).await;
    assert!(bob_rx.try_recv().is_err());
}

#[tokio::test]
async fn test_removed_participant_stops_receiving_and_sending() {
    // テスト項目: グループから外れたユーザーは配信を受けず、送信もできない
    // given (前提条件):
    let engine = test_engine();
    let alice = register(&engine, "Alice").await;
    let bob = register(&engine, "Bob").await;
    let conversation = engine
        .directory
        .create(vec![alice.clone(), bob.clone()], true, Some("team".to_string()))
        .await
        .unwrap();
    let (alice_conn, _alice_rx) = connect(&engine, &alice).await;
    let (bob_conn, mut bob_rx) = connect(&engine, &bob).await;

    // when (操作):
    engine
        .directory
        .remove_participant(&conversation.id, &bob)
        .await
        .unwrap();
    let message = send(&engine, &alice_conn, &conversation.id, "bye")
        .await
        .unwrap();
    let bob_send = send(&engine, &bob_conn, &conversation.id, "wait").await;

    // then (期待する結果):
    assert_eq!(bob_send, Err(ChatError::NotAParticipant));
    tokio::time::sleep(Duration::from_millis(50)).await;
    while let Ok(frame) = bob_rx.try_recv() {
        assert!(!frame.contains("message-delivered"), "unexpected {frame}");
    }
    assert!(
        engine
            .resync
            .resync(&bob_conn, &conversation.id, Sequence::ZERO)
            .await
            .is_err()
    );
    assert_eq!(message.sequence, Sequence::new(1));
}

/// Log that never acknowledges an append.
struct StalledLog;

#[async_trait]
impl MessageLog for StalledLog {
    async fn append(&self, _message: &Message) -> Result<(), LogError> {
        std::future::pending().await
    }

    async fn read_range(
        &self,
        _conversation_id: &ConversationId,
        _after: Sequence,
        _limit: usize,
    ) -> Result<Vec<Message>, LogError> {
        Ok(Vec::new())
    }

    async fn find(&self, _message_id: &MessageId) -> Result<Option<Message>, LogError> {
        Ok(None)
    }

    async fn update(&self, _message: &Message) -> Result<(), LogError> {
        std::future::pending().await
    }
}

#[tokio::test]
async fn test_stalled_store_surfaces_persistence_timeout() {
    // テスト項目: ストアが応答しない場合、送信は PersistenceTimeout で失敗しシーケンスは進まない
    // given (前提条件):
    let engine = Engine::with_collaborators(
        EngineConfig {
            persist_timeout: Duration::from_millis(50),
            ..EngineConfig::default()
        },
        Arc::new(SystemClock),
        Arc::new(StalledLog),
    );
    let alice = register(&engine, "Alice").await;
    let bob = register(&engine, "Bob").await;
    let conversation = engine
        .directory
        .create(vec![alice.clone(), bob.clone()], false, None)
        .await
        .unwrap();
    let (alice_conn, _alice_rx) = connect(&engine, &alice).await;

    // when (操作):
    let result = send(&engine, &alice_conn, &conversation.id, "hello").await;

    // then (期待する結果):
    assert_eq!(result, Err(ChatError::PersistenceTimeout));
    let stored = engine.directory.get(&conversation.id).await.unwrap();
    assert_eq!(stored.last_sequence, Sequence::ZERO);
}

#[tokio::test]
async fn test_read_ack_reaches_sender_as_receipt() {
    // テスト項目: 既読通知が送信者に delivery-receipt (read) として届く
    // given (前提条件):
    let engine = test_engine();
    let alice = register(&engine, "Alice").await;
    let bob = register(&engine, "Bob").await;
    let conversation = engine
        .directory
        .create(vec![alice.clone(), bob.clone()], false, None)
        .await
        .unwrap();
    let (alice_conn, mut alice_rx) = connect(&engine, &alice).await;
    let (bob_conn, _bob_rx) = connect(&engine, &bob).await;
    let message = send(&engine, &alice_conn, &conversation.id, "ping").await.unwrap();

    // when (操作):
    engine
        .send_message_usecase
        .acknowledge(&bob_conn, &message.id)
        .await
        .unwrap();

    // then (期待する結果):
    let receipt = next_matching(&mut alice_rx, |frame| {
        matches!(
            frame,
            ServerMessage::DeliveryReceipt {
                state: DeliveryStateDto::Read,
                ..
            }
        )
    })
    .await;
    assert!(matches!(
        receipt,
        ServerMessage::DeliveryReceipt { sequence: 1, .. }
    ));
}
