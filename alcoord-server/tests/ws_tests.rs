//! Websocket endpoint exercised over a real TCP listener

use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use alcoord_common::{ClientMessage, ServerMessage};
use alcoord_server::db::{self, instances, projects, sessions};
use alcoord_server::{build_router, AppState, CoordinatorSettings};

type Socket =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

async fn start_server(max_count: i64) -> (String, AppState) {
    let pool = db::init_memory_database().await.unwrap();
    projects::create_project(&pool, "sst2", max_count, &["least".to_string()])
        .await
        .unwrap();
    let state = AppState::new(pool, CoordinatorSettings::default());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = build_router(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("ws://{}/model", addr), state)
}

async fn send(socket: &mut Socket, message: ClientMessage) {
    socket
        .send(Message::Text(message.encode().unwrap()))
        .await
        .unwrap();
}

async fn recv(socket: &mut Socket) -> ServerMessage {
    loop {
        match socket.next().await.unwrap().unwrap() {
            Message::Text(text) => return ServerMessage::decode(&text).unwrap(),
            Message::Close(_) => panic!("socket closed"),
            _ => continue,
        }
    }
}

#[tokio::test]
async fn test_full_round_over_websocket() {
    let (url, state) = start_server(10).await;
    let (mut socket, _) = connect_async(url.as_str()).await.unwrap();

    send(
        &mut socket,
        ClientMessage::Register {
            project_name: "sst2".to_string(),
            model_name: "least".to_string(),
            count: 0,
        },
    )
    .await;
    let io_time_start = match recv(&mut socket).await {
        ServerMessage::NextUtterance { io_time_start } => io_time_start,
        other => panic!("unexpected message {:?}", other),
    };

    send(
        &mut socket,
        ClientMessage::Utterance {
            utterance: "a gripping story".to_string(),
            label: None,
            count: 0,
            client_time: 0.01,
            al_time: 0.005,
            io_time_start,
        },
    )
    .await;

    // Frames on one connection are handled in order; scores arrive after the
    // utterance has been persisted.
    send(
        &mut socket,
        ClientMessage::Scores {
            precision: 0.5,
            recall: 0.5,
            f1: 0.5,
            count: 0,
        },
    )
    .await;

    let offered = loop {
        match state.coordinator.next_instance("sst2").await {
            Ok(offered) => break offered,
            Err(_) => tokio::time::sleep(std::time::Duration::from_millis(10)).await,
        }
    };
    assert_eq!(offered.utterance, "a gripping story");
    state
        .coordinator
        .annotate(offered.instance_id, 1)
        .await
        .unwrap();

    match recv(&mut socket).await {
        ServerMessage::Annotation {
            utterance,
            annotation,
            ..
        } => {
            assert_eq!(utterance, "a gripping story");
            assert_eq!(annotation, 1);
        }
        other => panic!("unexpected message {:?}", other),
    }
}

#[tokio::test]
async fn test_register_at_budget_closes_connection() {
    let (url, state) = start_server(2).await;
    let (mut socket, _) = connect_async(url.as_str()).await.unwrap();

    send(
        &mut socket,
        ClientMessage::Register {
            project_name: "sst2".to_string(),
            model_name: "least".to_string(),
            count: 2,
        },
    )
    .await;
    assert_eq!(
        recv(&mut socket).await,
        ServerMessage::Finished {
            cause: "max count: 2 reached".to_string()
        }
    );

    // Server closes after the terminal message
    loop {
        match socket.next().await {
            Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
            Some(Ok(_)) => continue,
        }
    }

    let db = state.coordinator.db();
    let project = projects::find_by_name(db, "sst2").await.unwrap().unwrap();
    let session = sessions::find(db, project.id, "least").await.unwrap().unwrap();
    assert!(instances::list_for_session(db, session.id)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_disconnect_marks_session_offline() {
    let (url, state) = start_server(10).await;
    let (mut socket, _) = connect_async(url.as_str()).await.unwrap();
    send(
        &mut socket,
        ClientMessage::Register {
            project_name: "sst2".to_string(),
            model_name: "least".to_string(),
            count: 0,
        },
    )
    .await;
    recv(&mut socket).await;
    socket.close(None).await.unwrap();
    drop(socket);

    let db = state.coordinator.db().clone();
    let project = projects::find_by_name(&db, "sst2").await.unwrap().unwrap();
    let mut online = true;
    for _ in 0..100 {
        let session = sessions::find(&db, project.id, "least").await.unwrap().unwrap();
        online = session.online;
        if !online {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert!(!online);
}
