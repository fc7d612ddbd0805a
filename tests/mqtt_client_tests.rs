//! Integration tests for the MQTT transport
//!
//! A minimal in-process broker speaks just enough MQTT 3.1.1 over TCP to
//! drive the client through connect, inbound publish, loss and refusal
//! without an external broker.

use geotemp_link::config::BrokerSection;
use geotemp_link::transport::mqtt::{MqttClient, MqttError};
use geotemp_link::transport::{Transport, TransportEvent};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};

const CONNACK_ACCEPTED: [u8; 4] = [0x20, 0x02, 0x00, 0x00];
const CONNACK_NOT_AUTHORIZED: [u8; 4] = [0x20, 0x02, 0x00, 0x05];

fn config_for(port: u16) -> BrokerSection {
    BrokerSection {
        url: format!("mqtt://127.0.0.1:{port}"),
        connect_timeout_secs: 1,
        ..Default::default()
    }
}

/// QoS 0 PUBLISH packet
fn publish_packet(topic: &str, payload: &[u8]) -> Vec<u8> {
    let remaining = 2 + topic.len() + payload.len();
    assert!(remaining < 128, "single byte remaining length only");

    let mut packet = vec![0x30, remaining as u8];
    packet.extend_from_slice(&(topic.len() as u16).to_be_bytes());
    packet.extend_from_slice(topic.as_bytes());
    packet.extend_from_slice(payload);
    packet
}

async fn next_event(events: &mut mpsc::Receiver<TransportEvent>) -> TransportEvent {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for transport event")
        .expect("transport event channel closed")
}

#[tokio::test]
async fn test_connect_receive_and_loss() {
    // Arrange: broker accepts, later pushes one publish, then drops the socket
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (publish_tx, publish_rx) = oneshot::channel::<()>();
    let (close_tx, close_rx) = oneshot::channel::<()>();

    let broker = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 256];
        let _ = socket.read(&mut buf).await.unwrap();
        socket.write_all(&CONNACK_ACCEPTED).await.unwrap();

        publish_rx.await.unwrap();
        socket
            .write_all(&publish_packet("t/x", br#"{"hi":1}"#))
            .await
            .unwrap();

        close_rx.await.unwrap();
        drop(socket);
    });

    let (mut client, mut events) = MqttClient::new(config_for(port)).unwrap();

    // Act: connect
    client.connect("clientId-aaaa0001").await.unwrap();

    // Assert: success carries the attempt's client id
    assert_eq!(
        next_event(&mut events).await,
        TransportEvent::ConnectSucceeded {
            client_id: "clientId-aaaa0001".to_string()
        }
    );
    assert_eq!(client.client_id(), Some("clientId-aaaa0001"));
    client.subscribe("t/x").await.unwrap();

    publish_tx.send(()).unwrap();
    assert_eq!(
        next_event(&mut events).await,
        TransportEvent::MessageArrived {
            topic: "t/x".to_string(),
            payload: br#"{"hi":1}"#.to_vec(),
        }
    );

    close_tx.send(()).unwrap();
    match next_event(&mut events).await {
        TransportEvent::ConnectionLost { client_id, .. } => {
            assert_eq!(client_id, "clientId-aaaa0001")
        }
        other => panic!("expected ConnectionLost, got {other:?}"),
    }

    broker.await.unwrap();
    assert!(client.disconnect().await.is_ok());
}

#[tokio::test]
async fn test_refused_port_reports_connect_failed() {
    // Bind then release to get a port nobody listens on
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let (mut client, mut events) = MqttClient::new(config_for(port)).unwrap();
    client.connect("clientId-bbbb0002").await.unwrap();

    match next_event(&mut events).await {
        TransportEvent::ConnectFailed { client_id, reason } => {
            assert_eq!(client_id, "clientId-bbbb0002");
            assert!(!reason.is_empty());
        }
        other => panic!("expected ConnectFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn test_broker_refusal_reports_connect_failed() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 256];
        let _ = socket.read(&mut buf).await;
        let _ = socket.write_all(&CONNACK_NOT_AUTHORIZED).await;
        tokio::time::sleep(Duration::from_millis(500)).await;
    });

    let (mut client, mut events) = MqttClient::new(config_for(port)).unwrap();
    client.connect("clientId-cccc0003").await.unwrap();

    assert!(matches!(
        next_event(&mut events).await,
        TransportEvent::ConnectFailed { client_id, .. } if client_id == "clientId-cccc0003"
    ));
}

#[tokio::test]
async fn test_silent_broker_times_out() {
    // Broker accepts the socket but never answers CONNECT
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        let (_socket, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
    });

    let (mut client, mut events) = MqttClient::new(config_for(port)).unwrap();
    client.connect("clientId-dddd0004").await.unwrap();

    match next_event(&mut events).await {
        TransportEvent::ConnectFailed { client_id, reason } => {
            assert_eq!(client_id, "clientId-dddd0004");
            assert!(reason.contains("timeout"), "reason: {reason}");
        }
        other => panic!("expected ConnectFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn test_local_disconnect_is_not_a_loss() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (received_tx, received_rx) = oneshot::channel::<Vec<u8>>();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 256];
        let _ = socket.read(&mut buf).await.unwrap();
        socket.write_all(&CONNACK_ACCEPTED).await.unwrap();

        // Collect whatever the client sends until it closes
        let mut received = Vec::new();
        loop {
            match socket.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => received.extend_from_slice(&buf[..n]),
            }
        }
        let _ = received_tx.send(received);
    });

    let (mut client, mut events) = MqttClient::new(config_for(port)).unwrap();
    client.connect("clientId-eeee0005").await.unwrap();
    assert!(matches!(
        next_event(&mut events).await,
        TransportEvent::ConnectSucceeded { .. }
    ));

    client.disconnect().await.unwrap();

    // DISCONNECT packet reached the broker
    let received = tokio::time::timeout(Duration::from_secs(5), received_rx)
        .await
        .unwrap()
        .unwrap();
    assert!(received.windows(2).any(|w| w == [0xE0, 0x00]));

    // No loss event for a requested close
    let extra = tokio::time::timeout(Duration::from_millis(200), events.recv()).await;
    assert!(extra.is_err() || matches!(extra, Ok(None)));
    assert!(client.client_id().is_none());
}

#[tokio::test]
async fn test_requests_before_connect_fail() {
    let (mut client, _events) = MqttClient::new(config_for(1883)).unwrap();

    assert!(matches!(
        client.publish("t/x", b"payload".to_vec()).await,
        Err(MqttError::NotConnected)
    ));
    assert!(matches!(
        client.subscribe("t/x").await,
        Err(MqttError::NotConnected)
    ));
}
