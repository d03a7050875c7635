//! End-to-end session tests on a tokio `LocalSet`.
//!
//! A scripted packet engine sits on the far side of the channels and plays
//! the peer.

use bytes::Bytes;
use qmux_core::mock::{FactoryEvent, MockCryptoHandshake, RecordingFactory};
use qmux_core::{
    ConnectStatus, Error, HandshakeEvent, PrivacyMode, ServerId, Session, TransportEvent,
};
use qmux_runtime::{drive, ChannelTransport, Outbound, SessionInput, TokioTaskRunner};
use std::rc::Rc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::LocalSet;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn new_session(crypto: &MockCryptoHandshake) -> (Session, mpsc::UnboundedReceiver<Outbound>) {
    let (transport, outbound) =
        ChannelTransport::new(42, Some("198.51.100.7:443".parse().unwrap()));
    let session = Session::new(
        ServerId::new("www.example.org", 443, PrivacyMode::Disabled),
        Box::new(crypto.clone()),
        Box::new(transport),
        Rc::new(TokioTaskRunner::new()),
    );
    (session, outbound)
}

/// Full request/response exchange followed by a peer close.
#[tokio::test(start_paused = true)]
async fn test_request_response_then_peer_close() {
    init_tracing();
    let local = LocalSet::new();
    local
        .run_until(async {
            let crypto = MockCryptoHandshake::new();
            let (session, mut outbound) = new_session(&crypto);
            let factory = Rc::new(RecordingFactory::new());
            session.set_factory(&factory);
            let (inputs, rx) = mpsc::unbounded_channel();

            let ConnectStatus::Pending(confirmation) = session.crypto_connect().unwrap() else {
                panic!("handshake should be pending before encryption");
            };

            let client = async {
                confirmation.await.unwrap();
                let stream = session.request_stream().await.unwrap();
                assert_eq!(stream.id(), 1);
                stream.write(Bytes::from_static(b"hello")).unwrap();
                stream.finish().unwrap();

                let reply = stream.read().await.unwrap();
                assert_eq!(reply, Some(Bytes::from_static(b"world")));
                assert_eq!(stream.read().await.unwrap(), None);
                session.send_datagram(Bytes::from_static(b"bye")).unwrap();
            };

            let engine = async {
                crypto.set_encryption_established(true);
                inputs
                    .send(SessionInput::Handshake(HandshakeEvent::Started))
                    .unwrap();
                inputs
                    .send(SessionInput::Handshake(
                        HandshakeEvent::EncryptionEstablished,
                    ))
                    .unwrap();

                assert_eq!(
                    outbound.recv().await.unwrap(),
                    Outbound::StreamData {
                        id: 1,
                        data: Bytes::from_static(b"hello"),
                        fin: false
                    }
                );
                assert_eq!(
                    outbound.recv().await.unwrap(),
                    Outbound::StreamData {
                        id: 1,
                        data: Bytes::new(),
                        fin: true
                    }
                );
                inputs
                    .send(SessionInput::StreamData {
                        id: 1,
                        data: Bytes::from_static(b"world"),
                        fin: true,
                    })
                    .unwrap();

                assert_eq!(
                    outbound.recv().await.unwrap(),
                    Outbound::Datagram(Bytes::from_static(b"bye"))
                );
                inputs
                    .send(SessionInput::Transport(TransportEvent::ConnectionClosed {
                        error: Error::ConnectionClosed { by_peer: true },
                        from_peer: true,
                    }))
                    .unwrap();
                assert_eq!(
                    outbound.recv().await.unwrap(),
                    Outbound::Close(Error::ConnectionClosed { by_peer: true })
                );
            };

            let (driven, (), ()) = tokio::join!(drive(&session, rx), client, engine);
            driven.unwrap();
            assert!(session.is_drained());

            // Let the posted `on_closed` run.
            tokio::task::yield_now().await;
            let key = session.key();
            assert_eq!(
                factory.events(),
                vec![
                    FactoryEvent::Idle(key),
                    FactoryEvent::GoingAway(key),
                    FactoryEvent::Closed(key),
                ]
            );
        })
        .await;
}

/// A local close ends `drive` even while the engine keeps its sender.
#[tokio::test(start_paused = true)]
async fn test_drive_returns_after_local_close() {
    init_tracing();
    let local = LocalSet::new();
    local
        .run_until(async {
            let crypto = MockCryptoHandshake::established();
            let (session, mut outbound) = new_session(&crypto);
            let stream = session.request_stream().await.unwrap();
            let (inputs, rx) = mpsc::unbounded_channel::<SessionInput>();

            let closer = async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                session.close(Error::Aborted);
            };
            let driven = tokio::time::timeout(Duration::from_secs(60), async {
                let (driven, ()) = tokio::join!(drive(&session, rx), closer);
                driven
            })
            .await;

            assert!(matches!(driven, Ok(Ok(()))));
            assert!(session.is_drained());
            assert_eq!(stream.error(), Some(Error::Aborted));
            assert_eq!(
                outbound.recv().await.unwrap(),
                Outbound::Close(Error::Aborted)
            );
            drop(inputs);
        })
        .await;
}

/// The 0-RTT grace period runs on the tokio clock.
#[tokio::test(start_paused = true)]
async fn test_zero_rtt_grace_expires_on_tokio_timer() {
    init_tracing();
    let local = LocalSet::new();
    local
        .run_until(async {
            let crypto = MockCryptoHandshake::established();
            let (session, _outbound) = new_session(&crypto);

            assert!(matches!(session.crypto_connect(), Ok(ConnectStatus::Ready)));
            tokio::time::sleep(Duration::from_secs(3)).await;

            let ConnectStatus::Pending(confirmation) = session.crypto_connect().unwrap() else {
                panic!("grace period should have expired");
            };
            crypto.set_handshake_confirmed(true);
            session.on_handshake_event(HandshakeEvent::HandshakeConfirmed);
            confirmation.await.unwrap();
        })
        .await;
}

/// Losing the input channel closes the session.
#[tokio::test]
async fn test_drive_closes_session_when_inputs_end() {
    init_tracing();
    let local = LocalSet::new();
    local
        .run_until(async {
            let crypto = MockCryptoHandshake::established();
            let (session, mut outbound) = new_session(&crypto);
            let stream = session.request_stream().await.unwrap();
            let (inputs, rx) = mpsc::unbounded_channel::<SessionInput>();
            drop(inputs);

            let result = drive(&session, rx).await;
            assert!(matches!(result, Err(qmux_runtime::Error::InputClosed)));
            assert!(session.is_drained());
            assert_eq!(
                stream.error(),
                Some(Error::ConnectionClosed { by_peer: false })
            );
            assert_eq!(
                outbound.recv().await.unwrap(),
                Outbound::Close(Error::ConnectionClosed { by_peer: false })
            );
        })
        .await;
}
