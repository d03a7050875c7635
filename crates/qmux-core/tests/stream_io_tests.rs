//! Stream and datagram I/O through the session.


use bytes::Bytes;
use futures_util::FutureExt;
use qmux_core::mock::StreamWrite;
use qmux_core::{Error, TransportEvent};
use test_helpers::{harness, open_stream, poll_request, queue_request};

#[test]
fn test_writes_reach_transport_in_order() {
    let h = harness(3);
    let stream = open_stream(&h.session);

    stream.write(Bytes::from_static(b"GET /")).expect("write");
    stream.finish().expect("finish");

    assert_eq!(
        h.transport.writes(),
        vec![
            StreamWrite {
                id: 1,
                data: Bytes::from_static(b"GET /"),
                fin: false,
            },
            StreamWrite {
                id: 1,
                data: Bytes::new(),
                fin: true,
            },
        ]
    );
    assert_eq!(stream.write(&b"more"[..]), Err(Error::StreamClosed));
}

#[test]
fn test_transport_write_error_surfaces() {
    let h = harness(3);
    let stream = open_stream(&h.session);
    h.transport
        .fail_next_write(Error::Transport("send buffer full".into()));

    assert_eq!(
        stream.write(&b"x"[..]),
        Err(Error::Transport("send buffer full".into()))
    );
    // The stream stays usable.
    assert!(stream.write(&b"y"[..]).is_ok());
}

#[test]
fn test_received_data_is_readable() {
    let h = harness(3);
    let stream = open_stream(&h.session);

    assert!(stream.read().now_or_never().is_none());
    h.session
        .on_stream_data(1, Bytes::from_static(b"HTTP/1.1 200"), false);
    h.session.on_stream_data(1, Bytes::new(), true);

    assert_eq!(
        stream.read().now_or_never(),
        Some(Ok(Some(Bytes::from_static(b"HTTP/1.1 200"))))
    );
    assert_eq!(stream.read().now_or_never(), Some(Ok(None)));
}

#[test]
fn test_data_for_unknown_stream_is_dropped() {
    let h = harness(3);
    h.session.on_stream_data(99, Bytes::from_static(b"stray"), false);
    assert_eq!(h.session.open_stream_count(), 0);
}

/// A peer reset fails the stream and frees its slot for the queue.
#[test]
fn test_peer_reset_frees_slot() {
    let h = harness(1);
    let stream = open_stream(&h.session);
    let mut request = queue_request(&h.session);

    h.session.on_stream_reset(1);
    assert!(!stream.is_open());
    assert_eq!(stream.read().now_or_never(), Some(Err(Error::StreamClosed)));
    assert!(h.transport.resets().is_empty());

    let next = poll_request(&mut request)
        .expect("resolved")
        .expect("admitted");
    assert_eq!(next.id(), 3);
}

/// A stream finished in both directions closes without a reset.
#[test]
fn test_completed_stream_closes_cleanly() {
    let h = harness(3);
    let stream = open_stream(&h.session);
    stream.finish().expect("finish");
    h.session.on_stream_data(1, Bytes::new(), true);

    drop(stream);
    assert!(h.transport.resets().is_empty());
    assert_eq!(h.session.open_stream_count(), 0);
}

/// Readers waiting on a stream observe the session's close error.
#[test]
fn test_close_fails_readers_and_writers() {
    let h = harness(3);
    let stream = open_stream(&h.session);
    h.session.on_transport_event(TransportEvent::ConnectionClosed {
        error: Error::PublicReset,
        from_peer: true,
    });

    assert_eq!(stream.read().now_or_never(), Some(Err(Error::PublicReset)));
    assert_eq!(stream.write(&b"x"[..]), Err(Error::PublicReset));
}

#[test]
fn test_datagrams_require_live_session() {
    let h = harness(3);
    h.session
        .send_datagram(Bytes::from_static(b"ping"))
        .expect("datagram");
    assert_eq!(h.transport.datagrams(), vec![Bytes::from_static(b"ping")]);

    h.session.mark_going_away();
    assert_eq!(
        h.session.send_datagram(Bytes::from_static(b"late")),
        Err(Error::ConnectionClosed { by_peer: false })
    );

    h.session.close(Error::PublicReset);
    assert_eq!(
        h.session.send_datagram(Bytes::from_static(b"later")),
        Err(Error::PublicReset)
    );
}
