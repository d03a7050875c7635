//! Pooling predicate and diagnostic snapshot tests.


use qmux_core::mock::MockCryptoHandshake;
use qmux_core::{
    CertificateInfo, Error, HandshakeEvent, HandshakeState, Lifecycle, PrivacyMode, QuicVersion,
    SessionConfig, TransportSecurityPolicy,
};
use std::rc::Rc;
use test_helpers::{harness, harness_with, open_stream};

struct PinnedTo(&'static str);

impl TransportSecurityPolicy for PinnedTo {
    fn check_pins(&self, hostname: &str, _certificate: &CertificateInfo) -> bool {
        hostname == self.0
    }
}

#[test]
fn test_privacy_mismatch_never_pools() {
    let h = harness(3);
    h.crypto
        .set_peer_certificate(CertificateInfo::new(["*.example.org"]));
    for host in ["www.example.org", "mail.example.org", "other.test", ""] {
        assert!(!h.session.can_pool(host, PrivacyMode::Enabled), "{host}");
    }
}

#[test]
fn test_unencrypted_session_always_pools() {
    let h = harness(3);
    assert!(h.session.can_pool("unrelated.test", PrivacyMode::Disabled));
}

#[test]
fn test_pooling_follows_certificate_names() {
    let h = harness(3);
    h.crypto
        .set_peer_certificate(CertificateInfo::new(["www.example.org", "*.example.org"]));

    assert!(h.session.can_pool("mail.example.org", PrivacyMode::Disabled));
    assert!(h.session.can_pool("MAIL.Example.org.", PrivacyMode::Disabled));
    assert!(!h.session.can_pool("a.b.example.org", PrivacyMode::Disabled));
    assert!(!h.session.can_pool("example.com", PrivacyMode::Disabled));
}

#[test]
fn test_pooling_consults_security_policy() {
    let h = harness(3);
    h.crypto
        .set_peer_certificate(CertificateInfo::new(["*.example.org"]));
    h.session
        .set_security_policy(Rc::new(PinnedTo("mail.example.org")));

    assert!(h.session.can_pool("mail.example.org", PrivacyMode::Disabled));
    assert!(!h.session.can_pool("docs.example.org", PrivacyMode::Disabled));
    // The session's own host needs no certificate check.
    assert!(h.session.can_pool("www.example.org", PrivacyMode::Disabled));
}

#[test]
fn test_client_certificate_prevents_pooling() {
    let h = harness(3);
    let mut certificate = CertificateInfo::new(["*.example.org"]);
    certificate.client_cert_sent = true;
    h.crypto.set_peer_certificate(certificate);

    assert!(!h.session.can_pool("mail.example.org", PrivacyMode::Disabled));
    assert!(h.session.can_pool("www.example.org", PrivacyMode::Disabled));
}

#[test]
fn test_snapshot_reports_session_state() {
    let h = harness_with(SessionConfig::default(), MockCryptoHandshake::established());
    h.crypto.set_version(QuicVersion(0x0000_0001));
    h.transport.set_connection_id(0xfeed);
    h.transport
        .set_peer_address("192.0.2.1:443".parse().expect("socket address"));
    h.session.on_handshake_event(HandshakeEvent::Started);
    let _first = open_stream(&h.session);
    let second = open_stream(&h.session);
    second.close();
    let _third = open_stream(&h.session);

    let snapshot = h.session.snapshot();
    assert_eq!(snapshot.key, h.session.key());
    assert_eq!(snapshot.lifecycle, Lifecycle::Active);
    assert_eq!(snapshot.handshake, HandshakeState::Started);
    assert_eq!(snapshot.version, Some(QuicVersion(1)));
    assert_eq!(snapshot.connection_id, 0xfeed);
    assert_eq!(snapshot.open_streams, 2);
    assert_eq!(snapshot.active_streams, vec![1, 5]);
    assert_eq!(snapshot.total_streams, 3);
    assert!(!snapshot.secure);
    assert_eq!(snapshot.max_open_streams, 100);
    assert!(snapshot.connected);

    let json = snapshot.to_json();
    assert_eq!(json["open_streams"], 2);
    assert_eq!(json["active_streams"], serde_json::json!([1, 5]));
    assert_eq!(json["secure"], false);
    assert_eq!(json["handshake"], "started");
    assert_eq!(json["server_id"]["host"], "www.example.org");
    assert_eq!(json["peer_address"], "192.0.2.1:443");

    // Taking a snapshot changes nothing.
    assert_eq!(h.session.snapshot(), snapshot);
}

#[test]
fn test_invalid_config_is_rejected() {
    let config = SessionConfig {
        max_open_streams: 0,
        ..SessionConfig::default()
    };
    let result = qmux_core::Session::with_config(
        test_helpers::server_id(),
        config,
        Box::new(MockCryptoHandshake::new()),
        Box::new(qmux_core::mock::MockTransport::new()),
        Rc::new(qmux_core::mock::ManualTaskRunner::new()),
    );
    assert_eq!(result.err().map(|e| e.code()), Some(Error::InvalidState.code()));
}

#[test]
fn test_snapshot_reports_certificate_presence() {
    let h = harness(3);
    assert!(!h.session.snapshot().secure);
    h.crypto
        .set_peer_certificate(CertificateInfo::new(["www.example.org"]));
    assert!(h.session.snapshot().secure);
}
