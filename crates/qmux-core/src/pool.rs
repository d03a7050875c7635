//! Session pooling policy.
//!
//! A session opened for one hostname may serve another when the privacy
//! modes match and the already-verified certificate covers the new name.

use crate::server_id::{PrivacyMode, ServerId};

/// Verified peer certificate details needed for pooling decisions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CertificateInfo {
    /// DNS names the certificate was verified for. Entries may use a
    /// leading `*.` wildcard label.
    pub dns_names: Vec<String>,
    /// Whether a client certificate was sent during the handshake.
    pub client_cert_sent: bool,
}

impl CertificateInfo {
    /// Create certificate details for the given names.
    pub fn new<I, S>(dns_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            dns_names: dns_names.into_iter().map(Into::into).collect(),
            client_cert_sent: false,
        }
    }

    /// Whether the certificate is valid for `hostname`.
    ///
    /// A wildcard matches exactly one leftmost label.
    pub fn verify_name(&self, hostname: &str) -> bool {
        let hostname = hostname.trim_end_matches('.').to_ascii_lowercase();
        self.dns_names.iter().any(|name| {
            let name = name.trim_end_matches('.').to_ascii_lowercase();
            match name.strip_prefix("*.") {
                Some(suffix) => match hostname.split_once('.') {
                    Some((label, rest)) => !label.is_empty() && rest == suffix,
                    None => false,
                },
                None => name == hostname,
            }
        })
    }
}

/// Transport-security policy (key pinning and similar) applied on top of
/// certificate name verification.
pub trait TransportSecurityPolicy {
    /// Whether `certificate` is acceptable for `hostname` under this policy.
    fn check_pins(&self, hostname: &str, certificate: &CertificateInfo) -> bool;
}

/// Policy that accepts every verified certificate.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl TransportSecurityPolicy for AllowAll {
    fn check_pins(&self, _hostname: &str, _certificate: &CertificateInfo) -> bool {
        true
    }
}

/// Decide whether a session for `server_id` may serve `hostname`.
///
/// `certificate` is `None` for an unencrypted session. No side effects.
pub fn can_pool(
    server_id: &ServerId,
    certificate: Option<&CertificateInfo>,
    policy: &dyn TransportSecurityPolicy,
    hostname: &str,
    privacy_mode: PrivacyMode,
) -> bool {
    if server_id.privacy_mode != privacy_mode {
        return false;
    }
    let Some(certificate) = certificate else {
        return true;
    };
    if hostname.eq_ignore_ascii_case(&server_id.host) {
        return true;
    }
    // A client certificate binds the session to the host it was opened for.
    if certificate.client_cert_sent {
        return false;
    }
    certificate.verify_name(hostname) && policy.check_pins(hostname, certificate)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct DenyHost(&'static str);

    impl TransportSecurityPolicy for DenyHost {
        fn check_pins(&self, hostname: &str, _certificate: &CertificateInfo) -> bool {
            hostname != self.0
        }
    }

    fn server() -> ServerId {
        ServerId::new("www.example.org", 443, PrivacyMode::Disabled)
    }

    #[test]
    fn test_verify_name_exact_and_wildcard() {
        let cert = CertificateInfo::new(["www.example.org", "*.cdn.example.org"]);
        assert!(cert.verify_name("www.example.org"));
        assert!(cert.verify_name("WWW.Example.org."));
        assert!(cert.verify_name("img.cdn.example.org"));
        assert!(!cert.verify_name("cdn.example.org"));
        assert!(!cert.verify_name("a.b.cdn.example.org"));
        assert!(!cert.verify_name("mail.example.org"));
    }

    #[test]
    fn test_privacy_mode_mismatch_never_pools() {
        let cert = CertificateInfo::new(["*.example.org"]);
        for host in ["www.example.org", "mail.example.org", "other.test"] {
            assert!(!can_pool(
                &server(),
                Some(&cert),
                &AllowAll,
                host,
                PrivacyMode::Enabled
            ));
            assert!(!can_pool(&server(), None, &AllowAll, host, PrivacyMode::Enabled));
        }
    }

    #[test]
    fn test_unencrypted_session_always_pools() {
        assert!(can_pool(
            &server(),
            None,
            &AllowAll,
            "anything.test",
            PrivacyMode::Disabled
        ));
    }

    #[test]
    fn test_certificate_must_cover_hostname() {
        let cert = CertificateInfo::new(["www.example.org", "mail.example.org"]);
        assert!(can_pool(
            &server(),
            Some(&cert),
            &AllowAll,
            "mail.example.org",
            PrivacyMode::Disabled
        ));
        assert!(!can_pool(
            &server(),
            Some(&cert),
            &AllowAll,
            "www.example.com",
            PrivacyMode::Disabled
        ));
    }

    #[test]
    fn test_policy_can_veto() {
        let cert = CertificateInfo::new(["*.example.org"]);
        let policy = DenyHost("mail.example.org");
        assert!(!can_pool(
            &server(),
            Some(&cert),
            &policy,
            "mail.example.org",
            PrivacyMode::Disabled
        ));
        assert!(can_pool(
            &server(),
            Some(&cert),
            &policy,
            "docs.example.org",
            PrivacyMode::Disabled
        ));
    }

    #[test]
    fn test_client_cert_blocks_other_hosts() {
        let mut cert = CertificateInfo::new(["*.example.org"]);
        cert.client_cert_sent = true;
        assert!(!can_pool(
            &server(),
            Some(&cert),
            &AllowAll,
            "mail.example.org",
            PrivacyMode::Disabled
        ));
        assert!(can_pool(
            &server(),
            Some(&cert),
            &AllowAll,
            "www.example.org",
            PrivacyMode::Disabled
        ));
    }
}
