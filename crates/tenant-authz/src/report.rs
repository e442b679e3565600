//! Rejection reporting and peer identity
//!
//! Every token the cache turns away produces one [`RejectionEvent`]. The
//! default [`TracingReporter`] turns events into structured `warn!` records
//! under the `tenant_authz::token` target:
//!
//! - `InvalidToken` - the token failed verification or expired in the cache
//! - `TenantTokenMismatch` - the token is valid but not for the requested tenant
//!
//! [`RecordingReporter`] keeps events in memory for tests and diagnostics.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::warn;

use crate::claims::TokenClaims;

/// Why a token was turned away
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum Rejection {
    /// Token is not structurally valid
    #[error("ParseError")]
    ParseError,
    /// No key registered under the token's key id
    #[error("UnknownKey")]
    UnknownKey,
    /// `iat` is absent
    #[error("NoIssuedAt")]
    NoIssuedAt,
    /// `exp` is absent
    #[error("NoExpirationTime")]
    NoExpirationTime,
    /// `exp` is not in the future
    #[error("Expired")]
    Expired,
    /// `nbf` is absent
    #[error("NoNotBefore")]
    NoNotBefore,
    /// `nbf` is in the future
    #[error("TokenNotYetValid")]
    TokenNotYetValid,
    /// `tenants` is absent
    #[error("NoTenants")]
    NoTenants,
    /// Signature does not verify with the resolved key
    #[error("InvalidSignature")]
    InvalidSignature,
    /// A cached token has passed its expiration time
    #[error("ExpiredInCache")]
    ExpiredInCache,
    /// The token does not grant the requested tenant
    #[error("TenantTokenMismatch")]
    TenantTokenMismatch,
}

impl Rejection {
    /// Reason tag used in reports
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ParseError => "ParseError",
            Self::UnknownKey => "UnknownKey",
            Self::NoIssuedAt => "NoIssuedAt",
            Self::NoExpirationTime => "NoExpirationTime",
            Self::Expired => "Expired",
            Self::NoNotBefore => "NoNotBefore",
            Self::TokenNotYetValid => "TokenNotYetValid",
            Self::NoTenants => "NoTenants",
            Self::InvalidSignature => "InvalidSignature",
            Self::ExpiredInCache => "ExpiredInCache",
            Self::TenantTokenMismatch => "TenantTokenMismatch",
        }
    }
}

/// Address of the caller presenting a token, when the transport knows it
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct PeerAddr(pub Option<SocketAddr>);

impl PeerAddr {
    /// Peer of unknown origin
    pub const UNKNOWN: Self = Self(None);
}

impl From<SocketAddr> for PeerAddr {
    fn from(addr: SocketAddr) -> Self {
        Self(Some(addr))
    }
}

impl fmt::Display for PeerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(addr) => write!(f, "{addr}"),
            None => f.write_str("unknown"),
        }
    }
}

/// Supplies the peer of the request being authorized
pub trait PeerSource: Send + Sync {
    /// Peer of the current request
    fn current_peer(&self) -> PeerAddr;
}

/// Peer source for callers without transport context
#[derive(Debug, Default, Clone, Copy)]
pub struct UnknownPeer;

impl PeerSource for UnknownPeer {
    fn current_peer(&self) -> PeerAddr {
        PeerAddr::UNKNOWN
    }
}

impl PeerSource for PeerAddr {
    fn current_peer(&self) -> PeerAddr {
        *self
    }
}

/// One rejected token
#[derive(Debug, Clone, Copy)]
pub struct RejectionEvent<'a> {
    /// Who presented the token
    pub peer: PeerAddr,
    /// Why it was rejected
    pub reason: Rejection,
    /// Decision time, seconds since the Unix epoch
    pub current_time: f64,
    /// Raw token bytes
    pub token: &'a [u8],
    /// Claims, when the token parsed
    pub claims: Option<&'a TokenClaims>,
    /// Requested tenant, for [`Rejection::TenantTokenMismatch`]
    pub tenant: Option<&'a [u8]>,
}

/// Receives rejected tokens
///
/// The token cache calls reporters with its lock released, so a reporter may
/// read the cache that reports to it.
pub trait RejectionReporter: Send + Sync {
    /// Record one rejection
    fn report(&self, event: &RejectionEvent<'_>);
}

impl<T: RejectionReporter + ?Sized> RejectionReporter for Arc<T> {
    fn report(&self, event: &RejectionEvent<'_>) {
        (**self).report(event);
    }
}

/// Reporter that logs through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl RejectionReporter for TracingReporter {
    fn report(&self, event: &RejectionEvent<'_>) {
        if event.reason == Rejection::TenantTokenMismatch {
            warn!(
                target: "tenant_authz::token",
                peer = %event.peer,
                reason = event.reason.as_str(),
                current_time = event.current_time,
                tenant = %String::from_utf8_lossy(event.tenant.unwrap_or_default()),
                "TenantTokenMismatch"
            );
            return;
        }

        match event.claims {
            Some(claims) => warn!(
                target: "tenant_authz::token",
                peer = %event.peer,
                reason = event.reason.as_str(),
                current_time = event.current_time,
                claims = %claims,
                "InvalidToken"
            ),
            None => warn!(
                target: "tenant_authz::token",
                peer = %event.peer,
                reason = event.reason.as_str(),
                current_time = event.current_time,
                token = %String::from_utf8_lossy(event.token),
                "InvalidToken"
            ),
        }
    }
}

/// Owned copy of a [`RejectionEvent`]
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRejection {
    /// Who presented the token
    pub peer: PeerAddr,
    /// Why it was rejected
    pub reason: Rejection,
    /// Decision time
    pub current_time: f64,
    /// Raw token bytes
    pub token: Vec<u8>,
    /// Claims, when the token parsed
    pub claims: Option<TokenClaims>,
    /// Requested tenant, for mismatches
    pub tenant: Option<Vec<u8>>,
}

impl From<&RejectionEvent<'_>> for RecordedRejection {
    fn from(event: &RejectionEvent<'_>) -> Self {
        Self {
            peer: event.peer,
            reason: event.reason,
            current_time: event.current_time,
            token: event.token.to_vec(),
            claims: event.claims.cloned(),
            tenant: event.tenant.map(<[u8]>::to_vec),
        }
    }
}

/// Reporter that keeps every event in memory
#[derive(Debug, Default)]
pub struct RecordingReporter {
    events: Mutex<Vec<RecordedRejection>>,
}

impl RecordingReporter {
    /// Empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// All events so far, oldest first
    pub fn events(&self) -> Vec<RecordedRejection> {
        self.events.lock().clone()
    }

    /// Reasons of all events so far, oldest first
    pub fn reasons(&self) -> Vec<Rejection> {
        self.events.lock().iter().map(|e| e.reason).collect()
    }

    /// Most recent event
    pub fn last(&self) -> Option<RecordedRejection> {
        self.events.lock().last().cloned()
    }

    /// Number of events
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Whether nothing was rejected
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Forget all events
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl RejectionReporter for RecordingReporter {
    fn report(&self, event: &RejectionEvent<'_>) {
        self.events.lock().push(RecordedRejection::from(event));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claims::Algorithm;

    #[test]
    fn test_reason_tags_match_display() {
        let all = [
            Rejection::ParseError,
            Rejection::UnknownKey,
            Rejection::NoIssuedAt,
            Rejection::NoExpirationTime,
            Rejection::Expired,
            Rejection::NoNotBefore,
            Rejection::TokenNotYetValid,
            Rejection::NoTenants,
            Rejection::InvalidSignature,
            Rejection::ExpiredInCache,
            Rejection::TenantTokenMismatch,
        ];
        for reason in all {
            assert_eq!(reason.to_string(), reason.as_str());
        }
    }

    #[test]
    fn test_peer_display() {
        assert_eq!(PeerAddr::UNKNOWN.to_string(), "unknown");
        let addr: SocketAddr = "10.0.0.7:4500".parse().unwrap();
        assert_eq!(PeerAddr::from(addr).to_string(), "10.0.0.7:4500");
        assert_eq!(PeerAddr::from(addr).current_peer(), PeerAddr(Some(addr)));
        assert_eq!(UnknownPeer.current_peer(), PeerAddr::UNKNOWN);
    }

    #[test]
    fn test_recording_reporter_copies_event() {
        let recorder = RecordingReporter::new();
        let claims = TokenClaims::new(Algorithm::Es256, "k");
        recorder.report(&RejectionEvent {
            peer: PeerAddr::UNKNOWN,
            reason: Rejection::Expired,
            current_time: 10.0,
            token: b"tok",
            claims: Some(&claims),
            tenant: None,
        });

        assert_eq!(recorder.len(), 1);
        let event = recorder.last().unwrap();
        assert_eq!(event.reason, Rejection::Expired);
        assert_eq!(event.token, b"tok");
        assert_eq!(event.claims, Some(claims));

        recorder.clear();
        assert!(recorder.is_empty());
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_tracing_reporter_logs_every_shape() {
        // GIVEN: a subscriber writing plain text into a buffer
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::WARN)
            .finish();

        let claims = TokenClaims::new(Algorithm::Es256, "kid-7");
        let peer = PeerAddr::from("10.0.0.7:4500".parse::<SocketAddr>().unwrap());
        let base = RejectionEvent {
            peer,
            reason: Rejection::ParseError,
            current_time: 1.0,
            token: b"\xffbad",
            claims: None,
            tenant: None,
        };

        // WHEN: one event of each shape is reported
        tracing::subscriber::with_default(subscriber, || {
            TracingReporter.report(&base);
            TracingReporter.report(&RejectionEvent {
                reason: Rejection::InvalidSignature,
                claims: Some(&claims),
                ..base
            });
            TracingReporter.report(&RejectionEvent {
                reason: Rejection::TenantTokenMismatch,
                tenant: Some(&b"tenantB"[..]),
                ..base
            });
        });

        // THEN: each lands on its own WARN line with its fields
        let output = String::from_utf8(captured.0.lock().clone()).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 3, "{output}");

        for line in &lines {
            assert!(line.contains("WARN"), "{line}");
            assert!(line.contains("tenant_authz::token"), "{line}");
            assert!(line.contains("peer=10.0.0.7:4500"), "{line}");
        }

        assert!(lines[0].contains("InvalidToken"), "{}", lines[0]);
        assert!(lines[0].contains("ParseError"), "{}", lines[0]);
        assert!(lines[0].contains("bad"), "{}", lines[0]);

        assert!(lines[1].contains("InvalidToken"), "{}", lines[1]);
        assert!(lines[1].contains("InvalidSignature"), "{}", lines[1]);
        assert!(lines[1].contains("kid-7"), "{}", lines[1]);
        assert!(!lines[1].contains("token=\u{fffd}bad"), "{}", lines[1]);

        assert!(lines[2].contains("TenantTokenMismatch"), "{}", lines[2]);
        assert!(lines[2].contains("tenant=tenantB"), "{}", lines[2]);
        assert!(!lines[2].contains("InvalidToken"), "{}", lines[2]);
    }
}
