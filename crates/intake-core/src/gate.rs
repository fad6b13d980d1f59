//! Session Authorization Gate
//!
//! Maps a bearer token to the one application it may act on. Pure: it never
//! reads the store. Every credential failure leaves as
//! [`IntakeError::Unauthorized`]; the specific reason is only logged.

use crate::credential::{CredentialCodec, CredentialError, SessionClaims};
use crate::error::IntakeError;
use crate::telemetry;
use crate::types::{ApplicationId, SessionMarker};

/// Identity extracted from a verified token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizedSession {
    /// Bound application
    pub application_id: ApplicationId,
    /// Session marker from the token
    pub session_marker: SessionMarker,
    /// Broker agent attribution
    pub agent_id: Option<String>,
    /// Token expiry, seconds since the Unix epoch
    pub expires_at: i64,
}

impl From<SessionClaims> for AuthorizedSession {
    fn from(claims: SessionClaims) -> Self {
        Self {
            application_id: claims.applicant_id,
            session_marker: claims.session_id,
            agent_id: claims.agent_id,
            expires_at: claims.exp,
        }
    }
}

/// Token-to-identity gate in front of every mutating operation
#[derive(Debug, Clone)]
pub struct SessionGate {
    codec: CredentialCodec,
}

impl SessionGate {
    /// Create a gate over a codec
    #[must_use]
    pub const fn new(codec: CredentialCodec) -> Self {
        Self { codec }
    }

    /// Codec used for verification (and issuance by the service)
    #[must_use]
    pub const fn codec(&self) -> &CredentialCodec {
        &self.codec
    }

    /// Authorize a token against the current time
    ///
    /// # Errors
    /// `Unauthorized` for any missing, malformed, badly signed, or expired token
    pub fn authorize(&self, token: &str) -> Result<AuthorizedSession, IntakeError> {
        self.authorize_at(token, chrono::Utc::now().timestamp())
    }

    /// Authorize a token against an explicit clock reading
    ///
    /// # Errors
    /// See [`SessionGate::authorize`]
    pub fn authorize_at(&self, token: &str, now: i64) -> Result<AuthorizedSession, IntakeError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(reject("missing token"));
        }
        match self.codec.verify_at(token, now) {
            Ok(claims) => Ok(claims.into()),
            Err(err) => Err(reject(match err {
                CredentialError::MalformedToken(_) => "malformed token",
                CredentialError::InvalidSignature => "invalid signature",
                CredentialError::TokenExpired { .. } => "token expired",
            })),
        }
    }
}

fn reject(reason: &'static str) -> IntakeError {
    tracing::warn!(reason, "session token rejected");
    metrics::counter!(telemetry::AUTH_REJECTIONS, "reason" => reason).increment(1);
    IntakeError::Unauthorized
}
