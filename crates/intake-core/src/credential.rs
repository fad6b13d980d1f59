//! Credential Codec
//!
//! Compact HS256 session tokens: `header.payload.signature`, each segment
//! unpadded base64url. The server keeps no token state; every call rebuilds
//! trust from the signature and the expiry claim.
//!
//! # Security Properties
//!
//! - The signing secret lives in a `SecretString` and must be at least
//!   [`MIN_SECRET_LENGTH`] bytes
//! - Signatures are checked with `Mac::verify_slice` (constant time)
//! - Expiry uses `now >= exp + leeway`; leeway defaults to zero

use crate::error::IntakeError;
use crate::types::{ApplicationId, SessionMarker};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Minimum signing secret length in bytes
pub const MIN_SECRET_LENGTH: usize = 32;

/// Default token lifetime (24 hours)
pub const DEFAULT_TOKEN_TTL_SECS: u64 = 86_400;

const ALGORITHM: &str = "HS256";
const TOKEN_TYPE: &str = "JWT";

/// Token construction / verification failures
///
/// These never reach a client; the session gate collapses them into
/// [`IntakeError::Unauthorized`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CredentialError {
    /// Wrong segment count, bad encoding, bad JSON, or unsupported algorithm
    #[error("malformed token: {0}")]
    MalformedToken(&'static str),

    /// Signature segment does not match the recomputed HMAC
    #[error("invalid token signature")]
    InvalidSignature,

    /// Token is past its expiry
    #[error("token expired at {expired_at}")]
    TokenExpired {
        /// `exp` claim, seconds since the Unix epoch
        expired_at: i64,
    },
}

#[derive(Debug, Serialize, Deserialize)]
struct TokenHeader {
    alg: String,
    typ: String,
}

/// Claims carried in the token payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Session marker of the bound application
    pub session_id: SessionMarker,
    /// The one application this token may act on
    pub applicant_id: ApplicationId,
    /// Broker agent attribution
    pub agent_id: Option<String>,
    /// Issued at, seconds since the Unix epoch
    pub iat: i64,
    /// Expires at, seconds since the Unix epoch; required, a payload
    /// without it does not decode
    pub exp: i64,
}

/// Issues and verifies session tokens under one signing secret
#[derive(Clone)]
pub struct CredentialCodec {
    secret: SecretString,
    ttl_secs: u64,
    leeway_secs: u64,
}

impl std::fmt::Debug for CredentialCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialCodec")
            .field("ttl_secs", &self.ttl_secs)
            .field("leeway_secs", &self.leeway_secs)
            .finish_non_exhaustive()
    }
}

impl CredentialCodec {
    /// Create a codec with the default lifetime and no leeway
    ///
    /// # Errors
    /// `ServerConfiguration` if the secret is shorter than [`MIN_SECRET_LENGTH`]
    pub fn new(secret: SecretString) -> Result<Self, IntakeError> {
        if secret.expose_secret().len() < MIN_SECRET_LENGTH {
            return Err(IntakeError::ServerConfiguration(format!(
                "signing secret must be at least {MIN_SECRET_LENGTH} bytes"
            )));
        }
        Ok(Self {
            secret,
            ttl_secs: DEFAULT_TOKEN_TTL_SECS,
            leeway_secs: 0,
        })
    }

    /// Set token lifetime
    #[must_use]
    pub const fn with_ttl(mut self, ttl_secs: u64) -> Self {
        self.ttl_secs = ttl_secs;
        self
    }

    /// Accept tokens up to `leeway_secs` past their expiry
    #[must_use]
    pub const fn with_leeway(mut self, leeway_secs: u64) -> Self {
        self.leeway_secs = leeway_secs;
        self
    }

    /// Token lifetime in seconds
    #[must_use]
    pub const fn ttl_secs(&self) -> u64 {
        self.ttl_secs
    }

    /// Build claims for a freshly created application
    #[must_use]
    pub fn claims_for(
        &self,
        application_id: ApplicationId,
        session_marker: SessionMarker,
        agent_id: Option<String>,
        issued_at: DateTime<Utc>,
    ) -> SessionClaims {
        let iat = issued_at.timestamp();
        SessionClaims {
            session_id: session_marker,
            applicant_id: application_id,
            agent_id,
            iat,
            exp: iat.saturating_add(i64::try_from(self.ttl_secs).unwrap_or(i64::MAX)),
        }
    }

    /// Sign claims into a token
    #[must_use]
    pub fn issue(&self, claims: &SessionClaims) -> String {
        let header = TokenHeader {
            alg: ALGORITHM.to_string(),
            typ: TOKEN_TYPE.to_string(),
        };
        let header = serde_json::to_vec(&header).expect("token header serializes");
        let payload = serde_json::to_vec(claims).expect("session claims serialize");

        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(header),
            URL_SAFE_NO_PAD.encode(payload)
        );
        let mut mac = self.mac();
        mac.update(signing_input.as_bytes());
        let signature = mac.finalize().into_bytes();

        format!("{signing_input}.{}", URL_SAFE_NO_PAD.encode(signature))
    }

    /// Verify a token against the current time
    ///
    /// # Errors
    /// See [`CredentialCodec::verify_at`]
    pub fn verify(&self, token: &str) -> Result<SessionClaims, CredentialError> {
        self.verify_at(token, Utc::now().timestamp())
    }

    /// Verify a token against an explicit clock reading
    ///
    /// # Errors
    /// - `MalformedToken` if the token is not three segments, or the header or
    ///   payload does not decode, or the header names another algorithm
    /// - `InvalidSignature` if the signature segment does not decode or match
    /// - `TokenExpired` if `now >= exp + leeway`
    pub fn verify_at(&self, token: &str, now: i64) -> Result<SessionClaims, CredentialError> {
        let segments: Vec<&str> = token.split('.').collect();
        let [header_b64, payload_b64, signature_b64] = segments.as_slice() else {
            return Err(CredentialError::MalformedToken("expected three segments"));
        };

        let signature = URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|_| CredentialError::InvalidSignature)?;
        let mut mac = self.mac();
        mac.update(header_b64.as_bytes());
        mac.update(b".");
        mac.update(payload_b64.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| CredentialError::InvalidSignature)?;

        let header: TokenHeader = decode_segment(header_b64, "header")?;
        if header.alg != ALGORITHM {
            return Err(CredentialError::MalformedToken("unsupported algorithm"));
        }
        let claims: SessionClaims = decode_segment(payload_b64, "payload")?;

        let leeway = i64::try_from(self.leeway_secs).unwrap_or(i64::MAX);
        if now >= claims.exp.saturating_add(leeway) {
            return Err(CredentialError::TokenExpired {
                expired_at: claims.exp,
            });
        }
        Ok(claims)
    }

    fn mac(&self) -> HmacSha256 {
        HmacSha256::new_from_slice(self.secret.expose_secret().as_bytes())
            .expect("HMAC can take key of any size")
    }
}

fn decode_segment<T: serde::de::DeserializeOwned>(
    segment: &str,
    what: &'static str,
) -> Result<T, CredentialError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| CredentialError::MalformedToken(what))?;
    serde_json::from_slice(&bytes).map_err(|_| CredentialError::MalformedToken(what))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "unit-test-signing-secret-0123456789abcdef";

    fn codec() -> CredentialCodec {
        CredentialCodec::new(SecretString::from(SECRET)).unwrap()
    }

    fn claims(codec: &CredentialCodec) -> SessionClaims {
        codec.claims_for(
            ApplicationId::new(),
            SessionMarker::generate(),
            Some("agent-7".into()),
            Utc::now(),
        )
    }

    #[test]
    fn test_round_trip() {
        let codec = codec();
        let claims = claims(&codec);
        let token = codec.issue(&claims);

        assert_eq!(token.split('.').count(), 3);
        assert!(!token.contains('='));
        assert_eq!(codec.verify(&token).unwrap(), claims);
    }

    #[test]
    fn test_default_ttl_is_one_day() {
        let codec = codec();
        let claims = claims(&codec);
        assert_eq!(claims.exp - claims.iat, 86_400);
    }

    #[test]
    fn test_short_secret_rejected() {
        let result = CredentialCodec::new(SecretString::from("too-short"));
        assert!(matches!(result, Err(IntakeError::ServerConfiguration(_))));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let codec = codec();
        let token = codec.issue(&claims(&codec));
        let other =
            CredentialCodec::new(SecretString::from("another-secret-that-is-long-enough!!")).unwrap();

        assert_eq!(other.verify(&token), Err(CredentialError::InvalidSignature));
    }

    #[test]
    fn test_segment_count() {
        let codec = codec();
        assert!(matches!(
            codec.verify("only.two"),
            Err(CredentialError::MalformedToken(_))
        ));
        assert!(matches!(
            codec.verify("a.b.c.d"),
            Err(CredentialError::MalformedToken(_))
        ));
        assert!(matches!(
            codec.verify(""),
            Err(CredentialError::MalformedToken(_))
        ));
    }

    #[test]
    fn test_undecodable_signature() {
        let codec = codec();
        let token = codec.issue(&claims(&codec));
        let (signed, _) = token.rsplit_once('.').unwrap();
        let forged = format!("{signed}.!!!not-base64!!!");

        assert_eq!(codec.verify(&forged), Err(CredentialError::InvalidSignature));
    }

    #[test]
    fn test_tampered_payload() {
        let codec = codec();
        let token = codec.issue(&claims(&codec));
        let mut parts: Vec<String> = token.split('.').map(str::to_string).collect();
        let mut other = claims(&codec);
        other.agent_id = None;
        parts[1] = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&other).unwrap());

        assert_eq!(
            codec.verify(&parts.join(".")),
            Err(CredentialError::InvalidSignature)
        );
    }

    #[test]
    fn test_other_algorithm_is_malformed() {
        let codec = codec();
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims(&codec)).unwrap());
        let input = format!("{header}.{payload}");
        let mut mac = codec.mac();
        mac.update(input.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        assert_eq!(
            codec.verify(&format!("{input}.{signature}")),
            Err(CredentialError::MalformedToken("unsupported algorithm"))
        );
    }

    #[test]
    fn test_payload_without_expiry_is_malformed() {
        let codec = codec();
        let mut payload = serde_json::to_value(claims(&codec)).unwrap();
        payload.as_object_mut().unwrap().remove("exp");

        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&payload).unwrap());
        let input = format!("{header}.{payload}");
        let mut mac = codec.mac();
        mac.update(input.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        assert_eq!(
            codec.verify(&format!("{input}.{signature}")),
            Err(CredentialError::MalformedToken("payload"))
        );
    }

    #[test]
    fn test_expiry_boundary() {
        let codec = codec();
        let claims = claims(&codec);
        let token = codec.issue(&claims);

        assert!(codec.verify_at(&token, claims.exp - 1).is_ok());
        assert_eq!(
            codec.verify_at(&token, claims.exp),
            Err(CredentialError::TokenExpired {
                expired_at: claims.exp
            })
        );
    }

    #[test]
    fn test_leeway_extends_acceptance() {
        let codec = codec().with_leeway(30);
        let claims = claims(&codec);
        let token = codec.issue(&claims);

        assert!(codec.verify_at(&token, claims.exp + 29).is_ok());
        assert!(codec.verify_at(&token, claims.exp + 30).is_err());
    }

    #[test]
    fn test_debug_hides_secret() {
        let rendered = format!("{:?}", codec());
        assert!(!rendered.contains(SECRET));
    }
}
