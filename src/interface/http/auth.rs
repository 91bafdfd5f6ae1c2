use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::interface::http::request::HttpResponse;
use crate::shared::error::RequestError;

pub const BASIC_CHALLENGE: &str = "Basic realm=Restricted";

const BASIC_PREFIX: &str = "basic ";

/// Basic-auth gate in front of a handler. Absent, malformed and wrong
/// credentials all get the same 401 with a challenge.
#[derive(Clone)]
pub struct AuthGuard {
    user: Vec<u8>,
    password: Vec<u8>,
}

impl AuthGuard {
    pub fn new(user: &str, password: &str) -> Self {
        Self {
            user: user.as_bytes().to_vec(),
            password: password.as_bytes().to_vec(),
        }
    }

    /// Runs `next` only when `authorization` carries the expected pair.
    pub fn check<F>(&self, authorization: Option<&str>, next: F) -> HttpResponse
    where
        F: FnOnce() -> HttpResponse,
    {
        if self.verify(authorization) {
            log::debug!("[auth] credentials accepted, delegating");
            return next();
        }
        log::warn!("[auth] unauthorized request");
        HttpResponse::error(RequestError::Unauthorized)
            .with_header("WWW-Authenticate", BASIC_CHALLENGE)
    }

    pub fn verify(&self, authorization: Option<&str>) -> bool {
        let Some((user, password)) = authorization.and_then(decode_basic) else {
            return false;
        };
        // Both comparisons always run so timing does not reveal which one failed.
        let user_ok = constant_time_eq(&self.user, &user);
        let password_ok = constant_time_eq(&self.password, &password);
        user_ok & password_ok
    }
}

fn decode_basic(header: &str) -> Option<(Vec<u8>, Vec<u8>)> {
    let header = header.trim();
    let scheme = header.get(..BASIC_PREFIX.len())?;
    if !scheme.eq_ignore_ascii_case(BASIC_PREFIX) {
        return None;
    }
    let payload = STANDARD.decode(header[BASIC_PREFIX.len()..].trim()).ok()?;
    let split = payload.iter().position(|&b| b == b':')?;
    Some((payload[..split].to_vec(), payload[split + 1..].to_vec()))
}

/// Compares every byte of the longer input regardless of where the first
/// difference is.
fn constant_time_eq(expected: &[u8], provided: &[u8]) -> bool {
    let len = expected.len().max(provided.len());
    let mut diff = expected.len() ^ provided.len();
    for i in 0..len {
        let a = expected.get(i).copied().unwrap_or(0);
        let b = provided.get(i).copied().unwrap_or(0);
        diff |= usize::from(a ^ b);
    }
    diff == 0
}
