use rand::{distributions::Alphanumeric, rngs::OsRng, Rng};

pub const SESSION_TOKEN_LENGTH: usize = 40;

/// Opaque session token drawn from the OS entropy source.
pub fn generate_session_token() -> String {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(SESSION_TOKEN_LENGTH)
        .map(char::from)
        .collect()
}
