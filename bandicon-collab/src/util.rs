use argon2::{
    password_hash::{Encoding, SaltString},
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
};
use rand::{distributions::Alphanumeric, rngs::OsRng, thread_rng, Rng};

pub fn random_string(length: usize) -> String {
    let mut rng = thread_rng();

    std::iter::repeat(())
        .map(|_| rng.sample(Alphanumeric) as char)
        .take(length)
        .collect()
}

/// Hashes a password or similar secret with argon2 and a random salt
pub fn hash_secret(secret: &str) -> Result<String, String> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(secret.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| e.to_string())
}

/// Returns Ok(true) if the secret matches the stored argon2 hash
pub fn verify_secret(secret: &str, hash: &str) -> Result<bool, String> {
    let stored = PasswordHash::parse(hash, Encoding::default()).map_err(|e| e.to_string())?;

    Ok(Argon2::default()
        .verify_password(secret.as_bytes(), &stored)
        .is_ok())
}
