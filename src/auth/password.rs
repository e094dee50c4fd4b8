//! Argon2id password hashing.

use crate::error::{OsikatuError, Result};

use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{
        PasswordHash, PasswordHasher as Argon2Hasher, PasswordVerifier, SaltString,
        rand_core::OsRng,
    },
};

/// Argon2id cost parameters.
#[derive(Clone, Debug)]
pub struct PasswordConfig {
    /// Memory cost in KiB (default: 19456 = 19MB)
    pub memory_cost: u32,
    pub time_cost: u32,
    pub parallelism: u32,
}

impl Default for PasswordConfig {
    fn default() -> Self {
        // OWASP recommended minimum for Argon2id
        Self {
            memory_cost: 19 * 1024,
            time_cost: 2,
            parallelism: 1,
        }
    }
}

impl PasswordConfig {
    /// Cheap settings for tests. Never use in production.
    pub fn fast() -> Self {
        Self {
            memory_cost: 1024,
            time_cost: 1,
            parallelism: 1,
        }
    }
}

/// Hashes and verifies passwords as PHC strings.
#[derive(Clone, Default)]
pub struct PasswordHasher {
    config: PasswordConfig,
}

impl PasswordHasher {
    pub fn new(config: PasswordConfig) -> Self {
        Self { config }
    }

    pub fn hash(&self, password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let argon2 = self.build_argon2()?;

        argon2
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| OsikatuError::internal(format!("Password hashing failed: {}", e)))
    }

    /// Verify a password against a stored hash. Argon2 compares in constant time.
    pub fn verify(&self, password: &str, hash: &str) -> Result<bool> {
        let parsed_hash = PasswordHash::new(hash)
            .map_err(|e| OsikatuError::internal(format!("Invalid password hash format: {}", e)))?;

        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok())
    }

    /// Whether a stored hash was produced with different parameters.
    ///
    /// Checked after a successful login so old hashes get upgraded.
    pub fn needs_rehash(&self, hash: &str) -> Result<bool> {
        let parsed = PasswordHash::new(hash)
            .map_err(|e| OsikatuError::internal(format!("Invalid hash format: {}", e)))?;

        if parsed.algorithm != argon2::ARGON2ID_IDENT {
            return Ok(true);
        }

        let param = |name: &str| parsed.params.get(name).and_then(|v| v.decimal().ok());
        Ok(match (param("m"), param("t"), param("p")) {
            (Some(m), Some(t), Some(p)) => {
                m != self.config.memory_cost
                    || t != self.config.time_cost
                    || p != self.config.parallelism
            }
            _ => true,
        })
    }

    fn build_argon2(&self) -> Result<Argon2<'static>> {
        let params = Params::new(
            self.config.memory_cost,
            self.config.time_cost,
            self.config.parallelism,
            None,
        )
        .map_err(|e| OsikatuError::internal(format!("Invalid Argon2 params: {}", e)))?;

        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hasher = PasswordHasher::new(PasswordConfig::fast());
        let hash = hasher.hash("oshi-is-life").unwrap();

        assert!(hash.starts_with("$argon2id$"));
        assert!(hasher.verify("oshi-is-life", &hash).unwrap());
        assert!(!hasher.verify("wrong-password", &hash).unwrap());
    }

    #[test]
    fn test_hash_is_salted() {
        let hasher = PasswordHasher::new(PasswordConfig::fast());
        let a = hasher.hash("same-password").unwrap();
        let b = hasher.hash("same-password").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_needs_rehash() {
        let fast = PasswordHasher::new(PasswordConfig::fast());
        let hash = fast.hash("password123").unwrap();

        assert!(!fast.needs_rehash(&hash).unwrap());
        assert!(PasswordHasher::default().needs_rehash(&hash).unwrap());
    }

    #[test]
    fn test_invalid_hash_is_internal_error() {
        let hasher = PasswordHasher::new(PasswordConfig::fast());
        assert!(matches!(
            hasher.verify("pw", "not-a-hash"),
            Err(OsikatuError::Internal(_))
        ));
    }
}
