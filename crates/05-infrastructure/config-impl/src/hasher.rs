//! Argon2 密码哈希

use argon2::password_hash::{
    rand_core::OsRng, Error as PasswordHashError, PasswordHash,
    PasswordHasher as ArgonPasswordHasher, PasswordVerifier, SaltString,
};
use argon2::Argon2;
use config_abstractions::PasswordHasher;
use infrastructure_common::ConfigError;

/// Argon2 密码哈希器，随机盐，输出 PHC 字符串
#[derive(Debug, Default, Clone, Copy)]
pub struct Argon2PasswordHasher;

impl Argon2PasswordHasher {
    pub fn new() -> Self {
        Self
    }

    /// 校验明文与 PHC 字符串是否匹配
    pub fn verify(&self, hash: &str, plaintext: &str) -> Result<bool, ConfigError> {
        let parsed = PasswordHash::new(hash).map_err(|e| ConfigError::HashError {
            message: format!("无效的密码哈希: {}", e),
        })?;
        match Argon2::default().verify_password(plaintext.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(PasswordHashError::Password) => Ok(false),
            Err(e) => Err(ConfigError::HashError {
                message: e.to_string(),
            }),
        }
    }
}

impl PasswordHasher for Argon2PasswordHasher {
    fn hash(&self, plaintext: &str) -> Result<String, ConfigError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(plaintext.as_bytes(), &salt)
            .map_err(|e| ConfigError::HashError {
                message: e.to_string(),
            })?;
        Ok(hash.to_string())
    }

    fn name(&self) -> &str {
        "argon2"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_verifies_and_salts() {
        let hasher = Argon2PasswordHasher::new();
        let first = hasher.hash("plain").unwrap();
        let second = hasher.hash("plain").unwrap();

        assert!(first.starts_with("$argon2"));
        assert_ne!(first, second);
        assert!(hasher.verify(&first, "plain").unwrap());
        assert!(!hasher.verify(&first, "other").unwrap());
        assert!(hasher.verify("not-a-hash", "plain").is_err());
    }
}
