//! 员工PIN摘要
//!
//! PIN以 `sha256:<hex>` 形式保存，盐为用户ID。旧数据中的明文PIN仍可校验。

use radflow_core::{RadflowError, Result};
use sha2::{Digest, Sha256};

const DIGEST_PREFIX: &str = "sha256:";

/// 校验PIN格式：4位数字
pub fn validate_pin_format(pin: &str) -> Result<()> {
    if pin.len() == 4 && pin.chars().all(|c| c.is_ascii_digit()) {
        Ok(())
    } else {
        Err(RadflowError::Validation("PIN must be exactly 4 digits".to_string()))
    }
}

/// 计算PIN摘要
pub fn hash_pin(user_id: &str, pin: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(user_id.as_bytes());
    hasher.update(b":");
    hasher.update(pin.as_bytes());
    format!("{}{:x}", DIGEST_PREFIX, hasher.finalize())
}

/// 是否已经是摘要形式
pub fn is_hashed(stored: &str) -> bool {
    stored.starts_with(DIGEST_PREFIX)
}

/// 校验PIN
pub fn verify_pin(user_id: &str, pin: &str, stored: &str) -> bool {
    if is_hashed(stored) {
        hash_pin(user_id, pin) == stored
    } else {
        !stored.is_empty() && stored == pin
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pin_format() {
        assert!(validate_pin_format("0420").is_ok());
        assert!(validate_pin_format("42").is_err());
        assert!(validate_pin_format("12a4").is_err());
    }

    #[test]
    fn test_hash_is_salted_by_user() {
        let a = hash_pin("USR-1", "1234");
        let b = hash_pin("USR-2", "1234");
        assert!(is_hashed(&a));
        assert_ne!(a, b);
        assert!(verify_pin("USR-1", "1234", &a));
        assert!(!verify_pin("USR-1", "4321", &a));
        assert!(!verify_pin("USR-2", "1234", &a));
    }

    #[test]
    fn test_legacy_plaintext_pin() {
        assert!(verify_pin("USR-1", "1234", "1234"));
        assert!(!verify_pin("USR-1", "", ""));
    }
}
