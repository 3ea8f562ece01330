//! 通用工具函数

use sha2::{Digest, Sha256};

/// 计算口令摘要（十六进制 SHA-256）
pub fn password_digest(password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// 校验口令与存储的摘要是否一致
pub fn verify_password(password: &str, digest: &str) -> bool {
    password_digest(password).eq_ignore_ascii_case(digest.trim())
}

/// 校验患者或医生姓名：非空且不含控制字符
pub fn is_valid_person_name(name: &str) -> bool {
    let name = name.trim();
    !name.is_empty() && name.len() <= 255 && !name.chars().any(char::is_control)
}
