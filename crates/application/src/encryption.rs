//! 内容信封加密
//!
//! 可选的静态密钥可逆加密：密钥为配置密文的 SHA-256 哈希，
//! 算法为 AES-256-GCM，信封字段全部 base64 编码。
//! 未配置密钥时 wrap/unwrap 均为恒等变换；
//! 认证失败必须作为硬错误传播，绝不静默返回垃圾数据。

use data_encoding::BASE64;
use rand::RngCore;
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM};
use ring::digest;

use domain::{Content, EncryptedEnvelope};

use crate::error::{ApplicationError, ApplicationResult};

/// 信封版本号
pub const ENVELOPE_VERSION: u32 = 1;
/// 算法标记，保持与历史信封的线上兼容
pub const ENVELOPE_ALG: &str = "aes-256-gcm";

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// 内容加解密器
pub struct ContentCipher {
    key: Option<[u8; 32]>,
}

impl ContentCipher {
    /// 从可选的配置密文构建；None 表示加密未启用
    pub fn new(secret: Option<&str>) -> Self {
        let key = secret.filter(|s| !s.is_empty()).map(|s| {
            let hash = digest::digest(&digest::SHA256, s.as_bytes());
            let mut key = [0u8; 32];
            key.copy_from_slice(hash.as_ref());
            key
        });
        Self { key }
    }

    pub fn is_active(&self) -> bool {
        self.key.is_some()
    }

    /// 加密消息内容，返回信封；加密未启用时返回 None
    pub fn wrap(&self, content: &Content) -> ApplicationResult<Option<EncryptedEnvelope>> {
        let Some(key) = self.key else {
            return Ok(None);
        };

        let serialized = serde_json::to_vec(content)
            .map_err(|error| ApplicationError::Encryption(error.to_string()))?;

        let mut iv = [0u8; NONCE_LEN];
        rand::rng().fill_bytes(&mut iv);

        let sealing = aead_key(&key)?;
        let nonce = Nonce::assume_unique_for_key(iv);
        let mut in_out = serialized;
        sealing
            .seal_in_place_append_tag(nonce, Aad::empty(), &mut in_out)
            .map_err(|_| ApplicationError::Encryption("seal failed".to_string()))?;

        // seal 把认证标签追加在密文之后；信封按历史格式拆开存放
        let tag = in_out.split_off(in_out.len() - TAG_LEN);

        Ok(Some(EncryptedEnvelope {
            v: ENVELOPE_VERSION,
            alg: ENVELOPE_ALG.to_string(),
            iv: BASE64.encode(&iv),
            tag: BASE64.encode(&tag),
            data: BASE64.encode(&in_out),
        }))
    }

    /// 还原条目内容
    ///
    /// 只解密结构上匹配信封格式的负载；没有信封（历史明文）或
    /// 密钥未配置时原样返回明文字段。解密失败是硬错误。
    pub fn unwrap(
        &self,
        content: &Content,
        envelope: Option<&EncryptedEnvelope>,
    ) -> ApplicationResult<Content> {
        let (Some(key), Some(envelope)) = (self.key, envelope) else {
            return Ok(content.clone());
        };

        if envelope.v != ENVELOPE_VERSION || envelope.alg != ENVELOPE_ALG {
            return Ok(content.clone());
        }

        let iv = BASE64
            .decode(envelope.iv.as_bytes())
            .map_err(|error| ApplicationError::Encryption(error.to_string()))?;
        let tag = BASE64
            .decode(envelope.tag.as_bytes())
            .map_err(|error| ApplicationError::Encryption(error.to_string()))?;
        let data = BASE64
            .decode(envelope.data.as_bytes())
            .map_err(|error| ApplicationError::Encryption(error.to_string()))?;

        let nonce = Nonce::try_assume_unique_for_key(&iv)
            .map_err(|_| ApplicationError::Encryption("invalid nonce length".to_string()))?;

        let mut in_out = data;
        in_out.extend_from_slice(&tag);

        let opening = aead_key(&key)?;
        let plaintext = opening
            .open_in_place(nonce, Aad::empty(), &mut in_out)
            .map_err(|_| {
                ApplicationError::Encryption("authentication failed: corrupt or tampered envelope".to_string())
            })?;

        serde_json::from_slice(plaintext)
            .map_err(|error| ApplicationError::Encryption(error.to_string()))
    }
}

fn aead_key(key: &[u8; 32]) -> ApplicationResult<LessSafeKey> {
    let unbound = UnboundKey::new(&AES_256_GCM, key)
        .map_err(|_| ApplicationError::Encryption("invalid key material".to_string()))?;
    Ok(LessSafeKey::new(unbound))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_content() -> Content {
        let mut args = serde_json::Map::new();
        args.insert("text".to_string(), json!("hello"));
        args.insert("nested".to_string(), json!({"deep": [1, 2, 3], "flag": true}));
        Content::new("chat.message", args).unwrap()
    }

    #[test]
    fn round_trip_with_key() {
        let cipher = ContentCipher::new(Some("test-secret"));
        let content = sample_content();

        let envelope = cipher.wrap(&content).unwrap().expect("envelope expected");
        assert_eq!(envelope.v, ENVELOPE_VERSION);
        assert_eq!(envelope.alg, ENVELOPE_ALG);

        let summary = content.summarize();
        let restored = cipher.unwrap(&summary, Some(&envelope)).unwrap();
        assert_eq!(restored, content);
    }

    #[test]
    fn identity_without_key() {
        let cipher = ContentCipher::new(None);
        let content = sample_content();

        assert!(cipher.wrap(&content).unwrap().is_none());
        assert_eq!(cipher.unwrap(&content, None).unwrap(), content);
        assert!(!cipher.is_active());
    }

    #[test]
    fn empty_secret_disables_encryption() {
        let cipher = ContentCipher::new(Some(""));
        assert!(!cipher.is_active());
    }

    #[test]
    fn historical_plaintext_passes_through() {
        let cipher = ContentCipher::new(Some("test-secret"));
        let content = sample_content();
        // 没有信封的历史条目原样返回
        assert_eq!(cipher.unwrap(&content, None).unwrap(), content);
    }

    #[test]
    fn unknown_envelope_version_passes_through() {
        let cipher = ContentCipher::new(Some("test-secret"));
        let content = sample_content();
        let mut envelope = cipher.wrap(&content).unwrap().unwrap();
        envelope.v = 99;
        let result = cipher.unwrap(&content, Some(&envelope)).unwrap();
        assert_eq!(result, content);
    }

    #[test]
    fn tampered_envelope_fails_hard() {
        let cipher = ContentCipher::new(Some("test-secret"));
        let content = sample_content();
        let mut envelope = cipher.wrap(&content).unwrap().unwrap();

        // 篡改密文
        let mut data = BASE64.decode(envelope.data.as_bytes()).unwrap();
        data[0] ^= 0xff;
        envelope.data = BASE64.encode(&data);

        let error = cipher.unwrap(&content, Some(&envelope)).unwrap_err();
        assert!(matches!(error, ApplicationError::Encryption(_)));
    }

    #[test]
    fn wrong_key_fails_hard() {
        let cipher = ContentCipher::new(Some("secret-a"));
        let other = ContentCipher::new(Some("secret-b"));
        let content = sample_content();

        let envelope = cipher.wrap(&content).unwrap().unwrap();
        assert!(other.unwrap(&content, Some(&envelope)).is_err());
    }
}
