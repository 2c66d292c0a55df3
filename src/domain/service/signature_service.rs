use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};

use crate::domain::entity::workflow_log::{LogAction, WorkflowLog};

type HmacSha256 = Hmac<Sha256>;

/// Signature は 1 回の署名結果を表す。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub signature_hash: String,
    pub data_hash: String,
    pub timestamp: i64,
}

/// SignatureCheck はログ 1 件の検証結果を表す。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignatureCheck {
    pub signature_valid: bool,
    pub data_hash_valid: bool,
}

impl SignatureCheck {
    pub fn is_valid(&self) -> bool {
        self.signature_valid && self.data_hash_valid
    }
}

/// SignatureService は監査ログの HMAC-SHA256 署名を生成・検証する。
/// 署名鍵はコンストラクタで明示的に受け取る。
#[derive(Clone)]
pub struct SignatureService {
    mac: HmacSha256,
}

impl std::fmt::Debug for SignatureService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureService").finish_non_exhaustive()
    }
}

impl SignatureService {
    pub fn new(secret: &SecretString) -> anyhow::Result<Self> {
        let mac = HmacSha256::new_from_slice(secret.expose_secret().as_bytes())
            .map_err(|e| anyhow::anyhow!("invalid signature key: {}", e))?;
        Ok(Self { mac })
    }

    /// 現在時刻（ナノ秒）で署名する。
    pub fn sign(
        &self,
        signer_id: &str,
        doc_num: &str,
        action: LogAction,
        step_order: i32,
        payload: &[u8],
    ) -> Signature {
        let timestamp = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
        self.sign_at(signer_id, doc_num, action, step_order, payload, timestamp)
    }

    /// 指定したタイムスタンプで署名する。同じ入力に対して常に同じ結果を返す。
    pub fn sign_at(
        &self,
        signer_id: &str,
        doc_num: &str,
        action: LogAction,
        step_order: i32,
        payload: &[u8],
        timestamp: i64,
    ) -> Signature {
        let data_hash = data_hash(payload);
        let raw = signing_input(signer_id, doc_num, action, step_order, timestamp, &data_hash);
        let mut mac = self.mac.clone();
        mac.update(raw.as_bytes());
        Signature {
            signature_hash: hex::encode(mac.finalize().into_bytes()),
            data_hash,
            timestamp,
        }
    }

    /// 保存済みのタイムスタンプとデータハッシュから署名を再計算し、
    /// 現在のペイロードとデータハッシュが一致するかを検証する。
    pub fn verify(&self, log: &WorkflowLog, doc_num: &str, payload: &[u8]) -> SignatureCheck {
        let raw = signing_input(
            &log.actor_id,
            doc_num,
            log.action,
            log.step_order,
            log.signed_timestamp,
            &log.data_snapshot_hash,
        );
        let mut mac = self.mac.clone();
        mac.update(raw.as_bytes());
        let signature_valid = hex::decode(&log.signature_hash)
            .map(|expected| mac.verify_slice(&expected).is_ok())
            .unwrap_or(false);
        SignatureCheck {
            signature_valid,
            data_hash_valid: data_hash(payload) == log.data_snapshot_hash,
        }
    }
}

/// ペイロードの SHA-256 を 16 進文字列で返す。空のペイロードは空文字列。
pub fn data_hash(payload: &[u8]) -> String {
    if payload.is_empty() {
        return String::new();
    }
    hex::encode(Sha256::digest(payload))
}

fn signing_input(
    signer_id: &str,
    doc_num: &str,
    action: LogAction,
    step_order: i32,
    timestamp: i64,
    data_hash: &str,
) -> String {
    format!("{signer_id}|{doc_num}|{action}|{step_order}|{timestamp}|{data_hash}")
}
