//! Callback Payload Codec
//!
//! AES-256-CBC encryption of callback payloads. The key is the base64 decoding of
//! `EncodingAESKey + "="` and the IV is the first 16 bytes of that key.
//!
//! Plaintext frame (before PKCS#7 padding to a 32-byte boundary):
//!
//! ```text
//! random(16) || msg_len(u32, big-endian) || msg(msg_len) || receiver_id(rest)
//! ```

use aes::cipher::{block_padding::NoPadding, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, STANDARD};
use base64::Engine;
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{CryptoError, Result};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Length of an `EncodingAESKey` as issued by the platform.
pub const ENCODING_AES_KEY_LEN: usize = 43;

/// PKCS#7 block size used by the platform (twice the AES block size).
const PAD_BLOCK: usize = 32;

const RANDOM_LEN: usize = 16;
const LEN_FIELD: usize = 4;
const HEADER_LEN: usize = RANDOM_LEN + LEN_FIELD;

/// Keys issued by the platform are random 43-character strings, so the final
/// symbol usually carries non-zero trailing bits.
const KEY_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_allow_trailing_bits(true),
);

/// Encrypts and decrypts callback payloads for one organization.
///
/// Built per request from a tenant's connection record; never shared across tenants.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct PayloadCodec {
    key: [u8; 32],
    #[zeroize(skip)]
    receiver_id: String,
}

impl std::fmt::Debug for PayloadCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PayloadCodec")
            .field("key", &"<redacted>")
            .field("receiver_id", &self.receiver_id)
            .finish()
    }
}

impl PayloadCodec {
    /// Derive the AES key from `encoding_aes_key` and bind the codec to `receiver_id` (the `CorpID`).
    pub fn new(encoding_aes_key: &str, receiver_id: &str) -> Result<Self> {
        if encoding_aes_key.len() != ENCODING_AES_KEY_LEN {
            return Err(CryptoError::InvalidKey(format!(
                "expected {ENCODING_AES_KEY_LEN} characters, got {}",
                encoding_aes_key.len()
            )));
        }

        let mut decoded = KEY_ENGINE
            .decode(format!("{encoding_aes_key}="))
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;

        let key: [u8; 32] = match decoded.as_slice().try_into() {
            Ok(key) => key,
            Err(_) => {
                let len = decoded.len();
                decoded.zeroize();
                return Err(CryptoError::InvalidKey(format!(
                    "expected 32 key bytes, got {len}"
                )));
            }
        };
        decoded.zeroize();

        Ok(Self {
            key,
            receiver_id: receiver_id.to_string(),
        })
    }

    fn iv(&self) -> &[u8] {
        &self.key[..16]
    }

    /// Decrypt a base64 ciphertext and return the embedded message.
    ///
    /// Fails with [`CryptoError::TenantMismatch`] when the payload was framed for
    /// another receiver, even if the AES layer decrypts cleanly.
    pub fn decrypt(&self, ciphertext_b64: &str) -> Result<String> {
        let mut buf = STANDARD.decode(ciphertext_b64.trim())?;

        if buf.is_empty() || buf.len() % 16 != 0 {
            return Err(CryptoError::Padding(format!(
                "ciphertext length {} is not a positive multiple of 16",
                buf.len()
            )));
        }

        let decryptor = Aes256CbcDec::new_from_slices(&self.key, self.iv())
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        let padded_len = decryptor
            .decrypt_padded_mut::<NoPadding>(&mut buf)
            .map_err(|e| CryptoError::Padding(e.to_string()))?
            .len();
        buf.truncate(padded_len);

        let plain = strip_pkcs7(&buf)?;
        let (message, receiver) = split_frame(plain)?;

        if receiver != self.receiver_id.as_bytes() {
            return Err(CryptoError::TenantMismatch {
                expected: self.receiver_id.clone(),
                found: String::from_utf8_lossy(receiver).into_owned(),
            });
        }

        String::from_utf8(message.to_vec())
            .map_err(|e| CryptoError::MalformedFrame(format!("message is not UTF-8: {e}")))
    }

    /// Encrypt `plaintext` into a base64 ciphertext using a fresh random prefix.
    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let mut random = [0u8; RANDOM_LEN];
        rand::thread_rng().fill_bytes(&mut random);
        self.encrypt_with_random(plaintext, random)
    }

    /// Encrypt with a caller-supplied 16-byte prefix. Deterministic for a given input.
    pub fn encrypt_with_random(&self, plaintext: &str, random: [u8; RANDOM_LEN]) -> Result<String> {
        let message = plaintext.as_bytes();
        let msg_len = u32::try_from(message.len()).map_err(|_| {
            CryptoError::MalformedFrame(format!("message too large: {} bytes", message.len()))
        })?;

        let mut buf =
            Vec::with_capacity(HEADER_LEN + message.len() + self.receiver_id.len() + PAD_BLOCK);
        buf.extend_from_slice(&random);
        buf.extend_from_slice(&msg_len.to_be_bytes());
        buf.extend_from_slice(message);
        buf.extend_from_slice(self.receiver_id.as_bytes());

        let pad = PAD_BLOCK - (buf.len() % PAD_BLOCK);
        buf.resize(buf.len() + pad, pad as u8);

        let len = buf.len();
        let encryptor = Aes256CbcEnc::new_from_slices(&self.key, self.iv())
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        let ciphertext = encryptor
            .encrypt_padded_mut::<NoPadding>(&mut buf, len)
            .map_err(|e| CryptoError::Padding(e.to_string()))?;

        Ok(STANDARD.encode(ciphertext))
    }
}

/// Strip PKCS#7 padding with a block size of 32.
fn strip_pkcs7(buf: &[u8]) -> Result<&[u8]> {
    let pad = *buf
        .last()
        .ok_or_else(|| CryptoError::Padding("empty plaintext".into()))? as usize;

    if pad == 0 || pad > PAD_BLOCK || pad > buf.len() {
        return Err(CryptoError::Padding(format!("invalid pad length {pad}")));
    }

    let (body, padding) = buf.split_at(buf.len() - pad);
    if padding.iter().any(|&b| b as usize != pad) {
        return Err(CryptoError::Padding("inconsistent padding bytes".into()));
    }

    Ok(body)
}

/// Split an unpadded frame into `(message, receiver_id)`.
fn split_frame(plain: &[u8]) -> Result<(&[u8], &[u8])> {
    if plain.len() < HEADER_LEN {
        return Err(CryptoError::MalformedFrame(format!(
            "frame is {} bytes, shorter than the {HEADER_LEN}-byte header",
            plain.len()
        )));
    }

    let mut len_bytes = [0u8; LEN_FIELD];
    len_bytes.copy_from_slice(&plain[RANDOM_LEN..HEADER_LEN]);
    let msg_len = u32::from_be_bytes(len_bytes) as usize;

    let end = HEADER_LEN
        .checked_add(msg_len)
        .filter(|&end| end <= plain.len())
        .ok_or_else(|| {
            CryptoError::MalformedFrame(format!(
                "length field {msg_len} overruns {}-byte frame",
                plain.len()
            ))
        })?;

    Ok((&plain[HEADER_LEN..end], &plain[end..]))
}
