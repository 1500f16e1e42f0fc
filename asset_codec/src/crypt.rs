use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};

use crate::CodecError;

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;

const AES_KEY: [u8; 16] = *b"UITpAi82pHAWwnzq";
const AES_IV_MASK: [u8; 16] = *b"HRMCwPonJLIB3WCl";

pub const IV_SEGMENT_SIZE: usize = AES_IV_MASK.len();

fn derive_iv(segment: &[u8]) -> [u8; 16] {
    let mut iv = [0u8; 16];
    for (index, (byte, mask)) in segment.iter().zip(AES_IV_MASK.iter()).enumerate() {
        iv[index] = byte ^ mask;
    }
    iv
}

/// Decrypts `[iv segment][ciphertext]`; the IV is the segment masked
/// against the fixed key material.
pub fn decrypt_data(data: &[u8]) -> Result<Vec<u8>, CodecError> {
    if data.len() < IV_SEGMENT_SIZE {
        return Err(CodecError::Crypt(format!(
            "payload of {} bytes has no iv segment",
            data.len()
        )));
    }
    let iv = derive_iv(&data[..IV_SEGMENT_SIZE]);
    Aes128CbcDec::new(&AES_KEY.into(), &iv.into())
        .decrypt_padded_vec_mut::<Pkcs7>(&data[IV_SEGMENT_SIZE..])
        .map_err(|err| CodecError::Crypt(err.to_string()))
}

/// Encrypts behind an all-zero IV segment.
pub fn encrypt_data(data: &[u8]) -> Vec<u8> {
    let segment = [0u8; IV_SEGMENT_SIZE];
    let iv = derive_iv(&segment);
    let ciphertext =
        Aes128CbcEnc::new(&AES_KEY.into(), &iv.into()).encrypt_padded_vec_mut::<Pkcs7>(data);
    let mut out = Vec::with_capacity(IV_SEGMENT_SIZE + ciphertext.len());
    out.extend_from_slice(&segment);
    out.extend_from_slice(&ciphertext);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn encrypted_payload_starts_with_zero_segment() {
        let sealed = encrypt_data(b"{\"a\":1}");
        assert!(sealed[..IV_SEGMENT_SIZE].iter().all(|byte| *byte == 0));
        assert_eq!((sealed.len() - IV_SEGMENT_SIZE) % 16, 0);
        assert_eq!(decrypt_data(&sealed).expect("decrypt ok"), b"{\"a\":1}");
    }

    #[test]
    fn truncated_payload_fails() {
        assert!(decrypt_data(&[0u8; 4]).is_err());
        let mut sealed = encrypt_data(b"hello world");
        sealed.truncate(sealed.len() - 3);
        assert!(decrypt_data(&sealed).is_err());
    }

    proptest! {
        #[test]
        fn encrypt_of_decrypt_is_identity(plain in proptest::collection::vec(any::<u8>(), 0..256)) {
            let sealed = encrypt_data(&plain);
            let opened = decrypt_data(&sealed).expect("decrypt ok");
            prop_assert_eq!(&opened, &plain);
            prop_assert_eq!(encrypt_data(&opened), sealed);
        }
    }
}
