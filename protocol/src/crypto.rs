//! Crypto capability consumed by the Battle.net handshake
//!
//! CD-key hashing, the executable version check and the NLS (SRP) logon are
//! implemented outside this workspace. The handshake only needs their
//! results, so they are reached through [`CryptoProvider`].

use thiserror::Error;

use crate::codec::{ByteReader, PacketWriter};
use crate::error::ProtocolError;

/// Length of an NLS public key and of the server key/salt it is paired with
pub const NLS_KEY_SIZE: usize = 32;

/// Length of the logon proof and of a single password hash
pub const PROOF_SIZE: usize = 20;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Crypto provider unavailable: {0}")]
    Unavailable(String),

    #[error("CD key rejected by provider: {0}")]
    InvalidCdKey(String),

    #[error("Version check failed: {0}")]
    VersionCheck(String),

    #[error("NLS operation failed: {0}")]
    Nls(String),
}

/// Hashed CD key block sent in SID_AUTH_CHECK (36 bytes on the wire)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CdKeyInfo {
    pub key_length: u32,
    pub product: u32,
    pub public_value: u32,
    pub hash: [u8; PROOF_SIZE],
}

impl CdKeyInfo {
    pub const SIZE: usize = 36;

    pub fn write(&self, writer: PacketWriter) -> PacketWriter {
        writer
            .u32(self.key_length)
            .u32(self.product)
            .u32(self.public_value)
            .u32(0)
            .bytes(&self.hash)
    }

    pub fn read(reader: &mut ByteReader<'_>) -> Result<Self, ProtocolError> {
        let key_length = reader.u32()?;
        let product = reader.u32()?;
        let public_value = reader.u32()?;
        reader.skip(4)?;
        let hash = reader.array()?;

        Ok(Self {
            key_length,
            product,
            public_value,
            hash,
        })
    }
}

/// Executable version check result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExeInfo {
    pub version: [u8; 4],
    pub hash: u32,
    /// Descriptive string ("war3.exe 05/06/12 12:12:12 471040")
    pub info: String,
}

/// Opaque reference to provider-side NLS state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NlsHandle(pub u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NlsKeyPair {
    pub handle: NlsHandle,
    /// Should be [`NLS_KEY_SIZE`] bytes; callers must check
    pub public_key: Vec<u8>,
}

pub trait CryptoProvider {
    fn cd_key_info(
        &self,
        key: &str,
        client_token: u32,
        server_token: u32,
    ) -> Result<CdKeyInfo, CryptoError>;

    /// Run the version check `formula` against the archive named by the server
    fn exe_info(&self, formula: &str, archive: &str) -> Result<ExeInfo, CryptoError>;

    fn nls_create_keypair(&self, username: &str, password: &str)
    -> Result<NlsKeyPair, CryptoError>;

    /// Compute the client proof M1
    fn nls_proof(
        &self,
        handle: NlsHandle,
        server_key: &[u8; NLS_KEY_SIZE],
        salt: &[u8; NLS_KEY_SIZE],
    ) -> Result<[u8; PROOF_SIZE], CryptoError>;

    /// Broken-SHA1 password hash used by PvPGN servers
    fn hash_password_single(&self, password: &str) -> Result<[u8; PROOF_SIZE], CryptoError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cd_key_info_layout() {
        let info = CdKeyInfo {
            key_length: 26,
            product: 0x12,
            public_value: 0x0A0B0C0D,
            hash: [7; PROOF_SIZE],
        };

        let packet = info.write(PacketWriter::new(0xFF, 0x51)).finish().unwrap();
        let payload = &packet[4..];
        assert_eq!(payload.len(), CdKeyInfo::SIZE);
        assert_eq!(&payload[0..4], &[26, 0, 0, 0]);
        assert_eq!(&payload[12..16], &[0, 0, 0, 0]);

        let parsed = CdKeyInfo::read(&mut ByteReader::new(payload)).unwrap();
        assert_eq!(parsed, info);
    }
}
