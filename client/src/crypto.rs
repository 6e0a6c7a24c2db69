//! Crypto provider selection
//!
//! CD-key decoding, the version check and NLS live in an external library.
//! Builds without one link [`UnavailableCrypto`], which fails the handshake
//! at the first step that needs a real primitive.

use protocol::crypto::{
    CdKeyInfo, CryptoError, CryptoProvider, ExeInfo, NLS_KEY_SIZE, NlsHandle, NlsKeyPair,
    PROOF_SIZE,
};

#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableCrypto;

impl UnavailableCrypto {
    fn unavailable(what: &str) -> CryptoError {
        CryptoError::Unavailable(format!("no crypto library linked for {}", what))
    }
}

impl CryptoProvider for UnavailableCrypto {
    fn cd_key_info(
        &self,
        _key: &str,
        _client_token: u32,
        _server_token: u32,
    ) -> Result<CdKeyInfo, CryptoError> {
        Err(Self::unavailable("CD key hashing"))
    }

    fn exe_info(&self, _formula: &str, _archive: &str) -> Result<ExeInfo, CryptoError> {
        Err(Self::unavailable("the version check"))
    }

    fn nls_create_keypair(
        &self,
        _username: &str,
        _password: &str,
    ) -> Result<NlsKeyPair, CryptoError> {
        Err(Self::unavailable("NLS logon"))
    }

    fn nls_proof(
        &self,
        _handle: NlsHandle,
        _server_key: &[u8; NLS_KEY_SIZE],
        _salt: &[u8; NLS_KEY_SIZE],
    ) -> Result<[u8; PROOF_SIZE], CryptoError> {
        Err(Self::unavailable("NLS logon"))
    }

    fn hash_password_single(&self, _password: &str) -> Result<[u8; PROOF_SIZE], CryptoError> {
        Err(Self::unavailable("password hashing"))
    }
}
