//! Stat string transform
//!
//! The lobby metadata inside GAMEINFO travels as a NUL-terminated string, so
//! it must not contain a zero byte. Even bytes are incremented, odd bytes are
//! kept, and every group of up to 7 bytes is prefixed by a mask byte whose
//! bit `n + 1` is set when the n-th byte of the group was kept as is. Bit 0 of
//! the mask is always set, which keeps the mask itself non-zero.

/// Encode arbitrary bytes into a zero-free stat string
pub fn encode(data: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(data.len() + data.len() / 7 + 1);
    let mut mask: u8 = 1;

    for (i, &byte) in data.iter().enumerate() {
        if byte % 2 == 0 {
            result.push(byte + 1);
        } else {
            result.push(byte);
            mask |= 1 << ((i % 7) + 1);
        }

        if i % 7 == 6 || i == data.len() - 1 {
            let group = (i % 7) + 1;
            result.insert(result.len() - group, mask);
            mask = 1;
        }
    }

    result
}

/// Invert [`encode`]
pub fn decode(data: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(data.len());
    let mut mask: u8 = 0;

    for (i, &byte) in data.iter().enumerate() {
        if i % 8 == 0 {
            mask = byte;
        } else if mask & (1 << (i % 8)) == 0 {
            result.push(byte.wrapping_sub(1));
        } else {
            result.push(byte);
        }
    }

    result
}
