//! Self-describing payload container.
//!
//! AES-GCM ciphertext does not carry the plaintext length, so session
//! payloads are wrapped in a single-entry deflate archive (entry name
//! `data`) before sealing. Any stable self-describing container would
//! do; an archive keeps the framing cheap and the implementation
//! off-the-shelf. Both sides of every call use this module, so only
//! self-consistency matters.

use std::io::{Cursor, Read, Write};

use zip::{CompressionMethod, ZipArchive, ZipWriter, write::FileOptions};

use crate::error::CryptoError;

const ENTRY_NAME: &str = "data";

/// Wrap raw bytes in the container.
///
/// # Errors
///
/// [`CryptoError::Pack`] if the archive writer fails (out-of-memory is
/// the only realistic cause when writing to a buffer).
pub fn pack(data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let mut buf = Cursor::new(Vec::new());
    {
        let mut writer = ZipWriter::new(&mut buf);
        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

        writer
            .start_file(ENTRY_NAME, options)
            .map_err(|e| CryptoError::Pack(e.to_string()))?;
        writer.write_all(data).map_err(|e| CryptoError::Pack(e.to_string()))?;
        writer.finish().map_err(|e| CryptoError::Pack(e.to_string()))?;
    }
    Ok(buf.into_inner())
}

/// Extract the raw bytes wrapped by [`pack`].
///
/// # Errors
///
/// [`CryptoError::Unpack`] if the input is not an archive or does not
/// contain the expected entry.
pub fn unpack(packed: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let mut archive = ZipArchive::new(Cursor::new(packed))
        .map_err(|e| CryptoError::Unpack(e.to_string()))?;

    let mut entry =
        archive.by_name(ENTRY_NAME).map_err(|e| CryptoError::Unpack(e.to_string()))?;

    let mut data = Vec::with_capacity(entry.size() as usize);
    entry.read_to_end(&mut data).map_err(|e| CryptoError::Unpack(e.to_string()))?;
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_unpack_round_trip() {
        let data = b"some payload with \x00 binary \xff bytes";
        let packed = pack(data).unwrap();
        assert_eq!(unpack(&packed).unwrap(), data);
    }

    #[test]
    fn empty_payload_round_trips() {
        let packed = pack(b"").unwrap();
        assert_eq!(unpack(&packed).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn large_payload_round_trips() {
        let data = vec![0x5a; 1_000_000];
        let packed = pack(&data).unwrap();
        assert_eq!(unpack(&packed).unwrap(), data);
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(matches!(unpack(b"definitely not an archive"), Err(CryptoError::Unpack(_))));
    }

    #[test]
    fn empty_input_is_rejected() {
        assert!(matches!(unpack(b""), Err(CryptoError::Unpack(_))));
    }
}
