//! Binary container layout and MAC-feeding I/O primitives.
//!
//! A secrets file has this layout:
//!
//! ```text
//! Header:  magic[9] salt[56] iv[32]
//! Body:    entity_count: u64 LE
//!          entity_count x ( tag: u8  cipher_len: u64 LE  ciphertext[cipher_len] )
//! Trailer: mac_len: u64 LE  mac[mac_len]
//! ```
//!
//! The HMAC covers every byte from the start of the header to the end
//! of the body.  `MacReader` and `MacWriter` feed the running MAC as a
//! side effect of every read or write, so there is no way to move bytes
//! through them without the MAC seeing it.

use std::io::{Read, Write};

use crate::crypto::encryption::fill_random;
use crate::crypto::FileMac;
use crate::errors::{SecretsError, Result};

use super::entity::RawEntity;

/// Magic bytes at the start of every secrets file (format version 1).
pub const MAGIC: &[u8; MAGIC_LEN] = b"SEALBOX01";

pub const MAGIC_LEN: usize = 9;

/// Per-file KDF salt length.
pub const SALT_LEN: usize = 56;

/// Per-file IV length; bound into every record as associated data.
pub const IV_LEN: usize = 32;

/// Total header size.
pub const HEADER_LEN: usize = MAGIC_LEN + SALT_LEN + IV_LEN;

/// Smallest possible record: tag + length.
const RECORD_FRAME_LEN: u64 = 1 + 8;

/// Fixed per-file values written once at creation.
#[derive(Clone, PartialEq, Eq)]
pub struct Header {
    pub salt: [u8; SALT_LEN],
    pub iv: [u8; IV_LEN],
}

impl Header {
    /// A header with a fresh random salt and IV.
    pub fn generate() -> Result<Self> {
        let mut header = Self {
            salt: [0u8; SALT_LEN],
            iv: [0u8; IV_LEN],
        };
        fill_random(&mut header.salt)?;
        fill_random(&mut header.iv)?;
        Ok(header)
    }

    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[..MAGIC_LEN].copy_from_slice(MAGIC);
        out[MAGIC_LEN..MAGIC_LEN + SALT_LEN].copy_from_slice(&self.salt);
        out[MAGIC_LEN + SALT_LEN..].copy_from_slice(&self.iv);
        out
    }

    /// Parse a header, rejecting anything without our magic.
    pub fn parse(bytes: &[u8; HEADER_LEN]) -> Result<Self> {
        if &bytes[..MAGIC_LEN] != MAGIC {
            return Err(SecretsError::UnknownHeader);
        }
        let mut header = Self {
            salt: [0u8; SALT_LEN],
            iv: [0u8; IV_LEN],
        };
        header
            .salt
            .copy_from_slice(&bytes[MAGIC_LEN..MAGIC_LEN + SALT_LEN]);
        header.iv.copy_from_slice(&bytes[MAGIC_LEN + SALT_LEN..]);
        Ok(header)
    }
}

impl std::fmt::Debug for Header {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Header")
            .field("salt_len", &SALT_LEN)
            .field("iv_len", &IV_LEN)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

/// Bounded reader that feeds the MAC with everything it returns.
///
/// `remaining` is the number of bytes left in the file; no read or
/// allocation may exceed it.
pub struct MacReader<'m, R: Read> {
    inner: R,
    mac: &'m mut FileMac,
    remaining: u64,
}

impl<'m, R: Read> MacReader<'m, R> {
    pub fn new(inner: R, mac: &'m mut FileMac, len: u64) -> Self {
        Self {
            inner,
            mac,
            remaining: len,
        }
    }

    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        if buf.len() as u64 > self.remaining {
            return Err(SecretsError::PrematureEndOfFile);
        }
        self.inner.read_exact(buf).map_err(|e| match e.kind() {
            std::io::ErrorKind::UnexpectedEof => SecretsError::PrematureEndOfFile,
            _ => SecretsError::system("reading store file", e),
        })?;
        self.remaining -= buf.len() as u64;
        self.mac.update(buf);
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        let mut buf = [0u8; 8];
        self.read_exact(&mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }

    /// Read `len` bytes, refusing lengths larger than what is left.
    pub fn read_vec(&mut self, len: u64) -> Result<Vec<u8>> {
        if len > self.remaining {
            return Err(SecretsError::PrematureEndOfFile);
        }
        let len = usize::try_from(len).map_err(|_| SecretsError::PrematureEndOfFile)?;
        let mut out = vec![0u8; len];
        self.read_exact(&mut out)?;
        Ok(out)
    }

    pub fn read_header(&mut self) -> Result<Header> {
        let mut bytes = [0u8; HEADER_LEN];
        self.read_exact(&mut bytes)
            .map_err(|_| SecretsError::CannotReadHeader)?;
        Header::parse(&bytes)
    }

    /// Read the entity count and all framed records.
    pub fn read_records(&mut self) -> Result<Vec<RawEntity>> {
        let count = self.read_u64()?;
        if count.saturating_mul(RECORD_FRAME_LEN) > self.remaining {
            return Err(SecretsError::PrematureEndOfFile);
        }

        let mut records = Vec::new();
        for _ in 0..count {
            let tag = self.read_u8()?;
            let len = self.read_u64()?;
            let ciphertext = self.read_vec(len)?;
            records.push(RawEntity { tag, ciphertext });
        }
        Ok(records)
    }

    /// Stop the MAC and read the trailer.
    pub fn read_trailer(&mut self) -> Result<Vec<u8>> {
        self.mac.stop();
        let len = self.read_u64()?;
        self.read_vec(len)
    }
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

/// Writer that feeds the MAC with everything it writes.
pub struct MacWriter<'m, W: Write> {
    inner: W,
    mac: &'m mut FileMac,
}

impl<'m, W: Write> MacWriter<'m, W> {
    pub fn new(inner: W, mac: &'m mut FileMac) -> Self {
        Self { inner, mac }
    }

    pub fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        self.inner
            .write_all(bytes)
            .map_err(|e| SecretsError::system("writing store file", e))?;
        self.mac.update(bytes);
        Ok(())
    }

    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.write_all(&[value])
    }

    pub fn write_u64(&mut self, value: u64) -> Result<()> {
        self.write_all(&value.to_le_bytes())
    }

    pub fn write_header(&mut self, header: &Header) -> Result<()> {
        self.write_all(&header.to_bytes())
    }

    pub fn write_records(&mut self, records: &[RawEntity]) -> Result<()> {
        self.write_u64(records.len() as u64)?;
        for record in records {
            self.write_u8(record.tag)?;
            self.write_u64(record.ciphertext.len() as u64)?;
            self.write_all(&record.ciphertext)?;
        }
        Ok(())
    }

    /// Stop the MAC and append its digest as the trailer.
    pub fn write_trailer(&mut self) -> Result<()> {
        let digest = self.mac.read()?;
        self.write_u64(digest.len() as u64)?;
        self.write_all(&digest)
    }

    /// Flush and hand back the underlying writer.
    pub fn finish(mut self) -> Result<W> {
        self.inner
            .flush()
            .map_err(|e| SecretsError::system("flushing store file", e))?;
        Ok(self.inner)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::crypto::{DerivedKeys, KeyNames, MemoryKeyCache};
    use crate::crypto::CryptoEngine;

    fn engine() -> CryptoEngine {
        let engine = CryptoEngine::new(Arc::new(MemoryKeyCache::new()), KeyNames::default());
        engine
            .store_keys(&DerivedKeys::from_bytes([6u8; 32], [7u8; 32]))
            .unwrap();
        engine
    }

    fn write_sample(engine: &CryptoEngine, records: &[RawEntity]) -> (Header, Vec<u8>) {
        let header = Header::generate().unwrap();
        let mut mac = engine.mac();
        mac.reset().unwrap();
        let mut writer = MacWriter::new(Vec::new(), &mut mac);
        writer.write_header(&header).unwrap();
        writer.write_records(records).unwrap();
        writer.write_trailer().unwrap();
        (header, writer.finish().unwrap())
    }

    #[test]
    fn header_is_fixed_size_and_starts_with_magic() {
        let header = Header::generate().unwrap();
        let bytes = header.to_bytes();
        assert_eq!(bytes.len(), 97);
        assert_eq!(&bytes[..9], b"SEALBOX01");
        assert_eq!(Header::parse(&bytes).unwrap(), header);
    }

    #[test]
    fn generated_headers_are_random() {
        let a = Header::generate().unwrap();
        let b = Header::generate().unwrap();
        assert_ne!(a.salt, b.salt);
        assert_ne!(a.iv, b.iv);
    }

    #[test]
    fn wrong_magic_is_unknown_header() {
        let mut bytes = Header::generate().unwrap().to_bytes();
        bytes[0] = b'X';
        assert!(matches!(
            Header::parse(&bytes),
            Err(SecretsError::UnknownHeader)
        ));
    }

    #[test]
    fn reader_mac_matches_writer_mac() {
        let engine = engine();
        let records = vec![RawEntity {
            tag: 1,
            ciphertext: vec![0xAA; 40],
        }];
        let (header, bytes) = write_sample(&engine, &records);

        let mut mac = engine.mac();
        mac.reset().unwrap();
        let mut reader = MacReader::new(bytes.as_slice(), &mut mac, bytes.len() as u64);
        assert_eq!(reader.read_header().unwrap(), header);
        assert_eq!(reader.read_records().unwrap(), records);
        let trailer = reader.read_trailer().unwrap();
        assert_eq!(reader.remaining(), 0);
        assert!(mac.verify(&trailer));
    }

    #[test]
    fn oversized_record_length_is_premature_end() {
        let engine = engine();
        let (_, mut bytes) = write_sample(
            &engine,
            &[RawEntity {
                tag: 0,
                ciphertext: vec![1; 8],
            }],
        );
        // Top byte of the first record's length.
        bytes[HEADER_LEN + 8 + 1 + 7] = 0x7F;

        let mut mac = engine.mac();
        mac.reset().unwrap();
        let mut reader = MacReader::new(bytes.as_slice(), &mut mac, bytes.len() as u64);
        reader.read_header().unwrap();
        assert!(matches!(
            reader.read_records(),
            Err(SecretsError::PrematureEndOfFile)
        ));
    }

    #[test]
    fn truncated_header_cannot_be_read() {
        let engine = engine();
        let mut mac = engine.mac();
        mac.reset().unwrap();
        let short = [0u8; 20];
        let mut reader = MacReader::new(&short[..], &mut mac, short.len() as u64);
        assert!(matches!(
            reader.read_header(),
            Err(SecretsError::CannotReadHeader)
        ));
    }
}
