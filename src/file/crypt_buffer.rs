//! Block-aligned buffer that holds one entity's bytes either sealed or open.
//!
//! A buffer read from disk starts ciphertext-resident and is decrypted
//! as a whole on first access; a failed decryption fails every access.
//! Writes grow the plaintext in `BLOCK_SIZE` steps and the newly exposed
//! tail is filled with random bytes, so padding never carries stale data.
//! `seal` encrypts the whole padded plaintext and drops the open copy.

use zeroize::Zeroizing;

use crate::crypto::{encryption::fill_random, CryptoEngine, BLOCK_SIZE};
use crate::errors::{SecretsError, Result};

enum Resident {
    Cipher(Vec<u8>),
    Plain(Zeroizing<Vec<u8>>),
}

pub struct CryptBuffer<'e> {
    engine: &'e CryptoEngine,
    context: Vec<u8>,
    resident: Resident,
    written: usize,
    cursor: usize,
}

impl<'e> CryptBuffer<'e> {
    /// An empty plaintext buffer to serialize into.
    pub fn for_writing(engine: &'e CryptoEngine, context: &[u8]) -> Self {
        Self {
            engine,
            context: context.to_vec(),
            resident: Resident::Plain(Zeroizing::new(Vec::new())),
            written: 0,
            cursor: 0,
        }
    }

    /// Wrap ciphertext read from disk; nothing is decrypted yet.
    pub fn from_ciphertext(engine: &'e CryptoEngine, context: &[u8], sealed: Vec<u8>) -> Self {
        Self {
            engine,
            context: context.to_vec(),
            resident: Resident::Cipher(sealed),
            written: 0,
            cursor: 0,
        }
    }

    pub fn is_plaintext_resident(&self) -> bool {
        matches!(self.resident, Resident::Plain(_))
    }

    /// Allocated plaintext length (a multiple of the block size once written).
    pub fn capacity(&self) -> usize {
        match &self.resident {
            Resident::Plain(data) => data.len(),
            Resident::Cipher(_) => 0,
        }
    }

    /// Bytes left between the read cursor and the end of the data.
    pub fn remaining(&mut self) -> Result<usize> {
        self.open()?;
        Ok(self.written - self.cursor)
    }

    /// Decrypt on first access; `written` and `cursor` are only valid after.
    fn open(&mut self) -> Result<()> {
        if let Resident::Cipher(sealed) = &self.resident {
            let plain = self.engine.decrypt(sealed, &self.context)?;
            self.written = plain.len();
            self.cursor = 0;
            self.resident = Resident::Plain(plain);
        }
        Ok(())
    }

    pub fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.open()?;
        let written = self.written;
        let Resident::Plain(data) = &mut self.resident else {
            return Err(SecretsError::DecryptionFailed);
        };

        let needed = written + bytes.len();
        while data.len() < needed {
            let start = data.len();
            data.resize(start + BLOCK_SIZE, 0);
            fill_random(&mut data[start..])?;
        }
        data[written..needed].copy_from_slice(bytes);
        self.written = needed;
        Ok(())
    }

    pub fn read(&mut self, out: &mut [u8]) -> Result<()> {
        self.open()?;
        let (written, cursor) = (self.written, self.cursor);
        let Resident::Plain(data) = &self.resident else {
            return Err(SecretsError::DecryptionFailed);
        };

        let end = cursor + out.len();
        if end > written {
            return Err(SecretsError::PrematureEndOfFile);
        }
        out.copy_from_slice(&data[cursor..end]);
        self.cursor = end;
        Ok(())
    }

    /// Encrypt in place and return the ciphertext.
    pub fn seal(self) -> Result<Vec<u8>> {
        match self.resident {
            Resident::Plain(data) => self.engine.encrypt(&data, &self.context),
            Resident::Cipher(sealed) => Ok(sealed),
        }
    }

    // ------------------------------------------------------------------
    // Field codec used by the entity serializers
    // ------------------------------------------------------------------

    pub fn put_u8(&mut self, value: u8) -> Result<()> {
        self.write(&[value])
    }

    pub fn put_u64(&mut self, value: u64) -> Result<()> {
        self.write(&value.to_le_bytes())
    }

    pub fn put_i64(&mut self, value: i64) -> Result<()> {
        self.write(&value.to_le_bytes())
    }

    /// Length-prefixed byte string.
    pub fn put_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.put_u64(bytes.len() as u64)?;
        self.write(bytes)
    }

    pub fn put_str(&mut self, value: &str) -> Result<()> {
        self.put_bytes(value.as_bytes())
    }

    pub fn get_u8(&mut self) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.read(&mut buf)?;
        Ok(buf[0])
    }

    pub fn get_u64(&mut self) -> Result<u64> {
        let mut buf = [0u8; 8];
        self.read(&mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }

    pub fn get_i64(&mut self) -> Result<i64> {
        let mut buf = [0u8; 8];
        self.read(&mut buf)?;
        Ok(i64::from_le_bytes(buf))
    }

    pub fn get_bytes(&mut self) -> Result<Zeroizing<Vec<u8>>> {
        let len = self.get_u64()?;
        let len = usize::try_from(len).map_err(|_| SecretsError::PrematureEndOfFile)?;
        if len > self.remaining()? {
            return Err(SecretsError::PrematureEndOfFile);
        }
        let mut out = Zeroizing::new(vec![0u8; len]);
        self.read(&mut out)?;
        Ok(out)
    }

    pub fn get_str(&mut self) -> Result<String> {
        let bytes = self.get_bytes()?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| SecretsError::MalformedEntity("string field is not valid UTF-8".into()))
    }
}
