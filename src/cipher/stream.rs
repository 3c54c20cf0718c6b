//! Pull-based streaming encryption.
//!
//! A [`StreamCipher`] wraps any [`ByteSource`] and produces the OpenSSL
//! `Salted__` container one chunk per pull, so neither plaintext nor
//! ciphertext is ever held in full. Output is deterministic for a given
//! source, credentials and chunk size, which the two-pass upload relies on.

use std::future::Future;
use std::io;

use aes::Aes256;
use cbc::cipher::generic_array::GenericArray;
use cbc::cipher::{BlockEncryptMut, KeyIvInit};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::cipher::Credentials;
use crate::config::{BLOCK_SIZE, HEADER_LEN, SALT_MAGIC};
use crate::error::{Error, Result};
use crate::padding::{pad_final, padded_len};

type Aes256CbcEnc = cbc::Encryptor<Aes256>;

/// A plaintext source read in fixed-size pulls.
pub trait ByteSource: Send {
    /// Reads up to `max` bytes. Returns fewer only when the source is exhausted.
    fn read_chunk(&mut self, max: usize) -> impl Future<Output = io::Result<Vec<u8>>> + Send;
}

impl<R: AsyncRead + Unpin + Send> ByteSource for R {
    async fn read_chunk(&mut self, max: usize) -> io::Result<Vec<u8>> {
        let mut buffer = vec![0u8; max];
        let mut filled = 0;

        // Refill short reads so chunk boundaries never depend on the OS.
        while filled < max {
            let read = self.read(&mut buffer[filled..]).await?;
            if read == 0 {
                break;
            }
            filled += read;
        }

        buffer.truncate(filled);
        Ok(buffer)
    }
}

/// A stream of upload body chunks.
pub trait ChunkStream: Send {
    /// Produces the next chunk, or `None` once the stream has ended.
    fn next_chunk(&mut self) -> impl Future<Output = io::Result<Option<Vec<u8>>>> + Send;
}

/// Chunk sizes must be whole AES blocks so every non-final pull encrypts without padding.
pub fn validate_chunk_size(chunk_size: usize) -> Result<()> {
    if chunk_size == 0 || !chunk_size.is_multiple_of(BLOCK_SIZE) {
        return Err(Error::config(format!("chunk size must be a non-zero multiple of {BLOCK_SIZE}, got {chunk_size}")));
    }

    Ok(())
}

/// Lifecycle of one cipher session. Transitions only move forward.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CipherState {
    /// The container header has not been emitted yet.
    NotStarted,
    /// Header emitted, ciphertext chunks are being produced.
    Streaming,
    /// The padded final block has been emitted.
    Finished,
}

/// AES-256-CBC encryptor producing the `Salted__` container.
pub struct StreamCipher<R> {
    source: R,
    encryptor: Aes256CbcEnc,
    header: [u8; HEADER_LEN],
    chunk_size: usize,
    state: CipherState,
}

impl<R: ByteSource> StreamCipher<R> {
    /// Creates a session over `source`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if `chunk_size` is not a non-zero
    /// multiple of the block size.
    pub fn new(source: R, credentials: &Credentials, chunk_size: usize) -> Result<Self> {
        validate_chunk_size(chunk_size)?;

        let encryptor = Aes256CbcEnc::new_from_slices(credentials.key(), credentials.iv()).map_err(|e| Error::config(format!("invalid key material: {e}")))?;

        let mut header = [0u8; HEADER_LEN];
        header[..SALT_MAGIC.len()].copy_from_slice(SALT_MAGIC);
        header[SALT_MAGIC.len()..].copy_from_slice(credentials.salt());

        Ok(Self { source, encryptor, header, chunk_size, state: CipherState::NotStarted })
    }

    #[inline]
    pub fn state(&self) -> CipherState {
        self.state
    }

    fn encrypt_in_place(&mut self, data: &mut [u8]) {
        for block in data.chunks_exact_mut(BLOCK_SIZE) {
            self.encryptor.encrypt_block_mut(GenericArray::from_mut_slice(block));
        }
    }
}

impl<R: ByteSource> ChunkStream for StreamCipher<R> {
    async fn next_chunk(&mut self) -> io::Result<Option<Vec<u8>>> {
        match self.state {
            CipherState::Finished => Ok(None),

            CipherState::NotStarted => {
                self.state = CipherState::Streaming;
                Ok(Some(self.header.to_vec()))
            }

            CipherState::Streaming => {
                let mut chunk = self.source.read_chunk(self.chunk_size).await?;

                // chunk_size is block-aligned, so a short read is the only
                // way to see an unaligned chunk.
                if chunk.len() < self.chunk_size {
                    pad_final(&mut chunk);
                    self.state = CipherState::Finished;
                }

                self.encrypt_in_place(&mut chunk);
                Ok(Some(chunk))
            }
        }
    }
}

/// Total container size for `plaintext_len` bytes of input.
#[inline]
pub fn encrypted_len(plaintext_len: u64) -> u64 {
    HEADER_LEN as u64 + padded_len(plaintext_len)
}

/// Pass-through stream used for unencrypted uploads.
pub struct PlainStream<R> {
    source: R,
    chunk_size: usize,
    finished: bool,
}

impl<R: ByteSource> PlainStream<R> {
    pub fn new(source: R, chunk_size: usize) -> Result<Self> {
        validate_chunk_size(chunk_size)?;
        Ok(Self { source, chunk_size, finished: false })
    }
}

impl<R: ByteSource> ChunkStream for PlainStream<R> {
    async fn next_chunk(&mut self) -> io::Result<Option<Vec<u8>>> {
        if self.finished {
            return Ok(None);
        }

        let chunk = self.source.read_chunk(self.chunk_size).await?;
        if chunk.len() < self.chunk_size {
            self.finished = true;
        }

        Ok(if chunk.is_empty() { None } else { Some(chunk) })
    }
}

/// Drains a stream into memory. Test and tooling helper.
pub async fn collect<S: ChunkStream>(mut stream: S) -> io::Result<Vec<u8>> {
    let mut output = Vec::new();
    while let Some(chunk) = stream.next_chunk().await? {
        output.extend_from_slice(&chunk);
    }

    Ok(output)
}
