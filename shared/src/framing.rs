//! Length-prefixed bincode framing used on every TCP channel
//!
//! A frame is a big-endian `u32` length followed by that many bytes of bincode.

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::errors::{SharedError, SharedResult};

/// Upper bound on a single frame
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

pub async fn write_frame<W, T>(writer: &mut W, message: &T) -> SharedResult<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let data = bincode::serialize(message).map_err(|e| SharedError::SerializationError {
        message: e.to_string(),
    })?;
    if data.len() > MAX_FRAME_LEN {
        return Err(SharedError::protocol(format!("frame of {} bytes exceeds limit", data.len())));
    }

    let len = data.len() as u32;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(&data).await?;
    writer.flush().await?;
    Ok(())
}

pub async fn read_frame<R, T>(reader: &mut R) -> SharedResult<T>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut len_bytes = [0u8; 4];
    reader.read_exact(&mut len_bytes).await?;
    let len = u32::from_be_bytes(len_bytes) as usize;

    if len > MAX_FRAME_LEN {
        return Err(SharedError::protocol(format!("frame of {len} bytes exceeds limit")));
    }

    let mut data = vec![0u8; len];
    reader.read_exact(&mut data).await?;

    bincode::deserialize(&data).map_err(|e| SharedError::DeserializationError {
        message: e.to_string(),
    })
}
