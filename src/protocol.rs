//! Native messaging framing: a 4-byte native-endian length followed by a UTF-8 JSON body.
use std::io::{self, Read, Write};

use byteorder::{ByteOrder, NativeEndian, ReadBytesExt, WriteBytesExt};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Chrome refuses host messages above 1 MiB; the inbound side allows up to 64 MiB.
pub const MAX_MESSAGE_BYTES: u32 = 64 * 1024 * 1024;

pub fn read_message<R: Read, T: DeserializeOwned>(mut reader: R) -> io::Result<T> {
    let len = reader.read_u32::<NativeEndian>()?;
    check_len(len)?;

    let mut body = vec![0u8; len as usize];
    reader.read_exact(&mut body)?;

    serde_json::from_slice(&body).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

pub fn write_message<W: Write, T: Serialize>(mut writer: W, msg: &T) -> io::Result<()> {
    let body = serde_json::to_vec(msg)?;
    writer.write_u32::<NativeEndian>(frame_len(&body)?)?;
    writer.write_all(&body)?;
    writer.flush()
}

pub async fn read_message_async<R, T>(reader: &mut R) -> io::Result<T>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let len = NativeEndian::read_u32(&len_buf);
    check_len(len)?;

    let mut body = vec![0u8; len as usize];
    reader.read_exact(&mut body).await?;

    serde_json::from_slice(&body).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

pub async fn write_message_async<W, T>(writer: &mut W, msg: &T) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let body = serde_json::to_vec(msg)?;
    let mut header = [0u8; 4];
    NativeEndian::write_u32(&mut header, frame_len(&body)?);

    writer.write_all(&header).await?;
    writer.write_all(&body).await?;
    writer.flush().await
}

fn frame_len(body: &[u8]) -> io::Result<u32> {
    u32::try_from(body.len())
        .ok()
        .filter(|len| *len <= MAX_MESSAGE_BYTES)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "message too large"))
}

/// An oversized header is `InvalidInput`: the body was never read, so the stream is out of
/// step and readers must not try the next frame.
fn check_len(len: u32) -> io::Result<()> {
    if len > MAX_MESSAGE_BYTES {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("frame length {len} exceeds limit"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};
    use std::io::Cursor;

    #[test]
    fn test_frame_header_is_native_endian_length() {
        let mut buf = Vec::new();
        write_message(&mut buf, &json!({"type": "GET_SCAN_HISTORY"})).unwrap();

        let body_len = buf.len() - 4;
        assert_eq!(NativeEndian::read_u32(&buf[..4]) as usize, body_len);
        assert_eq!(&buf[4..], br#"{"type":"GET_SCAN_HISTORY"}"#);
    }

    #[test]
    fn test_read_message_rejects_bad_json() {
        let mut buf = Vec::new();
        WriteBytesExt::write_u32::<NativeEndian>(&mut buf, 3).unwrap();
        buf.extend_from_slice(b"{{{");

        let err = read_message::<_, Value>(Cursor::new(buf)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_read_message_rejects_oversized_frame() {
        let mut buf = Vec::new();
        WriteBytesExt::write_u32::<NativeEndian>(&mut buf, MAX_MESSAGE_BYTES + 1).unwrap();

        let err = read_message::<_, Value>(Cursor::new(buf)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_truncated_body_is_eof() {
        let mut buf = Vec::new();
        WriteBytesExt::write_u32::<NativeEndian>(&mut buf, 10).unwrap();
        buf.extend_from_slice(b"{}");

        let err = read_message::<_, Value>(Cursor::new(buf)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[tokio::test]
    async fn test_async_frames_interoperate_with_sync_reader() {
        let (mut client, mut server) = tokio::io::duplex(256);
        write_message_async(&mut client, &json!({"action": "ping"}))
            .await
            .unwrap();
        drop(client);

        let mut received = Vec::new();
        server.read_to_end(&mut received).await.unwrap();
        let msg: Value = read_message(Cursor::new(received)).unwrap();
        assert_eq!(msg["action"], "ping");
    }
}
