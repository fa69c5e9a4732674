//! Rendezvous wire format.
//!
//! One UTF-8 line per direction, newline terminated, carrying an [`Identity`].
//! The candidate speaks first, the master answers, then both sides close.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::{ElectionError, Identity};

/// Longest identity line accepted from a peer, newline excluded.
pub const MAX_LINE: usize = 256;

/// Send one identity line.
pub async fn write_identity<W>(writer: &mut W, identity: &Identity) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(format!("{identity}\n").as_bytes()).await?;
    writer.flush().await
}

/// Read one identity line.
pub async fn read_identity<R>(reader: &mut R) -> Result<Identity, ElectionError>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    let mut limited = (&mut *reader).take(MAX_LINE as u64 + 1);
    let read = limited
        .read_line(&mut line)
        .await
        .map_err(ElectionError::Io)?;

    if read == 0 {
        return Err(ElectionError::NoReply);
    }
    let trimmed = line.trim_end_matches(['\r', '\n']);
    if trimmed.len() > MAX_LINE {
        return Err(ElectionError::Oversized);
    }
    Ok(trimmed.parse()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader;

    #[tokio::test]
    async fn reads_written_line() {
        let mut buf = Vec::new();
        write_identity(&mut buf, &Identity::new("monarch", 77)).await.unwrap();
        assert_eq!(buf, b"monarch:77\n");

        let mut reader = BufReader::new(&buf[..]);
        assert_eq!(read_identity(&mut reader).await.unwrap(), Identity::new("monarch", 77));
    }

    #[tokio::test]
    async fn accepts_missing_newline_at_eof() {
        let mut reader = BufReader::new(&b"monarch:5"[..]);
        assert_eq!(read_identity(&mut reader).await.unwrap().pid(), 5);
    }

    #[tokio::test]
    async fn empty_stream_is_no_reply() {
        let mut reader = BufReader::new(&b""[..]);
        assert!(matches!(read_identity(&mut reader).await, Err(ElectionError::NoReply)));
    }

    #[tokio::test]
    async fn oversized_line_is_rejected() {
        let long = vec![b'a'; MAX_LINE + 40];
        let mut reader = BufReader::new(&long[..]);
        assert!(matches!(read_identity(&mut reader).await, Err(ElectionError::Oversized)));
    }

    #[tokio::test]
    async fn garbage_is_malformed() {
        let mut reader = BufReader::new(&b"SSH-2.0-OpenSSH_9.6\r\n"[..]);
        assert!(matches!(read_identity(&mut reader).await, Err(ElectionError::Malformed(_))));
    }
}
