//! Host wire protocol codec
//!
//! Messages are framed with an HTTP-style header followed by a JSON body:
//! ```text
//! Content-Length: <byte-length>\r\n
//! \r\n
//! <JSON body>
//! ```

use std::io;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::common::Error;

/// Upper bound on a single message body
const MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;

fn map_read_error(e: io::Error) -> Error {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        Error::HostCrashed
    } else {
        Error::Io(e)
    }
}

/// Read one framed message from the host
pub async fn read_message<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<String, Error> {
    let mut content_length: Option<usize> = None;

    loop {
        let mut line = String::new();
        let bytes_read = reader.read_line(&mut line).await.map_err(map_read_error)?;

        if bytes_read == 0 {
            return Err(Error::HostCrashed);
        }

        // Empty line ends the header block
        if line == "\r\n" || line == "\n" {
            break;
        }

        let line = line.trim();
        if let Some(value) = line.strip_prefix("Content-Length:") {
            content_length = Some(value.trim().parse().map_err(|_| {
                Error::HostProtocol(format!("Invalid Content-Length: {}", value.trim()))
            })?);
        }
    }

    let len = content_length
        .ok_or_else(|| Error::HostProtocol("Missing Content-Length header".to_string()))?;

    if len > MAX_MESSAGE_SIZE {
        return Err(Error::HostProtocol(format!(
            "Content-Length too large: {} bytes",
            len
        )));
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await.map_err(map_read_error)?;

    String::from_utf8(body).map_err(|e| Error::HostProtocol(format!("Invalid UTF-8: {}", e)))
}

/// Write one framed message to the host
pub async fn write_message<W: AsyncWrite + Unpin>(writer: &mut W, json: &str) -> Result<(), Error> {
    let header = format!("Content-Length: {}\r\n\r\n", json.len());

    writer.write_all(header.as_bytes()).await?;
    writer.write_all(json.as_bytes()).await?;
    writer.flush().await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tokio::io::BufReader;

    #[tokio::test]
    async fn test_read_two_messages_back_to_back() {
        let data = b"Content-Length: 17\r\n\r\n{\"event\":\"ready\"}Content-Length: 2\r\n\r\n{}";
        let mut reader = BufReader::new(Cursor::new(data.to_vec()));

        assert_eq!(read_message(&mut reader).await.unwrap(), "{\"event\":\"ready\"}");
        assert_eq!(read_message(&mut reader).await.unwrap(), "{}");
    }

    #[tokio::test]
    async fn test_extra_headers_are_ignored() {
        let data = b"Content-Type: application/json\r\nContent-Length: 2\r\n\r\n{}";
        let mut reader = BufReader::new(Cursor::new(data.to_vec()));

        assert_eq!(read_message(&mut reader).await.unwrap(), "{}");
    }

    #[tokio::test]
    async fn test_eof_is_host_crash() {
        let mut reader = BufReader::new(Cursor::new(Vec::new()));
        assert!(matches!(
            read_message(&mut reader).await,
            Err(Error::HostCrashed)
        ));

        let mut truncated = BufReader::new(Cursor::new(b"Content-Length: 10\r\n\r\n{}".to_vec()));
        assert!(matches!(
            read_message(&mut truncated).await,
            Err(Error::HostCrashed)
        ));
    }

    #[tokio::test]
    async fn test_bad_length_is_protocol_error() {
        let mut reader = BufReader::new(Cursor::new(b"Content-Length: ten\r\n\r\n".to_vec()));
        assert!(matches!(
            read_message(&mut reader).await,
            Err(Error::HostProtocol(_))
        ));
    }

    #[tokio::test]
    async fn test_write_message_frames_body() {
        let mut output = Vec::new();
        write_message(&mut output, "{\"seq\":1}").await.unwrap();

        assert_eq!(
            String::from_utf8(output).unwrap(),
            "Content-Length: 9\r\n\r\n{\"seq\":1}"
        );
    }
}
