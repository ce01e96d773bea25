use std::io::{self, SeekFrom};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt};

/// Positions the cursor at the beginning of the last line and returns that
/// offset. Lines are expected to be newline-terminated, including the final
/// one. Scans backwards in fixed-size chunks so large files are never read
/// whole.
pub async fn seek_to_last_line<F>(file: &mut F) -> Result<u64, io::Error>
where
    F: AsyncSeek + AsyncRead + Unpin,
{
    let len = file.seek(SeekFrom::End(0)).await?;
    if len == 0 {
        return Ok(0);
    }

    let mut buf = [0u8; 1024];
    // The file's final byte is the last line's own terminator, skip it.
    let mut end = len - 1;
    while end > 0 {
        let chunk = u64::min(end, buf.len() as u64);
        let from = end - chunk;
        file.seek(SeekFrom::Start(from)).await?;
        file.read_exact(&mut buf[..chunk as usize]).await?;

        if let Some(offset) = buf[..chunk as usize].iter().rposition(|b| *b == b'\n') {
            let start = from + offset as u64 + 1;
            file.seek(SeekFrom::Start(start)).await?;
            return Ok(start);
        }
        end = from;
    }

    file.seek(SeekFrom::Start(0)).await?;
    Ok(0)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use anyhow::Result;
    use tempfile::tempfile;
    use tokio::io::{AsyncReadExt, AsyncSeekExt};

    use super::seek_to_last_line;

    async fn prepared(content: &str) -> Result<tokio::fs::File> {
        let mut file = tempfile()?;
        file.write_all(content.as_bytes())?;
        Ok(tokio::fs::File::from_std(file))
    }

    #[tokio::test]
    async fn finds_start_of_last_line() -> Result<()> {
        let mut file = prepared("first line\nsecond line\nthird\n").await?;

        let pos = seek_to_last_line(&mut file).await?;

        assert_eq!(pos, "first line\nsecond line\n".len() as u64);
        let mut rest = String::new();
        file.read_to_string(&mut rest).await?;
        assert_eq!(rest, "third\n");
        Ok(())
    }

    #[tokio::test]
    async fn single_line_rewinds_to_zero() -> Result<()> {
        let mut file = prepared("only one line\n").await?;

        assert_eq!(seek_to_last_line(&mut file).await?, 0);
        assert_eq!(file.stream_position().await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn empty_file_is_position_zero() -> Result<()> {
        let mut file = prepared("").await?;

        assert_eq!(seek_to_last_line(&mut file).await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn lines_longer_than_the_scan_chunk() -> Result<()> {
        let long = "x".repeat(5000);
        let content = format!("{long}\nshort\n");
        let mut file = prepared(&content).await?;

        assert_eq!(seek_to_last_line(&mut file).await?, long.len() as u64 + 1);

        let mut file = prepared(&format!("short\n{long}\n")).await?;
        assert_eq!(seek_to_last_line(&mut file).await?, "short\n".len() as u64);
        Ok(())
    }
}
