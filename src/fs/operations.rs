use std::{ffi::OsString, path::Path, path::PathBuf};

use fs4::tokio::AsyncFileExt;
use tokio::{
    fs::File,
    io::{self, AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt, AsyncWriteExt},
};

/// Moves backwards in a file to beginning of the line the cursor is on. When the cursor sits right
/// after a line break, the line before it is used. Useful for rereading or overwriting the last
/// line of a file.
pub async fn seek_line_backwards(
    file: &mut (impl AsyncSeek + AsyncRead + Unpin),
    buffer: &mut [u8],
) -> Result<(), io::Error> {
    // For example: previous_line\nwe_want_to_get_here\n|
    // The break right before the cursor belongs to the line we are looking for.
    let mut need_to_skip = 1usize;
    loop {
        let leftover = file.stream_position().await?;
        if leftover == 0 {
            return Ok(());
        }
        let next_chunk = u64::min(leftover, buffer.len() as u64) as usize;
        file.seek(std::io::SeekFrom::Current(-(next_chunk as i64)))
            .await?;

        file.read_exact(&mut buffer[..next_chunk]).await?;
        let found = buffer[..next_chunk]
            .iter()
            .rev()
            .enumerate()
            .skip(need_to_skip)
            .find(|(_, value)| **value == b'\n');
        if let Some((index, _)) = found {
            file.seek(std::io::SeekFrom::Current(-(index as i64)))
                .await?;
            return Ok(());
        }

        need_to_skip = need_to_skip.saturating_sub(next_chunk);
        file.seek(std::io::SeekFrom::Current(-(next_chunk as i64)))
            .await?;
    }
}

fn sibling_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// Replaces the content of `path` so that readers either see the old or the new content, never a
/// mix. The data is written into a sibling file that is then renamed over the target.
pub async fn write_atomically(path: &Path, data: &[u8]) -> Result<(), io::Error> {
    let temporary = sibling_with_suffix(path, ".tmp");
    let mut file = File::create(&temporary).await?;
    file.write_all(data).await?;
    file.sync_all().await?;
    drop(file);
    tokio::fs::rename(&temporary, path).await
}

/// Advisory lock held on a dedicated lock file. Data files are replaced through renames, so they
/// can't carry the lock themselves.
pub struct FileLock {
    file: File,
}

impl FileLock {
    async fn open(path: &Path) -> Result<File, io::Error> {
        File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .await
    }

    pub async fn exclusive(path: &Path) -> Result<Self, io::Error> {
        let file = Self::open(path).await?;
        file.lock_exclusive()?;
        Ok(Self { file })
    }

    pub async fn shared(path: &Path) -> Result<Self, io::Error> {
        let file = Self::open(path).await?;
        file.lock_shared()?;
        Ok(Self { file })
    }

    pub async fn release(self) -> Result<(), io::Error> {
        self.file.unlock_async().await
    }
}
