use std::{
    future::Future,
    io::ErrorKind,
    ops::Deref,
    path::{Path, PathBuf},
};

use anyhow::Result;
use chrono::NaiveDate;
use futures::{stream, StreamExt, TryStreamExt};
use tokio::{
    fs::File,
    io::{AsyncBufReadExt, AsyncReadExt, AsyncSeekExt, AsyncWriteExt, BufReader},
};
use tracing::{debug, warn};

use crate::{
    fs::operations::{seek_line_backwards, write_atomically, FileLock},
    utils::time::{date_to_record_name, record_name_to_date},
};

use super::entities::{ActivityKind, TimeRecord};

const LOCK_FILE_NAME: &str = ".lock";

/// Interface for abstracting storage of finished time records.
pub trait RecordStorage: Send + Sync {
    /// Adds a record, or replaces the stored record with the same id.
    fn upsert(&self, record: TimeRecord) -> impl Future<Output = Result<()>> + Send;

    /// Removes every record of `category` on `date`. Returns how many were removed.
    fn delete_by_category_and_date(
        &self,
        category: ActivityKind,
        date: NaiveDate,
    ) -> impl Future<Output = Result<usize>> + Send;

    /// Records of a single day, newest first.
    fn get_data_for(
        &self,
        date: NaiveDate,
    ) -> impl Future<Output = Result<Vec<TimeRecord>>> + Send;

    /// Records from `start` to `end`, both inclusive, ordered by date.
    fn get_data_between(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> impl Future<Output = Result<Vec<TimeRecord>>> + Send;

    /// Collapses every record of `category` on `date` into a single record holding
    /// `total_seconds`. A total of 0 just removes them. Returns the inserted record.
    fn overwrite_category_total(
        &self,
        category: ActivityKind,
        date: NaiveDate,
        total_seconds: u64,
    ) -> impl Future<Output = Result<Option<TimeRecord>>> + Send;
}

impl<T> RecordStorage for T
where
    T: Deref + Send + Sync,
    T::Target: RecordStorage,
{
    fn upsert(&self, record: TimeRecord) -> impl Future<Output = Result<()>> + Send {
        self.deref().upsert(record)
    }

    fn delete_by_category_and_date(
        &self,
        category: ActivityKind,
        date: NaiveDate,
    ) -> impl Future<Output = Result<usize>> + Send {
        self.deref().delete_by_category_and_date(category, date)
    }

    fn get_data_for(
        &self,
        date: NaiveDate,
    ) -> impl Future<Output = Result<Vec<TimeRecord>>> + Send {
        self.deref().get_data_for(date)
    }

    fn get_data_between(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> impl Future<Output = Result<Vec<TimeRecord>>> + Send {
        self.deref().get_data_between(start, end)
    }

    fn overwrite_category_total(
        &self,
        category: ActivityKind,
        date: NaiveDate,
        total_seconds: u64,
    ) -> impl Future<Output = Result<Option<TimeRecord>>> + Send {
        self.deref()
            .overwrite_category_total(category, date, total_seconds)
    }
}

/// The main realization of [RecordStorage]. Every day gets its own file of JSON lines named after
/// the date. All writers go through an exclusive lock on a lock file inside the directory.
pub struct RecordStorageImpl {
    record_dir: PathBuf,
}

impl RecordStorageImpl {
    pub fn new(record_dir: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&record_dir)?;

        Ok(Self { record_dir })
    }

    fn day_path(&self, date: NaiveDate) -> PathBuf {
        self.record_dir.join(date_to_record_name(date))
    }

    fn lock_path(&self) -> PathBuf {
        self.record_dir.join(LOCK_FILE_NAME)
    }

    /// Reads a day file in insertion order. Missing files are empty days.
    async fn read_day(path: &Path) -> Result<Vec<TimeRecord>> {
        let file = match File::open(path).await {
            Ok(v) => v,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(e.into()),
        };
        debug!("Reading {path:?}");
        let mut lines = BufReader::new(file).lines();
        let mut records = vec![];
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<TimeRecord>(&line) {
                Ok(v) => records.push(v),
                Err(e) => {
                    // Might happen when a write was cut off by a shutdown
                    warn!("During parsing in path {path:?} found illegal json string {line}: {e}")
                }
            }
        }
        Ok(records)
    }

    async fn read_day_locked(&self, date: NaiveDate) -> Result<Vec<TimeRecord>> {
        let lock = FileLock::shared(&self.lock_path()).await?;
        let result = Self::read_day(&self.day_path(date)).await;
        lock.release().await?;
        result
    }

    async fn write_day(path: &Path, records: &[TimeRecord]) -> Result<()> {
        if records.is_empty() {
            return match tokio::fs::remove_file(path).await {
                Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
                _ => Ok(()),
            };
        }
        let mut buffer = Vec::<u8>::new();
        for record in records {
            serde_json::to_writer(&mut buffer, record)?;
            buffer.push(b'\n');
        }
        write_atomically(path, &buffer).await?;
        Ok(())
    }

    /// Loads a day, lets `change` edit it and stores the result as one atomic replacement.
    async fn rewrite_day<T: Send>(
        &self,
        date: NaiveDate,
        change: impl FnOnce(&mut Vec<TimeRecord>) -> T + Send,
    ) -> Result<T> {
        let lock = FileLock::exclusive(&self.lock_path()).await?;
        let path = self.day_path(date);
        let result = async {
            let mut records = Self::read_day(&path).await?;
            let value = change(&mut records);
            Self::write_day(&path, &records).await?;
            Ok::<_, anyhow::Error>(value)
        }
        .await;
        lock.release().await?;
        result
    }

    async fn append(&self, record: &TimeRecord) -> Result<()> {
        let lock = FileLock::exclusive(&self.lock_path()).await?;
        let result: Result<()> = async {
            let mut file = File::options()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(self.day_path(record.date))
                .await?;
            append_to_file(&mut file, record).await
        }
        .await;
        lock.release().await?;
        result
    }

    /// Dates that have a record file, in ascending order.
    async fn stored_dates(&self) -> Result<Vec<NaiveDate>> {
        let mut entries = tokio::fs::read_dir(&self.record_dir).await?;
        let mut dates = vec![];
        while let Some(entry) = entries.next_entry().await? {
            if let Some(date) = entry.file_name().to_str().and_then(record_name_to_date) {
                dates.push(date);
            }
        }
        dates.sort();
        Ok(dates)
    }
}

/// Appends a record as the last line. A last line that was cut off by a crash is overwritten.
async fn append_to_file(file: &mut File, record: &TimeRecord) -> Result<()> {
    let end = file.seek(std::io::SeekFrom::End(0)).await?;
    if end > 0 {
        seek_line_backwards(file, &mut vec![0; 1024]).await?;
        let line_start = file.stream_position().await?;
        let mut last_line = Vec::new();
        file.read_to_end(&mut last_line).await?;
        let last_line = String::from_utf8_lossy(&last_line);

        let intact = last_line.ends_with('\n')
            && serde_json::from_str::<TimeRecord>(last_line.trim_end()).is_ok();
        if !intact {
            warn!("Last record was corrupted, overwriting it: {last_line:?}");
            file.set_len(line_start).await?;
            file.seek(std::io::SeekFrom::Start(line_start)).await?;
        }
    }

    let mut buffer = serde_json::to_vec(record)?;
    buffer.push(b'\n');
    file.write_all(&buffer).await?;
    file.flush().await?;
    file.sync_data().await?;
    Ok(())
}

impl RecordStorage for RecordStorageImpl {
    async fn upsert(&self, record: TimeRecord) -> Result<()> {
        let existing = self.read_day_locked(record.date).await?;
        if existing.iter().any(|v| v.id == record.id) {
            debug!("Replacing record {}", record.id);
            self.rewrite_day(record.date, move |records| {
                for stored in records.iter_mut().filter(|v| v.id == record.id) {
                    *stored = record.clone();
                }
            })
            .await
        } else {
            debug!("Appending record {record:?}");
            self.append(&record).await
        }
    }

    async fn delete_by_category_and_date(
        &self,
        category: ActivityKind,
        date: NaiveDate,
    ) -> Result<usize> {
        self.rewrite_day(date, |records| {
            let before = records.len();
            records.retain(|v| v.category != category);
            before - records.len()
        })
        .await
    }

    async fn get_data_for(&self, date: NaiveDate) -> Result<Vec<TimeRecord>> {
        let mut records = self.read_day_locked(date).await?;
        records.reverse();
        Ok(records)
    }

    async fn get_data_between(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<TimeRecord>> {
        let start_name = date_to_record_name(start);
        let end_name = date_to_record_name(end);
        let dates = self
            .stored_dates()
            .await?
            .into_iter()
            .filter(|date| {
                let name = date_to_record_name(*date);
                start_name <= name && name <= end_name
            });

        let days = stream::iter(dates)
            .map(|date| self.read_day_locked(date))
            .buffered(4)
            .try_collect::<Vec<_>>()
            .await?;

        Ok(days.into_iter().flatten().collect())
    }

    async fn overwrite_category_total(
        &self,
        category: ActivityKind,
        date: NaiveDate,
        total_seconds: u64,
    ) -> Result<Option<TimeRecord>> {
        self.rewrite_day(date, move |records| {
            records.retain(|v| v.category != category);
            if total_seconds > 0 {
                let record = TimeRecord::new(date, category, total_seconds);
                records.push(record.clone());
                Some(record)
            } else {
                None
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use anyhow::Result;
    use chrono::NaiveDate;
    use tempfile::{tempdir, tempfile};
    use tokio::io::{AsyncReadExt, AsyncSeekExt};

    use super::*;

    const TEST_DATE: NaiveDate = NaiveDate::from_ymd_opt(2018, 7, 4).unwrap();

    fn storage(dir: &tempfile::TempDir) -> Result<RecordStorageImpl> {
        Ok(RecordStorageImpl::new(dir.path().join("records"))?)
    }

    #[tokio::test]
    async fn test_append_keeps_same_category_records() -> Result<()> {
        let dir = tempdir()?;
        let storage = storage(&dir)?;
        let first = TimeRecord::new(TEST_DATE, ActivityKind::Gaming, 60);
        let second = TimeRecord::new(TEST_DATE, ActivityKind::Gaming, 30);
        let other_day = TimeRecord::new(TEST_DATE.succ_opt().unwrap(), ActivityKind::Gaming, 5);

        storage.upsert(first.clone()).await?;
        storage.upsert(second.clone()).await?;
        storage.upsert(other_day).await?;

        let stored = storage.get_data_for(TEST_DATE).await?;
        assert_eq!(stored, vec![second, first]);
        Ok(())
    }

    #[tokio::test]
    async fn test_upsert_replaces_record_with_same_id() -> Result<()> {
        let dir = tempdir()?;
        let storage = storage(&dir)?;
        let mut record = TimeRecord::new(TEST_DATE, ActivityKind::Music, 60);
        let other = TimeRecord::new(TEST_DATE, ActivityKind::Art, 10);
        storage.upsert(record.clone()).await?;
        storage.upsert(other.clone()).await?;

        record.duration_seconds = 120;
        storage.upsert(record.clone()).await?;

        let stored = storage.get_data_for(TEST_DATE).await?;
        assert_eq!(stored, vec![other, record]);
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_by_category_and_date() -> Result<()> {
        let dir = tempdir()?;
        let storage = storage(&dir)?;
        let next_day = TEST_DATE.succ_opt().unwrap();
        storage
            .upsert(TimeRecord::new(TEST_DATE, ActivityKind::Gaming, 60))
            .await?;
        storage
            .upsert(TimeRecord::new(TEST_DATE, ActivityKind::Gaming, 60))
            .await?;
        let kept = TimeRecord::new(TEST_DATE, ActivityKind::Movie, 60);
        storage.upsert(kept.clone()).await?;
        let kept_next_day = TimeRecord::new(next_day, ActivityKind::Gaming, 60);
        storage.upsert(kept_next_day.clone()).await?;

        let removed = storage
            .delete_by_category_and_date(ActivityKind::Gaming, TEST_DATE)
            .await?;

        assert_eq!(removed, 2);
        assert_eq!(storage.get_data_for(TEST_DATE).await?, vec![kept]);
        assert_eq!(storage.get_data_for(next_day).await?, vec![kept_next_day]);
        Ok(())
    }

    #[tokio::test]
    async fn test_overwrite_collapses_entries() -> Result<()> {
        let dir = tempdir()?;
        let storage = storage(&dir)?;
        for seconds in [10, 20, 30] {
            storage
                .upsert(TimeRecord::new(TEST_DATE, ActivityKind::Reading, seconds))
                .await?;
        }

        let inserted = storage
            .overwrite_category_total(ActivityKind::Reading, TEST_DATE, 900)
            .await?
            .expect("A positive total should insert a record");

        let stored = storage.get_data_for(TEST_DATE).await?;
        assert_eq!(stored, vec![inserted]);
        assert_eq!(stored[0].duration_seconds, 900);
        Ok(())
    }

    #[tokio::test]
    async fn test_overwrite_with_zero_only_deletes() -> Result<()> {
        let dir = tempdir()?;
        let storage = storage(&dir)?;
        storage
            .upsert(TimeRecord::new(TEST_DATE, ActivityKind::Reading, 10))
            .await?;
        let other = TimeRecord::new(TEST_DATE, ActivityKind::Coffee, 10);
        storage.upsert(other.clone()).await?;

        let inserted = storage
            .overwrite_category_total(ActivityKind::Reading, TEST_DATE, 0)
            .await?;

        assert_eq!(inserted, None);
        assert_eq!(storage.get_data_for(TEST_DATE).await?, vec![other]);
        Ok(())
    }

    #[tokio::test]
    async fn test_range_is_inclusive() -> Result<()> {
        let dir = tempdir()?;
        let storage = storage(&dir)?;
        let days = [
            NaiveDate::from_ymd_opt(2025, 2, 28).unwrap(),
            NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 3, 15).unwrap(),
            NaiveDate::from_ymd_opt(2025, 3, 31).unwrap(),
            NaiveDate::from_ymd_opt(2025, 4, 1).unwrap(),
        ];
        for day in days.iter().rev() {
            storage
                .upsert(TimeRecord::new(*day, ActivityKind::Hobby, 1))
                .await?;
        }

        let stored = storage
            .get_data_between(days[1], days[3])
            .await?
            .into_iter()
            .map(|v| v.date)
            .collect::<Vec<_>>();

        assert_eq!(stored, vec![days[1], days[2], days[3]]);
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_day_is_empty() -> Result<()> {
        let dir = tempdir()?;
        let storage = storage(&dir)?;
        assert!(storage.get_data_for(TEST_DATE).await?.is_empty());
        assert!(storage
            .get_data_between(TEST_DATE, TEST_DATE)
            .await?
            .is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_append_overwrites_torn_line() -> Result<()> {
        let intact = TimeRecord::new(TEST_DATE, ActivityKind::Gaming, 60);
        let mut previous = serde_json::to_string(&intact)?;
        previous += "\n{\"id\":\"9b2";

        let mut file = tempfile()?;
        file.write_all(previous.as_bytes())?;
        let mut file = tokio::fs::File::from_std(file);

        let appended = TimeRecord::new(TEST_DATE, ActivityKind::Music, 30);
        append_to_file(&mut file, &appended).await?;

        file.rewind().await?;
        let mut content = String::new();
        file.read_to_string(&mut content).await?;
        let lines = content
            .lines()
            .map(|line| serde_json::from_str::<TimeRecord>(line))
            .collect::<Result<Vec<_>, _>>()?;
        assert_eq!(lines, vec![intact, appended]);
        Ok(())
    }

    #[tokio::test]
    async fn test_corrupted_lines_are_skipped_on_read() -> Result<()> {
        let dir = tempdir()?;
        let storage = storage(&dir)?;
        let record = TimeRecord::new(TEST_DATE, ActivityKind::Art, 42);
        let content = format!("not json\n{}\n", serde_json::to_string(&record)?);
        tokio::fs::write(storage.day_path(TEST_DATE), content).await?;

        assert_eq!(storage.get_data_for(TEST_DATE).await?, vec![record]);
        Ok(())
    }
}
