mod common;

use common::{times, window_candles, Candle, VecSource};
use segmented_series::{
    Config, Error, FixedWindowFinder, MemoryTable, OrderedTable, Tables, Time, TimeRange,
};
use std::sync::Arc;
use test_log::test;

fn observed_tables() -> (MemoryTable, Tables) {
    let status = MemoryTable::new();

    let tables = Tables {
        status: Arc::new(status.clone()),
        chunks: Arc::new(MemoryTable::new()),
        latest: Arc::new(MemoryTable::new()),
        previous: Arc::new(MemoryTable::new()),
        next: Arc::new(MemoryTable::new()),
    };

    (status, tables)
}

#[test]
fn empty_segment_fails_and_recovers_once_filled() -> segmented_series::Result<()> {
    let folder = tempfile::tempdir()?;
    let (status, tables) = observed_tables();

    // the window [100, 199] has no values, but availability spans it
    let mut values = window_candles(0..1);
    values.extend(window_candles(2..3));

    let source = Arc::new(VecSource::with_availability(values, 0, 299));

    let store = Config::new(folder.path(), "gappy")
        .use_tables(tables)
        .open(source.clone(), Arc::new(FixedWindowFinder::new(100)))?;

    let result = store
        .read_range_values(Time::new(120), Time::new(180))
        .collect::<segmented_series::Result<Vec<_>>>();

    assert!(matches!(result, Err(Error::InvariantViolation(_))));

    // the failed segment is left behind as initializing
    let gap_key = TimeRange::new(Time::new(100), Time::new(199)).to_key();
    let rows = status.scan("gappy", None, None)?;
    assert_eq!(1, rows.len());
    assert_eq!((gap_key.to_vec(), vec![0]), rows[0]);

    // a second query purges the leftover and fails the same way
    let result = store
        .read_range_values(Time::new(120), Time::new(180))
        .collect::<segmented_series::Result<Vec<_>>>();

    assert!(matches!(result, Err(Error::InvariantViolation(_))));

    // once the source has data for the window, the retry converges
    source.set_values(window_candles(0..3));

    let recovered: Vec<Candle> = store
        .read_range_values(Time::new(120), Time::new(180))
        .collect::<segmented_series::Result<_>>()?;

    assert_eq!(vec![150], times(&recovered));
    assert_eq!(Some(&(gap_key.to_vec(), vec![1])), status
        .scan("gappy", None, None)?
        .iter()
        .find(|(key, _)| key == &gap_key));

    Ok(())
}

#[test]
fn crashed_initialization_is_purged_and_rebuilt() -> segmented_series::Result<()> {
    let folder = tempfile::tempdir()?;
    let (status, tables) = observed_tables();

    let inserted = window_candles(0..1);
    let source = Arc::new(VecSource::new(inserted.clone()));

    let store = Config::new(folder.path(), "crashy")
        .use_tables(tables)
        .open(source.clone(), Arc::new(FixedWindowFinder::new(100)))?;

    // materialize the segment normally
    assert_eq!(3, store.read_range_values(Time::MIN, Time::MAX).count());
    assert_eq!(1, source.download_count());

    // simulate a crash mid-initialization: status row reverted to
    // initializing, crash marker left on disk
    let range = TimeRange::new(Time::new(0), Time::new(99));
    status.put("crashy", &range.to_key(), vec![0])?;

    let marker = folder.path().join("crashy_0_99").join("update.lock");
    std::fs::File::create(&marker)?;

    let recovered: Vec<Candle> = store
        .read_range_values(Time::MIN, Time::MAX)
        .collect::<segmented_series::Result<_>>()?;

    assert_eq!(inserted, recovered);
    assert_eq!(2, source.download_count());
    assert!(!marker.try_exists()?);

    let rows = status.scan("crashy", None, None)?;
    assert_eq!(vec![(range.to_key().to_vec(), vec![1])], rows);

    Ok(())
}

#[test]
fn fresh_store_reports_empty() -> segmented_series::Result<()> {
    let folder = tempfile::tempdir()?;

    let source = Arc::new(VecSource::new(Vec::new()));

    let store = Config::new(folder.path(), "empty")
        .open(source, Arc::new(FixedWindowFinder::new(100)))?;

    assert!(store.is_empty_or_inconsistent()?);

    Ok(())
}

#[test]
fn populated_store_reports_consistent() -> segmented_series::Result<()> {
    let folder = tempfile::tempdir()?;

    let source = Arc::new(VecSource::new(window_candles(0..2)));

    let store = Config::new(folder.path(), "full")
        .open(source, Arc::new(FixedWindowFinder::new(100)))?;

    assert!(!store.is_empty_or_inconsistent()?);

    // tearing a chunk file out from underneath makes the inspection fail
    for entry in std::fs::read_dir(folder.path().join("full_0_99"))? {
        std::fs::remove_file(entry?.path())?;
    }

    assert!(store.is_empty_or_inconsistent()?);

    Ok(())
}
