mod common;

use common::{Candle, VecSource};
use segmented_series::{Config, FixedWindowFinder, Time};
use std::sync::Arc;
use test_log::test;

#[test]
fn concurrent_lookups_download_once() -> segmented_series::Result<()> {
    let folder = tempfile::tempdir()?;

    let source = Arc::new(VecSource::new(vec![
        Candle::at(10),
        Candle::at(20),
        Candle::at(30),
    ]));

    let store = Config::new(folder.path(), "hot")
        .open(source.clone(), Arc::new(FixedWindowFinder::new(100)))?;

    let results = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let store = store.clone();
                scope.spawn(move || store.get_latest_value(Time::new(25)))
            })
            .collect();

        handles
            .into_iter()
            .map(|handle| handle.join().expect("thread should not panic"))
            .collect::<Vec<_>>()
    });

    for result in results {
        assert_eq!(Some(Candle::at(20)), result?);
    }

    assert_eq!(1, source.download_count());

    Ok(())
}

#[test]
fn concurrent_scans_download_once_per_segment() -> segmented_series::Result<()> {
    let folder = tempfile::tempdir()?;

    let source = Arc::new(VecSource::new(common::window_candles(0..4)));

    let store = Config::new(folder.path(), "hot")
        .open(source.clone(), Arc::new(FixedWindowFinder::new(100)))?;

    std::thread::scope(|scope| {
        for _ in 0..4 {
            let store = store.clone();

            scope.spawn(move || {
                let count = store.read_range_values(Time::MIN, Time::MAX).count();
                assert_eq!(12, count);
            });
        }
    });

    assert_eq!(4, source.download_count());

    Ok(())
}
