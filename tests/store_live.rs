mod common;

use common::{times, Candle};
use segmented_series::{Config, Error, FixedWindowFinder, LiveSeriesStore, Time};
use std::sync::Arc;
use test_log::test;

fn open_live(folder: &std::path::Path) -> segmented_series::Result<LiveSeriesStore<Candle>> {
    Config::new(folder, "live").open_live(Arc::new(FixedWindowFinder::new(100)))
}

/// Appends candles at every tenth tick of [0, last].
fn fill(store: &LiveSeriesStore<Candle>, last: i64) -> segmented_series::Result<()> {
    for t in (0..=last).step_by(10) {
        store.put_next_live_value(Candle::at(t))?;
    }

    Ok(())
}

#[test]
fn merged_scan_spans_historical_and_live() -> segmented_series::Result<()> {
    let folder = tempfile::tempdir()?;
    let store = open_live(folder.path())?;

    // promotes [0,99] .. [300,399]; the live tail covers [400,499]
    fill(&store, 450)?;

    let values: Vec<Candle> = store
        .read_range_values(Time::new(320), Time::new(430))
        .collect::<segmented_series::Result<_>>()?;

    assert_eq!(
        vec![320, 330, 340, 350, 360, 370, 380, 390, 400, 410, 420, 430],
        times(&values),
    );

    // entirely within the live tail
    let values: Vec<Candle> = store
        .read_range_values(Time::new(410), Time::new(440))
        .collect::<segmented_series::Result<_>>()?;

    assert_eq!(vec![410, 420, 430, 440], times(&values));

    // entirely historical
    let values: Vec<Candle> = store
        .read_range_values(Time::new(110), Time::new(140))
        .collect::<segmented_series::Result<_>>()?;

    assert_eq!(vec![110, 120, 130, 140], times(&values));

    Ok(())
}

#[test]
fn merged_scan_equals_single_store_ordering() -> segmented_series::Result<()> {
    let folder = tempfile::tempdir()?;
    let store = open_live(folder.path())?;

    fill(&store, 450)?;

    let inserted: Vec<i64> = (0..=450).step_by(10).collect();

    let forward: Vec<Candle> = store
        .read_range_values(Time::MIN, Time::MAX)
        .collect::<segmented_series::Result<_>>()?;

    assert_eq!(inserted, times(&forward));

    let backward: Vec<Candle> = store
        .read_range_values_rev(Time::MAX, Time::MIN)
        .collect::<segmented_series::Result<_>>()?;

    let mut reversed = inserted;
    reversed.reverse();

    assert_eq!(reversed, times(&backward));

    Ok(())
}

#[test]
fn merged_reverse_scan_crosses_the_promotion_boundary() -> segmented_series::Result<()> {
    let folder = tempfile::tempdir()?;
    let store = open_live(folder.path())?;

    fill(&store, 450)?;

    let values: Vec<Candle> = store
        .read_range_values_rev(Time::new(430), Time::new(380))
        .collect::<segmented_series::Result<_>>()?;

    assert_eq!(vec![430, 420, 410, 400, 390, 380], times(&values));

    Ok(())
}

#[test]
fn boundary_lookups_prefer_the_right_side() -> segmented_series::Result<()> {
    let folder = tempfile::tempdir()?;
    let store = open_live(folder.path())?;

    fill(&store, 450)?;

    assert_eq!(Some(Candle::at(0)), store.get_first_value()?);
    assert_eq!(Some(Candle::at(450)), store.get_last_value()?);

    // live wins for covered dates, historical for older ones
    assert_eq!(Some(Candle::at(420)), store.get_latest_value(Time::new(425))?);
    assert_eq!(Some(Candle::at(50)), store.get_latest_value(Time::new(55))?);
    assert_eq!(Some(Candle::at(450)), store.get_latest_value(Time::MAX)?);

    // everything lies after the query point: clamps to the first value
    assert_eq!(Some(Candle::at(0)), store.get_latest_value(Time::new(-1))?);

    Ok(())
}

#[test]
fn shift_lookups_merge_across_the_boundary() -> segmented_series::Result<()> {
    let folder = tempfile::tempdir()?;
    let store = open_live(folder.path())?;

    fill(&store, 450)?;

    // covered by the live tail: merged walks
    assert_eq!(Some(Candle::at(440)), store.get_previous_value(Time::new(450), 2)?);
    assert_eq!(Some(Candle::at(390)), store.get_previous_value(Time::new(405), 2)?);
    assert_eq!(Some(Candle::at(410)), store.get_next_value(Time::new(405), 1)?);
    assert_eq!(None, store.get_next_value(Time::new(405), 6)?);

    // below the live tail: delegated to the historical store
    assert_eq!(Some(Candle::at(390)), store.get_previous_value(Time::new(399), 1)?);

    assert!(matches!(
        store.get_previous_value(Time::new(405), 0),
        Err(Error::InvalidShift(0)),
    ));

    Ok(())
}

#[test]
fn out_of_order_appends_are_rejected() -> segmented_series::Result<()> {
    let folder = tempfile::tempdir()?;
    let store = open_live(folder.path())?;

    fill(&store, 450)?;

    assert!(matches!(
        store.put_next_live_value(Candle::at(300)),
        Err(Error::InvariantViolation(_)),
    ));

    // equal times are fine, the stream stays usable
    store.put_next_live_value(Candle::at(450))?;
    assert_eq!(Some(Candle::at(450)), store.get_last_value()?);

    Ok(())
}

#[test]
fn live_only_store_answers_queries() -> segmented_series::Result<()> {
    let folder = tempfile::tempdir()?;
    let store = open_live(folder.path())?;

    // nothing promoted yet
    store.put_next_live_value(Candle::at(5))?;
    store.put_next_live_value(Candle::at(7))?;

    assert_eq!(Some(Candle::at(5)), store.get_first_value()?);
    assert_eq!(Some(Candle::at(7)), store.get_last_value()?);
    assert_eq!(Some(Candle::at(5)), store.get_latest_value(Time::new(6))?);

    let values: Vec<Candle> = store
        .read_range_values(Time::MIN, Time::MAX)
        .collect::<segmented_series::Result<_>>()?;

    assert_eq!(vec![5, 7], times(&values));

    assert!(!store.is_empty_or_inconsistent()?);

    Ok(())
}

#[test]
fn delete_all_resets_the_overlay() -> segmented_series::Result<()> {
    let folder = tempfile::tempdir()?;
    let store = open_live(folder.path())?;

    fill(&store, 250)?;

    store.delete_all()?;

    assert!(store.is_empty_or_inconsistent()?);
    assert_eq!(None, store.get_first_value()?);
    assert_eq!(0, store.read_range_values(Time::MIN, Time::MAX).count());

    // the stream restarts cleanly
    store.put_next_live_value(Candle::at(42))?;
    assert_eq!(Some(Candle::at(42)), store.get_last_value()?);

    Ok(())
}
