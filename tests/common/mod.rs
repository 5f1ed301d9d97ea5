#![allow(dead_code)]

use segmented_series::{DecodeError, EncodeError, SeriesSource, SeriesValue, Time, TimeRange};
use std::{
    io::{Read, Write},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
};

/// Test value: a time point plus a payload deduced from it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Candle {
    pub time: i64,
    pub value: u32,
}

impl Candle {
    pub fn at(time: i64) -> Self {
        Self {
            time,
            value: time.unsigned_abs() as u32,
        }
    }
}

impl SeriesValue for Candle {
    fn time(&self) -> Time {
        Time::new(self.time)
    }

    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        writer.write_all(&self.time.to_be_bytes())?;
        writer.write_all(&self.value.to_be_bytes())?;
        Ok(())
    }

    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        let mut time = [0; 8];
        reader.read_exact(&mut time)?;

        let mut value = [0; 4];
        reader.read_exact(&mut value)?;

        Ok(Self {
            time: i64::from_be_bytes(time),
            value: u32::from_be_bytes(value),
        })
    }
}

/// Scripted source: a mutable list of candles plus explicit availability
/// bounds, counting every segment download.
pub struct VecSource {
    values: Mutex<Vec<Candle>>,
    available: Mutex<Option<(Time, Time)>>,
    downloads: AtomicUsize,
}

impl VecSource {
    pub fn new(values: Vec<Candle>) -> Self {
        let available = match (values.first(), values.last()) {
            (Some(first), Some(last)) => Some((Time::new(first.time), Time::new(last.time))),
            _ => None,
        };

        Self {
            values: Mutex::new(values),
            available: Mutex::new(available),
            downloads: AtomicUsize::new(0),
        }
    }

    pub fn with_availability(values: Vec<Candle>, from: i64, to: i64) -> Self {
        Self {
            values: Mutex::new(values),
            available: Mutex::new(Some((Time::new(from), Time::new(to)))),
            downloads: AtomicUsize::new(0),
        }
    }

    pub fn download_count(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }

    pub fn set_values(&self, values: Vec<Candle>) {
        *self.values.lock().expect("lock is poisoned") = values;
    }

    pub fn set_availability(&self, bounds: Option<(i64, i64)>) {
        *self.available.lock().expect("lock is poisoned") =
            bounds.map(|(from, to)| (Time::new(from), Time::new(to)));
    }
}

impl SeriesSource<Candle> for VecSource {
    fn download_segment_elements(
        &self,
        range: &TimeRange,
    ) -> segmented_series::Result<Box<dyn Iterator<Item = Candle> + Send + '_>> {
        self.downloads.fetch_add(1, Ordering::SeqCst);

        let matching: Vec<Candle> = self
            .values
            .lock()
            .expect("lock is poisoned")
            .iter()
            .filter(|c| range.contains(Time::new(c.time)))
            .cloned()
            .collect();

        Ok(Box::new(matching.into_iter()))
    }

    fn first_available_from(&self) -> Option<Time> {
        self.available
            .lock()
            .expect("lock is poisoned")
            .map(|(from, _)| from)
    }

    fn last_available_to(&self) -> Option<Time> {
        self.available
            .lock()
            .expect("lock is poisoned")
            .map(|(_, to)| to)
    }
}

/// Three candles per 100-tick window: first, middle and last tick.
pub fn window_candles(windows: std::ops::Range<i64>) -> Vec<Candle> {
    let mut values = Vec::new();

    for window in windows {
        let from = window * 100;
        values.push(Candle::at(from));
        values.push(Candle::at(from + 50));
        values.push(Candle::at(from + 99));
    }

    values
}

pub fn times(values: &[Candle]) -> Vec<i64> {
    values.iter().map(|c| c.time).collect()
}
