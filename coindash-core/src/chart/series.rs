//! Loaded candles for one chart, growing at either end.

use crate::domain::{BundleKey, Candle};

#[derive(Debug, Clone, PartialEq)]
pub struct CandleSeries {
    key: BundleKey,
    candles: Vec<Candle>,
}

impl CandleSeries {
    /// Candles are sorted by time; of equal timestamps the later one is kept.
    pub fn new(key: BundleKey, candles: Vec<Candle>) -> Self {
        Self {
            key,
            candles: strictly_increasing(candles),
        }
    }

    pub fn key(&self) -> &BundleKey {
        &self.key
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn oldest_time(&self) -> Option<i64> {
        self.candles.first().map(|c| c.time)
    }

    pub fn newest_time(&self) -> Option<i64> {
        self.candles.last().map(|c| c.time)
    }

    /// Prepend the part of `page` older than what is loaded. Returns how
    /// many candles were added.
    pub fn merge_older(&mut self, page: &[Candle]) -> usize {
        let bound = self.oldest_time();
        let older: Vec<Candle> = page
            .iter()
            .filter(|c| bound.map_or(true, |t| c.time < t))
            .copied()
            .collect();
        let older = strictly_increasing(older);
        let added = older.len();
        if added > 0 {
            self.candles.splice(0..0, older);
        }
        added
    }

    /// Append the part of `page` newer than what is loaded. A candle with
    /// the newest loaded timestamp replaces it (the live bar updating).
    /// Returns how many candles were added.
    pub fn merge_newer(&mut self, page: &[Candle]) -> usize {
        let mut newer = strictly_increasing(page.to_vec());
        if let Some(last) = self.candles.last_mut() {
            let newest = last.time;
            if let Some(live) = newer.iter().find(|c| c.time == newest) {
                *last = *live;
            }
            newer.retain(|c| c.time > newest);
        }
        let added = newer.len();
        self.candles.extend(newer);
        added
    }
}

fn strictly_increasing(mut candles: Vec<Candle>) -> Vec<Candle> {
    candles.sort_by_key(|c| c.time);
    let mut out: Vec<Candle> = Vec::with_capacity(candles.len());
    for c in candles {
        match out.last_mut() {
            Some(prev) if prev.time == c.time => *prev = c,
            _ => out.push(c),
        }
    }
    out
}
