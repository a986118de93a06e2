#![forbid(unsafe_code)]

// SymbolId is stable across threads and runs
// repr(transparent) -> same layout as the wrapped u16
#[repr(transparent)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SymbolId(pub u16);

// Top-of-book quote used to load the rings.
// POD -> Plain old data, fixed-size, no pointers. Not packed: readers get
// `&Quote` from the rings and take references to its fields.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Quote {
    pub ts_event_ns: u64,
    pub seq: u64, // per-producer sequence number, lets consumers check ordering
    pub bid_px_ticks: i64,
    pub bid_qty_lots: i64,
    pub ask_px_ticks: i64,
    pub ask_qty_lots: i64,
    pub symbol_id: SymbolId,
    pub producer: u16,
}

impl Quote {
    /// Deterministic quote for tests and load generation: prices drift with
    /// `seq` so consecutive records differ.
    pub fn synthetic(producer: u16, seq: u64) -> Self {
        let drift = (seq % 100) as i64;
        Self {
            ts_event_ns: seq,
            seq,
            bid_px_ticks: 10_000 + drift,
            bid_qty_lots: 10,
            ask_px_ticks: 10_001 + drift,
            ask_qty_lots: 12,
            symbol_id: SymbolId(producer),
            producer,
        }
    }

    #[inline]
    pub fn mid_ticks(&self) -> i64 {
        (self.bid_px_ticks + self.ask_px_ticks) / 2
    }

    #[inline]
    pub fn spread_ticks(&self) -> i64 {
        self.ask_px_ticks - self.bid_px_ticks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::{align_of, size_of};

    /// Quote has to fit a single cache line so one ring slot write touches
    /// one line, and stay 8-byte aligned so copies move whole words.
    #[test]
    fn quote_fits_a_cache_line() {
        assert_eq!(size_of::<Quote>(), 56, "Quote layout changed");
        assert_eq!(align_of::<Quote>(), 8);
    }

    #[test]
    fn symbol_id_is_pod() {
        assert_eq!(size_of::<SymbolId>(), 2);
    }

    #[test]
    fn synthetic_quotes_are_tagged_and_crossed_correctly() {
        let q = Quote::synthetic(3, 250);
        assert_eq!(q.producer, 3);
        assert_eq!(q.seq, 250);
        assert_eq!(q.symbol_id, SymbolId(3));
        assert_eq!(q.spread_ticks(), 1);
        assert_eq!(q.mid_ticks(), 10_050);
    }

    #[test]
    fn default_quote_is_zeroed() {
        let q = Quote::default();
        assert_eq!(q.seq, 0);
        assert_eq!(q.mid_ticks(), 0);
    }
}
