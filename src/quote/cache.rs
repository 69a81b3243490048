//! Quote cache: `(direction, mint, amount) -> QuoteResult`, TTL 30s,
//! bounded, evict-oldest-on-overflow (§3, §5).

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::quote::QuoteResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Buy,
    Sell,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub direction: Direction,
    pub mint: String,
    pub amount: u64,
}

struct Entry {
    result: QuoteResult,
    inserted_at: Instant,
}

pub struct QuoteCache {
    entries: HashMap<CacheKey, Entry>,
    insertion_order: Vec<CacheKey>,
    ttl: Duration,
    max_entries: usize,
}

impl QuoteCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: HashMap::new(),
            insertion_order: Vec::new(),
            ttl,
            max_entries,
        }
    }

    pub fn get(&self, key: &CacheKey) -> Option<QuoteResult> {
        self.entries.get(key).and_then(|entry| {
            if entry.inserted_at.elapsed() < self.ttl {
                Some(entry.result.clone())
            } else {
                None
            }
        })
    }

    pub fn insert(&mut self, key: CacheKey, result: QuoteResult) {
        if !self.entries.contains_key(&key) {
            if self.insertion_order.len() >= self.max_entries {
                if let Some(oldest) = pop_front(&mut self.insertion_order) {
                    self.entries.remove(&oldest);
                }
            }
            self.insertion_order.push(key.clone());
        }
        self.entries.insert(
            key,
            Entry {
                result,
                inserted_at: Instant::now(),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn pop_front(v: &mut Vec<CacheKey>) -> Option<CacheKey> {
    if v.is_empty() {
        None
    } else {
        Some(v.remove(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(out_amount: u64) -> QuoteResult {
        QuoteResult {
            success: true,
            has_route: true,
            out_amount: Some(out_amount),
            price_impact_pct: Some(1.0),
            route_label: Some("raydium".into()),
            pool_handle: None,
            estimated_liquidity: None,
            error: None,
        }
    }

    #[test]
    fn test_fresh_entry_returned() {
        let mut cache = QuoteCache::new(Duration::from_secs(30), 100);
        let key = CacheKey { direction: Direction::Buy, mint: "m1".into(), amount: 1000 };
        cache.insert(key.clone(), result(500));
        assert!(cache.get(&key).is_some());
    }

    #[test]
    fn test_expired_entry_not_returned() {
        let mut cache = QuoteCache::new(Duration::from_millis(0), 100);
        let key = CacheKey { direction: Direction::Buy, mint: "m1".into(), amount: 1000 };
        cache.insert(key.clone(), result(500));
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get(&key).is_none());
    }

    #[test]
    fn test_overflow_evicts_oldest() {
        let mut cache = QuoteCache::new(Duration::from_secs(30), 2);
        let k1 = CacheKey { direction: Direction::Buy, mint: "m1".into(), amount: 1 };
        let k2 = CacheKey { direction: Direction::Buy, mint: "m2".into(), amount: 1 };
        let k3 = CacheKey { direction: Direction::Buy, mint: "m3".into(), amount: 1 };
        cache.insert(k1.clone(), result(1));
        cache.insert(k2.clone(), result(2));
        cache.insert(k3.clone(), result(3));
        assert!(cache.get(&k1).is_none());
        assert!(cache.get(&k2).is_some());
        assert!(cache.get(&k3).is_some());
    }
}
