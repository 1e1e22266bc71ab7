// crates/core/src/freshness.rs
//! Last-update timestamps of globally computed results.
//!
//! Empty at boot; each global computation stamps its key when it finishes.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::types::Server;

/// Which global result a timestamp belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum UpdateKey {
    PastMatrix(Server),
    CurrentMatrix(Server),
    Trend { server: Server, interval: i64, range: i64 },
    TotalStageTimes { server: Server, range: Option<i64> },
    TotalItemQuantities(Server),
}

#[derive(Debug, Default)]
pub struct LastUpdateTimes {
    stamps: RwLock<HashMap<UpdateKey, i64>>,
}

impl LastUpdateTimes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, key: UpdateKey, at: i64) {
        match self.stamps.write() {
            Ok(mut stamps) => {
                stamps.insert(key, at);
            }
            Err(e) => tracing::error!("RwLock poisoned writing last-update times: {e}"),
        }
    }

    pub fn get(&self, key: &UpdateKey) -> Option<i64> {
        match self.stamps.read() {
            Ok(stamps) => stamps.get(key).copied(),
            Err(e) => {
                tracing::error!("RwLock poisoned reading last-update times: {e}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_get() {
        let times = LastUpdateTimes::new();
        assert_eq!(times.get(&UpdateKey::CurrentMatrix(Server::Cn)), None);

        times.record(UpdateKey::CurrentMatrix(Server::Cn), 10);
        times.record(UpdateKey::CurrentMatrix(Server::Cn), 20);
        assert_eq!(times.get(&UpdateKey::CurrentMatrix(Server::Cn)), Some(20));
        assert_eq!(times.get(&UpdateKey::PastMatrix(Server::Cn)), None);
    }
}
