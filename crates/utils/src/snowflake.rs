/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::{SystemTime, UNIX_EPOCH},
};

const SEQUENCE_LEN: u64 = 12;
const NODE_ID_LEN: u64 = 10;
const SEQUENCE_MASK: u64 = (1 << SEQUENCE_LEN) - 1;
const NODE_ID_MASK: u64 = (1 << NODE_ID_LEN) - 1;

// Custom epoch: 2023-01-01T00:00:00Z.
const EPOCH: u64 = 1_672_531_200;

pub struct SnowflakeIdGenerator {
    node_id: u64,
    sequence: AtomicU64,
}

impl SnowflakeIdGenerator {
    pub fn new() -> Self {
        Self::with_node_id(rand::random::<u64>())
    }

    pub fn with_node_id(node_id: u64) -> Self {
        SnowflakeIdGenerator {
            node_id: node_id & NODE_ID_MASK,
            sequence: AtomicU64::new(0),
        }
    }

    pub fn generate(&self) -> u64 {
        let elapsed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_secs().saturating_sub(EPOCH));
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed) & SEQUENCE_MASK;

        (elapsed << (SEQUENCE_LEN + NODE_ID_LEN)) | (self.node_id << SEQUENCE_LEN) | sequence
    }

    pub fn is_valid_id(id: u64) -> bool {
        id >> (SEQUENCE_LEN + NODE_ID_LEN) > 0
    }
}

impl Default for SnowflakeIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for SnowflakeIdGenerator {
    fn clone(&self) -> Self {
        SnowflakeIdGenerator {
            node_id: self.node_id,
            sequence: AtomicU64::new(self.sequence.load(Ordering::Relaxed)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monotonic_within_node() {
        let generator = SnowflakeIdGenerator::with_node_id(3);
        let a = generator.generate();
        let b = generator.generate();
        assert_ne!(a, b);
        assert!(SnowflakeIdGenerator::is_valid_id(a));
    }
}
