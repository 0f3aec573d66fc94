// Copyright 2026 RingKV Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

/// The number of slots on the hash ring. Member addresses and user keys hash
/// into the same `[0, RING_SLOTS)` space.
pub const RING_SLOTS: u32 = 1_000_000;

/// Hashes a string onto the ring.
///
/// The input is consumed four bytes at a time; each chunk is read as a
/// little-endian integer and summed, with the trailing partial chunk included.
/// Every node must agree on this function, so it is fixed rather than
/// configurable.
pub fn ring_hash(s: &str) -> u32 {
    let bytes = s.as_bytes();
    let mut sum: i64 = 0;

    let mut chunks = bytes.chunks_exact(4);
    for chunk in &mut chunks {
        let mut mult: i64 = 1;
        for &b in chunk {
            sum += i64::from(b) * mult;
            mult *= 256;
        }
    }

    let mut mult: i64 = 1;
    for &b in chunks.remainder() {
        sum += i64::from(b) * mult;
        mult *= 256;
    }

    (sum % i64::from(RING_SLOTS)).unsigned_abs() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic() {
        let addr = "127.0.0.1:4567";
        assert_eq!(ring_hash(addr), ring_hash(addr));
    }

    #[test]
    fn test_in_range() {
        for s in ["", "a", "ab", "abc", "abcd", "abcde", "127.0.0.1:4567"] {
            assert!(ring_hash(s) < RING_SLOTS);
        }
    }

    #[test]
    fn test_chunked_little_endian() {
        // A single chunk reads little-endian: "ab" = 'a' + 'b' * 256.
        assert_eq!(ring_hash("ab"), (97 + 98 * 256) % RING_SLOTS);
        // Chunks are summed independently.
        let full = i64::from(ring_hash("abcdab"));
        let head = 97 + 98 * 256 + 99 * 65536 + 100 * 16777216i64;
        let tail = 97 + 98 * 256i64;
        assert_eq!(full, (head + tail) % i64::from(RING_SLOTS));
    }

    #[test]
    fn test_disperses_ports() {
        let a = ring_hash("127.0.0.1:4567");
        let b = ring_hash("127.0.0.1:4568");
        assert_ne!(a, b);
    }
}
