//! `.psc` chunk encoder — the inverse of `psc::reader::read_psi_data`,
//! used by the live PSI/SI archiver and
//! exercised by the round-trip property in
//!
//! This writer always emits brand-new dictionary entries (no
//! back-references into a previous chunk's window) and a single
//! absolute time anchor per chunk, which is sufficient for the
//! archiver's append-only usage: each call encodes one batch of
//! freshly-observed sections. Per-entry time deltas must fit in a
//! `u16` tick count (ticks are 1/11250 s, so ≈5.8 s between
//! consecutive entries in one chunk) — callers needing a larger gap
//! should start a new chunk.

const MAGIC: [u8; 8] = *b"Pssc\x0d\x0a\x9a\x0a";
const HEADER_SIZE: usize = 32;
const TICKS_PER_SECOND: f64 = 11250.0;

/// One section to archive: its PID, capture time (seconds, archive-
/// relative), and raw bytes.
pub struct ArchiveEntry {
    pub pid: u16,
    pub time_seconds: f64,
    pub data: Vec<u8>,
}

/// Encodes one self-contained `.psc` chunk holding every entry in
/// `entries`, each as a new dictionary slot referenced by exactly one
/// time-list run of length 1.
pub fn encode_chunk(entries: &[ArchiveEntry]) -> Vec<u8> {
    let dictionary_len = entries.len() as u16;
    let dictionary_window_len = dictionary_len;
    let code_list_len: u32 = 0;
    // One absolute anchor entry plus one delta run (n=1) per archived
    // section.
    let time_list_len = 1 + entries.len() as u16;

    let dictionary_data_size: u32 = entries.iter().map(|e| 2 + e.data.len() as u32).sum();
    let dictionary_buff_size = dictionary_data_size;

    let mut chunk = Vec::new();
    chunk.extend_from_slice(&MAGIC);
    chunk.extend_from_slice(&[0u8; 2]);
    chunk.extend_from_slice(&time_list_len.to_le_bytes());
    chunk.extend_from_slice(&dictionary_len.to_le_bytes());
    chunk.extend_from_slice(&dictionary_window_len.to_le_bytes());
    chunk.extend_from_slice(&dictionary_data_size.to_le_bytes());
    chunk.extend_from_slice(&dictionary_buff_size.to_le_bytes());
    chunk.extend_from_slice(&code_list_len.to_le_bytes());
    chunk.extend_from_slice(&[0u8; 4]);
    debug_assert_eq!(chunk.len(), HEADER_SIZE);

    // Time list: absolute anchor at tick 0, then one delta run per entry.
    let anchor: u32 = 0x8000_0000;
    chunk.extend_from_slice(&anchor.to_le_bytes());

    let mut prev_ticks: i64 = 0;
    for entry in entries {
        let ticks = (entry.time_seconds * TICKS_PER_SECOND).round() as i64;
        let delta = (ticks - prev_ticks).clamp(0, u16::MAX as i64) as u16;
        prev_ticks = ticks;
        chunk.extend_from_slice(&delta.to_le_bytes());
        let n_minus_1: u16 = 0; // n = 1
        chunk.extend_from_slice(&n_minus_1.to_le_bytes());
    }

    // Dictionary index block: every entry is new, size_code = data.len() - 4097.
    for entry in entries {
        let size_code = entry.data.len() as i32 - 4097;
        let code: u16 = (size_code + 4096) as u16;
        chunk.extend_from_slice(&code.to_le_bytes());
    }

    // New-entry pid + section bytes.
    for entry in entries {
        chunk.extend_from_slice(&entry.pid.to_le_bytes());
        chunk.extend_from_slice(&entry.data);
    }
    if dictionary_data_size % 2 == 1 {
        chunk.push(0);
    }

    // Code list: one reference per time-list run, in dictionary order.
    for (i, _) in entries.iter().enumerate() {
        let code: u16 = 4096 + i as u16;
        chunk.extend_from_slice(&code.to_le_bytes());
    }

    let consumed_mod4 = (dictionary_len as usize * 2
        + (dictionary_data_size as usize + 1) / 2 * 2
        + code_list_len as usize * 2)
        % 4;
    let trailer_size = (4 - consumed_mod4) % 4;
    chunk.extend(std::iter::repeat(0u8).take(trailer_size));

    chunk
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::psc::reader::read_psi_data;
    use std::io::Cursor;

    #[test]
    fn round_trips_multiple_sections_through_the_reader() {
        let entries = vec![
            ArchiveEntry { pid: 0x0000, time_seconds: 0.0, data: vec![0u8; 16] },
            ArchiveEntry { pid: 0x0011, time_seconds: 1.0, data: vec![1u8; 32] },
            ArchiveEntry { pid: 0x0012, time_seconds: 2.5, data: vec![2u8; 8] },
        ];
        let chunk = encode_chunk(&entries);

        let mut recovered = Vec::new();
        read_psi_data(&mut Cursor::new(chunk), &[0x0000, 0x0011, 0x0012], |s| {
            recovered.push((s.pid, s.data));
            true
        })
        .unwrap();

        assert_eq!(recovered.len(), 3);
        assert_eq!(recovered[0], (0x0000, vec![0u8; 16]));
        assert_eq!(recovered[1], (0x0011, vec![1u8; 32]));
        assert_eq!(recovered[2], (0x0012, vec![2u8; 8]));
    }

    #[test]
    fn entries_outside_target_pids_are_filtered_on_read() {
        let entries = vec![ArchiveEntry { pid: 0x1234, time_seconds: 0.0, data: vec![9u8; 4] }];
        let chunk = encode_chunk(&entries);
        let mut recovered = Vec::new();
        read_psi_data(&mut Cursor::new(chunk), &[0x0000], |s| {
            recovered.push(s);
            true
        })
        .unwrap();
        assert!(recovered.is_empty());
    }
}
