//! `.psc` PSI/SI archive reader.
//!
//! Ported bit-for-bit from the recording pipeline's sidecar writer: a
//! sliding-window section dictionary plus a run-length-coded time list.
//! Each chunk rebuilds its dictionary from the previous chunk's
//! unreferenced entries, so state carries across the `while` loop the
//! same way the original reader's `last_pids`/`last_dict` locals do.

use crate::error::{CoreError, Result};
use std::io::Read;

const MAGIC: [u8; 8] = *b"Pssc\x0d\x0a\x9a\x0a";
const HEADER_SIZE: usize = 32;
/// Hard cap on the dictionary window:
/// `65536 - 4096` entries, matching the original.
const MAX_DICTIONARY_WINDOW: u32 = 65536 - 4096;

fn u16le(buf: &[u8], pos: usize) -> u16 {
    u16::from_le_bytes([buf[pos], buf[pos + 1]])
}

fn u32le(buf: &[u8], pos: usize) -> u32 {
    u32::from_le_bytes([buf[pos], buf[pos + 1], buf[pos + 2], buf[pos + 3]])
}

fn read_exact_or_eof<R: Read>(reader: &mut R, len: usize) -> std::io::Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    let mut filled = 0;
    while filled < len {
        match reader.read(&mut buf[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    buf.truncate(filled);
    Ok(buf)
}

/// One extracted PSI/SI section: the JST-relative offset (seconds since
/// the archive's first absolute timestamp), its PID, and raw section
/// bytes.
pub struct PscSection {
    pub time_offset_seconds: f64,
    pub pid: u16,
    pub data: Vec<u8>,
}

/// Reads every chunk in a `.psc` archive, invoking `callback` for each
/// section whose PID is in `target_pids`. Stops (without error) at a
/// short/invalid chunk header, since that's simply the end of the
/// archive; returns `Err` only for structural corruption partway through
/// a chunk that claimed to have more data.
pub fn read_psi_data<R: Read>(
    reader: &mut R,
    target_pids: &[u16],
    mut callback: impl FnMut(PscSection) -> bool,
) -> Result<()> {
    // `None` marks a tombstoned dictionary slot (referenced-and-consumed
    // this round, or a section for a PID we don't care about).
    let mut last_pids: Vec<i32> = Vec::new();
    let mut last_dict: Vec<Option<Vec<u8>>> = Vec::new();
    let mut init_time: i64 = -1;

    loop {
        let header = read_exact_or_eof(reader, HEADER_SIZE)?;
        if header.len() != HEADER_SIZE || header[0..8] != MAGIC {
            break;
        }

        let time_list_len = u16le(&header, 10) as usize;
        let dictionary_len = u16le(&header, 12) as usize;
        let dictionary_window_len = u16le(&header, 14) as u32;
        let dictionary_data_size = u32le(&header, 16);
        let dictionary_buff_size = u32le(&header, 20);
        let code_list_len = u32le(&header, 24) as usize;

        if dictionary_window_len < dictionary_len as u32
            || dictionary_buff_size < dictionary_data_size
            || dictionary_window_len > MAX_DICTIONARY_WINDOW
        {
            return Err(CoreError::Psc("dictionary window bounds violated".into()));
        }

        let time_buf = read_exact_or_eof(reader, time_list_len * 4 + dictionary_len * 2)?;
        if time_buf.len() != time_list_len * 4 + dictionary_len * 2 {
            return Err(CoreError::Psc("truncated time/dictionary index block".into()));
        }

        let mut pos = time_list_len * 4;
        let mut remain = dictionary_data_size as i64;
        let mut pids: Vec<i32> = Vec::new();
        let mut dict: Vec<DictSlot> = Vec::new();

        for _ in 0..dictionary_len {
            let code_or_size = u16le(&time_buf, pos) as i32 - 4096;
            if code_or_size >= 0 {
                let idx = code_or_size as usize;
                if idx >= last_pids.len() || last_pids[idx] < 0 {
                    return Err(CoreError::Psc("back-reference to unknown dictionary id".into()));
                }
                pids.push(last_pids[idx]);
                dict.push(DictSlot::Carried(last_dict[idx].take()));
                last_pids[idx] = -1;
            } else {
                remain -= 2;
                let pid_buf = read_exact_or_eof(reader, 2)?;
                if pid_buf.len() != 2 || remain < 0 {
                    return Err(CoreError::Psc("truncated section-size/pid entry".into()));
                }
                pids.push((u16le(&pid_buf, 0) % 0x2000) as i32);
                dict.push(DictSlot::NewSize(code_or_size));
            }
            pos += 2;
        }

        for slot in dict.iter_mut() {
            if let DictSlot::NewSize(size_code) = *slot {
                let size = (size_code + 4097) as usize;
                remain -= size as i64;
                let buf = read_exact_or_eof(reader, size)?;
                if buf.len() != size || remain < 0 {
                    return Err(CoreError::Psc("truncated section data".into()));
                }
                *slot = DictSlot::Carried(Some(buf));
            }
        }

        let mut dict: Vec<Option<Vec<u8>>> = dict
            .into_iter()
            .enumerate()
            .map(|(i, slot)| match slot {
                DictSlot::Carried(data) => {
                    if pids[i] >= 0 && target_pids.contains(&(pids[i] as u16)) {
                        data
                    } else {
                        None
                    }
                }
                DictSlot::NewSize(_) => unreachable!("replaced above"),
            })
            .collect();

        for i in 0..(dictionary_window_len as usize).saturating_sub(dictionary_len) {
            if i >= last_pids.len() {
                return Err(CoreError::Psc("dictionary window exceeds carried-over slots".into()));
            }
            if last_pids[i] >= 0 {
                pids.push(last_pids[i]);
                dict.push(last_dict[i].take());
            }
        }
        last_pids = pids;
        last_dict = dict;

        remain += (dictionary_data_size % 2) as i64;
        if remain > 0 {
            let skipped = read_exact_or_eof(reader, remain as usize)?;
            if skipped.len() != remain as usize {
                return Err(CoreError::Psc("truncated dictionary padding".into()));
            }
        }

        let mut curr_time: i64 = -1;
        for time_list_pos in (0..time_list_len * 4).step_by(4) {
            let abs_time = u32le(&time_buf, time_list_pos) as i64;
            if abs_time == 0xffff_ffff {
                curr_time = -1;
            } else if abs_time >= 0x8000_0000 {
                curr_time = abs_time % 0x4000_0000;
                if init_time < 0 {
                    init_time = curr_time;
                }
            } else {
                if curr_time >= 0 {
                    curr_time += u16le(&time_buf, time_list_pos) as i64;
                }
                let n = u16le(&time_buf, time_list_pos + 2) as usize + 1;
                let code_buf = read_exact_or_eof(reader, n * 2)?;
                if code_buf.len() != n * 2 {
                    return Err(CoreError::Psc("truncated time-list code run".into()));
                }
                let time_sec = ((curr_time + 0x4000_0000 - init_time) % 0x4000_0000) as f64 / 11250.0;
                for i in 0..n {
                    let code = u16le(&code_buf, i * 2) as i32 - 4096;
                    if code < 0 || code as usize >= last_pids.len() {
                        return Err(CoreError::Psc("time-list code out of range".into()));
                    }
                    let code = code as usize;
                    if let Some(data) = last_dict[code].clone() {
                        let keep_going = callback(PscSection {
                            time_offset_seconds: time_sec,
                            pid: last_pids[code] as u16,
                            data,
                        });
                        if !keep_going {
                            return Ok(());
                        }
                    }
                }
            }
        }

        let consumed_mod4 =
            (dictionary_len * 2 + (dictionary_data_size as usize + 1) / 2 * 2 + code_list_len * 2) % 4;
        let trailer_size = 4 - consumed_mod4;
        if trailer_size > 0 {
            let trailer = read_exact_or_eof(reader, trailer_size)?;
            if trailer.len() != trailer_size {
                return Err(CoreError::Psc("truncated chunk trailer".into()));
            }
        }
    }

    Ok(())
}

enum DictSlot {
    Carried(Option<Vec<u8>>),
    NewSize(i32),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Builds one minimal chunk: a single new dictionary entry for `pid`
    /// holding `section`, referenced once by the time list at time 0.
    fn build_chunk(pid: u16, section: &[u8]) -> Vec<u8> {
        let dictionary_len: u16 = 1;
        let dictionary_window_len: u16 = 1;
        let size_code = section.len() as i32 - 4097;
        // dictionary_data_size covers both the 2-byte pid field and the
        // section bytes consumed for this new entry.
        let dictionary_data_size = section.len() as u32 + 2;
        let dictionary_buff_size = dictionary_data_size;
        let code_list_len: u32 = 0;

        // time list: one absolute-time entry (marks init_time), then one
        // delta entry referencing dictionary id 0 with n=1.
        let time_list_len: u16 = 2;

        let mut chunk = Vec::new();
        chunk.extend_from_slice(&MAGIC);
        chunk.extend_from_slice(&[0u8; 2]); // reserved
        chunk.extend_from_slice(&time_list_len.to_le_bytes());
        chunk.extend_from_slice(&dictionary_len.to_le_bytes());
        chunk.extend_from_slice(&dictionary_window_len.to_le_bytes());
        chunk.extend_from_slice(&dictionary_data_size.to_le_bytes());
        chunk.extend_from_slice(&dictionary_buff_size.to_le_bytes());
        chunk.extend_from_slice(&code_list_len.to_le_bytes());
        chunk.extend_from_slice(&[0u8; 4]); // trailing header reserved bytes
        assert_eq!(chunk.len(), HEADER_SIZE);

        // time_buf = time_list (time_list_len*4 bytes) + dictionary index
        // block (dictionary_len*2 bytes).
        let abs_time: u32 = 0x8000_0000; // absolute time 0, sets init_time
        chunk.extend_from_slice(&abs_time.to_le_bytes());
        let delta_entry_delta: u16 = 0;
        let delta_entry_n_minus_1: u16 = 0; // n = 1
        chunk.extend_from_slice(&delta_entry_delta.to_le_bytes());
        chunk.extend_from_slice(&delta_entry_n_minus_1.to_le_bytes());
        let dict_index_code: u16 = (size_code + 4096) as u16;
        chunk.extend_from_slice(&dict_index_code.to_le_bytes());

        // new-entry section size/pid field then section bytes.
        chunk.extend_from_slice(&pid.to_le_bytes());
        chunk.extend_from_slice(section);
        if dictionary_data_size % 2 == 1 {
            chunk.push(0);
        }

        // code list for the n=1 run: one u16 referencing dictionary id 0.
        let code: u16 = 4096;
        chunk.extend_from_slice(&code.to_le_bytes());

        let consumed_mod4 =
            (dictionary_len as usize * 2 + (dictionary_data_size as usize + 1) / 2 * 2 + code_list_len as usize * 2) % 4;
        let trailer_size = 4 - consumed_mod4;
        chunk.extend(std::iter::repeat(0u8).take(trailer_size));

        chunk
    }

    #[test]
    fn extracts_single_section_for_targeted_pid() {
        let section = vec![0u8, 1, 2, 3, 4, 5, 6, 7];
        let chunk = build_chunk(0x0100, &section);
        let mut cursor = Cursor::new(chunk);
        let mut extracted = Vec::new();
        read_psi_data(&mut cursor, &[0x0100], |s| {
            extracted.push(s);
            true
        })
        .unwrap();
        assert_eq!(extracted.len(), 1);
        assert_eq!(extracted[0].pid, 0x0100);
        assert_eq!(extracted[0].data, section);
    }

    #[test]
    fn non_targeted_pid_is_dropped_but_not_an_error() {
        let section = vec![9u8, 9, 9, 9];
        let chunk = build_chunk(0x0200, &section);
        let mut cursor = Cursor::new(chunk);
        let mut extracted = Vec::new();
        read_psi_data(&mut cursor, &[0x0100], |s| {
            extracted.push(s);
            true
        })
        .unwrap();
        assert!(extracted.is_empty());
    }

    #[test]
    fn truncated_archive_is_treated_as_clean_eof() {
        let mut cursor = Cursor::new(vec![0u8; 4]); // shorter than one header
        let mut extracted = Vec::new();
        read_psi_data(&mut cursor, &[0x0100], |s| {
            extracted.push(s);
            true
        })
        .unwrap();
        assert!(extracted.is_empty());
    }
}
