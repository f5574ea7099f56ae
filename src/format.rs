//! On-disk layout of the binary sample profile.
//!
//! All integers are little-endian and records are packed. Every decoder
//! checks the remaining length before touching the buffer, so a truncated
//! file surfaces as [`Error::FormatError`] instead of a panic.

use bytes::Buf;

use crate::error::{Error, Result};

/// Profile file used when no path is configured
pub const DEFAULT_SAMPLE_DATAFILE: &str = "sp.data";

/// Size of the fixed file header
pub const FILE_HEADER_SIZE: usize = 40;

/// Minimum size of a function header entry; producers may pad entries
pub const FUNC_HEADER_MIN_SIZE: usize = 52;

/// Entry size from which a header also carries the group's total samples
pub const FUNC_HEADER_TOTAL_SIZE: usize = FUNC_HEADER_MIN_SIZE + 8;

/// Size of a per-line frequency record
pub const FREQ_RECORD_SIZE: usize = 16;

/// Size of one inline stack frame
pub const STACK_ENTRY_SIZE: usize = 8;

/// Deepest inline call stack accepted from a profile or rebuilt from a CFG
pub const MAX_INLINE_STACK_DEPTH: usize = 200;

fn ensure_remaining(buf: &impl Buf, needed: usize, what: &str) -> Result<()> {
    if buf.remaining() < needed {
        return Err(Error::FormatError(format!(
            "truncated {}: need {} bytes, {} available",
            what,
            needed,
            buf.remaining()
        )));
    }
    Ok(())
}

/// Fixed header at the start of the profile file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileHeader {
    pub str_table_offset: u64,
    pub str_table_size: u64,
    pub func_hdr_offset: u64,
    pub func_hdr_num: u32,
    pub func_hdr_ent_size: u32,
    pub profile_offset: u64,
}

impl FileHeader {
    pub fn decode(buf: &mut impl Buf) -> Result<Self> {
        ensure_remaining(buf, FILE_HEADER_SIZE, "file header")?;
        Ok(Self {
            str_table_offset: buf.get_u64_le(),
            str_table_size: buf.get_u64_le(),
            func_hdr_offset: buf.get_u64_le(),
            func_hdr_num: buf.get_u32_le(),
            func_hdr_ent_size: buf.get_u32_le(),
            profile_offset: buf.get_u64_le(),
        })
    }

    /// Byte offset where the inline group header table starts
    pub fn inline_table_offset(&self) -> Option<u64> {
        u64::from(self.func_hdr_num)
            .checked_mul(u64::from(self.func_hdr_ent_size))?
            .checked_add(self.func_hdr_offset)
    }
}

/// Header shared by profiled functions and inline groups.
///
/// `inline_depth`, `inline_stack_offset` and `total_samples` are only
/// meaningful for inline groups. `total_samples` is present when entries are
/// at least [`FUNC_HEADER_TOTAL_SIZE`] bytes long.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FunctionSampleHeader {
    pub filename_offset: u32,
    pub func_name_offset: u32,
    pub num_freq_entries: u64,
    pub freq_offset: u64,
    pub num_inline_entries: u64,
    pub inline_hdr_offset: u64,
    pub inline_depth: u32,
    pub inline_stack_offset: u64,
    pub total_samples: Option<u64>,
}

impl FunctionSampleHeader {
    /// Decode one header entry of `entry_size` bytes; trailing padding is skipped
    pub fn decode(buf: &mut impl Buf, entry_size: usize) -> Result<Self> {
        if entry_size < FUNC_HEADER_MIN_SIZE {
            return Err(Error::FormatError(format!(
                "function header entry size {} is below the minimum of {}",
                entry_size, FUNC_HEADER_MIN_SIZE
            )));
        }
        ensure_remaining(buf, entry_size, "function header")?;

        let filename_offset = buf.get_u32_le();
        let func_name_offset = buf.get_u32_le();
        let num_freq_entries = buf.get_u64_le();
        let freq_offset = buf.get_u64_le();
        let num_inline_entries = buf.get_u64_le();
        let inline_hdr_offset = buf.get_u64_le();
        let inline_depth = buf.get_u32_le();
        let inline_stack_offset = buf.get_u64_le();
        let (total_samples, consumed) = if entry_size >= FUNC_HEADER_TOTAL_SIZE {
            (Some(buf.get_u64_le()), FUNC_HEADER_TOTAL_SIZE)
        } else {
            (None, FUNC_HEADER_MIN_SIZE)
        };
        buf.advance(entry_size - consumed);

        Ok(Self {
            filename_offset,
            func_name_offset,
            num_freq_entries,
            freq_offset,
            num_inline_entries,
            inline_hdr_offset,
            inline_depth,
            inline_stack_offset,
            total_samples,
        })
    }
}

/// Per-line sample record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FreqRecord {
    pub line: u32,
    pub freq: u64,
    pub num_instr: u32,
}

impl FreqRecord {
    pub fn decode(buf: &mut impl Buf) -> Result<Self> {
        ensure_remaining(buf, FREQ_RECORD_SIZE, "line record")?;
        Ok(Self {
            line: buf.get_u32_le(),
            freq: buf.get_u64_le(),
            num_instr: buf.get_u32_le(),
        })
    }
}

/// One on-disk inline stack frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StackEntry {
    pub filename_offset: u32,
    pub line: u32,
}

impl StackEntry {
    pub fn decode(buf: &mut impl Buf) -> Result<Self> {
        ensure_remaining(buf, STACK_ENTRY_SIZE, "inline stack entry")?;
        Ok(Self {
            filename_offset: buf.get_u32_le(),
            line: buf.get_u32_le(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_header_rejects_short_input() {
        let mut data: &[u8] = &[0u8; FILE_HEADER_SIZE - 1];
        let result = FileHeader::decode(&mut data);
        assert!(matches!(result, Err(Error::FormatError(_))));
    }

    fn packed_header(entry_size: usize) -> Vec<u8> {
        let mut raw = vec![0u8; entry_size];
        raw[0..4].copy_from_slice(&7u32.to_le_bytes());
        raw[4..8].copy_from_slice(&9u32.to_le_bytes());
        raw[8..16].copy_from_slice(&3u64.to_le_bytes());
        raw[16..24].copy_from_slice(&48u64.to_le_bytes());
        raw[24..32].copy_from_slice(&2u64.to_le_bytes());
        raw[32..40].copy_from_slice(&104u64.to_le_bytes());
        raw[40..44].copy_from_slice(&5u32.to_le_bytes());
        raw[44..52].copy_from_slice(&256u64.to_le_bytes());
        raw
    }

    #[test]
    fn test_function_header_field_order() {
        let raw = packed_header(FUNC_HEADER_MIN_SIZE);
        let mut buf: &[u8] = &raw;
        let header = FunctionSampleHeader::decode(&mut buf, FUNC_HEADER_MIN_SIZE).unwrap();
        assert_eq!(header.filename_offset, 7);
        assert_eq!(header.func_name_offset, 9);
        assert_eq!(header.num_freq_entries, 3);
        assert_eq!(header.freq_offset, 48);
        assert_eq!(header.num_inline_entries, 2);
        assert_eq!(header.inline_hdr_offset, 104);
        assert_eq!(header.inline_depth, 5);
        assert_eq!(header.inline_stack_offset, 256);
        assert_eq!(header.total_samples, None);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_function_header_total_and_padding() {
        let entry_size = FUNC_HEADER_TOTAL_SIZE + 8;
        let mut raw = packed_header(entry_size);
        raw[52..60].copy_from_slice(&1234u64.to_le_bytes());
        raw.extend_from_slice(&42u32.to_le_bytes());
        raw.extend_from_slice(&[0u8; FREQ_RECORD_SIZE - 4]);

        let mut buf: &[u8] = &raw;
        let header = FunctionSampleHeader::decode(&mut buf, entry_size).unwrap();
        assert_eq!(header.num_freq_entries, 3);
        assert_eq!(header.total_samples, Some(1234));

        let record = FreqRecord::decode(&mut buf).unwrap();
        assert_eq!(record.line, 42);
    }

    #[test]
    fn test_function_header_rejects_small_entries() {
        let raw = vec![0u8; 128];
        let mut buf: &[u8] = &raw;
        let result = FunctionSampleHeader::decode(&mut buf, FUNC_HEADER_MIN_SIZE - 4);
        assert!(matches!(result, Err(Error::FormatError(_))));
    }

    #[test]
    fn test_inline_table_offset_overflow() {
        let header = FileHeader {
            func_hdr_offset: u64::MAX,
            func_hdr_num: 1,
            func_hdr_ent_size: 52,
            ..Default::default()
        };
        assert_eq!(header.inline_table_offset(), None);
    }
}
