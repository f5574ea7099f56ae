use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;

use crate::error::{Error, Result};
use crate::format::{
    FileHeader, FreqRecord, FunctionSampleHeader, StackEntry, FILE_HEADER_SIZE, FREQ_RECORD_SIZE,
    MAX_INLINE_STACK_DEPTH, STACK_ENTRY_SIZE,
};
use crate::index::SampleStore;
use crate::model::{FlatSampleRecord, InlineFrame, InlineSampleRecord, InlineStack, ProfileUnit};
use crate::parser::string_table::StringTable;

/// Reader for the binary sample profile format
pub struct SampleProfileReader;

impl SampleProfileReader {
    /// Read a sample profile from a file path
    pub fn read_profile(path: &Path) -> Result<SampleStore> {
        let mut file = File::open(path).map_err(|e| {
            Error::ProfileLoadError(path.to_path_buf(), format!("Failed to open file: {}", e))
        })?;

        let mut buffer = Vec::new();
        file.read_to_end(&mut buffer).map_err(|e| {
            Error::ProfileLoadError(path.to_path_buf(), format!("Failed to read file: {}", e))
        })?;

        let store = Self::read_profile_from_bytes(buffer)?;
        log::info!(
            "Read {} samples from sample profile {}",
            store.num_samples(),
            path.display()
        );
        Ok(store)
    }

    /// Read a sample profile from bytes.
    ///
    /// Any truncated or malformed section fails the whole read; no partially
    /// filled store is ever returned.
    pub fn read_profile_from_bytes(data: impl Into<Bytes>) -> Result<SampleStore> {
        let data = data.into();

        let header = Self::read_file_header(&data)?;
        let strings = Self::read_string_table(&data, &header)?;
        let mut store = SampleStore::new(ProfileUnit { header, strings });

        for index in 0..header.func_hdr_num {
            let func_hdr = Self::read_function_header(&data, &header, index)?;
            Self::read_function_samples(&data, &header, &func_hdr, &mut store)?;
            if func_hdr.num_inline_entries > 0 {
                Self::read_inline_groups(&data, &header, &func_hdr, &mut store)?;
            }
        }

        log::debug!(
            "sample profile: {} functions, {} strings ({} bytes), {} samples, max count {}",
            header.func_hdr_num,
            store.strings().len(),
            store.strings().size(),
            store.num_samples(),
            store.max_count()
        );
        Ok(store)
    }

    /// Read the fixed file header
    pub fn read_file_header(data: &Bytes) -> Result<FileHeader> {
        let mut buf = Self::section(data, 0, FILE_HEADER_SIZE as u64, "file header")?;
        FileHeader::decode(&mut buf)
    }

    /// Read the string table verbatim, exactly as large as the header declares
    pub fn read_string_table(data: &Bytes, header: &FileHeader) -> Result<StringTable> {
        let table = Self::section(
            data,
            header.str_table_offset,
            header.str_table_size,
            "string table",
        )?;
        Ok(StringTable::new(table))
    }

    /// Read the function header with the given index
    pub fn read_function_header(
        data: &Bytes,
        header: &FileHeader,
        index: u32,
    ) -> Result<FunctionSampleHeader> {
        let entry_size = u64::from(header.func_hdr_ent_size);
        let offset = u64::from(index)
            .checked_mul(entry_size)
            .and_then(|relative| relative.checked_add(header.func_hdr_offset))
            .ok_or_else(|| {
                Error::FormatError(format!("function header {} offset overflows", index))
            })?;

        let mut buf = Self::section(data, offset, entry_size, "function header")?;
        FunctionSampleHeader::decode(&mut buf, header.func_hdr_ent_size as usize)
    }

    /// Read the per-line records of a function into the flat index
    fn read_function_samples(
        data: &Bytes,
        header: &FileHeader,
        func_hdr: &FunctionSampleHeader,
        store: &mut SampleStore,
    ) -> Result<()> {
        let filename = store.strings_mut().resolve(func_hdr.filename_offset)?;
        let func_name = store.strings_mut().resolve(func_hdr.func_name_offset)?;

        let mut buf = Self::records(data, header, func_hdr, "function line records")?;
        for _ in 0..func_hdr.num_freq_entries {
            let sample = FreqRecord::decode(&mut buf)?;
            store.insert_flat(FlatSampleRecord {
                filename,
                func_name,
                line: sample.line,
                freq: sample.freq,
                num_instr: sample.num_instr,
            });
        }
        Ok(())
    }

    /// Read every inline group of a function into the inline index
    fn read_inline_groups(
        data: &Bytes,
        header: &FileHeader,
        func_hdr: &FunctionSampleHeader,
        store: &mut SampleStore,
    ) -> Result<()> {
        let entry_size = u64::from(header.func_hdr_ent_size);
        let table_offset = header
            .inline_table_offset()
            .and_then(|offset| offset.checked_add(func_hdr.inline_hdr_offset))
            .ok_or_else(|| Error::FormatError("inline header table offset overflows".to_string()))?;

        for group in 0..func_hdr.num_inline_entries {
            let offset = group
                .checked_mul(entry_size)
                .and_then(|relative| relative.checked_add(table_offset))
                .ok_or_else(|| {
                    Error::FormatError(format!("inline header {} offset overflows", group))
                })?;
            let mut buf = Self::section(data, offset, entry_size, "inline header")?;
            let inline_hdr = FunctionSampleHeader::decode(&mut buf, entry_size as usize)?;

            if inline_hdr.num_freq_entries == 0 {
                continue;
            }

            let depth = inline_hdr.inline_depth as usize;
            if depth == 0 {
                return Err(Error::FormatError(format!(
                    "inline group {} has an empty call stack",
                    group
                )));
            }
            if depth > MAX_INLINE_STACK_DEPTH {
                let error = Error::Overflow {
                    depth,
                    max: MAX_INLINE_STACK_DEPTH,
                };
                log::warn!("Skipping inline group {}: {}", group, error);
                continue;
            }

            let stack = Self::read_inline_stack(data, header, &inline_hdr, store)?;
            Self::read_inline_samples(data, header, &inline_hdr, stack, store)?;
        }
        Ok(())
    }

    /// Read an inline call stack; frames are stored leaf-last on disk and
    /// returned leaf-first
    fn read_inline_stack(
        data: &Bytes,
        header: &FileHeader,
        inline_hdr: &FunctionSampleHeader,
        store: &mut SampleStore,
    ) -> Result<InlineStack> {
        let depth = inline_hdr.inline_depth as usize;
        let offset = header
            .profile_offset
            .checked_add(inline_hdr.inline_stack_offset)
            .ok_or_else(|| Error::FormatError("inline stack offset overflows".to_string()))?;
        let mut buf = Self::section(
            data,
            offset,
            (depth * STACK_ENTRY_SIZE) as u64,
            "inline stack",
        )?;

        let mut frames = Vec::with_capacity(depth);
        for _ in 0..depth {
            let entry = StackEntry::decode(&mut buf)?;
            frames.push(InlineFrame {
                file: store.strings_mut().resolve(entry.filename_offset)?,
                line: entry.line,
            });
        }
        frames.reverse();
        Ok(Arc::from(frames))
    }

    /// Read the line records of one inline group, plus its callsite total.
    ///
    /// Headers too short to carry the group total fall back to the sum of
    /// the group's line frequencies.
    fn read_inline_samples(
        data: &Bytes,
        header: &FileHeader,
        inline_hdr: &FunctionSampleHeader,
        stack: InlineStack,
        store: &mut SampleStore,
    ) -> Result<()> {
        let filename = store.strings_mut().resolve(inline_hdr.filename_offset)?;
        let func_name = store.strings_mut().resolve(inline_hdr.func_name_offset)?;

        let mut buf = Self::records(data, header, inline_hdr, "inline line records")?;
        let samples = (0..inline_hdr.num_freq_entries)
            .map(|_| FreqRecord::decode(&mut buf))
            .collect::<Result<Vec<_>>>()?;
        let total = inline_hdr.total_samples.unwrap_or_else(|| {
            samples
                .iter()
                .fold(0u64, |total, sample| total.saturating_add(sample.freq))
        });

        store.insert_inline(InlineSampleRecord {
            stack: Arc::clone(&stack),
            filename,
            func_name,
            line: 0,
            freq: total,
            num_instr: 0,
        });
        for sample in samples {
            store.insert_inline(InlineSampleRecord {
                stack: Arc::clone(&stack),
                filename,
                func_name,
                line: sample.line,
                freq: sample.freq,
                num_instr: sample.num_instr,
            });
        }
        Ok(())
    }

    /// Slice holding all line records described by a header
    fn records(
        data: &Bytes,
        header: &FileHeader,
        func_hdr: &FunctionSampleHeader,
        what: &str,
    ) -> Result<Bytes> {
        let offset = header
            .profile_offset
            .checked_add(func_hdr.freq_offset)
            .ok_or_else(|| Error::FormatError(format!("{} offset overflows", what)))?;
        let len = func_hdr
            .num_freq_entries
            .checked_mul(FREQ_RECORD_SIZE as u64)
            .ok_or_else(|| Error::FormatError(format!("{} length overflows", what)))?;
        Self::section(data, offset, len, what)
    }

    /// Bounds-checked sub-slice of the file
    fn section(data: &Bytes, offset: u64, len: u64, what: &str) -> Result<Bytes> {
        let end = offset.checked_add(len).filter(|&end| end <= data.len() as u64);
        match end {
            Some(end) => Ok(data.slice(offset as usize..end as usize)),
            None => Err(Error::FormatError(format!(
                "{} at offset {} with length {} exceeds file size {}",
                what,
                offset,
                len,
                data.len()
            ))),
        }
    }
}
