//! Binary records handed from the driver to user mode.
//!
//! Every record starts with the same 8 byte header (`Type`, `Size`) followed by the fields
//! of its type; a process creation record may carry the raw UTF-16 command line after its
//! fixed fields. A read returns a flat concatenation of whole records, so a consumer walks
//! the buffer header by header, using `Size` to find the next record.
//!
//! Integers are in host byte order and there is no padding between fields:
//!
//! ```text
//! 0       4       8               16      20      24  26  28
//! | Type  | Size  | Time          | Pid   | PPid  |Len|Off| command line ...   (create)
//! | Type  | Size  | Time          | Pid   | Exit  |                            (exit)
//! ```

use alloc::{string::String, vec::Vec};
use core::fmt;

pub const HEADER_SIZE: usize = 8;
pub const PROCESS_CREATE_SIZE: usize = 28;
pub const PROCESS_EXIT_SIZE: usize = 24;

/// The largest record the driver can produce: a creation record with the longest
/// command line a UNICODE_STRING can describe.
pub const MAX_RECORD_SIZE: usize = PROCESS_CREATE_SIZE + u16::MAX as usize * 2;

const TYPE_OFFSET: usize = 0;
const SIZE_OFFSET: usize = 4;
const TIME_OFFSET: usize = 8;
const PID_OFFSET: usize = 16;
const PPID_OFFSET: usize = 20;
const EXIT_STATUS_OFFSET: usize = 20;
const COMMAND_LINE_LENGTH_OFFSET: usize = 24;
const COMMAND_LINE_OFFSET_OFFSET: usize = 26;

/// The `Type` tag of a record.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordType {
    ProcessCreate = 1,
    ProcessExit = 2,
}

impl RecordType {
    pub fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            1 => Some(RecordType::ProcessCreate),
            2 => Some(RecordType::ProcessExit),
            _ => None,
        }
    }

    pub fn tag(self) -> u32 {
        self as u32
    }

    /// Size of the header plus the fixed fields, i.e. the smallest legal `Size`.
    pub fn fixed_size(self) -> usize {
        match self {
            RecordType::ProcessCreate => PROCESS_CREATE_SIZE,
            RecordType::ProcessExit => PROCESS_EXIT_SIZE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Errors raised while building or parsing records
pub enum CodecError {
    AllocationFailed { size: usize },
    CommandLineTooLong { units: usize },
    Truncated { needed: usize, available: usize },
    UnknownType { tag: u32, size: u32 },
    InvalidSize { tag: u32, size: u32 },
    CommandLineOutOfBounds { offset: u16, length: u16, size: u32 },
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::AllocationFailed { size } => write!(f, "unable to allocate {size} bytes for a record"),
            CodecError::CommandLineTooLong { units } => write!(f, "command line of {units} UTF-16 units does not fit a record"),
            CodecError::Truncated { needed, available } => write!(f, "record needs {needed} bytes but only {available} remain"),
            CodecError::UnknownType { tag, size } => write!(f, "unknown record type {tag} (size {size})"),
            CodecError::InvalidSize { tag, size } => write!(f, "record type {tag} cannot have size {size}"),
            CodecError::CommandLineOutOfBounds { offset, length, size } => write!(
                f,
                "command line at offset {offset} with {length} units overruns a {size} byte record"
            ),
        }
    }
}

/// An encoded record, exactly `Size` bytes long.
///
/// Records are built once by the capture path and are never modified afterwards; the
/// queue moves them around by value until the bytes are copied out to a reader.
#[derive(Debug, PartialEq, Eq)]
pub struct EventRecord {
    bytes: Vec<u8>,
}

impl EventRecord {
    /// Encodes a process creation record. `command_line` is the raw UTF-16 text of the
    /// command line, if the process has one.
    pub fn process_create(
        time: i64,
        process_id: u32,
        parent_process_id: u32,
        command_line: Option<&[u16]>,
    ) -> Result<Self, CodecError> {
        let command_line = command_line.unwrap_or(&[]);
        let units = command_line.len();
        if units > u16::MAX as usize {
            return Err(CodecError::CommandLineTooLong { units });
        }

        let size = PROCESS_CREATE_SIZE + units * 2;
        let mut bytes = allocate_zeroed(size)?;

        write_header(&mut bytes, RecordType::ProcessCreate, size as u32);
        bytes[TIME_OFFSET..TIME_OFFSET + 8].copy_from_slice(&time.to_ne_bytes());
        bytes[PID_OFFSET..PID_OFFSET + 4].copy_from_slice(&process_id.to_ne_bytes());
        bytes[PPID_OFFSET..PPID_OFFSET + 4].copy_from_slice(&parent_process_id.to_ne_bytes());

        // length and offset stay zero when there is no text
        if units > 0 {
            bytes[COMMAND_LINE_LENGTH_OFFSET..COMMAND_LINE_LENGTH_OFFSET + 2]
                .copy_from_slice(&(units as u16).to_ne_bytes());
            bytes[COMMAND_LINE_OFFSET_OFFSET..COMMAND_LINE_OFFSET_OFFSET + 2]
                .copy_from_slice(&(PROCESS_CREATE_SIZE as u16).to_ne_bytes());

            for (dst, unit) in bytes[PROCESS_CREATE_SIZE..].chunks_exact_mut(2).zip(command_line) {
                dst.copy_from_slice(&unit.to_ne_bytes());
            }
        }

        Ok(EventRecord { bytes })
    }

    /// Encodes a process exit record.
    pub fn process_exit(time: i64, process_id: u32, exit_status: u32) -> Result<Self, CodecError> {
        let mut bytes = allocate_zeroed(PROCESS_EXIT_SIZE)?;

        write_header(&mut bytes, RecordType::ProcessExit, PROCESS_EXIT_SIZE as u32);
        bytes[TIME_OFFSET..TIME_OFFSET + 8].copy_from_slice(&time.to_ne_bytes());
        bytes[PID_OFFSET..PID_OFFSET + 4].copy_from_slice(&process_id.to_ne_bytes());
        bytes[EXIT_STATUS_OFFSET..EXIT_STATUS_OFFSET + 4].copy_from_slice(&exit_status.to_ne_bytes());

        Ok(EventRecord { bytes })
    }

    /// The encoded length, equal to the `Size` field.
    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn decode(&self) -> Result<Record<'_>, CodecError> {
        Record::decode(&self.bytes)
    }
}

/// Allocates the record buffer without aborting when the pool is exhausted.
fn allocate_zeroed(size: usize) -> Result<Vec<u8>, CodecError> {
    let mut bytes = Vec::new();
    bytes
        .try_reserve_exact(size)
        .map_err(|_| CodecError::AllocationFailed { size })?;
    bytes.resize(size, 0);

    Ok(bytes)
}

fn write_header(bytes: &mut [u8], record_type: RecordType, size: u32) {
    bytes[TYPE_OFFSET..TYPE_OFFSET + 4].copy_from_slice(&record_type.tag().to_ne_bytes());
    bytes[SIZE_OFFSET..SIZE_OFFSET + 4].copy_from_slice(&size.to_ne_bytes());
}

/// Copies `N` bytes out of `buf`, the caller has already checked the bounds.
fn read_array<const N: usize>(buf: &[u8], offset: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&buf[offset..offset + N]);
    out
}

fn read_u16(buf: &[u8], offset: usize) -> u16 {
    u16::from_ne_bytes(read_array(buf, offset))
}

fn read_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_ne_bytes(read_array(buf, offset))
}

fn read_i64(buf: &[u8], offset: usize) -> i64 {
    i64::from_ne_bytes(read_array(buf, offset))
}

/// The common header of every record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub tag: u32,
    pub size: u32,
}

impl RecordHeader {
    pub fn parse(buf: &[u8]) -> Result<Self, CodecError> {
        if buf.len() < HEADER_SIZE {
            return Err(CodecError::Truncated {
                needed: HEADER_SIZE,
                available: buf.len(),
            });
        }

        Ok(RecordHeader {
            tag: read_u32(buf, TYPE_OFFSET),
            size: read_u32(buf, SIZE_OFFSET),
        })
    }

    pub fn record_type(&self) -> Option<RecordType> {
        RecordType::from_tag(self.tag)
    }
}

/// UTF-16 command line text borrowed from a decoded buffer.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct CommandLine<'a> {
    bytes: &'a [u8],
}

impl<'a> CommandLine<'a> {
    pub fn units(&self) -> impl Iterator<Item = u16> + 'a {
        self.bytes
            .chunks_exact(2)
            .map(|pair| u16::from_ne_bytes([pair[0], pair[1]]))
    }

    pub fn to_string_lossy(&self) -> String {
        char::decode_utf16(self.units())
            .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
            .collect()
    }
}

impl fmt::Debug for CommandLine<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.to_string_lossy(), f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessCreateInfo<'a> {
    pub time: i64,
    pub process_id: u32,
    pub parent_process_id: u32,
    pub command_line: Option<CommandLine<'a>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessExitInfo {
    pub time: i64,
    pub process_id: u32,
    pub exit_status: u32,
}

/// A decoded view over one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Record<'a> {
    ProcessCreate(ProcessCreateInfo<'a>),
    ProcessExit(ProcessExitInfo),
}

impl<'a> Record<'a> {
    /// Decodes the record at the start of `buf`. Any bytes after its `Size` are ignored.
    pub fn decode(buf: &'a [u8]) -> Result<Self, CodecError> {
        let header = RecordHeader::parse(buf)?;
        let size = header.size as usize;
        if size > buf.len() {
            return Err(CodecError::Truncated {
                needed: size,
                available: buf.len(),
            });
        }

        let record_type = header.record_type().ok_or(CodecError::UnknownType {
            tag: header.tag,
            size: header.size,
        })?;
        if size < record_type.fixed_size() {
            return Err(CodecError::InvalidSize {
                tag: header.tag,
                size: header.size,
            });
        }

        let buf = &buf[..size];
        let time = read_i64(buf, TIME_OFFSET);
        let process_id = read_u32(buf, PID_OFFSET);

        match record_type {
            RecordType::ProcessCreate => {
                let length = read_u16(buf, COMMAND_LINE_LENGTH_OFFSET);
                let offset = read_u16(buf, COMMAND_LINE_OFFSET_OFFSET);

                let command_line = if length == 0 {
                    None
                } else {
                    let start = offset as usize;
                    let end = start + length as usize * 2;
                    if start < PROCESS_CREATE_SIZE || end > size {
                        return Err(CodecError::CommandLineOutOfBounds {
                            offset,
                            length,
                            size: header.size,
                        });
                    }
                    Some(CommandLine { bytes: &buf[start..end] })
                };

                Ok(Record::ProcessCreate(ProcessCreateInfo {
                    time,
                    process_id,
                    parent_process_id: read_u32(buf, PPID_OFFSET),
                    command_line,
                }))
            }
            RecordType::ProcessExit => Ok(Record::ProcessExit(ProcessExitInfo {
                time,
                process_id,
                exit_status: read_u32(buf, EXIT_STATUS_OFFSET),
            })),
        }
    }

    pub fn record_type(&self) -> RecordType {
        match self {
            Record::ProcessCreate(_) => RecordType::ProcessCreate,
            Record::ProcessExit(_) => RecordType::ProcessExit,
        }
    }

    pub fn process_id(&self) -> u32 {
        match self {
            Record::ProcessCreate(info) => info.process_id,
            Record::ProcessExit(info) => info.process_id,
        }
    }

    pub fn time(&self) -> i64 {
        match self {
            Record::ProcessCreate(info) => info.time,
            Record::ProcessExit(info) => info.time,
        }
    }
}

/// Walks a buffer returned by a read, one record at a time.
///
/// Records with an unknown `Type` are reported as [`CodecError::UnknownType`] and skipped
/// using their `Size`. Once the framing itself is broken (a header that is cut short, or a
/// `Size` smaller than a header or past the end of the buffer) the error is yielded and
/// iteration stops.
pub fn decode_records(buf: &[u8]) -> Records<'_> {
    Records { buf, failed: false }
}

pub struct Records<'a> {
    buf: &'a [u8],
    failed: bool,
}

impl<'a> Iterator for Records<'a> {
    type Item = Result<Record<'a>, CodecError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.buf.is_empty() {
            return None;
        }

        let header = match RecordHeader::parse(self.buf) {
            Ok(h) => h,
            Err(e) => {
                self.failed = true;
                return Some(Err(e));
            }
        };

        let size = header.size as usize;
        if size < HEADER_SIZE {
            self.failed = true;
            return Some(Err(CodecError::InvalidSize {
                tag: header.tag,
                size: header.size,
            }));
        }
        if size > self.buf.len() {
            self.failed = true;
            return Some(Err(CodecError::Truncated {
                needed: size,
                available: self.buf.len(),
            }));
        }

        let (record, rest) = self.buf.split_at(size);
        self.buf = rest;

        Some(Record::decode(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    fn utf16(s: &str) -> Vec<u16> {
        s.encode_utf16().collect()
    }

    #[test]
    fn process_create_round_trip() {
        let cmd = utf16("notepad.exe");
        let record = EventRecord::process_create(133_000_000_000_000_000, 100, 4, Some(cmd.as_slice())).unwrap();

        assert_eq!(record.size(), PROCESS_CREATE_SIZE + cmd.len() * 2);

        let header = RecordHeader::parse(record.as_bytes()).unwrap();
        assert_eq!(header.record_type(), Some(RecordType::ProcessCreate));
        assert_eq!(header.size as usize, record.size());

        match record.decode().unwrap() {
            Record::ProcessCreate(info) => {
                assert_eq!(info.time, 133_000_000_000_000_000);
                assert_eq!(info.process_id, 100);
                assert_eq!(info.parent_process_id, 4);
                let command_line = info.command_line.unwrap();
                assert_eq!(command_line.units().count(), 11);
                assert_eq!(command_line.units().collect::<Vec<_>>(), cmd);
                assert_eq!(command_line.to_string_lossy(), "notepad.exe");
            }
            other => panic!("decoded the wrong record: {other:?}"),
        }
    }

    #[test]
    fn process_create_without_command_line_has_no_trailing_text() {
        let record = EventRecord::process_create(1, 8, 0, None).unwrap();
        assert_eq!(record.size(), PROCESS_CREATE_SIZE);

        let bytes = record.as_bytes();
        assert_eq!(read_u16(bytes, COMMAND_LINE_LENGTH_OFFSET), 0);
        assert_eq!(read_u16(bytes, COMMAND_LINE_OFFSET_OFFSET), 0);

        match record.decode().unwrap() {
            Record::ProcessCreate(info) => assert!(info.command_line.is_none()),
            other => panic!("decoded the wrong record: {other:?}"),
        }

        // an empty slice is treated the same as no command line
        let empty = EventRecord::process_create(1, 8, 0, Some(&[][..])).unwrap();
        assert_eq!(empty, record);
    }

    #[test]
    fn command_line_offset_points_past_fixed_fields() {
        let cmd = utf16("cmd.exe /c dir");
        let record = EventRecord::process_create(0, 1, 2, Some(cmd.as_slice())).unwrap();
        let bytes = record.as_bytes();

        assert_eq!(read_u16(bytes, COMMAND_LINE_OFFSET_OFFSET) as usize, PROCESS_CREATE_SIZE);
        assert_eq!(read_u16(bytes, COMMAND_LINE_LENGTH_OFFSET) as usize, cmd.len());
        assert_eq!(&bytes[PROCESS_CREATE_SIZE..PROCESS_CREATE_SIZE + 2], &u16::from(b'c').to_ne_bytes());
    }

    #[test]
    fn process_exit_layout() {
        let record = EventRecord::process_exit(-5, 1234, 0xC000_0005).unwrap();
        assert_eq!(record.size(), PROCESS_EXIT_SIZE);

        let bytes = record.as_bytes();
        assert_eq!(read_u32(bytes, TYPE_OFFSET), 2);
        assert_eq!(read_u32(bytes, SIZE_OFFSET), PROCESS_EXIT_SIZE as u32);

        assert_eq!(
            record.decode().unwrap(),
            Record::ProcessExit(ProcessExitInfo {
                time: -5,
                process_id: 1234,
                exit_status: 0xC000_0005,
            })
        );
    }

    #[test]
    fn unpaired_surrogates_are_replaced() {
        let cmd = [u16::from(b'a'), 0xD800, u16::from(b'b')];
        let record = EventRecord::process_create(0, 1, 1, Some(cmd.as_slice())).unwrap();
        let Record::ProcessCreate(info) = record.decode().unwrap() else {
            panic!("expected a create record");
        };
        assert_eq!(info.command_line.unwrap().to_string_lossy(), "a\u{FFFD}b");
    }

    #[test]
    fn oversized_command_line_is_rejected() {
        let cmd = vec![u16::from(b'x'); u16::MAX as usize + 1];
        assert_eq!(
            EventRecord::process_create(0, 1, 1, Some(cmd.as_slice())),
            Err(CodecError::CommandLineTooLong { units: cmd.len() })
        );
    }

    #[test]
    fn decode_rejects_size_past_end_of_buffer() {
        let record = EventRecord::process_exit(0, 1, 0).unwrap();
        let bytes = &record.as_bytes()[..PROCESS_EXIT_SIZE - 1];
        assert_eq!(
            Record::decode(bytes),
            Err(CodecError::Truncated {
                needed: PROCESS_EXIT_SIZE,
                available: PROCESS_EXIT_SIZE - 1,
            })
        );
        assert!(matches!(Record::decode(&bytes[..4]), Err(CodecError::Truncated { .. })));
    }

    #[test]
    fn decode_rejects_size_below_fixed_fields() {
        let mut bytes = EventRecord::process_create(0, 1, 1, None).unwrap().as_bytes().to_vec();
        bytes[SIZE_OFFSET..SIZE_OFFSET + 4].copy_from_slice(&20u32.to_ne_bytes());
        assert_eq!(
            Record::decode(&bytes),
            Err(CodecError::InvalidSize { tag: 1, size: 20 })
        );
    }

    #[test]
    fn decode_rejects_command_line_outside_record() {
        let cmd = utf16("a.exe");
        let mut bytes = EventRecord::process_create(0, 1, 1, Some(cmd.as_slice())).unwrap().as_bytes().to_vec();
        bytes[COMMAND_LINE_LENGTH_OFFSET..COMMAND_LINE_LENGTH_OFFSET + 2].copy_from_slice(&6u16.to_ne_bytes());
        assert!(matches!(
            Record::decode(&bytes),
            Err(CodecError::CommandLineOutOfBounds { offset: 28, length: 6, .. })
        ));
    }

    #[test]
    fn stream_skips_unknown_types_by_size() {
        let first = EventRecord::process_exit(0, 10, 0).unwrap();
        let last = EventRecord::process_exit(0, 30, 0).unwrap();

        let mut unknown = vec![0u8; 12];
        unknown[..4].copy_from_slice(&7u32.to_ne_bytes());
        unknown[4..8].copy_from_slice(&12u32.to_ne_bytes());

        let mut buf = Vec::new();
        buf.extend_from_slice(first.as_bytes());
        buf.extend_from_slice(&unknown);
        buf.extend_from_slice(last.as_bytes());

        let decoded: Vec<_> = decode_records(&buf).collect();
        assert_eq!(decoded.len(), 3);
        assert_eq!(decoded[0].unwrap().process_id(), 10);
        assert_eq!(decoded[1], Err(CodecError::UnknownType { tag: 7, size: 12 }));
        assert_eq!(decoded[2].unwrap().process_id(), 30);
    }

    #[test]
    fn stream_stops_on_broken_framing() {
        let record = EventRecord::process_exit(0, 10, 0).unwrap();

        let mut buf = record.as_bytes().to_vec();
        buf.extend_from_slice(&[1, 0, 0]);

        let mut records = decode_records(&buf);
        assert!(records.next().unwrap().is_ok());
        assert!(matches!(records.next(), Some(Err(CodecError::Truncated { needed: 8, available: 3 }))));
        assert!(records.next().is_none());

        let mut zero_size = vec![0u8; 8];
        zero_size[..4].copy_from_slice(&2u32.to_ne_bytes());
        let mut records = decode_records(&zero_size);
        assert_eq!(records.next(), Some(Err(CodecError::InvalidSize { tag: 2, size: 0 })));
        assert!(records.next().is_none());
    }

    #[test]
    fn empty_stream_yields_nothing() {
        assert_eq!(decode_records(&[]).count(), 0);
    }
}
